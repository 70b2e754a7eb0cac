//! The `Instance` and `System` singletons: enabled extensions, the path
//! interner, the time base, application identity, and the HMD descriptor
//! exposed through `GetSystem`.

use crate::errors::{RtError, RtResult};
use crate::events::EventQueue;
use crate::path_interner::PathInterner;
use crate::settings::SettingsWatcher;
use crate::time::TimeBase;
use hostapi::{Eye, HmdDescriptor, HostRuntime};
use std::ffi::CString;
use std::sync::Arc;

/// Extensions this runtime advertises via
/// `xrEnumerateInstanceExtensionProperties`, matched to the component
/// table's graphics bindings and ancillary tracker/time extensions.
pub const ENABLED_EXTENSIONS: &[&str] = &[
    "XR_KHR_D3D11_enable",
    "XR_KHR_D3D12_enable",
    "XR_KHR_vulkan_enable",
    "XR_KHR_vulkan_enable2",
    "XR_KHR_opengl_enable",
    "XR_KHR_composition_layer_depth",
    "XR_KHR_composition_layer_cylinder",
    "XR_KHR_composition_layer_cube",
    "XR_KHR_win32_convert_performance_counter_time",
];

pub struct ApplicationIdentity {
    pub name: String,
    pub engine_name: String,
}

/// Singleton created by `xrCreateInstance`. Owns every other handle's
/// lifetime; destroyed by `xrDestroyInstance`.
pub struct Instance<H: HostRuntime> {
    pub host: Arc<H>,
    pub paths: PathInterner,
    pub time_base: TimeBase,
    pub events: EventQueue,
    pub settings: SettingsWatcher,
    pub application: ApplicationIdentity,
    pub enabled_extensions: Vec<String>,
    system_id_issued: std::sync::atomic::AtomicBool,
    /// Set by any `xrGet*GraphicsRequirementsKHR` call; `xrCreateSession`
    /// refuses to proceed until this is true, per the "graphics-requirements
    /// call missing" ordering rule every KHR graphics-binding extension
    /// imposes.
    graphics_requirements_queried: std::sync::atomic::AtomicBool,
}

/// OpenXR's `SystemId` is a fixed non-null value for this runtime; there is
/// exactly one system, the HMD the host runtime drives.
pub const SYSTEM_ID: u64 = 1;

impl<H: HostRuntime> Instance<H> {
    pub fn new(host: Arc<H>, application: ApplicationIdentity, requested_extensions: &[String]) -> RtResult<Self> {
        for ext in requested_extensions {
            if !ENABLED_EXTENSIONS.contains(&ext.as_str()) {
                log::warn!("application requested unsupported extension {ext}");
                return Err(RtError::ValidationFailure);
            }
        }
        let time_base = TimeBase::new(host.as_ref());
        let settings = SettingsWatcher::load();
        settings.spawn();
        Ok(Self {
            host,
            paths: PathInterner::new(),
            time_base,
            events: EventQueue::new(),
            settings,
            application,
            enabled_extensions: requested_extensions.to_vec(),
            system_id_issued: std::sync::atomic::AtomicBool::new(false),
            graphics_requirements_queried: std::sync::atomic::AtomicBool::new(false),
        })
    }

    pub fn mark_graphics_requirements_queried(&self) {
        self.graphics_requirements_queried
            .store(true, std::sync::atomic::Ordering::Relaxed);
    }

    pub fn check_graphics_requirements_queried(&self) -> RtResult<()> {
        if self
            .graphics_requirements_queried
            .load(std::sync::atomic::Ordering::Relaxed)
        {
            Ok(())
        } else {
            Err(RtError::GraphicsRequirementsCallMissing)
        }
    }

    pub fn get_system(&self) -> RtResult<u64> {
        self.system_id_issued
            .store(true, std::sync::atomic::Ordering::Relaxed);
        Ok(SYSTEM_ID)
    }

    pub fn check_system(&self, system_id: u64) -> RtResult<()> {
        if system_id == SYSTEM_ID
            && self
                .system_id_issued
                .load(std::sync::atomic::Ordering::Relaxed)
        {
            Ok(())
        } else {
            Err(RtError::SystemInvalid)
        }
    }

    pub fn system_properties(&self) -> SystemProperties {
        let descriptor = self.host.hmd_descriptor();
        SystemProperties {
            vendor_id: 0x4e58, // "NX"
            system_name: CString::new("NovaXR Virtual System").unwrap(),
            descriptor,
        }
    }

    pub fn eye_render_info(&self, eye: Eye) -> hostapi::EyeRenderInfo {
        self.host.eye_render_info(eye)
    }
}

pub struct SystemProperties {
    pub vendor_id: u32,
    pub system_name: CString,
    pub descriptor: HmdDescriptor,
}
