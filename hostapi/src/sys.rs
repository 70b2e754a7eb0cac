//! Raw C ABI of the vendor host runtime, and [`RealHost`], the
//! [`HostRuntime`](crate::HostRuntime) implementation that talks to it.
//!
//! The vendor SDK ships as a shared library exporting a single versioned
//! entry point, `Host_GetApiTableV1`, that hands back a `'static` pointer to
//! a flat table of `extern "C"` function pointers. This mirrors the
//! versioned-interface-by-name convention used by LibOVR-style SDKs (and,
//! one level up, the convention `xrGetInstanceProcAddr` itself follows): one
//! well-known symbol, one table, no per-call symbol lookup.

use crate::{
    ControllerConnection, DeviceIndex, Eye, EyeRenderInfo, Fov, HmdDescriptor, HostControllerType,
    HostDepthLayer, HostError, HostFormat, HostLayer, HostPose, HostResult, HostRuntime,
    HostSwapchain, HostVelocity, HostViewLayer, InputSnapshot, RawHandle, Side, SwapchainDesc,
    Vector2,
};
use libloading::Library;
use std::ffi::CStr;

pub const API_TABLE_ENTRY_POINT: &CStr = c"Host_GetApiTableV1";

/// Default library name searched for when no explicit path is configured,
/// platform by platform. Real deployments set `NOVAXR_HOST_LIBRARY` to the
/// vendor's actual install path; this is only the fallback.
#[cfg(target_os = "windows")]
pub const DEFAULT_LIBRARY_NAME: &str = "hostvr.dll";
#[cfg(not(target_os = "windows"))]
pub const DEFAULT_LIBRARY_NAME: &str = "libhostvr.so";

#[repr(C)]
#[derive(Copy, Clone)]
pub struct HostPoseRaw {
    pub position: [f32; 3],
    pub orientation: [f32; 4],
}

#[repr(C)]
#[derive(Copy, Clone, Default)]
pub struct HostVelocityRaw {
    pub linear: [f32; 3],
    pub angular: [f32; 3],
}

#[repr(C)]
#[derive(Copy, Clone)]
pub struct HostFovRaw {
    pub angle_left: f32,
    pub angle_right: f32,
    pub angle_up: f32,
    pub angle_down: f32,
}

#[repr(C)]
#[derive(Copy, Clone)]
pub struct HostEyeRenderInfoRaw {
    pub fov: HostFovRaw,
    pub head_from_eye: HostPoseRaw,
}

#[repr(C)]
#[derive(Copy, Clone)]
pub struct HostHmdDescriptorRaw {
    pub width: u32,
    pub height: u32,
    pub eye_height: f32,
    pub refresh_rate_count: u32,
    pub refresh_rates: *const f32,
}

#[repr(C)]
#[derive(Copy, Clone)]
pub struct HostInputSnapshotRaw {
    pub buttons: [u32; 2],
    pub touches: [u32; 2],
    pub trigger: [f32; 2],
    pub grip: [f32; 2],
    pub thumbstick: [[f32; 2]; 2],
    pub trackpad: [[f32; 2]; 2],
}

/// `0` = absent, otherwise a [`HostControllerType`] discriminant + 1.
pub type HostControllerTypeRaw = u32;

#[repr(C)]
#[derive(Copy, Clone)]
pub struct HostSwapchainDescRaw {
    pub width: u32,
    pub height: u32,
    pub format: u32,
    pub is_depth: u32,
}

#[repr(C)]
#[derive(Copy, Clone)]
pub struct HostViewLayerRaw {
    pub swapchain: u64,
    pub image_index: u32,
    pub rect: [i32; 4],
    pub fov: HostFovRaw,
    pub pose: HostPoseRaw,
}

#[repr(C)]
#[derive(Copy, Clone)]
pub struct HostDepthLayerRaw {
    pub swapchain: u64,
    pub image_index: u32,
    pub near_z: f32,
    pub far_z: f32,
}

/// Tag discriminating [`HostLayerRaw`]'s payload; mirrors [`HostLayer`].
#[repr(u32)]
#[derive(Copy, Clone, PartialEq, Eq)]
pub enum HostLayerKind {
    EyeFov = 0,
    EyeFovDepth = 1,
    Quad = 2,
    Cylinder = 3,
    Cube = 4,
    Dummy = 5,
}

#[repr(C)]
#[derive(Copy, Clone)]
pub struct HostLayerRaw {
    pub kind: HostLayerKind,
    pub views: [HostViewLayerRaw; 2],
    pub depth: [HostDepthLayerRaw; 2],
    pub swapchain: u64,
    pub image_index: u32,
    pub pose: HostPoseRaw,
    pub extent_a: f32,
    pub extent_b: f32,
    pub extent_c: f32,
    pub head_locked: u32,
    pub orientation: [f32; 4],
}

/// The table the vendor library hands back from `Host_GetApiTableV1`. Every
/// entry is `extern "C"`; integer-returning calls use `0` for success and a
/// negative vendor error code otherwise, matching [`HostError::CallFailed`].
#[repr(C)]
pub struct HostApiTable {
    pub hmd_descriptor: unsafe extern "C" fn(out: *mut HostHmdDescriptorRaw),
    pub eye_render_info: unsafe extern "C" fn(eye: u32, out: *mut HostEyeRenderInfoRaw),
    pub adapter_luid: unsafe extern "C" fn() -> u64,
    pub now_seconds: unsafe extern "C" fn() -> f64,
    pub device_pose: unsafe extern "C" fn(
        device_kind: u32,
        side: u32,
        time_seconds: f64,
        out_pose: *mut HostPoseRaw,
        out_velocity: *mut HostVelocityRaw,
    ) -> i32,
    pub connected_controllers:
        unsafe extern "C" fn(out_left: *mut HostControllerTypeRaw, out_right: *mut HostControllerTypeRaw),
    pub input_snapshot: unsafe extern "C" fn(out: *mut HostInputSnapshotRaw),
    pub set_vibration:
        unsafe extern "C" fn(side: u32, frequency_hz: f32, amplitude: f32, duration_seconds: f32),

    pub wait_to_begin_frame: unsafe extern "C" fn(frame: u64) -> i32,
    pub begin_frame: unsafe extern "C" fn(frame: u64) -> i32,
    pub end_frame: unsafe extern "C" fn(frame: u64, layers: *const HostLayerRaw, count: u32) -> i32,
    pub predicted_display_time: unsafe extern "C" fn(frame: u64) -> f64,
    pub ideal_frame_duration: unsafe extern "C" fn() -> f64,
    pub is_reprojecting: unsafe extern "C" fn() -> u32,

    pub create_swapchain:
        unsafe extern "C" fn(desc: *const HostSwapchainDescRaw, out_handle: *mut u64) -> i32,
    pub destroy_swapchain: unsafe extern "C" fn(handle: u64),
    pub swapchain_image_count: unsafe extern "C" fn(handle: u64) -> u32,
    /// Writes up to `capacity` raw handles into `out`, returns the true
    /// count (same two-call convention `xrEnumerate*` itself uses).
    pub swapchain_textures: unsafe extern "C" fn(handle: u64, out: *mut u64, capacity: u32) -> u32,
    pub swapchain_acquire: unsafe extern "C" fn(handle: u64) -> u32,
    pub swapchain_wait: unsafe extern "C" fn(handle: u64, timeout_seconds: f32) -> u32,
    pub swapchain_release: unsafe extern "C" fn(handle: u64),
    pub swapchain_commit: unsafe extern "C" fn(handle: u64),
}

fn controller_type_from_raw(raw: HostControllerTypeRaw) -> Option<HostControllerType> {
    match raw {
        0 => None,
        1 => Some(HostControllerType::OculusTouch),
        2 => Some(HostControllerType::ValveIndex),
        3 => Some(HostControllerType::HtcVive),
        4 => Some(HostControllerType::WindowsMixedReality),
        5 => Some(HostControllerType::Simple),
        other => {
            log::warn!("host runtime reported unknown controller type {other}");
            None
        }
    }
}

fn format_to_raw(format: HostFormat) -> u32 {
    match format {
        HostFormat::Rgba8Unorm => 0,
        HostFormat::Rgba8UnormSrgb => 1,
        HostFormat::Bgra8Unorm => 2,
        HostFormat::Bgra8UnormSrgb => 3,
        HostFormat::Rgba16Float => 4,
        HostFormat::Rgb10A2Unorm => 5,
        HostFormat::Depth24Stencil8 => 6,
        HostFormat::Depth32Float => 7,
    }
}

fn pose_from_raw(raw: HostPoseRaw) -> HostPose {
    HostPose {
        position: raw.position.into(),
        orientation: glam::Quat::from_array(raw.orientation),
    }
}

fn velocity_from_raw(raw: HostVelocityRaw) -> HostVelocity {
    HostVelocity {
        linear: raw.linear.into(),
        angular: raw.angular.into(),
    }
}

fn layer_to_raw(layer: &HostLayer) -> HostLayerRaw {
    let view_raw = |v: &HostViewLayer| HostViewLayerRaw {
        swapchain: v.swapchain.0,
        image_index: v.image_index,
        rect: [v.rect.0, v.rect.1, v.rect.2 as i32, v.rect.3 as i32],
        fov: fov_to_raw(v.fov),
        pose: pose_to_raw(v.pose),
    };
    let depth_raw = |d: &HostDepthLayer| HostDepthLayerRaw {
        swapchain: d.swapchain.0,
        image_index: d.image_index,
        near_z: d.near_z,
        far_z: d.far_z,
    };
    let empty_view = HostViewLayerRaw {
        swapchain: 0,
        image_index: 0,
        rect: [0; 4],
        fov: HostFovRaw {
            angle_left: 0.0,
            angle_right: 0.0,
            angle_up: 0.0,
            angle_down: 0.0,
        },
        pose: pose_to_raw(HostPose::IDENTITY),
    };
    let empty_depth = HostDepthLayerRaw {
        swapchain: 0,
        image_index: 0,
        near_z: 0.0,
        far_z: 0.0,
    };
    match layer {
        HostLayer::EyeFov { views } => HostLayerRaw {
            kind: HostLayerKind::EyeFov,
            views: [view_raw(&views[0]), view_raw(&views[1])],
            depth: [empty_depth, empty_depth],
            swapchain: 0,
            image_index: 0,
            pose: pose_to_raw(HostPose::IDENTITY),
            extent_a: 0.0,
            extent_b: 0.0,
            extent_c: 0.0,
            head_locked: 0,
            orientation: [0.0, 0.0, 0.0, 1.0],
        },
        HostLayer::EyeFovDepth { views, depth } => HostLayerRaw {
            kind: HostLayerKind::EyeFovDepth,
            views: [view_raw(&views[0]), view_raw(&views[1])],
            depth: [depth_raw(&depth[0]), depth_raw(&depth[1])],
            swapchain: 0,
            image_index: 0,
            pose: pose_to_raw(HostPose::IDENTITY),
            extent_a: 0.0,
            extent_b: 0.0,
            extent_c: 0.0,
            head_locked: 0,
            orientation: [0.0, 0.0, 0.0, 1.0],
        },
        HostLayer::Quad {
            swapchain,
            image_index,
            pose,
            size,
            head_locked,
        } => HostLayerRaw {
            kind: HostLayerKind::Quad,
            views: [empty_view, empty_view],
            depth: [empty_depth, empty_depth],
            swapchain: swapchain.0,
            image_index: *image_index,
            pose: pose_to_raw(*pose),
            extent_a: size.0,
            extent_b: size.1,
            extent_c: 0.0,
            head_locked: *head_locked as u32,
            orientation: [0.0, 0.0, 0.0, 1.0],
        },
        HostLayer::Cylinder {
            swapchain,
            image_index,
            pose,
            radius,
            central_angle,
            aspect_ratio,
        } => HostLayerRaw {
            kind: HostLayerKind::Cylinder,
            views: [empty_view, empty_view],
            depth: [empty_depth, empty_depth],
            swapchain: swapchain.0,
            image_index: *image_index,
            pose: pose_to_raw(*pose),
            extent_a: *radius,
            extent_b: *central_angle,
            extent_c: *aspect_ratio,
            head_locked: 0,
            orientation: [0.0, 0.0, 0.0, 1.0],
        },
        HostLayer::Cube {
            swapchain,
            orientation,
        } => HostLayerRaw {
            kind: HostLayerKind::Cube,
            views: [empty_view, empty_view],
            depth: [empty_depth, empty_depth],
            swapchain: swapchain.0,
            image_index: 0,
            pose: pose_to_raw(HostPose::IDENTITY),
            extent_a: 0.0,
            extent_b: 0.0,
            extent_c: 0.0,
            head_locked: 0,
            orientation: orientation.to_array(),
        },
        HostLayer::Dummy => HostLayerRaw {
            kind: HostLayerKind::Dummy,
            views: [empty_view, empty_view],
            depth: [empty_depth, empty_depth],
            swapchain: 0,
            image_index: 0,
            pose: pose_to_raw(HostPose::IDENTITY),
            extent_a: 0.0,
            extent_b: 0.0,
            extent_c: 0.0,
            head_locked: 0,
            orientation: [0.0, 0.0, 0.0, 1.0],
        },
    }
}

fn fov_to_raw(fov: Fov) -> HostFovRaw {
    HostFovRaw {
        angle_left: fov.angle_left,
        angle_right: fov.angle_right,
        angle_up: fov.angle_up,
        angle_down: fov.angle_down,
    }
}

fn fov_from_raw(raw: HostFovRaw) -> Fov {
    Fov {
        angle_left: raw.angle_left,
        angle_right: raw.angle_right,
        angle_up: raw.angle_up,
        angle_down: raw.angle_down,
    }
}

fn pose_to_raw(pose: HostPose) -> HostPoseRaw {
    HostPoseRaw {
        position: pose.position.into(),
        orientation: pose.orientation.to_array(),
    }
}

fn check(code: i32) -> HostResult<()> {
    if code == 0 {
        Ok(())
    } else {
        Err(HostError::CallFailed(code))
    }
}

/// Owns the vendor library handle and its function table. Leaked
/// deliberately: the table is `'static` for the process lifetime, same as
/// the teacher's `VRClientCoreFactory` singleton.
pub struct RealHost {
    _library: Library,
    table: &'static HostApiTable,
}

impl std::fmt::Debug for RealHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealHost").finish_non_exhaustive()
    }
}

impl RealHost {
    /// Loads the vendor shared library from `NOVAXR_HOST_LIBRARY` (falling
    /// back to [`DEFAULT_LIBRARY_NAME`] on the loader search path) and
    /// resolves [`API_TABLE_ENTRY_POINT`].
    pub fn load() -> HostResult<Self> {
        let path =
            std::env::var("NOVAXR_HOST_LIBRARY").unwrap_or_else(|_| DEFAULT_LIBRARY_NAME.to_string());
        log::info!("loading host runtime library from {path}");
        let library = unsafe { Library::new(&path) }.map_err(|e| {
            log::error!("failed to load host runtime library {path}: {e}");
            HostError::CallFailed(-1)
        })?;
        let get_table: libloading::Symbol<unsafe extern "C" fn() -> *const HostApiTable> = unsafe {
            library
                .get(API_TABLE_ENTRY_POINT.to_bytes_with_nul())
                .map_err(|e| {
                    log::error!("host runtime library missing {API_TABLE_ENTRY_POINT:?}: {e}");
                    HostError::CallFailed(-2)
                })?
        };
        let table_ptr = unsafe { get_table() };
        if table_ptr.is_null() {
            log::error!("host runtime returned a null api table");
            return Err(HostError::CallFailed(-3));
        }
        let table: &'static HostApiTable = unsafe { &*table_ptr };
        Ok(Self {
            _library: library,
            table,
        })
    }
}

impl HostRuntime for RealHost {
    fn hmd_descriptor(&self) -> HmdDescriptor {
        let mut raw = HostHmdDescriptorRaw {
            width: 0,
            height: 0,
            eye_height: 0.0,
            refresh_rate_count: 0,
            refresh_rates: std::ptr::null(),
        };
        unsafe { (self.table.hmd_descriptor)(&mut raw) };
        let rates: &'static [f32] = if raw.refresh_rates.is_null() || raw.refresh_rate_count == 0 {
            &[]
        } else {
            let slice = unsafe {
                std::slice::from_raw_parts(raw.refresh_rates, raw.refresh_rate_count as usize)
            };
            // Leaked once per call; the table only changes at process
            // start, so this does not grow unbounded in practice.
            Box::leak(slice.to_vec().into_boxed_slice())
        };
        HmdDescriptor {
            resolution: (raw.width, raw.height),
            refresh_rates: rates,
            eye_height: raw.eye_height,
        }
    }

    fn eye_render_info(&self, eye: Eye) -> EyeRenderInfo {
        let mut raw = HostEyeRenderInfoRaw {
            fov: HostFovRaw {
                angle_left: 0.0,
                angle_right: 0.0,
                angle_up: 0.0,
                angle_down: 0.0,
            },
            head_from_eye: pose_to_raw(HostPose::IDENTITY),
        };
        let eye_index = match eye {
            Eye::Left => 0,
            Eye::Right => 1,
        };
        unsafe { (self.table.eye_render_info)(eye_index, &mut raw) };
        EyeRenderInfo {
            fov: fov_from_raw(raw.fov),
            head_from_eye: pose_from_raw(raw.head_from_eye),
        }
    }

    fn now_seconds(&self) -> f64 {
        unsafe { (self.table.now_seconds)() }
    }

    fn adapter_luid(&self) -> u64 {
        unsafe { (self.table.adapter_luid)() }
    }

    fn device_pose(&self, device: DeviceIndex, time_seconds: f64) -> Option<(HostPose, HostVelocity)> {
        let (device_kind, side) = match device {
            DeviceIndex::Head => (0u32, 0u32),
            DeviceIndex::Hand(Side::Left) => (1, 0),
            DeviceIndex::Hand(Side::Right) => (1, 1),
        };
        let mut pose = HostPoseRaw {
            position: [0.0; 3],
            orientation: [0.0, 0.0, 0.0, 1.0],
        };
        let mut velocity = HostVelocityRaw::default();
        let code = unsafe {
            (self.table.device_pose)(device_kind, side, time_seconds, &mut pose, &mut velocity)
        };
        if code != 0 {
            return None;
        }
        Some((pose_from_raw(pose), velocity_from_raw(velocity)))
    }

    fn connected_controllers(&self) -> ControllerConnection {
        let mut left = 0u32;
        let mut right = 0u32;
        unsafe { (self.table.connected_controllers)(&mut left, &mut right) };
        ControllerConnection {
            left: controller_type_from_raw(left),
            right: controller_type_from_raw(right),
        }
    }

    fn input_snapshot(&self) -> InputSnapshot {
        let mut raw = HostInputSnapshotRaw {
            buttons: [0; 2],
            touches: [0; 2],
            trigger: [0.0; 2],
            grip: [0.0; 2],
            thumbstick: [[0.0; 2]; 2],
            trackpad: [[0.0; 2]; 2],
        };
        unsafe { (self.table.input_snapshot)(&mut raw) };
        InputSnapshot {
            buttons: [
                crate::ButtonMask::from_bits_truncate(raw.buttons[0]),
                crate::ButtonMask::from_bits_truncate(raw.buttons[1]),
            ],
            touches: [
                crate::ButtonMask::from_bits_truncate(raw.touches[0]),
                crate::ButtonMask::from_bits_truncate(raw.touches[1]),
            ],
            trigger: raw.trigger,
            grip: raw.grip,
            thumbstick: [
                Vector2 {
                    x: raw.thumbstick[0][0],
                    y: raw.thumbstick[0][1],
                },
                Vector2 {
                    x: raw.thumbstick[1][0],
                    y: raw.thumbstick[1][1],
                },
            ],
            trackpad: [
                Vector2 {
                    x: raw.trackpad[0][0],
                    y: raw.trackpad[0][1],
                },
                Vector2 {
                    x: raw.trackpad[1][0],
                    y: raw.trackpad[1][1],
                },
            ],
        }
    }

    fn set_vibration(&self, side: Side, frequency_hz: f32, amplitude: f32, duration_seconds: f32) {
        unsafe {
            (self.table.set_vibration)(side.index() as u32, frequency_hz, amplitude, duration_seconds)
        };
    }

    fn wait_to_begin_frame(&self, frame: crate::FrameId) -> HostResult<()> {
        check(unsafe { (self.table.wait_to_begin_frame)(frame) })
    }

    fn begin_frame(&self, frame: crate::FrameId) -> HostResult<()> {
        check(unsafe { (self.table.begin_frame)(frame) })
    }

    fn end_frame(&self, frame: crate::FrameId, layers: &[HostLayer]) -> HostResult<()> {
        let raw_layers: Vec<HostLayerRaw> = layers.iter().map(layer_to_raw).collect();
        check(unsafe { (self.table.end_frame)(frame, raw_layers.as_ptr(), raw_layers.len() as u32) })
    }

    fn predicted_display_time(&self, frame: crate::FrameId) -> f64 {
        unsafe { (self.table.predicted_display_time)(frame) }
    }

    fn ideal_frame_duration(&self) -> f64 {
        unsafe { (self.table.ideal_frame_duration)() }
    }

    fn is_reprojecting(&self) -> bool {
        unsafe { (self.table.is_reprojecting)() != 0 }
    }

    fn create_swapchain(&self, desc: SwapchainDesc) -> HostResult<HostSwapchain> {
        let raw = HostSwapchainDescRaw {
            width: desc.width,
            height: desc.height,
            format: format_to_raw(desc.format),
            is_depth: desc.is_depth as u32,
        };
        let mut handle = 0u64;
        check(unsafe { (self.table.create_swapchain)(&raw, &mut handle) })?;
        Ok(HostSwapchain(handle))
    }

    fn destroy_swapchain(&self, handle: HostSwapchain) {
        unsafe { (self.table.destroy_swapchain)(handle.0) };
    }

    fn swapchain_image_count(&self, handle: HostSwapchain) -> u32 {
        unsafe { (self.table.swapchain_image_count)(handle.0) }
    }

    fn swapchain_textures(&self, handle: HostSwapchain) -> Vec<RawHandle> {
        let capacity = self.swapchain_image_count(handle);
        let mut buf = vec![0u64; capacity as usize];
        let written =
            unsafe { (self.table.swapchain_textures)(handle.0, buf.as_mut_ptr(), capacity) };
        buf.truncate(written as usize);
        buf.into_iter().map(RawHandle).collect()
    }

    fn swapchain_acquire(&self, handle: HostSwapchain) -> u32 {
        unsafe { (self.table.swapchain_acquire)(handle.0) }
    }

    fn swapchain_wait(&self, handle: HostSwapchain, timeout_seconds: f32) -> bool {
        unsafe { (self.table.swapchain_wait)(handle.0, timeout_seconds) != 0 }
    }

    fn swapchain_release(&self, handle: HostSwapchain) {
        unsafe { (self.table.swapchain_release)(handle.0) };
    }

    fn swapchain_commit(&self, handle: HostSwapchain) {
        unsafe { (self.table.swapchain_commit)(handle.0) };
    }
}

// SAFETY: the vendor table's functions are documented (by the vendor ABI
// this mirrors) as safe to call from any thread; `Library` itself is Send.
unsafe impl Send for RealHost {}
unsafe impl Sync for RealHost {}
