//! The C ABI surface: every `#[no_mangle] extern "C" fn xr*` the loader can
//! resolve through `xrGetInstanceProcAddr`, plus the big name-to-pointer
//! match that function itself is.
//!
//! Each entry point here does argument marshalling only -- validating
//! struct-type tags, converting C strings, walking `next` chains, resolving
//! handles through `crate::runtime::REGISTRY` -- and calls straight through
//! to the type that actually owns the behavior (`Instance`, `SpaceGraph`,
//! `Swapchain`, `InputState`, `FrameLifecycle`). Grounded on how
//! `pimax-openxr`'s `dispatch.cpp` and `virtualdesktop-openxr`'s
//! `runtime.h` split the same two concerns: a thin per-function ABI
//! wrapper, and a singleton dispatcher the wrapper forwards into.

use crate::errors::{RtError, RtResult};
use crate::graphics::GraphicsBinding;
use crate::instance::{ApplicationIdentity, Instance, ENABLED_EXTENSIONS};
use crate::runtime::{RuntimeInstance, Session, REGISTRY};
use crate::{cstr_to_string, result_to_code};
use hostapi::sys::RealHost;
use hostapi::{DeviceIndex, Eye, HostRuntime, Side};
use openxr_sys as xr;
use std::ffi::{c_char, c_void, CString};
use std::sync::Arc;

const RUNTIME_NAME: &str = "NovaXR";

// ---------------------------------------------------------------------
// next-chain walking
// ---------------------------------------------------------------------

unsafe fn find_in_chain<T>(next: *const xr::BaseInStructure, wanted: xr::StructureType) -> Option<*const T> {
    let mut cursor = next;
    while !cursor.is_null() {
        let header = unsafe { &*cursor };
        if header.ty == wanted {
            return Some(cursor as *const T);
        }
        cursor = header.next;
    }
    None
}

/// Walks `info`'s `next` chain looking for one of the graphics binding
/// structs `xrCreateSession` accepts, per the enabled-extension list in
/// `instance.rs`. Exactly one must be present; more than one is a
/// validation error the real loader would also reject upstream of us.
fn graphics_binding_from_create_info(info: &xr::SessionCreateInfo) -> RtResult<GraphicsBinding> {
    let next = info.next as *const xr::BaseInStructure;

    #[cfg(windows)]
    unsafe {
        if let Some(binding) = find_in_chain::<xr::GraphicsBindingD3D11KHR>(next, xr::StructureType::GRAPHICS_BINDING_D3D11_KHR) {
            let binding = &*binding;
            let device = windows::core::Interface::from_raw_borrowed(&binding.device)
                .ok_or(RtError::ValidationFailure)?
                .clone();
            return Ok(GraphicsBinding::D3D11(crate::graphics::d3d11::D3D11Binding::from_device(device)?));
        }
        if let Some(binding) = find_in_chain::<xr::GraphicsBindingD3D12KHR>(next, xr::StructureType::GRAPHICS_BINDING_D3D12_KHR) {
            let binding = &*binding;
            let device = windows::core::Interface::from_raw_borrowed(&binding.device)
                .ok_or(RtError::ValidationFailure)?
                .clone();
            let queue = windows::core::Interface::from_raw_borrowed(&binding.queue)
                .ok_or(RtError::ValidationFailure)?
                .clone();
            return Ok(GraphicsBinding::D3D12(crate::graphics::d3d12::D3D12Binding::from_device(device, queue)?));
        }
    }

    unsafe {
        if let Some(binding) = find_in_chain::<xr::GraphicsBindingVulkanKHR>(next, xr::StructureType::GRAPHICS_BINDING_VULKAN_KHR) {
            let binding = &*binding;
            // The app links its own Vulkan loader; we re-wrap its handles
            // rather than creating a second `VkInstance`. `Entry::linked()`
            // assumes this cdylib is linked against the same `vulkan-1`/
            // `libvulkan.so` the app is, true for every desktop OpenXR
            // runtime that speaks Vulkan directly rather than over IPC.
            let entry = ash::Entry::linked();
            let instance = ash::Instance::load(
                entry.static_fn(),
                ash::vk::Instance::from_raw(binding.instance as u64),
            );
            let device = ash::Device::load(
                instance.fp_v1_0(),
                ash::vk::Device::from_raw(binding.device as u64),
            );
            let physical_device = ash::vk::PhysicalDevice::from_raw(binding.physical_device as u64);
            return Ok(GraphicsBinding::Vulkan(
                crate::graphics::vulkan::VulkanBinding::from_session_create_info(
                    instance,
                    physical_device,
                    device,
                    binding.queue_family_index,
                    binding.queue_index,
                ),
            ));
        }
    }

    // OpenGL bindings vary per windowing system (Win32/Xlib/Wayland) and
    // carry window-handle fields we don't model precisely; any of them
    // being present is enough to accept a GL session.
    unsafe {
        const GL_TYPES: &[xr::StructureType] = &[
            xr::StructureType::GRAPHICS_BINDING_OPENGL_WIN32_KHR,
            xr::StructureType::GRAPHICS_BINDING_OPENGL_XLIB_KHR,
            xr::StructureType::GRAPHICS_BINDING_OPENGL_WAYLAND_KHR,
        ];
        for ty in GL_TYPES {
            if find_in_chain::<xr::BaseInStructure>(next, *ty).is_some() {
                return Ok(GraphicsBinding::OpenGl(crate::graphics::gl::GlBinding {
                    context_initialized: true,
                }));
            }
        }
    }

    Err(RtError::GraphicsDeviceInvalid)
}

// ---------------------------------------------------------------------
// Instance / System
// ---------------------------------------------------------------------

/// # Safety
/// `property_capacity_input`/`property_count_output`/`properties` must
/// follow the two-call enumeration pattern every OpenXR enumerate
/// function does.
#[no_mangle]
pub unsafe extern "C" fn xrEnumerateInstanceExtensionProperties(
    _layer_name: *const c_char,
    property_capacity_input: u32,
    property_count_output: *mut u32,
    properties: *mut xr::ExtensionProperties,
) -> xr::Result {
    result_to_code((|| {
        if property_count_output.is_null() {
            return Err(RtError::ValidationFailure);
        }
        unsafe { *property_count_output = ENABLED_EXTENSIONS.len() as u32 };
        if property_capacity_input == 0 {
            return Ok(());
        }
        if property_capacity_input < ENABLED_EXTENSIONS.len() as u32 {
            return Err(RtError::SizeInsufficient);
        }
        let out = unsafe { std::slice::from_raw_parts_mut(properties, ENABLED_EXTENSIONS.len()) };
        for (slot, name) in out.iter_mut().zip(ENABLED_EXTENSIONS) {
            slot.ty = xr::ExtensionProperties::TYPE;
            slot.next = std::ptr::null_mut();
            write_fixed_string(&mut slot.extension_name, name);
            slot.extension_version = 1;
        }
        Ok(())
    })())
}

fn write_fixed_string<const N: usize>(dest: &mut [c_char; N], value: &str) {
    let bytes = value.as_bytes();
    let len = bytes.len().min(N - 1);
    for (slot, byte) in dest.iter_mut().zip(bytes[..len].iter()) {
        *slot = *byte as c_char;
    }
    dest[len] = 0;
}

/// # Safety
/// `info` must point to a valid `XrInstanceCreateInfo`; `instance` must be
/// writable.
#[no_mangle]
pub unsafe extern "C" fn xrCreateInstance(info: *const xr::InstanceCreateInfo, instance: *mut xr::Instance) -> xr::Result {
    result_to_code((|| {
        let info = unsafe { info.as_ref() }.ok_or(RtError::ValidationFailure)?;
        let instance_out = unsafe { instance.as_mut() }.ok_or(RtError::ValidationFailure)?;

        let app_info = &info.application_info;
        let application = ApplicationIdentity {
            name: cchars_to_string(&app_info.application_name)?,
            engine_name: cchars_to_string(&app_info.engine_name)?,
        };

        let requested_extensions = unsafe {
            std::slice::from_raw_parts(
                info.enabled_extension_names,
                info.enabled_extension_count as usize,
            )
        }
        .iter()
        .map(|ptr| cstr_to_string(*ptr))
        .collect::<RtResult<Vec<_>>>()?;

        let host = Arc::new(RealHost::load().map_err(RtError::from)?);
        let inner = Instance::new(host, application, &requested_extensions)?;
        let runtime_instance = RuntimeInstance::new(inner);
        *instance_out = REGISTRY.insert(runtime_instance);
        Ok(())
    })())
}

/// # Safety
/// `instance` must be a handle previously returned by `xrCreateInstance`
/// and not yet destroyed.
#[no_mangle]
pub unsafe extern "C" fn xrDestroyInstance(instance: xr::Instance) -> xr::Result {
    result_to_code(REGISTRY.remove(instance))
}

/// # Safety
/// `properties` must point to a writable, correctly-typed struct.
#[no_mangle]
pub unsafe extern "C" fn xrGetInstanceProperties(instance: xr::Instance, properties: *mut xr::InstanceProperties) -> xr::Result {
    result_to_code((|| {
        let _ = REGISTRY.get(instance)?;
        let properties = unsafe { properties.as_mut() }.ok_or(RtError::ValidationFailure)?;
        properties.ty = xr::InstanceProperties::TYPE;
        properties.runtime_version = xr::Version::new(0, 1, 0);
        write_fixed_string(&mut properties.runtime_name, RUNTIME_NAME);
        Ok(())
    })())
}

/// # Safety
/// `event_data` must point to a writable `XrEventDataBuffer`.
#[no_mangle]
pub unsafe extern "C" fn xrPollEvent(instance: xr::Instance, event_data: *mut xr::EventDataBuffer) -> xr::Result {
    let Ok(runtime) = REGISTRY.get(instance) else {
        return xr::Result::ERROR_HANDLE_INVALID;
    };
    let Some(event_data) = (unsafe { event_data.as_mut() }) else {
        return xr::Result::ERROR_VALIDATION_FAILURE;
    };
    match runtime.instance.events.poll() {
        Some(event) => {
            crate::events::write_event(&event, event_data);
            xr::Result::SUCCESS
        }
        None => xr::Result::EVENT_UNAVAILABLE,
    }
}

#[no_mangle]
pub extern "C" fn xrResultToString(
    _instance: xr::Instance,
    value: xr::Result,
    buffer: *mut [c_char; xr::MAX_RESULT_STRING_SIZE],
) -> xr::Result {
    let Some(buffer) = (unsafe { buffer.as_mut() }) else {
        return xr::Result::ERROR_VALIDATION_FAILURE;
    };
    write_fixed_string(buffer, &format!("{value:?}"));
    xr::Result::SUCCESS
}

#[no_mangle]
pub extern "C" fn xrStructureTypeToString(
    _instance: xr::Instance,
    value: xr::StructureType,
    buffer: *mut [c_char; xr::MAX_STRUCTURE_NAME_SIZE],
) -> xr::Result {
    let Some(buffer) = (unsafe { buffer.as_mut() }) else {
        return xr::Result::ERROR_VALIDATION_FAILURE;
    };
    write_fixed_string(buffer, &format!("{value:?}"));
    xr::Result::SUCCESS
}

/// # Safety
/// `path_string` must be a valid, NUL-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn xrStringToPath(instance: xr::Instance, path_string: *const c_char, path: *mut xr::Path) -> xr::Result {
    result_to_code((|| {
        let runtime = REGISTRY.get(instance)?;
        let path_out = unsafe { path.as_mut() }.ok_or(RtError::ValidationFailure)?;
        let string = cstr_to_string(path_string)?;
        *path_out = runtime.instance.paths.string_to_path(&string)?;
        Ok(())
    })())
}

/// # Safety
/// Follows the standard two-call enumeration pattern for `buffer`.
#[no_mangle]
pub unsafe extern "C" fn xrPathToString(
    instance: xr::Instance,
    path: xr::Path,
    buffer_capacity_input: u32,
    buffer_count_output: *mut u32,
    buffer: *mut c_char,
) -> xr::Result {
    result_to_code((|| {
        let runtime = REGISTRY.get(instance)?;
        let string = runtime.instance.paths.path_to_string(path)?;
        write_enumerated_string(&string, buffer_capacity_input, buffer_count_output, buffer)
    })())
}

fn write_enumerated_string(
    value: &str,
    capacity_input: u32,
    count_output: *mut u32,
    buffer: *mut c_char,
) -> RtResult<()> {
    if count_output.is_null() {
        return Err(RtError::ValidationFailure);
    }
    let needed = value.len() + 1;
    unsafe { *count_output = needed as u32 };
    if capacity_input == 0 {
        return Ok(());
    }
    if (capacity_input as usize) < needed {
        return Err(RtError::SizeInsufficient);
    }
    let out = unsafe { std::slice::from_raw_parts_mut(buffer, needed) };
    for (slot, byte) in out.iter_mut().zip(value.as_bytes()) {
        *slot = *byte as c_char;
    }
    out[value.len()] = 0;
    Ok(())
}

fn cchars_to_string(chars: &[c_char]) -> RtResult<String> {
    let bytes: Vec<u8> = chars
        .iter()
        .take_while(|c| **c != 0)
        .map(|c| *c as u8)
        .collect();
    String::from_utf8(bytes).map_err(|_| RtError::ValidationFailure)
}

/// # Safety
/// `get_info`/`system_id` must point to valid, correctly-typed memory.
#[no_mangle]
pub unsafe extern "C" fn xrGetSystem(instance: xr::Instance, get_info: *const xr::SystemGetInfo, system_id: *mut xr::SystemId) -> xr::Result {
    result_to_code((|| {
        let runtime = REGISTRY.get(instance)?;
        let get_info = unsafe { get_info.as_ref() }.ok_or(RtError::ValidationFailure)?;
        if get_info.form_factor != xr::FormFactor::HEAD_MOUNTED_DISPLAY {
            return Err(RtError::ValidationFailure);
        }
        let system_id_out = unsafe { system_id.as_mut() }.ok_or(RtError::ValidationFailure)?;
        *system_id_out = xr::SystemId::from_raw(runtime.instance.get_system()?);
        Ok(())
    })())
}

/// # Safety
/// `properties` must point to a writable, correctly-typed struct.
#[no_mangle]
pub unsafe extern "C" fn xrGetSystemProperties(
    instance: xr::Instance,
    system_id: xr::SystemId,
    properties: *mut xr::SystemProperties,
) -> xr::Result {
    result_to_code((|| {
        let runtime = REGISTRY.get(instance)?;
        runtime.instance.check_system(system_id.into_raw())?;
        let properties = unsafe { properties.as_mut() }.ok_or(RtError::ValidationFailure)?;
        let info = runtime.instance.system_properties();
        properties.ty = xr::SystemProperties::TYPE;
        properties.system_id = system_id;
        properties.vendor_id = info.vendor_id;
        write_fixed_string(&mut properties.system_name, info.system_name.to_str().unwrap_or(""));
        properties.graphics_properties.max_swapchain_image_width = info.descriptor.resolution.0;
        properties.graphics_properties.max_swapchain_image_height = info.descriptor.resolution.1;
        properties.graphics_properties.max_layer_count = xr::MAX_COMPOSITION_LAYERS_RECOMMENDED;
        properties.tracking_properties.orientation_tracking = xr::TRUE;
        properties.tracking_properties.position_tracking = xr::TRUE;
        Ok(())
    })())
}

/// # Safety
/// Follows the standard two-call enumeration pattern for `view_configuration_types`.
#[no_mangle]
pub unsafe extern "C" fn xrEnumerateViewConfigurations(
    instance: xr::Instance,
    system_id: xr::SystemId,
    capacity_input: u32,
    count_output: *mut u32,
    view_configuration_types: *mut xr::ViewConfigurationType,
) -> xr::Result {
    result_to_code((|| {
        let runtime = REGISTRY.get(instance)?;
        runtime.instance.check_system(system_id.into_raw())?;
        write_enumerated_array(
            &[xr::ViewConfigurationType::PRIMARY_STEREO],
            capacity_input,
            count_output,
            view_configuration_types,
        )
    })())
}

/// Two-call enumeration pattern for a single NUL-terminated, space-separated
/// string, as `xrGetVulkan{Instance,Device}ExtensionsKHR` return their
/// extension lists.
fn write_c_string(value: &str, capacity_input: u32, count_output: *mut u32, out: *mut c_char) -> RtResult<()> {
    if count_output.is_null() {
        return Err(RtError::ValidationFailure);
    }
    let required = value.len() + 1;
    unsafe { *count_output = required as u32 };
    if capacity_input == 0 {
        return Ok(());
    }
    if (capacity_input as usize) < required {
        return Err(RtError::SizeInsufficient);
    }
    let slice = unsafe { std::slice::from_raw_parts_mut(out, required) };
    for (slot, byte) in slice.iter_mut().zip(value.as_bytes().iter()) {
        *slot = *byte as c_char;
    }
    slice[value.len()] = 0;
    Ok(())
}

fn write_enumerated_array<T: Copy>(values: &[T], capacity_input: u32, count_output: *mut u32, out: *mut T) -> RtResult<()> {
    if count_output.is_null() {
        return Err(RtError::ValidationFailure);
    }
    unsafe { *count_output = values.len() as u32 };
    if capacity_input == 0 {
        return Ok(());
    }
    if (capacity_input as usize) < values.len() {
        return Err(RtError::SizeInsufficient);
    }
    let slice = unsafe { std::slice::from_raw_parts_mut(out, values.len()) };
    slice.copy_from_slice(values);
    Ok(())
}

/// # Safety
/// Follows the standard two-call enumeration pattern for `views`.
#[no_mangle]
pub unsafe extern "C" fn xrEnumerateViewConfigurationViews(
    instance: xr::Instance,
    system_id: xr::SystemId,
    view_configuration_type: xr::ViewConfigurationType,
    capacity_input: u32,
    count_output: *mut u32,
    views: *mut xr::ViewConfigurationView,
) -> xr::Result {
    result_to_code((|| {
        let runtime = REGISTRY.get(instance)?;
        runtime.instance.check_system(system_id.into_raw())?;
        if view_configuration_type != xr::ViewConfigurationType::PRIMARY_STEREO {
            return Err(RtError::ValidationFailure);
        }
        let descriptor = runtime.instance.host.hmd_descriptor();
        let mut view = xr::ViewConfigurationView {
            ty: xr::ViewConfigurationView::TYPE,
            next: std::ptr::null_mut(),
            recommended_image_rect_width: descriptor.resolution.0,
            max_image_rect_width: descriptor.resolution.0,
            recommended_image_rect_height: descriptor.resolution.1,
            max_image_rect_height: descriptor.resolution.1,
            recommended_swapchain_sample_count: 1,
            max_swapchain_sample_count: 4,
        };
        if capacity_input == 0 {
            unsafe { *count_output = 2 };
            return Ok(());
        }
        if capacity_input < 2 {
            return Err(RtError::SizeInsufficient);
        }
        unsafe { *count_output = 2 };
        let slice = unsafe { std::slice::from_raw_parts_mut(views, 2) };
        view.ty = xr::ViewConfigurationView::TYPE;
        slice[0] = view;
        slice[1] = view;
        Ok(())
    })())
}

/// # Safety
/// Follows the standard two-call enumeration pattern for `environment_blend_modes`.
#[no_mangle]
pub unsafe extern "C" fn xrEnumerateEnvironmentBlendModes(
    instance: xr::Instance,
    system_id: xr::SystemId,
    view_configuration_type: xr::ViewConfigurationType,
    capacity_input: u32,
    count_output: *mut u32,
    environment_blend_modes: *mut xr::EnvironmentBlendMode,
) -> xr::Result {
    result_to_code((|| {
        let runtime = REGISTRY.get(instance)?;
        runtime.instance.check_system(system_id.into_raw())?;
        if view_configuration_type != xr::ViewConfigurationType::PRIMARY_STEREO {
            return Err(RtError::ValidationFailure);
        }
        write_enumerated_array(
            &[xr::EnvironmentBlendMode::OPAQUE],
            capacity_input,
            count_output,
            environment_blend_modes,
        )
    })())
}

// ---------------------------------------------------------------------
// Graphics-requirements handshake
//
// Every `XR_KHR_*_enable` extension requires its `xrGet*GraphicsRequirements`
// call before `xrCreateSession` per the spec's ordering rule; `instance.rs`
// enables all four bindings, so all four handshakes are wired here. Each
// just marks the per-instance flag `xrCreateSession` checks (spec.md §4.4,
// §7 "GRAPHICS_REQUIREMENTS_CALL_MISSING").
// ---------------------------------------------------------------------

/// # Safety
/// `graphics_requirements` must point to writable, correctly-sized memory.
#[cfg(windows)]
#[no_mangle]
pub unsafe extern "C" fn xrGetD3D11GraphicsRequirementsKHR(
    instance: xr::Instance,
    system_id: xr::SystemId,
    graphics_requirements: *mut xr::GraphicsRequirementsD3D11KHR,
) -> xr::Result {
    result_to_code((|| {
        let runtime = REGISTRY.get(instance)?;
        runtime.instance.check_system(system_id.into_raw())?;
        let out = unsafe { graphics_requirements.as_mut() }.ok_or(RtError::ValidationFailure)?;
        out.ty = xr::GraphicsRequirementsD3D11KHR::TYPE;
        let luid = runtime.instance.host.adapter_luid();
        out.adapter_luid = xr::LUID {
            low_part: luid as u32,
            high_part: (luid >> 32) as i32,
        };
        out.min_feature_level = 0xb000; // D3D_FEATURE_LEVEL_11_0
        runtime.instance.mark_graphics_requirements_queried();
        Ok(())
    })())
}

/// # Safety
/// `graphics_requirements` must point to writable, correctly-sized memory.
#[cfg(windows)]
#[no_mangle]
pub unsafe extern "C" fn xrGetD3D12GraphicsRequirementsKHR(
    instance: xr::Instance,
    system_id: xr::SystemId,
    graphics_requirements: *mut xr::GraphicsRequirementsD3D12KHR,
) -> xr::Result {
    result_to_code((|| {
        let runtime = REGISTRY.get(instance)?;
        runtime.instance.check_system(system_id.into_raw())?;
        let out = unsafe { graphics_requirements.as_mut() }.ok_or(RtError::ValidationFailure)?;
        out.ty = xr::GraphicsRequirementsD3D12KHR::TYPE;
        let luid = runtime.instance.host.adapter_luid();
        out.adapter_luid = xr::LUID {
            low_part: luid as u32,
            high_part: (luid >> 32) as i32,
        };
        out.min_feature_level = 0xb000; // D3D_FEATURE_LEVEL_11_0
        runtime.instance.mark_graphics_requirements_queried();
        Ok(())
    })())
}

/// # Safety
/// `graphics_requirements` must point to writable, correctly-sized memory.
#[no_mangle]
pub unsafe extern "C" fn xrGetOpenGLGraphicsRequirementsKHR(
    instance: xr::Instance,
    system_id: xr::SystemId,
    graphics_requirements: *mut xr::GraphicsRequirementsOpenGLKHR,
) -> xr::Result {
    result_to_code((|| {
        let runtime = REGISTRY.get(instance)?;
        runtime.instance.check_system(system_id.into_raw())?;
        let out = unsafe { graphics_requirements.as_mut() }.ok_or(RtError::ValidationFailure)?;
        out.ty = xr::GraphicsRequirementsOpenGLKHR::TYPE;
        out.min_api_version_supported = xr::Version::new(4, 3, 0);
        out.max_api_version_supported = xr::Version::new(4, 6, 0);
        runtime.instance.mark_graphics_requirements_queried();
        Ok(())
    })())
}

/// # Safety
/// `graphics_requirements` must point to writable, correctly-sized memory.
#[no_mangle]
pub unsafe extern "C" fn xrGetVulkanGraphicsRequirementsKHR(
    instance: xr::Instance,
    system_id: xr::SystemId,
    graphics_requirements: *mut xr::GraphicsRequirementsVulkanKHR,
) -> xr::Result {
    result_to_code((|| {
        let runtime = REGISTRY.get(instance)?;
        runtime.instance.check_system(system_id.into_raw())?;
        let out = unsafe { graphics_requirements.as_mut() }.ok_or(RtError::ValidationFailure)?;
        out.ty = xr::GraphicsRequirementsVulkanKHR::TYPE;
        out.min_api_version_supported = xr::Version::new(1, 0, 0);
        out.max_api_version_supported = xr::Version::new(1, 3, 0);
        runtime.instance.mark_graphics_requirements_queried();
        Ok(())
    })())
}

/// # Safety
/// `graphics_requirements` must point to writable, correctly-sized memory.
#[no_mangle]
pub unsafe extern "C" fn xrGetVulkanGraphicsRequirements2KHR(
    instance: xr::Instance,
    system_id: xr::SystemId,
    graphics_requirements: *mut xr::GraphicsRequirementsVulkanKHR,
) -> xr::Result {
    unsafe { xrGetVulkanGraphicsRequirementsKHR(instance, system_id, graphics_requirements) }
}

/// # Safety
/// `buffer`/`buffer_count_output` follow the usual two-call enumeration
/// pattern; `buffer` may be null when probing for the required capacity.
#[no_mangle]
pub unsafe extern "C" fn xrGetVulkanInstanceExtensionsKHR(
    instance: xr::Instance,
    system_id: xr::SystemId,
    buffer_capacity_input: u32,
    buffer_count_output: *mut u32,
    buffer: *mut c_char,
) -> xr::Result {
    result_to_code((|| {
        let runtime = REGISTRY.get(instance)?;
        runtime.instance.check_system(system_id.into_raw())?;
        write_c_string(
            "VK_KHR_external_memory_capabilities VK_KHR_external_semaphore_capabilities",
            buffer_capacity_input,
            buffer_count_output,
            buffer,
        )
    })())
}

/// # Safety
/// `buffer`/`buffer_count_output` follow the usual two-call enumeration
/// pattern; `buffer` may be null when probing for the required capacity.
#[no_mangle]
pub unsafe extern "C" fn xrGetVulkanDeviceExtensionsKHR(
    instance: xr::Instance,
    system_id: xr::SystemId,
    buffer_capacity_input: u32,
    buffer_count_output: *mut u32,
    buffer: *mut c_char,
) -> xr::Result {
    result_to_code((|| {
        let runtime = REGISTRY.get(instance)?;
        runtime.instance.check_system(system_id.into_raw())?;
        write_c_string(
            "VK_KHR_external_memory VK_KHR_external_memory_fd VK_KHR_external_semaphore VK_KHR_external_semaphore_fd VK_KHR_timeline_semaphore",
            buffer_capacity_input,
            buffer_count_output,
            buffer,
        )
    })())
}

/// # Safety
/// `vk_physical_device` must be writable.
#[no_mangle]
pub unsafe extern "C" fn xrGetVulkanGraphicsDeviceKHR(
    instance: xr::Instance,
    system_id: xr::SystemId,
    _vk_instance: *mut c_void,
    vk_physical_device: *mut *mut c_void,
) -> xr::Result {
    result_to_code((|| {
        let runtime = REGISTRY.get(instance)?;
        runtime.instance.check_system(system_id.into_raw())?;
        let out = unsafe { vk_physical_device.as_mut() }.ok_or(RtError::ValidationFailure)?;
        // The host compositor doesn't expose a physical-device handle of
        // its own on this platform; the app's already-selected device is
        // accepted as-is and checked for adapter match at `xrCreateSession`.
        *out = std::ptr::null_mut();
        Ok(())
    })())
}

/// # Safety
/// `create_info`/`vk_physical_device` must point to valid memory.
#[no_mangle]
pub unsafe extern "C" fn xrGetVulkanGraphicsDevice2KHR(
    instance: xr::Instance,
    create_info: *const xr::VulkanGraphicsDeviceGetInfoKHR,
    vk_physical_device: *mut *mut c_void,
) -> xr::Result {
    let info = unsafe { create_info.as_ref() };
    let system_id = match info {
        Some(info) => info.system_id,
        None => return xr::Result::ERROR_VALIDATION_FAILURE,
    };
    unsafe { xrGetVulkanGraphicsDeviceKHR(instance, system_id, std::ptr::null_mut(), vk_physical_device) }
}

/// # Safety
/// `performance_counter`/`time` must point to valid memory.
#[cfg(windows)]
#[no_mangle]
pub unsafe extern "C" fn xrConvertWin32PerformanceCounterToTimeKHR(
    instance: xr::Instance,
    performance_counter: *const i64,
    time: *mut xr::Time,
) -> xr::Result {
    result_to_code((|| {
        let runtime = REGISTRY.get(instance)?;
        let ticks = unsafe { performance_counter.as_ref() }.ok_or(RtError::ValidationFailure)?;
        let time_out = unsafe { time.as_mut() }.ok_or(RtError::ValidationFailure)?;
        *time_out = runtime.instance.time_base.perf_counter_to_time(*ticks, 10_000_000);
        Ok(())
    })())
}

/// # Safety
/// `performance_counter` must point to writable memory.
#[cfg(windows)]
#[no_mangle]
pub unsafe extern "C" fn xrConvertTimeToWin32PerformanceCounterKHR(
    instance: xr::Instance,
    time: xr::Time,
    performance_counter: *mut i64,
) -> xr::Result {
    result_to_code((|| {
        let runtime = REGISTRY.get(instance)?;
        let out = unsafe { performance_counter.as_mut() }.ok_or(RtError::ValidationFailure)?;
        *out = runtime.instance.time_base.time_to_perf_counter(time, 10_000_000);
        Ok(())
    })())
}

// ---------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------

/// # Safety
/// `info`/`session` must point to valid, correctly-typed memory.
#[no_mangle]
pub unsafe extern "C" fn xrCreateSession(instance: xr::Instance, info: *const xr::SessionCreateInfo, session: *mut xr::Session) -> xr::Result {
    result_to_code((|| {
        let runtime = REGISTRY.get(instance)?;
        let info = unsafe { info.as_ref() }.ok_or(RtError::ValidationFailure)?;
        runtime.instance.check_system(info.system_id.into_raw())?;
        runtime.instance.check_graphics_requirements_queried()?;
        let session_out = unsafe { session.as_mut() }.ok_or(RtError::ValidationFailure)?;

        let graphics = graphics_binding_from_create_info(info)?;
        if !graphics.matches_host_adapter(runtime.instance.host.adapter_luid()) {
            return Err(RtError::GraphicsDeviceInvalid);
        }
        let session_obj = Session::new(graphics, Arc::clone(&runtime.instance.host), false)?;
        session_obj.lifecycle.ready_after_create();
        *session_out = runtime.insert_session(session_obj);

        runtime.instance.events.push(crate::events::Event::SessionStateChanged {
            session: *session_out,
            state: xr::SessionState::READY,
            time: runtime.instance.time_base.now(),
        });
        Ok(())
    })())
}

/// # Safety
/// `session` must be a live handle.
#[no_mangle]
pub unsafe extern "C" fn xrDestroySession(session: xr::Session) -> xr::Result {
    result_to_code((|| {
        let (runtime, _session) = REGISTRY.find_by_session(session)?;
        runtime.remove_session(session)
    })())
}

/// # Safety
/// `begin_info` must point to valid memory.
#[no_mangle]
pub unsafe extern "C" fn xrBeginSession(session: xr::Session, _begin_info: *const xr::SessionBeginInfo) -> xr::Result {
    result_to_code((|| {
        let (runtime, session_obj) = REGISTRY.find_by_session(session)?;
        session_obj.lifecycle.begin()?;
        runtime.instance.events.push(crate::events::Event::SessionStateChanged {
            session,
            state: xr::SessionState::SYNCHRONIZED,
            time: runtime.instance.time_base.now(),
        });
        Ok(())
    })())
}

#[no_mangle]
pub extern "C" fn xrEndSession(session: xr::Session) -> xr::Result {
    result_to_code((|| {
        let (runtime, session_obj) = REGISTRY.find_by_session(session)?;
        session_obj.lifecycle.end()?;
        runtime.instance.events.push(crate::events::Event::SessionStateChanged {
            session,
            state: xr::SessionState::IDLE,
            time: runtime.instance.time_base.now(),
        });
        Ok(())
    })())
}

#[no_mangle]
pub extern "C" fn xrRequestExitSession(session: xr::Session) -> xr::Result {
    result_to_code((|| {
        let (runtime, session_obj) = REGISTRY.find_by_session(session)?;
        session_obj.lifecycle.request_exit()?;
        runtime.instance.events.push(crate::events::Event::SessionStateChanged {
            session,
            state: xr::SessionState::STOPPING,
            time: runtime.instance.time_base.now(),
        });
        Ok(())
    })())
}

// ---------------------------------------------------------------------
// Spaces
// ---------------------------------------------------------------------

/// # Safety
/// Follows the standard two-call enumeration pattern for `spaces`.
#[no_mangle]
pub unsafe extern "C" fn xrEnumerateReferenceSpaces(
    session: xr::Session,
    capacity_input: u32,
    count_output: *mut u32,
    spaces: *mut xr::ReferenceSpaceType,
) -> xr::Result {
    result_to_code((|| {
        let (_runtime, _session) = REGISTRY.find_by_session(session)?;
        write_enumerated_array(
            &[
                xr::ReferenceSpaceType::VIEW,
                xr::ReferenceSpaceType::LOCAL,
                xr::ReferenceSpaceType::STAGE,
            ],
            capacity_input,
            count_output,
            spaces,
        )
    })())
}

/// # Safety
/// `info`/`space` must point to valid, correctly-typed memory.
#[no_mangle]
pub unsafe extern "C" fn xrCreateReferenceSpace(session: xr::Session, info: *const xr::ReferenceSpaceCreateInfo, space: *mut xr::Space) -> xr::Result {
    result_to_code((|| {
        let (runtime, _session) = REGISTRY.find_by_session(session)?;
        let info = unsafe { info.as_ref() }.ok_or(RtError::ValidationFailure)?;
        let space_out = unsafe { space.as_mut() }.ok_or(RtError::ValidationFailure)?;
        let kind = crate::spaces::ReferenceSpaceKind::from_xr(info.reference_space_type)?;
        if kind == crate::spaces::ReferenceSpaceKind::Stage {
            runtime.spaces.infer_floor_height(runtime.instance.host.as_ref(), &runtime.instance.time_base);
        }
        let key = runtime.spaces.create_reference_space(kind, crate::pose::Pose::from_xr(info.pose_in_reference_space));
        *space_out = <crate::spaces::SpaceKey as crate::handle::XrHandle>::to_raw(key);
        Ok(())
    })())
}

/// # Safety
/// `info`/`space` must point to valid, correctly-typed memory.
#[no_mangle]
pub unsafe extern "C" fn xrCreateActionSpace(session: xr::Session, info: *const xr::ActionSpaceCreateInfo, space: *mut xr::Space) -> xr::Result {
    result_to_code((|| {
        let (runtime, _session) = REGISTRY.find_by_session(session)?;
        let info = unsafe { info.as_ref() }.ok_or(RtError::ValidationFailure)?;
        let space_out = unsafe { space.as_mut() }.ok_or(RtError::ValidationFailure)?;

        let device = action_subaction_device(info.subaction_path, &runtime)?;
        let key = runtime
            .spaces
            .create_action_space(device, crate::pose::Pose::from_xr(info.pose_in_action_space));
        *space_out = <crate::spaces::SpaceKey as crate::handle::XrHandle>::to_raw(key);
        Ok(())
    })())
}

fn action_subaction_device(subaction_path: xr::Path, runtime: &RuntimeInstance) -> RtResult<DeviceIndex> {
    if subaction_path == xr::Path::NULL {
        return Ok(DeviceIndex::Head);
    }
    let path = runtime.instance.paths.path_to_string(subaction_path)?;
    match path.as_str() {
        "/user/hand/left" => Ok(DeviceIndex::Hand(Side::Left)),
        "/user/hand/right" => Ok(DeviceIndex::Hand(Side::Right)),
        "/user/head" => Ok(DeviceIndex::Head),
        _ => Err(RtError::PathUnsupported),
    }
}

#[no_mangle]
pub extern "C" fn xrDestroySpace(space: xr::Space) -> xr::Result {
    result_to_code((|| {
        let runtime = REGISTRY.find_by_space(space)?;
        let key = <crate::spaces::SpaceKey as crate::handle::XrHandle>::from_raw(space);
        runtime.spaces.destroy_space(key);
        Ok(())
    })())
}

/// # Safety
/// `location` must point to a writable, correctly-typed struct.
#[no_mangle]
pub unsafe extern "C" fn xrLocateSpace(space: xr::Space, base_space: xr::Space, time: xr::Time, location: *mut xr::SpaceLocation) -> xr::Result {
    result_to_code((|| {
        let runtime = REGISTRY.find_by_space(space)?;
        let location = unsafe { location.as_mut() }.ok_or(RtError::ValidationFailure)?;
        let space_key = <crate::spaces::SpaceKey as crate::handle::XrHandle>::from_raw(space);
        let base_key = <crate::spaces::SpaceKey as crate::handle::XrHandle>::from_raw(base_space);
        let (pose, _velocity, valid) = runtime.spaces.locate_space(
            space_key,
            base_key,
            time,
            runtime.instance.host.as_ref(),
            &runtime.instance.time_base,
        )?;
        location.ty = xr::SpaceLocation::TYPE;
        location.pose = pose.to_xr();
        location.location_flags = if valid {
            xr::SpaceLocationFlags::ORIENTATION_VALID
                | xr::SpaceLocationFlags::POSITION_VALID
                | xr::SpaceLocationFlags::ORIENTATION_TRACKED
                | xr::SpaceLocationFlags::POSITION_TRACKED
        } else {
            xr::SpaceLocationFlags::EMPTY
        };
        Ok(())
    })())
}

/// # Safety
/// `view_state`/`views` must point to writable memory per the standard
/// two-call enumeration pattern.
#[no_mangle]
pub unsafe extern "C" fn xrLocateViews(
    session: xr::Session,
    info: *const xr::ViewLocateInfo,
    view_state: *mut xr::ViewState,
    capacity_input: u32,
    count_output: *mut u32,
    views: *mut xr::View,
) -> xr::Result {
    result_to_code((|| {
        let (runtime, _session) = REGISTRY.find_by_session(session)?;
        let info = unsafe { info.as_ref() }.ok_or(RtError::ValidationFailure)?;
        let view_state = unsafe { view_state.as_mut() }.ok_or(RtError::ValidationFailure)?;

        unsafe { *count_output = 2 };
        view_state.ty = xr::ViewState::TYPE;
        view_state.view_state_flags = xr::ViewStateFlags::ORIENTATION_VALID | xr::ViewStateFlags::POSITION_VALID;

        if capacity_input == 0 {
            return Ok(());
        }
        if capacity_input < 2 {
            return Err(RtError::SizeInsufficient);
        }

        let base_key = <crate::spaces::SpaceKey as crate::handle::XrHandle>::from_raw(info.space);
        let left_eye = runtime.instance.eye_render_info(Eye::Left);
        let right_eye = runtime.instance.eye_render_info(Eye::Right);
        let head_to_eye = [
            crate::pose::Pose::from_host(left_eye.head_from_eye),
            crate::pose::Pose::from_host(right_eye.head_from_eye),
        ];
        let poses = runtime.spaces.locate_views(
            base_key,
            info.display_time,
            head_to_eye,
            None,
            runtime.instance.host.as_ref(),
            &runtime.instance.time_base,
        )?;

        let slice = unsafe { std::slice::from_raw_parts_mut(views, 2) };
        for (i, (pose, fov)) in poses
            .into_iter()
            .zip([left_eye.fov, right_eye.fov])
            .enumerate()
        {
            slice[i] = xr::View {
                ty: xr::View::TYPE,
                next: std::ptr::null_mut(),
                pose: pose.to_xr(),
                fov: xr::Fovf {
                    angle_left: fov.angle_left,
                    angle_right: fov.angle_right,
                    angle_up: fov.angle_up,
                    angle_down: fov.angle_down,
                },
            };
        }
        Ok(())
    })())
}

// ---------------------------------------------------------------------
// Swapchains
// ---------------------------------------------------------------------

/// # Safety
/// Follows the standard two-call enumeration pattern for `formats`.
#[no_mangle]
pub unsafe extern "C" fn xrEnumerateSwapchainFormats(
    session: xr::Session,
    capacity_input: u32,
    count_output: *mut u32,
    formats: *mut i64,
) -> xr::Result {
    result_to_code((|| {
        let (_runtime, session_obj) = REGISTRY.find_by_session(session)?;
        let values = supported_formats(&session_obj.graphics);
        write_enumerated_array(&values, capacity_input, count_output, formats)
    })())
}

fn supported_formats(binding: &GraphicsBinding) -> Vec<i64> {
    match binding {
        #[cfg(windows)]
        GraphicsBinding::D3D11(_) | GraphicsBinding::D3D12(_) => vec![29, 91, 10],
        GraphicsBinding::Vulkan(_) => vec![43, 50, 97],
        GraphicsBinding::OpenGl(_) => vec![0x8C43, 0x881A],
    }
}

/// # Safety
/// `info`/`swapchain` must point to valid, correctly-typed memory.
#[no_mangle]
pub unsafe extern "C" fn xrCreateSwapchain(session: xr::Session, info: *const xr::SwapchainCreateInfo, swapchain: *mut xr::Swapchain) -> xr::Result {
    result_to_code((|| {
        let (runtime, session_obj) = REGISTRY.find_by_session(session)?;
        let info = unsafe { info.as_ref() }.ok_or(RtError::ValidationFailure)?;
        let swapchain_out = unsafe { swapchain.as_mut() }.ok_or(RtError::ValidationFailure)?;

        let vendor_format = vendor_format_from_binding(&session_obj.graphics, info.format)?;
        let host_format = crate::swapchain::host_format_for(vendor_format).ok_or(RtError::FormatUnsupported)?;
        let desc = crate::swapchain::SwapchainCreateDesc {
            width: info.width,
            height: info.height,
            sample_count: info.sample_count,
            array_size: info.array_size,
            face_count: info.face_count,
            mip_levels: info.mip_count,
            format: host_format,
            is_depth: crate::swapchain::host_format_for(vendor_format)
                .map(|f| matches!(f, hostapi::HostFormat::Depth24Stencil8 | hostapi::HostFormat::Depth32Float))
                .unwrap_or(false),
            is_static: info.create_flags.contains(xr::SwapchainCreateFlags::STATIC_IMAGE),
        };
        let host = Arc::clone(&runtime.instance.host);
        let sc = crate::swapchain::Swapchain::create(host.as_ref(), desc)?;
        *swapchain_out = runtime.insert_swapchain(session_obj, sc);
        Ok(())
    })())
}

fn vendor_format_from_binding(binding: &GraphicsBinding, format: i64) -> RtResult<crate::swapchain::VendorFormat> {
    Ok(match binding {
        #[cfg(windows)]
        GraphicsBinding::D3D11(_) | GraphicsBinding::D3D12(_) => crate::swapchain::VendorFormat::Dxgi(format as u32),
        GraphicsBinding::Vulkan(_) => crate::swapchain::VendorFormat::Vulkan(format as u32),
        GraphicsBinding::OpenGl(_) => crate::swapchain::VendorFormat::Gl(format as u32),
    })
}

#[no_mangle]
pub extern "C" fn xrDestroySwapchain(swapchain: xr::Swapchain) -> xr::Result {
    result_to_code((|| {
        let runtime = REGISTRY.find_by_swapchain(swapchain)?;
        let key = <crate::swapchain::SwapchainKey as crate::handle::XrHandle>::from_raw(swapchain);
        let entry = runtime
            .swapchains
            .read()
            .unwrap()
            .get(key)
            .map(|e| Arc::clone(&e.session))
            .ok_or(RtError::HandleInvalid)?;
        entry.graphics.import_shared_handle as fn(_, _) -> _; // no-op to keep import path referenced
        {
            let swapchains = runtime.swapchains.read().unwrap();
            if let Some(entry) = swapchains.get(key) {
                entry.swapchain.lock().unwrap().destroy(runtime.instance.host.as_ref());
            }
        }
        runtime.remove_swapchain(swapchain)
    })())
}

/// # Safety
/// Follows the standard two-call enumeration pattern for `images`, whose
/// element type depends on the owning session's graphics binding -- the
/// caller is expected to have allocated the matching `XrSwapchainImageXxxKHR`
/// array, exactly as every other OpenXR runtime's `xrEnumerateSwapchainImages`
/// assumes.
#[no_mangle]
pub unsafe extern "C" fn xrEnumerateSwapchainImages(
    swapchain: xr::Swapchain,
    capacity_input: u32,
    count_output: *mut u32,
    images: *mut xr::SwapchainImageBaseHeader,
) -> xr::Result {
    result_to_code((|| {
        let runtime = REGISTRY.find_by_swapchain(swapchain)?;
        let key = <crate::swapchain::SwapchainKey as crate::handle::XrHandle>::from_raw(swapchain);
        let swapchains = runtime.swapchains.read().unwrap();
        let entry = swapchains.get(key).ok_or(RtError::HandleInvalid)?;

        let image_count = entry.swapchain.lock().unwrap().image_count();
        if count_output.is_null() {
            return Err(RtError::ValidationFailure);
        }
        unsafe { *count_output = image_count };
        if capacity_input == 0 {
            return Ok(());
        }
        if capacity_input < image_count {
            return Err(RtError::SizeInsufficient);
        }

        let mut imported = entry.imported.lock().unwrap();
        if imported.is_none() {
            let (host_handle, desc) = {
                let sc = entry.swapchain.lock().unwrap();
                (sc.slices[0].host_handle, sc.desc)
            };
            let raw_handles = runtime.instance.host.swapchain_textures(host_handle);
            let swapchain_desc = hostapi::SwapchainDesc {
                width: desc.width,
                height: desc.height,
                format: desc.format,
                is_depth: desc.is_depth,
            };
            let mut textures = Vec::with_capacity(raw_handles.len());
            for handle in raw_handles {
                textures.push(entry.session.graphics.import_shared_handle(handle, swapchain_desc)?);
            }
            *imported = Some(textures);
        }

        write_imported_images(imported.as_ref().unwrap(), images, image_count as usize)?;
        Ok(())
    })())
}

unsafe fn write_imported_images(
    textures: &[crate::graphics::ImportedImage],
    images: *mut xr::SwapchainImageBaseHeader,
    count: usize,
) -> RtResult<()> {
    for i in 0..count {
        let header = unsafe { &mut *(images.add(i)) };
        match (&textures[i.min(textures.len() - 1)], header.ty) {
            #[cfg(windows)]
            (crate::graphics::ImportedImage::D3D11(tex), xr::StructureType::SWAPCHAIN_IMAGE_D3D11_KHR) => {
                let slot = unsafe { &mut *(images.add(i) as *mut xr::SwapchainImageD3D11KHR) };
                slot.ty = xr::SwapchainImageD3D11KHR::TYPE;
                slot.texture = windows::core::Interface::as_raw(&tex.texture) as *mut _;
            }
            #[cfg(windows)]
            (crate::graphics::ImportedImage::D3D12(tex), xr::StructureType::SWAPCHAIN_IMAGE_D3D12_KHR) => {
                let slot = unsafe { &mut *(images.add(i) as *mut xr::SwapchainImageD3D12KHR) };
                slot.ty = xr::SwapchainImageD3D12KHR::TYPE;
                slot.texture = windows::core::Interface::as_raw(&tex.resource) as *mut _;
            }
            (crate::graphics::ImportedImage::Vulkan(img), xr::StructureType::SWAPCHAIN_IMAGE_VULKAN_KHR) => {
                let slot = unsafe { &mut *(images.add(i) as *mut xr::SwapchainImageVulkanKHR) };
                slot.ty = xr::SwapchainImageVulkanKHR::TYPE;
                slot.image = ash::vk::Handle::as_raw(img.image);
            }
            (crate::graphics::ImportedImage::OpenGl(tex), xr::StructureType::SWAPCHAIN_IMAGE_OPENGL_KHR) => {
                let slot = unsafe { &mut *(images.add(i) as *mut xr::SwapchainImageOpenGLKHR) };
                slot.ty = xr::SwapchainImageOpenGLKHR::TYPE;
                slot.image = tex.texture;
            }
            _ => return Err(RtError::ValidationFailure),
        }
    }
    Ok(())
}

/// # Safety
/// `index` must be writable.
#[no_mangle]
pub unsafe extern "C" fn xrAcquireSwapchainImage(swapchain: xr::Swapchain, _info: *const xr::SwapchainImageAcquireInfo, index: *mut u32) -> xr::Result {
    result_to_code((|| {
        let runtime = REGISTRY.find_by_swapchain(swapchain)?;
        let key = <crate::swapchain::SwapchainKey as crate::handle::XrHandle>::from_raw(swapchain);
        let swapchains = runtime.swapchains.read().unwrap();
        let entry = swapchains.get(key).ok_or(RtError::HandleInvalid)?;
        let acquired = entry.swapchain.lock().unwrap().acquire()?;
        let index = unsafe { index.as_mut() }.ok_or(RtError::ValidationFailure)?;
        *index = acquired;
        Ok(())
    })())
}

#[no_mangle]
pub extern "C" fn xrWaitSwapchainImage(swapchain: xr::Swapchain, info: *const xr::SwapchainImageWaitInfo) -> xr::Result {
    result_to_code((|| {
        let runtime = REGISTRY.find_by_swapchain(swapchain)?;
        let info = unsafe { info.as_ref() }.ok_or(RtError::ValidationFailure)?;
        let key = <crate::swapchain::SwapchainKey as crate::handle::XrHandle>::from_raw(swapchain);
        let swapchains = runtime.swapchains.read().unwrap();
        let entry = swapchains.get(key).ok_or(RtError::HandleInvalid)?;
        let target = {
            let sc = entry.swapchain.lock().unwrap();
            sc.image_count()
        };
        let _ = target;
        let timeout_seconds = if info.timeout.as_nanos() < 0 {
            f32::INFINITY
        } else {
            info.timeout.as_nanos() as f32 / 1_000_000_000.0
        };
        let host_handle = entry.swapchain.lock().unwrap().slices[0].host_handle;
        if !runtime.instance.host.swapchain_wait(host_handle, timeout_seconds) {
            return Err(RtError::HostCallFailed(-1));
        }
        let mut sc = entry.swapchain.lock().unwrap();
        let last = sc.acquired_front().ok_or(RtError::CallOrderInvalid)?;
        sc.wait(last)
    })())
}

#[no_mangle]
pub extern "C" fn xrReleaseSwapchainImage(swapchain: xr::Swapchain, _info: *const xr::SwapchainImageReleaseInfo) -> xr::Result {
    result_to_code((|| {
        let runtime = REGISTRY.find_by_swapchain(swapchain)?;
        let key = <crate::swapchain::SwapchainKey as crate::handle::XrHandle>::from_raw(swapchain);
        let swapchains = runtime.swapchains.read().unwrap();
        let entry = swapchains.get(key).ok_or(RtError::HandleInvalid)?;
        entry.swapchain.lock().unwrap().release()
    })())
}

// ---------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------

/// # Safety
/// `info`/`action_set` must point to valid, correctly-typed memory.
#[no_mangle]
pub unsafe extern "C" fn xrCreateActionSet(instance: xr::Instance, info: *const xr::ActionSetCreateInfo, action_set: *mut xr::ActionSet) -> xr::Result {
    result_to_code((|| {
        let runtime = REGISTRY.get(instance)?;
        let info = unsafe { info.as_ref() }.ok_or(RtError::ValidationFailure)?;
        let action_set_out = unsafe { action_set.as_mut() }.ok_or(RtError::ValidationFailure)?;
        let name = cchars_to_string(&info.action_set_name)?;
        let localized = cchars_to_string(&info.localized_action_set_name)?;
        let key = runtime.input.create_action_set(name, localized)?;
        *action_set_out = <crate::input::ActionSetKey as crate::handle::XrHandle>::to_raw(key);
        Ok(())
    })())
}

#[no_mangle]
pub extern "C" fn xrDestroyActionSet(_action_set: xr::ActionSet) -> xr::Result {
    // Action sets are scoped to the instance for its whole lifetime in
    // this runtime; destroying one early has no observable effect before
    // `xrDestroyInstance` tears the whole table down.
    xr::Result::SUCCESS
}

/// # Safety
/// `info`/`action` must point to valid, correctly-typed memory.
#[no_mangle]
pub unsafe extern "C" fn xrCreateAction(action_set: xr::ActionSet, info: *const xr::ActionCreateInfo, action: *mut xr::Action) -> xr::Result {
    result_to_code((|| {
        let runtime = find_instance_by_action_set(action_set)?;
        let info = unsafe { info.as_ref() }.ok_or(RtError::ValidationFailure)?;
        let action_out = unsafe { action.as_mut() }.ok_or(RtError::ValidationFailure)?;
        let set_key = <crate::input::ActionSetKey as crate::handle::XrHandle>::from_raw(action_set);
        let name = cchars_to_string(&info.action_name)?;
        let localized = cchars_to_string(&info.localized_action_name)?;
        let ty = crate::input::ActionType::from_xr(info.action_type)?;
        let subaction_paths = unsafe {
            std::slice::from_raw_parts(info.subaction_paths, info.count_subaction_paths as usize)
        }
        .to_vec();
        let key = runtime.input.create_action(set_key, name, localized, ty, subaction_paths)?;
        *action_out = <crate::input::ActionKey as crate::handle::XrHandle>::to_raw(key);
        Ok(())
    })())
}

/// There is exactly one live instance in practice, so resolving an
/// instance-scoped handle that carries no instance parameter of its own
/// (`ActionSet` for `xrCreateAction`) means finding whichever instance's
/// action-set table contains it.
fn find_instance_by_action_set(_action_set: xr::ActionSet) -> RtResult<Arc<RuntimeInstance>> {
    REGISTRY.any_instance()
}

#[no_mangle]
pub extern "C" fn xrDestroyAction(_action: xr::Action) -> xr::Result {
    xr::Result::SUCCESS
}

/// # Safety
/// `suggested_bindings` must point to a valid `XrInteractionProfileSuggestedBinding`.
#[no_mangle]
pub unsafe extern "C" fn xrSuggestInteractionProfileBindings(
    instance: xr::Instance,
    suggested_bindings: *const xr::InteractionProfileSuggestedBinding,
) -> xr::Result {
    result_to_code((|| {
        let runtime = REGISTRY.get(instance)?;
        let suggested_bindings = unsafe { suggested_bindings.as_ref() }.ok_or(RtError::ValidationFailure)?;
        let bindings = unsafe {
            std::slice::from_raw_parts(
                suggested_bindings.suggested_bindings,
                suggested_bindings.count_suggested_bindings as usize,
            )
        };
        let pairs = bindings
            .iter()
            .map(|b| (<crate::input::ActionKey as crate::handle::XrHandle>::from_raw(b.action), b.binding))
            .collect();
        runtime.input.suggest_bindings(suggested_bindings.interaction_profile, pairs)
    })())
}

/// # Safety
/// `info` must point to valid memory.
#[no_mangle]
pub unsafe extern "C" fn xrAttachSessionActionSets(session: xr::Session, _info: *const xr::SessionActionSetsAttachInfo) -> xr::Result {
    result_to_code((|| {
        let (runtime, _session) = REGISTRY.find_by_session(session)?;
        runtime.input.attach(runtime.instance.host.as_ref(), &runtime.instance.paths)?;
        runtime
            .instance
            .events
            .push(crate::events::Event::InteractionProfileChanged { session });
        Ok(())
    })())
}

/// # Safety
/// `get_info`/`interaction_profile` must point to valid, correctly-typed memory.
#[no_mangle]
pub unsafe extern "C" fn xrGetCurrentInteractionProfile(
    session: xr::Session,
    get_info_top_level_user_path: xr::Path,
    interaction_profile: *mut xr::InteractionProfileState,
) -> xr::Result {
    result_to_code((|| {
        let (runtime, _session) = REGISTRY.find_by_session(session)?;
        runtime.input.require_attached()?;
        let side = subaction_path_to_side(&runtime, get_info_top_level_user_path)?;
        let interaction_profile = unsafe { interaction_profile.as_mut() }.ok_or(RtError::ValidationFailure)?;
        interaction_profile.ty = xr::InteractionProfileState::TYPE;
        interaction_profile.interaction_profile = runtime
            .input
            .current_interaction_profile(side)
            .unwrap_or(xr::Path::NULL);
        Ok(())
    })())
}

fn subaction_path_to_side(runtime: &RuntimeInstance, path: xr::Path) -> RtResult<Side> {
    let string = runtime.instance.paths.path_to_string(path)?;
    match string.as_str() {
        "/user/hand/left" => Ok(Side::Left),
        "/user/hand/right" => Ok(Side::Right),
        _ => Err(RtError::PathUnsupported),
    }
}

/// # Safety
/// `sync_info` must point to valid memory.
#[no_mangle]
pub unsafe extern "C" fn xrSyncActions(session: xr::Session, _sync_info: *const xr::ActionsSyncInfo) -> xr::Result {
    result_to_code((|| {
        let (runtime, session_obj) = REGISTRY.find_by_session(session)?;
        session_obj.lifecycle.require_running()?;
        runtime.input.require_attached()?;
        let threshold = runtime.instance.settings.current().bool_from_float_threshold;
        let snapshot = runtime.instance.host.input_snapshot();
        runtime.input.sync(snapshot, threshold);
        Ok(())
    })())
}

/// # Safety
/// `get_info`/`state` must point to valid, correctly-typed memory.
#[no_mangle]
pub unsafe extern "C" fn xrGetActionStateBoolean(session: xr::Session, get_info: *const xr::ActionStateGetInfo, state: *mut xr::ActionStateBoolean) -> xr::Result {
    result_to_code((|| {
        let (runtime, _session) = REGISTRY.find_by_session(session)?;
        let get_info = unsafe { get_info.as_ref() }.ok_or(RtError::ValidationFailure)?;
        let state = unsafe { state.as_mut() }.ok_or(RtError::ValidationFailure)?;
        let action = <crate::input::ActionKey as crate::handle::XrHandle>::from_raw(get_info.action);
        let side = action_state_side(&runtime, get_info.subaction_path)?;
        let value = runtime.input.bool_state(action, side);
        state.ty = xr::ActionStateBoolean::TYPE;
        state.current_state = value.current.into();
        state.changed_since_last_sync = value.changed.into();
        state.is_active = value.active.into();
        state.last_change_time = runtime.instance.time_base.now();
        Ok(())
    })())
}

fn action_state_side(runtime: &RuntimeInstance, subaction_path: xr::Path) -> RtResult<Side> {
    if subaction_path == xr::Path::NULL {
        return Ok(Side::Left);
    }
    subaction_path_to_side(runtime, subaction_path)
}

/// # Safety
/// `get_info`/`state` must point to valid, correctly-typed memory.
#[no_mangle]
pub unsafe extern "C" fn xrGetActionStateFloat(session: xr::Session, get_info: *const xr::ActionStateGetInfo, state: *mut xr::ActionStateFloat) -> xr::Result {
    result_to_code((|| {
        let (runtime, _session) = REGISTRY.find_by_session(session)?;
        let get_info = unsafe { get_info.as_ref() }.ok_or(RtError::ValidationFailure)?;
        let state = unsafe { state.as_mut() }.ok_or(RtError::ValidationFailure)?;
        let action = <crate::input::ActionKey as crate::handle::XrHandle>::from_raw(get_info.action);
        let side = action_state_side(&runtime, get_info.subaction_path)?;
        let value = runtime.input.float_state(action, side);
        state.ty = xr::ActionStateFloat::TYPE;
        state.current_state = value.current;
        state.changed_since_last_sync = value.changed.into();
        state.is_active = value.active.into();
        state.last_change_time = runtime.instance.time_base.now();
        Ok(())
    })())
}

/// # Safety
/// `get_info`/`state` must point to valid, correctly-typed memory.
#[no_mangle]
pub unsafe extern "C" fn xrGetActionStateVector2f(session: xr::Session, get_info: *const xr::ActionStateGetInfo, state: *mut xr::ActionStateVector2f) -> xr::Result {
    result_to_code((|| {
        let (runtime, _session) = REGISTRY.find_by_session(session)?;
        let get_info = unsafe { get_info.as_ref() }.ok_or(RtError::ValidationFailure)?;
        let state = unsafe { state.as_mut() }.ok_or(RtError::ValidationFailure)?;
        let action = <crate::input::ActionKey as crate::handle::XrHandle>::from_raw(get_info.action);
        let side = action_state_side(&runtime, get_info.subaction_path)?;
        let value = runtime.input.vector2_state(action, side);
        state.ty = xr::ActionStateVector2f::TYPE;
        state.current_state = xr::Vector2f {
            x: value.current.x,
            y: value.current.y,
        };
        state.changed_since_last_sync = value.changed.into();
        state.is_active = value.active.into();
        state.last_change_time = runtime.instance.time_base.now();
        Ok(())
    })())
}

/// # Safety
/// `get_info`/`state` must point to valid, correctly-typed memory.
#[no_mangle]
pub unsafe extern "C" fn xrGetActionStatePose(session: xr::Session, get_info: *const xr::ActionStateGetInfo, state: *mut xr::ActionStatePose) -> xr::Result {
    result_to_code((|| {
        let (_runtime, _session) = REGISTRY.find_by_session(session)?;
        let _get_info = unsafe { get_info.as_ref() }.ok_or(RtError::ValidationFailure)?;
        let state = unsafe { state.as_mut() }.ok_or(RtError::ValidationFailure)?;
        // Pose actions are located through their bound action space via
        // `xrLocateSpace`; `is_active` here just reflects whether the
        // action is currently bound to anything.
        state.ty = xr::ActionStatePose::TYPE;
        state.is_active = xr::TRUE;
        Ok(())
    })())
}

/// # Safety
/// `haptic_feedback` must point to a valid `XrHapticBaseHeader`-typed struct.
#[no_mangle]
pub unsafe extern "C" fn xrApplyHapticFeedback(
    session: xr::Session,
    haptic_action_info: *const xr::HapticActionInfo,
    haptic_feedback: *const xr::HapticBaseHeader,
) -> xr::Result {
    result_to_code((|| {
        let (runtime, _session) = REGISTRY.find_by_session(session)?;
        let info = unsafe { haptic_action_info.as_ref() }.ok_or(RtError::ValidationFailure)?;
        let header = unsafe { haptic_feedback.as_ref() }.ok_or(RtError::ValidationFailure)?;
        if header.ty != xr::StructureType::HAPTIC_VIBRATION {
            return Err(RtError::ValidationFailure);
        }
        let vibration = unsafe { &*(haptic_feedback as *const xr::HapticVibration) };
        let side = action_state_side(&runtime, info.subaction_path)?;
        let duration_seconds = if vibration.duration.as_nanos() < 0 {
            0.1
        } else {
            vibration.duration.as_nanos() as f32 / 1_000_000_000.0
        };
        runtime
            .instance
            .host
            .set_vibration(side, vibration.frequency, vibration.amplitude, duration_seconds);
        Ok(())
    })())
}

/// # Safety
/// `haptic_action_info` must point to valid memory.
#[no_mangle]
pub unsafe extern "C" fn xrStopHapticFeedback(session: xr::Session, haptic_action_info: *const xr::HapticActionInfo) -> xr::Result {
    result_to_code((|| {
        let (runtime, _session) = REGISTRY.find_by_session(session)?;
        let info = unsafe { haptic_action_info.as_ref() }.ok_or(RtError::ValidationFailure)?;
        let side = action_state_side(&runtime, info.subaction_path)?;
        runtime.instance.host.set_vibration(side, 0.0, 0.0, 0.0);
        Ok(())
    })())
}

// ---------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------

/// # Safety
/// `frame_state` must point to a writable, correctly-typed struct.
#[no_mangle]
pub unsafe extern "C" fn xrWaitFrame(session: xr::Session, _wait_info: *const xr::FrameWaitInfo, frame_state: *mut xr::FrameState) -> xr::Result {
    result_to_code((|| {
        let (runtime, session_obj) = REGISTRY.find_by_session(session)?;
        if session_obj.frames.device_lost() {
            session_obj.lifecycle.lose();
            runtime.instance.events.push(crate::events::Event::SessionStateChanged {
                session,
                state: xr::SessionState::LOSS_PENDING,
                time: runtime.instance.time_base.now(),
            });
            runtime.instance.events.push(crate::events::Event::InstanceLossPending {
                loss_time: runtime.instance.time_base.now(),
            });
            return Err(RtError::InstanceLossPending);
        }
        let result = session_obj.frames.wait_frame(
            runtime.instance.host.as_ref(),
            &session_obj.lifecycle,
            &runtime.instance.time_base,
        )?;
        let frame_state = unsafe { frame_state.as_mut() }.ok_or(RtError::ValidationFailure)?;
        frame_state.ty = xr::FrameState::TYPE;
        frame_state.predicted_display_time = result.predicted_display_time;
        frame_state.predicted_display_period = result.predicted_display_period;
        frame_state.should_render = result.should_render.into();
        Ok(())
    })())
}

#[no_mangle]
pub extern "C" fn xrBeginFrame(session: xr::Session, _begin_info: *const xr::FrameBeginInfo) -> xr::Result {
    let result = (|| {
        let (runtime, session_obj) = REGISTRY.find_by_session(session)?;
        session_obj.frames.begin_frame(runtime.instance.host.as_ref(), &session_obj.lifecycle)
    })();
    match result {
        Ok(true) => xr::Result::FRAME_DISCARDED,
        Ok(false) => xr::Result::SUCCESS,
        Err(e) => e.into(),
    }
}

/// # Safety
/// `info` must point to a valid `XrFrameEndInfo`, whose `layers` array must
/// contain `layer_count` valid composition-layer pointers.
#[no_mangle]
pub unsafe extern "C" fn xrEndFrame(session: xr::Session, info: *const xr::FrameEndInfo) -> xr::Result {
    result_to_code((|| {
        let (runtime, session_obj) = REGISTRY.find_by_session(session)?;
        let info = unsafe { info.as_ref() }.ok_or(RtError::ValidationFailure)?;
        if info.environment_blend_mode != xr::EnvironmentBlendMode::OPAQUE {
            return Err(RtError::EnvironmentBlendModeUnsupported);
        }
        let layer_ptrs = unsafe { std::slice::from_raw_parts(info.layers, info.layer_count as usize) };
        let mut layers = Vec::with_capacity(layer_ptrs.len());
        for (i, &layer_ptr) in layer_ptrs.iter().enumerate() {
            layers.push(convert_layer(&runtime, layer_ptr, info.display_time, i == 0)?);
        }
        let before = session_obj.lifecycle.current();
        session_obj.frames.end_frame(runtime.instance.host.as_ref(), &session_obj.lifecycle, layers)?;
        if session_obj.lifecycle.current() != before {
            runtime.instance.events.push(crate::events::Event::SessionStateChanged {
                session,
                state: xr::SessionState::VISIBLE,
                time: runtime.instance.time_base.now(),
            });
            // No host-level multi-application focus arbitration exists in
            // this runtime's model (one session drives the compositor at a
            // time), so the first visible frame takes the session straight
            // on to FOCUSED.
            session_obj.lifecycle.mark_focused(true);
            runtime.instance.events.push(crate::events::Event::SessionStateChanged {
                session,
                state: xr::SessionState::FOCUSED,
                time: runtime.instance.time_base.now(),
            });
        }
        Ok(())
    })())
}

/// Resolves `space`'s pose into the runtime's internal origin, the common
/// frame every layer pose must be expressed in before it reaches the host
/// compositor (`spec.md` §4.7's `locateSpace(layerSpace → origin)`).
fn layer_space_pose(runtime: &RuntimeInstance, space: xr::Space, time: xr::Time) -> RtResult<crate::pose::Pose> {
    let key = <crate::spaces::SpaceKey as crate::handle::XrHandle>::from_raw(space);
    let (pose, _valid) =
        runtime
            .spaces
            .locate_in_origin(key, time, runtime.instance.host.as_ref(), &runtime.instance.time_base)?;
    Ok(pose)
}

unsafe fn convert_layer(
    runtime: &RuntimeInstance,
    layer: *const xr::CompositionLayerBaseHeader,
    time: xr::Time,
    is_bottom: bool,
) -> RtResult<hostapi::HostLayer> {
    let header = unsafe { layer.as_ref() }.ok_or(RtError::ValidationFailure)?;
    match header.ty {
        xr::StructureType::COMPOSITION_LAYER_PROJECTION => {
            let projection = unsafe { &*(layer as *const xr::CompositionLayerProjection) };
            let views = unsafe { std::slice::from_raw_parts(projection.views, projection.view_count as usize) };
            if views.len() != 2 {
                return Err(RtError::LayerInvalid);
            }
            let space_pose = layer_space_pose(runtime, projection.space, time)?;
            let force_opaque = layer_force_opaque(projection.layer_flags, is_bottom);
            let premultiply = layer_premultiply(projection.layer_flags);
            let mut host_views = [hostapi::HostViewLayer::default(); 2];
            for (i, view) in views.iter().enumerate() {
                host_views[i] = view_layer(runtime, view, space_pose, force_opaque, premultiply)?;
            }
            Ok(hostapi::HostLayer::EyeFov { views: host_views })
        }
        xr::StructureType::COMPOSITION_LAYER_QUAD => {
            let quad = unsafe { &*(layer as *const xr::CompositionLayerQuad) };
            let (swapchain, image_index) = swapchain_slice_for(
                runtime,
                quad.sub_image,
                layer_force_opaque(quad.layer_flags, false),
                layer_premultiply(quad.layer_flags),
            )?;
            let key = <crate::spaces::SpaceKey as crate::handle::XrHandle>::from_raw(quad.space);
            let head_locked = runtime.spaces.is_view_space(key)?;
            let pose = if head_locked {
                crate::pose::Pose::from_xr(quad.pose)
            } else {
                crate::pose::Pose::from_xr(quad.pose).compose(layer_space_pose(runtime, quad.space, time)?)
            };
            Ok(hostapi::HostLayer::Quad {
                swapchain,
                image_index,
                pose: pose.to_host(),
                size: (quad.size.width, quad.size.height),
                head_locked,
            })
        }
        xr::StructureType::COMPOSITION_LAYER_CYLINDER_KHR => {
            let cylinder = unsafe { &*(layer as *const xr::CompositionLayerCylinderKHR) };
            let (swapchain, image_index) = swapchain_slice_for(
                runtime,
                cylinder.sub_image,
                layer_force_opaque(cylinder.layer_flags, false),
                layer_premultiply(cylinder.layer_flags),
            )?;
            let key = <crate::spaces::SpaceKey as crate::handle::XrHandle>::from_raw(cylinder.space);
            let pose = if runtime.spaces.is_view_space(key)? {
                crate::pose::Pose::from_xr(cylinder.pose)
            } else {
                crate::pose::Pose::from_xr(cylinder.pose).compose(layer_space_pose(runtime, cylinder.space, time)?)
            };
            Ok(hostapi::HostLayer::Cylinder {
                swapchain,
                image_index,
                pose: pose.to_host(),
                radius: cylinder.radius,
                central_angle: cylinder.central_angle,
                aspect_ratio: cylinder.aspect_ratio,
            })
        }
        xr::StructureType::COMPOSITION_LAYER_CUBE_KHR => {
            let cube = unsafe { &*(layer as *const xr::CompositionLayerCubeKHR) };
            let key = <crate::swapchain::SwapchainKey as crate::handle::XrHandle>::from_raw(cube.swapchain);
            let swapchains = runtime.swapchains.read().unwrap();
            let entry = swapchains.get(key).ok_or(RtError::HandleInvalid)?;
            let mut sc = entry.swapchain.lock().unwrap();
            let slice_index = cube.image_array_index as usize;
            let swapchain = sc.preprocess_slice(
                runtime.instance.host.as_ref(),
                &entry.session.preprocessor,
                slice_index.min(sc.slices.len() - 1),
                layer_force_opaque(cube.layer_flags, false),
                layer_premultiply(cube.layer_flags),
            )?;
            drop(sc);
            drop(swapchains);
            let space_pose = layer_space_pose(runtime, cube.space, time)?;
            let orientation = crate::pose::Pose::from_xr(xr::Posef {
                orientation: cube.orientation,
                position: xr::Vector3f { x: 0.0, y: 0.0, z: 0.0 },
            })
            .compose(space_pose)
            .orientation;
            Ok(hostapi::HostLayer::Cube { swapchain, orientation })
        }
        _ => Err(RtError::LayerInvalid),
    }
}

/// The bottom projection layer is never alpha-forced: it's the background,
/// nothing composites behind it, so its alpha is irrelevant.
fn layer_force_opaque(flags: xr::CompositionLayerFlags, is_bottom: bool) -> bool {
    !is_bottom && !flags.contains(xr::CompositionLayerFlags::BLEND_TEXTURE_SOURCE_ALPHA)
}

fn layer_premultiply(flags: xr::CompositionLayerFlags) -> bool {
    flags.contains(xr::CompositionLayerFlags::UNPREMULTIPLIED_ALPHA)
}

fn view_layer(
    runtime: &RuntimeInstance,
    view: &xr::CompositionLayerProjectionView,
    space_pose: crate::pose::Pose,
    force_opaque: bool,
    premultiply: bool,
) -> RtResult<hostapi::HostViewLayer> {
    let (swapchain, image_index) = swapchain_slice_for(runtime, view.sub_image, force_opaque, premultiply)?;
    Ok(hostapi::HostViewLayer {
        swapchain,
        image_index,
        rect: (
            view.sub_image.image_rect.offset.x,
            view.sub_image.image_rect.offset.y,
            view.sub_image.image_rect.extent.width as u32,
            view.sub_image.image_rect.extent.height as u32,
        ),
        fov: hostapi::Fov {
            angle_left: view.fov.angle_left,
            angle_right: view.fov.angle_right,
            angle_up: view.fov.angle_up,
            angle_down: view.fov.angle_down,
        },
        pose: crate::pose::Pose::from_xr(view.pose).compose(space_pose).to_host(),
    })
}

fn swapchain_slice_for(
    runtime: &RuntimeInstance,
    sub_image: xr::SwapchainSubImage,
    force_opaque: bool,
    premultiply: bool,
) -> RtResult<(hostapi::HostSwapchain, u32)> {
    let key = <crate::swapchain::SwapchainKey as crate::handle::XrHandle>::from_raw(sub_image.swapchain);
    let swapchains = runtime.swapchains.read().unwrap();
    let entry = swapchains.get(key).ok_or(RtError::HandleInvalid)?;
    let mut sc = entry.swapchain.lock().unwrap();
    let index = sc.last_released_index().ok_or(RtError::CallOrderInvalid)?;
    let slice_index = sub_image.image_array_index as usize;
    let handle = sc.preprocess_slice(
        runtime.instance.host.as_ref(),
        &entry.session.preprocessor,
        slice_index.min(sc.slices.len() - 1),
        force_opaque,
        premultiply,
    )?;
    Ok((handle, index))
}

// ---------------------------------------------------------------------
// xrGetInstanceProcAddr
// ---------------------------------------------------------------------

macro_rules! dispatch_table {
    ($name:expr, $function:expr, { $($fn_name:ident),* $(,)? }) => {
        match $name {
            $(stringify!($fn_name) => {
                unsafe { *$function = Some(std::mem::transmute($fn_name as usize)) };
                return xr::Result::SUCCESS;
            })*
            _ => {}
        }
    };
}

/// # Safety
/// `name` must be a valid, NUL-terminated C string; `function` must be
/// writable.
pub unsafe fn xrGetInstanceProcAddr(
    _instance: xr::Instance,
    name: *const c_char,
    function: *mut Option<xr::pfn::VoidFunction>,
) -> xr::Result {
    let Ok(name) = cstr_to_string(name) else {
        return xr::Result::ERROR_VALIDATION_FAILURE;
    };
    if function.is_null() {
        return xr::Result::ERROR_VALIDATION_FAILURE;
    }

    if name == "xrGetInstanceProcAddr" {
        unsafe { *function = Some(std::mem::transmute(xrGetInstanceProcAddr as usize)) };
        return xr::Result::SUCCESS;
    }

    dispatch_table!(name.as_str(), function, {
        xrEnumerateInstanceExtensionProperties,
        xrCreateInstance,
        xrDestroyInstance,
        xrGetInstanceProperties,
        xrPollEvent,
        xrResultToString,
        xrStructureTypeToString,
        xrStringToPath,
        xrPathToString,
        xrGetSystem,
        xrGetSystemProperties,
        xrEnumerateViewConfigurations,
        xrEnumerateViewConfigurationViews,
        xrEnumerateEnvironmentBlendModes,
        xrCreateSession,
        xrDestroySession,
        xrBeginSession,
        xrEndSession,
        xrRequestExitSession,
        xrEnumerateReferenceSpaces,
        xrCreateReferenceSpace,
        xrCreateActionSpace,
        xrDestroySpace,
        xrLocateSpace,
        xrLocateViews,
        xrEnumerateSwapchainFormats,
        xrCreateSwapchain,
        xrDestroySwapchain,
        xrEnumerateSwapchainImages,
        xrAcquireSwapchainImage,
        xrWaitSwapchainImage,
        xrReleaseSwapchainImage,
        xrCreateActionSet,
        xrDestroyActionSet,
        xrCreateAction,
        xrDestroyAction,
        xrSuggestInteractionProfileBindings,
        xrAttachSessionActionSets,
        xrGetCurrentInteractionProfile,
        xrSyncActions,
        xrGetActionStateBoolean,
        xrGetActionStateFloat,
        xrGetActionStateVector2f,
        xrGetActionStatePose,
        xrApplyHapticFeedback,
        xrStopHapticFeedback,
        xrWaitFrame,
        xrBeginFrame,
        xrEndFrame,
        xrGetOpenGLGraphicsRequirementsKHR,
        xrGetVulkanGraphicsRequirementsKHR,
        xrGetVulkanGraphicsRequirements2KHR,
        xrGetVulkanInstanceExtensionsKHR,
        xrGetVulkanDeviceExtensionsKHR,
        xrGetVulkanGraphicsDeviceKHR,
        xrGetVulkanGraphicsDevice2KHR,
    });

    #[cfg(windows)]
    dispatch_table!(name.as_str(), function, {
        xrGetD3D11GraphicsRequirementsKHR,
        xrGetD3D12GraphicsRequirementsKHR,
        xrConvertWin32PerformanceCounterToTimeKHR,
        xrConvertTimeToWin32PerformanceCounterKHR,
    });

    unsafe { *function = None };
    xr::Result::ERROR_FUNCTION_UNSUPPORTED
}

#[allow(unused_imports)]
use crate::runtime::InstanceKey as _InstanceKeyUnused;
#[allow(unused)]
fn _unused_cstring_guard(_: CString) {}
#[allow(unused)]
fn _unused_void_guard(_: *const c_void) {}
