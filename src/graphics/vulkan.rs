//! Vulkan graphics binding: imports the host compositor's shared memory
//! handles as `VkImage`s via `VK_KHR_external_memory_fd`/`_win32`.
//!
//! Grounded on the teacher's `vulkan.rs` (`ash::Entry`/`ash::Instance`/
//! `ash::Device` ownership, `vk::Handle::from_raw` for wrapping a raw
//! handle the app or host handed over).

use crate::errors::{RtError, RtResult};
use ash::vk;
use hostapi::{RawHandle, SwapchainDesc};

pub struct VulkanBinding {
    pub instance: ash::Instance,
    pub physical_device: vk::PhysicalDevice,
    pub device: ash::Device,
    pub queue: vk::Queue,
    pub queue_family_index: u32,
}

impl std::fmt::Debug for VulkanBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanBinding")
            .field("queue_family_index", &self.queue_family_index)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct ImportedImage {
    pub image: vk::Image,
    pub memory: vk::DeviceMemory,
}

impl VulkanBinding {
    pub fn from_session_create_info(
        instance: ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: ash::Device,
        queue_family_index: u32,
        queue_index: u32,
    ) -> Self {
        let queue = unsafe { device.get_device_queue(queue_family_index, queue_index) };
        Self {
            instance,
            physical_device,
            device,
            queue,
            queue_family_index,
        }
    }

    /// Imports `handle` (an opaque FD/NT-handle the host exported for one
    /// resolved swapchain slice) as a dedicated-allocation `VkImage`.
    pub fn import(&self, handle: RawHandle, desc: SwapchainDesc) -> RtResult<ImportedImage> {
        let format = vulkan_format(desc.format);
        let extent = vk::Extent3D {
            width: desc.width,
            height: desc.height,
            depth: 1,
        };
        let usage = if desc.is_depth {
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::SAMPLED
        } else {
            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED
        };

        let mut external_info = vk::ExternalMemoryImageCreateInfo::default()
            .handle_types(external_handle_type());
        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(extent)
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .push_next(&mut external_info);

        let image = unsafe { self.device.create_image(&image_info, None) }
            .map_err(|_| RtError::GraphicsDeviceInvalid)?;
        let memory = self
            .import_memory_for(image, handle)
            .inspect_err(|_| unsafe { self.device.destroy_image(image, None) })?;
        unsafe {
            self.device
                .bind_image_memory(image, memory, 0)
                .map_err(|_| RtError::GraphicsDeviceInvalid)?;
        }
        Ok(ImportedImage { image, memory })
    }

    #[cfg(unix)]
    fn import_memory_for(&self, image: vk::Image, handle: RawHandle) -> RtResult<vk::DeviceMemory> {
        let requirements = unsafe { self.device.get_image_memory_requirements(image) };
        let mut import_info = vk::ImportMemoryFdInfoKHR::default()
            .handle_type(vk::ExternalMemoryHandleTypeFlags::OPAQUE_FD)
            .fd(handle.0 as i32);
        let alloc_info = vk::MemoryAllocateInfo::default()
            .allocation_size(requirements.size)
            .memory_type_index(0)
            .push_next(&mut import_info);
        unsafe { self.device.allocate_memory(&alloc_info, None) }.map_err(|_| RtError::GraphicsDeviceInvalid)
    }

    #[cfg(windows)]
    fn import_memory_for(&self, image: vk::Image, handle: RawHandle) -> RtResult<vk::DeviceMemory> {
        let requirements = unsafe { self.device.get_image_memory_requirements(image) };
        let mut import_info = vk::ImportMemoryWin32HandleInfoKHR::default()
            .handle_type(vk::ExternalMemoryHandleTypeFlags::OPAQUE_WIN32)
            .handle(handle.0 as isize as *mut std::ffi::c_void);
        let alloc_info = vk::MemoryAllocateInfo::default()
            .allocation_size(requirements.size)
            .memory_type_index(0)
            .push_next(&mut import_info);
        unsafe { self.device.allocate_memory(&alloc_info, None) }.map_err(|_| RtError::GraphicsDeviceInvalid)
    }
}

#[cfg(unix)]
fn external_handle_type() -> vk::ExternalMemoryHandleTypeFlags {
    vk::ExternalMemoryHandleTypeFlags::OPAQUE_FD
}

#[cfg(windows)]
fn external_handle_type() -> vk::ExternalMemoryHandleTypeFlags {
    vk::ExternalMemoryHandleTypeFlags::OPAQUE_WIN32
}

fn vulkan_format(format: hostapi::HostFormat) -> vk::Format {
    use hostapi::HostFormat::*;
    match format {
        Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
        Rgba8UnormSrgb => vk::Format::R8G8B8A8_SRGB,
        Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
        Bgra8UnormSrgb => vk::Format::B8G8R8A8_SRGB,
        Rgba16Float => vk::Format::R16G16B16A16_SFLOAT,
        Rgb10A2Unorm => vk::Format::A2B10G10R10_UNORM_PACK32,
        Depth24Stencil8 => vk::Format::D24_UNORM_S8_UINT,
        Depth32Float => vk::Format::D32_SFLOAT,
    }
}
