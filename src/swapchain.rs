//! Swapchain creation and the acquire/wait/release state machine, plus the
//! per-slice preprocess step (resolve, alpha correction) run once per dirty
//! slice in `EndFrame`.
//!
//! Grounded on the acquire/wait/release bookkeeping `fakexr`'s `Swapchain`
//! handle tracks (a single acquired-flag there; a full deque here, since a
//! real swapchain can have more than one image in flight).

use crate::errors::{RtError, RtResult};
use hostapi::{HostFormat, HostRuntime, HostSwapchain, SwapchainDesc};
use slotmap::new_key_type;
use std::collections::VecDeque;

new_key_type! {
    #[derive(macros::XrHandle)]
    #[xr_handle(raw = "openxr_sys::Swapchain")]
    pub struct SwapchainKey;
}

/// Vendor graphics-API pixel format, mapped bidirectionally onto
/// [`HostFormat`]. Each graphics backend owns its own integer encoding
/// (DXGI_FORMAT, VkFormat, GL internalformat); we store the raw integer
/// plus which backend it came from so the same table serves all four APIs.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum VendorFormat {
    Dxgi(u32),
    Vulkan(u32),
    Gl(u32),
}

pub fn host_format_for(format: VendorFormat) -> Option<HostFormat> {
    // DXGI_FORMAT values relevant to swapchains; kept inline rather than
    // pulling in the `windows` crate's enum on non-Windows builds.
    const DXGI_R8G8B8A8_UNORM: u32 = 28;
    const DXGI_R8G8B8A8_UNORM_SRGB: u32 = 29;
    const DXGI_B8G8R8A8_UNORM: u32 = 87;
    const DXGI_B8G8R8A8_UNORM_SRGB: u32 = 91;
    const DXGI_R16G16B16A16_FLOAT: u32 = 10;
    const DXGI_R10G10B10A2_UNORM: u32 = 24;
    const DXGI_D24_UNORM_S8_UINT: u32 = 45;
    const DXGI_D32_FLOAT: u32 = 40;

    const VK_FORMAT_R8G8B8A8_UNORM: u32 = 37;
    const VK_FORMAT_R8G8B8A8_SRGB: u32 = 43;
    const VK_FORMAT_B8G8R8A8_UNORM: u32 = 44;
    const VK_FORMAT_B8G8R8A8_SRGB: u32 = 50;
    const VK_FORMAT_R16G16B16A16_SFLOAT: u32 = 97;
    const VK_FORMAT_A2B10G10R10_UNORM_PACK32: u32 = 64;
    const VK_FORMAT_D24_UNORM_S8_UINT: u32 = 129;
    const VK_FORMAT_D32_SFLOAT: u32 = 126;

    const GL_RGBA8: u32 = 0x8058;
    const GL_SRGB8_ALPHA8: u32 = 0x8C43;
    const GL_RGBA16F: u32 = 0x881A;
    const GL_RGB10_A2: u32 = 0x8059;
    const GL_DEPTH24_STENCIL8: u32 = 0x88F0;
    const GL_DEPTH_COMPONENT32F: u32 = 0x8CAC;

    Some(match format {
        VendorFormat::Dxgi(DXGI_R8G8B8A8_UNORM) => HostFormat::Rgba8Unorm,
        VendorFormat::Dxgi(DXGI_R8G8B8A8_UNORM_SRGB) => HostFormat::Rgba8UnormSrgb,
        VendorFormat::Dxgi(DXGI_B8G8R8A8_UNORM) => HostFormat::Bgra8Unorm,
        VendorFormat::Dxgi(DXGI_B8G8R8A8_UNORM_SRGB) => HostFormat::Bgra8UnormSrgb,
        VendorFormat::Dxgi(DXGI_R16G16B16A16_FLOAT) => HostFormat::Rgba16Float,
        VendorFormat::Dxgi(DXGI_R10G10B10A2_UNORM) => HostFormat::Rgb10A2Unorm,
        VendorFormat::Dxgi(DXGI_D24_UNORM_S8_UINT) => HostFormat::Depth24Stencil8,
        VendorFormat::Dxgi(DXGI_D32_FLOAT) => HostFormat::Depth32Float,

        VendorFormat::Vulkan(VK_FORMAT_R8G8B8A8_UNORM) => HostFormat::Rgba8Unorm,
        VendorFormat::Vulkan(VK_FORMAT_R8G8B8A8_SRGB) => HostFormat::Rgba8UnormSrgb,
        VendorFormat::Vulkan(VK_FORMAT_B8G8R8A8_UNORM) => HostFormat::Bgra8Unorm,
        VendorFormat::Vulkan(VK_FORMAT_B8G8R8A8_SRGB) => HostFormat::Bgra8UnormSrgb,
        VendorFormat::Vulkan(VK_FORMAT_R16G16B16A16_SFLOAT) => HostFormat::Rgba16Float,
        VendorFormat::Vulkan(VK_FORMAT_A2B10G10R10_UNORM_PACK32) => HostFormat::Rgb10A2Unorm,
        VendorFormat::Vulkan(VK_FORMAT_D24_UNORM_S8_UINT) => HostFormat::Depth24Stencil8,
        VendorFormat::Vulkan(VK_FORMAT_D32_SFLOAT) => HostFormat::Depth32Float,

        VendorFormat::Gl(GL_RGBA8) => HostFormat::Rgba8Unorm,
        VendorFormat::Gl(GL_SRGB8_ALPHA8) => HostFormat::Rgba8UnormSrgb,
        VendorFormat::Gl(GL_RGBA16F) => HostFormat::Rgba16Float,
        VendorFormat::Gl(GL_RGB10_A2) => HostFormat::Rgb10A2Unorm,
        VendorFormat::Gl(GL_DEPTH24_STENCIL8) => HostFormat::Depth24Stencil8,
        VendorFormat::Gl(GL_DEPTH_COMPONENT32F) => HostFormat::Depth32Float,
        _ => return None,
    })
}

pub fn is_srgb(format: HostFormat) -> bool {
    matches!(format, HostFormat::Rgba8UnormSrgb | HostFormat::Bgra8UnormSrgb)
}

/// The reverse of [`host_format_for`]'s `Dxgi` arm: the `DXGI_FORMAT` a
/// D3D11/D3D12 binding should request for a given [`HostFormat`].
pub fn dxgi_format_for(format: HostFormat) -> u32 {
    use HostFormat::*;
    match format {
        Rgba8Unorm => 28,
        Rgba8UnormSrgb => 29,
        Bgra8Unorm => 87,
        Bgra8UnormSrgb => 91,
        Rgba16Float => 10,
        Rgb10A2Unorm => 24,
        Depth24Stencil8 => 45,
        Depth32Float => 40,
    }
}

/// One array layer of an application swapchain, materialized as an
/// independent single-layer single-sample host swapchain.
pub struct ResolvedSlice {
    pub host_handle: HostSwapchain,
    /// Set when this slice's host image still needs the resolve/alpha-
    /// correction pass before the next `EndFrame` submission references it.
    pub dirty: bool,
    /// True once this frame's preprocess has committed this slice, so a
    /// layer list referencing the same slice twice (e.g. both eyes of a
    /// mono swapchain) doesn't commit it twice.
    pub committed_this_frame: bool,
}

pub struct Swapchain {
    pub desc: SwapchainCreateDesc,
    pub slices: Vec<ResolvedSlice>,
    /// True if the app-facing image *is* the sole resolved slice (no
    /// separate app-facing array/MSAA texture to resolve from).
    pub app_facing_is_resolved: bool,
    acquired: VecDeque<u32>,
    last_waited_index: Option<u32>,
    last_released_index: Option<u32>,
    /// Static-image swapchains (`XR_SWAPCHAIN_CREATE_STATIC_IMAGE_BIT`)
    /// permit exactly one acquire/wait/release cycle.
    pub is_static: bool,
    static_cycle_used: bool,
}

#[derive(Copy, Clone, Debug)]
pub struct SwapchainCreateDesc {
    pub width: u32,
    pub height: u32,
    pub sample_count: u32,
    pub array_size: u32,
    pub face_count: u32,
    pub mip_levels: u32,
    pub format: HostFormat,
    pub is_depth: bool,
    pub is_static: bool,
}

impl Swapchain {
    pub fn validate(desc: &SwapchainCreateDesc) -> RtResult<()> {
        if desc.width == 0 || desc.height == 0 {
            return Err(RtError::SwapchainRectInvalid);
        }
        if desc.array_size < 1 {
            return Err(RtError::ValidationFailure);
        }
        if desc.face_count != 1 && desc.face_count != 6 {
            return Err(RtError::ValidationFailure);
        }
        if desc.mip_levels < 1 {
            return Err(RtError::ValidationFailure);
        }
        Ok(())
    }

    pub fn create(host: &dyn HostRuntime, desc: SwapchainCreateDesc) -> RtResult<Self> {
        Self::validate(&desc)?;
        let layer_count = desc.array_size * desc.face_count;
        let app_facing_is_resolved =
            layer_count == 1 && desc.sample_count == 1 && desc.face_count == 1;

        let mut slices = Vec::with_capacity(layer_count as usize);
        for _ in 0..layer_count {
            let host_handle = host
                .create_swapchain(SwapchainDesc {
                    width: desc.width,
                    height: desc.height,
                    format: desc.format,
                    is_depth: desc.is_depth,
                })
                .map_err(RtError::from)?;
            slices.push(ResolvedSlice {
                host_handle,
                dirty: false,
                committed_this_frame: false,
            });
        }

        Ok(Self {
            desc,
            slices,
            app_facing_is_resolved,
            acquired: VecDeque::new(),
            last_waited_index: None,
            last_released_index: None,
            is_static: desc.is_static,
            static_cycle_used: false,
        })
    }

    pub fn destroy(&self, host: &dyn HostRuntime) {
        for slice in &self.slices {
            host.destroy_swapchain(slice.host_handle);
        }
    }

    pub fn image_count(&self) -> u32 {
        // The app sees a fixed-size ring; 3 matches the image count every
        // resolved slice allocates on the host side.
        3
    }

    pub fn acquire(&mut self) -> RtResult<u32> {
        if self.is_static && self.static_cycle_used {
            return Err(RtError::CallOrderInvalid);
        }
        let next = self.acquired.back().map_or(0, |&i| (i + 1) % self.image_count());
        self.acquired.push_back(next);
        Ok(next)
    }

    pub fn wait(&mut self, target: u32) -> RtResult<()> {
        match self.acquired.front() {
            Some(&front) if front == target => {
                self.last_waited_index = Some(target);
                Ok(())
            }
            Some(_) => Err(RtError::CallOrderInvalid),
            None => Err(RtError::CallOrderInvalid),
        }
    }

    pub fn release(&mut self) -> RtResult<()> {
        let Some(waited) = self.last_waited_index else {
            return Err(RtError::CallOrderInvalid);
        };
        match self.acquired.pop_front() {
            Some(front) if front == waited => {
                self.last_released_index = Some(front);
                self.last_waited_index = None;
                for slice in &mut self.slices {
                    slice.dirty = true;
                }
                if self.is_static {
                    self.static_cycle_used = true;
                }
                Ok(())
            }
            _ => Err(RtError::CallOrderInvalid),
        }
    }

    pub fn last_released_index(&self) -> Option<u32> {
        self.last_released_index
    }

    pub fn begin_frame(&mut self) {
        for slice in &mut self.slices {
            slice.committed_this_frame = false;
        }
    }

    /// Resolves and alpha-corrects slice `index` if it is dirty, then
    /// commits it on the host exactly once. `force_opaque` and
    /// `premultiply` are derived from the submitting layer's flags and the
    /// projection-layer bottom-layer exemption (see `dispatch.rs`'s
    /// `convert_layer`).
    pub fn preprocess_slice(
        &mut self,
        host: &dyn HostRuntime,
        submission: &crate::graphics::preprocess::SubmissionDevice,
        index: usize,
        force_opaque: bool,
        premultiply: bool,
    ) -> RtResult<HostSwapchain> {
        let desc = self.desc;
        let slice = self
            .slices
            .get_mut(index)
            .ok_or(RtError::ValidationFailure)?;
        if slice.dirty && !desc.is_depth {
            // Array/MSAA resolve into this slice already happened on the
            // app's own device when it released the image; only the
            // alpha-correction compute pass still needs to run here.
            if let Some(&texture) = host.swapchain_textures(slice.host_handle).first() {
                submission.preprocess(texture, desc.width, desc.height, desc.format, force_opaque, premultiply)?;
            }
            slice.dirty = false;
        }
        if !slice.committed_this_frame {
            host.swapchain_commit(slice.host_handle);
            slice.committed_this_frame = true;
        }
        Ok(slice.host_handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fakehost::FakeHost;

    fn desc() -> SwapchainCreateDesc {
        SwapchainCreateDesc {
            width: 1024,
            height: 1024,
            sample_count: 1,
            array_size: 2,
            face_count: 1,
            mip_levels: 1,
            format: HostFormat::Rgba8UnormSrgb,
            is_depth: false,
            is_static: false,
        }
    }

    #[test]
    fn acquire_wait_release_follows_fifo_order() {
        let host = FakeHost::new();
        let mut sc = Swapchain::create(&host, desc()).unwrap();
        let a = sc.acquire().unwrap();
        assert!(sc.wait(a).is_ok());
        assert!(sc.release().is_ok());
    }

    #[test]
    fn wait_on_wrong_index_fails() {
        let host = FakeHost::new();
        let mut sc = Swapchain::create(&host, desc()).unwrap();
        let _a = sc.acquire().unwrap();
        let b = sc.acquire().unwrap();
        assert!(sc.wait(b).is_err());
    }

    #[test]
    fn static_swapchain_permits_exactly_one_cycle() {
        let host = FakeHost::new();
        let mut d = desc();
        d.is_static = true;
        let mut sc = Swapchain::create(&host, d).unwrap();
        let a = sc.acquire().unwrap();
        sc.wait(a).unwrap();
        sc.release().unwrap();
        assert!(matches!(sc.acquire(), Err(RtError::CallOrderInvalid)));
    }

    #[test]
    fn zero_dimension_is_rejected() {
        let mut d = desc();
        d.width = 0;
        assert!(matches!(
            Swapchain::validate(&d),
            Err(RtError::SwapchainRectInvalid)
        ));
    }

    #[test]
    fn preprocess_commits_each_slice_once_per_frame() {
        let host = FakeHost::new();
        let submission = crate::graphics::preprocess::SubmissionDevice::new().unwrap();
        let mut sc = Swapchain::create(&host, desc()).unwrap();
        let a = sc.acquire().unwrap();
        sc.wait(a).unwrap();
        sc.release().unwrap();
        sc.begin_frame();
        sc.preprocess_slice(&host, &submission, 0, false, false).unwrap();
        sc.preprocess_slice(&host, &submission, 0, false, false).unwrap();
        assert!(sc.slices[0].committed_this_frame);
    }
}
