//! Graphics interop: binds an application's chosen graphics API to the
//! host compositor's shared-resource handles.
//!
//! One variant per supported `xrCreateSession` graphics binding struct,
//! mirroring the shape of the teacher's `SupportedBackend` enum but
//! without its compile-time `WithAnyGraphics*`/`GraphicsEnum` dispatch
//! machinery -- there's only one direction of travel here (import a host
//! handle into the app's device), not OpenVR's "accept whatever texture
//! struct the app handed us" breadth, so a plain match suffices.

#[cfg(windows)]
pub mod d3d11;
#[cfg(windows)]
pub mod d3d12;
pub mod gl;
pub mod vulkan;

#[cfg(windows)]
pub mod preprocess;

/// Non-Windows builds have no D3D11 submission device to dispatch the
/// alpha-correction compute shader on; `xrEndFrame` still runs, it just
/// submits resolved slices without the force-opaque/premultiply pass.
#[cfg(not(windows))]
pub mod preprocess {
    use crate::errors::RtResult;
    use hostapi::{HostFormat, RawHandle};

    pub struct SubmissionDevice;

    impl SubmissionDevice {
        pub fn new() -> RtResult<Self> {
            Ok(Self)
        }

        pub fn preprocess(
            &self,
            _handle: RawHandle,
            _width: u32,
            _height: u32,
            _format: HostFormat,
            _force_opaque: bool,
            _premultiply: bool,
        ) -> RtResult<()> {
            Ok(())
        }
    }
}

use crate::errors::{RtError, RtResult};
use hostapi::RawHandle;

#[derive(Debug)]
pub enum GraphicsBinding {
    #[cfg(windows)]
    D3D11(d3d11::D3D11Binding),
    #[cfg(windows)]
    D3D12(d3d12::D3D12Binding),
    Vulkan(vulkan::VulkanBinding),
    OpenGl(gl::GlBinding),
}

/// An imported texture the application can render into or read the
/// compositor's resolved output from, named for the backend that
/// produced it but otherwise opaque to the rest of the runtime.
#[derive(Debug)]
pub enum ImportedImage {
    #[cfg(windows)]
    D3D11(d3d11::ImportedTexture),
    #[cfg(windows)]
    D3D12(d3d12::ImportedTexture),
    Vulkan(vulkan::ImportedImage),
    OpenGl(gl::ImportedTexture),
}

impl GraphicsBinding {
    /// Imports one vendor shared handle (a swapchain slice's resolved
    /// image, per `spec.md` §4.4) into this binding's device.
    pub fn import_shared_handle(&self, handle: RawHandle, desc: hostapi::SwapchainDesc) -> RtResult<ImportedImage> {
        match self {
            #[cfg(windows)]
            Self::D3D11(b) => b.import(handle, desc).map(ImportedImage::D3D11),
            #[cfg(windows)]
            Self::D3D12(b) => b.import(handle, desc).map(ImportedImage::D3D12),
            Self::Vulkan(b) => b.import(handle, desc).map(ImportedImage::Vulkan),
            Self::OpenGl(b) => b.import(handle, desc).map(ImportedImage::OpenGl),
        }
    }

    /// `true` when the binding's graphics device matches the adapter the
    /// host compositor is driving, checked once at `xrCreateSession` per
    /// `GRAPHICS_DEVICE_INVALID`'s error condition.
    pub fn matches_host_adapter(&self, host_luid: u64) -> bool {
        match self {
            #[cfg(windows)]
            Self::D3D11(b) => b.adapter_luid() == host_luid,
            #[cfg(windows)]
            Self::D3D12(b) => b.adapter_luid() == host_luid,
            Self::Vulkan(_) | Self::OpenGl(_) => true,
        }
    }
}

pub(crate) fn requirements_not_queried() -> RtError {
    RtError::GraphicsRequirementsCallMissing
}
