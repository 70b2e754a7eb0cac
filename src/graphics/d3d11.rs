//! D3D11 graphics binding: the host compositor's native API, so imports
//! here are a plain `OpenSharedResource1` rather than a cross-API
//! reinterpretation.

use crate::errors::{RtError, RtResult};
use hostapi::{HostFormat, RawHandle, SwapchainDesc};
use windows::core::Interface;
use windows::Win32::Graphics::Direct3D11::{ID3D11Device, ID3D11Device1, ID3D11Texture2D};
use windows::Win32::Graphics::Dxgi::{IDXGIDevice, IDXGIAdapter};
use windows::Win32::Graphics::Dxgi::Common::DXGI_FORMAT;
use windows::Win32::Foundation::HANDLE;

pub fn dxgi_format(format: HostFormat) -> DXGI_FORMAT {
    DXGI_FORMAT(crate::swapchain::dxgi_format_for(format) as i32)
}

pub struct D3D11Binding {
    pub device: ID3D11Device,
    pub adapter_luid: u64,
}

impl std::fmt::Debug for D3D11Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("D3D11Binding")
            .field("adapter_luid", &self.adapter_luid)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct ImportedTexture {
    pub texture: ID3D11Texture2D,
}

impl D3D11Binding {
    /// Builds the binding from the device an `XrGraphicsBindingD3D11KHR`
    /// handed over, reading the adapter LUID off it via DXGI so
    /// `matches_host_adapter` has something to compare against.
    pub fn from_device(device: ID3D11Device) -> RtResult<Self> {
        let dxgi_device: IDXGIDevice = device
            .cast()
            .map_err(|_| RtError::GraphicsDeviceInvalid)?;
        let adapter: IDXGIAdapter = unsafe { dxgi_device.GetAdapter() }
            .map_err(|_| RtError::GraphicsDeviceInvalid)?;
        let desc = unsafe { adapter.GetDesc() }.map_err(|_| RtError::GraphicsDeviceInvalid)?;
        let luid = desc.AdapterLuid;
        let adapter_luid = ((luid.HighPart as u64) << 32) | luid.LowPart as u64;
        Ok(Self {
            device,
            adapter_luid,
        })
    }

    pub fn adapter_luid(&self) -> u64 {
        self.adapter_luid
    }

    pub fn import(&self, handle: RawHandle, _desc: SwapchainDesc) -> RtResult<ImportedTexture> {
        let device1: ID3D11Device1 = self
            .device
            .cast()
            .map_err(|_| RtError::GraphicsDeviceInvalid)?;
        let texture: ID3D11Texture2D = unsafe {
            device1
                .OpenSharedResource1(HANDLE(handle.0 as *mut std::ffi::c_void))
                .map_err(|_| RtError::GraphicsDeviceInvalid)?
        };
        Ok(ImportedTexture { texture })
    }
}
