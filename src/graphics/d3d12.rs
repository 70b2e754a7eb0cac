//! D3D12 graphics binding: imports via `ID3D12Device::OpenSharedHandle`,
//! mirroring `d3d11`'s approach one API level up.

use crate::errors::{RtError, RtResult};
use hostapi::{RawHandle, SwapchainDesc};
use windows::Win32::Graphics::Direct3D12::{ID3D12CommandQueue, ID3D12Device, ID3D12Resource};
use windows::Win32::Foundation::HANDLE;

pub struct D3D12Binding {
    pub device: ID3D12Device,
    pub queue: ID3D12CommandQueue,
    pub adapter_luid: u64,
}

impl std::fmt::Debug for D3D12Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("D3D12Binding")
            .field("adapter_luid", &self.adapter_luid)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct ImportedTexture {
    pub resource: ID3D12Resource,
}

impl D3D12Binding {
    /// `ID3D12Device::GetAdapterLuid` is a direct accessor, unlike D3D11's
    /// DXGI round-trip.
    pub fn from_device(device: ID3D12Device, queue: ID3D12CommandQueue) -> RtResult<Self> {
        let luid = unsafe { device.GetAdapterLuid() };
        let adapter_luid = ((luid.HighPart as u64) << 32) | luid.LowPart as u64;
        Ok(Self {
            device,
            queue,
            adapter_luid,
        })
    }

    pub fn adapter_luid(&self) -> u64 {
        self.adapter_luid
    }

    pub fn import(&self, handle: RawHandle, _desc: SwapchainDesc) -> RtResult<ImportedTexture> {
        let resource: ID3D12Resource = unsafe {
            self.device
                .OpenSharedHandle(HANDLE(handle.0 as *mut std::ffi::c_void))
                .map_err(|_| RtError::GraphicsDeviceInvalid)?
        };
        Ok(ImportedTexture { resource })
    }
}
