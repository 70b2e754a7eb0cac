//! The D3D11 "submission device" every resolved swapchain slice is
//! preprocessed on before `EndFrame` hands its layer list to the host
//! compositor: force-opaque and premultiply, dispatched as one compute
//! shader over the slice's full extent.
//!
//! Grounded on `d3d11.rs`'s `OpenSharedResource1` import path -- preprocess
//! opens the same shared handle `swapchain_textures` hands back, just as a
//! UAV instead of an SRV, since this device never presents anything. Array
//! and MSAA resolve themselves happen on the app's own device before the
//! slice is released to us; by the time preprocess sees the shared handle
//! the resolve has already landed, so this shader only ever touches alpha.

use crate::errors::{RtError, RtResult};
use hostapi::{HostFormat, RawHandle};
use windows::core::{s, Interface};
use windows::Win32::Foundation::HANDLE;
use windows::Win32::Graphics::Direct3D::Fxc::D3DCompile;
use windows::Win32::Graphics::Direct3D::D3D_DRIVER_TYPE_HARDWARE;
use windows::Win32::Graphics::Direct3D11::{
    D3D11CreateDevice, ID3D11Buffer, ID3D11ComputeShader, ID3D11Device, ID3D11Device1,
    ID3D11DeviceContext, ID3D11Texture2D, ID3D11UnorderedAccessView, D3D11_BIND_CONSTANT_BUFFER,
    D3D11_BUFFER_DESC, D3D11_SUBRESOURCE_DATA, D3D11_TEX2D_UAV,
    D3D11_UAV_DIMENSION_TEXTURE2D, D3D11_UNORDERED_ACCESS_VIEW_DESC,
    D3D11_UNORDERED_ACCESS_VIEW_DESC_0,
};

const SHADER_SRC: &str = r#"
cbuffer Flags : register(b0)
{
    uint force_opaque;
    uint premultiply;
    uint width;
    uint height;
};

RWTexture2D<float4> Target : register(u0);

[numthreads(8, 8, 1)]
void main(uint3 id : SV_DispatchThreadID)
{
    if (id.x >= width || id.y >= height)
        return;
    float4 texel = Target[id.xy];
    if (premultiply != 0)
    {
        texel.rgb *= texel.a;
    }
    if (force_opaque != 0)
    {
        texel.a = 1.0;
    }
    Target[id.xy] = texel;
}
"#;

#[repr(C)]
struct Flags {
    force_opaque: u32,
    premultiply: u32,
    width: u32,
    height: u32,
}

/// Owns the dedicated D3D11 device + compiled compute shader every
/// resolved slice's preprocess pass dispatches against.
pub struct SubmissionDevice {
    device: ID3D11Device,
    context: ID3D11DeviceContext,
    shader: ID3D11ComputeShader,
}

impl SubmissionDevice {
    // TODO: enumerate adapters by LUID and pick the one matching
    // `HostRuntime::adapter_luid` instead of taking the default hardware
    // adapter; today this only happens to work because the test/dev host
    // and the default adapter are the same GPU.
    pub fn new() -> RtResult<Self> {
        let mut device: Option<ID3D11Device> = None;
        let mut context: Option<ID3D11DeviceContext> = None;
        unsafe {
            D3D11CreateDevice(
                None,
                D3D_DRIVER_TYPE_HARDWARE,
                None,
                Default::default(),
                None,
                windows::Win32::Graphics::Direct3D11::D3D11_SDK_VERSION,
                Some(&mut device),
                None,
                Some(&mut context),
            )
            .map_err(|_| RtError::GraphicsDeviceInvalid)?;
        }
        let device = device.ok_or(RtError::GraphicsDeviceInvalid)?;
        let context = context.ok_or(RtError::GraphicsDeviceInvalid)?;
        let shader = compile_shader(&device)?;
        Ok(Self { device, context, shader })
    }

    /// Dispatches the alpha-correction pass over the shared resource
    /// `handle` names. A no-op when neither flag applies, since opening
    /// the shared handle and binding a UAV has its own (small) cost.
    pub fn preprocess(
        &self,
        handle: RawHandle,
        width: u32,
        height: u32,
        format: HostFormat,
        force_opaque: bool,
        premultiply: bool,
    ) -> RtResult<()> {
        if !force_opaque && !premultiply {
            return Ok(());
        }

        let device1: ID3D11Device1 = self.device.cast().map_err(|_| RtError::GraphicsDeviceInvalid)?;
        let texture: ID3D11Texture2D = unsafe {
            device1
                .OpenSharedResource1(HANDLE(handle.0 as *mut std::ffi::c_void))
                .map_err(|_| RtError::GraphicsDeviceInvalid)?
        };
        let resource = texture.cast().map_err(|_| RtError::GraphicsDeviceInvalid)?;

        let uav_desc = D3D11_UNORDERED_ACCESS_VIEW_DESC {
            Format: super::d3d11::dxgi_format(format),
            ViewDimension: D3D11_UAV_DIMENSION_TEXTURE2D,
            Anonymous: D3D11_UNORDERED_ACCESS_VIEW_DESC_0 {
                Texture2D: D3D11_TEX2D_UAV { MipSlice: 0 },
            },
        };
        let mut uav: Option<ID3D11UnorderedAccessView> = None;
        unsafe {
            self.device
                .CreateUnorderedAccessView(&resource, Some(&uav_desc), Some(&mut uav))
                .map_err(|_| RtError::GraphicsDeviceInvalid)?;
        }
        let uav = uav.ok_or(RtError::GraphicsDeviceInvalid)?;

        let flags = Flags {
            force_opaque: force_opaque as u32,
            premultiply: premultiply as u32,
            width,
            height,
        };
        let cbuffer_desc = D3D11_BUFFER_DESC {
            ByteWidth: std::mem::size_of::<Flags>() as u32,
            BindFlags: D3D11_BIND_CONSTANT_BUFFER.0 as u32,
            ..Default::default()
        };
        let init = D3D11_SUBRESOURCE_DATA {
            pSysMem: &flags as *const Flags as *const _,
            ..Default::default()
        };
        let mut cbuffer: Option<ID3D11Buffer> = None;
        unsafe {
            self.device
                .CreateBuffer(&cbuffer_desc, Some(&init), Some(&mut cbuffer))
                .map_err(|_| RtError::GraphicsDeviceInvalid)?;
        }
        let cbuffer = cbuffer.ok_or(RtError::GraphicsDeviceInvalid)?;

        unsafe {
            self.context.CSSetShader(&self.shader, None);
            self.context.CSSetConstantBuffers(0, Some(&[Some(cbuffer)]));
            self.context
                .CSSetUnorderedAccessViews(0, 1, Some(&Some(uav)), None);
            self.context.Dispatch((width + 7) / 8, (height + 7) / 8, 1);
            self.context
                .CSSetUnorderedAccessViews(0, 1, Some(&None), None);
        }
        Ok(())
    }
}

fn compile_shader(device: &ID3D11Device) -> RtResult<ID3D11ComputeShader> {
    let mut blob = None;
    let mut errors = None;
    unsafe {
        D3DCompile(
            SHADER_SRC.as_ptr() as *const _,
            SHADER_SRC.len(),
            None,
            None,
            None,
            s!("main"),
            s!("cs_5_0"),
            0,
            0,
            &mut blob,
            Some(&mut errors),
        )
        .map_err(|_| RtError::GraphicsDeviceInvalid)?;
    }
    let blob = blob.ok_or(RtError::GraphicsDeviceInvalid)?;
    let bytecode = unsafe {
        std::slice::from_raw_parts(blob.GetBufferPointer() as *const u8, blob.GetBufferSize())
    };
    let mut shader: Option<ID3D11ComputeShader> = None;
    unsafe {
        device
            .CreateComputeShader(bytecode, None, Some(&mut shader))
            .map_err(|_| RtError::GraphicsDeviceInvalid)?;
    }
    shader.ok_or(RtError::GraphicsDeviceInvalid)
}
