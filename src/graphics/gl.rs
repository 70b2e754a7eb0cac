//! OpenGL graphics binding: imports host shared handles via
//! `GL_EXT_memory_object`/`GL_EXT_memory_object_fd`/`_win32`.
//!
//! Grounded on the teacher's `gl.rs`, which already wraps the raw `gl`
//! crate bindings the same way for copying OpenVR textures into an
//! OpenXR swapchain.

use crate::errors::{RtError, RtResult};
use hostapi::{HostFormat, RawHandle, SwapchainDesc};

#[derive(Debug)]
pub struct GlBinding {
    /// Populated from the platform-specific `xrGetOpenGLGraphicsRequirementsKHR`
    /// session-create-info; this runtime doesn't own a GL context itself.
    pub context_initialized: bool,
}

#[derive(Debug)]
pub struct ImportedTexture {
    pub texture: gl::types::GLuint,
    pub memory_object: gl::types::GLuint,
}

impl GlBinding {
    pub fn import(&self, handle: RawHandle, desc: SwapchainDesc) -> RtResult<ImportedTexture> {
        if !self.context_initialized {
            return Err(super::requirements_not_queried());
        }
        let mut memory_object = 0;
        let mut texture = 0;
        unsafe {
            gl::CreateMemoryObjectsEXT(1, &mut memory_object);
            import_memory_handle(memory_object, handle);
            gl::GenTextures(1, &mut texture);
            gl::BindTexture(gl::TEXTURE_2D, texture);
            gl::TexStorageMem2DEXT(
                gl::TEXTURE_2D,
                1,
                gl_internal_format(desc.format),
                desc.width as i32,
                desc.height as i32,
                memory_object,
                0,
            );
        }
        Ok(ImportedTexture {
            texture,
            memory_object,
        })
    }
}

#[cfg(unix)]
unsafe fn import_memory_handle(memory_object: gl::types::GLuint, handle: RawHandle) {
    gl::ImportMemoryFdEXT(
        memory_object,
        0,
        gl::HANDLE_TYPE_OPAQUE_FD_EXT,
        handle.0 as i32,
    );
}

#[cfg(windows)]
unsafe fn import_memory_handle(memory_object: gl::types::GLuint, handle: RawHandle) {
    gl::ImportMemoryWin32HandleEXT(
        memory_object,
        0,
        gl::HANDLE_TYPE_OPAQUE_WIN32_EXT,
        handle.0 as *mut std::ffi::c_void,
    );
}

fn gl_internal_format(format: HostFormat) -> gl::types::GLenum {
    use HostFormat::*;
    match format {
        Rgba8Unorm => gl::RGBA8,
        Rgba8UnormSrgb => gl::SRGB8_ALPHA8,
        Bgra8Unorm => gl::RGBA8,
        Bgra8UnormSrgb => gl::SRGB8_ALPHA8,
        Rgba16Float => gl::RGBA16F,
        Rgb10A2Unorm => gl::RGB10_A2,
        Depth24Stencil8 => gl::DEPTH24_STENCIL8,
        Depth32Float => gl::DEPTH_COMPONENT32F,
    }
}
