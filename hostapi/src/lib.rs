//! Safe-ish bindings to the proprietary host VR runtime's C ABI.
//!
//! The real vendor SDK ships as an import library exposing a single
//! versioned entry point that returns a flat table of function pointers
//! (the same shape LibOVR/PVR-style SDKs use). We model that table in
//! [`sys`], and expose [`HostRuntime`] as the trait the rest of the crate
//! programs against so tests can swap in `fakehost`'s in-memory
//! implementation instead of linking the real SDK.

pub mod sys;

use glam::{Quat, Vec3};
use std::fmt;

/// A pose as reported by the host runtime: position + orientation, host
/// coordinate space (right-handed, +Y up, meters).
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct HostPose {
    pub position: Vec3,
    pub orientation: Quat,
}

impl HostPose {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        orientation: Quat::IDENTITY,
    };
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct HostVelocity {
    pub linear: Vec3,
    pub angular: Vec3,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Left, Side::Right];

    pub fn index(self) -> usize {
        match self {
            Side::Left => 0,
            Side::Right => 1,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Eye {
    Left,
    Right,
}

/// The device whose pose is being queried.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DeviceIndex {
    Head,
    Hand(Side),
}

/// Physical controller shapes the host runtime can report as connected.
/// Names match the interaction-profile families `spec.md` §4.6 remaps
/// between.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum HostControllerType {
    OculusTouch,
    ValveIndex,
    HtcVive,
    WindowsMixedReality,
    Simple,
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct ControllerConnection {
    pub left: Option<HostControllerType>,
    pub right: Option<HostControllerType>,
}

impl ControllerConnection {
    pub fn get(&self, side: Side) -> Option<HostControllerType> {
        match side {
            Side::Left => self.left,
            Side::Right => self.right,
        }
    }
}

bitflags::bitflags! {
    /// Per-side button bitmask, as delivered in one input snapshot.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct ButtonMask: u32 {
        const A             = 1 << 0;
        const B             = 1 << 1;
        const X             = 1 << 2;
        const Y             = 1 << 3;
        const SYSTEM        = 1 << 4;
        const THUMBSTICK    = 1 << 5;
        const TRACKPAD      = 1 << 6;
        const TRIGGER_CLICK = 1 << 7;
        const GRIP_CLICK    = 1 << 8;
        const MENU          = 1 << 9;
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Vector2 {
    pub x: f32,
    pub y: f32,
}

impl Vector2 {
    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }
}

/// A snapshot of the whole input state, taken once per `SyncActions`.
/// `ActionSource` projections in the action system index into this by
/// side.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct InputSnapshot {
    pub buttons: [ButtonMask; 2],
    pub touches: [ButtonMask; 2],
    pub trigger: [f32; 2],
    pub grip: [f32; 2],
    pub thumbstick: [Vector2; 2],
    pub trackpad: [Vector2; 2],
}

/// Pixel/texel format the host swapchain speaks. The runtime's own format
/// table (`crate::swapchain::format`) maps every graphics-API format onto
/// one of these.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum HostFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    Rgba16Float,
    Rgb10A2Unorm,
    Depth24Stencil8,
    Depth32Float,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SwapchainDesc {
    pub width: u32,
    pub height: u32,
    pub format: HostFormat,
    pub is_depth: bool,
}

/// Opaque handle to a host-side resolved slice (single-layer,
/// single-sample swapchain the host compositor actually consumes).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct HostSwapchain(pub u64);

/// A raw, vendor-defined shared resource handle (D3D11 texture pointer,
/// NT handle, Vulkan external-memory fd, ...). Opaque to everything but
/// the graphics interop layer that requested it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct RawHandle(pub u64);

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Fov {
    pub angle_left: f32,
    pub angle_right: f32,
    pub angle_up: f32,
    pub angle_down: f32,
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct EyeRenderInfo {
    pub fov: Fov,
    pub head_from_eye: HostPose,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct HmdDescriptor {
    pub resolution: (u32, u32),
    pub refresh_rates: &'static [f32],
    /// 0.0 means "stage-tracked, no known eye height yet" -- see
    /// `spec.md` §4.5's floor-height inference.
    pub eye_height: f32,
}

pub type FrameId = u64;

/// One composition layer as handed to the host compositor. The runtime
/// builds these during `EndFrame`; shape mirrors the host's own
/// `EyeFov`/`EyeFovDepth`/`Quad`/`Cylinder`/`Cube` layer union described in
/// `spec.md` §4.7.
#[derive(Clone, Debug)]
pub enum HostLayer {
    EyeFov {
        views: [HostViewLayer; 2],
    },
    EyeFovDepth {
        views: [HostViewLayer; 2],
        depth: [HostDepthLayer; 2],
    },
    Quad {
        swapchain: HostSwapchain,
        image_index: u32,
        pose: HostPose,
        size: (f32, f32),
        head_locked: bool,
    },
    Cylinder {
        swapchain: HostSwapchain,
        image_index: u32,
        pose: HostPose,
        radius: f32,
        central_angle: f32,
        aspect_ratio: f32,
    },
    Cube {
        swapchain: HostSwapchain,
        orientation: Quat,
    },
    /// Stamps frame timing without submitting visible content; used when
    /// the application's layer list is empty (`spec.md` §4.7).
    Dummy,
}

#[derive(Copy, Clone, Debug)]
pub struct HostViewLayer {
    pub swapchain: HostSwapchain,
    pub image_index: u32,
    pub rect: (i32, i32, u32, u32),
    pub fov: Fov,
    pub pose: HostPose,
}

#[derive(Copy, Clone, Debug)]
pub struct HostDepthLayer {
    pub swapchain: HostSwapchain,
    pub image_index: u32,
    pub near_z: f32,
    pub far_z: f32,
}

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("host runtime call failed with code {0}")]
    CallFailed(i32),
    #[error("host runtime reported device lost")]
    DeviceLost,
    #[error("host runtime timed out")]
    TimedOut,
}

pub type HostResult<T> = Result<T, HostError>;

/// The seam between the OpenXR-facing logic and the host VR runtime.
/// `RealHost` (in this crate, behind a real linked SDK) and
/// `fakehost::FakeHost` (for tests) both implement this.
pub trait HostRuntime: Send + Sync + fmt::Debug + 'static {
    fn hmd_descriptor(&self) -> HmdDescriptor;
    fn eye_render_info(&self, eye: Eye) -> EyeRenderInfo;

    /// DXGI adapter LUID of the GPU the host compositor is driving, packed
    /// as `(high_part << 32) | low_part`. D3D11/D3D12 session creation
    /// compares this against the app's device per `spec.md` §4.4;
    /// Vulkan/OpenGL bindings don't need it.
    fn adapter_luid(&self) -> u64;

    /// Seconds-domain clock the host runtime uses for pose prediction and
    /// frame pacing; `crate::time` anchors its offset against this once.
    fn now_seconds(&self) -> f64;

    fn device_pose(
        &self,
        device: DeviceIndex,
        time_seconds: f64,
    ) -> Option<(HostPose, HostVelocity)>;
    fn connected_controllers(&self) -> ControllerConnection;
    fn input_snapshot(&self) -> InputSnapshot;
    fn set_vibration(&self, side: Side, frequency_hz: f32, amplitude: f32, duration_seconds: f32);

    fn wait_to_begin_frame(&self, frame: FrameId) -> HostResult<()>;
    fn begin_frame(&self, frame: FrameId) -> HostResult<()>;
    fn end_frame(&self, frame: FrameId, layers: &[HostLayer]) -> HostResult<()>;
    /// The predicted display time for the frame about to be waited on,
    /// host seconds domain.
    fn predicted_display_time(&self, frame: FrameId) -> f64;
    fn ideal_frame_duration(&self) -> f64;
    fn is_reprojecting(&self) -> bool;

    fn create_swapchain(&self, desc: SwapchainDesc) -> HostResult<HostSwapchain>;
    fn destroy_swapchain(&self, handle: HostSwapchain);
    fn swapchain_image_count(&self, handle: HostSwapchain) -> u32;
    fn swapchain_textures(&self, handle: HostSwapchain) -> Vec<RawHandle>;
    fn swapchain_acquire(&self, handle: HostSwapchain) -> u32;
    fn swapchain_wait(&self, handle: HostSwapchain, timeout_seconds: f32) -> bool;
    fn swapchain_release(&self, handle: HostSwapchain);
    /// Advances the host's own internal index for this slice. Called
    /// exactly once per (swapchain, slice) per frame by the preprocess
    /// step, per `spec.md` §4.3.
    fn swapchain_commit(&self, handle: HostSwapchain);
}
