//! An in-memory stand-in for the vendor host VR runtime, used in place of
//! [`hostapi::sys::RealHost`] under test. Plays the same role `fakexr` plays
//! for the OpenXR entry points themselves: a deterministic, scriptable
//! double that the unit tests drive directly instead of talking to real
//! hardware.

use crossbeam_utils::atomic::AtomicCell;
use glam::{Quat, Vec3};
use hostapi::{
    ControllerConnection, DeviceIndex, Eye, EyeRenderInfo, Fov, FrameId, HmdDescriptor,
    HostControllerType, HostError, HostFormat, HostLayer, HostPose, HostResult, HostRuntime,
    HostSwapchain, HostVelocity, InputSnapshot, RawHandle, Side, SwapchainDesc,
};
use slotmap::{new_key_type, SlotMap};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

new_key_type! { struct SwapchainKey; }

struct FakeSwapchain {
    desc: SwapchainDesc,
    image_count: u32,
    acquired_index: AtomicU32,
}

/// One vibration request, recorded for assertions in tests that exercise
/// haptics.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct VibrationCall {
    pub side: Side,
    pub frequency_hz: f32,
    pub amplitude: f32,
    pub duration_seconds: f32,
}

/// One recorded `end_frame` call: the frame id and a snapshot of how many
/// layers were submitted (layer contents themselves are not `Clone`-free of
/// swapchain handles, so tests that need more detail should inspect
/// `take_submitted_layers` instead).
#[derive(Debug)]
pub struct EndFrameCall {
    pub frame: FrameId,
    pub layer_count: usize,
}

#[derive(Default)]
struct DeviceState {
    pose: AtomicCell<HostPose>,
    velocity: AtomicCell<HostVelocity>,
    tracked: std::sync::atomic::AtomicBool,
}

impl DeviceState {
    fn new() -> Self {
        Self {
            pose: AtomicCell::new(HostPose::IDENTITY),
            velocity: AtomicCell::new(HostVelocity::default()),
            tracked: std::sync::atomic::AtomicBool::new(true),
        }
    }
}

/// Deterministic, fully in-process implementation of [`HostRuntime`].
///
/// Every input is a plain setter the test drives before calling into the
/// runtime under test; nothing here reads real hardware or the wall clock
/// unless the test supplies a time explicitly.
pub struct FakeHost {
    hmd: RwLock<HmdDescriptor>,
    eyes: [AtomicCell<EyeRenderInfo>; 2],
    clock_seconds: AtomicCell<f64>,
    head: DeviceState,
    hands: [DeviceState; 2],
    controllers: RwLock<ControllerConnection>,
    input: RwLock<InputSnapshot>,
    vibrations: Mutex<Vec<VibrationCall>>,
    frame_counter: AtomicU64,
    waited: AtomicU64,
    begun: AtomicU64,
    ended: AtomicU64,
    predicted_display_time_step: AtomicCell<f64>,
    ideal_frame_duration: AtomicCell<f64>,
    reprojecting: std::sync::atomic::AtomicBool,
    swapchains: Mutex<SlotMap<SwapchainKey, FakeSwapchain>>,
    end_frame_calls: Mutex<Vec<EndFrameCall>>,
    /// When set, `wait_to_begin_frame`/`begin_frame`/`end_frame` return this
    /// error once, then clear it, letting tests script a single failure.
    next_frame_error: Mutex<Option<HostError>>,
    adapter_luid: AtomicU64,
}

const DEFAULT_REFRESH_RATES: &[f32] = &[72.0, 80.0, 90.0, 120.0];

impl Default for FakeHost {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeHost {
    pub fn new() -> Self {
        let identity_eye = EyeRenderInfo {
            fov: Fov {
                angle_left: -0.8,
                angle_right: 0.8,
                angle_up: 0.8,
                angle_down: -0.8,
            },
            head_from_eye: HostPose {
                position: Vec3::new(0.0, 0.0, 0.0),
                orientation: Quat::IDENTITY,
            },
        };
        Self {
            hmd: RwLock::new(HmdDescriptor {
                resolution: (1832, 1920),
                refresh_rates: DEFAULT_REFRESH_RATES,
                eye_height: 1.7,
            }),
            eyes: [AtomicCell::new(identity_eye), AtomicCell::new(identity_eye)],
            clock_seconds: AtomicCell::new(0.0),
            head: DeviceState::new(),
            hands: [DeviceState::new(), DeviceState::new()],
            controllers: RwLock::new(ControllerConnection {
                left: Some(HostControllerType::OculusTouch),
                right: Some(HostControllerType::OculusTouch),
            }),
            input: RwLock::new(InputSnapshot::default()),
            vibrations: Mutex::new(Vec::new()),
            frame_counter: AtomicU64::new(0),
            waited: AtomicU64::new(0),
            begun: AtomicU64::new(0),
            ended: AtomicU64::new(0),
            predicted_display_time_step: AtomicCell::new(1.0 / 90.0),
            ideal_frame_duration: AtomicCell::new(1.0 / 90.0),
            reprojecting: std::sync::atomic::AtomicBool::new(false),
            swapchains: Mutex::new(SlotMap::with_key()),
            end_frame_calls: Mutex::new(Vec::new()),
            next_frame_error: Mutex::new(None),
            adapter_luid: AtomicU64::new(0x1234_5678),
        }
    }

    pub fn set_adapter_luid(&self, luid: u64) {
        self.adapter_luid.store(luid, Ordering::Relaxed);
    }

    pub fn set_clock_seconds(&self, seconds: f64) {
        self.clock_seconds.store(seconds);
    }

    pub fn advance_clock(&self, delta_seconds: f64) {
        self.clock_seconds
            .store(self.clock_seconds.load() + delta_seconds);
    }

    pub fn set_device_pose(&self, device: DeviceIndex, pose: HostPose) {
        self.device_state(device).pose.store(pose);
    }

    pub fn set_device_velocity(&self, device: DeviceIndex, velocity: HostVelocity) {
        self.device_state(device).velocity.store(velocity);
    }

    pub fn set_device_tracked(&self, device: DeviceIndex, tracked: bool) {
        self.device_state(device)
            .tracked
            .store(tracked, Ordering::Relaxed);
    }

    pub fn set_controllers(&self, connection: ControllerConnection) {
        *self.controllers.write().unwrap() = connection;
    }

    pub fn set_input_snapshot(&self, snapshot: InputSnapshot) {
        *self.input.write().unwrap() = snapshot;
    }

    pub fn set_ideal_frame_duration(&self, seconds: f64) {
        self.ideal_frame_duration.store(seconds);
    }

    pub fn set_reprojecting(&self, reprojecting: bool) {
        self.reprojecting.store(reprojecting, Ordering::Relaxed);
    }

    /// The next `wait_to_begin_frame`/`begin_frame`/`end_frame` call fails
    /// with `error`, then behavior reverts to success.
    pub fn fail_next_frame_call(&self, error: HostError) {
        *self.next_frame_error.lock().unwrap() = Some(error);
    }

    pub fn vibration_calls(&self) -> Vec<VibrationCall> {
        self.vibrations.lock().unwrap().clone()
    }

    pub fn take_end_frame_calls(&self) -> Vec<EndFrameCall> {
        std::mem::take(&mut self.end_frame_calls.lock().unwrap())
    }

    pub fn frames_waited(&self) -> u64 {
        self.waited.load(Ordering::Relaxed)
    }

    pub fn frames_begun(&self) -> u64 {
        self.begun.load(Ordering::Relaxed)
    }

    pub fn frames_ended(&self) -> u64 {
        self.ended.load(Ordering::Relaxed)
    }

    fn device_state(&self, device: DeviceIndex) -> &DeviceState {
        match device {
            DeviceIndex::Head => &self.head,
            DeviceIndex::Hand(Side::Left) => &self.hands[0],
            DeviceIndex::Hand(Side::Right) => &self.hands[1],
        }
    }

    fn take_scripted_error(&self) -> Option<HostError> {
        self.next_frame_error.lock().unwrap().take()
    }
}

impl std::fmt::Debug for FakeHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeHost").finish_non_exhaustive()
    }
}

impl HostRuntime for FakeHost {
    fn hmd_descriptor(&self) -> HmdDescriptor {
        *self.hmd.read().unwrap()
    }

    fn eye_render_info(&self, eye: Eye) -> EyeRenderInfo {
        self.eyes[eye as usize].load()
    }

    fn now_seconds(&self) -> f64 {
        self.clock_seconds.load()
    }

    fn adapter_luid(&self) -> u64 {
        self.adapter_luid.load(Ordering::Relaxed)
    }

    fn device_pose(&self, device: DeviceIndex, _time_seconds: f64) -> Option<(HostPose, HostVelocity)> {
        let state = self.device_state(device);
        if !state.tracked.load(Ordering::Relaxed) {
            return None;
        }
        Some((state.pose.load(), state.velocity.load()))
    }

    fn connected_controllers(&self) -> ControllerConnection {
        *self.controllers.read().unwrap()
    }

    fn input_snapshot(&self) -> InputSnapshot {
        *self.input.read().unwrap()
    }

    fn set_vibration(&self, side: Side, frequency_hz: f32, amplitude: f32, duration_seconds: f32) {
        self.vibrations.lock().unwrap().push(VibrationCall {
            side,
            frequency_hz,
            amplitude,
            duration_seconds,
        });
    }

    fn wait_to_begin_frame(&self, _frame: FrameId) -> HostResult<()> {
        if let Some(err) = self.take_scripted_error() {
            return Err(err);
        }
        self.waited.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn begin_frame(&self, _frame: FrameId) -> HostResult<()> {
        if let Some(err) = self.take_scripted_error() {
            return Err(err);
        }
        self.begun.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn end_frame(&self, frame: FrameId, layers: &[HostLayer]) -> HostResult<()> {
        if let Some(err) = self.take_scripted_error() {
            return Err(err);
        }
        self.ended.fetch_add(1, Ordering::Relaxed);
        self.end_frame_calls.lock().unwrap().push(EndFrameCall {
            frame,
            layer_count: layers.len(),
        });
        Ok(())
    }

    fn predicted_display_time(&self, frame: FrameId) -> f64 {
        self.clock_seconds.load() + frame as f64 * self.predicted_display_time_step.load()
    }

    fn ideal_frame_duration(&self) -> f64 {
        self.ideal_frame_duration.load()
    }

    fn is_reprojecting(&self) -> bool {
        self.reprojecting.load(Ordering::Relaxed)
    }

    fn create_swapchain(&self, desc: SwapchainDesc) -> HostResult<HostSwapchain> {
        let key = self.swapchains.lock().unwrap().insert(FakeSwapchain {
            desc,
            image_count: 3,
            acquired_index: AtomicU32::new(0),
        });
        Ok(HostSwapchain(key.0.as_ffi()))
    }

    fn destroy_swapchain(&self, handle: HostSwapchain) {
        self.swapchains.lock().unwrap().remove(swapchain_key(handle));
    }

    fn swapchain_image_count(&self, handle: HostSwapchain) -> u32 {
        self.swapchains
            .lock()
            .unwrap()
            .get(swapchain_key(handle))
            .map(|s| s.image_count)
            .unwrap_or(0)
    }

    fn swapchain_textures(&self, handle: HostSwapchain) -> Vec<RawHandle> {
        let count = self.swapchain_image_count(handle);
        (0..count).map(|i| RawHandle(handle.0 * 16 + i as u64)).collect()
    }

    fn swapchain_acquire(&self, handle: HostSwapchain) -> u32 {
        let swapchains = self.swapchains.lock().unwrap();
        let Some(sc) = swapchains.get(swapchain_key(handle)) else {
            return 0;
        };
        sc.acquired_index.fetch_add(1, Ordering::Relaxed) % sc.image_count
    }

    fn swapchain_wait(&self, _handle: HostSwapchain, _timeout_seconds: f32) -> bool {
        true
    }

    fn swapchain_release(&self, _handle: HostSwapchain) {}

    fn swapchain_commit(&self, _handle: HostSwapchain) {}
}

fn swapchain_key(handle: HostSwapchain) -> SwapchainKey {
    use slotmap::KeyData;
    SwapchainKey::from(KeyData::from_ffi(handle.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_host_reports_identity_poses() {
        let host = FakeHost::new();
        let (pose, _) = host.device_pose(DeviceIndex::Head, 0.0).unwrap();
        assert_eq!(pose, HostPose::IDENTITY);
    }

    #[test]
    fn untracked_device_reports_none() {
        let host = FakeHost::new();
        host.set_device_tracked(DeviceIndex::Hand(Side::Left), false);
        assert!(host.device_pose(DeviceIndex::Hand(Side::Left), 0.0).is_none());
    }

    #[test]
    fn scripted_error_fires_once() {
        let host = FakeHost::new();
        host.fail_next_frame_call(HostError::TimedOut);
        assert!(host.wait_to_begin_frame(0).is_err());
        assert!(host.wait_to_begin_frame(1).is_ok());
        assert_eq!(host.frames_waited(), 1);
    }

    #[test]
    fn swapchain_round_trips_through_create_and_destroy() {
        let host = FakeHost::new();
        let handle = host
            .create_swapchain(SwapchainDesc {
                width: 1024,
                height: 1024,
                format: HostFormat::Rgba8UnormSrgb,
                is_depth: false,
            })
            .unwrap();
        assert_eq!(host.swapchain_image_count(handle), 3);
        assert_eq!(host.swapchain_textures(handle).len(), 3);
        host.destroy_swapchain(handle);
        assert_eq!(host.swapchain_image_count(handle), 0);
    }

    #[test]
    fn vibration_calls_are_recorded() {
        let host = FakeHost::new();
        host.set_vibration(Side::Right, 160.0, 0.5, 0.1);
        let calls = host.vibration_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].side, Side::Right);
    }
}
