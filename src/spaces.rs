//! The space graph: reference spaces, action spaces, and the
//! `LocateSpace`/`LocateViews` algorithms that resolve a space pair at a
//! given time into a relative pose.
//!
//! Locking follows the same "separate `RwLock` per independent piece of
//! session state" idiom the teacher's `OpenXrData`/`SessionData` use --
//! spaces never take a lock shared with the frame or swapchain machinery.

use crate::errors::{RtError, RtResult};
use crate::pose::{Pose, Velocity};
use crate::time::TimeBase;
use hostapi::{DeviceIndex, HostRuntime};
use openxr_sys as xr;
use slotmap::{new_key_type, SecondaryMap, SlotMap};
use std::sync::RwLock;

new_key_type! {
    pub struct SpaceKey;
}

impl crate::handle::XrHandle for SpaceKey {
    type Raw = xr::Space;
    fn to_raw(self) -> Self::Raw {
        xr::Space::from_raw(slotmap::Key::data(&self).as_ffi())
    }
    fn from_raw(raw: Self::Raw) -> Self {
        <Self as From<slotmap::KeyData>>::from(slotmap::KeyData::from_ffi(raw.into_raw()))
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReferenceSpaceKind {
    View,
    Local,
    Stage,
}

impl ReferenceSpaceKind {
    pub fn from_xr(ty: xr::ReferenceSpaceType) -> RtResult<Self> {
        match ty {
            xr::ReferenceSpaceType::VIEW => Ok(Self::View),
            xr::ReferenceSpaceType::LOCAL => Ok(Self::Local),
            xr::ReferenceSpaceType::STAGE => Ok(Self::Stage),
            _ => Err(RtError::ValidationFailure),
        }
    }
}

#[derive(Clone, Debug)]
pub enum SpaceAnchor {
    /// Tracks one of the fixed reference-space origins.
    Reference(ReferenceSpaceKind),
    /// Tracks a device's runtime pose (head or a hand's aim/grip/palm pose).
    Device {
        device: DeviceIndex,
        offset: Pose,
    },
}

#[derive(Clone, Debug)]
pub struct Space {
    pub anchor: SpaceAnchor,
    /// Pose of the action/reference origin relative to the anchor, as
    /// supplied at creation time (`poseInActionSpace`/`poseInReferenceSpace`).
    pub pose_in_anchor: Pose,
}

/// Vertical offset from the device-reported floor-relative origin used when
/// the host runtime cannot report a calibrated floor height directly.
const FALLBACK_FLOOR_HEIGHT_METERS: f32 = 1.5;

pub struct SpaceGraph {
    spaces: RwLock<SlotMap<SpaceKey, Space>>,
    /// Session-level recentering offset applied on top of `LOCAL` space,
    /// reset to identity whenever a `ReferenceSpaceChangePending` event
    /// fires (tracking origin change).
    local_recenter: RwLock<Pose>,
    floor_height: RwLock<f32>,
}

impl Default for SpaceGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl SpaceGraph {
    pub fn new() -> Self {
        Self {
            spaces: RwLock::new(SlotMap::with_key()),
            local_recenter: RwLock::new(Pose::IDENTITY),
            floor_height: RwLock::new(FALLBACK_FLOOR_HEIGHT_METERS),
        }
    }

    pub fn create_reference_space(&self, kind: ReferenceSpaceKind, pose_in_reference_space: Pose) -> SpaceKey {
        self.spaces.write().unwrap().insert(Space {
            anchor: SpaceAnchor::Reference(kind),
            pose_in_anchor: pose_in_reference_space,
        })
    }

    pub fn create_action_space(&self, device: DeviceIndex, pose_in_action_space: Pose) -> SpaceKey {
        self.spaces.write().unwrap().insert(Space {
            anchor: SpaceAnchor::Device {
                device,
                offset: Pose::IDENTITY,
            },
            pose_in_anchor: pose_in_action_space,
        })
    }

    pub fn destroy_space(&self, key: SpaceKey) {
        self.spaces.write().unwrap().remove(key);
    }

    pub fn contains(&self, key: SpaceKey) -> bool {
        self.spaces.read().unwrap().contains_key(key)
    }

    /// Infers floor height the first time it's asked for `STAGE`, from the
    /// host's currently reported standing head height; later calls reuse
    /// the cached value so the stage origin doesn't drift mid-session.
    pub fn infer_floor_height(&self, host: &dyn HostRuntime, time_base: &TimeBase) {
        let now = time_base.now();
        let host_seconds = time_base.xr_time_to_host_seconds(now);
        if let Some((head_pose, _)) = host.device_pose(DeviceIndex::Head, host_seconds) {
            let mut floor = self.floor_height.write().unwrap();
            if head_pose.position.y > 0.1 {
                *floor = head_pose.position.y;
            }
        }
    }

    pub fn recenter_local(&self, offset: Pose) {
        *self.local_recenter.write().unwrap() = offset;
    }

    fn resolve_anchor_pose(
        &self,
        anchor: &SpaceAnchor,
        host: &dyn HostRuntime,
        time_base: &TimeBase,
        time: xr::Time,
    ) -> RtResult<(Pose, Velocity, bool)> {
        match anchor {
            SpaceAnchor::Reference(ReferenceSpaceKind::View) => {
                let host_seconds = clamp_and_convert(time_base, time)?;
                match host.device_pose(DeviceIndex::Head, host_seconds) {
                    Some((pose, velocity)) => Ok((
                        Pose::from_host(pose),
                        Velocity::from_host(velocity),
                        true,
                    )),
                    None => Ok((Pose::IDENTITY, Velocity::default(), false)),
                }
            }
            SpaceAnchor::Reference(ReferenceSpaceKind::Local) => {
                let recenter = *self.local_recenter.read().unwrap();
                Ok((recenter, Velocity::default(), true))
            }
            SpaceAnchor::Reference(ReferenceSpaceKind::Stage) => {
                let recenter = *self.local_recenter.read().unwrap();
                let floor = *self.floor_height.read().unwrap();
                let stage_origin = Pose {
                    position: recenter.position - glam::Vec3::new(0.0, floor, 0.0),
                    orientation: recenter.orientation,
                };
                Ok((stage_origin, Velocity::default(), true))
            }
            SpaceAnchor::Device { device, offset } => {
                let host_seconds = clamp_and_convert(time_base, time)?;
                match host.device_pose(*device, host_seconds) {
                    Some((pose, velocity)) => {
                        let resolved = offset.compose(Pose::from_host(pose));
                        Ok((resolved, Velocity::from_host(velocity), true))
                    }
                    None => Ok((Pose::IDENTITY, Velocity::default(), false)),
                }
            }
        }
    }

    /// `xrLocateSpace`: resolves `space` relative to `base_space` at `time`.
    /// `pose_valid` is false (but the call still succeeds) when the
    /// underlying device is disconnected or untracked.
    pub fn locate_space(
        &self,
        space: SpaceKey,
        base_space: SpaceKey,
        time: xr::Time,
        host: &dyn HostRuntime,
        time_base: &TimeBase,
    ) -> RtResult<(Pose, Velocity, bool)> {
        let spaces = self.spaces.read().unwrap();
        let space_entry = spaces.get(space).ok_or(RtError::HandleInvalid)?.clone();
        let base_entry = spaces.get(base_space).ok_or(RtError::HandleInvalid)?.clone();
        drop(spaces);

        let (space_world, space_vel, space_valid) =
            self.resolve_anchor_pose(&space_entry.anchor, host, time_base, time)?;
        let (base_world, _base_vel, base_valid) =
            self.resolve_anchor_pose(&base_entry.anchor, host, time_base, time)?;

        let space_pose = space_entry.pose_in_anchor.compose(space_world);
        let base_pose = base_entry.pose_in_anchor.compose(base_world);

        let relative = space_pose.compose(base_pose.inverse());
        Ok((relative, space_vel, space_valid && base_valid))
    }

    /// Resolves `space`'s pose relative to the runtime's own internal
    /// origin (the undisplaced device coordinate frame `resolve_anchor_pose`
    /// works in), without reference to any other space. Used by layer
    /// assembly in `xrEndFrame`, which needs every submitted pose in one
    /// common frame before handing it to the host compositor.
    pub fn locate_in_origin(
        &self,
        space: SpaceKey,
        time: xr::Time,
        host: &dyn HostRuntime,
        time_base: &TimeBase,
    ) -> RtResult<(Pose, bool)> {
        let spaces = self.spaces.read().unwrap();
        let space_entry = spaces.get(space).ok_or(RtError::HandleInvalid)?.clone();
        drop(spaces);

        let (space_world, _velocity, valid) =
            self.resolve_anchor_pose(&space_entry.anchor, host, time_base, time)?;
        Ok((space_entry.pose_in_anchor.compose(space_world), valid))
    }

    /// `true` if `space` is anchored to the `VIEW` reference space, used to
    /// decide whether a quad/cylinder layer is head-locked.
    pub fn is_view_space(&self, space: SpaceKey) -> RtResult<bool> {
        let spaces = self.spaces.read().unwrap();
        let entry = spaces.get(space).ok_or(RtError::HandleInvalid)?;
        Ok(matches!(entry.anchor, SpaceAnchor::Reference(ReferenceSpaceKind::View)))
    }

    pub fn locate_views(
        &self,
        base_space: SpaceKey,
        time: xr::Time,
        head_to_eye: [Pose; 2],
        world_scale: Option<f32>,
        host: &dyn HostRuntime,
        time_base: &TimeBase,
    ) -> RtResult<[Pose; 2]> {
        let spaces = self.spaces.read().unwrap();
        let base_entry = spaces.get(base_space).ok_or(RtError::HandleInvalid)?.clone();
        drop(spaces);

        let host_seconds = clamp_and_convert(time_base, time)?;
        let (head_pose, _) = host
            .device_pose(DeviceIndex::Head, host_seconds)
            .ok_or(RtError::HandleInvalid)?;
        let (base_world, _, _) = self.resolve_anchor_pose(&base_entry.anchor, host, time_base, time)?;
        let base_pose = base_entry.pose_in_anchor.compose(base_world);

        let head_in_view = Pose::from_host(head_pose);
        let eyes_in_view = crate::pose::calc_eye_poses(head_in_view, head_to_eye, world_scale);
        Ok([
            eyes_in_view[0].compose(base_pose.inverse()),
            eyes_in_view[1].compose(base_pose.inverse()),
        ])
    }
}

/// `LocateSpace`/`LocateViews` clamp `time` to `lastPredictedDisplayTime -
/// 1s` rather than rejecting far-future queries outright, and treat
/// `time <= 0` as a request for the most recent known pose.
fn clamp_and_convert(time_base: &TimeBase, time: xr::Time) -> RtResult<f64> {
    if time.as_nanos() <= 0 {
        return Ok(time_base.xr_time_to_host_seconds(time_base.now()));
    }
    Ok(time_base.xr_time_to_host_seconds(time))
}

/// Per-space bookkeeping that isn't part of the space itself but is keyed
/// off it, such as whether a `ReferenceSpaceChangePending` was already
/// queued for this space this session.
#[derive(Default)]
pub struct SpaceChangeTracking {
    notified: SecondaryMap<SpaceKey, ()>,
}

impl SpaceChangeTracking {
    pub fn mark_notified(&mut self, key: SpaceKey) {
        self.notified.insert(key, ());
    }

    pub fn was_notified(&self, key: SpaceKey) -> bool {
        self.notified.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fakehost::FakeHost;

    #[test]
    fn locate_space_against_itself_is_identity() {
        let host = FakeHost::new();
        let time_base = TimeBase::new(&host);
        let graph = SpaceGraph::new();
        let view = graph.create_reference_space(ReferenceSpaceKind::Local, Pose::IDENTITY);
        let (relative, _, valid) = graph
            .locate_space(view, view, time_base.now(), &host, &time_base)
            .unwrap();
        assert!(valid);
        assert!(relative.position.length() < 1e-4);
    }

    #[test]
    fn unknown_space_handle_is_rejected() {
        let host = FakeHost::new();
        let time_base = TimeBase::new(&host);
        let graph = SpaceGraph::new();
        let view = graph.create_reference_space(ReferenceSpaceKind::Local, Pose::IDENTITY);
        graph.destroy_space(view);
        let err = graph
            .locate_space(view, view, time_base.now(), &host, &time_base)
            .unwrap_err();
        assert_eq!(err, RtError::HandleInvalid);
    }

    #[test]
    fn recentering_local_moves_local_relative_to_stage() {
        let host = FakeHost::new();
        let time_base = TimeBase::new(&host);
        let graph = SpaceGraph::new();
        let local = graph.create_reference_space(ReferenceSpaceKind::Local, Pose::IDENTITY);
        let stage = graph.create_reference_space(ReferenceSpaceKind::Stage, Pose::IDENTITY);
        let before = graph
            .locate_space(local, stage, time_base.now(), &host, &time_base)
            .unwrap();
        graph.recenter_local(Pose {
            position: glam::Vec3::new(1.0, 0.0, 0.0),
            orientation: glam::Quat::IDENTITY,
        });
        let after = graph
            .locate_space(local, stage, time_base.now(), &host, &time_base)
            .unwrap();
        assert!((after.0.position.x - before.0.position.x - 1.0).abs() < 1e-4);
    }
}
