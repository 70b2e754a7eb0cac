//! Pose composition/inversion, quaternion normalization checks, and
//! velocity transforms shared by the space graph and frame lifecycle.

use glam::{Quat, Vec3};
use hostapi::{HostPose, HostVelocity};
use openxr_sys as xr;

/// Quaternions outside this norm band are treated as `POSE_INVALID` per the
/// design notes; layer poses computed internally are exempt since we can
/// assume normalization there.
const NORMALIZATION_EPSILON: f32 = 1e-5;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub orientation: Quat,
}

impl Pose {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        orientation: Quat::IDENTITY,
    };

    pub fn from_host(pose: HostPose) -> Self {
        Self {
            position: pose.position,
            orientation: pose.orientation,
        }
    }

    pub fn to_host(self) -> HostPose {
        HostPose {
            position: self.position,
            orientation: self.orientation,
        }
    }

    pub fn from_xr(pose: xr::Posef) -> Self {
        Self {
            position: Vec3::new(pose.position.x, pose.position.y, pose.position.z),
            orientation: Quat::from_xyzw(
                pose.orientation.x,
                pose.orientation.y,
                pose.orientation.z,
                pose.orientation.w,
            ),
        }
    }

    pub fn to_xr(self) -> xr::Posef {
        xr::Posef {
            orientation: xr::Quaternionf {
                x: self.orientation.x,
                y: self.orientation.y,
                z: self.orientation.z,
                w: self.orientation.w,
            },
            position: xr::Vector3f {
                x: self.position.x,
                y: self.position.y,
                z: self.position.z,
            },
        }
    }

    /// `self` expressed as an offset composed on top of `other`: the pose
    /// of a frame whose parent is `other` and whose local pose is `self`.
    pub fn compose(self, other: Pose) -> Pose {
        Pose {
            position: other.position + other.orientation * self.position,
            orientation: other.orientation * self.orientation,
        }
    }

    pub fn inverse(self) -> Pose {
        let inv_rot = self.orientation.inverse();
        Pose {
            position: inv_rot * -self.position,
            orientation: inv_rot,
        }
    }

    pub fn is_normalized(self) -> bool {
        let norm = self.orientation.length();
        (norm - 1.0).abs() <= NORMALIZATION_EPSILON
    }

    /// Mirrors a left-hand calibration offset onto the right hand: negate
    /// X position and the Y,Z quaternion components, per §4.5.
    pub fn mirrored_for_right_hand(self) -> Pose {
        Pose {
            position: Vec3::new(-self.position.x, self.position.y, self.position.z),
            orientation: Quat::from_xyzw(
                self.orientation.x,
                -self.orientation.y,
                -self.orientation.z,
                self.orientation.w,
            ),
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Velocity {
    pub linear: Vec3,
    pub angular: Vec3,
}

impl Velocity {
    pub fn from_host(velocity: HostVelocity) -> Self {
        Self {
            linear: velocity.linear,
            angular: velocity.angular,
        }
    }

    /// Velocity of `self` as seen relative to `base`'s frame. Linear
    /// velocity ignores centripetal coupling from the angular term --
    /// a documented imprecision, not an oversight.
    pub fn relative_to(self, base: Velocity) -> Velocity {
        Velocity {
            linear: self.linear - base.linear,
            angular: self.angular - base.angular,
        }
    }
}

/// Computes per-eye poses from a head pose and the fixed head-to-eye
/// offsets reported by the host, optionally adjusting IPD for a world
/// scale override by keeping the midpoint fixed and scaling the offsets.
pub fn calc_eye_poses(head: Pose, head_to_eye: [Pose; 2], world_scale: Option<f32>) -> [Pose; 2] {
    let offsets = match world_scale {
        Some(scale) if scale > 0.0 => {
            let midpoint = (head_to_eye[0].position + head_to_eye[1].position) * 0.5;
            let scale_inv = 1.0 / scale;
            [
                Pose {
                    position: midpoint + (head_to_eye[0].position - midpoint) * scale_inv,
                    orientation: head_to_eye[0].orientation,
                },
                Pose {
                    position: midpoint + (head_to_eye[1].position - midpoint) * scale_inv,
                    orientation: head_to_eye[1].orientation,
                },
            ]
        }
        _ => head_to_eye,
    };
    [offsets[0].compose(head), offsets[1].compose(head)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_then_inverse_is_identity() {
        let a = Pose {
            position: Vec3::new(1.0, 2.0, 3.0),
            orientation: Quat::from_rotation_y(0.7),
        };
        let b = Pose {
            position: Vec3::new(-1.0, 0.5, 0.0),
            orientation: Quat::from_rotation_x(0.2),
        };
        let composed = a.compose(b);
        let recovered = a.compose(b).compose(composed.inverse());
        assert!(recovered.position.length() < 1e-4);
    }

    #[test]
    fn identity_is_normalized() {
        assert!(Pose::IDENTITY.is_normalized());
    }

    #[test]
    fn mirrored_offset_negates_x_and_yz_rotation() {
        let offset = Pose {
            position: Vec3::new(0.02, 0.0, -0.05),
            orientation: Quat::from_xyzw(0.1, 0.2, 0.3, 0.9),
        };
        let mirrored = offset.mirrored_for_right_hand();
        assert_eq!(mirrored.position.x, -offset.position.x);
        assert_eq!(mirrored.orientation.y, -offset.orientation.y);
        assert_eq!(mirrored.orientation.z, -offset.orientation.z);
        assert_eq!(mirrored.orientation.w, offset.orientation.w);
    }
}
