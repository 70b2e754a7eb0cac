//! Interaction profile path table: the fixed set of
//! `/interaction_profiles/...` paths this runtime recognizes, one per
//! `HostControllerType` the host reports as connected.
//!
//! Grounded on the teacher's `profiles::InteractionProfile` registry
//! (`knuckles.rs`/`oculus_touch.rs`/`vive_controller.rs`/
//! `simple_controller.rs`), generalized from OpenVR render-model metadata
//! to the bare profile-path + binding-family shape an OpenXR runtime needs.

use hostapi::HostControllerType;

#[derive(Copy, Clone, Debug)]
pub struct InteractionProfile {
    path: &'static str,
    /// Binding suffixes (`"trigger/value"`, `"squeeze/click"`, ...) this
    /// profile actually exposes; used to validate
    /// `SuggestInteractionProfileBindings` against §4.6's legal-path table.
    pub legal_components: &'static [&'static str],
}

impl InteractionProfile {
    pub fn profile_path(&self) -> &'static str {
        self.path
    }
}

const INDEX_COMPONENTS: &[&str] = &[
    "input/trigger/value",
    "input/trigger/click",
    "input/squeeze/value",
    "input/squeeze/force",
    "input/thumbstick/x",
    "input/thumbstick/y",
    "input/thumbstick/click",
    "input/trackpad/x",
    "input/trackpad/y",
    "input/trackpad/force",
    "input/a/click",
    "input/b/click",
    "input/grip/pose",
    "input/aim/pose",
    "output/haptic",
];

const TOUCH_COMPONENTS: &[&str] = &[
    "input/trigger/value",
    "input/squeeze/value",
    "input/thumbstick/x",
    "input/thumbstick/y",
    "input/thumbstick/click",
    "input/x/click",
    "input/y/click",
    "input/a/click",
    "input/b/click",
    "input/grip/pose",
    "input/aim/pose",
    "output/haptic",
];

const VIVE_COMPONENTS: &[&str] = &[
    "input/trigger/value",
    "input/trigger/click",
    "input/squeeze/click",
    "input/trackpad/x",
    "input/trackpad/y",
    "input/trackpad/click",
    "input/menu/click",
    "input/grip/pose",
    "input/aim/pose",
    "output/haptic",
];

const SIMPLE_COMPONENTS: &[&str] = &[
    "input/select/click",
    "input/menu/click",
    "input/grip/pose",
    "input/aim/pose",
    "output/haptic",
];

pub const PROFILES: &[(HostControllerType, InteractionProfile)] = &[
    (
        HostControllerType::ValveIndex,
        InteractionProfile {
            path: "/interaction_profiles/valve/index_controller",
            legal_components: INDEX_COMPONENTS,
        },
    ),
    (
        HostControllerType::OculusTouch,
        InteractionProfile {
            path: "/interaction_profiles/oculus/touch_controller",
            legal_components: TOUCH_COMPONENTS,
        },
    ),
    (
        HostControllerType::HtcVive,
        InteractionProfile {
            path: "/interaction_profiles/htc/vive_controller",
            legal_components: VIVE_COMPONENTS,
        },
    ),
    (
        HostControllerType::WindowsMixedReality,
        InteractionProfile {
            path: "/interaction_profiles/microsoft/motion_controller",
            legal_components: TOUCH_COMPONENTS,
        },
    ),
    (
        HostControllerType::Simple,
        InteractionProfile {
            path: "/interaction_profiles/khr/simple_controller",
            legal_components: SIMPLE_COMPONENTS,
        },
    ),
];

pub fn profile_for(controller: HostControllerType) -> &'static InteractionProfile {
    &PROFILES
        .iter()
        .find(|(ty, _)| *ty == controller)
        .expect("every HostControllerType has a profile entry")
        .1
}
