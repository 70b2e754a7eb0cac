//! Binding-path -> `ActionSource` remap table.
//!
//! The teacher's `custom_bindings.rs`/`legacy.rs` remap OpenXR-style
//! component paths onto OpenVR legacy action handles per-profile, keyed by
//! `(actualProfile, preferredProfile)`. Every controller this runtime talks
//! to reports state through the same `InputSnapshot` shape regardless of
//! its physical type, so the table collapses along the `actualProfile`
//! axis: only the `preferredProfile` -- the profile the application
//! actually suggested bindings under -- decides which string-rewrite rules
//! run before the canonical component match.

use super::ActionSource;
use hostapi::{ButtonMask, Side};

/// Canonical interaction-profile identifiers used as remap-table keys and
/// for rebind priority ordering.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Profile {
    Touch,
    WindowsMixedReality,
    Index,
    Vive,
    Simple,
}

impl Profile {
    pub fn path(self) -> &'static str {
        match self {
            Self::Touch => "/interaction_profiles/oculus/touch_controller",
            Self::WindowsMixedReality => "/interaction_profiles/microsoft/motion_controller",
            Self::Index => "/interaction_profiles/valve/index_controller",
            Self::Vive => "/interaction_profiles/htc/vive_controller",
            Self::Simple => "/interaction_profiles/khr/simple_controller",
        }
    }

    /// Rebind priority order: `oculus/touch_controller` bindings are
    /// preferred outright if the application suggested any, then the rest
    /// in this order. First entry whose profile path the application has
    /// suggestions for wins.
    pub const PRIORITY: [Self; 5] = [
        Self::Touch,
        Self::WindowsMixedReality,
        Self::Index,
        Self::Vive,
        Self::Simple,
    ];
}

/// Rewrites a virtual profile's component suffix (the binding path after
/// `input/`/`output/`) to the vocabulary the match below understands, per
/// side. Touch, MS Motion and Index already speak it, so they pass through
/// unchanged; Vive and Simple get the textual rewrites spec'd for them.
fn rewrite_component<'a>(profile: Profile, side: Side, component: &'a str) -> &'a str {
    match profile {
        Profile::Touch | Profile::WindowsMixedReality | Profile::Index => component,
        Profile::Vive => match component {
            "trackpad/x" => "thumbstick/x",
            "trackpad/y" => "thumbstick/y",
            "trackpad/click" => "thumbstick/click",
            "menu/click" if side == Side::Right => "a/click",
            other => other,
        },
        Profile::Simple => match component {
            "select/click" => "trigger/click",
            "menu/click" if side == Side::Right => "a/click",
            other => other,
        },
    }
}

/// `path` is the full suggested-binding path
/// (`/user/hand/left/input/trigger/value`); `preferred_profile` is the
/// interaction profile the application suggested this binding under, used
/// to pick the right virtual-profile rewrite before matching.
pub fn remap_binding(preferred_profile: Profile, side: Side, path: &str) -> ActionSource {
    let component = path
        .split("/input/")
        .nth(1)
        .or_else(|| path.split("/output/").nth(1))
        .unwrap_or(path);
    let component = rewrite_component(preferred_profile, side, component);

    match component {
        "trigger/value" | "trigger/click" => ActionSource::Trigger,
        "squeeze/value" | "squeeze/force" | "squeeze/click" => ActionSource::Grip,
        "thumbstick/x" | "thumbstick/y" => ActionSource::Thumbstick,
        "thumbstick/click" => ActionSource::Button(ButtonMask::THUMBSTICK),
        "trackpad/x" | "trackpad/y" | "trackpad/force" => ActionSource::Trackpad,
        "trackpad/click" => ActionSource::Button(ButtonMask::TRACKPAD),
        "a/click" => ActionSource::Button(ButtonMask::A),
        "b/click" => ActionSource::Button(ButtonMask::B),
        "x/click" => ActionSource::Button(ButtonMask::X),
        "y/click" => ActionSource::Button(ButtonMask::Y),
        "menu/click" => ActionSource::Button(ButtonMask::MENU),
        "select/click" => ActionSource::Button(ButtonMask::TRIGGER_CLICK),
        "system/click" => ActionSource::Button(ButtonMask::SYSTEM),
        _ => ActionSource::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_value_maps_to_trigger_source() {
        assert!(matches!(
            remap_binding(Profile::Touch, Side::Left, "/user/hand/left/input/trigger/value"),
            ActionSource::Trigger
        ));
    }

    #[test]
    fn unknown_component_maps_to_none() {
        assert!(matches!(
            remap_binding(Profile::Touch, Side::Left, "/user/hand/left/input/unknown/value"),
            ActionSource::None
        ));
    }

    #[test]
    fn simple_controller_select_rewrites_to_trigger() {
        assert!(matches!(
            remap_binding(Profile::Simple, Side::Left, "/user/hand/left/input/select/click"),
            ActionSource::Trigger
        ));
    }

    #[test]
    fn simple_controller_menu_rewrites_to_a_on_right_hand_only() {
        assert!(matches!(
            remap_binding(Profile::Simple, Side::Right, "/user/hand/right/input/menu/click"),
            ActionSource::Button(m) if m == ButtonMask::A
        ));
        assert!(matches!(
            remap_binding(Profile::Simple, Side::Left, "/user/hand/left/input/menu/click"),
            ActionSource::Button(m) if m == ButtonMask::MENU
        ));
    }

    #[test]
    fn vive_trackpad_rewrites_to_thumbstick() {
        assert!(matches!(
            remap_binding(Profile::Vive, Side::Left, "/user/hand/left/input/trackpad/x"),
            ActionSource::Thumbstick
        ));
    }
}
