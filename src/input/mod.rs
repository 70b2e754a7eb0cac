//! The action system: action sets, actions, interaction-profile bindings,
//! `SyncActions`, per-action state evaluation, and haptics.
//!
//! Keyed storage follows the teacher's `input.rs`: a `SlotMap` per handle
//! kind behind its own `RwLock`, rather than one big lock over the whole
//! input subsystem, so `SyncActions` doesn't serialize against
//! `CreateAction`/`SuggestInteractionProfileBindings` calls made between
//! frames.

mod profiles;
mod remap;

pub use profiles::{InteractionProfile, PROFILES};
pub use remap::remap_binding;

use crate::errors::{RtError, RtResult};
use hostapi::{ButtonMask, HostRuntime, InputSnapshot, Side, Vector2};
use openxr_sys as xr;
use slotmap::{new_key_type, SecondaryMap, SlotMap};
use std::collections::HashMap;
use std::sync::RwLock;

new_key_type! {
    pub struct ActionSetKey;
    pub struct ActionKey;
}

impl crate::handle::XrHandle for ActionSetKey {
    type Raw = xr::ActionSet;
    fn to_raw(self) -> Self::Raw {
        xr::ActionSet::from_raw(slotmap::Key::data(&self).as_ffi())
    }
    fn from_raw(raw: Self::Raw) -> Self {
        <Self as From<slotmap::KeyData>>::from(slotmap::KeyData::from_ffi(raw.into_raw()))
    }
}

impl crate::handle::XrHandle for ActionKey {
    type Raw = xr::Action;
    fn to_raw(self) -> Self::Raw {
        xr::Action::from_raw(slotmap::Key::data(&self).as_ffi())
    }
    fn from_raw(raw: Self::Raw) -> Self {
        <Self as From<slotmap::KeyData>>::from(slotmap::KeyData::from_ffi(raw.into_raw()))
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ActionType {
    Boolean,
    Float,
    Vector2f,
    Pose,
    Vibration,
}

impl ActionType {
    pub fn from_xr(ty: xr::ActionType) -> RtResult<Self> {
        match ty {
            xr::ActionType::BOOLEAN_INPUT => Ok(Self::Boolean),
            xr::ActionType::FLOAT_INPUT => Ok(Self::Float),
            xr::ActionType::VECTOR2F_INPUT => Ok(Self::Vector2f),
            xr::ActionType::POSE_INPUT => Ok(Self::Pose),
            xr::ActionType::VIBRATION_OUTPUT => Ok(Self::Vibration),
            _ => Err(RtError::ValidationFailure),
        }
    }
}

pub struct ActionSet {
    pub name: String,
    pub localized_name: String,
    pub attached: bool,
}

pub struct Action {
    pub set: ActionSetKey,
    pub name: String,
    pub localized_name: String,
    pub ty: ActionType,
    /// Top-level user paths (`/user/hand/left`, ...) this action was
    /// created with a subaction restriction for; empty means "all".
    pub subaction_paths: Vec<xr::Path>,
}

/// Where one action's value for one side comes from after binding
/// resolution: a field of `InputSnapshot`, remapped through
/// `remap::remap_binding` for the side's actual controller type.
#[derive(Copy, Clone, Debug)]
pub enum ActionSource {
    Button(ButtonMask),
    Touch(ButtonMask),
    Trigger,
    Grip,
    Thumbstick,
    Trackpad,
    None,
}

#[derive(Copy, Clone, Debug, Default)]
pub struct BoolState {
    pub current: bool,
    pub changed: bool,
    pub active: bool,
}

#[derive(Copy, Clone, Debug, Default)]
pub struct FloatState {
    pub current: f32,
    pub changed: bool,
    pub active: bool,
}

#[derive(Copy, Clone, Debug, Default)]
pub struct Vector2State {
    pub current: Vector2,
    pub changed: bool,
    pub active: bool,
}

/// Per-action, per-side bindings after `SuggestInteractionProfileBindings`
/// + `AttachSessionActionSets` have resolved them against the currently
/// connected controller's actual profile. Every suggested binding path
/// that mapped to a real source is kept, not just the first, so state
/// evaluation can OR/max across all of them.
#[derive(Clone, Debug, Default)]
struct ResolvedBinding {
    sources: Vec<ActionSource>,
}

pub struct InputState {
    sets: RwLock<SlotMap<ActionSetKey, ActionSet>>,
    actions: RwLock<SlotMap<ActionKey, Action>>,
    /// Suggested bindings per interaction profile path, keyed by action.
    suggestions: RwLock<HashMap<xr::Path, SecondaryMap<ActionKey, Vec<xr::Path>>>>,
    resolved: RwLock<SecondaryMap<ActionKey, [ResolvedBinding; 2]>>,
    bool_state: RwLock<SecondaryMap<ActionKey, [BoolState; 2]>>,
    float_state: RwLock<SecondaryMap<ActionKey, [FloatState; 2]>>,
    vector2_state: RwLock<SecondaryMap<ActionKey, [Vector2State; 2]>>,
    attached: std::sync::atomic::AtomicBool,
    current_profile: [RwLock<Option<xr::Path>>; 2],
}

impl Default for InputState {
    fn default() -> Self {
        Self::new()
    }
}

impl InputState {
    pub fn new() -> Self {
        Self {
            sets: RwLock::new(SlotMap::with_key()),
            actions: RwLock::new(SlotMap::with_key()),
            suggestions: RwLock::new(HashMap::new()),
            resolved: RwLock::new(SecondaryMap::new()),
            bool_state: RwLock::new(SecondaryMap::new()),
            float_state: RwLock::new(SecondaryMap::new()),
            vector2_state: RwLock::new(SecondaryMap::new()),
            attached: std::sync::atomic::AtomicBool::new(false),
            current_profile: [RwLock::new(None), RwLock::new(None)],
        }
    }

    pub fn create_action_set(&self, name: String, localized_name: String) -> RtResult<ActionSetKey> {
        let mut sets = self.sets.write().unwrap();
        if sets.values().any(|s| s.name == name) {
            return Err(RtError::NameDuplicated);
        }
        Ok(sets.insert(ActionSet {
            name,
            localized_name,
            attached: false,
        }))
    }

    pub fn create_action(
        &self,
        set: ActionSetKey,
        name: String,
        localized_name: String,
        ty: ActionType,
        subaction_paths: Vec<xr::Path>,
    ) -> RtResult<ActionKey> {
        let mut actions = self.actions.write().unwrap();
        if actions.values().any(|a| a.set == set && a.name == name) {
            return Err(RtError::NameDuplicated);
        }
        Ok(actions.insert(Action {
            set,
            name,
            localized_name,
            ty,
            subaction_paths,
        }))
    }

    pub fn suggest_bindings(&self, profile: xr::Path, bindings: Vec<(ActionKey, xr::Path)>) -> RtResult<()> {
        let mut suggestions = self.suggestions.write().unwrap();
        let table = suggestions.entry(profile).or_default();
        for (action, binding_path) in bindings {
            table.entry(action).or_default().push(binding_path);
        }
        Ok(())
    }

    /// `xrAttachSessionActionSets`: may only be called once per session.
    /// Resolves every suggested binding against the interaction profile
    /// currently reported for each hand.
    pub fn attach(&self, host: &dyn HostRuntime, paths: &crate::path_interner::PathInterner) -> RtResult<()> {
        if self.attached.swap(true, std::sync::atomic::Ordering::SeqCst) {
            return Err(RtError::ActionsetsAlreadyAttached);
        }
        self.refresh_bindings(host, paths);
        Ok(())
    }

    pub fn require_attached(&self) -> RtResult<()> {
        if self.attached.load(std::sync::atomic::Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RtError::ActionsetNotAttached)
        }
    }

    /// Re-resolves every action's binding for both hands against whichever
    /// profile is currently reported connected; called once at attach time
    /// and again whenever the connected controller type changes.
    ///
    /// The "actual" profile (the physically connected controller's own)
    /// only decides the reported `current_interaction_profile`; the
    /// bindings actually used come from the "preferred" profile -- the
    /// highest-priority profile the application suggested bindings under,
    /// per the rebind-priority chain in `remap::Profile::PRIORITY`. This is
    /// what lets an application that only suggested `khr/simple_controller`
    /// bindings still drive a connected touch controller.
    pub fn refresh_bindings(&self, host: &dyn HostRuntime, paths: &crate::path_interner::PathInterner) {
        let connection = host.connected_controllers();
        let suggestions = self.suggestions.read().unwrap();
        let mut resolved = self.resolved.write().unwrap();

        for side in Side::BOTH {
            let controller = match connection.get(side) {
                Some(c) => c,
                None => continue,
            };
            let profile = profiles::profile_for(controller);
            let profile_path = match paths.string_to_path_unchecked(profile.profile_path()) {
                Ok(p) => p,
                Err(_) => continue,
            };
            *self.current_profile[side.index()].write().unwrap() = Some(profile_path);

            // Rebind on controller-type change clears every existing
            // source for this side before re-deriving it.
            for (_action, entry) in resolved.iter_mut() {
                entry[side.index()] = ResolvedBinding::default();
            }

            let Some((preferred_path, preferred_profile)) = remap::Profile::PRIORITY
                .into_iter()
                .find_map(|p| {
                    let path = paths.string_to_path_unchecked(p.path()).ok()?;
                    suggestions.contains_key(&path).then_some((path, p))
                })
            else {
                continue;
            };
            let Some(bindings) = suggestions.get(&preferred_path) else {
                continue;
            };
            for (action, binding_paths) in bindings.iter() {
                let sources = binding_paths
                    .iter()
                    .filter_map(|p| paths.path_to_string(*p).ok())
                    .map(|s| remap::remap_binding(preferred_profile, side, &s))
                    .filter(|source| !matches!(source, ActionSource::None))
                    .collect();
                let entry = resolved
                    .entry(action)
                    .unwrap()
                    .or_insert_with(|| [ResolvedBinding::default(), ResolvedBinding::default()]);
                entry[side.index()] = ResolvedBinding { sources };
            }
        }
    }

    pub fn current_interaction_profile(&self, side: Side) -> Option<xr::Path> {
        *self.current_profile[side.index()].read().unwrap()
    }

    /// `xrSyncActions`: snapshots `InputSnapshot` once and evaluates every
    /// action's state from the resolved bindings, per side.
    pub fn sync(&self, snapshot: InputSnapshot, bool_threshold: f32) {
        let resolved = self.resolved.read().unwrap();
        let mut bool_state = self.bool_state.write().unwrap();
        let mut float_state = self.float_state.write().unwrap();
        let mut vector2_state = self.vector2_state.write().unwrap();

        for (action, bindings) in resolved.iter() {
            for side in Side::BOTH {
                let idx = side.index();
                let sources = bindings[idx].sources.as_slice();
                let active = !sources.is_empty();

                let bool_value = evaluate_bool(sources, &snapshot, idx, bool_threshold);
                let prev_bool = bool_state.entry(action).unwrap().or_insert([BoolState::default(); 2])[idx];
                bool_state.entry(action).unwrap().or_insert([BoolState::default(); 2])[idx] = BoolState {
                    current: bool_value,
                    changed: bool_value != prev_bool.current,
                    active,
                };

                let float_value = evaluate_float(sources, &snapshot, idx);
                let prev_float = float_state.entry(action).unwrap().or_insert([FloatState::default(); 2])[idx];
                float_state.entry(action).unwrap().or_insert([FloatState::default(); 2])[idx] = FloatState {
                    current: float_value,
                    changed: (float_value - prev_float.current).abs() > f32::EPSILON,
                    active,
                };

                let vec_value = evaluate_vector2(sources, &snapshot, idx);
                let prev_vec = vector2_state.entry(action).unwrap().or_insert([Vector2State::default(); 2])[idx];
                vector2_state.entry(action).unwrap().or_insert([Vector2State::default(); 2])[idx] = Vector2State {
                    current: vec_value,
                    changed: vec_value.x != prev_vec.current.x || vec_value.y != prev_vec.current.y,
                    active,
                };
            }
        }
    }

    pub fn bool_state(&self, action: ActionKey, side: Side) -> BoolState {
        self.bool_state
            .read()
            .unwrap()
            .get(action)
            .map(|s| s[side.index()])
            .unwrap_or_default()
    }

    pub fn float_state(&self, action: ActionKey, side: Side) -> FloatState {
        self.float_state
            .read()
            .unwrap()
            .get(action)
            .map(|s| s[side.index()])
            .unwrap_or_default()
    }

    pub fn vector2_state(&self, action: ActionKey, side: Side) -> Vector2State {
        self.vector2_state
            .read()
            .unwrap()
            .get(action)
            .map(|s| s[side.index()])
            .unwrap_or_default()
    }
}

fn evaluate_bool_one(source: ActionSource, snapshot: &InputSnapshot, side: usize, threshold: f32) -> bool {
    match source {
        ActionSource::Button(mask) => snapshot.buttons[side].contains(mask),
        ActionSource::Touch(mask) => snapshot.touches[side].contains(mask),
        ActionSource::Trigger => snapshot.trigger[side] > threshold,
        ActionSource::Grip => snapshot.grip[side] > threshold,
        ActionSource::Thumbstick => snapshot.thumbstick[side].length() > threshold,
        ActionSource::Trackpad => snapshot.trackpad[side].length() > threshold,
        ActionSource::None => false,
    }
}

fn evaluate_float_one(source: ActionSource, snapshot: &InputSnapshot, side: usize) -> f32 {
    match source {
        ActionSource::Trigger => snapshot.trigger[side],
        ActionSource::Grip => snapshot.grip[side],
        ActionSource::Button(mask) if snapshot.buttons[side].contains(mask) => 1.0,
        _ => 0.0,
    }
}

fn evaluate_vector2_one(source: ActionSource, snapshot: &InputSnapshot, side: usize) -> Vector2 {
    match source {
        ActionSource::Thumbstick => snapshot.thumbstick[side],
        ActionSource::Trackpad => snapshot.trackpad[side],
        _ => Vector2::default(),
    }
}

/// Bool actions with more than one suggested source OR their values
/// together: any bound button/axis past threshold makes the action true.
fn evaluate_bool(sources: &[ActionSource], snapshot: &InputSnapshot, side: usize, threshold: f32) -> bool {
    sources
        .iter()
        .any(|&source| evaluate_bool_one(source, snapshot, side, threshold))
}

/// Float actions take the max across every suggested source.
fn evaluate_float(sources: &[ActionSource], snapshot: &InputSnapshot, side: usize) -> f32 {
    sources
        .iter()
        .map(|&source| evaluate_float_one(source, snapshot, side))
        .fold(0.0_f32, f32::max)
}

/// Vector2 actions report whichever bound source currently has the
/// greatest magnitude.
fn evaluate_vector2(sources: &[ActionSource], snapshot: &InputSnapshot, side: usize) -> Vector2 {
    sources
        .iter()
        .map(|&source| evaluate_vector2_one(source, snapshot, side))
        .max_by(|a, b| a.length().total_cmp(&b.length()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fakehost::FakeHost;
    use hostapi::{ControllerConnection, HostControllerType};

    #[test]
    fn duplicate_action_set_name_rejected() {
        let input = InputState::new();
        input.create_action_set("main".into(), "Main".into()).unwrap();
        let err = input
            .create_action_set("main".into(), "Main Again".into())
            .unwrap_err();
        assert_eq!(err, RtError::NameDuplicated);
    }

    #[test]
    fn trigger_binding_drives_bool_and_float() {
        let host = FakeHost::new();
        host.set_controllers(ControllerConnection {
            left: Some(HostControllerType::ValveIndex),
            right: None,
        });
        let paths = crate::path_interner::PathInterner::new();
        let input = InputState::new();
        let set = input.create_action_set("main".into(), "Main".into()).unwrap();
        let action = input
            .create_action(set, "squeeze".into(), "Squeeze".into(), ActionType::Float, vec![])
            .unwrap();
        let profile_path = paths.string_to_path("/interaction_profiles/valve/index_controller").unwrap();
        let binding_path = paths
            .string_to_path("/user/hand/left/input/trigger/value")
            .unwrap();
        input
            .suggest_bindings(profile_path, vec![(action, binding_path)])
            .unwrap();
        input.attach(&host, &paths).unwrap();

        let mut snapshot = InputSnapshot::default();
        snapshot.trigger[0] = 0.8;
        input.sync(snapshot, 0.5);

        assert!(input.bool_state(action, Side::Left).current);
        assert_eq!(input.float_state(action, Side::Left).current, 0.8);
    }

    #[test]
    fn simple_controller_bindings_resolve_against_connected_touch_controller() {
        let host = FakeHost::new();
        host.set_controllers(ControllerConnection {
            left: None,
            right: Some(HostControllerType::OculusTouch),
        });
        let paths = crate::path_interner::PathInterner::new();
        let input = InputState::new();
        let set = input.create_action_set("main".into(), "Main".into()).unwrap();
        let action = input
            .create_action(set, "menu".into(), "Menu".into(), ActionType::Boolean, vec![])
            .unwrap();
        let profile_path = paths
            .string_to_path("/interaction_profiles/khr/simple_controller")
            .unwrap();
        let binding_path = paths
            .string_to_path("/user/hand/right/input/menu/click")
            .unwrap();
        input
            .suggest_bindings(profile_path, vec![(action, binding_path)])
            .unwrap();
        input.attach(&host, &paths).unwrap();

        // The right touch controller has no dedicated menu button; the
        // virtual-profile rewrite sends this at `a/click` instead.
        let mut snapshot = InputSnapshot::default();
        snapshot.buttons[1] |= hostapi::ButtonMask::A;
        input.sync(snapshot, 0.5);

        assert!(input.bool_state(action, Side::Right).active);
        assert!(input.bool_state(action, Side::Right).current);
    }

    #[test]
    fn multiple_suggested_bindings_or_together_for_bool_actions() {
        let host = FakeHost::new();
        host.set_controllers(ControllerConnection {
            left: Some(HostControllerType::OculusTouch),
            right: None,
        });
        let paths = crate::path_interner::PathInterner::new();
        let input = InputState::new();
        let set = input.create_action_set("main".into(), "Main".into()).unwrap();
        let action = input
            .create_action(set, "grab".into(), "Grab".into(), ActionType::Boolean, vec![])
            .unwrap();
        let profile_path = paths
            .string_to_path("/interaction_profiles/oculus/touch_controller")
            .unwrap();
        let trigger_path = paths
            .string_to_path("/user/hand/left/input/trigger/value")
            .unwrap();
        let squeeze_path = paths
            .string_to_path("/user/hand/left/input/squeeze/value")
            .unwrap();
        input
            .suggest_bindings(profile_path, vec![(action, trigger_path), (action, squeeze_path)])
            .unwrap();
        input.attach(&host, &paths).unwrap();

        let mut snapshot = InputSnapshot::default();
        snapshot.grip[0] = 0.9;
        input.sync(snapshot, 0.5);

        // Trigger is untouched but squeeze alone is past threshold: OR
        // across both suggested sources still reports true.
        assert!(input.bool_state(action, Side::Left).current);
    }
}
