//! Global handle registries: every `xr*` entry point resolves its handles
//! through here rather than through `unsafe` pointer reinterpretation, the
//! same way the rest of the crate prefers slotmap keys over raw pointers
//! for handle safety.
//!
//! Spaces and swapchains are handles the OpenXR API hands around without
//! their owning session (`xrLocateSpace`, `xrEnumerateSwapchainImages`, ...
//! take only the child handle), so both live in one table per instance
//! rather than nested under `Session` -- the same reachability problem the
//! teacher solves by keeping `OpenXrData` a singleton every vtable wrapper
//! borrows back into.

use crate::errors::{RtError, RtResult};
use crate::frame::FrameLifecycle;
use crate::graphics::GraphicsBinding;
use crate::input::InputState;
use crate::instance::Instance;
use crate::session::SessionLifecycle;
use crate::spaces::SpaceGraph;
use crate::swapchain::{Swapchain, SwapchainKey};
use hostapi::sys::RealHost;
use openxr_sys as xr;
use slotmap::{new_key_type, SlotMap};
use std::sync::{Arc, LazyLock, Mutex, RwLock};

new_key_type! {
    pub struct InstanceKey;
    pub struct SessionKey;
}

impl crate::handle::XrHandle for InstanceKey {
    type Raw = xr::Instance;
    fn to_raw(self) -> Self::Raw {
        xr::Instance::from_raw(slotmap::Key::data(&self).as_ffi())
    }
    fn from_raw(raw: Self::Raw) -> Self {
        <Self as From<slotmap::KeyData>>::from(slotmap::KeyData::from_ffi(raw.into_raw()))
    }
}

impl crate::handle::XrHandle for SessionKey {
    type Raw = xr::Session;
    fn to_raw(self) -> Self::Raw {
        xr::Session::from_raw(slotmap::Key::data(&self).as_ffi())
    }
    fn from_raw(raw: Self::Raw) -> Self {
        <Self as From<slotmap::KeyData>>::from(slotmap::KeyData::from_ffi(raw.into_raw()))
    }
}

/// One live `xrCreateSession`/`xrDestroySession` pair's state: the session
/// lifecycle, frame submission, and the graphics binding swapchain images
/// import against. Spaces and swapchains the session creates are tracked
/// at instance scope; see the module doc.
pub struct Session {
    pub lifecycle: SessionLifecycle,
    pub frames: FrameLifecycle<RealHost>,
    pub graphics: GraphicsBinding,
    pub preprocessor: crate::graphics::preprocess::SubmissionDevice,
}

impl Session {
    pub fn new(graphics: GraphicsBinding, host: Arc<RealHost>, disable_async: bool) -> RtResult<Self> {
        Ok(Self {
            lifecycle: SessionLifecycle::new(),
            frames: FrameLifecycle::new(host, disable_async),
            graphics,
            preprocessor: crate::graphics::preprocess::SubmissionDevice::new()?,
        })
    }
}

/// A swapchain plus the session it was created against, since
/// `xrEnumerateSwapchainImages` needs the owning session's graphics
/// binding to know which image-struct shape to hand back.
pub struct SwapchainEntry {
    pub session: Arc<Session>,
    pub swapchain: Mutex<Swapchain>,
    /// Populated on the first `xrEnumerateSwapchainImages` call and
    /// reused after: the imported textures must outlive that call, since
    /// the app is handed the raw graphics-API pointer into them, not an
    /// owned reference.
    pub imported: Mutex<Option<Vec<crate::graphics::ImportedImage>>>,
}

/// Everything hanging off one `xrCreateInstance` call.
pub struct RuntimeInstance {
    pub instance: Instance<RealHost>,
    pub input: InputState,
    pub sessions: RwLock<SlotMap<SessionKey, Arc<Session>>>,
    pub spaces: SpaceGraph,
    pub swapchains: RwLock<SlotMap<SwapchainKey, SwapchainEntry>>,
}

impl RuntimeInstance {
    pub fn new(instance: Instance<RealHost>) -> Self {
        Self {
            instance,
            input: InputState::new(),
            sessions: RwLock::new(SlotMap::with_key()),
            spaces: SpaceGraph::new(),
            swapchains: RwLock::new(SlotMap::with_key()),
        }
    }

    pub fn insert_session(&self, session: Session) -> xr::Session {
        let key = self.sessions.write().unwrap().insert(Arc::new(session));
        <SessionKey as crate::handle::XrHandle>::to_raw(key)
    }

    pub fn get_session(&self, handle: xr::Session) -> RtResult<Arc<Session>> {
        let key = <SessionKey as crate::handle::XrHandle>::from_raw(handle);
        self.sessions
            .read()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or(RtError::HandleInvalid)
    }

    pub fn remove_session(&self, handle: xr::Session) -> RtResult<()> {
        let key = <SessionKey as crate::handle::XrHandle>::from_raw(handle);
        self.sessions
            .write()
            .unwrap()
            .remove(key)
            .map(|_| ())
            .ok_or(RtError::HandleInvalid)
    }

    pub fn insert_swapchain(&self, session: Arc<Session>, swapchain: Swapchain) -> xr::Swapchain {
        let key = self.swapchains.write().unwrap().insert(SwapchainEntry {
            session,
            swapchain: Mutex::new(swapchain),
            imported: Mutex::new(None),
        });
        <SwapchainKey as crate::handle::XrHandle>::to_raw(key)
    }

    pub fn remove_swapchain(&self, handle: xr::Swapchain) -> RtResult<()> {
        let key = <SwapchainKey as crate::handle::XrHandle>::from_raw(handle);
        self.swapchains
            .write()
            .unwrap()
            .remove(key)
            .map(|_| ())
            .ok_or(RtError::HandleInvalid)
    }
}

#[derive(Default)]
pub struct Registry {
    instances: RwLock<SlotMap<InstanceKey, Arc<RuntimeInstance>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            instances: RwLock::new(SlotMap::with_key()),
        }
    }

    pub fn insert(&self, instance: RuntimeInstance) -> xr::Instance {
        let key = self.instances.write().unwrap().insert(Arc::new(instance));
        <InstanceKey as crate::handle::XrHandle>::to_raw(key)
    }

    pub fn get(&self, handle: xr::Instance) -> RtResult<Arc<RuntimeInstance>> {
        let key = <InstanceKey as crate::handle::XrHandle>::from_raw(handle);
        self.instances
            .read()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or(RtError::HandleInvalid)
    }

    pub fn remove(&self, handle: xr::Instance) -> RtResult<()> {
        let key = <InstanceKey as crate::handle::XrHandle>::from_raw(handle);
        self.instances
            .write()
            .unwrap()
            .remove(key)
            .map(|_| ())
            .ok_or(RtError::HandleInvalid)
    }

    /// Finds the instance owning `handle`, scanning every live instance's
    /// session table. A linear scan is fine: a loader realistically keeps
    /// at most one instance alive at a time.
    pub fn find_by_session(&self, handle: xr::Session) -> RtResult<(Arc<RuntimeInstance>, Arc<Session>)> {
        let key = <SessionKey as crate::handle::XrHandle>::from_raw(handle);
        for instance in self.instances.read().unwrap().values() {
            if let Some(session) = instance.sessions.read().unwrap().get(key).cloned() {
                return Ok((Arc::clone(instance), session));
            }
        }
        Err(RtError::HandleInvalid)
    }

    pub fn find_by_space(&self, handle: xr::Space) -> RtResult<Arc<RuntimeInstance>> {
        let key = <crate::spaces::SpaceKey as crate::handle::XrHandle>::from_raw(handle);
        for instance in self.instances.read().unwrap().values() {
            if instance.spaces.contains(key) {
                return Ok(Arc::clone(instance));
            }
        }
        Err(RtError::HandleInvalid)
    }

    pub fn find_by_swapchain(&self, handle: xr::Swapchain) -> RtResult<Arc<RuntimeInstance>> {
        let key = <SwapchainKey as crate::handle::XrHandle>::from_raw(handle);
        for instance in self.instances.read().unwrap().values() {
            if instance.swapchains.read().unwrap().contains_key(key) {
                return Ok(Arc::clone(instance));
            }
        }
        Err(RtError::HandleInvalid)
    }
}

/// Single process-wide registry: this runtime, like every other loader
/// target, is loaded once per process and unloaded at process exit, so a
/// `static` is the right lifetime for it rather than a registry of
/// registries.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);
