//! The session state machine, frame counters, and the per-session state
//! that isn't part of the space graph or action system: current
//! interaction profile per top-level user path, last-known input
//! snapshot, and the channel frame submission hands work to the async
//! submission thread.
//!
//! Grounded on the teacher's `OpenXrData`/`SessionData` split: one
//! `RwLock` guarding the whole session's lifecycle state, separate
//! `Mutex`/`AtomicXxx` fields for the pieces that change every frame so
//! `WaitFrame`/`EndFrame` never contend with state-transition calls.

use crate::errors::{RtError, RtResult};
use openxr_sys as xr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, RwLock};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Ready,
    Synchronized,
    Visible,
    Focused,
    Stopping,
    Exiting,
    LossPending,
}

impl SessionState {
    pub fn to_xr(self) -> xr::SessionState {
        match self {
            Self::Idle => xr::SessionState::IDLE,
            Self::Ready => xr::SessionState::READY,
            Self::Synchronized => xr::SessionState::SYNCHRONIZED,
            Self::Visible => xr::SessionState::VISIBLE,
            Self::Focused => xr::SessionState::FOCUSED,
            Self::Stopping => xr::SessionState::STOPPING,
            Self::Exiting => xr::SessionState::EXITING,
            Self::LossPending => xr::SessionState::LOSS_PENDING,
        }
    }

    /// `true` for every state in which the application is expected to be
    /// calling `WaitFrame`/`BeginFrame`/`EndFrame`.
    pub fn is_running(self) -> bool {
        matches!(
            self,
            Self::Synchronized | Self::Visible | Self::Focused | Self::Stopping
        )
    }
}

/// `completed <= begun <= waited <= completed + 1` must hold at all times;
/// each field is only ever advanced by the call that owns it, under
/// `SessionLifecycle::frame_mutex`.
#[derive(Default)]
pub struct FrameCounters {
    pub waited: AtomicU64,
    pub begun: AtomicU64,
    pub completed: AtomicU64,
}

impl FrameCounters {
    /// `xrWaitFrame`: blocks until the previously waited frame has been
    /// begun (`begun == waited`) before admitting a new one.
    pub fn note_wait(&self, lifecycle: &SessionLifecycle) -> u64 {
        let guard = lifecycle.frame_mutex.lock().unwrap();
        let _guard = lifecycle
            .frame_cv
            .wait_while(guard, |_| {
                self.begun.load(Ordering::SeqCst) != self.waited.load(Ordering::SeqCst)
            })
            .unwrap();
        let frame = self.waited.fetch_add(1, Ordering::SeqCst) + 1;
        lifecycle.frame_cv.notify_all();
        frame
    }

    /// `xrBeginFrame`. Returns the frame id to begin, plus the id of a
    /// previously begun frame that never received an `EndFrame` and that
    /// the caller must heal with a dummy submission (the discard path).
    pub fn note_begin(&self, lifecycle: &SessionLifecycle) -> RtResult<(u64, Option<u64>)> {
        let mut guard = lifecycle.frame_mutex.lock().unwrap();
        let waited = self.waited.load(Ordering::SeqCst);
        let begun = self.begun.load(Ordering::SeqCst);
        let completed = self.completed.load(Ordering::SeqCst);
        if waited == completed || begun == waited {
            return Err(RtError::CallOrderInvalid);
        }

        let discarded = if waited == completed + 1 && begun != waited {
            guard = lifecycle
                .frame_cv
                .wait_while(guard, |_| {
                    self.completed.load(Ordering::SeqCst) != self.begun.load(Ordering::SeqCst)
                })
                .unwrap();
            None
        } else {
            // `begun` was started but never ended; heal it before moving on.
            self.completed.store(begun, Ordering::SeqCst);
            Some(begun)
        };

        self.begun.store(waited, Ordering::SeqCst);
        drop(guard);
        lifecycle.frame_cv.notify_all();
        Ok((waited, discarded))
    }

    pub fn note_end(&self, lifecycle: &SessionLifecycle) -> RtResult<u64> {
        let _guard = lifecycle.frame_mutex.lock().unwrap();
        let begun = self.begun.load(Ordering::SeqCst);
        let completed = self.completed.load(Ordering::SeqCst);
        if completed >= begun {
            return Err(RtError::CallOrderInvalid);
        }
        let value = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        lifecycle.frame_cv.notify_all();
        Ok(value)
    }
}

/// Session-lifetime state transitioned by `BeginSession`/`RequestExitSession`
/// /`EndSession` and by the runtime's own idle/focus tracking. Every
/// transition pushes a `SessionStateChanged` event; see `crate::events`.
pub struct SessionLifecycle {
    state: RwLock<SessionState>,
    exit_requested: Mutex<bool>,
    pub frame_cv: Condvar,
    pub frame_mutex: Mutex<()>,
}

impl Default for SessionLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionLifecycle {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(SessionState::Idle),
            exit_requested: Mutex::new(false),
            frame_cv: Condvar::new(),
            frame_mutex: Mutex::new(()),
        }
    }

    pub fn current(&self) -> SessionState {
        *self.state.read().unwrap()
    }

    fn set(&self, new_state: SessionState) -> SessionState {
        let mut state = self.state.write().unwrap();
        let old = *state;
        *state = new_state;
        old
    }

    /// `xrBeginSession`: IDLE/STOPPING -> READY is invalid, only READY ->
    /// SYNCHRONIZED is a legal app-initiated transition.
    pub fn begin(&self) -> RtResult<()> {
        let current = self.current();
        if current != SessionState::Ready {
            return Err(RtError::SessionNotReady);
        }
        self.set(SessionState::Synchronized);
        Ok(())
    }

    /// Runtime-driven transition fired once the compositor considers the
    /// session visible (first successful `EndFrame`).
    pub fn mark_visible(&self) {
        let current = self.current();
        if current == SessionState::Synchronized {
            self.set(SessionState::Visible);
        }
    }

    pub fn mark_focused(&self, focused: bool) {
        let current = self.current();
        match (current, focused) {
            (SessionState::Visible, true) => {
                self.set(SessionState::Focused);
            }
            (SessionState::Focused, false) => {
                self.set(SessionState::Visible);
            }
            _ => {}
        }
    }

    /// `xrRequestExitSession`: begins the shutdown sequence; the
    /// application must still drive STOPPING -> call `EndSession`.
    pub fn request_exit(&self) -> RtResult<()> {
        if !self.current().is_running() {
            return Err(RtError::SessionNotRunning);
        }
        *self.exit_requested.lock().unwrap() = true;
        self.set(SessionState::Stopping);
        Ok(())
    }

    /// `xrEndSession`: only legal from STOPPING, returns to IDLE.
    pub fn end(&self) -> RtResult<()> {
        if self.current() != SessionState::Stopping {
            return Err(RtError::SessionNotStopping);
        }
        *self.exit_requested.lock().unwrap() = false;
        self.set(SessionState::Idle);
        Ok(())
    }

    pub fn ready_after_create(&self) {
        self.set(SessionState::Ready);
    }

    pub fn lose(&self) {
        self.set(SessionState::LossPending);
    }

    pub fn exiting(&self) {
        self.set(SessionState::Exiting);
    }

    pub fn require_running(&self) -> RtResult<()> {
        if self.current().is_running() {
            Ok(())
        } else {
            Err(RtError::SessionNotRunning)
        }
    }

    pub fn require_focused(&self) -> RtResult<()> {
        if self.current() == SessionState::Focused {
            Ok(())
        } else {
            Err(RtError::SessionNotFocused)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_requires_ready_state() {
        let lifecycle = SessionLifecycle::new();
        assert_eq!(lifecycle.begin().unwrap_err(), RtError::SessionNotReady);
        lifecycle.ready_after_create();
        lifecycle.begin().unwrap();
        assert_eq!(lifecycle.current(), SessionState::Synchronized);
    }

    #[test]
    fn full_lifecycle_round_trip() {
        let lifecycle = SessionLifecycle::new();
        lifecycle.ready_after_create();
        lifecycle.begin().unwrap();
        lifecycle.mark_visible();
        lifecycle.mark_focused(true);
        assert_eq!(lifecycle.current(), SessionState::Focused);
        lifecycle.request_exit().unwrap();
        assert_eq!(lifecycle.current(), SessionState::Stopping);
        lifecycle.end().unwrap();
        assert_eq!(lifecycle.current(), SessionState::Idle);
    }

    #[test]
    fn frame_counters_enforce_order() {
        let counters = FrameCounters::default();
        let lifecycle = SessionLifecycle::new();
        assert_eq!(
            counters.note_begin(&lifecycle).unwrap_err(),
            RtError::CallOrderInvalid
        );
        counters.note_wait(&lifecycle);
        let (_, discarded) = counters.note_begin(&lifecycle).unwrap();
        assert_eq!(discarded, None);
        assert_eq!(
            counters.note_begin(&lifecycle).unwrap_err(),
            RtError::CallOrderInvalid
        );
        counters.note_end(&lifecycle).unwrap();
        assert_eq!(
            counters.note_end(&lifecycle).unwrap_err(),
            RtError::CallOrderInvalid
        );
    }

    #[test]
    fn wait_frame_blocks_until_previous_frame_begun() {
        use std::sync::Arc;
        use std::time::Duration;

        let counters = Arc::new(FrameCounters::default());
        let lifecycle = Arc::new(SessionLifecycle::new());

        counters.note_wait(&lifecycle);
        counters.note_begin(&lifecycle).unwrap();
        counters.note_end(&lifecycle).unwrap();

        // A second WaitFrame lands fine (previous frame was begun); a
        // third one without an intervening BeginFrame must block.
        counters.note_wait(&lifecycle);

        let blocked_counters = Arc::clone(&counters);
        let blocked_lifecycle = Arc::clone(&lifecycle);
        let handle = std::thread::spawn(move || blocked_counters.note_wait(&blocked_lifecycle));

        // Give the spawned thread a chance to actually block.
        std::thread::sleep(Duration::from_millis(50));
        assert!(!handle.is_finished());

        counters.note_begin(&lifecycle).unwrap();
        let frame = handle.join().unwrap();
        assert_eq!(frame, 3);
    }

    #[test]
    fn discarded_begin_heals_the_abandoned_frame() {
        let counters = FrameCounters::default();
        let lifecycle = SessionLifecycle::new();

        counters.note_wait(&lifecycle);
        let (frame1, discarded) = counters.note_begin(&lifecycle).unwrap();
        assert_eq!(discarded, None);

        // Frame 1 never gets `EndFrame`; the app moves straight to the next
        // frame, which the runtime must detect and discard.
        counters.note_wait(&lifecycle);
        let (frame2, discarded) = counters.note_begin(&lifecycle).unwrap();
        assert_eq!(discarded, Some(frame1));
        assert_eq!(frame2, 2);

        // The healed frame unblocked `completed`, so a normal end now works.
        counters.note_end(&lifecycle).unwrap();
    }
}
