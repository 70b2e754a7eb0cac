//! Process-wide event queue: session-state transitions, interaction-profile
//! changes, reference-space recentering. FIFO, one `PollEvent` pops one.
//!
//! Grounded on the `mpsc::Sender<EventDataBuffer>` pattern `fakexr` uses for
//! its own synthetic events.

use openxr_sys as xr;
use std::sync::mpsc;

#[derive(Clone, Debug)]
pub enum Event {
    SessionStateChanged {
        session: xr::Session,
        state: xr::SessionState,
        time: xr::Time,
    },
    InteractionProfileChanged {
        session: xr::Session,
    },
    ReferenceSpaceChangePending {
        session: xr::Session,
        reference_space_type: xr::ReferenceSpaceType,
        change_time: xr::Time,
    },
    /// Host reported adapter/device loss. Carries no session handle -- this
    /// is an instance-wide event, delivered once, after which the
    /// application is expected to tear down and recreate the instance.
    InstanceLossPending {
        loss_time: xr::Time,
    },
}

pub struct EventQueue {
    sender: mpsc::Sender<Event>,
    receiver: std::sync::Mutex<mpsc::Receiver<Event>>,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl EventQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            sender,
            receiver: std::sync::Mutex::new(receiver),
        }
    }

    pub fn sender(&self) -> mpsc::Sender<Event> {
        self.sender.clone()
    }

    pub fn push(&self, event: Event) {
        // Only fails if every receiver (including our own retained one) has
        // been dropped, which cannot happen while `self` is alive.
        let _ = self.sender.send(event);
    }

    pub fn poll(&self) -> Option<Event> {
        self.receiver.lock().unwrap().try_recv().ok()
    }
}

/// Writes `event` into the loader-provided buffer, following the
/// `next`-less `EventDataBuffer` union layout every concrete event type
/// shares.
pub fn write_event(event: &Event, out: &mut xr::EventDataBuffer) {
    match event {
        Event::SessionStateChanged { session, state, time } => {
            let data = xr::EventDataSessionStateChanged {
                ty: xr::EventDataSessionStateChanged::TYPE,
                next: std::ptr::null_mut(),
                session: *session,
                state: *state,
                time: *time,
            };
            write_union(out, &data);
        }
        Event::InteractionProfileChanged { session } => {
            let data = xr::EventDataInteractionProfileChanged {
                ty: xr::EventDataInteractionProfileChanged::TYPE,
                next: std::ptr::null_mut(),
                session: *session,
            };
            write_union(out, &data);
        }
        Event::ReferenceSpaceChangePending {
            session,
            reference_space_type,
            change_time,
        } => {
            let data = xr::EventDataReferenceSpaceChangePending {
                ty: xr::EventDataReferenceSpaceChangePending::TYPE,
                next: std::ptr::null_mut(),
                session: *session,
                reference_space_type: *reference_space_type,
                change_time: *change_time,
                pose_valid: xr::TRUE,
                pose_in_previous_space: openxr_sys::Posef {
                    orientation: openxr_sys::Quaternionf {
                        x: 0.0,
                        y: 0.0,
                        z: 0.0,
                        w: 1.0,
                    },
                    position: openxr_sys::Vector3f {
                        x: 0.0,
                        y: 0.0,
                        z: 0.0,
                    },
                },
            };
            write_union(out, &data);
        }
        Event::InstanceLossPending { loss_time } => {
            let data = xr::EventDataInstanceLossPending {
                ty: xr::EventDataInstanceLossPending::TYPE,
                next: std::ptr::null_mut(),
                loss_time: *loss_time,
            };
            write_union(out, &data);
        }
    }
}

fn write_union<T: Copy>(out: &mut xr::EventDataBuffer, data: &T) {
    assert!(std::mem::size_of::<T>() <= std::mem::size_of::<xr::EventDataBuffer>());
    // SAFETY: size checked above; `EventDataBuffer` is a `next`-tagged
    // union sized to fit the largest concrete event type.
    unsafe {
        std::ptr::copy_nonoverlapping(
            data as *const T as *const u8,
            out as *mut xr::EventDataBuffer as *mut u8,
            std::mem::size_of::<T>(),
        );
    }
}
