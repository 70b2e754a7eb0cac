//! `WaitFrame`/`BeginFrame`/`EndFrame`: pacing, layer assembly, and the
//! async submission thread frames get handed off to once `EndFrame`
//! validates them.
//!
//! The "running start" quirk (predict roughly one vsync further ahead the
//! very first `WaitFrame` after `BeginSession`, since there's no prior
//! frame to pace off of) and the async handoff itself are both grounded
//! on how the teacher's compositor submission path defers GPU work off
//! the calling thread -- see `compositor.rs`'s frame-submission channel.

use crate::errors::{RtError, RtResult};
use crate::session::{FrameCounters, SessionLifecycle, SessionState};
use hostapi::{FrameId, HostLayer, HostRuntime};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;

/// Lookahead applied to the first `WaitFrame` of a session, in seconds,
/// when the `quirk_disable_running_start` setting is off.
const RUNNING_START_LOOKAHEAD_SECONDS: f64 = 0.002;

pub struct WaitFrameResult {
    pub predicted_display_time: openxr_sys::Time,
    pub predicted_display_period: openxr_sys::Time,
    pub should_render: bool,
}

struct SubmissionJob {
    frame: FrameId,
    layers: Vec<HostLayer>,
}

fn dummy_job(frame: FrameId) -> SubmissionJob {
    SubmissionJob {
        frame,
        layers: vec![HostLayer::Dummy],
    }
}

/// Owns the frame counters, the session-visible/focused transitions they
/// drive, and the background thread that actually calls
/// `HostRuntime::end_frame` so `xrEndFrame` can return before the host
/// compositor has necessarily finished with the submission.
pub struct FrameLifecycle<H: HostRuntime> {
    pub counters: FrameCounters,
    first_wait_done: AtomicBool,
    submit_tx: mpsc::Sender<SubmissionJob>,
    _worker: std::thread::JoinHandle<()>,
    device_lost: Arc<AtomicBool>,
    disable_async: bool,
    _host: std::marker::PhantomData<H>,
}

impl<H: HostRuntime> FrameLifecycle<H> {
    pub fn new(host: Arc<H>, disable_async: bool) -> Self {
        let (submit_tx, submit_rx) = mpsc::channel::<SubmissionJob>();
        let device_lost = Arc::new(AtomicBool::new(false));
        let worker_lost = Arc::clone(&device_lost);
        let worker_host = Arc::clone(&host);
        let worker = std::thread::Builder::new()
            .name("novaxr-submission".into())
            .spawn(move || {
                // Heal jobs for abandoned frames and real `EndFrame` jobs
                // share this channel and are sent in frame order, so the
                // host always sees a contiguous `EndFrame` sequence even
                // when the application discards frames.
                while let Ok(job) = submit_rx.recv() {
                    if let Err(err) = worker_host.end_frame(job.frame, &job.layers) {
                        log::warn!("end_frame failed for frame {}: {err}", job.frame);
                        if matches!(err, hostapi::HostError::DeviceLost) {
                            worker_lost.store(true, Ordering::SeqCst);
                        }
                    }
                }
            })
            .expect("failed to spawn submission thread");

        Self {
            counters: FrameCounters::default(),
            first_wait_done: AtomicBool::new(false),
            submit_tx,
            _worker: worker,
            device_lost,
            disable_async,
            _host: std::marker::PhantomData,
        }
    }

    pub fn device_lost(&self) -> bool {
        self.device_lost.load(Ordering::SeqCst)
    }

    /// `xrWaitFrame`: may be called concurrently with at most one other
    /// in-flight `WaitFrame`; blocks on the host's own pacing call.
    pub fn wait_frame(
        &self,
        host: &dyn HostRuntime,
        lifecycle: &SessionLifecycle,
        time_base: &crate::time::TimeBase,
    ) -> RtResult<WaitFrameResult> {
        lifecycle.require_running()?;
        let frame = self.counters.note_wait(lifecycle);

        if host.wait_to_begin_frame(frame).is_err() {
            // Host pacing failures are advisory; fall through and predict
            // from the host's own clock regardless.
        }

        let mut host_seconds = host.predicted_display_time(frame);
        if !self.first_wait_done.swap(true, Ordering::SeqCst) {
            host_seconds += RUNNING_START_LOOKAHEAD_SECONDS;
        }

        let raw = time_base.host_seconds_to_xr_time(host_seconds);
        let predicted_display_time = time_base.clamp_monotonic_display_time(raw);
        let period_seconds = host.ideal_frame_duration();
        let predicted_display_period =
            openxr_sys::Time::from_nanos((period_seconds * 1_000_000_000.0).round() as i64);

        Ok(WaitFrameResult {
            predicted_display_time,
            predicted_display_period,
            should_render: matches!(
                lifecycle.current(),
                SessionState::Visible | SessionState::Focused
            ),
        })
    }

    /// `xrBeginFrame`. Returns `true` when the call must be reported back
    /// to the application as `XR_FRAME_DISCARDED` (the previous frame was
    /// begun but never ended). The abandoned frame still gets healed with
    /// a dummy `EndFrame` so the host's frame-id sequence stays contiguous.
    pub fn begin_frame(&self, host: &dyn HostRuntime, lifecycle: &SessionLifecycle) -> RtResult<bool> {
        lifecycle.require_running()?;
        let (frame, abandoned) = self.counters.note_begin(lifecycle)?;

        if let Some(abandoned) = abandoned {
            self.heal(host, abandoned)?;
        }

        host.begin_frame(frame).map_err(RtError::from)?;
        Ok(abandoned.is_some())
    }

    /// Submits a dummy `EndFrame` for a frame that was begun but whose
    /// `EndFrame` was preempted by the next `BeginFrame` discarding it.
    fn heal(&self, host: &dyn HostRuntime, frame: FrameId) -> RtResult<()> {
        if self.disable_async {
            host.end_frame(frame, &[HostLayer::Dummy]).map_err(RtError::from)?;
        } else {
            self.submit_tx
                .send(dummy_job(frame))
                .map_err(|_| RtError::InstanceLossPending)?;
        }
        Ok(())
    }

    /// `xrEndFrame`: validates the layer list, then either submits
    /// synchronously (when async submission is disabled, or this is the
    /// layer-less "dummy" frame used to keep pacing alive) or hands the
    /// job to the background thread.
    pub fn end_frame(
        &self,
        host: &dyn HostRuntime,
        lifecycle: &SessionLifecycle,
        layers: Vec<HostLayer>,
    ) -> RtResult<()> {
        lifecycle.require_running()?;
        let frame = self.counters.note_end(lifecycle)?;
        lifecycle.mark_visible();

        let layers = if layers.is_empty() {
            vec![HostLayer::Dummy]
        } else {
            layers
        };

        if self.disable_async {
            host.end_frame(frame, &layers).map_err(RtError::from)?;
        } else {
            self.submit_tx
                .send(SubmissionJob { frame, layers })
                .map_err(|_| RtError::InstanceLossPending)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fakehost::FakeHost;

    #[test]
    fn wait_then_begin_then_end_succeeds() {
        let host = Arc::new(FakeHost::new());
        let time_base = crate::time::TimeBase::new(host.as_ref());
        let lifecycle = SessionLifecycle::new();
        lifecycle.ready_after_create();
        lifecycle.begin().unwrap();
        let frames: FrameLifecycle<FakeHost> = FrameLifecycle::new(Arc::clone(&host), true);

        frames.wait_frame(host.as_ref(), &lifecycle, &time_base).unwrap();
        let discarded = frames.begin_frame(host.as_ref(), &lifecycle).unwrap();
        assert!(!discarded);
        frames.end_frame(host.as_ref(), &lifecycle, vec![]).unwrap();
        assert_eq!(host.frames_ended(), 1);
    }

    #[test]
    fn begin_frame_without_wait_is_call_order_invalid() {
        let host = Arc::new(FakeHost::new());
        let lifecycle = SessionLifecycle::new();
        lifecycle.ready_after_create();
        lifecycle.begin().unwrap();
        let frames: FrameLifecycle<FakeHost> = FrameLifecycle::new(Arc::clone(&host), true);
        let err = frames.begin_frame(host.as_ref(), &lifecycle).unwrap_err();
        assert_eq!(err, RtError::CallOrderInvalid);
    }

    #[test]
    fn abandoned_frame_is_discarded_and_healed() {
        let host = Arc::new(FakeHost::new());
        let time_base = crate::time::TimeBase::new(host.as_ref());
        let lifecycle = SessionLifecycle::new();
        lifecycle.ready_after_create();
        lifecycle.begin().unwrap();
        // Synchronous submission so the heal is observable immediately.
        let frames: FrameLifecycle<FakeHost> = FrameLifecycle::new(Arc::clone(&host), true);

        frames.wait_frame(host.as_ref(), &lifecycle, &time_base).unwrap();
        let discarded = frames.begin_frame(host.as_ref(), &lifecycle).unwrap();
        assert!(!discarded);
        // Frame 1 never gets `EndFrame`.

        frames.wait_frame(host.as_ref(), &lifecycle, &time_base).unwrap();
        let discarded = frames.begin_frame(host.as_ref(), &lifecycle).unwrap();
        assert!(discarded);
        frames.end_frame(host.as_ref(), &lifecycle, vec![]).unwrap();

        // One dummy end for the healed frame 1, one real end for frame 2.
        assert_eq!(host.frames_ended(), 2);
        let calls = host.take_end_frame_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].frame, 1);
        assert_eq!(calls[1].frame, 2);
    }
}
