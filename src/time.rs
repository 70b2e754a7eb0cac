//! Conversion between OpenXR's `Time` (i64 nanoseconds, monotonic but
//! origin-unspecified) and the host runtime's `f64` seconds clock.

use openxr_sys as xr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

/// Captured once at instance creation: `offset = host_seconds -
/// monotonic_seconds`, so any later monotonic reading can be mapped into
/// the host's clock domain without calling back into the host runtime.
pub struct TimeBase {
    start: Instant,
    offset_seconds: f64,
    last_predicted_display_time: AtomicI64,
}

impl TimeBase {
    pub fn new(host: &dyn hostapi::HostRuntime) -> Self {
        let start = Instant::now();
        let host_now = host.now_seconds();
        Self {
            start,
            offset_seconds: host_now,
            last_predicted_display_time: AtomicI64::new(i64::MIN),
        }
    }

    fn monotonic_seconds(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// `host_seconds = monotonic_seconds + offset`, so `offset` is what we
    /// subtract from a host reading to land back on our monotonic clock.
    pub fn host_seconds_to_xr_time(&self, host_seconds: f64) -> xr::Time {
        let monotonic = host_seconds - self.offset_seconds;
        xr::Time::from_nanos((monotonic * 1_000_000_000.0).round() as i64)
    }

    pub fn xr_time_to_host_seconds(&self, time: xr::Time) -> f64 {
        (time.as_nanos() as f64 / 1_000_000_000.0) + self.offset_seconds
    }

    pub fn now(&self) -> xr::Time {
        xr::Time::from_nanos((self.monotonic_seconds() * 1_000_000_000.0).round() as i64)
    }

    pub fn perf_counter_to_time(&self, perf_counter_ticks: i64, ticks_per_second: i64) -> xr::Time {
        let seconds = perf_counter_ticks as f64 / ticks_per_second as f64;
        xr::Time::from_nanos((seconds * 1_000_000_000.0).round() as i64)
    }

    pub fn time_to_perf_counter(&self, time: xr::Time, ticks_per_second: i64) -> i64 {
        let seconds = time.as_nanos() as f64 / 1_000_000_000.0;
        (seconds * ticks_per_second as f64).round() as i64
    }

    /// `WaitFrame` must never hand back a time ≤ the previous call's; the
    /// host's own pacing can (rarely) regress, so we clamp forward by 1 ns.
    pub fn clamp_monotonic_display_time(&self, candidate: xr::Time) -> xr::Time {
        let candidate_nanos = candidate.as_nanos();
        let mut stored = candidate_nanos;
        self.last_predicted_display_time
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                stored = if candidate_nanos > last {
                    candidate_nanos
                } else {
                    last + 1
                };
                Some(stored)
            })
            .unwrap();
        xr::Time::from_nanos(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fakehost::FakeHost;

    #[test]
    fn predicted_display_time_never_regresses() {
        let host = FakeHost::new();
        let base = TimeBase::new(&host);
        let first = base.clamp_monotonic_display_time(xr::Time::from_nanos(1_000_000));
        let second = base.clamp_monotonic_display_time(xr::Time::from_nanos(500_000));
        assert!(second.as_nanos() > first.as_nanos());
    }

    #[test]
    fn monotonic_increase_passes_through() {
        let host = FakeHost::new();
        let base = TimeBase::new(&host);
        let first = base.clamp_monotonic_display_time(xr::Time::from_nanos(1_000_000));
        let second = base.clamp_monotonic_display_time(xr::Time::from_nanos(2_000_000));
        assert_eq!(second.as_nanos(), 2_000_000);
        assert!(first.as_nanos() < second.as_nanos());
    }
}
