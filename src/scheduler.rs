//! Detection scheduling.
//!
//! The scheduler is the gate between the frame-tick rate (tens of Hz) and the
//! remote inference call rate. It enforces two rules:
//!
//! 1. a minimum interval between consecutive inference calls, and
//! 2. single-flight exclusion: at most one call outstanding at a time.
//!
//! State is an explicit machine rather than loose flags, so transitions are
//! named and auditable:
//!
//! - `Idle`: no call has been issued yet, or the cooldown has elapsed.
//! - `InFlight`: a call is outstanding; no tick may trigger.
//! - `CoolingDown`: the last call finished but `min_interval` has not elapsed
//!   since it was issued.
//!
//! The owning loop calls `should_trigger(now)` once per tick. On `true` it
//! must call `begin(now)` before issuing the call, and `finish()` on every
//! completion path, success or failure. A failed call still stamps
//! `last_invocation`, so the rate limit holds across failures.

use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerPhase {
    Idle,
    InFlight,
    CoolingDown,
}

/// Single-flight, time-windowed rate limiter for one frame source.
///
/// Owned by exactly one pipeline; never shared across sources.
#[derive(Debug)]
pub struct DetectionScheduler {
    min_interval: Duration,
    last_invocation: Option<Instant>,
    phase: SchedulerPhase,
}

impl DetectionScheduler {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_invocation: None,
            phase: SchedulerPhase::Idle,
        }
    }

    pub fn phase(&self) -> SchedulerPhase {
        self.phase
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Gate check for the current tick. Does not mutate state.
    pub fn should_trigger(&self, now: Instant) -> bool {
        if self.phase == SchedulerPhase::InFlight {
            return false;
        }
        match self.last_invocation {
            None => true,
            Some(last) => now.duration_since(last) >= self.min_interval,
        }
    }

    /// Transition to `InFlight` and stamp the invocation time.
    ///
    /// Must be called immediately after a `true` gate decision, before the
    /// call is issued, so a re-entrant tick cannot trigger a second call.
    pub fn begin(&mut self, now: Instant) {
        self.last_invocation = Some(now);
        self.phase = SchedulerPhase::InFlight;
    }

    /// Transition out of `InFlight`. Called on every completion path.
    pub fn finish(&mut self) {
        self.phase = match self.last_invocation {
            Some(last) if last.elapsed() < self.min_interval => SchedulerPhase::CoolingDown,
            _ => SchedulerPhase::Idle,
        };
    }

    /// Reset to the initial state. Used on pipeline teardown.
    pub fn reset(&mut self) {
        self.last_invocation = None;
        self.phase = SchedulerPhase::Idle;
    }
}
