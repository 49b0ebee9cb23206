use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::types::{SessionSnapshot, StatusReading};

/// Observed belt transition from one status reading to the next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeltEvent {
    /// No state change
    None,
    /// Speed rose above zero while not started: someone used the on-unit
    /// controls
    ExternallyStarted,
    /// Speed fell to exactly zero while decreasing: stopped on the unit
    ExternallyStopped,
}

/// Running session accumulators and external-change detection
///
/// Tracks since-start and lifetime totals for elapsed time, steps and
/// distance. Totals only advance while the belt is considered started, and
/// only by deltas between consecutive readings where all three deltas are
/// non-negative — a decoder glitch or device counter reset producing a
/// negative delta silently drops that whole tick's contribution.
#[derive(Debug, Default)]
pub struct SessionState {
    started: bool,
    started_at: Option<DateTime<Utc>>,
    prev: Option<StatusReading>,

    time_accum: Duration,
    steps_accum: u64,
    km_accum: f64,

    time_total: Duration,
    steps_total: u64,
    km_total: f64,
}

impl SessionState {
    /// Create an empty session
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the belt is considered started
    #[must_use]
    pub const fn started(&self) -> bool {
        self.started
    }

    /// When the current session began, if one is in progress or pending
    /// report
    #[must_use]
    pub const fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Since-start accumulators: (elapsed, steps, distance km)
    #[must_use]
    pub const fn current(&self) -> (Duration, u64, f64) {
        (self.time_accum, self.steps_accum, self.km_accum)
    }

    /// Mark the belt started and record the session start time
    pub fn begin(&mut self) {
        self.started = true;
        self.started_at = Some(Utc::now());
    }

    /// Mark the belt stopped
    pub fn end(&mut self) {
        self.started = false;
    }

    /// Fold a new reading into the session
    ///
    /// Detects external starts/stops first, then advances the accumulators
    /// if the belt is started. Returns the detected transition so the caller
    /// can run stop accounting.
    pub fn observe(&mut self, reading: Option<StatusReading>) -> BeltEvent {
        let Some(new) = reading else {
            return BeltEvent::None;
        };
        let prev = self.prev.replace(new);

        let prev_speed = prev.map_or(0.0, |p| p.speed);
        let speed_diff = new.speed - prev_speed;

        let mut event = BeltEvent::None;
        if !self.started && speed_diff > 0.0 {
            self.begin();
            event = BeltEvent::ExternallyStarted;
        }
        if self.started && speed_diff < 0.0 && new.speed == 0.0 {
            self.end();
            event = BeltEvent::ExternallyStopped;
        }

        if self.started {
            let (prev_elapsed, prev_steps, prev_km) =
                prev.map_or((Duration::ZERO, 0, 0.0), |p| (p.elapsed, p.steps, p.distance_km));

            let time_ok = new.elapsed >= prev_elapsed;
            let steps_ok = new.steps >= prev_steps;
            let km_diff = new.distance_km - prev_km;

            // joint guard: a single negative delta drops the whole tick
            if time_ok && steps_ok && km_diff >= 0.0 {
                let time_diff = new.elapsed - prev_elapsed;
                let steps_diff = u64::from(new.steps - prev_steps);

                self.time_accum += time_diff;
                self.steps_accum += steps_diff;
                self.km_accum += km_diff;
                self.time_total += time_diff;
                self.steps_total += steps_diff;
                self.km_total += km_diff;
            }
        }

        event
    }

    /// Reset the since-start accumulators after a session was reported
    ///
    /// Lifetime totals are preserved. If the report was skipped, callers
    /// leave the accumulators alone so a short pause-then-resume is treated
    /// as one continuous session.
    pub fn reset_current(&mut self) {
        self.started_at = None;
        self.time_accum = Duration::ZERO;
        self.steps_accum = 0;
        self.km_accum = 0.0;
    }

    /// Void the session while the link is down
    pub fn void(&mut self) {
        self.started = false;
        self.prev = None;
    }

    /// Snapshot for the UI boundary
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            started: self.started,
            speed: self.prev.map_or(0.0, |p| p.speed),
            time_total: self.time_total,
            steps_total: self.steps_total,
            km_total: self.km_total,
        }
    }
}
