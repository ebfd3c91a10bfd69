//! Live step counting session
//!
//! A pedometer reports the number of steps taken since its subscription started.
//! The session combines that reading with the count already persisted for the day:
//!
//! ```text
//! Idle --start(stored)--> Tracking --observe(reading)--> Tracking
//!                            |  ^
//!                      commit() |  (baseline += live delta)
//!                            v  |
//!                          Tracking --reset()--> Idle
//! ```
//!
//! `baseline_count` is the persisted part of today's total and `live_delta` the
//! steps observed since the last commit.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionState {
    #[default]
    Idle,
    Tracking,
}

/// Step counter for the current day
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepSession {
    state: SessionState,
    baseline_count: u64,
    live_delta: u64,
    /// Sensor reading already folded into the baseline
    committed_reading: u64,
}

impl StepSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn baseline_count(&self) -> u64 {
        self.baseline_count
    }

    pub fn live_delta(&self) -> u64 {
        self.live_delta
    }

    /// Steps for today: persisted baseline plus uncommitted live steps
    pub fn total(&self) -> u64 {
        self.baseline_count.saturating_add(self.live_delta)
    }

    /// Begin tracking on top of the count already stored for today
    pub fn start(&mut self, stored_steps: u64) {
        self.state = SessionState::Tracking;
        self.baseline_count = stored_steps;
        self.live_delta = 0;
        self.committed_reading = 0;
        debug!(baseline = stored_steps, "Step session started");
    }

    /// Adopt a stored count when the session has no baseline of its own yet
    pub fn seed(&mut self, stored_steps: u64) {
        if self.baseline_count == 0 && stored_steps > 0 {
            self.baseline_count = stored_steps;
        }
    }

    /// Record a sensor reading (steps since the subscription started)
    ///
    /// Returns the new total, or `None` while idle.
    pub fn observe(&mut self, reading: u64) -> Option<u64> {
        if self.state != SessionState::Tracking {
            trace!(reading, "Ignoring step reading while idle");
            return None;
        }
        self.live_delta = reading.saturating_sub(self.committed_reading);
        Some(self.total())
    }

    /// Fold live steps into the baseline
    ///
    /// Returns the total to persist when there was anything new since the last
    /// commit.
    pub fn commit(&mut self) -> Option<u64> {
        if self.state != SessionState::Tracking || self.live_delta == 0 {
            return None;
        }
        self.baseline_count = self.total();
        self.committed_reading = self.committed_reading.saturating_add(self.live_delta);
        self.live_delta = 0;
        debug!(total = self.baseline_count, "Step count committed");
        Some(self.baseline_count)
    }

    /// Replace the total with a count from an authoritative source
    /// (a platform step history for the whole day)
    pub fn adopt_authoritative(&mut self, steps: u64) {
        self.committed_reading = self.committed_reading.saturating_add(self.live_delta);
        self.baseline_count = steps;
        self.live_delta = 0;
    }

    /// Drop all counts and stop tracking
    pub fn reset(&mut self) {
        *self = Self::default();
        debug!("Step session reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_ignores_readings() {
        let mut session = StepSession::new();
        assert_eq!(session.observe(100), None);
        assert_eq!(session.total(), 0);
        assert_eq!(session.commit(), None);
    }

    #[test]
    fn test_tracking_adds_to_baseline() {
        let mut session = StepSession::new();
        session.start(1_000);
        assert_eq!(session.state(), SessionState::Tracking);
        assert_eq!(session.observe(250), Some(1_250));
        assert_eq!(session.baseline_count(), 1_000);
        assert_eq!(session.live_delta(), 250);
    }

    #[test]
    fn test_commit_does_not_double_count() {
        let mut session = StepSession::new();
        session.start(1_000);
        session.observe(250);
        assert_eq!(session.commit(), Some(1_250));
        assert_eq!(session.live_delta(), 0);

        // the sensor keeps counting from its own start
        assert_eq!(session.observe(300), Some(1_300));
        assert_eq!(session.commit(), Some(1_300));
        assert_eq!(session.commit(), None);
    }

    #[test]
    fn test_authoritative_count_replaces_total() {
        let mut session = StepSession::new();
        session.start(0);
        session.observe(400);
        session.adopt_authoritative(5_000);
        assert_eq!(session.total(), 5_000);
        assert_eq!(session.observe(450), Some(5_050));
    }

    #[test]
    fn test_seed_and_reset() {
        let mut session = StepSession::new();
        session.seed(700);
        assert_eq!(session.baseline_count(), 700);
        session.seed(900);
        assert_eq!(session.baseline_count(), 700);

        session.start(700);
        session.observe(10);
        session.reset();
        assert_eq!(session, StepSession::new());
        assert_eq!(session.state(), SessionState::Idle);
    }
}
