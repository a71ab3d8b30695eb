//! The coordinator's view of the running experiment.
//!
//! A `TrialSession` exists from experiment start to experiment stop. It is
//! updated by explicit trial start/stop requests and by folding in the trial
//! runner's published status every tick. All timestamps come from the
//! coordinator's clock, so the idle clock never mixes time sources.

use crate::core::TrialStatus;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// State label of a trial in progress.
pub const STATE_RUNNING: &str = "Running";
/// State label after an operator trial stop.
pub const STATE_RESET: &str = "Reset";

/// Outcome of folding one trial runner status into the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionUpdate {
    /// The runner reported a higher trial number: a new subject arrived.
    NewTrial(u32),
    /// Same trial; end time or label may have changed.
    Updated,
    /// Status from an earlier trial.
    Ignored,
}

/// Experiment and current-trial bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialSession {
    experiment_id: String,
    exp_dir: PathBuf,
    trial_number: u32,
    trial_start: DateTime<Utc>,
    trial_end: Option<DateTime<Utc>>,
    state: String,
}

impl TrialSession {
    /// New session with trial 1 started at `now`.
    pub fn begin(experiment_id: impl Into<String>, exp_dir: impl Into<PathBuf>, now: DateTime<Utc>) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            exp_dir: exp_dir.into(),
            trial_number: 1,
            trial_start: now,
            trial_end: None,
            state: STATE_RUNNING.to_string(),
        }
    }

    /// `YYYYMMDD-HHMMSS` of the experiment start.
    pub fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    /// Output directory of this experiment.
    pub fn exp_dir(&self) -> &Path {
        &self.exp_dir
    }

    /// Current trial, starting at 1.
    pub fn trial_number(&self) -> u32 {
        self.trial_number
    }

    /// When the current trial began.
    pub fn trial_start(&self) -> DateTime<Utc> {
        self.trial_start
    }

    /// `None` while a subject is present.
    pub fn trial_end(&self) -> Option<DateTime<Utc>> {
        self.trial_end
    }

    /// Rig state label shown to the operator.
    pub fn state(&self) -> &str {
        &self.state
    }

    /// Replace the rig state label.
    pub fn set_state(&mut self, state: impl Into<String>) {
        self.state = state.into();
    }

    /// Advance to the next trial.
    pub fn begin_trial(&mut self, now: DateTime<Utc>) {
        self.trial_number += 1;
        self.trial_start = now;
        self.trial_end = None;
        self.state = STATE_RUNNING.to_string();
    }

    /// Mark the current trial finished. An already-ended trial keeps its end time.
    pub fn end_trial(&mut self, now: DateTime<Utc>, state: impl Into<String>) {
        if self.trial_end.is_none() {
            self.trial_end = Some(now);
        }
        self.state = state.into();
    }

    /// Time since the last trial ended; `None` while a trial is in progress.
    pub fn idle(&self, now: DateTime<Utc>) -> Option<Duration> {
        let end = self.trial_end?;
        Some((now - end).to_std().unwrap_or(Duration::ZERO))
    }

    /// Time since the current trial started.
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        (now - self.trial_start).to_std().unwrap_or(Duration::ZERO)
    }

    /// Fold the trial runner's status into the session.
    pub fn absorb(&mut self, status: &TrialStatus, now: DateTime<Utc>) -> SessionUpdate {
        if status.trial_number > self.trial_number {
            self.trial_number = status.trial_number;
            self.trial_start = now;
            self.trial_end = None;
            self.state = status.state.clone();
            return SessionUpdate::NewTrial(status.trial_number);
        }
        if status.trial_number < self.trial_number {
            return SessionUpdate::Ignored;
        }

        // The runner can lag behind an operator stop; only its end transition counts.
        if status.trial_end.is_some() && self.trial_end.is_none() {
            self.trial_end = Some(now);
            self.state = status.state.clone();
        }
        SessionUpdate::Updated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH + chrono::Duration::seconds(secs)
    }

    fn status(trial_number: u32, ended: bool) -> TrialStatus {
        TrialStatus {
            experiment: "exp".into(),
            trial_number,
            trial_start: Some(at(0)),
            trial_end: ended.then(|| at(0)),
            state: (if ended { "Waiting" } else { "Running" }).to_string(),
            subject_present: !ended,
        }
    }

    #[test]
    fn test_begin_starts_trial_one() {
        let session = TrialSession::begin("exp", "data/exp", at(10));
        assert_eq!(session.trial_number(), 1);
        assert_eq!(session.trial_start(), at(10));
        assert!(session.trial_end().is_none());
        assert!(session.idle(at(100)).is_none());
    }

    #[test]
    fn test_idle_clock() {
        let mut session = TrialSession::begin("exp", "data/exp", at(0));
        session.end_trial(at(30), STATE_RESET);
        session.end_trial(at(40), STATE_RESET);
        assert_eq!(session.trial_end(), Some(at(30)));
        assert_eq!(session.idle(at(90)), Some(Duration::from_secs(60)));
        assert_eq!(session.idle(at(10)), Some(Duration::ZERO));

        session.begin_trial(at(100));
        assert_eq!(session.trial_number(), 2);
        assert!(session.idle(at(200)).is_none());
        assert_eq!(session.elapsed(at(165)), Duration::from_secs(65));
    }

    #[test]
    fn test_absorb() {
        let mut session = TrialSession::begin("exp", "data/exp", at(0));
        assert_eq!(session.absorb(&status(1, false), at(1)), SessionUpdate::Updated);
        assert!(session.trial_end().is_none());

        assert_eq!(session.absorb(&status(1, true), at(5)), SessionUpdate::Updated);
        assert_eq!(session.trial_end(), Some(at(5)));
        assert_eq!(session.state(), "Waiting");

        assert_eq!(session.absorb(&status(3, false), at(9)), SessionUpdate::NewTrial(3));
        assert_eq!(session.trial_number(), 3);
        assert_eq!(session.trial_start(), at(9));
        assert!(session.trial_end().is_none());

        assert_eq!(session.absorb(&status(2, true), at(10)), SessionUpdate::Ignored);
        assert!(session.trial_end().is_none());
    }

    #[test]
    fn test_runner_lag_does_not_reopen_trial() {
        let mut session = TrialSession::begin("exp", "data/exp", at(0));
        session.end_trial(at(5), STATE_RESET);
        session.absorb(&status(1, false), at(6));
        assert_eq!(session.trial_end(), Some(at(5)));
        assert_eq!(session.state(), STATE_RESET);
    }
}
