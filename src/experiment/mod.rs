//! Experiment and trial bookkeeping
//!
//! An experiment runs many sequential trials. Each trial lasts as long as a
//! subject is present in the arena.

pub mod session;

pub use session::{SessionUpdate, TrialSession, STATE_RESET, STATE_RUNNING};

use chrono::{DateTime, Utc};

/// Experiment identifier derived from its start time.
pub fn experiment_id(started: DateTime<Utc>) -> String {
    started.format("%Y%m%d-%H%M%S").to_string()
}
