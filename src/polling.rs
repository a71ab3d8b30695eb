//! Registry of the coordinator's scheduled polls.
//!
//! All polls share the supervisor tick. A poll runs on a tick only while it is
//! armed; shutdown cancels every poll at once. Display polls gate which parts
//! of the status frame get filled: a cancelled display poll leaves its fields
//! unavailable.

use crate::core::SubsystemKind;
use std::collections::BTreeMap;

/// A recurring poll driven by the supervisor tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PollKind {
    /// Status frame sampling.
    StatusFacade,
    /// Stalled-trial check.
    Liveness,
    /// Subject geometry fields.
    VisionDisplay,
    /// Stage position fields.
    StageDisplay,
    /// Dispenser state and gate fields.
    DispenserDisplay,
    /// LED field.
    OptoDisplay,
    /// Experiment and trial fields.
    ExperimentDisplay,
}

impl PollKind {
    /// Every display poll, sampled together with the status frame.
    pub const DISPLAY: [PollKind; 5] = [
        PollKind::VisionDisplay,
        PollKind::StageDisplay,
        PollKind::DispenserDisplay,
        PollKind::OptoDisplay,
        PollKind::ExperimentDisplay,
    ];

    /// Display poll that accompanies a running subsystem, if any.
    pub fn display_for(kind: SubsystemKind) -> Option<PollKind> {
        match kind {
            SubsystemKind::Vision => Some(PollKind::VisionDisplay),
            SubsystemKind::Stage => Some(PollKind::StageDisplay),
            SubsystemKind::Dispenser => Some(PollKind::DispenserDisplay),
            SubsystemKind::Optogenetics => Some(PollKind::OptoDisplay),
            SubsystemKind::Trial => Some(PollKind::ExperimentDisplay),
            SubsystemKind::Stimulus => None,
        }
    }
}

/// Armed polls and how many times each has run.
#[derive(Debug, Default)]
pub struct PollScheduler {
    polls: BTreeMap<PollKind, u64>,
}

impl PollScheduler {
    /// An empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `poll`. Re-arming keeps its run count.
    pub fn arm(&mut self, poll: PollKind) {
        self.polls.entry(poll).or_insert(0);
    }

    /// Disarm `poll` and forget its run count.
    pub fn cancel(&mut self, poll: PollKind) {
        self.polls.remove(&poll);
    }

    /// Disarm every poll.
    pub fn cancel_all(&mut self) {
        self.polls.clear();
    }

    /// Whether `poll` runs on the next tick.
    pub fn is_armed(&self, poll: PollKind) -> bool {
        self.polls.contains_key(&poll)
    }

    /// Armed polls in a stable order.
    pub fn armed(&self) -> Vec<PollKind> {
        self.polls.keys().copied().collect()
    }

    /// Count a run of `poll` if it is armed. Returns whether it ran.
    pub fn record(&mut self, poll: PollKind) -> bool {
        match self.polls.get_mut(&poll) {
            Some(runs) => {
                *runs += 1;
                true
            }
            None => false,
        }
    }

    /// Runs of `poll` since it was armed, or zero if not armed.
    pub fn runs(&self, poll: PollKind) -> u64 {
        self.polls.get(&poll).copied().unwrap_or(0)
    }
}
