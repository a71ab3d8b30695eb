//! Custom error types for the coordinator.
//!
//! `RigError` is the single error type returned by coordinator operations. None
//! of its variants is fatal to the process: every one of them rejects only the
//! requested transition and leaves the rig as it was.
//!
//! ## Error Hierarchy
//!
//! - **`DependencyNotReady`**: a start was attempted before a required subsystem is
//!   Running. Rejected, never retried.
//! - **`AlreadyRunning`**: duplicate start.
//! - **`NotRunning`**: an operator command targeted a Stopped subsystem.
//! - **`SubsystemUnavailable`**: a command could not be handed to a worker (queue
//!   full or worker gone). Status reads never produce this; they return `None`.
//! - **`PreconditionViolation`**: aggregate, user-facing list of every readiness
//!   rule that blocked an experiment or plotter start.
//! - **`Config`** / **`ConfigValidation`**: load and semantic configuration errors.
//!
//! Driver failures are `anyhow::Error`s inside the worker and never cross into
//! this type.

use crate::core::SubsystemKind;
use thiserror::Error;

/// Convenience alias for results using the coordinator error type.
pub type RigResult<T> = std::result::Result<T, RigError>;

/// Errors returned by coordinator operations.
#[derive(Error, Debug)]
pub enum RigError {
    /// A start was requested before a required subsystem is Running.
    #[error("Cannot start {subsystem}: {missing} is not running")]
    DependencyNotReady {
        /// Subsystem whose start was rejected.
        subsystem: SubsystemKind,
        /// First required subsystem found Stopped.
        missing: SubsystemKind,
    },

    /// Duplicate start.
    #[error("Subsystem already running: {0}")]
    AlreadyRunning(SubsystemKind),

    /// A command targeted a Stopped subsystem.
    #[error("Subsystem not running: {0}")]
    NotRunning(SubsystemKind),

    /// The worker did not accept the command.
    #[error("Subsystem unavailable: {0}")]
    SubsystemUnavailable(SubsystemKind),

    /// Every readiness rule that blocked the request.
    #[error("Preconditions not met: {}", .0.join(" "))]
    PreconditionViolation(Vec<String>),

    /// The registry has no factory for the subsystem.
    #[error("No driver registered for subsystem: {0}")]
    DriverNotRegistered(SubsystemKind),

    /// A trial or metadata request without an experiment.
    #[error("No experiment is active")]
    NoActiveExperiment,

    /// Start or control request after shutdown.
    #[error("Rig has been shut down")]
    Halted,

    /// The supervisor task is gone.
    #[error("Supervisor is not running")]
    SupervisorUnavailable,

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Configuration loaded but is out of range.
    #[error("Configuration validation error: {0}")]
    ConfigValidation(String),

    /// File system failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Metadata could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<figment::Error> for RigError {
    fn from(err: figment::Error) -> Self {
        RigError::Config(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RigError::DependencyNotReady {
            subsystem: SubsystemKind::Optogenetics,
            missing: SubsystemKind::Stage,
        };
        assert_eq!(err.to_string(), "Cannot start optogenetics: stage is not running");
    }

    #[test]
    fn test_precondition_violation_lists_every_message() {
        let err = RigError::PreconditionViolation(vec![
            "Turn on the camera before starting the experiment.".into(),
            "Turn on the stage before starting the experiment.".into(),
        ]);
        let text = err.to_string();
        assert!(text.contains("camera"));
        assert!(text.contains("stage"));
    }
}
