//! Supervisory coordinator for an automated behavioral-experiment rig.
//!
//! The rig is made of independently running hardware subsystems (vision
//! tracker, motorized stage, subject dispenser, optogenetic light source,
//! visual stimulus and trial runner). This crate owns their lifecycle, checks
//! readiness before an experiment starts, watches for stalled trials and
//! tears everything down in a safe order.
//!
//! The entry point is [`supervisor::RigSupervisor`], usually spawned as an
//! actor and driven through [`messages::RigHandle`].

pub mod clock;
pub mod config;
pub mod context;
pub mod core;
pub mod error;
pub mod experiment;
pub mod health;
pub mod logging;
pub mod messages;
pub mod metadata;
pub mod operator;
pub mod polling;
pub mod status;
pub mod subsystem;
pub mod supervisor;
pub mod validation;

pub use error::{RigError, RigResult};
pub use supervisor::RigSupervisor;
