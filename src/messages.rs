//! Message types for actor-based communication
//!
//! Operator requests reach the [`RigSupervisor`](crate::supervisor::RigSupervisor)
//! as [`RigCommand`]s over an mpsc channel. Each command carries a oneshot
//! sender for its reply. [`RigHandle`] wraps the channel in async methods.

use crate::config::DetectionParams;
use crate::core::{Direction, LifecycleState, StimulusMode, SubsystemCommand, SubsystemKind};
use crate::error::{RigError, RigResult};
use crate::experiment::TrialSession;
use crate::metadata::ExperimentMetadata;
use crate::status::StatusFrame;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::{mpsc, oneshot, watch};

/// Operator intent aimed at one running subsystem.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    /// Change the subject size filter. Kept for the next Vision start when Vision is stopped.
    SetDetection(DetectionParams),
    /// Toggle the contour and threshold overlays.
    SetOverlay {
        /// Draw contours.
        contours: bool,
        /// Show the thresholded image.
        threshold: bool,
    },

    /// Run the stage homing sequence.
    InitializeStage,
    /// Record the current stage position as the reference center.
    MarkCenter,
    /// Return the stage to the marked center.
    MoveToCenter,
    /// Start moving the stage in one direction.
    Jog(Direction),
    /// Stop a jog.
    JogStop,
    /// Closed-loop tracking gain.
    SetLoopGain(f64),

    /// Release one subject.
    Release,
    /// Open the dispenser gate.
    OpenGate,
    /// Close the dispenser gate.
    CloseGate,
    /// Run the gate calibration.
    CalibrateGate,

    /// Switch the LED on.
    LightOn,
    /// Switch the LED off.
    LightOff,
    /// One LED pulse.
    Pulse,
    /// Enable foraging mode.
    EnableForaging,

    /// Stimulus presentation mode.
    SetStimulusMode(StimulusMode),
    /// Toggle closed-loop stimulus tracking.
    SetClosedLoop {
        /// Follow the subject position.
        position: bool,
        /// Follow the subject heading.
        angle: bool,
    },
}

impl ControlCommand {
    /// Subsystem the command is addressed to.
    pub fn target(&self) -> SubsystemKind {
        use ControlCommand::*;
        match self {
            SetDetection(_) | SetOverlay { .. } => SubsystemKind::Vision,
            InitializeStage | MarkCenter | MoveToCenter | Jog(_) | JogStop | SetLoopGain(_) => {
                SubsystemKind::Stage
            }
            Release | OpenGate | CloseGate | CalibrateGate => SubsystemKind::Dispenser,
            LightOn | LightOff | Pulse | EnableForaging => SubsystemKind::Optogenetics,
            SetStimulusMode(_) | SetClosedLoop { .. } => SubsystemKind::Stimulus,
        }
    }

    /// The worker command carrying this intent.
    pub fn to_subsystem_command(&self) -> SubsystemCommand {
        match self {
            ControlCommand::SetDetection(params) => SubsystemCommand::SetDetection(*params),
            ControlCommand::SetOverlay {
                contours,
                threshold,
            } => SubsystemCommand::SetOverlay {
                contours: *contours,
                threshold: *threshold,
            },
            ControlCommand::InitializeStage => SubsystemCommand::Initialize,
            ControlCommand::MarkCenter => SubsystemCommand::MarkCenter,
            ControlCommand::MoveToCenter => SubsystemCommand::MoveToCenter,
            ControlCommand::Jog(direction) => SubsystemCommand::Jog(*direction),
            ControlCommand::JogStop => SubsystemCommand::JogStop,
            ControlCommand::SetLoopGain(gain) => SubsystemCommand::SetLoopGain(*gain),
            ControlCommand::Release => SubsystemCommand::Release,
            ControlCommand::OpenGate => SubsystemCommand::OpenGate,
            ControlCommand::CloseGate => SubsystemCommand::CloseGate,
            ControlCommand::CalibrateGate => SubsystemCommand::CalibrateGate,
            ControlCommand::LightOn => SubsystemCommand::LightOn,
            ControlCommand::LightOff => SubsystemCommand::LightOff,
            ControlCommand::Pulse => SubsystemCommand::Pulse,
            ControlCommand::EnableForaging => SubsystemCommand::EnableForaging,
            ControlCommand::SetStimulusMode(mode) => SubsystemCommand::SetMode(*mode),
            ControlCommand::SetClosedLoop { position, angle } => SubsystemCommand::SetClosedLoop {
                position: *position,
                angle: *angle,
            },
        }
    }
}

/// Commands that can be sent to the RigSupervisor
#[derive(Debug)]
pub enum RigCommand {
    /// Start a subsystem (starting Trial starts an experiment)
    StartSubsystem {
        /// Target subsystem.
        kind: SubsystemKind,
        /// Reply channel.
        response: oneshot::Sender<RigResult<()>>,
    },

    /// Stop a subsystem; stopping a Stopped subsystem is a no-op
    StopSubsystem {
        /// Target subsystem.
        kind: SubsystemKind,
        /// Reply channel.
        response: oneshot::Sender<RigResult<()>>,
    },

    /// Forward an operator intent to a running subsystem
    Control {
        /// Operator intent.
        command: ControlCommand,
        /// Reply channel.
        response: oneshot::Sender<RigResult<()>>,
    },

    /// Validate readiness and start an experiment
    StartExperiment {
        /// Reply channel.
        response: oneshot::Sender<RigResult<()>>,
    },

    /// Stop the experiment, keeping hardware running
    StopExperiment {
        /// Reply channel.
        response: oneshot::Sender<RigResult<()>>,
    },

    /// Open the next trial
    StartTrial {
        /// Reply channel.
        response: oneshot::Sender<RigResult<()>>,
    },

    /// End the current trial
    StopTrial {
        /// Reply channel.
        response: oneshot::Sender<RigResult<()>>,
    },

    /// Open the subject-position plotter
    OpenPlotter {
        /// Reply channel.
        response: oneshot::Sender<RigResult<()>>,
    },

    /// Close the plotter
    ClosePlotter {
        /// Reply channel.
        response: oneshot::Sender<RigResult<()>>,
    },

    /// Write metadata.txt for the active experiment
    SaveMetadata {
        /// Fields to write.
        metadata: ExperimentMetadata,
        /// Reply channel.
        response: oneshot::Sender<RigResult<PathBuf>>,
    },

    /// Copy of the active session, if any
    GetSession {
        /// Reply channel.
        response: oneshot::Sender<Option<TrialSession>>,
    },

    /// Lifecycle state of every subsystem
    GetStates {
        /// Reply channel.
        response: oneshot::Sender<BTreeMap<SubsystemKind, LifecycleState>>,
    },

    /// Total, idempotent teardown; the supervisor exits afterwards
    Shutdown {
        /// Reply channel.
        response: oneshot::Sender<()>,
    },
}

impl RigCommand {
    /// [`RigCommand::StartSubsystem`] with its reply receiver.
    pub fn start_subsystem(kind: SubsystemKind) -> (Self, oneshot::Receiver<RigResult<()>>) {
        let (tx, rx) = oneshot::channel();
        (Self::StartSubsystem { kind, response: tx }, rx)
    }

    /// [`RigCommand::StopSubsystem`] with its reply receiver.
    pub fn stop_subsystem(kind: SubsystemKind) -> (Self, oneshot::Receiver<RigResult<()>>) {
        let (tx, rx) = oneshot::channel();
        (Self::StopSubsystem { kind, response: tx }, rx)
    }

    /// [`RigCommand::Control`] with its reply receiver.
    pub fn control(command: ControlCommand) -> (Self, oneshot::Receiver<RigResult<()>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self::Control {
                command,
                response: tx,
            },
            rx,
        )
    }

    /// [`RigCommand::StartExperiment`] with its reply receiver.
    pub fn start_experiment() -> (Self, oneshot::Receiver<RigResult<()>>) {
        let (tx, rx) = oneshot::channel();
        (Self::StartExperiment { response: tx }, rx)
    }

    /// [`RigCommand::StopExperiment`] with its reply receiver.
    pub fn stop_experiment() -> (Self, oneshot::Receiver<RigResult<()>>) {
        let (tx, rx) = oneshot::channel();
        (Self::StopExperiment { response: tx }, rx)
    }

    /// [`RigCommand::StartTrial`] with its reply receiver.
    pub fn start_trial() -> (Self, oneshot::Receiver<RigResult<()>>) {
        let (tx, rx) = oneshot::channel();
        (Self::StartTrial { response: tx }, rx)
    }

    /// [`RigCommand::StopTrial`] with its reply receiver.
    pub fn stop_trial() -> (Self, oneshot::Receiver<RigResult<()>>) {
        let (tx, rx) = oneshot::channel();
        (Self::StopTrial { response: tx }, rx)
    }

    /// [`RigCommand::OpenPlotter`] with its reply receiver.
    pub fn open_plotter() -> (Self, oneshot::Receiver<RigResult<()>>) {
        let (tx, rx) = oneshot::channel();
        (Self::OpenPlotter { response: tx }, rx)
    }

    /// [`RigCommand::ClosePlotter`] with its reply receiver.
    pub fn close_plotter() -> (Self, oneshot::Receiver<RigResult<()>>) {
        let (tx, rx) = oneshot::channel();
        (Self::ClosePlotter { response: tx }, rx)
    }

    /// [`RigCommand::SaveMetadata`] with its reply receiver.
    pub fn save_metadata(
        metadata: ExperimentMetadata,
    ) -> (Self, oneshot::Receiver<RigResult<PathBuf>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self::SaveMetadata {
                metadata,
                response: tx,
            },
            rx,
        )
    }

    /// [`RigCommand::GetSession`] with its reply receiver.
    pub fn get_session() -> (Self, oneshot::Receiver<Option<TrialSession>>) {
        let (tx, rx) = oneshot::channel();
        (Self::GetSession { response: tx }, rx)
    }

    /// [`RigCommand::GetStates`] with its reply receiver.
    pub fn get_states() -> (
        Self,
        oneshot::Receiver<BTreeMap<SubsystemKind, LifecycleState>>,
    ) {
        let (tx, rx) = oneshot::channel();
        (Self::GetStates { response: tx }, rx)
    }

    /// [`RigCommand::Shutdown`] with its reply receiver.
    pub fn shutdown() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self::Shutdown { response: tx }, rx)
    }
}

/// Cloneable client for a running supervisor.
///
/// Every method fails with `SupervisorUnavailable` once the supervisor task
/// has exited.
#[derive(Clone, Debug)]
pub struct RigHandle {
    command_tx: mpsc::Sender<RigCommand>,
    status_rx: watch::Receiver<StatusFrame>,
}

impl RigHandle {
    /// Wrap the supervisor's command sender and status receiver.
    pub fn new(command_tx: mpsc::Sender<RigCommand>, status_rx: watch::Receiver<StatusFrame>) -> Self {
        Self {
            command_tx,
            status_rx,
        }
    }

    async fn request<T>(&self, (command, rx): (RigCommand, oneshot::Receiver<T>)) -> RigResult<T> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| RigError::SupervisorUnavailable)?;
        rx.await.map_err(|_| RigError::SupervisorUnavailable)
    }

    /// Start a subsystem.
    pub async fn start(&self, kind: SubsystemKind) -> RigResult<()> {
        self.request(RigCommand::start_subsystem(kind)).await?
    }

    /// Stop a subsystem. No-op when already Stopped.
    pub async fn stop(&self, kind: SubsystemKind) -> RigResult<()> {
        self.request(RigCommand::stop_subsystem(kind)).await?
    }

    /// Forward an operator intent.
    pub async fn control(&self, command: ControlCommand) -> RigResult<()> {
        self.request(RigCommand::control(command)).await?
    }

    /// Start an experiment.
    pub async fn start_experiment(&self) -> RigResult<()> {
        self.request(RigCommand::start_experiment()).await?
    }

    /// Stop the active experiment.
    pub async fn stop_experiment(&self) -> RigResult<()> {
        self.request(RigCommand::stop_experiment()).await?
    }

    /// Open the next trial.
    pub async fn start_trial(&self) -> RigResult<()> {
        self.request(RigCommand::start_trial()).await?
    }

    /// End the current trial.
    pub async fn stop_trial(&self) -> RigResult<()> {
        self.request(RigCommand::stop_trial()).await?
    }

    /// Open the plotter.
    pub async fn open_plotter(&self) -> RigResult<()> {
        self.request(RigCommand::open_plotter()).await?
    }

    /// Close the plotter.
    pub async fn close_plotter(&self) -> RigResult<()> {
        self.request(RigCommand::close_plotter()).await?
    }

    /// Write metadata for the active experiment. Returns the file path.
    pub async fn save_metadata(&self, metadata: ExperimentMetadata) -> RigResult<PathBuf> {
        self.request(RigCommand::save_metadata(metadata)).await?
    }

    /// Copy of the active session.
    pub async fn session(&self) -> RigResult<Option<TrialSession>> {
        self.request(RigCommand::get_session()).await
    }

    /// Lifecycle state of every subsystem.
    pub async fn states(&self) -> RigResult<BTreeMap<SubsystemKind, LifecycleState>> {
        self.request(RigCommand::get_states()).await
    }

    /// Total teardown. The supervisor exits afterwards.
    pub async fn shutdown(&self) -> RigResult<()> {
        self.request(RigCommand::shutdown()).await
    }

    /// Latest published status frame.
    pub fn status(&self) -> StatusFrame {
        self.status_rx.borrow().clone()
    }

    /// Receiver notified on every published frame.
    pub fn subscribe(&self) -> watch::Receiver<StatusFrame> {
        self.status_rx.clone()
    }
}
