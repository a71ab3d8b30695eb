//! Rig supervisor actor.
//!
//! Owns every subsystem handle, the experiment session, the liveness monitor
//! and the poll registry. All mutation happens on the actor task: operator
//! requests arrive as [`RigCommand`]s and are interleaved with the fixed
//! supervisor tick, so a stop handled before a tick is always visible as an
//! unavailable status on that tick.
//!
//! The public methods are also usable without the actor loop. Tests drive
//! `tick()` by hand against a manual clock.

use crate::clock::Clock;
use crate::config::{DetectionParams, Settings};
use crate::context::RigContext;
use crate::core::{StatusSnapshot, SubsystemCommand, SubsystemConfig, SubsystemKind};
use crate::error::{RigError, RigResult};
use crate::experiment::{experiment_id, SessionUpdate, TrialSession, STATE_RESET};
use crate::health::{EscalationPolicy, LivenessMonitor};
use crate::messages::{ControlCommand, RigCommand, RigHandle};
use crate::metadata::ExperimentMetadata;
use crate::operator::{OperatorSurface, ViewKind, STAGE_HOMING_PROMPT};
use crate::polling::{PollKind, PollScheduler};
use crate::status::StatusFrame;
use crate::subsystem::DriverRegistry;
use crate::validation::{validate, Intent, PendingMessages, ReadinessRule, Violation};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// View opened alongside a subsystem.
fn view_for(kind: SubsystemKind) -> Option<ViewKind> {
    match kind {
        SubsystemKind::Vision => Some(ViewKind::Camera),
        SubsystemKind::Dispenser => Some(ViewKind::Dispenser),
        _ => None,
    }
}

/// Owns the rig and serializes every lifecycle transition.
///
/// Drive it directly (tests, tools) or through [`RigSupervisor::spawn`].
pub struct RigSupervisor {
    settings: Arc<Settings>,
    registry: Arc<DriverRegistry>,
    operator: Arc<dyn OperatorSurface>,
    clock: Arc<dyn Clock>,
    context: RigContext,
    session: Option<TrialSession>,
    liveness: LivenessMonitor,
    polls: PollScheduler,
    pending: PendingMessages,
    detection: DetectionParams,
    status_tx: watch::Sender<StatusFrame>,
    shutdown_flag: bool,
}

impl RigSupervisor {
    /// A cold rig: every subsystem Stopped, status and liveness polls armed.
    ///
    /// # Errors
    ///
    /// `ConfigValidation` (or another validation error) if `settings` fail
    /// [`Settings::validate`]. Zero intervals or queue capacities would
    /// otherwise panic inside the runtime.
    pub fn new(
        settings: Arc<Settings>,
        registry: Arc<DriverRegistry>,
        operator: Arc<dyn OperatorSurface>,
        clock: Arc<dyn Clock>,
    ) -> RigResult<Self> {
        settings.validate()?;
        let (status_tx, _) = watch::channel(StatusFrame::default());
        let liveness = LivenessMonitor::new(EscalationPolicy::from(&settings.escalation));
        let mut polls = PollScheduler::new();
        polls.arm(PollKind::StatusFacade);
        polls.arm(PollKind::Liveness);

        Ok(Self {
            detection: settings.detection,
            settings,
            registry,
            operator,
            clock,
            context: RigContext::new(),
            session: None,
            liveness,
            polls,
            pending: PendingMessages::new(),
            status_tx,
            shutdown_flag: false,
        })
    }

    /// Subsystem handles and operator-side state.
    pub fn context(&self) -> &RigContext {
        &self.context
    }

    /// Active experiment session, if any.
    pub fn session(&self) -> Option<&TrialSession> {
        self.session.as_ref()
    }

    /// Stalled-trial monitor.
    pub fn liveness(&self) -> &LivenessMonitor {
        &self.liveness
    }

    /// Periodic polls and their run counts.
    pub fn polls(&self) -> &PollScheduler {
        &self.polls
    }

    /// Detection parameters used for the next Vision start.
    pub fn detection(&self) -> DetectionParams {
        self.detection
    }

    /// True once shutdown has run.
    pub fn is_halted(&self) -> bool {
        self.shutdown_flag
    }

    /// Receiver for every published status frame.
    pub fn subscribe_status(&self) -> watch::Receiver<StatusFrame> {
        self.status_tx.subscribe()
    }

    fn ensure_live(&self) -> RigResult<()> {
        if self.shutdown_flag {
            return Err(RigError::Halted);
        }
        Ok(())
    }

    // =========================================================================
    // Subsystem lifecycle
    // =========================================================================

    /// Start one subsystem.
    ///
    /// Starting the Stage asks the operator whether to home it and waits for
    /// the answer. Starting Trial is the same as [`start_experiment`](Self::start_experiment).
    ///
    /// # Errors
    ///
    /// `AlreadyRunning`, `DependencyNotReady` or `DriverNotRegistered`. The rig
    /// is unchanged on error.
    pub async fn start_subsystem(&mut self, kind: SubsystemKind) -> RigResult<()> {
        self.ensure_live()?;
        let mut config = match kind {
            SubsystemKind::Trial => return self.start_experiment(),
            SubsystemKind::Vision => SubsystemConfig::Vision {
                detection: self.detection,
            },
            SubsystemKind::Stage => SubsystemConfig::Stage {
                initialize: false,
                loop_gain: self.settings.tracking.loop_gain,
            },
            SubsystemKind::Dispenser => SubsystemConfig::Dispenser,
            SubsystemKind::Optogenetics => SubsystemConfig::Optogenetics,
            SubsystemKind::Stimulus => SubsystemConfig::Stimulus {
                mode: Default::default(),
                closed_loop_position: self.settings.tracking.closed_loop_position,
                closed_loop_angle: self.settings.tracking.closed_loop_angle,
            },
        };

        if self.context.is_running(kind) {
            return Err(RigError::AlreadyRunning(kind));
        }
        self.check_dependencies(kind)?;
        if !self.registry.contains(kind) {
            return Err(RigError::DriverNotRegistered(kind));
        }

        // The operator is only asked once the start is known to go ahead.
        if let SubsystemConfig::Stage { initialize, .. } = &mut config {
            *initialize = self.operator.confirm(STAGE_HOMING_PROMPT).await;
        }
        self.launch(kind, config)
    }

    /// Stop one subsystem. Stopping a Stopped subsystem is a no-op, also
    /// after shutdown.
    ///
    /// Stopping Trial stops the experiment.
    pub fn stop_subsystem(&mut self, kind: SubsystemKind) -> RigResult<()> {
        if kind == SubsystemKind::Trial {
            self.end_experiment();
        } else {
            self.halt_subsystem(kind);
        }
        Ok(())
    }

    fn check_dependencies(&self, kind: SubsystemKind) -> RigResult<()> {
        for &required in kind.requires() {
            if !self.context.is_running(required) {
                warn!(subsystem = %kind, missing = %required, "Start rejected, dependency not running");
                return Err(RigError::DependencyNotReady {
                    subsystem: kind,
                    missing: required,
                });
            }
        }
        Ok(())
    }

    fn launch(&mut self, kind: SubsystemKind, config: SubsystemConfig) -> RigResult<()> {
        let driver = self
            .registry
            .create(kind)
            .ok_or(RigError::DriverNotRegistered(kind))?;
        let links = self.context.links_for(kind);
        self.context
            .handle_mut(kind)
            .start(driver, config, links, &self.settings.workers)?;

        self.rebind_observers_of(kind);
        if let Some(poll) = PollKind::display_for(kind) {
            self.polls.arm(poll);
        }
        if let Some(view) = view_for(kind) {
            self.open_view(view);
        }
        Ok(())
    }

    /// Silent no-op when `kind` is not running.
    fn halt_subsystem(&mut self, kind: SubsystemKind) {
        if !self.context.is_running(kind) {
            debug!(subsystem = %kind, "Stop ignored, not running");
            return;
        }
        if kind == SubsystemKind::Optogenetics {
            if let Err(e) = self.context.handle(kind).send_urgent(SubsystemCommand::LightOff) {
                error!(subsystem = %kind, "Light-off not delivered before stop, LED may stay on: {}", e);
            }
        }
        if let Some(view) = view_for(kind) {
            self.close_view(view);
        }
        if let Some(poll) = PollKind::display_for(kind) {
            self.polls.cancel(poll);
        }

        self.context.handle_mut(kind).stop();
        if kind == SubsystemKind::Stage {
            self.context.set_center_marked(false);
        }
        self.rebind_observers_of(kind);
    }

    /// Hand every running observer of `kind` a fresh set of links.
    fn rebind_observers_of(&mut self, kind: SubsystemKind) {
        for observer in self.context.observers_of(kind) {
            let links = self.context.links_for(observer);
            self.send_if_running(observer, SubsystemCommand::Rebind(links));
        }
    }

    /// Fire-and-forget; failures are logged, never returned.
    fn send_if_running(&self, kind: SubsystemKind, command: SubsystemCommand) {
        let handle = self.context.handle(kind);
        if !handle.is_running() {
            return;
        }
        if let Err(e) = handle.send(command) {
            warn!(subsystem = %kind, "Command not delivered: {}", e);
        }
    }

    fn open_view(&mut self, view: ViewKind) {
        if self.context.open_view(view) {
            self.operator.open_view(view);
        }
    }

    fn close_view(&mut self, view: ViewKind) {
        if self.context.close_view(view) {
            self.operator.close_view(view);
        }
    }

    /// Forward an operator intent to its subsystem.
    ///
    /// `SetDetection` is stored even while Vision is stopped and applies at
    /// the next start. `MarkCenter` records the reference center.
    ///
    /// # Errors
    ///
    /// `NotRunning` if the target is stopped, `SubsystemUnavailable` if the
    /// command could not be queued.
    pub fn control(&mut self, command: ControlCommand) -> RigResult<()> {
        self.ensure_live()?;
        let target = command.target();

        if let ControlCommand::SetDetection(params) = &command {
            params.validate()?;
            self.detection = *params;
            if !self.context.is_running(target) {
                return Ok(());
            }
        }

        self.context
            .handle(target)
            .send(command.to_subsystem_command())?;

        if command == ControlCommand::MarkCenter {
            self.context.set_center_marked(true);
            info!("Reference center marked");
        }
        Ok(())
    }

    // =========================================================================
    // Experiment and trials
    // =========================================================================

    fn reject(&mut self, violations: &[Violation]) -> RigError {
        self.pending.extend_from(violations);
        let messages = self.pending.take();
        warn!(count = messages.len(), "Request blocked by readiness checks");
        self.operator.warn(&messages);
        RigError::PreconditionViolation(messages)
    }

    fn check_readiness(&mut self, intent: Intent) -> RigResult<()> {
        let violations = validate(&ReadinessRule::DEFAULT, &self.context.readiness(), intent);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(self.reject(&violations))
        }
    }

    /// Start an experiment: validate readiness, start the trial runner, open
    /// trial 1 and release the first subject.
    ///
    /// # Errors
    ///
    /// `PreconditionViolation` with every failed readiness rule, or
    /// `AlreadyRunning` if an experiment is active.
    pub fn start_experiment(&mut self) -> RigResult<()> {
        self.ensure_live()?;
        if self.session.is_some() || self.context.is_running(SubsystemKind::Trial) {
            return Err(RigError::AlreadyRunning(SubsystemKind::Trial));
        }
        self.check_readiness(Intent::StartExperiment)?;
        self.check_dependencies(SubsystemKind::Trial)?;

        let now = self.clock.now();
        let id = experiment_id(now);
        let exp_dir = self.settings.application.output_dir.join(&id);
        self.launch(
            SubsystemKind::Trial,
            SubsystemConfig::Trial {
                experiment: id.clone(),
                output_dir: exp_dir.clone(),
            },
        )?;

        info!(experiment = %id, "Experiment started");
        self.session = Some(TrialSession::begin(id, exp_dir, now));
        self.liveness.reset_escalation();
        self.polls.arm(PollKind::Liveness);
        self.release_subject();
        Ok(())
    }

    /// Stop the experiment: graceful trial stop, then teardown. Vision, Stage,
    /// Dispenser and Optogenetics keep running. No-op without an experiment,
    /// also after shutdown.
    pub fn stop_experiment(&mut self) -> RigResult<()> {
        self.end_experiment();
        Ok(())
    }

    fn end_experiment(&mut self) {
        if self.session.is_none() && !self.context.is_running(SubsystemKind::Trial) {
            return;
        }
        self.end_trial();
        self.halt_subsystem(SubsystemKind::Trial);
        if let Some(session) = self.session.take() {
            info!(
                experiment = session.experiment_id(),
                trials = session.trial_number(),
                "Experiment stopped"
            );
        }
    }

    /// Begin the next trial of the active experiment.
    ///
    /// # Errors
    ///
    /// `NoActiveExperiment` without a session.
    pub fn start_trial(&mut self) -> RigResult<()> {
        self.ensure_live()?;
        let now = self.clock.now();
        let session = self.session.as_mut().ok_or(RigError::NoActiveExperiment)?;
        session.begin_trial(now);
        info!(trial = session.trial_number(), "Trial started");

        self.send_if_running(SubsystemKind::Trial, SubsystemCommand::BeginTrial);
        self.release_subject();
        self.liveness.reset_escalation();
        Ok(())
    }

    /// End the current trial without stopping the experiment.
    ///
    /// # Errors
    ///
    /// `NoActiveExperiment` without a session.
    pub fn stop_trial(&mut self) -> RigResult<()> {
        self.ensure_live()?;
        if self.session.is_none() {
            return Err(RigError::NoActiveExperiment);
        }
        self.end_trial();
        Ok(())
    }

    /// Graceful trial stop: reset the dispenser and re-center the stage.
    fn end_trial(&mut self) {
        let now = self.clock.now();
        if let Some(session) = self.session.as_mut() {
            session.end_trial(now, STATE_RESET);
            info!(trial = session.trial_number(), "Trial stopped");
        }
        self.send_if_running(SubsystemKind::Trial, SubsystemCommand::EndTrial);
        self.send_if_running(
            SubsystemKind::Dispenser,
            SubsystemCommand::SetState(STATE_RESET.to_string()),
        );
        self.send_if_running(SubsystemKind::Stage, SubsystemCommand::MoveToCenter);
    }

    fn release_subject(&self) {
        if self.context.is_running(SubsystemKind::Dispenser) {
            info!("Releasing subject");
            self.send_if_running(SubsystemKind::Dispenser, SubsystemCommand::Release);
        }
    }

    /// Open the subject-position plotter after the readiness checks.
    pub fn open_plotter(&mut self) -> RigResult<()> {
        self.ensure_live()?;
        self.check_readiness(Intent::StartPlotter)?;
        self.open_view(ViewKind::Plotter);
        Ok(())
    }

    /// Close the plotter. No-op when it is not open.
    pub fn close_plotter(&mut self) -> RigResult<()> {
        self.close_view(ViewKind::Plotter);
        Ok(())
    }

    /// Write `metadata.txt` into the active experiment's directory.
    ///
    /// # Errors
    ///
    /// `NoActiveExperiment` without a session, `Io` / `Serialization` on write failure.
    pub fn save_metadata(&self, metadata: &ExperimentMetadata) -> RigResult<PathBuf> {
        self.ensure_live()?;
        let session = self.session.as_ref().ok_or(RigError::NoActiveExperiment)?;
        metadata.save(session.exp_dir())
    }

    // =========================================================================
    // Tick
    // =========================================================================

    /// One supervisor tick: fold in the trial runner's status, run the
    /// liveness check, then sample the status frame.
    pub fn tick(&mut self) {
        if self.shutdown_flag {
            return;
        }
        let now = self.clock.now();
        self.sync_session(now);

        if self.polls.record(PollKind::Liveness) {
            let idle = self.session.as_ref().and_then(|s| s.idle(now));
            let verdict = self.liveness.check(idle);
            if verdict.release {
                self.release_subject();
            }
            if verdict.shutdown {
                warn!("Liveness failsafe triggered, shutting down the rig");
                self.shutdown();
                return;
            }
        }

        if self.polls.record(PollKind::StatusFacade) {
            for poll in PollKind::DISPLAY {
                self.polls.record(poll);
            }
            self.publish_status(now);
        }
    }

    fn sync_session(&mut self, now: chrono::DateTime<chrono::Utc>) {
        let Some(status) = self
            .context
            .status(SubsystemKind::Trial)
            .and_then(StatusSnapshot::into_trial)
        else {
            return;
        };
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if let SessionUpdate::NewTrial(number) = session.absorb(&status, now) {
            info!(trial = number, "Subject detected, new trial");
            self.liveness.reset_escalation();
        }
    }

    fn publish_status(&self, now: chrono::DateTime<chrono::Utc>) {
        let frame = StatusFrame::sample(&self.context, self.session.as_ref(), &self.polls, now);
        self.status_tx.send_replace(frame);
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    /// Total teardown. Idempotent and safe from any state.
    pub fn shutdown(&mut self) {
        if self.shutdown_flag {
            return;
        }
        info!("Shutting down rig...");
        self.shutdown_flag = true;

        self.polls.cancel_all();
        self.liveness.disarm();

        self.close_view(ViewKind::Dispenser);
        self.close_view(ViewKind::Plotter);

        self.halt_subsystem(SubsystemKind::Optogenetics);

        self.close_view(ViewKind::Camera);
        self.halt_subsystem(SubsystemKind::Vision);

        self.halt_subsystem(SubsystemKind::Stage);

        self.end_experiment();

        self.halt_subsystem(SubsystemKind::Dispenser);
        self.halt_subsystem(SubsystemKind::Stimulus);

        self.publish_status(self.clock.now());
        info!("Rig shutdown complete");
    }

    // =========================================================================
    // Actor
    // =========================================================================

    /// Run the actor loop until shutdown or until every handle is dropped.
    pub async fn run(mut self, mut command_rx: mpsc::Receiver<RigCommand>) {
        info!("RigSupervisor started");
        let mut ticker = tokio::time::interval(self.settings.supervisor.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while !self.shutdown_flag {
            tokio::select! {
                command = command_rx.recv() => {
                    match command {
                        Some(command) => self.handle_command(command).await,
                        None => {
                            info!("All rig handles dropped");
                            self.shutdown();
                        }
                    }
                }
                _ = ticker.tick() => self.tick(),
            }
        }

        info!("RigSupervisor stopped");
    }

    async fn handle_command(&mut self, command: RigCommand) {
        match command {
            RigCommand::StartSubsystem { kind, response } => {
                let result = self.start_subsystem(kind).await;
                let _ = response.send(result);
            }
            RigCommand::StopSubsystem { kind, response } => {
                let _ = response.send(self.stop_subsystem(kind));
            }
            RigCommand::Control { command, response } => {
                let _ = response.send(self.control(command));
            }
            RigCommand::StartExperiment { response } => {
                let _ = response.send(self.start_experiment());
            }
            RigCommand::StopExperiment { response } => {
                let _ = response.send(self.stop_experiment());
            }
            RigCommand::StartTrial { response } => {
                let _ = response.send(self.start_trial());
            }
            RigCommand::StopTrial { response } => {
                let _ = response.send(self.stop_trial());
            }
            RigCommand::OpenPlotter { response } => {
                let _ = response.send(self.open_plotter());
            }
            RigCommand::ClosePlotter { response } => {
                let _ = response.send(self.close_plotter());
            }
            RigCommand::SaveMetadata { metadata, response } => {
                let _ = response.send(self.save_metadata(&metadata));
            }
            RigCommand::GetSession { response } => {
                let _ = response.send(self.session.clone());
            }
            RigCommand::GetStates { response } => {
                let _ = response.send(self.context.states());
            }
            RigCommand::Shutdown { response } => {
                info!("Shutdown command received");
                self.shutdown();
                let _ = response.send(());
            }
        }
    }

    /// Spawn the actor and return a client for it.
    pub fn spawn(self) -> (RigHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(self.settings.supervisor.command_capacity);
        let handle = RigHandle::new(command_tx, self.status_tx.subscribe());
        let task = tokio::spawn(self.run(command_rx));
        (handle, task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::operator::ScriptedOperator;
    use std::time::Duration;
    use tracing_test::traced_test;

    fn supervisor(answer: bool) -> (RigSupervisor, Arc<ScriptedOperator>) {
        let mut settings = Settings::default();
        settings.workers.status_interval = Duration::from_millis(5);
        let operator = Arc::new(ScriptedOperator::new(answer));
        let supervisor = RigSupervisor::new(
            Arc::new(settings),
            Arc::new(DriverRegistry::with_mock_drivers()),
            operator.clone(),
            Arc::new(ManualClock::default()),
        )
        .unwrap();
        (supervisor, operator)
    }

    #[tokio::test]
    async fn test_stage_prompt_only_after_checks() {
        let (mut rig, operator) = supervisor(true);
        rig.start_subsystem(SubsystemKind::Stage).await.unwrap();
        assert_eq!(operator.prompt_count(), 1);

        let err = rig.start_subsystem(SubsystemKind::Stage).await.unwrap_err();
        assert!(matches!(err, RigError::AlreadyRunning(SubsystemKind::Stage)));
        assert_eq!(operator.prompt_count(), 1);
    }

    #[tokio::test]
    async fn test_experiment_blocked_lists_all_violations() {
        let (mut rig, operator) = supervisor(false);
        let err = rig.start_experiment().unwrap_err();
        let messages = match err {
            RigError::PreconditionViolation(messages) => messages,
            other => panic!("expected precondition violation, got {other:?}"),
        };
        assert_eq!(messages.len(), 3);
        assert_eq!(operator.warnings(), vec![messages]);
        assert!(rig.session().is_none());
        assert!(!rig.context().is_running(SubsystemKind::Trial));
    }

    #[tokio::test]
    async fn test_detection_kept_while_vision_stopped() {
        let (mut rig, _) = supervisor(false);
        let mut params = DetectionParams::default();
        params.threshold = 120;
        rig.control(ControlCommand::SetDetection(params)).unwrap();
        assert_eq!(rig.detection().threshold, 120);

        assert!(matches!(
            rig.control(ControlCommand::Release),
            Err(RigError::NotRunning(SubsystemKind::Dispenser))
        ));
    }

    #[tokio::test]
    async fn test_stage_stop_clears_center_mark() {
        let (mut rig, _) = supervisor(false);
        rig.start_subsystem(SubsystemKind::Stage).await.unwrap();
        rig.control(ControlCommand::MarkCenter).unwrap();
        assert!(rig.context().center_marked());
        rig.stop_subsystem(SubsystemKind::Stage).unwrap();
        assert!(!rig.context().center_marked());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_halted_after_shutdown() {
        let (mut rig, _) = supervisor(false);
        rig.start_subsystem(SubsystemKind::Vision).await.unwrap();
        rig.shutdown();
        rig.shutdown();
        assert!(rig.is_halted());
        assert!(rig.polls().armed().is_empty());
        assert!(matches!(
            rig.start_subsystem(SubsystemKind::Vision).await,
            Err(RigError::Halted)
        ));
        assert!(logs_contain("Rig shutdown complete"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_stalled_trial_trips_failsafe() {
        let clock = ManualClock::default();
        let mut settings = Settings::default();
        settings.workers.status_interval = Duration::from_millis(5);
        let mut rig = RigSupervisor::new(
            Arc::new(settings),
            Arc::new(DriverRegistry::with_mock_drivers()),
            Arc::new(ScriptedOperator::new(false)),
            Arc::new(clock.clone()),
        )
        .unwrap();
        rig.start_subsystem(SubsystemKind::Vision).await.unwrap();
        rig.start_subsystem(SubsystemKind::Stage).await.unwrap();
        rig.control(ControlCommand::MarkCenter).unwrap();
        rig.start_experiment().unwrap();
        rig.stop_trial().unwrap();

        clock.advance(Duration::from_secs(7201));
        rig.tick();

        assert!(rig.is_halted());
        assert!(rig.session().is_none());
        assert!(!rig.liveness().is_armed());
        assert!(logs_contain("failsafe"));

        // Stops stay harmless on a halted rig.
        assert!(rig.stop_subsystem(SubsystemKind::Optogenetics).is_ok());
        assert!(rig.stop_subsystem(SubsystemKind::Stage).is_ok());
        assert!(rig.stop_experiment().is_ok());
        assert!(rig.close_plotter().is_ok());
        assert!(matches!(rig.start_experiment(), Err(RigError::Halted)));
    }

    #[test]
    fn test_invalid_worker_settings_rejected() {
        let mut settings = Settings::default();
        settings.workers.command_capacity = 0;
        let result = RigSupervisor::new(
            Arc::new(settings),
            Arc::new(DriverRegistry::with_mock_drivers()),
            Arc::new(ScriptedOperator::new(false)),
            Arc::new(ManualClock::default()),
        );
        assert!(matches!(result, Err(RigError::ConfigValidation(_))));
    }
}
