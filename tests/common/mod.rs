//! Shared harness: recording drivers and a supervisor on a manual clock.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rig_supervisor::clock::{Clock, ManualClock};
use rig_supervisor::config::Settings;
use rig_supervisor::core::{
    DispenserStatus, GateState, LedState, OptoStatus, StageStatus, StatusSnapshot,
    StimulusMode, StimulusStatus, SubsystemCommand, SubsystemConfig, SubsystemDriver,
    SubsystemKind, TrialStatus, VisionStatus,
};
use rig_supervisor::operator::ScriptedOperator;
use rig_supervisor::subsystem::{DependencyLinks, DriverRegistry};
use rig_supervisor::RigSupervisor;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Long enough for a worker on a 5ms status interval to connect, apply queued
/// commands and publish.
pub const SETTLE: Duration = Duration::from_millis(40);

pub async fn settle() {
    tokio::time::sleep(SETTLE).await;
}

/// Shared view into every driver instance created for one subsystem.
#[derive(Clone, Default)]
pub struct Tap {
    commands: Arc<Mutex<Vec<SubsystemCommand>>>,
    connects: Arc<Mutex<Vec<SubsystemConfig>>>,
    snapshot: Arc<Mutex<Option<StatusSnapshot>>>,
}

impl Tap {
    pub fn with_snapshot(snapshot: StatusSnapshot) -> Self {
        let tap = Self::default();
        tap.script(snapshot);
        tap
    }

    /// Status the driver reports from now on.
    pub fn script(&self, snapshot: StatusSnapshot) {
        *self.snapshot.lock().unwrap() = Some(snapshot);
    }

    /// Make the driver's polls fail.
    pub fn fault(&self) {
        *self.snapshot.lock().unwrap() = None;
    }

    pub fn commands(&self) -> Vec<SubsystemCommand> {
        self.commands.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&SubsystemCommand) -> bool) -> usize {
        self.commands().iter().filter(|c| pred(c)).count()
    }

    pub fn connects(&self) -> Vec<SubsystemConfig> {
        self.connects.lock().unwrap().clone()
    }
}

/// Driver that records what it is told and reports a scripted snapshot.
pub struct RecordingDriver {
    kind: SubsystemKind,
    tap: Tap,
}

#[async_trait]
impl SubsystemDriver for RecordingDriver {
    fn kind(&self) -> SubsystemKind {
        self.kind
    }

    async fn connect(&mut self, config: &SubsystemConfig, _links: DependencyLinks) -> Result<()> {
        self.tap.connects.lock().unwrap().push(config.clone());
        Ok(())
    }

    async fn handle_command(&mut self, command: SubsystemCommand) -> Result<()> {
        self.tap.commands.lock().unwrap().push(command);
        Ok(())
    }

    async fn poll(&mut self) -> Result<StatusSnapshot> {
        self.tap
            .snapshot
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| anyhow!("{} faulted", self.kind))
    }

    async fn disconnect(&mut self) -> Result<()> {
        Ok(())
    }
}

pub fn trial_status(trial_number: u32, ended_at: Option<DateTime<Utc>>) -> StatusSnapshot {
    StatusSnapshot::Trial(TrialStatus {
        experiment: "test".into(),
        trial_number,
        trial_start: Some(DateTime::<Utc>::UNIX_EPOCH),
        trial_end: ended_at,
        state: (if ended_at.is_some() { "Waiting" } else { "Running" }).to_string(),
        subject_present: ended_at.is_none(),
    })
}

pub fn stage_status(initialized: bool) -> StatusSnapshot {
    StatusSnapshot::Stage(StageStatus {
        x: 0.0,
        y: 0.0,
        initialized,
    })
}

fn default_snapshot(kind: SubsystemKind) -> StatusSnapshot {
    match kind {
        SubsystemKind::Vision => StatusSnapshot::Vision(VisionStatus::absent()),
        SubsystemKind::Stage => stage_status(false),
        SubsystemKind::Dispenser => StatusSnapshot::Dispenser(DispenserStatus {
            state: "Idle".into(),
            gate: GateState::Closed,
        }),
        SubsystemKind::Optogenetics => StatusSnapshot::Optogenetics(OptoStatus {
            led: LedState::Off,
            foraging: false,
        }),
        SubsystemKind::Stimulus => StatusSnapshot::Stimulus(StimulusStatus {
            mode: StimulusMode::SinglePerTrial,
            closed_loop_position: false,
            closed_loop_angle: false,
        }),
        SubsystemKind::Trial => trial_status(1, None),
    }
}

pub fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.workers.status_interval = Duration::from_millis(5);
    settings.supervisor.tick_interval = Duration::from_millis(10);
    settings
}

/// A supervisor wired to recording drivers.
pub struct TestRig {
    pub supervisor: RigSupervisor,
    pub clock: ManualClock,
    pub operator: Arc<ScriptedOperator>,
    taps: BTreeMap<SubsystemKind, Tap>,
}

impl TestRig {
    pub fn new(stage_homing: bool) -> Self {
        Self::with_settings(test_settings(), stage_homing)
    }

    pub fn with_settings(settings: Settings, stage_homing: bool) -> Self {
        let mut registry = DriverRegistry::new();
        let mut taps = BTreeMap::new();
        for kind in SubsystemKind::ALL {
            let tap = Tap::with_snapshot(default_snapshot(kind));
            let shared = tap.clone();
            registry.register(kind, move || {
                Box::new(RecordingDriver {
                    kind,
                    tap: shared.clone(),
                })
            });
            taps.insert(kind, tap);
        }

        let clock = ManualClock::default();
        let operator = Arc::new(ScriptedOperator::new(stage_homing));
        let supervisor = RigSupervisor::new(
            Arc::new(settings),
            Arc::new(registry),
            operator.clone(),
            Arc::new(clock.clone()),
        )
        .unwrap();
        Self {
            supervisor,
            clock,
            operator,
            taps,
        }
    }

    pub fn tap(&self, kind: SubsystemKind) -> &Tap {
        &self.taps[&kind]
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Vision and Stage running, center marked.
    pub async fn ready(&mut self) {
        self.supervisor
            .start_subsystem(SubsystemKind::Vision)
            .await
            .unwrap();
        self.supervisor
            .start_subsystem(SubsystemKind::Stage)
            .await
            .unwrap();
        self.supervisor
            .control(rig_supervisor::messages::ControlCommand::MarkCenter)
            .unwrap();
    }

    /// Every non-trial subsystem running, then an experiment started.
    pub async fn start_everything(&mut self) {
        self.ready().await;
        for kind in [
            SubsystemKind::Dispenser,
            SubsystemKind::Stimulus,
            SubsystemKind::Optogenetics,
        ] {
            self.supervisor.start_subsystem(kind).await.unwrap();
        }
        self.supervisor.start_experiment().unwrap();
        settle().await;
    }

    /// Advance the manual clock and run one tick.
    pub fn tick_after(&mut self, by: Duration) {
        self.clock.advance(by);
        self.supervisor.tick();
    }
}

pub fn is_release(command: &SubsystemCommand) -> bool {
    matches!(command, SubsystemCommand::Release)
}
