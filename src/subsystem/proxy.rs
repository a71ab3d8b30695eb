//! Uniform handle over one subsystem worker.
//!
//! `SubsystemHandle::start` spawns a worker task that owns the driver, applies
//! queued commands and publishes a status snapshot at a fixed interval. The
//! coordinator never awaits the worker: commands are `try_send`, stop sends
//! `Shutdown` and forgets the task, and status reads only look at the last
//! published value.
//!
//! Safe-state commands (`LightOff`, `Shutdown`) travel on a small control
//! queue of their own that the worker drains first, so a backlog of ordinary
//! commands can never keep the driver from reaching a safe state and
//! disconnecting.

use super::link::{DependencyLinks, SubsystemLink};
use crate::config::WorkerConfig;
use crate::core::{
    LifecycleState, StatusSnapshot, SubsystemCommand, SubsystemConfig, SubsystemDriver,
    SubsystemKind,
};
use crate::error::{RigError, RigResult};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn};

/// Slots on the control queue. Only safe-state commands and `Shutdown` use it.
const CONTROL_CAPACITY: usize = 4;

struct Worker {
    task: JoinHandle<()>,
    command_tx: mpsc::Sender<SubsystemCommand>,
    control_tx: mpsc::Sender<SubsystemCommand>,
    status_rx: watch::Receiver<Option<StatusSnapshot>>,
}

/// The coordinator's exclusive handle on one subsystem.
pub struct SubsystemHandle {
    kind: SubsystemKind,
    worker: Option<Worker>,
}

impl SubsystemHandle {
    /// A Stopped handle.
    pub fn new(kind: SubsystemKind) -> Self {
        Self { kind, worker: None }
    }

    /// Subsystem this handle controls.
    pub fn kind(&self) -> SubsystemKind {
        self.kind
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        if self.worker.is_some() {
            LifecycleState::Running
        } else {
            LifecycleState::Stopped
        }
    }

    /// Shorthand for `state() == Running`.
    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Spawn a worker for `driver`.
    ///
    /// Returns as soon as the task is spawned; connection happens inside the
    /// worker, and a failed connection shows up as an unavailable status.
    ///
    /// # Errors
    ///
    /// `AlreadyRunning` if the handle is Running, `ConfigValidation` for a
    /// zero queue capacity or status interval. The handle is left untouched.
    pub fn start(
        &mut self,
        driver: Box<dyn SubsystemDriver>,
        config: SubsystemConfig,
        links: DependencyLinks,
        options: &WorkerConfig,
    ) -> RigResult<()> {
        if self.worker.is_some() {
            return Err(RigError::AlreadyRunning(self.kind));
        }
        debug_assert_eq!(driver.kind(), self.kind);
        debug_assert_eq!(config.kind(), self.kind);
        if options.command_capacity == 0 || options.status_interval.is_zero() {
            return Err(RigError::ConfigValidation(format!(
                "{} worker needs a non-zero command_capacity and status_interval",
                self.kind
            )));
        }

        let (command_tx, command_rx) = mpsc::channel(options.command_capacity);
        let (control_tx, control_rx) = mpsc::channel(CONTROL_CAPACITY);
        let (status_tx, status_rx) = watch::channel(None);
        let task = tokio::spawn(run_worker(
            self.kind,
            driver,
            config,
            links,
            command_rx,
            control_rx,
            status_tx,
            options.status_interval,
        ));

        info!(subsystem = %self.kind, "Subsystem started");
        self.worker = Some(Worker {
            task,
            command_tx,
            control_tx,
            status_rx,
        });
        Ok(())
    }

    /// Ask the worker to stop and release the handle.
    ///
    /// Idempotent: stopping a Stopped handle does nothing. The worker is not
    /// joined; it finishes disconnecting on its own.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        info!(subsystem = %self.kind, "Sending shutdown command to subsystem");
        if let Err(e) = worker.control_tx.try_send(SubsystemCommand::Shutdown) {
            error!(
                subsystem = %self.kind,
                "Failed to send shutdown command: {}. Aborting worker; the driver will not disconnect and may be left active.",
                e
            );
            worker.task.abort();
        }
    }

    /// Latest published snapshot, or `None` when Stopped, still connecting,
    /// faulted, or the worker has exited.
    pub fn status(&self) -> Option<StatusSnapshot> {
        let worker = self.worker.as_ref()?;
        worker.status_rx.has_changed().ok()?;
        let snapshot = worker.status_rx.borrow().clone();
        snapshot
    }

    /// Queue a command without waiting for it to be applied.
    ///
    /// # Errors
    ///
    /// `NotRunning` if Stopped, `SubsystemUnavailable` if the queue is full or
    /// the worker has exited.
    pub fn send(&self, command: SubsystemCommand) -> RigResult<()> {
        let worker = self.worker.as_ref().ok_or(RigError::NotRunning(self.kind))?;
        worker.command_tx.try_send(command).map_err(|e| {
            warn!(subsystem = %self.kind, "Dropping command: {}", e);
            RigError::SubsystemUnavailable(self.kind)
        })
    }

    /// Queue a safe-state command ahead of every ordinary command.
    ///
    /// Meant for commands that must land even when the regular queue is full,
    /// such as `LightOff` before a stop.
    ///
    /// # Errors
    ///
    /// `NotRunning` if Stopped, `SubsystemUnavailable` if the control queue is
    /// full or the worker has exited.
    pub fn send_urgent(&self, command: SubsystemCommand) -> RigResult<()> {
        let worker = self.worker.as_ref().ok_or(RigError::NotRunning(self.kind))?;
        worker.control_tx.try_send(command).map_err(|e| {
            error!(subsystem = %self.kind, "Dropping safe-state command: {}", e);
            RigError::SubsystemUnavailable(self.kind)
        })
    }

    /// Non-owning link to this subsystem's snapshot. Detached when Stopped.
    pub fn link(&self) -> SubsystemLink {
        match &self.worker {
            Some(worker) => SubsystemLink::attached(worker.status_rx.clone()),
            None => SubsystemLink::detached(),
        }
    }
}

impl std::fmt::Debug for SubsystemHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubsystemHandle")
            .field("kind", &self.kind)
            .field("state", &self.state())
            .finish()
    }
}

async fn run_worker(
    kind: SubsystemKind,
    mut driver: Box<dyn SubsystemDriver>,
    config: SubsystemConfig,
    links: DependencyLinks,
    mut command_rx: mpsc::Receiver<SubsystemCommand>,
    mut control_rx: mpsc::Receiver<SubsystemCommand>,
    status_tx: watch::Sender<Option<StatusSnapshot>>,
    status_interval: Duration,
) {
    if let Err(e) = driver.connect(&config, links).await {
        warn!(subsystem = %kind, "Failed to connect: {:#}", e);
        return;
    }
    info!(subsystem = %kind, "Subsystem connected");

    let mut ticker = tokio::time::interval(status_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            command = control_rx.recv() => {
                if !apply(kind, driver.as_mut(), command).await {
                    break;
                }
            }
            _ = ticker.tick() => {
                match driver.poll().await {
                    Ok(snapshot) => {
                        status_tx.send_replace(Some(snapshot));
                    }
                    Err(e) => {
                        debug!(subsystem = %kind, "Status unavailable: {:#}", e);
                        status_tx.send_replace(None);
                    }
                }
            }
            command = command_rx.recv() => {
                if !apply(kind, driver.as_mut(), command).await {
                    break;
                }
            }
        }
    }

    status_tx.send_replace(None);
    info!(subsystem = %kind, "Subsystem disconnecting...");
    if let Err(e) = driver.disconnect().await {
        warn!(subsystem = %kind, "Failed to disconnect: {:#}", e);
    } else {
        info!(subsystem = %kind, "Subsystem disconnected successfully");
    }
}

/// Apply one queued command. Returns `false` when the worker should exit.
async fn apply(
    kind: SubsystemKind,
    driver: &mut dyn SubsystemDriver,
    command: Option<SubsystemCommand>,
) -> bool {
    match command {
        Some(SubsystemCommand::Shutdown) => {
            info!(subsystem = %kind, "Subsystem received shutdown command");
            false
        }
        Some(command) => {
            trace!(subsystem = %kind, ?command, "Applying command");
            if let Err(e) = driver.handle_command(command).await {
                warn!(subsystem = %kind, "Failed to handle command: {:#}", e);
            }
            true
        }
        None => {
            debug!(subsystem = %kind, "Command channel closed");
            false
        }
    }
}
