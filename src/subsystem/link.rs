//! Non-owning links between subsystems.
//!
//! A link is a read-only view of another worker's published snapshot. It never
//! keeps the other subsystem alive, and it resolves to `None` as soon as that
//! worker is gone, so holders must re-resolve on every use.

use crate::core::{
    DispenserStatus, OptoStatus, StageStatus, StatusSnapshot, StimulusStatus, SubsystemKind,
    TrialStatus, VisionStatus,
};
use std::collections::BTreeMap;
use tokio::sync::watch;

/// Read-only view of one subsystem's latest snapshot.
#[derive(Clone, Debug, Default)]
pub struct SubsystemLink {
    rx: Option<watch::Receiver<Option<StatusSnapshot>>>,
}

impl SubsystemLink {
    pub(crate) fn attached(rx: watch::Receiver<Option<StatusSnapshot>>) -> Self {
        Self { rx: Some(rx) }
    }

    /// A link to nothing.
    pub fn detached() -> Self {
        Self::default()
    }

    /// Whether the link currently points at a live worker.
    pub fn is_attached(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| rx.has_changed().is_ok())
    }

    /// Latest snapshot of the linked subsystem, or `None` if it is unavailable.
    pub fn resolve(&self) -> Option<StatusSnapshot> {
        let rx = self.rx.as_ref()?;
        // A closed channel means the worker exited; its last value is stale.
        rx.has_changed().ok()?;
        let snapshot = rx.borrow().clone();
        snapshot
    }
}

/// Links a subsystem holds to the subsystems it observes.
#[derive(Clone, Debug, Default)]
pub struct DependencyLinks {
    links: BTreeMap<SubsystemKind, SubsystemLink>,
}

impl DependencyLinks {
    /// No links at all.
    pub fn none() -> Self {
        Self::default()
    }

    /// Add or replace the link to `kind`.
    pub fn insert(&mut self, kind: SubsystemKind, link: SubsystemLink) {
        self.links.insert(kind, link);
    }

    /// Kinds this set has an entry for, attached or not.
    pub fn kinds(&self) -> impl Iterator<Item = SubsystemKind> + '_ {
        self.links.keys().copied()
    }

    /// Whether the link to `kind` points at a live worker.
    pub fn is_attached(&self, kind: SubsystemKind) -> bool {
        self.links.get(&kind).is_some_and(SubsystemLink::is_attached)
    }

    /// Latest snapshot of `kind`, if linked and available.
    pub fn resolve(&self, kind: SubsystemKind) -> Option<StatusSnapshot> {
        self.links.get(&kind)?.resolve()
    }

    /// Latest vision status, if available.
    pub fn vision(&self) -> Option<VisionStatus> {
        self.resolve(SubsystemKind::Vision)?.into_vision()
    }

    /// Latest stage status, if available.
    pub fn stage(&self) -> Option<StageStatus> {
        self.resolve(SubsystemKind::Stage)?.into_stage()
    }

    /// Latest dispenser status, if available.
    pub fn dispenser(&self) -> Option<DispenserStatus> {
        self.resolve(SubsystemKind::Dispenser)?.into_dispenser()
    }

    /// Latest optogenetics status, if available.
    pub fn opto(&self) -> Option<OptoStatus> {
        self.resolve(SubsystemKind::Optogenetics)?.into_opto()
    }

    /// Latest stimulus status, if available.
    pub fn stimulus(&self) -> Option<StimulusStatus> {
        self.resolve(SubsystemKind::Stimulus)?.into_stimulus()
    }

    /// Latest trial status, if available.
    pub fn trial(&self) -> Option<TrialStatus> {
        self.resolve(SubsystemKind::Trial)?.into_trial()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StageStatus;

    fn stage_snapshot() -> StatusSnapshot {
        StatusSnapshot::Stage(StageStatus {
            x: 1.5,
            y: -2.0,
            initialized: false,
        })
    }

    #[test]
    fn test_detached_link_resolves_to_none() {
        let link = SubsystemLink::detached();
        assert!(!link.is_attached());
        assert!(link.resolve().is_none());
    }

    #[test]
    fn test_link_follows_publisher() {
        let (tx, rx) = watch::channel(None);
        let mut links = DependencyLinks::none();
        links.insert(SubsystemKind::Stage, SubsystemLink::attached(rx));

        assert!(links.is_attached(SubsystemKind::Stage));
        assert!(links.stage().is_none());

        tx.send_replace(Some(stage_snapshot()));
        assert_eq!(links.stage().map(|s| s.x), Some(1.5));
        assert!(links.vision().is_none());
    }

    #[test]
    fn test_link_goes_stale_when_publisher_drops() {
        let (tx, rx) = watch::channel(Some(stage_snapshot()));
        let link = SubsystemLink::attached(rx);
        assert!(link.resolve().is_some());

        drop(tx);
        assert!(!link.is_attached());
        assert!(link.resolve().is_none());
    }
}
