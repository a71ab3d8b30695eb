//! Everything the coordinator owns about the rig's hardware.
//!
//! One [`SubsystemHandle`] per subsystem, the operator's reference-center mark
//! and the set of open views. Owned by the supervisor and lent to the
//! components that need it.

use crate::core::{LifecycleState, StatusSnapshot, SubsystemKind};
use crate::operator::ViewKind;
use crate::subsystem::{DependencyLinks, SubsystemHandle};
use crate::validation::ReadinessContext;
use std::collections::{BTreeMap, BTreeSet};

/// Subsystem handles plus operator-side rig state.
#[derive(Debug)]
pub struct RigContext {
    vision: SubsystemHandle,
    stage: SubsystemHandle,
    dispenser: SubsystemHandle,
    opto: SubsystemHandle,
    stimulus: SubsystemHandle,
    trial: SubsystemHandle,
    center_marked: bool,
    views: BTreeSet<ViewKind>,
}

impl Default for RigContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RigContext {
    /// All subsystems Stopped, no center marked, no views open.
    pub fn new() -> Self {
        Self {
            vision: SubsystemHandle::new(SubsystemKind::Vision),
            stage: SubsystemHandle::new(SubsystemKind::Stage),
            dispenser: SubsystemHandle::new(SubsystemKind::Dispenser),
            opto: SubsystemHandle::new(SubsystemKind::Optogenetics),
            stimulus: SubsystemHandle::new(SubsystemKind::Stimulus),
            trial: SubsystemHandle::new(SubsystemKind::Trial),
            center_marked: false,
            views: BTreeSet::new(),
        }
    }

    /// Handle for `kind`.
    pub fn handle(&self, kind: SubsystemKind) -> &SubsystemHandle {
        match kind {
            SubsystemKind::Vision => &self.vision,
            SubsystemKind::Stage => &self.stage,
            SubsystemKind::Dispenser => &self.dispenser,
            SubsystemKind::Optogenetics => &self.opto,
            SubsystemKind::Stimulus => &self.stimulus,
            SubsystemKind::Trial => &self.trial,
        }
    }

    /// Mutable handle for `kind`.
    pub fn handle_mut(&mut self, kind: SubsystemKind) -> &mut SubsystemHandle {
        match kind {
            SubsystemKind::Vision => &mut self.vision,
            SubsystemKind::Stage => &mut self.stage,
            SubsystemKind::Dispenser => &mut self.dispenser,
            SubsystemKind::Optogenetics => &mut self.opto,
            SubsystemKind::Stimulus => &mut self.stimulus,
            SubsystemKind::Trial => &mut self.trial,
        }
    }

    /// Lifecycle state of `kind`.
    pub fn state(&self, kind: SubsystemKind) -> LifecycleState {
        self.handle(kind).state()
    }

    /// Whether `kind` is Running.
    pub fn is_running(&self, kind: SubsystemKind) -> bool {
        self.handle(kind).is_running()
    }

    /// Lifecycle state of every subsystem.
    pub fn states(&self) -> BTreeMap<SubsystemKind, LifecycleState> {
        SubsystemKind::ALL
            .into_iter()
            .map(|kind| (kind, self.state(kind)))
            .collect()
    }

    /// Latest snapshot of `kind`, `None` if unavailable.
    pub fn status(&self, kind: SubsystemKind) -> Option<StatusSnapshot> {
        self.handle(kind).status()
    }

    /// Fresh links from `kind` to every subsystem it observes.
    pub fn links_for(&self, kind: SubsystemKind) -> DependencyLinks {
        let mut links = DependencyLinks::none();
        for &observed in kind.observes() {
            links.insert(observed, self.handle(observed).link());
        }
        links
    }

    /// Running subsystems that observe `kind`.
    pub fn observers_of(&self, kind: SubsystemKind) -> Vec<SubsystemKind> {
        SubsystemKind::ALL
            .into_iter()
            .filter(|other| other.observes().contains(&kind) && self.is_running(*other))
            .collect()
    }

    /// Whether the operator marked a reference center since the stage started.
    pub fn center_marked(&self) -> bool {
        self.center_marked
    }

    /// Set or clear the center mark.
    pub fn set_center_marked(&mut self, marked: bool) {
        self.center_marked = marked;
    }

    /// Whether `view` is open.
    pub fn is_view_open(&self, view: ViewKind) -> bool {
        self.views.contains(&view)
    }

    /// Record `view` as open. Returns false if it already was.
    pub fn open_view(&mut self, view: ViewKind) -> bool {
        self.views.insert(view)
    }

    /// Record `view` as closed. Returns false if it was not open.
    pub fn close_view(&mut self, view: ViewKind) -> bool {
        self.views.remove(&view)
    }

    /// Facts for the readiness rules.
    pub fn readiness(&self) -> ReadinessContext {
        let stage_initialized = self
            .status(SubsystemKind::Stage)
            .and_then(StatusSnapshot::into_stage)
            .is_some_and(|stage| stage.initialized);
        ReadinessContext {
            vision_running: self.is_running(SubsystemKind::Vision),
            stage_running: self.is_running(SubsystemKind::Stage),
            stage_initialized,
            center_marked: self.center_marked,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_context_is_cold() {
        let ctx = RigContext::new();
        for kind in SubsystemKind::ALL {
            assert_eq!(ctx.state(kind), LifecycleState::Stopped);
            assert!(ctx.status(kind).is_none());
        }
        assert_eq!(ctx.readiness(), ReadinessContext::default());
        assert!(ctx.observers_of(SubsystemKind::Vision).is_empty());
    }

    #[test]
    fn test_links_cover_observed_subsystems() {
        let ctx = RigContext::new();
        let links = ctx.links_for(SubsystemKind::Optogenetics);
        let kinds: Vec<_> = links.kinds().collect();
        assert_eq!(
            kinds,
            vec![SubsystemKind::Vision, SubsystemKind::Stage, SubsystemKind::Trial]
        );
        assert!(!links.is_attached(SubsystemKind::Stage));
    }

    #[test]
    fn test_views() {
        let mut ctx = RigContext::new();
        assert!(ctx.open_view(ViewKind::Camera));
        assert!(!ctx.open_view(ViewKind::Camera));
        assert!(ctx.is_view_open(ViewKind::Camera));
        assert!(ctx.close_view(ViewKind::Camera));
        assert!(!ctx.close_view(ViewKind::Camera));
    }
}
