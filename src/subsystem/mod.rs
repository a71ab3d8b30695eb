//! Subsystem proxies, links and the driver registry.
//!
//! Drivers are external collaborators. The coordinator only knows how to
//! create one for a given [`SubsystemKind`] (through [`DriverRegistry`]) and
//! how to run it behind a [`SubsystemHandle`].

pub mod link;
pub mod mock;
pub mod proxy;

pub use link::{DependencyLinks, SubsystemLink};
pub use proxy::SubsystemHandle;

use crate::core::{SubsystemDriver, SubsystemKind};
use std::collections::HashMap;

type DriverFactory = Box<dyn Fn() -> Box<dyn SubsystemDriver> + Send + Sync>;

/// Maps each subsystem to a factory producing a fresh driver per start.
#[derive(Default)]
pub struct DriverRegistry {
    factories: HashMap<SubsystemKind, DriverFactory>,
}

impl DriverRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry populated with the simulated drivers from [`mock`].
    pub fn with_mock_drivers() -> Self {
        let mut registry = Self::new();
        registry.register(SubsystemKind::Vision, || Box::new(mock::MockVision::new()));
        registry.register(SubsystemKind::Stage, || Box::new(mock::MockStage::new()));
        registry.register(SubsystemKind::Dispenser, || {
            Box::new(mock::MockDispenser::new())
        });
        registry.register(SubsystemKind::Optogenetics, || {
            Box::new(mock::MockOpto::new())
        });
        registry.register(SubsystemKind::Stimulus, || {
            Box::new(mock::MockStimulus::new())
        });
        registry.register(SubsystemKind::Trial, || Box::new(mock::MockTrial::new()));
        registry
    }

    /// Register (or replace) the factory for `kind`.
    pub fn register<F>(&mut self, kind: SubsystemKind, factory: F)
    where
        F: Fn() -> Box<dyn SubsystemDriver> + Send + Sync + 'static,
    {
        self.factories.insert(kind, Box::new(factory));
    }

    /// Build a new driver for `kind`, if one is registered.
    pub fn create(&self, kind: SubsystemKind) -> Option<Box<dyn SubsystemDriver>> {
        self.factories.get(&kind).map(|factory| factory())
    }

    /// Whether a factory exists for `kind`.
    pub fn contains(&self, kind: SubsystemKind) -> bool {
        self.factories.contains_key(&kind)
    }
}
