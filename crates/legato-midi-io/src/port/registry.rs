use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

use super::{Driver, MidiIn, MidiOut};
use crate::error::{Error, Result};

/// Named drivers available to an application.
///
/// Cloning shares the same registry.
#[derive(Clone, Default)]
pub struct DriverRegistry {
    drivers: Arc<DashMap<String, Arc<dyn Driver>>>,
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("drivers", &self.names())
            .finish()
    }
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `driver` under its own name, returning the driver it replaced.
    pub fn register(&self, driver: Arc<dyn Driver>) -> Option<Arc<dyn Driver>> {
        let name = driver.name().to_string();
        tracing::debug!(driver = %name, "registered MIDI driver");
        self.drivers.insert(name, driver)
    }

    pub fn unregister(&self, name: &str) -> Option<Arc<dyn Driver>> {
        self.drivers.remove(name).map(|(_, driver)| driver)
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Driver>> {
        self.drivers
            .get(name)
            .map(|d| Arc::clone(d.value()))
            .ok_or_else(|| Error::MidiDevice(format!("no driver named {:?}", name)))
    }

    /// Registered driver names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.drivers.iter().map(|d| d.key().clone()).collect();
        names.sort();
        names
    }

    pub fn open_input(&self, driver: &str, port: &str) -> Result<Arc<dyn MidiIn>> {
        self.get(driver)?.open_input(port)
    }

    pub fn open_output(&self, driver: &str, port: &str) -> Result<Arc<dyn MidiOut>> {
        self.get(driver)?.open_output(port)
    }
}
