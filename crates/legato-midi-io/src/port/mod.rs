//! Port and driver abstraction.
//!
//! Drivers expose named input and output ports. Inputs deliver timestamped
//! byte chunks to registered listeners, usually from a driver thread;
//! outputs accept timestamped bytes. Drivers are looked up through an
//! explicit [`DriverRegistry`] owned by the application.

mod loopback;
mod registry;

pub use loopback::LoopbackDriver;
pub use registry::DriverRegistry;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortType {
    Input,
    Output,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortInfo {
    pub index: usize,
    pub name: String,
    pub port_type: PortType,
}

/// Receives raw bytes and their driver timestamp.
pub type InputListener = Box<dyn FnMut(&[u8], Duration) + Send>;

/// Handle returned by [`MidiIn::listen`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

pub trait MidiIn: Send + Sync {
    fn info(&self) -> &PortInfo;

    fn listen(&self, listener: InputListener) -> Result<ListenerId>;

    /// Drop a listener. Returns `false` if it was already gone.
    fn unlisten(&self, id: ListenerId) -> bool;
}

pub trait MidiOut: Send + Sync {
    fn info(&self) -> &PortInfo;

    fn send(&self, bytes: &[u8], timestamp: Duration) -> Result<()>;
}

pub trait Driver: Send + Sync {
    fn name(&self) -> &str;

    fn inputs(&self) -> Vec<PortInfo>;

    fn outputs(&self) -> Vec<PortInfo>;

    fn open_input(&self, name: &str) -> Result<Arc<dyn MidiIn>>;

    fn open_output(&self, name: &str) -> Result<Arc<dyn MidiOut>>;
}
