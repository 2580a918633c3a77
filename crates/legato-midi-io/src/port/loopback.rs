//! In-memory driver: whatever is sent to an output port is delivered to the
//! listeners of the input port with the same name.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;

use super::{Driver, InputListener, ListenerId, MidiIn, MidiOut, PortInfo, PortType};
use crate::error::{Error, Result};

struct LoopbackPort {
    input: PortInfo,
    output: PortInfo,
    listeners: Mutex<Vec<(ListenerId, InputListener)>>,
    next_listener: AtomicU64,
}

impl LoopbackPort {
    fn deliver(&self, bytes: &[u8], timestamp: Duration) {
        let mut listeners = self.listeners.lock();
        for (_, listener) in listeners.iter_mut() {
            listener(bytes, timestamp);
        }
    }
}

struct LoopbackInput(Arc<LoopbackPort>);

impl MidiIn for LoopbackInput {
    fn info(&self) -> &PortInfo {
        &self.0.input
    }

    fn listen(&self, listener: InputListener) -> Result<ListenerId> {
        let id = ListenerId(self.0.next_listener.fetch_add(1, Ordering::Relaxed));
        self.0.listeners.lock().push((id, listener));
        tracing::trace!(port = %self.0.input.name, ?id, "listener added");
        Ok(id)
    }

    fn unlisten(&self, id: ListenerId) -> bool {
        let mut listeners = self.0.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(l, _)| *l != id);
        listeners.len() != before
    }
}

struct LoopbackOutput(Arc<LoopbackPort>);

impl MidiOut for LoopbackOutput {
    fn info(&self) -> &PortInfo {
        &self.0.output
    }

    fn send(&self, bytes: &[u8], timestamp: Duration) -> Result<()> {
        self.0.deliver(bytes, timestamp);
        Ok(())
    }
}

pub struct LoopbackDriver {
    name: String,
    ports: DashMap<String, Arc<LoopbackPort>>,
    next_index: AtomicUsize,
}

impl LoopbackDriver {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ports: DashMap::new(),
            next_index: AtomicUsize::new(0),
        }
    }

    /// Create a connected input/output pair. Returns the port index; an
    /// existing port of that name is reused.
    pub fn create_port(&self, name: impl Into<String>) -> usize {
        let name = name.into();
        let port = self.ports.entry(name.clone()).or_insert_with(|| {
            let index = self.next_index.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Created loopback MIDI port {}: {}", index, name);
            Arc::new(LoopbackPort {
                input: PortInfo {
                    index,
                    name: name.clone(),
                    port_type: PortType::Input,
                },
                output: PortInfo {
                    index,
                    name: name.clone(),
                    port_type: PortType::Output,
                },
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(0),
            })
        });
        port.input.index
    }

    fn port(&self, name: &str) -> Result<Arc<LoopbackPort>> {
        self.ports
            .get(name)
            .map(|p| Arc::clone(p.value()))
            .ok_or_else(|| Error::MidiPort(format!("no port named {:?} on {}", name, self.name)))
    }

    fn list(&self, pick: impl Fn(&LoopbackPort) -> &PortInfo) -> Vec<PortInfo> {
        let mut infos: Vec<_> = self.ports.iter().map(|p| pick(p.value()).clone()).collect();
        infos.sort_by_key(|info| info.index);
        infos
    }
}

impl Driver for LoopbackDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn inputs(&self) -> Vec<PortInfo> {
        self.list(|p| &p.input)
    }

    fn outputs(&self) -> Vec<PortInfo> {
        self.list(|p| &p.output)
    }

    fn open_input(&self, name: &str) -> Result<Arc<dyn MidiIn>> {
        Ok(Arc::new(LoopbackInput(self.port(name)?)))
    }

    fn open_output(&self, name: &str) -> Result<Arc<dyn MidiOut>> {
        Ok(Arc::new(LoopbackOutput(self.port(name)?)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_reaches_input_listeners() {
        let driver = LoopbackDriver::new("loop");
        assert_eq!(driver.create_port("a"), 0);
        assert_eq!(driver.create_port("b"), 1);
        assert_eq!(driver.create_port("a"), 0);

        let received = Arc::new(Mutex::new(Vec::new()));
        let input = driver.open_input("a").unwrap();
        let id = {
            let received = Arc::clone(&received);
            input
                .listen(Box::new(move |bytes, ts| {
                    received.lock().push((bytes.to_vec(), ts))
                }))
                .unwrap()
        };

        let out = driver.open_output("a").unwrap();
        out.send(&[0x90, 60, 100], Duration::from_millis(5)).unwrap();
        driver
            .open_output("b")
            .unwrap()
            .send(&[0xF8], Duration::ZERO)
            .unwrap();
        assert_eq!(
            *received.lock(),
            vec![(vec![0x90, 60, 100], Duration::from_millis(5))]
        );

        assert!(input.unlisten(id));
        assert!(!input.unlisten(id));
        out.send(&[0xF8], Duration::ZERO).unwrap();
        assert_eq!(received.lock().len(), 1);
    }

    #[test]
    fn test_port_listing() {
        let driver = LoopbackDriver::new("loop");
        driver.create_port("x");
        driver.create_port("y");
        let names: Vec<_> = driver.inputs().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["x", "y"]);
        assert!(driver.outputs().iter().all(|p| p.port_type == PortType::Output));
        assert!(matches!(driver.open_input("z"), Err(Error::MidiPort(_))));
    }
}
