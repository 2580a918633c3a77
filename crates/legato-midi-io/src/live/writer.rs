use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use legato_midi::{Framing, Message};

use crate::error::Result;
use crate::port::{MidiOut, PortInfo};
use crate::writer::{MessageWriter, WriterConfig};

/// Encodes messages for the wire and sends them to an output port.
pub struct LiveWriter {
    port: Arc<dyn MidiOut>,
    writer: MessageWriter,
    buf: Vec<u8>,
}

impl fmt::Debug for LiveWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveWriter")
            .field("port", &self.port.info().name)
            .field("writer", &self.writer)
            .finish()
    }
}

impl LiveWriter {
    pub fn new(port: Arc<dyn MidiOut>, config: WriterConfig) -> Self {
        Self {
            port,
            writer: MessageWriter::new(config, Framing::Wire),
            buf: Vec::with_capacity(16),
        }
    }

    pub fn port(&self) -> &PortInfo {
        self.port.info()
    }

    pub fn uses_running_status(&self) -> bool {
        self.writer.uses_running_status()
    }

    pub fn reset_running_status(&mut self) {
        self.writer.reset_running_status();
    }

    /// Send one message stamped with `timestamp`.
    pub fn write(&mut self, msg: impl Into<Message>, timestamp: Duration) -> Result<()> {
        let msg = msg.into();
        self.buf.clear();
        self.writer.encode(&msg, &mut self.buf)?;
        self.flush(timestamp)
    }

    /// Encode several messages into one packet.
    pub fn write_all<I>(&mut self, msgs: I, timestamp: Duration) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Into<Message>,
    {
        self.buf.clear();
        for msg in msgs {
            if let Err(e) = self.writer.encode(&msg.into(), &mut self.buf) {
                self.writer.reset_running_status();
                return Err(e);
            }
        }
        self.flush(timestamp)
    }

    fn flush(&mut self, timestamp: Duration) -> Result<()> {
        if let Err(e) = self.port.send(&self.buf, timestamp) {
            // the receiver may not have seen the last status byte
            self.writer.reset_running_status();
            return Err(e);
        }
        Ok(())
    }
}
