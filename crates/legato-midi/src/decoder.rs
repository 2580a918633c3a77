//! Byte-stream decoder for live MIDI.
//!
//! Bytes are pulled lazily from any [`Read`] source, one at a time. Realtime
//! bytes are split out wherever they appear (even between the data bytes of
//! another message) and handed to the realtime handler. Everything else goes
//! through the running-status buffer and comes back as one [`Message`] per
//! call to [`ByteStreamDecoder::read_one`].

use std::fmt;
use std::io::{ErrorKind, Read};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::message::{channel_data_len, ChannelMessage, Message, Realtime, SystemCommon};
use crate::status::{Resolved, RunningStatus};
use crate::sysex::{SysExReassembler, Termination};

const SYSEX_START: u8 = 0xF0;
const SYSEX_END: u8 = 0xF7;

/// Decoder options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Keep NoteOn with velocity 0 as NoteOn instead of normalizing it to NoteOff.
    pub pedantic: bool,
}

impl DecoderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn pedantic(mut self, pedantic: bool) -> Self {
        self.pedantic = pedantic;
        self
    }
}

pub type RealtimeHandler = Box<dyn FnMut(Realtime) + Send>;

/// Outcome of reading the argument bytes of a message.
enum Args {
    Complete([u8; 2]),
    /// A status byte showed up before all arguments arrived.
    Interrupted(u8),
    End,
}

pub struct ByteStreamDecoder<R> {
    source: R,
    config: DecoderConfig,
    running_status: RunningStatus,
    sysex: SysExReassembler,
    /// Status byte pushed back to be read again as the next candidate.
    canary: Option<u8>,
    /// IO error raised while a sysex was being reassembled, reported on the next read.
    deferred_error: Option<Error>,
    realtime: Option<RealtimeHandler>,
}

impl<R> fmt::Debug for ByteStreamDecoder<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteStreamDecoder")
            .field("config", &self.config)
            .field("running_status", &self.running_status)
            .field("sysex", &self.sysex.state())
            .field("canary", &self.canary)
            .field("realtime_handler", &self.realtime.is_some())
            .finish()
    }
}

impl<R: Read> ByteStreamDecoder<R> {
    pub fn new(source: R) -> Self {
        Self::with_config(source, DecoderConfig::default())
    }

    pub fn with_config(source: R, config: DecoderConfig) -> Self {
        Self {
            source,
            config,
            running_status: RunningStatus::new(),
            sysex: SysExReassembler::new(),
            canary: None,
            deferred_error: None,
            realtime: None,
        }
    }

    /// Register the handler that receives realtime messages. Without one they are dropped.
    pub fn on_realtime(&mut self, handler: impl FnMut(Realtime) + Send + 'static) {
        self.realtime = Some(Box::new(handler));
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn running_status(&self) -> Option<u8> {
        self.running_status.get()
    }

    /// Forget running status and any half-read message.
    pub fn reset(&mut self) {
        self.running_status.clear();
        self.sysex.reset();
        self.canary = None;
    }

    pub fn get_ref(&self) -> &R {
        &self.source
    }

    pub fn into_inner(self) -> R {
        self.source
    }

    /// Iterate over decoded messages until the source ends or fails.
    pub fn messages(&mut self) -> impl Iterator<Item = Result<Message>> + '_ {
        std::iter::from_fn(move || self.read_one().transpose())
    }

    /// Decode the next message. `Ok(None)` means the source is exhausted.
    pub fn read_one(&mut self) -> Result<Option<Message>> {
        if let Some(err) = self.deferred_error.take() {
            return Err(err);
        }

        loop {
            let Some(byte) = self.next_byte()? else {
                return Ok(None);
            };

            match self.running_status.resolve(byte) {
                Resolved::Discard(data) => {
                    trace!("discarding data byte {:#04x} without running status", data);
                }
                Resolved::Realtime(rt) => self.dispatch_realtime(rt),
                Resolved::Voice { status, first_data } => {
                    let wanted = channel_data_len(status);
                    let args = match first_data {
                        Some(first) => match self.read_args(wanted - 1)? {
                            Args::Complete([second, _]) => Args::Complete([first, second]),
                            other => other,
                        },
                        None => self.read_args(wanted)?,
                    };
                    match args {
                        Args::Complete([data1, data2]) => {
                            let msg =
                                ChannelMessage::from_status(status, data1, data2, self.config.pedantic);
                            return Ok(Some(Message::Channel(msg)));
                        }
                        Args::Interrupted(next) => {
                            debug!("incomplete channel message {:#04x} interrupted", status);
                            self.canary = Some(next);
                        }
                        Args::End => return Ok(None),
                    }
                }
                Resolved::System(SYSEX_START) => return self.read_sysex(),
                Resolved::System(SYSEX_END) => {
                    // Only reachable as a stray end byte; it just cancels running status.
                    trace!("stray sysex end byte");
                }
                Resolved::System(status) => match SystemCommon::data_len(status) {
                    Some(wanted) => match self.read_args(wanted)? {
                        Args::Complete(data) => {
                            if let Some(common) = SystemCommon::from_status(status, &data[..wanted])
                            {
                                return Ok(Some(Message::Common(common)));
                            }
                        }
                        Args::Interrupted(next) => {
                            debug!("incomplete system common {:#04x} interrupted", status);
                            self.canary = Some(next);
                        }
                        Args::End => return Ok(None),
                    },
                    None => {
                        // Undefined status: its data bytes are dropped until the next status
                        // because running status is now empty.
                        debug!("discarding undefined system common status {:#04x}", status);
                    }
                },
            }
        }
    }

    fn read_sysex(&mut self) -> Result<Option<Message>> {
        self.sysex.begin();
        loop {
            match self.next_byte() {
                Ok(Some(SYSEX_END)) => {
                    return Ok(Some(Message::SysEx(self.sysex.finish(Termination::End))));
                }
                Ok(Some(byte)) if byte >= 0x80 => {
                    debug!("sysex aborted by status {:#04x}", byte);
                    self.canary = Some(byte);
                    return Ok(Some(Message::SysEx(self.sysex.finish(Termination::Aborted))));
                }
                Ok(Some(byte)) => self.sysex.push(byte),
                Ok(None) => {
                    debug!("source ended inside sysex");
                    return Ok(Some(Message::SysEx(self.sysex.finish(Termination::Aborted))));
                }
                Err(err) => {
                    self.deferred_error = Some(err);
                    return Ok(Some(Message::SysEx(self.sysex.finish(Termination::Aborted))));
                }
            }
        }
    }

    fn read_args(&mut self, wanted: usize) -> Result<Args> {
        let mut data = [0u8; 2];
        for slot in data.iter_mut().take(wanted) {
            match self.next_byte()? {
                Some(byte) if byte < 0x80 => *slot = byte,
                Some(status) => return Ok(Args::Interrupted(status)),
                None => return Ok(Args::End),
            }
        }
        Ok(Args::Complete(data))
    }

    /// Next byte that is not realtime; realtime bytes are dispatched on the way.
    fn next_byte(&mut self) -> Result<Option<u8>> {
        loop {
            match self.raw_byte()? {
                Some(byte) if byte >= 0xF8 => self.dispatch_realtime(byte),
                other => return Ok(other),
            }
        }
    }

    fn raw_byte(&mut self) -> Result<Option<u8>> {
        if let Some(byte) = self.canary.take() {
            return Ok(Some(byte));
        }
        let mut buf = [0u8; 1];
        loop {
            match self.source.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(buf[0])),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn dispatch_realtime(&mut self, byte: u8) {
        if let (Some(handler), Some(rt)) = (self.realtime.as_mut(), Realtime::from_byte(byte)) {
            handler(rt);
        }
    }
}
