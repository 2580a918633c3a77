//! System exclusive reassembly.
//!
//! On the wire a sysex starts with `F0` and ends with `F7`; any other status
//! byte aborts it. In files a sysex may be split into an `F0` packet followed
//! by `F7` continuation packets, each length-prefixed.

use crate::message::SysEx;

const SYSEX_END: u8 = 0xF7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SysExState {
    #[default]
    Idle,
    /// `F0` seen, first fragment not closed yet.
    Start,
    /// At least one fragment emitted, waiting for continuation fragments.
    Continuing,
}

/// Why the bytes accumulated so far are being handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// `F7` arrived.
    End,
    /// Another status byte, the end of the source or an IO error cut it short.
    Aborted,
}

#[derive(Debug, Default, Clone)]
pub struct SysExReassembler {
    state: SysExState,
    buffer: Vec<u8>,
}

impl SysExReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SysExState {
        self.state
    }

    /// True while continuation fragments are expected.
    pub fn is_open(&self) -> bool {
        self.state != SysExState::Idle
    }

    pub fn reset(&mut self) {
        self.state = SysExState::Idle;
        self.buffer.clear();
    }

    /// `F0` seen on the wire.
    pub fn begin(&mut self) {
        self.buffer.clear();
        self.state = SysExState::Start;
    }

    pub fn push(&mut self, byte: u8) {
        self.buffer.push(byte);
    }

    /// Close the current wire fragment.
    ///
    /// Terminated first fragments are `Complete`, terminated continuations are
    /// `End`. Aborted fragments keep whatever arrived as `Start`/`Continue`.
    pub fn finish(&mut self, termination: Termination) -> SysEx {
        let data = std::mem::take(&mut self.buffer);
        let continuing = self.state == SysExState::Continuing;
        self.state = SysExState::Idle;
        match (termination, continuing) {
            (Termination::End, false) => SysEx::Complete(data),
            (Termination::End, true) => SysEx::End(data),
            (Termination::Aborted, false) => SysEx::Start(data),
            (Termination::Aborted, true) => SysEx::Continue(data),
        }
    }

    /// Classify one length-prefixed SMF sysex packet.
    ///
    /// `prefix` is `0xF0` or `0xF7`; `payload` is the packet after its length.
    pub fn file_packet(&mut self, prefix: u8, payload: &[u8]) -> SysEx {
        let (body, terminated) = match payload.split_last() {
            Some((&SYSEX_END, body)) => (body.to_vec(), true),
            _ => (payload.to_vec(), false),
        };
        match (prefix, self.state) {
            (0xF0, _) => {
                if self.state != SysExState::Idle {
                    tracing::debug!("sysex start while a previous sysex was still open");
                }
                if terminated {
                    self.state = SysExState::Idle;
                    SysEx::Complete(body)
                } else {
                    self.state = SysExState::Continuing;
                    SysEx::Start(body)
                }
            }
            (_, SysExState::Idle) => SysEx::Escape(payload.to_vec()),
            (_, _) => {
                if terminated {
                    self.state = SysExState::Idle;
                    SysEx::End(body)
                } else {
                    self.state = SysExState::Continuing;
                    SysEx::Continue(body)
                }
            }
        }
    }
}
