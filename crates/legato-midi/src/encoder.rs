//! Message encoding for the live wire and for SMF track data.

use smallvec::SmallVec;

use crate::error::{Error, Result};
use crate::message::{ChannelMessage, Message, SysEx, SystemCommon};
use crate::vlq::encode_vlq;

const SYSEX_START: u8 = 0xF0;
const SYSEX_END: u8 = 0xF7;
const META: u8 = 0xFF;

/// Target byte framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Live byte stream: realtime allowed, meta rejected, sysex unprefixed.
    Wire,
    /// SMF track event (without delta time): meta allowed, realtime rejected,
    /// sysex length-prefixed, system common escaped with `F7`.
    File,
}

/// Stateful encoder tracking the running status of the output.
#[derive(Debug, Clone, Default)]
pub struct MessageEncoder {
    running_status: bool,
    last_status: Option<u8>,
}

impl MessageEncoder {
    pub fn new(running_status: bool) -> Self {
        Self {
            running_status,
            last_status: None,
        }
    }

    pub fn uses_running_status(&self) -> bool {
        self.running_status
    }

    /// Forget the last status so the next channel message carries its status byte.
    pub fn reset(&mut self) {
        self.last_status = None;
    }

    /// Append the encoding of `msg` to `out`.
    pub fn encode(&mut self, msg: &Message, framing: Framing, out: &mut Vec<u8>) -> Result<()> {
        match (msg, framing) {
            (Message::Channel(channel), _) => self.encode_channel(channel, out),
            (Message::Realtime(rt), Framing::Wire) => {
                out.push(rt.byte());
                Ok(())
            }
            (Message::Realtime(_), Framing::File) => {
                Err(Error::Unencodable("realtime message in a file"))
            }
            (Message::Common(common), Framing::Wire) => {
                self.last_status = None;
                out.extend_from_slice(&common_bytes(common));
                Ok(())
            }
            (Message::Common(common), Framing::File) => {
                self.last_status = None;
                let bytes = common_bytes(common);
                out.push(SYSEX_END);
                out.extend_from_slice(&encode_vlq(bytes.len() as u32)?);
                out.extend_from_slice(&bytes);
                Ok(())
            }
            (Message::SysEx(sysex), Framing::Wire) => {
                self.last_status = None;
                encode_wire_sysex(sysex, out);
                Ok(())
            }
            (Message::SysEx(sysex), Framing::File) => {
                self.last_status = None;
                encode_file_sysex(sysex, out)
            }
            (Message::Meta(_), Framing::Wire) => Err(Error::Unencodable("meta message on the wire")),
            (Message::Meta(meta), Framing::File) => {
                self.last_status = None;
                let payload = meta.payload();
                out.push(META);
                out.push(meta.kind());
                out.extend_from_slice(&encode_vlq(payload.len() as u32)?);
                out.extend_from_slice(&payload);
                Ok(())
            }
        }
    }

    pub fn encode_channel(&mut self, msg: &ChannelMessage, out: &mut Vec<u8>) -> Result<()> {
        msg.validate()?;
        let status = msg.status();
        if !(self.running_status && self.last_status == Some(status)) {
            out.push(status);
        }
        self.last_status = Some(status);
        let (data, len) = msg.voice.data();
        out.extend_from_slice(&data[..len]);
        Ok(())
    }
}

fn common_bytes(common: &SystemCommon) -> SmallVec<[u8; 3]> {
    let mut bytes = SmallVec::new();
    bytes.push(common.status());
    match *common {
        SystemCommon::MtcQuarterFrame(data) | SystemCommon::SongSelect(data) => bytes.push(data & 0x7F),
        SystemCommon::SongPositionPointer(beats) => {
            bytes.push((beats & 0x7F) as u8);
            bytes.push(((beats >> 7) & 0x7F) as u8);
        }
        SystemCommon::TuneRequest => {}
    }
    bytes
}

fn encode_wire_sysex(sysex: &SysEx, out: &mut Vec<u8>) {
    match sysex {
        SysEx::Complete(data) => {
            out.push(SYSEX_START);
            out.extend_from_slice(data);
            out.push(SYSEX_END);
        }
        SysEx::Start(data) => {
            out.push(SYSEX_START);
            out.extend_from_slice(data);
        }
        SysEx::Continue(data) | SysEx::Escape(data) => out.extend_from_slice(data),
        SysEx::End(data) => {
            out.extend_from_slice(data);
            out.push(SYSEX_END);
        }
    }
}

fn encode_file_sysex(sysex: &SysEx, out: &mut Vec<u8>) -> Result<()> {
    let (prefix, data, terminated) = match sysex {
        SysEx::Complete(data) => (SYSEX_START, data, true),
        SysEx::Start(data) => (SYSEX_START, data, false),
        SysEx::Continue(data) | SysEx::Escape(data) => (SYSEX_END, data, false),
        SysEx::End(data) => (SYSEX_END, data, true),
    };
    let len = data.len() + usize::from(terminated);
    out.push(prefix);
    out.extend_from_slice(&encode_vlq(len as u32)?);
    out.extend_from_slice(data);
    if terminated {
        out.push(SYSEX_END);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Meta, Realtime, Voice};

    fn encode(msg: &Message, framing: Framing) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        MessageEncoder::new(false).encode(msg, framing, &mut out)?;
        Ok(out)
    }

    #[test]
    fn test_note_off_without_velocity_uses_note_on() {
        let msg = Message::Channel(ChannelMessage::note_off(1, 60).unwrap());
        assert_eq!(encode(&msg, Framing::Wire).unwrap(), vec![0x91, 60, 0]);
    }

    #[test]
    fn test_running_status_skips_repeated_status() {
        let mut encoder = MessageEncoder::new(true);
        let mut out = Vec::new();
        let on = Message::Channel(ChannelMessage::note_on(0, 60, 100).unwrap());
        let off = Message::Channel(ChannelMessage::note_off(0, 60).unwrap());
        encoder.encode(&on, Framing::Wire, &mut out).unwrap();
        encoder.encode(&off, Framing::Wire, &mut out).unwrap();
        assert_eq!(out, vec![0x90, 60, 100, 60, 0]);
    }

    #[test]
    fn test_realtime_does_not_break_running_status() {
        let mut encoder = MessageEncoder::new(true);
        let mut out = Vec::new();
        let on = Message::Channel(ChannelMessage::note_on(0, 60, 100).unwrap());
        encoder.encode(&on, Framing::Wire, &mut out).unwrap();
        encoder
            .encode(&Message::Realtime(Realtime::Clock), Framing::Wire, &mut out)
            .unwrap();
        encoder.encode(&on, Framing::Wire, &mut out).unwrap();
        assert_eq!(out, vec![0x90, 60, 100, 0xF8, 60, 100]);
    }

    #[test]
    fn test_invalid_channel_rejected() {
        let msg = Message::Channel(ChannelMessage {
            channel: 16,
            voice: Voice::ProgramChange { program: 1 },
        });
        assert!(matches!(
            encode(&msg, Framing::Wire),
            Err(Error::InvalidChannel(16))
        ));
    }

    #[test]
    fn test_meta_only_in_files() {
        let msg = Message::Meta(Meta::EndOfTrack);
        assert!(matches!(encode(&msg, Framing::Wire), Err(Error::Unencodable(_))));
        assert_eq!(encode(&msg, Framing::File).unwrap(), vec![0xFF, 0x2F, 0x00]);
    }

    #[test]
    fn test_realtime_only_on_wire() {
        let msg = Message::Realtime(Realtime::Start);
        assert_eq!(encode(&msg, Framing::Wire).unwrap(), vec![0xFA]);
        assert!(encode(&msg, Framing::File).is_err());
    }

    #[test]
    fn test_sysex_framing() {
        let msg = Message::SysEx(SysEx::Complete(vec![0x7E, 0x00]));
        assert_eq!(
            encode(&msg, Framing::Wire).unwrap(),
            vec![0xF0, 0x7E, 0x00, 0xF7]
        );
        assert_eq!(
            encode(&msg, Framing::File).unwrap(),
            vec![0xF0, 0x03, 0x7E, 0x00, 0xF7]
        );
    }

    #[test]
    fn test_system_common_escaped_in_files() {
        let msg = Message::Common(SystemCommon::SongPositionPointer(0x110));
        assert_eq!(encode(&msg, Framing::Wire).unwrap(), vec![0xF2, 0x10, 0x02]);
        assert_eq!(
            encode(&msg, Framing::File).unwrap(),
            vec![0xF7, 0x03, 0xF2, 0x10, 0x02]
        );
    }
}
