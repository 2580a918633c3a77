//! MIDI message model shared by the wire decoder and the SMF codec.
//!
//! A [`Message`] is a closed set of variants: channel voice messages, realtime
//! bytes, system common messages, system exclusive fragments and SMF meta
//! messages. Each variant only carries the fields that are meaningful to it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Center of the 14-bit pitchbend range.
pub const PITCHBEND_CENTER: u16 = 0x2000;

/// Any decoded or encodable MIDI message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Channel voice message (status `0x80..=0xEF`).
    Channel(ChannelMessage),
    /// Single-byte realtime message (status `0xF8..=0xFF` on the wire).
    Realtime(Realtime),
    /// System common message (status `0xF1..=0xF6`).
    Common(SystemCommon),
    /// System exclusive fragment.
    SysEx(SysEx),
    /// SMF meta message. Never appears on the live wire.
    Meta(Meta),
}

impl Message {
    /// Channel this message is addressed to, if it is a channel message.
    pub fn channel(&self) -> Option<u8> {
        match self {
            Message::Channel(msg) => Some(msg.channel),
            _ => None,
        }
    }

    pub fn is_end_of_track(&self) -> bool {
        matches!(self, Message::Meta(Meta::EndOfTrack))
    }
}

impl From<ChannelMessage> for Message {
    fn from(msg: ChannelMessage) -> Self {
        Message::Channel(msg)
    }
}

impl From<Realtime> for Message {
    fn from(msg: Realtime) -> Self {
        Message::Realtime(msg)
    }
}

impl From<SystemCommon> for Message {
    fn from(msg: SystemCommon) -> Self {
        Message::Common(msg)
    }
}

impl From<SysEx> for Message {
    fn from(msg: SysEx) -> Self {
        Message::SysEx(msg)
    }
}

impl From<Meta> for Message {
    fn from(msg: Meta) -> Self {
        Message::Meta(msg)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Channel(msg) => write!(f, "channel {}: {:?}", msg.channel, msg.voice),
            Message::Realtime(msg) => write!(f, "realtime {:?}", msg),
            Message::Common(msg) => write!(f, "common {:?}", msg),
            Message::SysEx(msg) => write!(f, "sysex {} ({} bytes)", msg.label(), msg.data().len()),
            Message::Meta(msg) => write!(f, "meta {:?}", msg),
        }
    }
}

// ============================================================================
// Channel voice
// ============================================================================

/// A channel voice message with its channel (0-15).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub channel: u8,
    pub voice: Voice,
}

/// Channel voice payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Voice {
    NoteOn { key: u8, velocity: u8 },
    /// Note off without a meaningful release velocity (a NoteOn with velocity 0).
    NoteOff { key: u8 },
    /// Hardware note off (`0x8n`) carrying a release velocity.
    NoteOffVelocity { key: u8, velocity: u8 },
    ControlChange { controller: u8, value: u8 },
    ProgramChange { program: u8 },
    /// Channel pressure.
    Aftertouch { pressure: u8 },
    PolyAftertouch { key: u8, pressure: u8 },
    /// `value` is relative to the center (-8192..=8191), `absolute` is the raw 14-bit form.
    Pitchbend { value: i16, absolute: u16 },
}

impl Voice {
    /// Build a pitchbend from a value relative to the center.
    pub fn pitchbend(value: i16) -> Result<Self> {
        if !(-8192..=8191).contains(&value) {
            return Err(Error::PitchbendOutOfRange(value));
        }
        let absolute = (value + PITCHBEND_CENTER as i16) as u16;
        Ok(Voice::Pitchbend { value, absolute })
    }

    /// High nibble of the status byte used to encode this payload.
    pub fn status_nibble(&self) -> u8 {
        match self {
            Voice::NoteOffVelocity { .. } => 0x80,
            Voice::NoteOn { .. } | Voice::NoteOff { .. } => 0x90,
            Voice::PolyAftertouch { .. } => 0xA0,
            Voice::ControlChange { .. } => 0xB0,
            Voice::ProgramChange { .. } => 0xC0,
            Voice::Aftertouch { .. } => 0xD0,
            Voice::Pitchbend { .. } => 0xE0,
        }
    }

    /// Data bytes in wire order.
    pub fn data(&self) -> ([u8; 2], usize) {
        match *self {
            Voice::NoteOn { key, velocity } => ([key, velocity], 2),
            Voice::NoteOff { key } => ([key, 0], 2),
            Voice::NoteOffVelocity { key, velocity } => ([key, velocity], 2),
            Voice::ControlChange { controller, value } => ([controller, value], 2),
            Voice::ProgramChange { program } => ([program, 0], 1),
            Voice::Aftertouch { pressure } => ([pressure, 0], 1),
            Voice::PolyAftertouch { key, pressure } => ([key, pressure], 2),
            Voice::Pitchbend { absolute, .. } => {
                ([(absolute & 0x7F) as u8, ((absolute >> 7) & 0x7F) as u8], 2)
            }
        }
    }
}

/// Number of data bytes that follow a channel status byte.
#[inline]
pub fn channel_data_len(status: u8) -> usize {
    match status & 0xF0 {
        0xC0 | 0xD0 => 1,
        _ => 2,
    }
}

impl ChannelMessage {
    /// Validated constructor.
    pub fn new(channel: u8, voice: Voice) -> Result<Self> {
        let msg = Self { channel, voice };
        msg.validate()?;
        Ok(msg)
    }

    pub fn note_on(channel: u8, key: u8, velocity: u8) -> Result<Self> {
        Self::new(channel, Voice::NoteOn { key, velocity })
    }

    pub fn note_off(channel: u8, key: u8) -> Result<Self> {
        Self::new(channel, Voice::NoteOff { key })
    }

    pub fn control_change(channel: u8, controller: u8, value: u8) -> Result<Self> {
        Self::new(channel, Voice::ControlChange { controller, value })
    }

    /// Check the channel, every data byte and the pitchbend invariants.
    pub fn validate(&self) -> Result<()> {
        if self.channel > 15 {
            return Err(Error::InvalidChannel(self.channel));
        }
        if let Voice::Pitchbend { value, absolute } = self.voice {
            if !(-8192..=8191).contains(&value) {
                return Err(Error::PitchbendOutOfRange(value));
            }
            if (value + PITCHBEND_CENTER as i16) as u16 != absolute {
                return Err(Error::InvalidArgument(format!(
                    "pitchbend value {} does not match raw form {}",
                    value, absolute
                )));
            }
            return Ok(());
        }
        let (data, len) = self.voice.data();
        match data[..len].iter().find(|b| **b > 0x7F) {
            Some(byte) => Err(Error::InvalidDataByte(*byte)),
            None => Ok(()),
        }
    }

    /// Full status byte (type nibble and channel).
    #[inline]
    pub fn status(&self) -> u8 {
        self.voice.status_nibble() | (self.channel & 0x0F)
    }

    /// Decode from a voice status byte and its data bytes.
    ///
    /// A NoteOn with velocity 0 becomes [`Voice::NoteOff`] unless `pedantic` is set.
    pub fn from_status(status: u8, data1: u8, data2: u8, pedantic: bool) -> Self {
        let channel = status & 0x0F;
        let (data1, data2) = (data1 & 0x7F, data2 & 0x7F);
        let voice = match status & 0xF0 {
            0x80 => Voice::NoteOffVelocity {
                key: data1,
                velocity: data2,
            },
            0x90 if data2 == 0 && !pedantic => Voice::NoteOff { key: data1 },
            0x90 => Voice::NoteOn {
                key: data1,
                velocity: data2,
            },
            0xA0 => Voice::PolyAftertouch {
                key: data1,
                pressure: data2,
            },
            0xB0 => Voice::ControlChange {
                controller: data1,
                value: data2,
            },
            0xC0 => Voice::ProgramChange { program: data1 },
            0xD0 => Voice::Aftertouch { pressure: data1 },
            _ => {
                let absolute = (data2 as u16) << 7 | data1 as u16;
                Voice::Pitchbend {
                    value: absolute as i16 - PITCHBEND_CENTER as i16,
                    absolute,
                }
            }
        };
        Self { channel, voice }
    }
}

// ============================================================================
// Realtime
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Realtime {
    Clock,
    Tick,
    Start,
    Continue,
    Stop,
    Undefined,
    ActiveSense,
    Reset,
}

impl Realtime {
    /// Map a byte in `0xF8..=0xFF` to its realtime message.
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0xF8 => Realtime::Clock,
            0xF9 => Realtime::Tick,
            0xFA => Realtime::Start,
            0xFB => Realtime::Continue,
            0xFC => Realtime::Stop,
            0xFD => Realtime::Undefined,
            0xFE => Realtime::ActiveSense,
            0xFF => Realtime::Reset,
            _ => return None,
        })
    }

    pub fn byte(&self) -> u8 {
        match self {
            Realtime::Clock => 0xF8,
            Realtime::Tick => 0xF9,
            Realtime::Start => 0xFA,
            Realtime::Continue => 0xFB,
            Realtime::Stop => 0xFC,
            Realtime::Undefined => 0xFD,
            Realtime::ActiveSense => 0xFE,
            Realtime::Reset => 0xFF,
        }
    }
}

// ============================================================================
// System common
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SystemCommon {
    /// MTC quarter frame, raw data byte (`0nnndddd`).
    MtcQuarterFrame(u8),
    /// Song position in MIDI beats (sixteenth notes), 14 bits.
    SongPositionPointer(u16),
    SongSelect(u8),
    TuneRequest,
}

impl SystemCommon {
    pub fn status(&self) -> u8 {
        match self {
            SystemCommon::MtcQuarterFrame(_) => 0xF1,
            SystemCommon::SongPositionPointer(_) => 0xF2,
            SystemCommon::SongSelect(_) => 0xF3,
            SystemCommon::TuneRequest => 0xF6,
        }
    }

    /// Argument byte count for a system common status, `None` for undefined ones.
    pub fn data_len(status: u8) -> Option<usize> {
        match status {
            0xF1 | 0xF3 => Some(1),
            0xF2 => Some(2),
            0xF6 => Some(0),
            _ => None,
        }
    }

    /// Decode from a status byte and its arguments; missing arguments read as 0.
    pub fn from_status(status: u8, data: &[u8]) -> Option<Self> {
        let at = |i: usize| data.get(i).copied().unwrap_or(0) & 0x7F;
        match status {
            0xF1 => Some(SystemCommon::MtcQuarterFrame(at(0))),
            0xF2 => Some(SystemCommon::SongPositionPointer(
                (at(1) as u16) << 7 | at(0) as u16,
            )),
            0xF3 => Some(SystemCommon::SongSelect(at(0))),
            0xF6 => Some(SystemCommon::TuneRequest),
            _ => None,
        }
    }

    /// Quarter frame message type (0-7).
    pub fn mtc_message_type(&self) -> Option<u8> {
        match self {
            SystemCommon::MtcQuarterFrame(data) => Some((data >> 4) & 0x07),
            _ => None,
        }
    }

    /// Quarter frame value nibble.
    pub fn mtc_value(&self) -> Option<u8> {
        match self {
            SystemCommon::MtcQuarterFrame(data) => Some(data & 0x0F),
            _ => None,
        }
    }
}

// ============================================================================
// System exclusive
// ============================================================================

/// A system exclusive fragment. Payloads never include the `F0`/`F7` framing bytes,
/// except for [`SysEx::Escape`] which carries arbitrary raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SysEx {
    /// `F0 data F7` in one piece.
    Complete(Vec<u8>),
    /// Opening fragment that was not terminated by `F7`.
    Start(Vec<u8>),
    /// Middle fragment of a split sysex.
    Continue(Vec<u8>),
    /// Final fragment of a split sysex.
    End(Vec<u8>),
    /// SMF escape: raw bytes to be sent as-is.
    Escape(Vec<u8>),
}

impl SysEx {
    pub fn data(&self) -> &[u8] {
        match self {
            SysEx::Complete(data)
            | SysEx::Start(data)
            | SysEx::Continue(data)
            | SysEx::End(data)
            | SysEx::Escape(data) => data,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            SysEx::Complete(_) => "complete",
            SysEx::Start(_) => "start",
            SysEx::Continue(_) => "continue",
            SysEx::End(_) => "end",
            SysEx::Escape(_) => "escape",
        }
    }
}

// ============================================================================
// Meta
// ============================================================================

pub mod meta_type {
    pub const SEQUENCE_NUMBER: u8 = 0x00;
    pub const TEXT: u8 = 0x01;
    pub const COPYRIGHT: u8 = 0x02;
    pub const TRACK_NAME: u8 = 0x03;
    pub const INSTRUMENT: u8 = 0x04;
    pub const LYRIC: u8 = 0x05;
    pub const MARKER: u8 = 0x06;
    pub const CUE_POINT: u8 = 0x07;
    pub const PROGRAM_NAME: u8 = 0x08;
    pub const DEVICE_NAME: u8 = 0x09;
    pub const CHANNEL_PREFIX: u8 = 0x20;
    pub const PORT: u8 = 0x21;
    pub const END_OF_TRACK: u8 = 0x2F;
    pub const TEMPO: u8 = 0x51;
    pub const SMPTE_OFFSET: u8 = 0x54;
    pub const TIME_SIGNATURE: u8 = 0x58;
    pub const KEY_SIGNATURE: u8 = 0x59;
    pub const SEQUENCER_SPECIFIC: u8 = 0x7F;
}

/// SMF meta messages (`FF type len data`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Meta {
    SequenceNumber(u16),
    Text(String),
    Copyright(String),
    TrackName(String),
    Instrument(String),
    Lyric(String),
    Marker(String),
    CuePoint(String),
    ProgramName(String),
    DeviceName(String),
    ChannelPrefix(u8),
    Port(u8),
    EndOfTrack,
    Tempo {
        micros_per_quarter: u32,
    },
    SmpteOffset {
        hour: u8,
        minute: u8,
        second: u8,
        frame: u8,
        subframe: u8,
    },
    /// `denominator` is the real note value (4 for quarter), not its binary log.
    TimeSignature {
        numerator: u8,
        denominator: u8,
        clocks_per_click: u8,
        thirty_seconds_per_quarter: u8,
    },
    /// `key` counts sharps (positive) or flats (negative).
    KeySignature {
        key: i8,
        minor: bool,
    },
    SequencerSpecific(Vec<u8>),
    Undefined {
        kind: u8,
        data: Vec<u8>,
    },
}

impl Meta {
    /// Tempo meta for a BPM value. The result must fit the 24-bit field.
    pub fn tempo_from_bpm(bpm: f64) -> Result<Self> {
        if !(bpm.is_finite() && bpm > 0.0) {
            return Err(Error::InvalidArgument(format!("tempo {} BPM", bpm)));
        }
        let micros = (60_000_000.0 / bpm).round();
        if micros < 1.0 || micros > 0x00FF_FFFF as f64 {
            return Err(Error::InvalidArgument(format!(
                "tempo {} BPM does not fit 24 bits",
                bpm
            )));
        }
        Ok(Meta::Tempo {
            micros_per_quarter: micros as u32,
        })
    }

    /// Time signature meta with the conventional 24 clocks per click and 8 32nds per quarter.
    pub fn time_signature(numerator: u8, denominator: u8) -> Result<Self> {
        if numerator == 0 || denominator == 0 || !denominator.is_power_of_two() {
            return Err(Error::InvalidArgument(format!(
                "time signature {}/{}",
                numerator, denominator
            )));
        }
        Ok(Meta::TimeSignature {
            numerator,
            denominator,
            clocks_per_click: 24,
            thirty_seconds_per_quarter: 8,
        })
    }

    /// Tempo in beats per minute, for tempo metas.
    pub fn bpm(&self) -> Option<f64> {
        match self {
            Meta::Tempo { micros_per_quarter } if *micros_per_quarter > 0 => {
                Some(60_000_000.0 / *micros_per_quarter as f64)
            }
            _ => None,
        }
    }

    pub fn kind(&self) -> u8 {
        use meta_type::*;
        match self {
            Meta::SequenceNumber(_) => SEQUENCE_NUMBER,
            Meta::Text(_) => TEXT,
            Meta::Copyright(_) => COPYRIGHT,
            Meta::TrackName(_) => TRACK_NAME,
            Meta::Instrument(_) => INSTRUMENT,
            Meta::Lyric(_) => LYRIC,
            Meta::Marker(_) => MARKER,
            Meta::CuePoint(_) => CUE_POINT,
            Meta::ProgramName(_) => PROGRAM_NAME,
            Meta::DeviceName(_) => DEVICE_NAME,
            Meta::ChannelPrefix(_) => CHANNEL_PREFIX,
            Meta::Port(_) => PORT,
            Meta::EndOfTrack => END_OF_TRACK,
            Meta::Tempo { .. } => TEMPO,
            Meta::SmpteOffset { .. } => SMPTE_OFFSET,
            Meta::TimeSignature { .. } => TIME_SIGNATURE,
            Meta::KeySignature { .. } => KEY_SIGNATURE,
            Meta::SequencerSpecific(_) => SEQUENCER_SPECIFIC,
            Meta::Undefined { kind, .. } => *kind,
        }
    }

    /// Decode a meta payload. Payloads too short for their type fall back to `Undefined`.
    pub fn from_parts(kind: u8, data: &[u8]) -> Self {
        use meta_type::*;
        let text = || String::from_utf8_lossy(data).into_owned();
        let undefined = || Meta::Undefined {
            kind,
            data: data.to_vec(),
        };
        match kind {
            SEQUENCE_NUMBER if data.len() >= 2 => {
                Meta::SequenceNumber(u16::from_be_bytes([data[0], data[1]]))
            }
            TEXT => Meta::Text(text()),
            COPYRIGHT => Meta::Copyright(text()),
            TRACK_NAME => Meta::TrackName(text()),
            INSTRUMENT => Meta::Instrument(text()),
            LYRIC => Meta::Lyric(text()),
            MARKER => Meta::Marker(text()),
            CUE_POINT => Meta::CuePoint(text()),
            PROGRAM_NAME => Meta::ProgramName(text()),
            DEVICE_NAME => Meta::DeviceName(text()),
            CHANNEL_PREFIX if !data.is_empty() => Meta::ChannelPrefix(data[0]),
            PORT if !data.is_empty() => Meta::Port(data[0]),
            END_OF_TRACK => Meta::EndOfTrack,
            TEMPO if data.len() >= 3 => Meta::Tempo {
                micros_per_quarter: u32::from_be_bytes([0, data[0], data[1], data[2]]),
            },
            SMPTE_OFFSET if data.len() >= 5 => Meta::SmpteOffset {
                hour: data[0],
                minute: data[1],
                second: data[2],
                frame: data[3],
                subframe: data[4],
            },
            TIME_SIGNATURE if data.len() >= 4 && data[1] <= 7 => Meta::TimeSignature {
                numerator: data[0],
                denominator: 1 << data[1],
                clocks_per_click: data[2],
                thirty_seconds_per_quarter: data[3],
            },
            KEY_SIGNATURE if data.len() >= 2 => Meta::KeySignature {
                key: data[0] as i8,
                minor: data[1] == 1,
            },
            SEQUENCER_SPECIFIC => Meta::SequencerSpecific(data.to_vec()),
            _ => undefined(),
        }
    }

    /// Encode the payload that follows `FF type len`.
    pub fn payload(&self) -> Vec<u8> {
        match self {
            Meta::SequenceNumber(n) => n.to_be_bytes().to_vec(),
            Meta::Text(s)
            | Meta::Copyright(s)
            | Meta::TrackName(s)
            | Meta::Instrument(s)
            | Meta::Lyric(s)
            | Meta::Marker(s)
            | Meta::CuePoint(s)
            | Meta::ProgramName(s)
            | Meta::DeviceName(s) => s.as_bytes().to_vec(),
            Meta::ChannelPrefix(v) | Meta::Port(v) => vec![*v],
            Meta::EndOfTrack => Vec::new(),
            Meta::Tempo { micros_per_quarter } => micros_per_quarter.to_be_bytes()[1..].to_vec(),
            Meta::SmpteOffset {
                hour,
                minute,
                second,
                frame,
                subframe,
            } => vec![*hour, *minute, *second, *frame, *subframe],
            Meta::TimeSignature {
                numerator,
                denominator,
                clocks_per_click,
                thirty_seconds_per_quarter,
            } => vec![
                *numerator,
                denominator.trailing_zeros() as u8,
                *clocks_per_click,
                *thirty_seconds_per_quarter,
            ],
            Meta::KeySignature { key, minor } => vec![*key as u8, u8::from(*minor)],
            Meta::SequencerSpecific(data) | Meta::Undefined { data, .. } => data.clone(),
        }
    }
}
