//! `MThd` chunk: format, track count and time division.

use std::io::{self, Read, Write};

use legato_midi::ChunkHeader;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const HEADER_LEN: u32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Format {
    /// Format 0: one multi-channel track.
    SingleTrack,
    /// Format 1: simultaneous tracks sharing the first track's tempo map.
    Parallel,
    /// Format 2: independent sequences.
    Sequential,
}

impl Format {
    pub fn from_u16(value: u16) -> Result<Self> {
        match value {
            0 => Ok(Format::SingleTrack),
            1 => Ok(Format::Parallel),
            2 => Ok(Format::Sequential),
            other => Err(Error::MidiFileParse(format!("unknown format {}", other))),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            Format::SingleTrack => 0,
            Format::Parallel => 1,
            Format::Sequential => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeDivision {
    /// Ticks per quarter note.
    Metric(u16),
    /// Frames per second (24, 25, 29 for 30 drop-frame, 30) and ticks per frame.
    Smpte { frames_per_second: u8, subframes: u8 },
}

impl TimeDivision {
    pub fn from_u16(raw: u16) -> Result<Self> {
        if raw & 0x8000 == 0 {
            if raw == 0 {
                return Err(Error::MidiFileParse("zero ticks per quarter note".into()));
            }
            return Ok(TimeDivision::Metric(raw));
        }
        let [hi, lo] = raw.to_be_bytes();
        let frames_per_second = (hi as i8).unsigned_abs();
        if frames_per_second == 0 || lo == 0 {
            return Err(Error::MidiFileParse(format!(
                "invalid SMPTE division {:#06x}",
                raw
            )));
        }
        Ok(TimeDivision::Smpte {
            frames_per_second,
            subframes: lo,
        })
    }

    pub fn to_u16(&self) -> u16 {
        match *self {
            TimeDivision::Metric(tpq) => tpq & 0x7FFF,
            TimeDivision::Smpte {
                frames_per_second,
                subframes,
            } => {
                let hi = (frames_per_second as i8).wrapping_neg() as u8;
                u16::from_be_bytes([hi, subframes])
            }
        }
    }

    pub fn ticks_per_quarter(&self) -> Option<u16> {
        match *self {
            TimeDivision::Metric(tpq) => Some(tpq),
            TimeDivision::Smpte { .. } => None,
        }
    }

    /// Seconds per tick for SMPTE divisions. 29 means 30 drop-frame (29.97 fps).
    pub fn smpte_tick_secs(&self) -> Option<f64> {
        match *self {
            TimeDivision::Smpte {
                frames_per_second,
                subframes,
            } => {
                let fps = match frames_per_second {
                    29 => 29.97,
                    fps => fps as f64,
                };
                Some(1.0 / (fps * subframes as f64))
            }
            TimeDivision::Metric(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmfHeader {
    pub format: Format,
    pub tracks: u16,
    pub division: TimeDivision,
}

impl SmfHeader {
    /// Checked header for writing.
    pub fn new(format: Format, tracks: u16, division: TimeDivision) -> Result<Self> {
        if tracks == 0 {
            return Err(Error::ZeroTracks);
        }
        if format == Format::SingleTrack && tracks != 1 {
            return Err(Error::InvalidArgument(format!(
                "format 0 holds exactly one track, not {}",
                tracks
            )));
        }
        let valid = match division {
            TimeDivision::Metric(tpq) => (1..=0x7FFF).contains(&tpq),
            TimeDivision::Smpte {
                frames_per_second,
                subframes,
            } => (1..=127).contains(&frames_per_second) && subframes > 0,
        };
        if !valid {
            return Err(Error::InvalidArgument(format!(
                "invalid time division {:?}",
                division
            )));
        }
        Ok(Self {
            format,
            tracks,
            division,
        })
    }

    /// Read the `MThd` chunk. Header chunks longer than six bytes are tolerated.
    pub fn read<R: Read>(source: &mut R) -> Result<Self> {
        let chunk = ChunkHeader::read(source)?
            .ok_or_else(|| Error::MidiFileParse("empty file".into()))?;
        if !chunk.is_header() {
            return Err(Error::MidiFileParse(format!(
                "expected MThd, found {}",
                chunk.kind_str()
            )));
        }
        if chunk.len < HEADER_LEN {
            return Err(Error::MidiFileParse(format!(
                "header chunk too short ({} bytes)",
                chunk.len
            )));
        }
        let mut fields = [0u8; 6];
        source.read_exact(&mut fields)?;
        if chunk.len > HEADER_LEN {
            let extra = u64::from(chunk.len - HEADER_LEN);
            tracing::debug!(extra, "skipping extra header bytes");
            io::copy(&mut (&mut *source).take(extra), &mut io::sink())?;
        }

        let format = Format::from_u16(u16::from_be_bytes([fields[0], fields[1]]))?;
        let tracks = u16::from_be_bytes([fields[2], fields[3]]);
        let division = TimeDivision::from_u16(u16::from_be_bytes([fields[4], fields[5]]))?;
        if format == Format::SingleTrack && tracks != 1 {
            tracing::warn!(tracks, "format 0 file declares more than one track");
        }
        Ok(Self {
            format,
            tracks,
            division,
        })
    }

    pub fn write<W: Write>(&self, out: &mut W) -> Result<()> {
        ChunkHeader::new(ChunkHeader::HEADER, HEADER_LEN).write(out)?;
        out.write_all(&self.format.as_u16().to_be_bytes())?;
        out.write_all(&self.tracks.to_be_bytes())?;
        out.write_all(&self.division.to_u16().to_be_bytes())?;
        Ok(())
    }
}
