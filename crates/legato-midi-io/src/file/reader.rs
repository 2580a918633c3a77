//! Streaming Standard MIDI File reader.
//!
//! Tracks are read in file order, one event at a time. Tempo metas feed the
//! reader's [`TempoMap`], so every message carries its wall-clock time as
//! well as its tick position.

use std::io::{self, ErrorKind, Read};
use std::time::Duration;

use legato_core::TempoMap;
use legato_midi::{
    channel_data_len, read_vlq, ChannelMessage, ChunkHeader, DecoderConfig, Message, Meta,
    Resolved, RunningStatus, SysExReassembler, SystemCommon,
};

use super::header::{SmfHeader, TimeDivision};
use crate::error::{Error, Result};
use crate::event::{Position, TimedMessage};

#[derive(Debug, Clone, Copy)]
struct TrackState {
    index: u16,
    remaining: u32,
    absolute_ticks: u64,
}

/// Reads at most the chunk's remaining bytes from the source.
struct TrackBytes<'a, R> {
    source: &'a mut R,
    remaining: &'a mut u32,
}

impl<R: Read> Read for TrackBytes<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let limit = buf.len().min(*self.remaining as usize);
        if limit == 0 {
            return Ok(0);
        }
        let n = self.source.read(&mut buf[..limit])?;
        *self.remaining -= n as u32;
        Ok(n)
    }
}

#[derive(Debug)]
pub struct SmfReader<R> {
    source: R,
    header: SmfHeader,
    config: DecoderConfig,
    tempo_map: Option<TempoMap>,
    track: Option<TrackState>,
    tracks_started: u16,
    running_status: RunningStatus,
    sysex: SysExReassembler,
    /// Status byte found while skipping stray data bytes; its delta was lost.
    resync: Option<u8>,
    done: bool,
}

impl<R: Read> SmfReader<R> {
    /// Read the header chunk and prepare to stream tracks.
    pub fn new(source: R) -> Result<Self> {
        Self::with_config(source, DecoderConfig::default())
    }

    pub fn with_config(mut source: R, config: DecoderConfig) -> Result<Self> {
        let header = SmfHeader::read(&mut source)?;
        let tempo_map = match header.division {
            TimeDivision::Metric(tpq) => Some(TempoMap::new(tpq)?),
            TimeDivision::Smpte { .. } => None,
        };
        tracing::debug!(
            format = ?header.format,
            tracks = header.tracks,
            division = ?header.division,
            "reading MIDI file"
        );
        Ok(Self {
            source,
            header,
            config,
            tempo_map,
            track: None,
            tracks_started: 0,
            running_status: RunningStatus::new(),
            sysex: SysExReassembler::new(),
            resync: None,
            done: false,
        })
    }

    pub fn header(&self) -> &SmfHeader {
        &self.header
    }

    /// Tempo changes seen so far; `None` for SMPTE time division.
    pub fn tempo_map(&self) -> Option<&TempoMap> {
        self.tempo_map.as_ref()
    }

    pub fn into_tempo_map(self) -> Option<TempoMap> {
        self.tempo_map
    }

    /// Index of the track being read.
    pub fn current_track(&self) -> Option<u16> {
        self.track.map(|t| t.index)
    }

    pub fn into_inner(self) -> R {
        self.source
    }

    /// Wall-clock time of an absolute tick position.
    pub fn time_at(&self, absolute_ticks: u64) -> Duration {
        match (&self.tempo_map, self.header.division.smpte_tick_secs()) {
            (Some(map), _) => map.time_at(absolute_ticks),
            (None, Some(tick_secs)) => Duration::from_secs_f64(absolute_ticks as f64 * tick_secs),
            (None, None) => Duration::ZERO,
        }
    }

    pub fn messages(&mut self) -> impl Iterator<Item = Result<TimedMessage>> + '_ {
        std::iter::from_fn(move || self.read_one().transpose())
    }

    /// Next message of the file, `Ok(None)` once every track is read.
    ///
    /// A track chunk that runs out without an EndOfTrack is closed with a
    /// synthesized one. A source that ends inside a track ends the file.
    pub fn read_one(&mut self) -> Result<Option<TimedMessage>> {
        loop {
            if self.done {
                return Ok(None);
            }
            let Some(track) = self.track else {
                match self.open_next_track() {
                    Ok(true) => continue,
                    Ok(false) => {
                        self.done = true;
                        return Ok(None);
                    }
                    Err(e) if is_truncation(&e) => {
                        tracing::warn!("file ends inside a chunk header");
                        self.done = true;
                        return Ok(None);
                    }
                    Err(e) => return Err(e),
                }
            };

            if track.remaining == 0 {
                tracing::warn!(track = track.index, "track chunk ends without EndOfTrack");
                let position = Position {
                    track: track.index,
                    delta_ticks: 0,
                    absolute_ticks: track.absolute_ticks,
                };
                let time = self.time_at(track.absolute_ticks);
                self.track = None;
                return Ok(Some(TimedMessage::in_file(
                    Message::Meta(Meta::EndOfTrack),
                    position,
                    time,
                )));
            }

            match self.read_event() {
                Ok(Some(msg)) => return Ok(Some(msg)),
                Ok(None) => continue,
                Err(e) if is_truncation(&e) => {
                    tracing::warn!(track = track.index, "file ends inside a track");
                    self.done = true;
                    return Ok(None);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Advance to the next `MTrk` chunk, skipping unknown chunk types.
    fn open_next_track(&mut self) -> Result<bool> {
        loop {
            let Some(chunk) = ChunkHeader::read(&mut self.source)? else {
                if self.tracks_started < self.header.tracks {
                    tracing::warn!(
                        declared = self.header.tracks,
                        found = self.tracks_started,
                        "file has fewer tracks than declared"
                    );
                }
                return Ok(false);
            };
            if !chunk.is_track() {
                tracing::debug!(kind = %chunk.kind_str(), len = chunk.len, "skipping unknown chunk");
                self.skip(chunk.len)?;
                continue;
            }
            if self.tracks_started >= self.header.tracks {
                tracing::debug!(index = self.tracks_started, "track beyond declared count");
            }
            self.track = Some(TrackState {
                index: self.tracks_started,
                remaining: chunk.len,
                absolute_ticks: 0,
            });
            self.tracks_started = self.tracks_started.saturating_add(1);
            self.running_status.clear();
            self.sysex.reset();
            self.resync = None;
            return Ok(true);
        }
    }

    fn skip(&mut self, len: u32) -> Result<()> {
        let skipped = io::copy(&mut (&mut self.source).take(u64::from(len)), &mut io::sink())?;
        if skipped < u64::from(len) {
            return Err(Error::Io(io::Error::new(
                ErrorKind::UnexpectedEof,
                "chunk truncated",
            )));
        }
        Ok(())
    }

    /// One `(delta, event)` pair. `Ok(None)` when the event was discarded.
    fn read_event(&mut self) -> Result<Option<TimedMessage>> {
        let Some(track) = self.track.as_mut() else {
            return Ok(None);
        };
        let mut bytes = TrackBytes {
            source: &mut self.source,
            remaining: &mut track.remaining,
        };

        let (delta, status) = match self.resync.take() {
            Some(status) => (0, status),
            None => {
                let delta = read_vlq(&mut bytes)?;
                (delta, read_u8(&mut bytes)?)
            }
        };
        track.absolute_ticks += u64::from(delta);

        let message = match self.running_status.resolve(status) {
            Resolved::Voice { status, first_data } => {
                let mut data = [0u8; 2];
                let len = channel_data_len(status);
                let start = match first_data {
                    Some(byte) => {
                        data[0] = byte;
                        1
                    }
                    None => 0,
                };
                bytes.read_exact(&mut data[start..len])?;
                Message::Channel(ChannelMessage::from_status(
                    status,
                    data[0],
                    data[1],
                    self.config.pedantic,
                ))
            }
            Resolved::System(prefix @ (0xF0 | 0xF7)) => {
                let payload = read_payload(&mut bytes)?;
                Message::SysEx(self.sysex.file_packet(prefix, &payload))
            }
            Resolved::System(status) => {
                let Some(len) = SystemCommon::data_len(status) else {
                    // undefined system common bytes carry no data
                    tracing::debug!(status, track = track.index, "undefined status byte skipped");
                    return Ok(None);
                };
                let mut data = [0u8; 2];
                bytes.read_exact(&mut data[..len])?;
                match SystemCommon::from_status(status, &data[..len]) {
                    Some(common) => Message::Common(common),
                    None => return Ok(None),
                }
            }
            Resolved::Realtime(0xFF) => {
                self.running_status.clear();
                let kind = read_u8(&mut bytes)?;
                let payload = read_payload(&mut bytes)?;
                Message::Meta(Meta::from_parts(kind, &payload))
            }
            Resolved::Realtime(byte) => {
                tracing::trace!(byte, track = track.index, "realtime byte in track dropped");
                return Ok(None);
            }
            Resolved::Discard(byte) => {
                tracing::debug!(
                    byte,
                    track = track.index,
                    "data byte without running status, skipping to next status"
                );
                while *bytes.remaining > 0 {
                    let next = read_u8(&mut bytes)?;
                    if next & 0x80 != 0 {
                        self.resync = Some(next);
                        break;
                    }
                }
                return Ok(None);
            }
        };

        let position = Position {
            track: track.index,
            delta_ticks: delta,
            absolute_ticks: track.absolute_ticks,
        };
        let remaining = track.remaining;

        if let Message::Meta(meta) = &message {
            if let (Some(bpm), Some(map)) = (meta.bpm(), self.tempo_map.as_mut()) {
                map.record_tempo(position.absolute_ticks, bpm)?;
            }
        }
        let time = self.time_at(position.absolute_ticks);

        if message.is_end_of_track() {
            self.track = None;
            if remaining > 0 {
                tracing::debug!(remaining, track = position.track, "bytes after EndOfTrack");
                self.skip(remaining)?;
            }
            tracing::trace!(track = position.track, ticks = position.absolute_ticks, "track done");
        }
        Ok(Some(TimedMessage::in_file(message, position, time)))
    }
}

fn read_u8<R: Read>(source: &mut R) -> Result<u8> {
    let mut byte = [0u8; 1];
    source.read_exact(&mut byte)?;
    Ok(byte[0])
}

fn read_payload<R: Read>(source: &mut R) -> Result<Vec<u8>> {
    let len = read_vlq(source)?;
    let mut payload = Vec::new();
    let read = source.take(u64::from(len)).read_to_end(&mut payload)?;
    if read < len as usize {
        return Err(Error::Io(io::Error::new(
            ErrorKind::UnexpectedEof,
            "event payload truncated",
        )));
    }
    Ok(payload)
}

fn is_truncation(error: &Error) -> bool {
    match error {
        Error::Io(e) | Error::Midi(legato_midi::Error::Io(e)) => e.kind() == ErrorKind::UnexpectedEof,
        _ => false,
    }
}
