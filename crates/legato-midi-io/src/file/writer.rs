//! Standard MIDI File writer driven by a bar-aware cursor.
//!
//! Events are buffered per track and flushed as an `MTrk` chunk on
//! EndOfTrack. Delta times come from the cursor: move it with
//! [`SmfWriter::set_delta`] or [`SmfWriter::forward`], then write.

use std::io::Write;

use legato_core::Timeline;
use legato_midi::{write_vlq, ChunkHeader, Framing, Message, Meta};
use serde::{Deserialize, Serialize};

use super::header::{Format, SmfHeader, TimeDivision};
use crate::error::{Error, Result};
use crate::writer::{MessageWriter, WriterConfig};

/// A plan handed back by the cursor: its delta, the message, and whether a
/// time signature it carries was accepted by the cursor.
type Fired = (Option<i64>, Message, legato_core::Result<()>);

/// Plan callback. A time signature is registered while the cursor sits on
/// the plan's own tick.
fn fire(timeline: &mut Timeline<Message>, msg: Message, fired: &mut Vec<Fired>) {
    let registered = register_signature(timeline, &msg);
    fired.push((timeline.get_delta(), msg, registered));
}

fn register_signature(timeline: &mut Timeline<Message>, msg: &Message) -> legato_core::Result<()> {
    if let Message::Meta(Meta::TimeSignature {
        numerator,
        denominator,
        ..
    }) = msg
    {
        timeline.set_time_signature(u32::from(*numerator), u32::from(*denominator))?;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmfWriterConfig {
    pub format: Format,
    pub track_count: u16,
    pub time_division: TimeDivision,
    pub running_status: bool,
}

impl Default for SmfWriterConfig {
    fn default() -> Self {
        Self {
            format: Format::SingleTrack,
            track_count: 1,
            time_division: TimeDivision::Metric(480),
            running_status: true,
        }
    }
}

impl SmfWriterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn track_count(mut self, tracks: u16) -> Self {
        self.track_count = tracks;
        self
    }

    #[must_use]
    pub fn ticks_per_quarter(mut self, tpq: u16) -> Self {
        self.time_division = TimeDivision::Metric(tpq);
        self
    }

    #[must_use]
    pub fn time_division(mut self, division: TimeDivision) -> Self {
        self.time_division = division;
        self
    }

    #[must_use]
    pub fn running_status(mut self, enabled: bool) -> Self {
        self.running_status = enabled;
        self
    }
}

#[derive(Debug)]
pub struct SmfWriter<W: Write> {
    sink: W,
    header: SmfHeader,
    writer: MessageWriter,
    track: Vec<u8>,
    scratch: Vec<u8>,
    tracks_written: u16,
    timeline: Timeline<Message>,
}

impl<W: Write> SmfWriter<W> {
    /// Validate the header and write it to `sink`.
    pub fn new(mut sink: W, config: SmfWriterConfig) -> Result<Self> {
        let header = SmfHeader::new(config.format, config.track_count, config.time_division)?;
        // SMPTE files count bars against one second per quarter note
        let tpq = match header.division {
            TimeDivision::Metric(tpq) => tpq,
            TimeDivision::Smpte {
                frames_per_second,
                subframes,
            } => u16::from(frames_per_second) * u16::from(subframes),
        };
        let timeline = Timeline::new(tpq)?;
        header.write(&mut sink)?;
        tracing::debug!(
            format = ?header.format,
            tracks = header.tracks,
            division = ?header.division,
            "writing MIDI file"
        );
        Ok(Self {
            sink,
            header,
            writer: MessageWriter::new(
                WriterConfig::new().running_status(config.running_status),
                Framing::File,
            ),
            track: Vec::new(),
            scratch: Vec::new(),
            tracks_written: 0,
            timeline,
        })
    }

    pub fn header(&self) -> &SmfHeader {
        &self.header
    }

    pub fn tracks_written(&self) -> u16 {
        self.tracks_written
    }

    /// Bar cursor of the track being written.
    pub fn timeline(&self) -> &Timeline<Message> {
        &self.timeline
    }

    pub fn get_ref(&self) -> &W {
        &self.sink
    }

    /// Put the next event `ticks` after the previous one.
    pub fn set_delta(&mut self, ticks: u32) -> Result<()> {
        let mut fired = Vec::new();
        self.timeline
            .advance_ticks(ticks, |tl, msg| fire(tl, msg, &mut fired));
        self.emit_all(fired)
    }

    /// Move the cursor by `n_bars` bars and `num / denom` of a whole note.
    pub fn forward(&mut self, n_bars: u32, num: u32, denom: u32) -> Result<()> {
        let mut fired = Vec::new();
        self.timeline
            .forward(n_bars, num, denom, |tl, msg| fire(tl, msg, &mut fired));
        self.emit_all(fired)
    }

    /// Write `msg` at the cursor. An EndOfTrack closes the track.
    pub fn write(&mut self, msg: impl Into<Message>) -> Result<()> {
        let msg = msg.into();
        if msg.is_end_of_track() {
            return self.end_of_track();
        }
        self.check_room()?;
        self.encode_scratch(&msg)?;
        let delta = self.timeline.get_delta();
        self.commit(delta)?;
        Ok(register_signature(&mut self.timeline, &msg)?)
    }

    /// Schedule `msg` at the position `forward(n_bars, num, denom)` would
    /// reach. It is written when the cursor passes that position, or when
    /// the track ends.
    pub fn plan(&mut self, n_bars: u32, num: u32, denom: u32, msg: impl Into<Message>) -> Result<()> {
        let msg = msg.into();
        if msg.is_end_of_track() {
            return Err(Error::InvalidArgument(
                "end of track cannot be planned".into(),
            ));
        }
        // validate now without touching the running status of the track
        self.writer.clone().encode(&msg, &mut Vec::new())?;
        self.timeline.plan(n_bars, num, denom, msg);
        Ok(())
    }

    pub fn tempo(&mut self, bpm: f64) -> Result<()> {
        self.write(Meta::tempo_from_bpm(bpm)?)
    }

    pub fn time_signature(&mut self, numerator: u8, denominator: u8) -> Result<()> {
        self.write(Meta::time_signature(numerator, denominator)?)
    }

    /// Fire pending plans, write EndOfTrack and flush the track chunk.
    pub fn end_of_track(&mut self) -> Result<()> {
        self.check_room()?;
        let mut fired = Vec::new();
        self.timeline
            .drain_plans(|tl, msg| fire(tl, msg, &mut fired));
        self.emit_all(fired)?;

        let eot = Message::Meta(Meta::EndOfTrack);
        self.encode_scratch(&eot)?;
        let delta = self.timeline.get_delta();
        self.commit(delta)?;

        let len = u32::try_from(self.track.len())
            .map_err(|_| Error::InvalidArgument("track chunk exceeds 4 GiB".into()))?;
        ChunkHeader::new(ChunkHeader::TRACK, len).write(&mut self.sink)?;
        self.sink.write_all(&self.track)?;
        tracing::debug!(track = self.tracks_written, bytes = len, "flushed track");

        self.track.clear();
        self.tracks_written += 1;
        self.timeline.reset();
        self.writer.reset_running_status();
        Ok(())
    }

    /// Close a track still being written and check that every declared
    /// track is present.
    pub fn finish(mut self) -> Result<W> {
        if !self.track.is_empty() || self.timeline.pending_plans() > 0 {
            self.end_of_track()?;
        }
        if self.tracks_written < self.header.tracks {
            return Err(Error::MissingTracks {
                declared: self.header.tracks,
                written: self.tracks_written,
            });
        }
        self.sink.flush()?;
        Ok(self.sink)
    }

    fn check_room(&self) -> Result<()> {
        if self.tracks_written >= self.header.tracks {
            return Err(Error::TooManyTracks {
                declared: self.header.tracks,
            });
        }
        Ok(())
    }

    fn emit_all(&mut self, fired: Vec<Fired>) -> Result<()> {
        if fired.is_empty() {
            return Ok(());
        }
        self.check_room()?;
        for (delta, msg, registered) in fired {
            self.encode_scratch(&msg)?;
            self.commit(delta)?;
            registered?;
        }
        Ok(())
    }

    fn encode_scratch(&mut self, msg: &Message) -> Result<()> {
        self.scratch.clear();
        self.writer.encode(msg, &mut self.scratch)
    }

    /// Append the delta and the event already encoded in `scratch`.
    fn commit(&mut self, delta: Option<i64>) -> Result<()> {
        let delta = delta.unwrap_or(0);
        let delta = u32::try_from(delta)
            .map_err(|_| Error::InvalidArgument(format!("delta of {} ticks", delta)))?;
        write_vlq(&mut self.track, delta)?;
        self.track.extend_from_slice(&self.scratch);
        Ok(())
    }
}
