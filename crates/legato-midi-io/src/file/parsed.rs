//! In-memory Standard MIDI File.
//!
//! [`ParsedSmf`] holds every track as a list of timed messages, sorted by
//! tick, along with the file's tempo map. Saving goes back through
//! [`SmfWriter`], so a loaded file can be edited and written out again.

use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

use legato_core::TempoMap;
use legato_midi::{DecoderConfig, Message};
use tracing::debug;

use super::header::SmfHeader;
use super::reader::SmfReader;
use super::writer::{SmfWriter, SmfWriterConfig};
use crate::error::{Error, Result};
use crate::event::TimedMessage;

#[derive(Debug, Clone)]
pub struct ParsedSmf {
    pub header: SmfHeader,
    /// Messages per track, in file order. Each track ends with EndOfTrack.
    pub tracks: Vec<Vec<TimedMessage>>,
    /// `None` for SMPTE time division.
    pub tempo_map: Option<TempoMap>,
}

impl ParsedSmf {
    /// Load and parse a MIDI file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        Self::parse(&data)
    }

    /// Parse a MIDI file from bytes
    pub fn parse(data: &[u8]) -> Result<Self> {
        Self::from_reader(data, DecoderConfig::default())
    }

    pub fn from_reader<R: Read>(source: R, config: DecoderConfig) -> Result<Self> {
        let mut reader = SmfReader::with_config(source, config)?;
        let mut tracks: Vec<Vec<TimedMessage>> = Vec::new();
        while let Some(msg) = reader.read_one()? {
            let track = msg.position.map(|p| p.track as usize).unwrap_or(0);
            if tracks.len() <= track {
                tracks.resize_with(track + 1, Vec::new);
            }
            tracks[track].push(msg);
        }

        let header = *reader.header();
        if tracks.len() != header.tracks as usize {
            debug!(
                declared = header.tracks,
                found = tracks.len(),
                "track count differs from header"
            );
        }

        // Tempo changes in later tracks of a format 1 file shift the times
        // of earlier tracks, so recompute them against the complete map.
        let tempo_map = reader.into_tempo_map();
        if let Some(map) = &tempo_map {
            for msg in tracks.iter_mut().flatten() {
                if let Some(ticks) = msg.absolute_ticks() {
                    msg.time = map.time_at(ticks);
                }
            }
        }

        debug!(
            tracks = tracks.len(),
            messages = tracks.iter().map(Vec::len).sum::<usize>(),
            "parsed MIDI file"
        );
        Ok(Self {
            header,
            tracks,
            tempo_map,
        })
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn track(&self, index: usize) -> Option<&[TimedMessage]> {
        self.tracks.get(index).map(Vec::as_slice)
    }

    /// Messages of `track` with `from_tick <= tick < to_tick`.
    pub fn messages_in_range(&self, track: usize, from_tick: u64, to_tick: u64) -> &[TimedMessage] {
        let Some(messages) = self.tracks.get(track) else {
            return &[];
        };
        let tick = |m: &TimedMessage| m.absolute_ticks().unwrap_or(0);
        let start = messages.partition_point(|m| tick(m) < from_tick);
        let end = messages.partition_point(|m| tick(m) < to_tick).max(start);
        &messages[start..end]
    }

    /// Time of the last message across all tracks.
    pub fn duration(&self) -> Duration {
        self.tracks
            .iter()
            .filter_map(|t| t.last())
            .map(|m| m.time)
            .max()
            .unwrap_or(Duration::ZERO)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path.as_ref())?;
        let mut out = std::io::BufWriter::new(file);
        self.write_to(&mut out)?;
        out.flush()?;
        Ok(())
    }

    /// Serialize with running status; each track is closed with exactly one
    /// EndOfTrack.
    pub fn write_to<W: Write>(&self, sink: W) -> Result<W> {
        let tracks = u16::try_from(self.tracks.len())
            .map_err(|_| Error::InvalidArgument(format!("{} tracks", self.tracks.len())))?;
        let config = SmfWriterConfig::new()
            .format(self.header.format)
            .track_count(tracks)
            .time_division(self.header.division);
        let mut writer = SmfWriter::new(sink, config)?;
        for track in &self.tracks {
            let mut last_tick = 0u64;
            for msg in track {
                let tick = msg.absolute_ticks().unwrap_or(last_tick);
                let delta = u32::try_from(tick.saturating_sub(last_tick)).map_err(|_| {
                    Error::InvalidArgument(format!("delta to tick {} too large", tick))
                })?;
                last_tick = last_tick.max(tick);
                writer.set_delta(delta)?;
                // realtime bytes have no file encoding
                if !msg.message.is_end_of_track() && !matches!(msg.message, Message::Realtime(_)) {
                    writer.write(msg.message.clone())?;
                }
            }
            writer.end_of_track()?;
        }
        writer.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::{Format, TimeDivision};
    use approx::assert_relative_eq;
    use legato_midi::{ChannelMessage, Meta, Realtime, Voice};

    fn sample() -> Vec<u8> {
        let config = SmfWriterConfig::new()
            .format(Format::Parallel)
            .track_count(2)
            .ticks_per_quarter(480);
        let mut w = SmfWriter::new(Vec::new(), config).unwrap();
        w.write(Meta::TrackName("tempo".into())).unwrap();
        w.set_delta(960).unwrap();
        w.tempo(60.0).unwrap();
        w.end_of_track().unwrap();
        for i in 0..4u8 {
            w.write(ChannelMessage::note_on(1, 60 + i, 90).unwrap()).unwrap();
            w.set_delta(480).unwrap();
            w.write(ChannelMessage::note_off(1, 60 + i).unwrap()).unwrap();
        }
        w.finish().unwrap()
    }

    #[test]
    fn test_parse_empty_midi() {
        let data = [
            0x4D, 0x54, 0x68, 0x64, 0x00, 0x00, 0x00, 0x06, 0x00, 0x00, 0x00, 0x01, 0x01, 0xE0,
            0x4D, 0x54, 0x72, 0x6B, 0x00, 0x00, 0x00, 0x04, 0x00, 0xFF, 0x2F, 0x00,
        ];
        let file = ParsedSmf::parse(&data).unwrap();
        assert_eq!(file.header.division, TimeDivision::Metric(480));
        assert_eq!(file.track_count(), 1);
        assert_eq!(file.tracks[0].len(), 1);
        assert!(file.tracks[0][0].message.is_end_of_track());
    }

    #[test]
    fn test_later_tempo_track_applies_to_all_tracks() {
        let file = ParsedSmf::parse(&sample()).unwrap();
        assert_eq!(file.track_count(), 2);
        let notes = file.track(1).unwrap();
        // tick 1440: 960 ticks at 120 BPM, then 480 ticks at 60 BPM
        let at_1440 = notes.iter().find(|m| m.absolute_ticks() == Some(1440)).unwrap();
        assert_relative_eq!(at_1440.time.as_secs_f64(), 2.0, epsilon = 1e-9);
        assert_relative_eq!(file.duration().as_secs_f64(), 3.0, epsilon = 1e-9);
    }

    #[test]
    fn test_messages_in_range() {
        let file = ParsedSmf::parse(&sample()).unwrap();
        let range = file.messages_in_range(1, 480, 960);
        // note off of the first note, note on of the second
        assert_eq!(range.len(), 2);
        assert!(range.iter().all(|m| m.absolute_ticks() == Some(480)));
        assert!(file.messages_in_range(1, 5000, 6000).is_empty());
        assert!(file.messages_in_range(7, 0, 100).is_empty());
    }

    #[test]
    fn test_stray_bytes_survive_load_and_save() {
        let data = [
            0x4D, 0x54, 0x68, 0x64, 0x00, 0x00, 0x00, 0x06, 0x00, 0x00, 0x00, 0x01, 0x00, 0x60,
            0x4D, 0x54, 0x72, 0x6B, 0x00, 0x00, 0x00, 0x10, //
            0x00, 0x90, 0x3C, 0x64, //
            0x00, 0xF4, // undefined status
            0x00, 0xF8, // realtime
            0x00, 0x90, 0x3E, 0x64, //
            0x00, 0xFF, 0x2F, 0x00,
        ];
        let file = ParsedSmf::parse(&data).unwrap();
        assert_eq!(file.tracks[0].len(), 3);
        let keys: Vec<_> = file.tracks[0]
            .iter()
            .filter_map(|m| match &m.message {
                Message::Channel(ChannelMessage {
                    voice: Voice::NoteOn { key, .. },
                    ..
                }) => Some(*key),
                _ => None,
            })
            .collect();
        assert_eq!(keys, vec![60, 62]);

        let reparsed = ParsedSmf::parse(&file.write_to(Vec::new()).unwrap()).unwrap();
        assert_eq!(reparsed.tracks, file.tracks);
    }

    #[test]
    fn test_realtime_is_not_written() {
        let mut file = ParsedSmf::parse(&sample()).unwrap();
        let clock = TimedMessage::in_file(
            Message::Realtime(Realtime::Clock),
            file.tracks[1][0].position.unwrap(),
            Duration::ZERO,
        );
        file.tracks[1].insert(1, clock);
        assert_eq!(file.write_to(Vec::new()).unwrap(), sample());
    }

    #[test]
    fn test_write_to_reproduces_bytes() {
        let bytes = sample();
        let file = ParsedSmf::parse(&bytes).unwrap();
        let written = file.write_to(Vec::new()).unwrap();
        assert_eq!(written, bytes);
    }
}
