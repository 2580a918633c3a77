//! MIDI integration tests through the umbrella crate (requires the "io" feature)
//!
//! Tests file authoring, streaming decode and tempo queries end to end,
//! using only what `legato::prelude` exposes.
//!
//! Run with:
//! ```bash
//! cargo test -p legato --test midi_integration
//! ```

#![cfg(feature = "io")]

use approx::assert_relative_eq;
use legato::prelude::*;

/// A one-track groove: two bars of 4/4, then a bar of 7/8 at a new tempo.
fn groove() -> Result<Vec<u8>> {
    let mut writer = SmfWriter::new(Vec::new(), SmfWriterConfig::new().ticks_per_quarter(96))?;
    writer.tempo(120.0)?;
    for _ in 0..2 {
        writer.write(ChannelMessage::note_on(9, 36, 110)?)?;
        writer.plan(0, 1, 16, ChannelMessage::note_off(9, 36)?)?;
        writer.forward(1, 0, 0)?;
    }
    writer.time_signature(7, 8)?;
    writer.tempo(60.0)?;
    writer.write(ChannelMessage::note_on(9, 38, 90)?)?;
    writer.forward(1, 0, 0)?;
    writer.write(ChannelMessage::note_off(9, 38)?)?;
    Ok(writer.finish()?)
}

#[test]
fn test_groove_timing() {
    let song = ParsedSmf::parse(&groove().unwrap()).unwrap();
    assert_eq!(song.track_count(), 1);

    let notes: Vec<(u64, f64)> = song.tracks[0]
        .iter()
        .filter(|m| {
            matches!(
                m.message,
                Message::Channel(ChannelMessage {
                    voice: Voice::NoteOn { .. },
                    ..
                })
            )
        })
        .map(|m| (m.absolute_ticks().unwrap(), m.time.as_secs_f64()))
        .collect();

    assert_eq!(notes.len(), 3);
    assert_eq!(notes[2].0, 2 * 4 * 96);
    // two 4/4 bars at 120 BPM
    assert_relative_eq!(notes[2].1, 4.0, epsilon = 1e-9);
    // 7/8 bar is 336 ticks at 60 BPM
    assert_relative_eq!(song.duration().as_secs_f64(), 4.0 + 3.5, epsilon = 1e-9);
}

#[test]
fn test_wire_decode_with_parameter_dispatch() {
    let bytes: &[u8] = &[
        0xB0, 101, 0, // RPN MSB
        0xF8, // clock between status and data
        100, 0, // RPN LSB, running status
        6, 12, // data entry: pitch bend range
        0x90, 60, 100, // note on
    ];
    let filter = EventFilter::all().without(EventKind::ControlChange);
    let mut dispatcher = Dispatcher::new(ByteStreamDecoder::new(bytes), filter);
    let mut events = Vec::new();
    dispatcher.run(|e: &TimedEvent| events.push(e.event.clone())).unwrap();

    assert_eq!(events.len(), 2);
    assert!(matches!(
        events[0],
        Event::Parameter(ParameterEvent::Entry {
            kind: ParameterKind::Registered,
            id_msb: 0,
            id_lsb: 0,
            ..
        })
    ));
    assert_eq!(events[1].kind(), Some(EventKind::Note));
}

#[test]
fn test_tempo_map_round_trip() {
    let mut map = TempoMap::new(480).unwrap();
    map.record_tempo(960, 90.0).unwrap();
    let t = map.time_at(1920);
    assert_relative_eq!(t.as_secs_f64(), 1.0 + 960.0 / 480.0 * 60.0 / 90.0, epsilon = 1e-9);
    assert_eq!(map.ticks_at(t), 1920);
}

#[test]
fn test_errors_surface_as_umbrella_error() {
    let err: legato::Error = ParsedSmf::parse(b"MThd").unwrap_err().into();
    assert!(matches!(err, legato::Error::Io(_)));
    let err: legato::Error = ChannelMessage::note_on(16, 60, 1).unwrap_err().into();
    assert!(matches!(err, legato::Error::Midi(_)));
}
