//! Integration tests for legato-midi-io.
//!
//! These tests exercise multi-component workflows without hardware MIDI devices.

use std::sync::Arc;
use std::time::Duration;

use approx::assert_relative_eq;
use legato_core::ClockTempoEstimator;
use legato_midi::{
    ChannelMessage, DataEntry, DecoderConfig, Message, Meta, ParameterEvent, ParameterKind, SysEx,
    SystemCommon,
};
use legato_midi_io::{
    parameter_change, Driver, DriverRegistry, Event, EventFilter, EventKind, Dispatcher, Format,
    LiveReader, LiveWriter, LoopbackDriver, ParsedSmf, SmfReader, SmfWriter, SmfWriterConfig,
    TimedEvent, WriterConfig,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::TRACE)
        .try_init();
}

fn two_track_song() -> Vec<u8> {
    let config = SmfWriterConfig::new()
        .format(Format::Parallel)
        .track_count(2)
        .ticks_per_quarter(480);
    let mut w = SmfWriter::new(Vec::new(), config).unwrap();
    w.write(Meta::TrackName("conductor".into())).unwrap();
    w.tempo(100.0).unwrap();
    w.time_signature(3, 4).unwrap();
    w.forward(2, 0, 0).unwrap();
    w.tempo(150.0).unwrap();
    w.end_of_track().unwrap();

    w.write(Meta::TrackName("piano".into())).unwrap();
    for (bar, key) in [60u8, 64, 67].into_iter().enumerate() {
        w.write(ChannelMessage::note_on(0, key, 80).unwrap()).unwrap();
        w.plan(0, 1, 4, ChannelMessage::note_off(0, key).unwrap()).unwrap();
        if bar < 2 {
            w.forward(1, 0, 0).unwrap();
        }
    }
    w.write(SysEx::Complete(vec![0x7E, 0x7F, 0x09, 0x01])).unwrap();
    w.write(SystemCommon::SongSelect(3)).unwrap();
    w.finish().unwrap()
}

// ---------------------------------------------------------------------------
// 1. Writer output checked by an independent parser
// ---------------------------------------------------------------------------

#[test]
fn test_written_file_parses_with_midly() {
    init_tracing();
    let bytes = two_track_song();
    let smf = midly::Smf::parse(&bytes).unwrap();
    assert_eq!(smf.header.format, midly::Format::Parallel);
    assert_eq!(smf.header.timing, midly::Timing::Metrical(480.into()));
    assert_eq!(smf.tracks.len(), 2);

    let conductor = &smf.tracks[0];
    let tempos: Vec<u32> = conductor
        .iter()
        .filter_map(|e| match e.kind {
            midly::TrackEventKind::Meta(midly::MetaMessage::Tempo(t)) => Some(t.as_int()),
            _ => None,
        })
        .collect();
    assert_eq!(tempos, vec![600_000, 400_000]);
    // two 3/4 bars before the second tempo
    assert_eq!(conductor[3].delta.as_int(), 2 * 1440);
    assert!(matches!(
        conductor[2].kind,
        midly::TrackEventKind::Meta(midly::MetaMessage::TimeSignature(3, 2, 24, 8))
    ));

    // bars in the second track follow the conductor's 3/4
    let mut tick = 0u32;
    let mut note_ons = Vec::new();
    for e in smf.tracks[1].iter() {
        tick += e.delta.as_int();
        if let midly::TrackEventKind::Midi {
            message: midly::MidiMessage::NoteOn { key, vel },
            ..
        } = e.kind
        {
            if vel.as_int() > 0 {
                note_ons.push((tick, key.as_int()));
            }
        }
    }
    assert_eq!(note_ons, vec![(0, 60), (1440, 64), (2880, 67)]);
    assert!(matches!(
        smf.tracks[1].last().unwrap().kind,
        midly::TrackEventKind::Meta(midly::MetaMessage::EndOfTrack)
    ));
}

#[test]
fn test_streaming_reader_sees_every_event() {
    let bytes = two_track_song();
    let mut reader = SmfReader::new(bytes.as_slice()).unwrap();
    let msgs: Vec<_> = reader.messages().collect::<Result<_, _>>().unwrap();

    assert!(msgs
        .iter()
        .any(|m| m.message == Message::SysEx(SysEx::Complete(vec![0x7E, 0x7F, 0x09, 0x01]))));
    // escaped system common comes back as raw escape bytes
    assert!(msgs
        .iter()
        .any(|m| m.message == Message::SysEx(SysEx::Escape(vec![0xF3, 3]))));
    let ends = msgs.iter().filter(|m| m.message.is_end_of_track()).count();
    assert_eq!(ends, 2);

    let map = reader.tempo_map().unwrap();
    assert_eq!(map.changes().len(), 3);
    assert_relative_eq!(map.tempo_at(2880), 150.0, epsilon = 1e-9);
}

// ---------------------------------------------------------------------------
// 2. Save / load through the filesystem
// ---------------------------------------------------------------------------

#[test]
fn test_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("song.mid");

    let parsed = ParsedSmf::parse(&two_track_song()).unwrap();
    parsed.save(&path).unwrap();
    let loaded = ParsedSmf::load(&path).unwrap();

    assert_eq!(loaded.header, parsed.header);
    assert_eq!(loaded.tracks, parsed.tracks);
    // 2 bars of 3/4 at 100 BPM, then a quarter at 150 BPM
    let last_note_off = loaded.tracks[1]
        .iter()
        .rev()
        .find(|m| matches!(m.message, Message::Channel(_)))
        .unwrap();
    assert_eq!(last_note_off.absolute_ticks(), Some(2880 + 480));
    assert_relative_eq!(
        last_note_off.time.as_secs_f64(),
        6.0 * 0.6 + 0.4,
        epsilon = 1e-9
    );
    assert_relative_eq!(loaded.duration().as_secs_f64(), 4.0, epsilon = 1e-9);
}

// ---------------------------------------------------------------------------
// 3. Live path: writer -> loopback driver -> reader
// ---------------------------------------------------------------------------

#[test]
fn test_live_round_trip_with_clock() {
    init_tracing();
    let registry = DriverRegistry::new();
    let driver = Arc::new(LoopbackDriver::new("loop"));
    driver.create_port("bus");
    registry.register(driver);

    let estimator = Arc::new(ClockTempoEstimator::new());
    let mut reader = LiveReader::open(
        registry.open_input("loop", "bus").unwrap(),
        Arc::clone(&estimator),
        DecoderConfig::default(),
    )
    .unwrap();
    let mut writer = LiveWriter::new(
        registry.open_output("loop", "bus").unwrap(),
        WriterConfig::default(),
    );

    // 100 BPM clock with a note in the middle
    let interval = Duration::from_secs_f64(0.6 / 24.0);
    for i in 0..12u32 {
        writer
            .write(legato_midi::Realtime::Clock, interval * i)
            .unwrap();
        if i == 6 {
            writer
                .write(ChannelMessage::note_on(3, 48, 90).unwrap(), interval * i)
                .unwrap();
        }
    }
    writer
        .write(ChannelMessage::note_off(3, 48).unwrap(), interval * 12)
        .unwrap();

    let on = reader.read_one().unwrap().unwrap();
    assert_eq!(on.message, Message::Channel(ChannelMessage::note_on(3, 48, 90).unwrap()));
    assert_eq!(on.time, interval * 6);
    let off = reader.read_one().unwrap().unwrap();
    assert_eq!(off.message, Message::Channel(ChannelMessage::note_off(3, 48).unwrap()));

    assert_eq!(estimator.pulses(), 12);
    assert_relative_eq!(estimator.bpm().unwrap(), 100.0, epsilon = 1e-4);
    let log = estimator.tempo_map();
    assert_eq!(log.ticks_per_quarter(), 24);

    reader.close();
    assert!(reader.read_one().unwrap().is_none());
}

// ---------------------------------------------------------------------------
// 4. Dispatch over file and live sources
// ---------------------------------------------------------------------------

#[test]
fn test_dispatch_parameters_from_file() {
    let mut w = SmfWriter::new(Vec::new(), SmfWriterConfig::new()).unwrap();
    for msg in parameter_change(0, ParameterKind::Registered, 0, 0, 2, None).unwrap() {
        w.write(msg).unwrap();
    }
    w.write(ChannelMessage::control_change(0, 7, 100).unwrap()).unwrap();
    w.write(ChannelMessage::note_on(0, 60, 1).unwrap()).unwrap();
    let bytes = w.finish().unwrap();

    let filter = EventFilter::only(&[EventKind::Parameter, EventKind::ControlChange]);
    let mut dispatcher = Dispatcher::new(SmfReader::new(bytes.as_slice()).unwrap(), filter);
    let mut events = Vec::new();
    let delivered = dispatcher
        .run(|e: &TimedEvent| events.push(e.event.clone()))
        .unwrap();

    assert_eq!(delivered, 2);
    assert_eq!(
        events,
        vec![
            Event::Parameter(ParameterEvent::Entry {
                channel: 0,
                kind: ParameterKind::Registered,
                id_msb: 0,
                id_lsb: 0,
                entry: DataEntry::Msb(2),
            }),
            Event::Message(ChannelMessage::control_change(0, 7, 100).unwrap().into()),
        ]
    );
}

#[test]
fn test_dispatch_parameter_state_resets_per_track() {
    let config = SmfWriterConfig::new().format(Format::Parallel).track_count(2);
    let mut w = SmfWriter::new(Vec::new(), config).unwrap();
    w.write(ChannelMessage::control_change(0, 99, 1).unwrap()).unwrap();
    w.write(ChannelMessage::control_change(0, 98, 2).unwrap()).unwrap();
    w.end_of_track().unwrap();
    // no identifiers in this track: data entry stays a plain controller
    w.write(ChannelMessage::control_change(0, 6, 9).unwrap()).unwrap();
    let bytes = w.finish().unwrap();

    let filter = EventFilter::only(&[EventKind::Parameter, EventKind::ControlChange]);
    let mut dispatcher = Dispatcher::new(SmfReader::new(bytes.as_slice()).unwrap(), filter);
    let event = dispatcher.next_event().unwrap().unwrap();
    assert_eq!(
        event.event,
        Event::Message(ChannelMessage::control_change(0, 6, 9).unwrap().into())
    );
    assert_eq!(event.position.unwrap().track, 1);
    assert!(dispatcher.next_event().unwrap().is_none());
}

#[test]
fn test_registry_rejects_unknown_driver() {
    let registry = DriverRegistry::new();
    let loopback = Arc::new(LoopbackDriver::new("loop"));
    loopback.create_port("a");
    registry.register(loopback.clone());
    assert_eq!(loopback.inputs().len(), 1);
    assert!(registry.open_input("alsa", "a").is_err());
    assert!(registry.open_output("loop", "missing").is_err());
}
