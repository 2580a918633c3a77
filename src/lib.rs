//! # Legato - MIDI protocol toolkit
//!
//! Decoding, encoding and timing of MIDI traffic, built from modular subsystems.
//!
//! ## Architecture
//!
//! Legato is an umbrella crate that coordinates:
//! - **legato-midi** - Wire protocol (messages, VLQ, byte-stream decoder, RPN/NRPN)
//! - **legato-core** - Musical time (tempo maps, bar cursors, clock tempo estimation)
//! - **legato-midi-io** - Standard MIDI Files, live ports and event dispatch
//!
//! ## Quick Start
//!
//! ```
//! use legato::prelude::*;
//!
//! let mut writer = SmfWriter::new(Vec::new(), SmfWriterConfig::new())?;
//! writer.tempo(150.0)?;
//! writer.write(ChannelMessage::note_on(9, 36, 127)?)?;
//! writer.plan(0, 1, 8, ChannelMessage::note_off(9, 36)?)?;
//! writer.forward(1, 0, 0)?;
//! let bytes = writer.finish()?;
//!
//! let song = ParsedSmf::parse(&bytes)?;
//! let map = song.tempo_map.as_ref().expect("metric file");
//! assert_eq!(map.tempo_at(0), 150.0);
//! # Ok::<(), legato::Error>(())
//! ```
//!
//! ## Feature Flags
//!
//! - `default` - Everything below
//! - `io` - Standard MIDI Files, live ports and dispatch

/// Re-export of legato-core for direct access
pub use legato_core as core;

/// Re-export of legato-midi for direct access
pub use legato_midi as midi;

/// MIDI I/O subsystem
#[cfg(feature = "io")]
pub use legato_midi_io as io;

// Time
pub use legato_core::{ClockTempoEstimator, TempoMap, TimeSignature, Timeline};

// Protocol
pub use legato_midi::{
    ByteStreamDecoder, ChannelMessage, ControllerAggregator, DecoderConfig, Message, Meta,
    ParameterEvent, Realtime, SysEx, SystemCommon, Voice,
};

mod error;
pub use error::{Error, Result};

/// Convenience prelude for common imports
pub mod prelude {
    // Protocol
    pub use crate::midi::{
        ByteStreamDecoder, ChannelMessage, DecoderConfig, Message, Meta, ParameterEvent,
        ParameterKind, Realtime, SysEx, Voice,
    };

    // Time
    pub use crate::core::{ClockTempoEstimator, TempoMap, Timeline};

    // Files
    #[cfg(feature = "io")]
    pub use crate::io::{Format, ParsedSmf, SmfReader, SmfWriter, SmfWriterConfig, TimeDivision};

    // Live ports and dispatch
    #[cfg(feature = "io")]
    pub use crate::io::{
        Dispatcher, DriverRegistry, Event, EventFilter, EventKind, LiveReader, LiveWriter,
        TimedEvent,
    };

    pub use crate::{Error, Result};
}
