//! MIDI I/O for legato.
//!
//! Standard MIDI File reading and writing, live input and output over an
//! abstract port layer, and typed event dispatch.
//!
//! # Example
//!
//! ```
//! use legato_midi::ChannelMessage;
//! use legato_midi_io::{ParsedSmf, SmfWriter, SmfWriterConfig};
//!
//! let mut writer = SmfWriter::new(Vec::new(), SmfWriterConfig::new().ticks_per_quarter(96))?;
//! writer.tempo(90.0)?;
//! writer.write(ChannelMessage::note_on(0, 60, 100)?)?;
//! writer.forward(0, 1, 4)?;
//! writer.write(ChannelMessage::note_off(0, 60)?)?;
//! let bytes = writer.finish()?;
//!
//! let file = ParsedSmf::parse(&bytes)?;
//! assert_eq!(file.tracks[0].len(), 4);
//! # Ok::<(), legato_midi_io::Error>(())
//! ```

pub mod error;
pub use error::{Error, Result};

mod event;
pub use event::{Position, TimedMessage};

mod writer;
pub use writer::{parameter_change, parameter_null, pitchbend, MessageWriter, WriterConfig};

pub mod file;
pub use file::{Format, ParsedSmf, SmfHeader, SmfReader, SmfWriter, SmfWriterConfig, TimeDivision};

pub mod port;
pub use port::{
    Driver, DriverRegistry, InputListener, ListenerId, LoopbackDriver, MidiIn, MidiOut, PortInfo,
    PortType,
};

mod live;
pub use live::{CloseHandle, LiveReader, LiveWriter};

mod dispatch;
pub use dispatch::{
    Dispatcher, Event, EventFilter, EventKind, Handler, MessageSource, TimedEvent,
};
