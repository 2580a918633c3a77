//! MIDI wire protocol for legato.
//!
//! Message model, variable-length quantities and chunk headers, the live
//! byte-stream decoder (running status, realtime interruption, sysex
//! reassembly) and RPN/NRPN aggregation over Control Change traffic.
//!
//! # Example
//!
//! ```
//! use legato_midi::{ByteStreamDecoder, Message};
//!
//! // Note on, then a second note on reusing running status.
//! let bytes: &[u8] = &[0x90, 60, 100, 64, 100];
//! let mut decoder = ByteStreamDecoder::new(bytes);
//! let mut count = 0;
//! while let Some(msg) = decoder.read_one()? {
//!     assert!(matches!(msg, Message::Channel(_)));
//!     count += 1;
//! }
//! assert_eq!(count, 2);
//! # Ok::<(), legato_midi::Error>(())
//! ```

pub mod error;
pub use error::{Error, Result};

pub mod message;
pub use message::{
    channel_data_len, meta_type, ChannelMessage, Message, Meta, Realtime, SysEx, SystemCommon,
    Voice, PITCHBEND_CENTER,
};

pub mod vlq;
pub use vlq::{decode_vlq, encode_vlq, read_vlq, write_vlq, ChunkHeader, VLQ_MAX};

pub mod status;
pub use status::{Resolved, RunningStatus};

pub mod sysex;
pub use sysex::{SysExReassembler, SysExState, Termination};

pub mod decoder;
pub use decoder::{ByteStreamDecoder, DecoderConfig, RealtimeHandler};

pub mod encoder;
pub use encoder::{Framing, MessageEncoder};

pub mod controller;
pub use controller::{ControllerAggregator, ControllerOutput, DataEntry, ParameterEvent, ParameterKind};
