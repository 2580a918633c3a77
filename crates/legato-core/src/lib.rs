//! Musical time for legato.
//!
//! - [`TempoMap`]: ordered tempo changes, tick/time conversion
//! - [`Timeline`]: bar-aware tick cursor with time signatures and plans
//! - [`ClockTempoEstimator`]: tempo from incoming MIDI clock pulses
//!
//! # Example
//!
//! ```
//! use legato_core::TempoMap;
//!
//! let mut map = TempoMap::new(960)?;
//! map.record_tempo(960, 60.0)?;
//! assert_eq!(map.time_at(1920).as_millis(), 1500);
//! # Ok::<(), legato_core::Error>(())
//! ```

pub mod error;
pub use error::{Error, Result};

pub mod transport;
pub use transport::{
    tempo_from_clocks, ClockTempoEstimator, SignatureChange, TempoChange, TempoMap,
    TimeSignature, Timeline, CLOCKS_PER_QUARTER, DEFAULT_BPM,
};
