//! Tempo, meter and clock tracking.

mod clock;
mod tempo_map;
mod timeline;

pub use clock::{tempo_from_clocks, ClockTempoEstimator, CLOCKS_PER_QUARTER};
pub use tempo_map::{TempoChange, TempoMap, TimeSignature, DEFAULT_BPM};
pub use timeline::{SignatureChange, Timeline};
