//! Error types for legato-core.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Invalid tempo: {0} BPM")]
    InvalidTempo(f64),

    #[error("Invalid time signature: {numerator}/{denominator}")]
    InvalidTimeSignature { numerator: u32, denominator: u32 },

    #[error("Invalid time division: {0} ticks per quarter note")]
    InvalidTicksPerQuarter(u16),
}

pub type Result<T> = core::result::Result<T, Error>;
