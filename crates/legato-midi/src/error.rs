//! Error types for the MIDI protocol layer.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("MIDI channel {0} out of range (0-15)")]
    InvalidChannel(u8),

    #[error("Pitchbend value {0} out of range (-8192..=8191)")]
    PitchbendOutOfRange(i16),

    #[error("Data byte {0:#04x} exceeds 7 bits")]
    InvalidDataByte(u8),

    #[error("Variable-length quantity {0:#x} exceeds 0x0FFFFFFF")]
    VlqOverflow(u32),

    #[error("Malformed variable-length quantity")]
    MalformedVlq,

    #[error("Invalid chunk: {0}")]
    InvalidChunk(String),

    #[error("{0} cannot be encoded in this context")]
    Unencodable(&'static str),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, Error>;
