//! Error types for the MIDI I/O subsystem.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Midi(#[from] legato_midi::Error),

    #[error(transparent)]
    Time(#[from] legato_core::Error),

    #[error("MIDI parse error: {0}")]
    MidiFileParse(String),

    #[error("A MIDI file needs at least one track")]
    ZeroTracks,

    #[error("Too many tracks: the header declares {declared}")]
    TooManyTracks { declared: u16 },

    #[error("Incomplete file: {written} of {declared} tracks written")]
    MissingTracks { declared: u16, written: u16 },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("MIDI port error: {0}")]
    MidiPort(String),

    #[error("MIDI device error: {0}")]
    MidiDevice(String),
}

pub type Result<T> = std::result::Result<T, Error>;
