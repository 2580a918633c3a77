//! Centralized error type for the legato umbrella crate.
//!
//! Wraps all subsystem errors so `?` propagates naturally across crate boundaries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("MIDI: {0}")]
    Midi(#[from] legato_midi::Error),

    #[error("Time: {0}")]
    Core(#[from] legato_core::Error),

    #[cfg(feature = "io")]
    #[error("MIDI I/O: {0}")]
    Io(#[from] legato_midi_io::Error),

    #[error(transparent)]
    Std(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "io")]
    fn load(bytes: &[u8]) -> Result<usize> {
        let song = legato_midi_io::ParsedSmf::parse(bytes)?;
        Ok(song.track_count())
    }

    #[test]
    fn test_subsystem_errors_convert() {
        assert!(matches!(
            legato_midi::Meta::tempo_from_bpm(-1.0).map_err(Error::from),
            Err(Error::Midi(_))
        ));
        assert!(matches!(
            legato_core::TempoMap::new(0).map_err(Error::from),
            Err(Error::Core(_))
        ));
        #[cfg(feature = "io")]
        assert!(matches!(load(b"RIFF"), Err(Error::Io(_))));
    }
}
