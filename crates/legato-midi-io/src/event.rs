//! Messages with their timing.

use std::time::Duration;

use legato_midi::Message;
use serde::{Deserialize, Serialize};

/// Where a message sits inside a Standard MIDI File.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    pub track: u16,
    pub delta_ticks: u32,
    pub absolute_ticks: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedMessage {
    pub message: Message,
    /// Set for file data, `None` for live data.
    pub position: Option<Position>,
    /// File data: time from the start of the track through the tempo map.
    /// Live data: driver timestamp.
    pub time: Duration,
}

impl TimedMessage {
    pub fn live(message: Message, time: Duration) -> Self {
        Self {
            message,
            position: None,
            time,
        }
    }

    pub fn in_file(message: Message, position: Position, time: Duration) -> Self {
        Self {
            message,
            position: Some(position),
            time,
        }
    }

    #[inline]
    pub fn absolute_ticks(&self) -> Option<u64> {
        self.position.map(|p| p.absolute_ticks)
    }
}
