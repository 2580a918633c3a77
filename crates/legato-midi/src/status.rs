//! Running status buffer.

/// How a byte resolves against the running status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved {
    /// A channel message. `first_data` is set when the byte was a data byte
    /// reusing the running status rather than a fresh status byte.
    Voice { status: u8, first_data: Option<u8> },
    /// A system common status (`0xF0..=0xF7`). The running status is cleared.
    System(u8),
    /// A realtime byte (`0xF8..=0xFF`). The running status is untouched.
    Realtime(u8),
    /// A data byte with no running status to attach to.
    Discard(u8),
}

/// Single optional status byte.
///
/// Set only by voice status bytes, cleared by system common status bytes,
/// untouched by realtime bytes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunningStatus {
    status: Option<u8>,
}

impl RunningStatus {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn get(&self) -> Option<u8> {
        self.status
    }

    #[inline]
    pub fn clear(&mut self) {
        self.status = None;
    }

    pub fn resolve(&mut self, byte: u8) -> Resolved {
        match byte {
            0x80..=0xEF => {
                self.status = Some(byte);
                Resolved::Voice {
                    status: byte,
                    first_data: None,
                }
            }
            0xF0..=0xF7 => {
                self.status = None;
                Resolved::System(byte)
            }
            0xF8..=0xFF => Resolved::Realtime(byte),
            _ => match self.status {
                Some(status) => Resolved::Voice {
                    status,
                    first_data: Some(byte),
                },
                None => Resolved::Discard(byte),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_empty_and_discards_data() {
        let mut rs = RunningStatus::new();
        assert_eq!(rs.get(), None);
        assert_eq!(rs.resolve(0x3C), Resolved::Discard(0x3C));
    }

    #[test]
    fn test_voice_status_is_reused() {
        let mut rs = RunningStatus::new();
        assert_eq!(
            rs.resolve(0x91),
            Resolved::Voice {
                status: 0x91,
                first_data: None
            }
        );
        assert_eq!(
            rs.resolve(0x40),
            Resolved::Voice {
                status: 0x91,
                first_data: Some(0x40)
            }
        );
    }

    #[test]
    fn test_realtime_leaves_status_alone() {
        let mut rs = RunningStatus::new();
        rs.resolve(0xB2);
        assert_eq!(rs.resolve(0xF8), Resolved::Realtime(0xF8));
        assert_eq!(rs.get(), Some(0xB2));
    }

    #[test]
    fn test_system_common_clears_status() {
        let mut rs = RunningStatus::new();
        rs.resolve(0xB2);
        assert_eq!(rs.resolve(0xF7), Resolved::System(0xF7));
        assert_eq!(rs.get(), None);
        assert_eq!(rs.resolve(0x01), Resolved::Discard(0x01));
    }
}
