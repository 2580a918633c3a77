//! Encoding shared by the file and live writers.

use legato_midi::{
    ChannelMessage, Framing, Message, MessageEncoder, ParameterKind, Voice,
};
use legato_midi::controller::{
    CC_DATA_ENTRY_LSB, CC_DATA_ENTRY_MSB, CC_NRPN_LSB, CC_NRPN_MSB, CC_RPN_LSB, CC_RPN_MSB,
};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Omit repeated channel status bytes.
    pub running_status: bool,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            running_status: true,
        }
    }
}

impl WriterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn running_status(mut self, enabled: bool) -> Self {
        self.running_status = enabled;
        self
    }
}

/// Validating message encoder for one output framing.
#[derive(Debug, Clone)]
pub struct MessageWriter {
    encoder: MessageEncoder,
    framing: Framing,
}

impl MessageWriter {
    pub fn new(config: WriterConfig, framing: Framing) -> Self {
        Self {
            encoder: MessageEncoder::new(config.running_status),
            framing,
        }
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    pub fn uses_running_status(&self) -> bool {
        self.encoder.uses_running_status()
    }

    /// Next channel message will carry its status byte.
    pub fn reset_running_status(&mut self) {
        self.encoder.reset();
    }

    /// Append `msg` to `out`. Channels above 15, out-of-range pitchbends and
    /// messages the framing cannot carry are rejected before anything is written.
    pub fn encode(&mut self, msg: &Message, out: &mut Vec<u8>) -> Result<()> {
        let start = out.len();
        if let Err(e) = self.encoder.encode(msg, self.framing, out) {
            out.truncate(start);
            return Err(e.into());
        }
        Ok(())
    }
}

/// Controller messages selecting a registered or non-registered parameter
/// and setting its value. `value_lsb` adds a Data Entry LSB.
pub fn parameter_change(
    channel: u8,
    kind: ParameterKind,
    id_msb: u8,
    id_lsb: u8,
    value_msb: u8,
    value_lsb: Option<u8>,
) -> Result<SmallVec<[ChannelMessage; 4]>> {
    let (msb_cc, lsb_cc) = identifier_controllers(kind);
    let mut messages = SmallVec::new();
    messages.push(ChannelMessage::control_change(channel, msb_cc, id_msb)?);
    messages.push(ChannelMessage::control_change(channel, lsb_cc, id_lsb)?);
    messages.push(ChannelMessage::control_change(channel, CC_DATA_ENTRY_MSB, value_msb)?);
    if let Some(lsb) = value_lsb {
        messages.push(ChannelMessage::control_change(channel, CC_DATA_ENTRY_LSB, lsb)?);
    }
    Ok(messages)
}

/// Null sequence deselecting the current parameter.
pub fn parameter_null(channel: u8, kind: ParameterKind) -> Result<[ChannelMessage; 2]> {
    let (msb_cc, lsb_cc) = identifier_controllers(kind);
    Ok([
        ChannelMessage::control_change(channel, msb_cc, 127)?,
        ChannelMessage::control_change(channel, lsb_cc, 127)?,
    ])
}

/// Pitchbend relative to the center, checked against the 14-bit range.
pub fn pitchbend(channel: u8, value: i16) -> Result<ChannelMessage> {
    Ok(ChannelMessage::new(channel, Voice::pitchbend(value)?)?)
}

fn identifier_controllers(kind: ParameterKind) -> (u8, u8) {
    match kind {
        ParameterKind::Registered => (CC_RPN_MSB, CC_RPN_LSB),
        ParameterKind::NonRegistered => (CC_NRPN_MSB, CC_NRPN_LSB),
    }
}
