//! RPN/NRPN reassembly from raw Control Change traffic.
//!
//! Registered and non-registered parameters are addressed with a pair of
//! identifier controllers (101/100 for RPN, 99/98 for NRPN) followed by data
//! entry controllers (6 MSB, 38 LSB, 96 increment, 97 decrement). Identifiers
//! may arrive in either order; state is kept per channel.

use serde::{Deserialize, Serialize};

pub const CC_DATA_ENTRY_MSB: u8 = 6;
pub const CC_DATA_ENTRY_LSB: u8 = 38;
pub const CC_DATA_INCREMENT: u8 = 96;
pub const CC_DATA_DECREMENT: u8 = 97;
pub const CC_NRPN_LSB: u8 = 98;
pub const CC_NRPN_MSB: u8 = 99;
pub const CC_RPN_LSB: u8 = 100;
pub const CC_RPN_MSB: u8 = 101;

/// Both identifier values at 127 form the Null/Reset sequence.
const NULL_SUM: u16 = 254;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParameterKind {
    Registered,
    NonRegistered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataEntry {
    Msb(u8),
    Lsb(u8),
    Increment,
    Decrement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParameterEvent {
    /// Data entry for the parameter selected by `id_msb`/`id_lsb`.
    Entry {
        channel: u8,
        kind: ParameterKind,
        id_msb: u8,
        id_lsb: u8,
        entry: DataEntry,
    },
    /// Null sequence (both identifiers 127): the selection was cleared.
    Reset { channel: u8, kind: ParameterKind },
}

impl ParameterEvent {
    pub fn channel(&self) -> u8 {
        match self {
            ParameterEvent::Entry { channel, .. } | ParameterEvent::Reset { channel, .. } => {
                *channel
            }
        }
    }
}

/// What a Control Change turned into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControllerOutput {
    /// Plain controller change, passed through untouched.
    Change {
        channel: u8,
        controller: u8,
        value: u8,
    },
    Parameter(ParameterEvent),
}

// Slot layout: [first id controller, second id controller, first id value, second id value]
const FIRST_CC: usize = 0;
const SECOND_CC: usize = 1;
const FIRST_VAL: usize = 2;
const SECOND_VAL: usize = 3;

#[derive(Debug, Clone)]
pub struct ControllerAggregator {
    enabled: bool,
    channels: [[u8; 4]; 16],
}

impl Default for ControllerAggregator {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ControllerAggregator {
    /// With `enabled == false` every controller passes through unchanged.
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            channels: [[0; 4]; 16],
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        self.reset();
    }

    /// Clear every channel, as on stream (re)start.
    pub fn reset(&mut self) {
        self.channels = [[0; 4]; 16];
    }

    /// Parameter family currently selected on a channel, with its identifier values.
    pub fn pending(&self, channel: u8) -> Option<(ParameterKind, u8, u8)> {
        let slots = &self.channels[(channel & 0x0F) as usize];
        selected_kind(slots).map(|kind| (kind, slots[FIRST_VAL], slots[SECOND_VAL]))
    }

    /// Feed one Control Change. Identifier controllers are absorbed and yield `None`.
    pub fn process(&mut self, channel: u8, controller: u8, value: u8) -> Option<ControllerOutput> {
        let change = ControllerOutput::Change {
            channel,
            controller,
            value,
        };
        if !self.enabled {
            return Some(change);
        }

        let slots = &mut self.channels[(channel & 0x0F) as usize];
        match controller {
            CC_RPN_MSB | CC_NRPN_MSB => {
                record_identifier(slots, channel, controller, value, FIRST_CC, FIRST_VAL, SECOND_VAL)
            }
            CC_RPN_LSB | CC_NRPN_LSB => {
                record_identifier(slots, channel, controller, value, SECOND_CC, SECOND_VAL, FIRST_VAL)
            }
            CC_DATA_ENTRY_MSB | CC_DATA_ENTRY_LSB | CC_DATA_INCREMENT | CC_DATA_DECREMENT => {
                let Some(kind) = selected_kind(slots) else {
                    return Some(change);
                };
                let entry = match controller {
                    CC_DATA_ENTRY_MSB => DataEntry::Msb(value),
                    CC_DATA_ENTRY_LSB => DataEntry::Lsb(value),
                    CC_DATA_INCREMENT => DataEntry::Increment,
                    _ => DataEntry::Decrement,
                };
                Some(ControllerOutput::Parameter(ParameterEvent::Entry {
                    channel,
                    kind,
                    id_msb: slots[FIRST_VAL],
                    id_lsb: slots[SECOND_VAL],
                    entry,
                }))
            }
            _ => Some(change),
        }
    }
}

fn record_identifier(
    slots: &mut [u8; 4],
    channel: u8,
    controller: u8,
    value: u8,
    cc_slot: usize,
    val_slot: usize,
    other_val_slot: usize,
) -> Option<ControllerOutput> {
    if slots[other_val_slot] as u16 + value as u16 == NULL_SUM {
        let kind = match controller {
            CC_RPN_MSB | CC_RPN_LSB => ParameterKind::Registered,
            _ => ParameterKind::NonRegistered,
        };
        *slots = [0; 4];
        tracing::trace!(channel, ?kind, "parameter null sequence");
        return Some(ControllerOutput::Parameter(ParameterEvent::Reset {
            channel,
            kind,
        }));
    }
    slots[cc_slot] = controller;
    slots[val_slot] = value;
    None
}

fn selected_kind(slots: &[u8; 4]) -> Option<ParameterKind> {
    match (slots[FIRST_CC], slots[SECOND_CC]) {
        (CC_RPN_MSB, CC_RPN_LSB) => Some(ParameterKind::Registered),
        (CC_NRPN_MSB, CC_NRPN_LSB) => Some(ParameterKind::NonRegistered),
        _ => None,
    }
}
