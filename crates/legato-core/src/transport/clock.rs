//! Tempo estimation from incoming MIDI clock (0xF8) pulses.

use core::time::Duration;

use parking_lot::Mutex;

use super::tempo_map::TempoMap;

/// MIDI clock resolution.
pub const CLOCKS_PER_QUARTER: u16 = 24;

/// BPM from four consecutive clock timestamps.
///
/// Three clock intervals are taken as one 32nd note, so the estimate is
/// `60 / (sum * 8)`. Returns `None` when the timestamps go backwards or do
/// not advance.
pub fn tempo_from_clocks(timestamps: [Duration; 4]) -> Option<f64> {
    let [t0, t1, t2, t3] = timestamps;
    let sum = t1.checked_sub(t0)? + t2.checked_sub(t1)? + t3.checked_sub(t2)?;
    if sum.is_zero() {
        return None;
    }
    Some(60.0 / (sum.as_secs_f64() * 8.0))
}

#[derive(Debug)]
struct ClockState {
    /// Previous three timestamps, oldest first.
    ring: [Duration; 3],
    filled: usize,
    pulses: u64,
    bpm: Option<f64>,
    tempo_map: TempoMap,
}

impl ClockState {
    fn new() -> Self {
        Self {
            ring: [Duration::ZERO; 3],
            filled: 0,
            pulses: 0,
            bpm: None,
            tempo_map: TempoMap::seeded(CLOCKS_PER_QUARTER),
        }
    }
}

/// Shared clock tracker.
///
/// Clock pulses usually arrive on a driver thread while the tempo is read
/// elsewhere, so the ring buffer sits behind a mutex and the estimator is
/// used through `&self`.
#[derive(Debug)]
pub struct ClockTempoEstimator {
    state: Mutex<ClockState>,
}

impl Default for ClockTempoEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockTempoEstimator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ClockState::new()),
        }
    }

    /// Register one clock pulse; returns the current estimate once four
    /// pulses have been seen.
    pub fn observe_clock(&self, timestamp: Duration) -> Option<f64> {
        let mut state = self.state.lock();
        let estimate = if state.filled == state.ring.len() {
            let [t0, t1, t2] = state.ring;
            tempo_from_clocks([t0, t1, t2, timestamp])
        } else {
            None
        };

        state.ring.rotate_left(1);
        state.ring[2] = timestamp;
        state.filled = (state.filled + 1).min(3);
        let tick = state.pulses;
        state.pulses += 1;

        if let Some(bpm) = estimate {
            let changed = state
                .bpm
                .map(|prev| (prev * 100.0).round() != (bpm * 100.0).round())
                .unwrap_or(true);
            if changed {
                tracing::trace!(tick, bpm, "clock tempo changed");
                // bpm is finite and positive here
                let _ = state.tempo_map.record_tempo(tick, bpm);
            }
            state.bpm = Some(bpm);
        }
        state.bpm
    }

    /// Latest estimate, if enough pulses have arrived.
    pub fn bpm(&self) -> Option<f64> {
        self.state.lock().bpm
    }

    /// Pulses observed so far.
    pub fn pulses(&self) -> u64 {
        self.state.lock().pulses
    }

    /// Forget buffered timestamps, e.g. after a Stop. The tempo log is kept.
    pub fn restart(&self) {
        let mut state = self.state.lock();
        state.filled = 0;
        state.ring = [Duration::ZERO; 3];
    }

    /// Copy of the tempo log, in clock pulses (24 per quarter note).
    pub fn tempo_map(&self) -> TempoMap {
        self.state.lock().tempo_map.clone()
    }
}
