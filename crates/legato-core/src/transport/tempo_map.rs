//! Tempo map over absolute ticks.

use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_BPM: f64 = 120.0;

/// One entry of the tempo log: `bpm` holds from `abs_ticks` until the next entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoChange {
    pub abs_ticks: u64,
    pub bpm: f64,
}

impl TempoChange {
    pub const fn new(abs_ticks: u64, bpm: f64) -> Self {
        Self { abs_ticks, bpm }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeSignature {
    pub numerator: u32,
    pub denominator: u32,
}

impl TimeSignature {
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Numerator at least 1, denominator a power of two.
    pub fn validated(numerator: u32, denominator: u32) -> Result<Self> {
        if numerator == 0 || !denominator.is_power_of_two() {
            return Err(Error::InvalidTimeSignature {
                numerator,
                denominator,
            });
        }
        Ok(Self::new(numerator, denominator))
    }

    #[inline]
    pub fn beats_per_bar(&self) -> f64 {
        self.numerator as f64 * 4.0 / self.denominator as f64
    }

    /// Bar length in ticks, never less than one.
    #[inline]
    pub fn ticks_per_bar(&self, ticks_per_quarter: u16) -> i64 {
        let ticks = (ticks_per_quarter as f64 * self.beats_per_bar()).round() as i64;
        ticks.max(1)
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::new(4, 4)
    }
}

/// Seconds spanned by `ticks` at a constant `bpm`.
#[inline]
pub fn duration_secs(bpm: f64, ticks: u64, ticks_per_quarter: u16) -> f64 {
    ticks as f64 * 60.0 / (bpm * ticks_per_quarter as f64)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TempoMap {
    ticks_per_quarter: u16,
    changes: Vec<TempoChange>,
}

impl TempoMap {
    /// An empty map runs at [`DEFAULT_BPM`] from tick 0.
    pub fn new(ticks_per_quarter: u16) -> Result<Self> {
        if ticks_per_quarter == 0 {
            return Err(Error::InvalidTicksPerQuarter(ticks_per_quarter));
        }
        Ok(Self::seeded(ticks_per_quarter))
    }

    /// Caller guarantees a non-zero resolution.
    pub(crate) fn seeded(ticks_per_quarter: u16) -> Self {
        Self {
            ticks_per_quarter,
            changes: vec![TempoChange::new(0, DEFAULT_BPM)],
        }
    }

    pub fn ticks_per_quarter(&self) -> u16 {
        self.ticks_per_quarter
    }

    pub fn changes(&self) -> &[TempoChange] {
        &self.changes
    }

    /// Append a tempo change.
    ///
    /// Ticks are expected in non-decreasing order. An out-of-order entry is
    /// slotted in after every entry at or before its tick, so the log stays
    /// sorted; the later of two entries at one tick wins.
    pub fn record_tempo(&mut self, abs_ticks: u64, bpm: f64) -> Result<()> {
        if !bpm.is_finite() || bpm <= 0.0 {
            return Err(Error::InvalidTempo(bpm));
        }
        let change = TempoChange::new(abs_ticks, bpm);
        match self.changes.last() {
            Some(last) if last.abs_ticks > abs_ticks => {
                let at = self.changes.partition_point(|c| c.abs_ticks <= abs_ticks);
                tracing::trace!(abs_ticks, bpm, "out-of-order tempo change");
                self.changes.insert(at, change);
            }
            _ => self.changes.push(change),
        }
        Ok(())
    }

    /// Tempo in effect at `abs_ticks`.
    pub fn tempo_at(&self, abs_ticks: u64) -> f64 {
        let idx = self.changes.partition_point(|c| c.abs_ticks <= abs_ticks);
        idx.checked_sub(1)
            .map(|i| self.changes[i].bpm)
            .unwrap_or(DEFAULT_BPM)
    }

    pub fn duration(&self, bpm: f64, ticks: u64) -> Duration {
        Duration::from_secs_f64(duration_secs(bpm, ticks, self.ticks_per_quarter))
    }

    /// Wall-clock time from tick 0 to `abs_ticks`.
    pub fn time_at(&self, abs_ticks: u64) -> Duration {
        Duration::from_secs_f64(self.secs_at(abs_ticks))
    }

    fn secs_at(&self, abs_ticks: u64) -> f64 {
        let tpq = self.ticks_per_quarter;
        let mut seconds = 0.0;
        for (i, change) in self.changes.iter().enumerate() {
            if change.abs_ticks > abs_ticks {
                break;
            }
            match self.changes.get(i + 1) {
                Some(next) if next.abs_ticks <= abs_ticks => {
                    seconds += duration_secs(change.bpm, next.abs_ticks - change.abs_ticks, tpq);
                }
                _ => {
                    seconds += duration_secs(change.bpm, abs_ticks - change.abs_ticks, tpq);
                    break;
                }
            }
        }
        seconds
    }

    /// Tick reached after `time` has elapsed from tick 0, rounded to the nearest tick.
    pub fn ticks_at(&self, time: Duration) -> u64 {
        let target = time.as_secs_f64();
        let tpq = self.ticks_per_quarter as f64;
        let mut elapsed = 0.0;

        for (i, change) in self.changes.iter().enumerate() {
            if let Some(next) = self.changes.get(i + 1) {
                let span = duration_secs(change.bpm, next.abs_ticks - change.abs_ticks, self.ticks_per_quarter);
                if elapsed + span < target {
                    elapsed += span;
                    continue;
                }
            }
            let remaining = target - elapsed;
            return change.abs_ticks + (remaining * change.bpm * tpq / 60.0).round() as u64;
        }
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn map(tpq: u16, changes: &[(u64, f64)]) -> TempoMap {
        let mut map = TempoMap::new(tpq).unwrap();
        for &(ticks, bpm) in changes {
            map.record_tempo(ticks, bpm).unwrap();
        }
        map
    }

    #[test]
    fn test_default_tempo() {
        let map = TempoMap::new(480).unwrap();
        assert_abs_diff_eq!(map.time_at(960).as_secs_f64(), 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(map.tempo_at(12345), DEFAULT_BPM);
    }

    #[test]
    fn test_halving_tempo_segments() {
        let map = map(960, &[(0, 120.0), (960, 60.0), (1920, 30.0)]);
        assert_abs_diff_eq!(map.time_at(960).as_secs_f64(), 0.5, epsilon = 1e-9);
        assert_abs_diff_eq!(map.time_at(1920).as_secs_f64(), 1.5, epsilon = 1e-9);
        assert_abs_diff_eq!(map.time_at(2880).as_secs_f64(), 3.5, epsilon = 1e-9);
        // mid-segment
        assert_abs_diff_eq!(map.time_at(1440).as_secs_f64(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_ticks_at_inverts_time_at() {
        let map = map(960, &[(0, 120.0), (960, 60.0), (1920, 30.0)]);
        for ticks in [0, 1, 480, 960, 1500, 1920, 2880, 10_000] {
            assert_eq!(map.ticks_at(map.time_at(ticks)), ticks);
        }
    }

    #[test]
    fn test_tempo_at() {
        let map = map(96, &[(100, 90.0), (200, 140.0)]);
        assert_abs_diff_eq!(map.tempo_at(0), DEFAULT_BPM);
        assert_abs_diff_eq!(map.tempo_at(99), DEFAULT_BPM);
        assert_abs_diff_eq!(map.tempo_at(100), 90.0);
        assert_abs_diff_eq!(map.tempo_at(5000), 140.0);
    }

    #[test]
    fn test_out_of_order_change_keeps_log_sorted() {
        let map = map(96, &[(200, 140.0), (100, 90.0)]);
        let ticks: Vec<u64> = map.changes().iter().map(|c| c.abs_ticks).collect();
        assert_eq!(ticks, vec![0, 100, 200]);
    }

    #[test]
    fn test_same_tick_later_wins() {
        let map = map(96, &[(0, 100.0)]);
        assert_abs_diff_eq!(map.tempo_at(0), 100.0);
    }

    #[test]
    fn test_invalid_input() {
        assert!(TempoMap::new(0).is_err());
        let mut map = TempoMap::new(96).unwrap();
        assert_eq!(map.record_tempo(0, 0.0), Err(Error::InvalidTempo(0.0)));
        assert!(map.record_tempo(0, f64::NAN).is_err());
    }

    #[test]
    fn test_time_signature() {
        let sig = TimeSignature::default();
        assert_eq!(sig.ticks_per_bar(480), 1920);
        assert_eq!(TimeSignature::new(3, 4).ticks_per_bar(480), 1440);
        assert_eq!(TimeSignature::new(6, 8).ticks_per_bar(480), 1440);
        assert!(TimeSignature::validated(0, 4).is_err());
        assert!(TimeSignature::validated(3, 6).is_err());
        assert!(TimeSignature::validated(7, 8).is_ok());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn time_at_never_decreases(
                mut changes in prop::collection::vec((0u64..100_000, 1.0f64..400.0), 0..12),
                a in 0u64..200_000,
                b in 0u64..200_000,
            ) {
                changes.sort_by_key(|c| c.0);
                let map = map(480, &changes);
                let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
                prop_assert!(map.time_at(lo) <= map.time_at(hi));
            }
        }
    }
}
