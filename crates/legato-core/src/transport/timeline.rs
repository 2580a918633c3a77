//! Bar-aware write cursor.
//!
//! The cursor only moves forward. Moving it by bars respects the time
//! signature in effect at each bar boundary; fractional moves are expressed
//! as note values (`num / denom` of a whole note). Payloads can be planned
//! at a future position and are handed back, in tick order, when the cursor
//! passes them.

use serde::{Deserialize, Serialize};

use super::tempo_map::TimeSignature;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureChange {
    pub abs_ticks: i64,
    pub signature: TimeSignature,
}

#[derive(Debug, Clone)]
struct Plan<T> {
    at: i64,
    payload: T,
}

#[derive(Debug, Clone)]
pub struct Timeline<T = ()> {
    ticks_per_quarter: u16,
    cursor: i64,
    last_emitted: i64,
    signatures: Vec<SignatureChange>,
    /// Sorted by tick, insertion order within a tick.
    plans: Vec<Plan<T>>,
}

impl<T> Timeline<T> {
    pub fn new(ticks_per_quarter: u16) -> Result<Self> {
        if ticks_per_quarter == 0 {
            return Err(Error::InvalidTicksPerQuarter(ticks_per_quarter));
        }
        Ok(Self {
            ticks_per_quarter,
            cursor: 0,
            last_emitted: 0,
            signatures: Vec::new(),
            plans: Vec::new(),
        })
    }

    pub fn ticks_per_quarter(&self) -> u16 {
        self.ticks_per_quarter
    }

    pub fn cursor(&self) -> i64 {
        self.cursor
    }

    pub fn last_emitted(&self) -> i64 {
        self.last_emitted
    }

    pub fn signatures(&self) -> &[SignatureChange] {
        &self.signatures
    }

    pub fn pending_plans(&self) -> usize {
        self.plans.len()
    }

    /// Register a time signature change at the cursor. A change already at
    /// this tick is replaced.
    pub fn set_time_signature(&mut self, numerator: u32, denominator: u32) -> Result<()> {
        let signature = TimeSignature::validated(numerator, denominator)?;
        let change = SignatureChange {
            abs_ticks: self.cursor,
            signature,
        };
        let at = self
            .signatures
            .partition_point(|c| c.abs_ticks < self.cursor);
        match self.signatures.get_mut(at) {
            Some(existing) if existing.abs_ticks == self.cursor => *existing = change,
            _ => self.signatures.insert(at, change),
        }
        tracing::trace!(tick = self.cursor, numerator, denominator, "time signature");
        Ok(())
    }

    /// Most recent change at or before `abs_ticks`, or 4/4 from tick 0.
    pub fn signature_change_at(&self, abs_ticks: i64) -> SignatureChange {
        let idx = self.signatures.partition_point(|c| c.abs_ticks <= abs_ticks);
        idx.checked_sub(1)
            .map(|i| self.signatures[i])
            .unwrap_or(SignatureChange {
                abs_ticks: 0,
                signature: TimeSignature::default(),
            })
    }

    pub fn time_signature_at(&self, abs_ticks: i64) -> TimeSignature {
        self.signature_change_at(abs_ticks).signature
    }

    /// Ticks of `num / denom` whole notes, rounded to the nearest tick.
    pub fn note_ticks(&self, num: u32, denom: u32) -> i64 {
        if num == 0 || denom == 0 {
            return 0;
        }
        (self.ticks_per_quarter as f64 * 4.0 * num as f64 / denom as f64).round() as i64
    }

    /// Position `forward(n_bars, num, denom)` would move the cursor to under
    /// the signatures registered so far.
    pub fn target(&self, n_bars: u32, num: u32, denom: u32) -> i64 {
        let mut pos = self.cursor;
        for _ in 0..n_bars {
            let change = self.signature_change_at(pos);
            let bar = change.signature.ticks_per_bar(self.ticks_per_quarter);
            let offset = pos - change.abs_ticks;
            let bar_start = change.abs_ticks + offset.div_euclid(bar) * bar;
            let next_bar = self
                .time_signature_at(bar_start)
                .ticks_per_bar(self.ticks_per_quarter);
            pos = bar_start + next_bar;
        }
        pos + self.note_ticks(num, denom)
    }

    /// Advance by `n_bars` bar boundaries, then by `num / denom` of a whole
    /// note. Plans falling due are passed to `on_plan` in tick order with the
    /// cursor sitting on their position. Bars are stepped one at a time, so a
    /// signature registered from `on_plan` shapes the bars after it.
    pub fn forward<F>(&mut self, n_bars: u32, num: u32, denom: u32, mut on_plan: F)
    where
        F: FnMut(&mut Self, T),
    {
        for _ in 0..n_bars {
            let next_bar = self.target(1, 0, 0);
            self.move_to(next_bar, &mut on_plan);
        }
        let target = self.cursor + self.note_ticks(num, denom);
        self.move_to(target, &mut on_plan);
    }

    /// Advance by a raw tick count.
    pub fn advance_ticks<F>(&mut self, ticks: u32, mut on_plan: F)
    where
        F: FnMut(&mut Self, T),
    {
        let target = self.cursor + i64::from(ticks);
        self.move_to(target, &mut on_plan);
    }

    fn move_to<F>(&mut self, target: i64, on_plan: &mut F)
    where
        F: FnMut(&mut Self, T),
    {
        while let Some(plan) = self.pop_due(target) {
            self.cursor = self.cursor.max(plan.at);
            on_plan(self, plan.payload);
        }
        self.cursor = self.cursor.max(target);
    }

    fn pop_due(&mut self, target: i64) -> Option<Plan<T>> {
        match self.plans.first() {
            Some(plan) if plan.at <= target => Some(self.plans.remove(0)),
            _ => None,
        }
    }

    /// Schedule `payload` at the position `forward(n_bars, num, denom)`
    /// would reach from the current cursor.
    pub fn plan(&mut self, n_bars: u32, num: u32, denom: u32, payload: T) {
        let at = self.target(n_bars, num, denom);
        self.plan_at(at, payload);
    }

    pub fn plan_at(&mut self, abs_ticks: i64, payload: T) {
        let idx = self.plans.partition_point(|p| p.at <= abs_ticks);
        self.plans.insert(
            idx,
            Plan {
                at: abs_ticks,
                payload,
            },
        );
    }

    /// Fire every remaining plan in tick order, moving the cursor as needed.
    pub fn drain_plans<F>(&mut self, mut on_plan: F)
    where
        F: FnMut(&mut Self, T),
    {
        if let Some(last) = self.plans.last().map(|p| p.at) {
            self.move_to(last.max(self.cursor), &mut on_plan);
        }
    }

    /// Ticks since the last emitted event, marking the cursor as emitted.
    ///
    /// `None` if the cursor is behind the last emitted position; the
    /// emitted mark is resynchronized to the cursor in that case.
    pub fn get_delta(&mut self) -> Option<i64> {
        let delta = self.cursor - self.last_emitted;
        self.last_emitted = self.cursor;
        if delta < 0 {
            tracing::warn!(
                cursor = self.cursor,
                delta,
                "bar cursor behind last emitted event, resynchronized"
            );
            return None;
        }
        Some(delta)
    }

    /// Restart at tick 0 for a new track. Time signatures are kept; pending
    /// plans are dropped.
    pub fn reset(&mut self) {
        if !self.plans.is_empty() {
            tracing::debug!(dropped = self.plans.len(), "discarding pending plans");
        }
        self.cursor = 0;
        self.last_emitted = 0;
        self.plans.clear();
    }
}
