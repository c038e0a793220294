//! Finger activation patterns
//!
//! One pattern is one cycle: every finger on each hand fires once, each
//! burst followed by its off-time, then the relax interval.

use heapless::Vec;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::Rng;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::config::{TherapyConfig, MAX_FINGERS};

/// Pattern families, numbered as on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum PatternKind {
    /// Each hand gets its own shuffle every cycle
    #[default]
    RandomPermutation,
    /// Fingers in index order on both hands
    Sequential,
    /// One shuffle per cycle, same finger on both hands
    Mirrored,
}

impl PatternKind {
    pub fn to_byte(self) -> u8 {
        match self {
            PatternKind::RandomPermutation => 0,
            PatternKind::Sequential => 1,
            PatternKind::Mirrored => 2,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(PatternKind::RandomPermutation),
            1 => Some(PatternKind::Sequential),
            2 => Some(PatternKind::Mirrored),
            _ => None,
        }
    }
}

/// One generated cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    pub primary: Vec<u8, MAX_FINGERS>,
    pub secondary: Vec<u8, MAX_FINGERS>,
    /// Off-time after each step, jitter applied
    pub off_ms: Vec<u16, MAX_FINGERS>,
    pub on_ms: u16,
    pub relax_ms: u16,
}

impl Pattern {
    /// Build one cycle for `kind`
    ///
    /// Finger count is clamped to `1..=MAX_FINGERS`.
    pub fn generate(kind: PatternKind, config: &TherapyConfig, rng: &mut SmallRng) -> Self {
        let fingers = config.fingers.clamp(1, MAX_FINGERS as u8);
        let mut primary: Vec<u8, MAX_FINGERS> = (0..fingers).collect();
        let mut secondary = primary.clone();

        match kind {
            PatternKind::Sequential => {}
            PatternKind::RandomPermutation => {
                primary.shuffle(rng);
                secondary.shuffle(rng);
            }
            PatternKind::Mirrored => {
                primary.shuffle(rng);
                secondary = primary.clone();
            }
        }

        let off_ms = (0..fingers)
            .map(|_| jittered(config.burst_off_ms, config.jitter_percent, rng))
            .collect();

        Self {
            primary,
            secondary,
            off_ms,
            on_ms: config.burst_on_ms,
            relax_ms: config.relax_ms,
        }
    }

    pub fn len(&self) -> usize {
        self.primary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primary.is_empty()
    }

    /// Fingers for step `index` as (PRIMARY, SECONDARY); (0, 0) out of range
    pub fn finger_pair(&self, index: usize) -> (u8, u8) {
        match (self.primary.get(index), self.secondary.get(index)) {
            (Some(&p), Some(&s)) => (p, s),
            _ => (0, 0),
        }
    }

    /// Time from step `index` start to the next step start
    pub fn step_ms(&self, index: usize) -> u32 {
        let off = self.off_ms.get(index).copied().unwrap_or(0) as u32;
        let relax = if index + 1 == self.len() {
            self.relax_ms as u32
        } else {
            0
        };
        self.on_ms as u32 + off + relax
    }

    /// Whole cycle including the relax interval
    pub fn duration_ms(&self) -> u32 {
        (0..self.len()).map(|i| self.step_ms(i)).sum()
    }
}

/// Off-time varied uniformly by up to `percent` either way
fn jittered(off_ms: u16, percent: u8, rng: &mut SmallRng) -> u16 {
    let span = off_ms as u32 * percent.min(100) as u32 / 100;
    if span == 0 {
        return off_ms;
    }
    let low = off_ms as u32 - span;
    rng.gen_range(low..=off_ms as u32 + span).min(u16::MAX as u32) as u16
}
