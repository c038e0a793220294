//! Live playback context
//!
//! All times here are on the reference clock. Elapsed time only grows
//! while playing: pausing freezes it and resuming shifts the schedule by
//! the paused duration instead of rebasing it.

use rand::rngs::SmallRng;

use crate::config::TherapyConfig;

use super::pattern::{Pattern, PatternKind};

/// One step of the schedule, ready to dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScheduledStep {
    pub cycle: u32,
    pub index: u8,
    pub primary_finger: u8,
    pub secondary_finger: u8,
    pub duration_ms: u16,
    pub execute_at_us: u64,
}

#[derive(Debug, Clone)]
pub struct TherapySession {
    kind: PatternKind,
    pattern: Pattern,
    step: usize,
    cycles: u32,
    elapsed_us: u64,
    last_tick_us: u64,
    paused_at_us: Option<u64>,
    next_step_at_us: u64,
}

impl TherapySession {
    /// Start playback with the first step at `first_step_at_us`
    pub fn new(
        kind: PatternKind,
        config: &TherapyConfig,
        now_us: u64,
        first_step_at_us: u64,
        rng: &mut SmallRng,
    ) -> Self {
        Self {
            kind,
            pattern: Pattern::generate(kind, config, rng),
            step: 0,
            cycles: 0,
            elapsed_us: 0,
            last_tick_us: now_us,
            paused_at_us: None,
            next_step_at_us: first_step_at_us,
        }
    }

    pub fn kind(&self) -> PatternKind {
        self.kind
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// Completed cycles
    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    /// Playing time so far
    pub fn elapsed_us(&self) -> u64 {
        self.elapsed_us
    }

    pub fn is_paused(&self) -> bool {
        self.paused_at_us.is_some()
    }

    /// Reference time of the next undispatched step
    pub fn next_step_at_us(&self) -> u64 {
        self.next_step_at_us
    }

    /// Add playing time up to `now_us`
    ///
    /// A reference clock that steps back after a resync adds nothing.
    pub fn accumulate(&mut self, now_us: u64) {
        if self.paused_at_us.is_some() {
            return;
        }
        self.elapsed_us += now_us.saturating_sub(self.last_tick_us);
        self.last_tick_us = self.last_tick_us.max(now_us);
    }

    pub fn pause(&mut self, now_us: u64) {
        if self.paused_at_us.is_none() {
            self.accumulate(now_us);
            self.paused_at_us = Some(now_us);
        }
    }

    /// Continue playback, pushing the schedule back by the paused time
    pub fn resume(&mut self, now_us: u64) {
        if let Some(paused_at) = self.paused_at_us.take() {
            let paused_for = now_us.saturating_sub(paused_at);
            self.next_step_at_us = self.next_step_at_us.saturating_add(paused_for);
            self.last_tick_us = self.last_tick_us.max(now_us);
        }
    }

    /// Next step due at or before `horizon_us`, advancing the schedule
    ///
    /// A fresh pattern is generated when a cycle ends.
    pub fn next_due(
        &mut self,
        horizon_us: u64,
        config: &TherapyConfig,
        rng: &mut SmallRng,
    ) -> Option<ScheduledStep> {
        if self.paused_at_us.is_some() || self.next_step_at_us > horizon_us {
            return None;
        }

        let (primary_finger, secondary_finger) = self.pattern.finger_pair(self.step);
        let step = ScheduledStep {
            cycle: self.cycles,
            index: self.step as u8,
            primary_finger,
            secondary_finger,
            duration_ms: self.pattern.on_ms,
            execute_at_us: self.next_step_at_us,
        };

        self.next_step_at_us += self.pattern.step_ms(self.step) as u64 * 1_000;
        self.step += 1;
        if self.step >= self.pattern.len() {
            self.step = 0;
            self.cycles += 1;
            self.pattern = Pattern::generate(self.kind, config, rng);
        }
        Some(step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn session(now: u64) -> (TherapySession, TherapyConfig, SmallRng) {
        let config = TherapyConfig::default();
        let mut rng = SmallRng::seed_from_u64(1);
        let s = TherapySession::new(PatternKind::Sequential, &config, now, now, &mut rng);
        (s, config, rng)
    }

    #[test]
    fn test_elapsed_accumulates_while_playing() {
        let (mut s, _, _) = session(1_000);
        s.accumulate(11_000);
        s.accumulate(21_000);
        assert_eq!(s.elapsed_us(), 20_000);
    }

    #[test]
    fn test_pause_freezes_and_resume_continues() {
        let (mut s, _, _) = session(0);
        s.accumulate(40_000);
        s.pause(50_000);
        assert_eq!(s.elapsed_us(), 50_000);

        s.accumulate(900_000);
        assert_eq!(s.elapsed_us(), 50_000);

        s.resume(1_000_000);
        s.accumulate(1_030_000);
        assert_eq!(s.elapsed_us(), 80_000);
    }

    #[test]
    fn test_clock_step_back_is_ignored() {
        let (mut s, _, _) = session(10_000);
        s.accumulate(20_000);
        s.accumulate(19_500);
        s.accumulate(21_000);
        assert_eq!(s.elapsed_us(), 11_000);
    }

    #[test]
    fn test_steps_follow_pattern_timing() {
        let (mut s, config, mut rng) = session(0);

        let first = s.next_due(0, &config, &mut rng).unwrap();
        assert_eq!(first.execute_at_us, 0);
        assert_eq!((first.primary_finger, first.secondary_finger), (0, 0));

        assert_eq!(s.next_due(166_999, &config, &mut rng), None);
        let second = s.next_due(167_000, &config, &mut rng).unwrap();
        assert_eq!(second.execute_at_us, 167_000);
        assert_eq!(second.index, 1);
    }

    #[test]
    fn test_cycle_wraps_after_relax() {
        let (mut s, config, mut rng) = session(0);
        let mut last = None;
        for _ in 0..5 {
            last = s.next_due(u64::MAX, &config, &mut rng);
        }
        let wrapped = last.unwrap();
        assert_eq!(wrapped.cycle, 1);
        assert_eq!(wrapped.index, 0);
        assert_eq!(wrapped.execute_at_us, 1_336_000);
        assert_eq!(s.cycles(), 1);
    }

    #[test]
    fn test_resume_shifts_schedule() {
        let (mut s, config, mut rng) = session(0);
        s.next_due(0, &config, &mut rng);
        assert_eq!(s.next_step_at_us(), 167_000);

        s.pause(100_000);
        assert_eq!(s.next_due(u64::MAX, &config, &mut rng), None);
        s.resume(600_000);
        assert_eq!(s.next_step_at_us(), 667_000);
    }
}
