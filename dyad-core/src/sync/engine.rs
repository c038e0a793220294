//! Clock offset estimation
//!
//! A sync session collects up to `probe_count` round trips, discards the
//! ones slower than the per-probe timeout and settles on the median of the
//! remaining offset estimates. After that, single maintenance probes nudge
//! the offset with a slow EMA and track drift.

use heapless::Vec;

use crate::config::{SyncConfig, MAX_PROBES};
use crate::metrics::{LatencyMetrics, SyncConfidence};

use super::probe::{ClockOffset, SyncProbe};

/// Minimum spacing of maintenance samples for a drift-rate update
const DRIFT_MIN_INTERVAL_US: u64 = 100_000;

/// Offset EMA weight of a new measurement (1/10)
const OFFSET_EMA_NUM: i64 = 1;
const OFFSET_EMA_DEN: i64 = 10;

/// Drift-rate EMA weight of a new measurement
const DRIFT_EMA_ALPHA: f32 = 0.3;

/// Sync session failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SyncError {
    /// A session is already running
    AlreadyInProgress,
    /// No session is running
    NotInProgress,
    /// An echo arrived with no probe outstanding
    NoProbeOutstanding,
    /// Not a single probe was accepted
    InsufficientSamples,
    /// Session timeout elapsed with fewer than the minimum accepted probes
    Timeout,
}

/// Result of a successful sync session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SyncOutcome {
    pub offset_us: i64,
    pub confidence: SyncConfidence,
    pub accepted: u8,
    pub lost: u8,
}

/// What happened to one echoed probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProbeVerdict {
    Accepted { rtt_us: u32, offset_us: i64 },
    /// Round trip exceeded the per-probe timeout
    Discarded { rtt_us: u32 },
}

#[derive(Debug, Clone)]
struct Session {
    probe_count: u8,
    probe_timeout_us: u32,
    started_at_us: u64,
    outstanding: Option<u64>,
    attempted: u8,
    lost: u8,
    offsets: Vec<i64, MAX_PROBES>,
}

/// Smoothed one-way link latency and its mean deviation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LatencyTracker {
    smoothed_us: u32,
    deviation_us: u32,
    samples: u32,
}

impl LatencyTracker {
    /// Fold in one round-trip time
    pub fn record(&mut self, rtt_us: u32) {
        let one_way = rtt_us / 2;
        if self.samples == 0 {
            self.smoothed_us = one_way;
            self.deviation_us = one_way / 2;
        } else {
            let err = one_way.abs_diff(self.smoothed_us) as u64;
            self.deviation_us = ((3 * self.deviation_us as u64 + err) / 4) as u32;
            self.smoothed_us = ((7 * self.smoothed_us as u64 + one_way as u64) / 8) as u32;
        }
        self.samples = self.samples.saturating_add(1);
    }

    pub fn smoothed_us(&self) -> u32 {
        self.smoothed_us
    }

    pub fn deviation_us(&self) -> u32 {
        self.deviation_us
    }

    pub fn samples(&self) -> u32 {
        self.samples
    }

    /// How far ahead of execution a command must be sent
    ///
    /// Smoothed RTT plus six one-way deviations, clamped to the configured
    /// bounds. The default applies until enough samples exist.
    pub fn lead_time_us(&self, config: &SyncConfig) -> u32 {
        if self.samples < config.lead_time_min_samples as u32 {
            return config.lead_time_default_us;
        }
        let lead = 2 * self.smoothed_us as u64 + 6 * self.deviation_us as u64;
        lead.clamp(
            config.lead_time_min_us as u64,
            config.lead_time_max_us as u64,
        ) as u32
    }
}

/// Probe-based clock offset estimator
#[derive(Debug, Clone)]
pub struct ClockSyncEngine {
    config: SyncConfig,
    session: Option<Session>,
    offset: Option<ClockOffset>,
    latency: LatencyTracker,
    last_measured: Option<(i64, u64)>,
}

impl ClockSyncEngine {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            session: None,
            offset: None,
            latency: LatencyTracker::default(),
            last_measured: None,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Start a new probe sequence
    ///
    /// Clears the sync-probe statistics so confidence reflects this session.
    pub fn begin_sync_session(
        &mut self,
        probe_count: u8,
        probe_timeout_us: u32,
        now_us: u64,
        metrics: &mut LatencyMetrics,
    ) -> Result<(), SyncError> {
        if self.session.is_some() {
            return Err(SyncError::AlreadyInProgress);
        }
        metrics.clear_sync_probes();
        self.session = Some(Session {
            probe_count: probe_count.clamp(1, MAX_PROBES as u8),
            probe_timeout_us,
            started_at_us: now_us,
            outstanding: None,
            attempted: 0,
            lost: 0,
            offsets: Vec::new(),
        });
        Ok(())
    }

    pub fn is_in_progress(&self) -> bool {
        self.session.is_some()
    }

    /// Check whether another probe slot is free to send
    pub fn wants_probe(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.outstanding.is_none() && s.attempted < s.probe_count)
    }

    /// Record that a probe left at `local_us`
    ///
    /// A probe still outstanding at this point has lost its slot.
    pub fn on_probe_sent(&mut self, local_us: u64) -> Result<(), SyncError> {
        let session = self.session.as_mut().ok_or(SyncError::NotInProgress)?;
        if session.outstanding.replace(local_us).is_some() {
            session.lost = session.lost.saturating_add(1);
        }
        session.attempted = session.attempted.saturating_add(1);
        Ok(())
    }

    /// Record an echo carrying the peer's receipt time
    pub fn on_probe_echoed(
        &mut self,
        peer_us: u64,
        local_us: u64,
        metrics: &mut LatencyMetrics,
    ) -> Result<ProbeVerdict, SyncError> {
        self.accept(peer_us, None, local_us, metrics)
    }

    /// Record an echo carrying both peer receipt and peer transmit times
    pub fn on_probe_turnaround(
        &mut self,
        echoed_at: u64,
        echo_sent_at: u64,
        local_us: u64,
        metrics: &mut LatencyMetrics,
    ) -> Result<ProbeVerdict, SyncError> {
        self.accept(echoed_at, Some(echo_sent_at), local_us, metrics)
    }

    fn accept(
        &mut self,
        echoed_at: u64,
        echo_sent_at: Option<u64>,
        received_at: u64,
        metrics: &mut LatencyMetrics,
    ) -> Result<ProbeVerdict, SyncError> {
        let session = self.session.as_mut().ok_or(SyncError::NotInProgress)?;
        let sent_at = session
            .outstanding
            .take()
            .ok_or(SyncError::NoProbeOutstanding)?;

        let probe = SyncProbe {
            sent_at,
            echoed_at,
            echo_sent_at,
            received_at,
        };
        let rtt = probe.rtt_us();
        let rtt_us = rtt.min(u32::MAX as u64) as u32;

        if rtt > session.probe_timeout_us as u64 {
            session.lost = session.lost.saturating_add(1);
            return Ok(ProbeVerdict::Discarded { rtt_us });
        }

        let Some(offset_us) = probe.offset_estimate_us() else {
            session.lost = session.lost.saturating_add(1);
            return Ok(ProbeVerdict::Discarded { rtt_us });
        };
        if session.offsets.push(offset_us).is_err() {
            session.lost = session.lost.saturating_add(1);
            return Ok(ProbeVerdict::Discarded { rtt_us });
        }

        metrics.record_sync_probe(rtt_us);
        self.latency.record(rtt_us);
        Ok(ProbeVerdict::Accepted { rtt_us, offset_us })
    }

    /// Give up on the outstanding probe; its slot is not retried
    pub fn on_probe_lost(&mut self) -> Result<(), SyncError> {
        let session = self.session.as_mut().ok_or(SyncError::NotInProgress)?;
        session
            .outstanding
            .take()
            .ok_or(SyncError::NoProbeOutstanding)?;
        session.lost = session.lost.saturating_add(1);
        Ok(())
    }

    /// Check whether the session should be finalized
    ///
    /// True once every slot has resolved or the session timeout elapsed.
    pub fn is_complete(&self, now_us: u64) -> bool {
        self.session.as_ref().is_some_and(|s| {
            (s.attempted >= s.probe_count && s.outstanding.is_none())
                || now_us.saturating_sub(s.started_at_us) >= self.config.session_timeout_us
        })
    }

    /// End the session and settle on the median offset
    ///
    /// On failure the previous offset, if any, is kept.
    pub fn finalize(
        &mut self,
        now_us: u64,
        metrics: &mut LatencyMetrics,
    ) -> Result<SyncOutcome, SyncError> {
        let session = self.session.take().ok_or(SyncError::NotInProgress)?;
        let accepted = session.offsets.len() as u8;
        if accepted == 0 {
            return Err(SyncError::InsufficientSamples);
        }

        let timed_out =
            now_us.saturating_sub(session.started_at_us) >= self.config.session_timeout_us;
        if timed_out && accepted < self.config.min_accepted {
            return Err(SyncError::Timeout);
        }

        let offset_us = median(session.offsets);
        self.offset = Some(ClockOffset::new(offset_us, now_us));
        self.last_measured = Some((offset_us, now_us));
        metrics.finalize_sync_probing(offset_us);

        Ok(SyncOutcome {
            offset_us,
            confidence: metrics.sync_confidence(),
            accepted,
            lost: session.lost,
        })
    }

    /// Abandon a running session without touching the offset
    pub fn cancel(&mut self) {
        self.session = None;
    }

    /// Fold a maintenance probe into the established offset
    ///
    /// Returns the new offset, or `None` if no initial estimate exists yet
    /// or the probe was too slow to trust.
    pub fn refine(
        &mut self,
        probe: &SyncProbe,
        now_us: u64,
        metrics: &mut LatencyMetrics,
    ) -> Option<i64> {
        let current = self.offset?;
        let rtt = probe.rtt_us();
        if rtt > self.config.probe_timeout_us as u64 {
            return None;
        }
        let measured = probe.offset_estimate_us()?;
        let rtt_us = rtt as u32;
        metrics.record_rtt(rtt_us);
        self.latency.record(rtt_us);

        let mut drift = current.drift_us_per_s;
        if let Some((previous, at)) = self.last_measured {
            let elapsed_us = now_us.saturating_sub(at);
            if elapsed_us >= DRIFT_MIN_INTERVAL_US {
                let change = measured.saturating_sub(previous);
                let rate = change as f32 / (elapsed_us as f32 / 1_000_000.0);
                drift = DRIFT_EMA_ALPHA * rate + (1.0 - DRIFT_EMA_ALPHA) * drift;
            }
        }
        self.last_measured = Some((measured, now_us));

        // Weighted mean of two i64 values; widened so the products fit
        let offset_us = ((OFFSET_EMA_NUM as i128 * measured as i128
            + (OFFSET_EMA_DEN - OFFSET_EMA_NUM) as i128 * current.offset_us as i128)
            / OFFSET_EMA_DEN as i128) as i64;
        self.offset = Some(ClockOffset {
            offset_us,
            drift_us_per_s: drift,
            updated_at_us: now_us,
        });
        Some(offset_us)
    }

    /// Last established offset, if any session succeeded
    pub fn offset(&self) -> Option<ClockOffset> {
        self.offset
    }

    /// Drift-corrected offset at `now_us`; zero before the first success
    pub fn corrected_offset(&self, now_us: u64) -> i64 {
        self.offset.map_or(0, |o| o.corrected(now_us))
    }

    pub fn latency(&self) -> &LatencyTracker {
        &self.latency
    }

    pub fn lead_time_us(&self) -> u32 {
        self.latency.lead_time_us(&self.config)
    }
}

fn median(mut values: Vec<i64, MAX_PROBES>) -> i64 {
    values.sort_unstable();
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        let (low, high) = (values[mid - 1], values[mid]);
        ((low as i128 + high as i128) / 2) as i64
    } else {
        values[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RTT: u64 = 2_000;

    /// Send one probe at `t` that comes back with the given offset and RTT
    fn echo(
        engine: &mut ClockSyncEngine,
        metrics: &mut LatencyMetrics,
        t: u64,
        offset: i64,
        rtt: u64,
    ) -> ProbeVerdict {
        engine.on_probe_sent(t).unwrap();
        let peer = (t as i64 + (rtt / 2) as i64 + offset) as u64;
        engine.on_probe_echoed(peer, t + rtt, metrics).unwrap()
    }

    fn lose(engine: &mut ClockSyncEngine, t: u64) {
        engine.on_probe_sent(t).unwrap();
        engine.on_probe_lost().unwrap();
    }

    fn engine() -> (ClockSyncEngine, LatencyMetrics) {
        (
            ClockSyncEngine::new(SyncConfig::default()),
            LatencyMetrics::default(),
        )
    }

    #[test]
    fn test_begin_twice() {
        let (mut engine, mut metrics) = engine();
        engine.begin_sync_session(5, 50_000, 0, &mut metrics).unwrap();
        assert_eq!(
            engine.begin_sync_session(5, 50_000, 0, &mut metrics),
            Err(SyncError::AlreadyInProgress)
        );
    }

    #[test]
    fn test_median_with_losses() {
        let (mut engine, mut metrics) = engine();
        engine.begin_sync_session(5, 50_000, 0, &mut metrics).unwrap();

        lose(&mut engine, 10_000);
        echo(&mut engine, &mut metrics, 20_000, 100, 2_000);
        lose(&mut engine, 30_000);
        echo(&mut engine, &mut metrics, 40_000, 105, 2_400);
        echo(&mut engine, &mut metrics, 50_000, 98, 2_200);

        assert!(engine.is_complete(60_000));
        let outcome = engine.finalize(60_000, &mut metrics).unwrap();

        assert_eq!(outcome.offset_us, 100);
        assert_eq!(outcome.accepted, 3);
        assert_eq!(outcome.lost, 2);
        assert_eq!(outcome.confidence, SyncConfidence::High);
        assert_eq!(metrics.snapshot().calculated_offset_us, 100);
        assert_eq!(metrics.snapshot().sync_spread_us, 400);
        assert!(!engine.is_in_progress());
    }

    #[test]
    fn test_even_count_median_averages_middle() {
        let (mut engine, mut metrics) = engine();
        engine.begin_sync_session(2, 50_000, 0, &mut metrics).unwrap();
        echo(&mut engine, &mut metrics, 1_000, 10, RTT);
        echo(&mut engine, &mut metrics, 5_000, 20, RTT);

        let outcome = engine.finalize(9_000, &mut metrics).unwrap();
        assert_eq!(outcome.offset_us, 15);
    }

    #[test]
    fn test_slow_probe_discarded() {
        let (mut engine, mut metrics) = engine();
        engine.begin_sync_session(3, 5_000, 0, &mut metrics).unwrap();

        let verdict = echo(&mut engine, &mut metrics, 0, 1_000, 6_000);
        assert_eq!(verdict, ProbeVerdict::Discarded { rtt_us: 6_000 });
        assert_eq!(metrics.snapshot().sync_probe_count, 0);

        let verdict = echo(&mut engine, &mut metrics, 10_000, 1_000, 4_000);
        assert_eq!(
            verdict,
            ProbeVerdict::Accepted {
                rtt_us: 4_000,
                offset_us: 1_000
            }
        );
        assert_eq!(metrics.snapshot().sync_probe_count, 1);
    }

    #[test]
    fn test_zero_accepted_keeps_prior_offset() {
        let (mut engine, mut metrics) = engine();
        engine.begin_sync_session(1, 50_000, 0, &mut metrics).unwrap();
        echo(&mut engine, &mut metrics, 0, 700, RTT);
        engine.finalize(10_000, &mut metrics).unwrap();

        engine
            .begin_sync_session(2, 50_000, 20_000, &mut metrics)
            .unwrap();
        lose(&mut engine, 20_000);
        lose(&mut engine, 30_000);
        assert!(engine.is_complete(40_000));
        assert_eq!(
            engine.finalize(40_000, &mut metrics),
            Err(SyncError::InsufficientSamples)
        );
        assert_eq!(engine.offset().map(|o| o.offset_us), Some(700));
    }

    #[test]
    fn test_timeout_below_minimum() {
        let (mut engine, mut metrics) = engine();
        let timeout = engine.config().session_timeout_us;
        engine.begin_sync_session(5, 50_000, 0, &mut metrics).unwrap();
        echo(&mut engine, &mut metrics, 0, 50, RTT);
        echo(&mut engine, &mut metrics, 10_000, 60, RTT);

        assert!(!engine.is_complete(timeout - 1));
        assert!(engine.is_complete(timeout));
        assert_eq!(
            engine.finalize(timeout, &mut metrics),
            Err(SyncError::Timeout)
        );
        assert_eq!(engine.offset(), None);
    }

    #[test]
    fn test_partial_success_before_timeout() {
        let (mut engine, mut metrics) = engine();
        engine.begin_sync_session(4, 50_000, 0, &mut metrics).unwrap();
        lose(&mut engine, 0);
        lose(&mut engine, 10_000);
        echo(&mut engine, &mut metrics, 20_000, -40, RTT);
        echo(&mut engine, &mut metrics, 30_000, -60, RTT);

        let outcome = engine.finalize(40_000, &mut metrics).unwrap();
        assert_eq!(outcome.offset_us, -50);
    }

    #[test]
    fn test_echo_without_probe() {
        let (mut engine, mut metrics) = engine();
        assert_eq!(
            engine.on_probe_echoed(0, 0, &mut metrics),
            Err(SyncError::NotInProgress)
        );
        engine.begin_sync_session(1, 50_000, 0, &mut metrics).unwrap();
        assert_eq!(
            engine.on_probe_echoed(0, 0, &mut metrics),
            Err(SyncError::NoProbeOutstanding)
        );
    }

    #[test]
    fn test_echo_beyond_offset_range_discarded() {
        let (mut engine, mut metrics) = engine();
        engine.begin_sync_session(2, 50_000, 0, &mut metrics).unwrap();

        engine.on_probe_sent(1_000).unwrap();
        let verdict = engine.on_probe_echoed(1 << 63, 3_000, &mut metrics).unwrap();
        assert_eq!(verdict, ProbeVerdict::Discarded { rtt_us: 2_000 });
        assert_eq!(metrics.snapshot().sync_probe_count, 0);

        echo(&mut engine, &mut metrics, 10_000, 250, RTT);
        let outcome = engine.finalize(20_000, &mut metrics).unwrap();
        assert_eq!(outcome.offset_us, 250);
        assert_eq!(outcome.lost, 1);

        let wild = SyncProbe::new(30_000, u64::MAX, 31_000);
        assert_eq!(engine.refine(&wild, 31_000, &mut metrics), None);
        assert_eq!(engine.offset().map(|o| o.offset_us), Some(250));
    }

    #[test]
    fn test_median_at_i64_extremes() {
        let both_max = Vec::from_slice(&[i64::MAX, i64::MAX]).unwrap();
        assert_eq!(median(both_max), i64::MAX);

        let spread = Vec::from_slice(&[i64::MAX, i64::MIN]).unwrap();
        assert_eq!(median(spread), 0);
    }

    #[test]
    fn test_refine_requires_initial_offset() {
        let (mut engine, mut metrics) = engine();
        let probe = SyncProbe::new(0, 1_000, 2_000);
        assert_eq!(engine.refine(&probe, 2_000, &mut metrics), None);
    }

    #[test]
    fn test_refine_ema_and_drift() {
        let (mut engine, mut metrics) = engine();
        metrics.enable(false);
        engine.begin_sync_session(1, 50_000, 0, &mut metrics).unwrap();
        echo(&mut engine, &mut metrics, 0, 0, RTT);
        engine.finalize(RTT, &mut metrics).unwrap();

        // One second later the peer appears 100us further ahead
        let t = RTT + 1_000_000;
        let probe = SyncProbe::new(t, t + 1_000 + 100, t + 2_000);
        assert_eq!(engine.refine(&probe, t, &mut metrics), Some(10));

        let offset = engine.offset().unwrap();
        assert!(offset.drift_us_per_s > 29.9 && offset.drift_us_per_s < 30.1);
        assert_eq!(metrics.snapshot().rtt_count, 1);
    }

    #[test]
    fn test_lead_time_default_then_clamped() {
        let config = SyncConfig::default();
        let mut tracker = LatencyTracker::default();
        for _ in 0..4 {
            tracker.record(4_000);
        }
        assert_eq!(tracker.lead_time_us(&config), 50_000);

        tracker.record(4_000);
        assert_eq!(tracker.lead_time_us(&config), 15_000);

        let mut slow = LatencyTracker::default();
        for _ in 0..5 {
            slow.record(90_000);
        }
        assert_eq!(slow.lead_time_us(&config), 100_000);
    }

    #[test]
    fn test_lead_time_inside_bounds() {
        let config = SyncConfig::default();
        let mut tracker = LatencyTracker::default();
        for _ in 0..5 {
            tracker.record(30_000);
        }
        // 15000 one-way, deviation decays from 7500
        let expected = 2 * tracker.smoothed_us() + 6 * tracker.deviation_us();
        assert_eq!(tracker.lead_time_us(&config), expected);
        assert!(expected > 15_000 && expected < 100_000);
    }
}
