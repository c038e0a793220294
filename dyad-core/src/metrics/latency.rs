//! Latency telemetry
//!
//! Aggregates execution drift, ongoing RTT and sync-probe RTT. Execution
//! and RTT recording only happen while enabled; sync probes are always
//! recorded because pairing happens before telemetry is switched on.

use crate::config::MetricsConfig;

use super::report::MetricsReport;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Qualitative reliability of a clock offset, derived from probe RTT spread
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum SyncConfidence {
    /// No probes recorded
    #[default]
    Unknown,
    Low,
    Medium,
    High,
}

impl SyncConfidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncConfidence::Unknown => "UNKNOWN",
            SyncConfidence::Low => "LOW",
            SyncConfidence::Medium => "MEDIUM",
            SyncConfidence::High => "HIGH",
        }
    }

    /// Wire byte for SyncReport
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(SyncConfidence::Unknown),
            1 => Some(SyncConfidence::Low),
            2 => Some(SyncConfidence::Medium),
            3 => Some(SyncConfidence::High),
            _ => None,
        }
    }
}

/// Aggregate counters
///
/// Before any sample, every min holds its type's maximum and every max its
/// minimum (zero for unsigned), so the first sample sets both bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LatencyMetricsSnapshot {
    pub sample_count: u32,
    pub last_drift_us: i32,
    pub total_drift_us: i64,
    pub min_drift_us: i32,
    pub max_drift_us: i32,
    pub late_count: u32,
    pub early_count: u32,

    pub rtt_count: u32,
    pub last_rtt_us: u32,
    pub total_rtt_us: u64,
    pub min_rtt_us: u32,
    pub max_rtt_us: u32,

    pub sync_probe_count: u32,
    pub sync_min_rtt_us: u32,
    pub sync_max_rtt_us: u32,
    pub sync_spread_us: u32,
    pub calculated_offset_us: i64,
}

impl LatencyMetricsSnapshot {
    pub const EMPTY: Self = Self {
        sample_count: 0,
        last_drift_us: 0,
        total_drift_us: 0,
        min_drift_us: i32::MAX,
        max_drift_us: i32::MIN,
        late_count: 0,
        early_count: 0,

        rtt_count: 0,
        last_rtt_us: 0,
        total_rtt_us: 0,
        min_rtt_us: u32::MAX,
        max_rtt_us: 0,

        sync_probe_count: 0,
        sync_min_rtt_us: u32::MAX,
        sync_max_rtt_us: 0,
        sync_spread_us: 0,
        calculated_offset_us: 0,
    };

    fn clear_sync_probes(&mut self) {
        self.sync_probe_count = 0;
        self.sync_min_rtt_us = u32::MAX;
        self.sync_max_rtt_us = 0;
        self.sync_spread_us = 0;
        self.calculated_offset_us = 0;
    }
}

impl Default for LatencyMetricsSnapshot {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Latency telemetry aggregator
///
/// One instance per glove, created at start-up and handed by `&mut` to
/// whatever records into it.
#[derive(Debug, Clone)]
pub struct LatencyMetrics {
    config: MetricsConfig,
    enabled: bool,
    verbose: bool,
    data: LatencyMetricsSnapshot,
}

impl Default for LatencyMetrics {
    fn default() -> Self {
        Self::new(MetricsConfig::default())
    }
}

impl LatencyMetrics {
    pub fn new(config: MetricsConfig) -> Self {
        Self {
            config,
            enabled: false,
            verbose: false,
            data: LatencyMetricsSnapshot::EMPTY,
        }
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    /// Clear every counter and the enabled/verbose flags
    pub fn reset(&mut self) {
        self.enabled = false;
        self.verbose = false;
        self.data = LatencyMetricsSnapshot::EMPTY;
    }

    /// Start accumulating
    ///
    /// Counters are only reset on the disabled to enabled edge; enabling
    /// again just updates the verbose flag.
    pub fn enable(&mut self, verbose: bool) {
        if !self.enabled {
            self.reset();
            self.enabled = true;
        }
        self.verbose = verbose;
    }

    /// Stop accumulating, keeping the numbers
    ///
    /// Returns true if metrics were enabled, so the caller can print a
    /// final report.
    pub fn disable(&mut self) -> bool {
        let was_enabled = self.enabled;
        self.enabled = false;
        self.verbose = false;
        was_enabled
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Per-sample logging requested
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Record scheduled-vs-actual execution drift (positive is late)
    pub fn record_execution(&mut self, drift_us: i32) {
        if !self.enabled {
            return;
        }
        let d = &mut self.data;
        d.last_drift_us = drift_us;
        d.total_drift_us += drift_us as i64;
        d.sample_count = d.sample_count.saturating_add(1);
        d.min_drift_us = d.min_drift_us.min(drift_us);
        d.max_drift_us = d.max_drift_us.max(drift_us);

        if drift_us > self.config.late_threshold_us {
            d.late_count += 1;
        } else if drift_us < 0 {
            d.early_count += 1;
        }
    }

    /// Record an ongoing round-trip time
    pub fn record_rtt(&mut self, rtt_us: u32) {
        if !self.enabled {
            return;
        }
        let d = &mut self.data;
        d.last_rtt_us = rtt_us;
        d.total_rtt_us += rtt_us as u64;
        d.rtt_count = d.rtt_count.saturating_add(1);
        d.min_rtt_us = d.min_rtt_us.min(rtt_us);
        d.max_rtt_us = d.max_rtt_us.max(rtt_us);
    }

    /// Record an accepted sync probe's RTT, regardless of the enabled flag
    pub fn record_sync_probe(&mut self, rtt_us: u32) {
        let d = &mut self.data;
        d.sync_probe_count = d.sync_probe_count.saturating_add(1);
        d.sync_min_rtt_us = d.sync_min_rtt_us.min(rtt_us);
        d.sync_max_rtt_us = d.sync_max_rtt_us.max(rtt_us);

        // Spread stays unset until a non-zero probe arrives
        if d.sync_min_rtt_us != u32::MAX && d.sync_max_rtt_us != 0 {
            d.sync_spread_us = d.sync_max_rtt_us - d.sync_min_rtt_us;
        }
    }

    /// Store the offset a sync session settled on
    pub fn finalize_sync_probing(&mut self, offset_us: i64) {
        self.data.calculated_offset_us = offset_us;
    }

    /// Forget previous sync-probe statistics before a new session
    pub fn clear_sync_probes(&mut self) {
        self.data.clear_sync_probes();
    }

    /// Mean execution drift, truncated toward zero; 0 without samples
    pub fn average_drift(&self) -> i32 {
        if self.data.sample_count == 0 {
            return 0;
        }
        (self.data.total_drift_us / self.data.sample_count as i64) as i32
    }

    /// Mean RTT, truncated; 0 without samples
    pub fn average_rtt(&self) -> u32 {
        if self.data.rtt_count == 0 {
            return 0;
        }
        (self.data.total_rtt_us / self.data.rtt_count as u64) as u32
    }

    /// Spread of execution drift (max - min)
    pub fn jitter(&self) -> u32 {
        if self.data.sample_count == 0 {
            return 0;
        }
        (self.data.max_drift_us as i64 - self.data.min_drift_us as i64) as u32
    }

    /// Late samples as a percentage with one decimal (x10)
    pub fn late_percent_x10(&self) -> u32 {
        if self.data.sample_count == 0 {
            return 0;
        }
        (self.data.late_count as u64 * 1_000 / self.data.sample_count as u64) as u32
    }

    /// Confidence band for the recorded probe spread
    pub fn sync_confidence(&self) -> SyncConfidence {
        if self.data.sync_probe_count == 0 {
            return SyncConfidence::Unknown;
        }
        let spread = self.data.sync_spread_us;
        if spread < self.config.high_confidence_spread_us {
            SyncConfidence::High
        } else if spread < self.config.medium_confidence_spread_us {
            SyncConfidence::Medium
        } else {
            SyncConfidence::Low
        }
    }

    /// Copy of all counters
    pub fn snapshot(&self) -> LatencyMetricsSnapshot {
        self.data
    }

    /// Human-readable diagnostic report
    pub fn report(&self) -> MetricsReport<'_> {
        MetricsReport::new(self)
    }

    /// Write the diagnostic report to any text sink
    pub fn write_report<W: core::fmt::Write>(&self, out: &mut W) -> core::fmt::Result {
        write!(out, "{}", self.report())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled() -> LatencyMetrics {
        let mut metrics = LatencyMetrics::default();
        metrics.enable(false);
        metrics
    }

    #[test]
    fn test_initial_sentinels() {
        let snap = LatencyMetrics::default().snapshot();
        assert_eq!(snap.min_drift_us, i32::MAX);
        assert_eq!(snap.max_drift_us, i32::MIN);
        assert_eq!(snap.min_rtt_us, u32::MAX);
        assert_eq!(snap.max_rtt_us, 0);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut metrics = enabled();
        metrics.record_execution(500);
        metrics.record_sync_probe(4_000);

        metrics.reset();
        let once = metrics.snapshot();
        metrics.reset();

        assert_eq!(metrics.snapshot(), once);
        assert_eq!(once, LatencyMetricsSnapshot::EMPTY);
        assert!(!metrics.is_enabled());
        assert!(!metrics.is_verbose());
    }

    #[test]
    fn test_disabled_ignores_execution_and_rtt() {
        let mut metrics = LatencyMetrics::default();
        metrics.record_execution(100);
        metrics.record_rtt(100);

        let snap = metrics.snapshot();
        assert_eq!(snap.sample_count, 0);
        assert_eq!(snap.rtt_count, 0);
    }

    #[test]
    fn test_reenable_keeps_samples() {
        let mut metrics = enabled();
        metrics.record_execution(10);
        metrics.enable(true);

        assert_eq!(metrics.snapshot().sample_count, 1);
        assert!(metrics.is_verbose());
    }

    #[test]
    fn test_enable_after_disable_resets() {
        let mut metrics = enabled();
        metrics.record_execution(10);
        assert!(metrics.disable());
        assert!(!metrics.disable());
        assert_eq!(metrics.snapshot().sample_count, 1);

        metrics.enable(false);
        assert_eq!(metrics.snapshot().sample_count, 0);
    }

    #[test]
    fn test_late_threshold_is_strict() {
        let mut metrics = enabled();
        metrics.record_execution(1_000);
        assert_eq!(metrics.snapshot().late_count, 0);

        metrics.record_execution(1_001);
        assert_eq!(metrics.snapshot().late_count, 1);
    }

    #[test]
    fn test_early_excludes_zero() {
        let mut metrics = enabled();
        metrics.record_execution(0);
        assert_eq!(metrics.snapshot().early_count, 0);

        metrics.record_execution(-1);
        assert_eq!(metrics.snapshot().early_count, 1);
    }

    #[test]
    fn test_average_truncates() {
        let mut metrics = enabled();
        for drift in [10, 10, 10, 7] {
            metrics.record_execution(drift);
        }
        assert_eq!(metrics.average_drift(), 9);
    }

    #[test]
    fn test_averages_without_samples() {
        let metrics = enabled();
        assert_eq!(metrics.average_drift(), 0);
        assert_eq!(metrics.average_rtt(), 0);
        assert_eq!(metrics.jitter(), 0);
    }

    #[test]
    fn test_jitter_single_sample() {
        let mut metrics = enabled();
        metrics.record_execution(-400);
        assert_eq!(metrics.jitter(), 0);

        metrics.record_execution(600);
        assert_eq!(metrics.jitter(), 1_000);
    }

    #[test]
    fn test_sync_probe_recorded_while_disabled() {
        let mut metrics = LatencyMetrics::default();
        metrics.record_sync_probe(12_000);
        metrics.record_sync_probe(15_000);

        let snap = metrics.snapshot();
        assert_eq!(snap.sync_probe_count, 2);
        assert_eq!(snap.sync_min_rtt_us, 12_000);
        assert_eq!(snap.sync_max_rtt_us, 15_000);
        assert_eq!(snap.sync_spread_us, 3_000);
    }

    #[test]
    fn test_first_probe_seeds_both_bounds() {
        let mut metrics = LatencyMetrics::default();
        metrics.record_sync_probe(8_000);

        let snap = metrics.snapshot();
        assert_eq!(snap.sync_min_rtt_us, 8_000);
        assert_eq!(snap.sync_max_rtt_us, 8_000);
        assert_eq!(snap.sync_spread_us, 0);
    }

    #[test]
    fn test_zero_probe_leaves_spread_unset() {
        let mut metrics = LatencyMetrics::default();
        metrics.record_sync_probe(0);

        let snap = metrics.snapshot();
        assert_eq!(snap.sync_max_rtt_us, 0);
        assert_eq!(snap.sync_spread_us, 0);
        assert_eq!(snap.sync_probe_count, 1);
    }

    fn confidence_for_spread(spread: u32) -> SyncConfidence {
        let mut metrics = LatencyMetrics::default();
        metrics.record_sync_probe(1_000);
        metrics.record_sync_probe(1_000 + spread);
        metrics.sync_confidence()
    }

    #[test]
    fn test_confidence_bands() {
        assert_eq!(confidence_for_spread(9_999), SyncConfidence::High);
        assert_eq!(confidence_for_spread(10_000), SyncConfidence::Medium);
        assert_eq!(confidence_for_spread(19_999), SyncConfidence::Medium);
        assert_eq!(confidence_for_spread(20_000), SyncConfidence::Low);
        assert_eq!(
            LatencyMetrics::default().sync_confidence(),
            SyncConfidence::Unknown
        );
    }

    #[test]
    fn test_clear_sync_probes_keeps_execution() {
        let mut metrics = enabled();
        metrics.record_execution(42);
        metrics.record_sync_probe(3_000);
        metrics.finalize_sync_probing(-77);

        metrics.clear_sync_probes();

        let snap = metrics.snapshot();
        assert_eq!(snap.sync_probe_count, 0);
        assert_eq!(snap.calculated_offset_us, 0);
        assert_eq!(snap.sample_count, 1);
        assert_eq!(metrics.sync_confidence(), SyncConfidence::Unknown);
    }

    #[test]
    fn test_late_percent() {
        let mut metrics = enabled();
        for drift in [2_000, 0, 0] {
            metrics.record_execution(drift);
        }
        assert_eq!(metrics.late_percent_x10(), 333);
    }

    #[test]
    fn test_confidence_ordering() {
        assert!(SyncConfidence::High > SyncConfidence::Medium);
        assert!(SyncConfidence::Medium > SyncConfidence::Low);
        assert!(SyncConfidence::Low > SyncConfidence::Unknown);
        assert_eq!(SyncConfidence::from_byte(2), Some(SyncConfidence::Medium));
        assert_eq!(SyncConfidence::from_byte(9), None);
    }
}
