//! Human-readable metrics report
//!
//! Free-form text for a serial or RTT log sink. Sections with no data
//! print a placeholder line instead of the unset min/max sentinels.

use core::fmt;

use super::latency::LatencyMetrics;

const RULE: &str = "-------------------------------------";

/// Borrowing view that formats a [`LatencyMetrics`] report
pub struct MetricsReport<'a> {
    metrics: &'a LatencyMetrics,
}

impl<'a> MetricsReport<'a> {
    pub fn new(metrics: &'a LatencyMetrics) -> Self {
        Self { metrics }
    }
}

impl fmt::Display for MetricsReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.metrics;
        let s = m.snapshot();

        writeln!(f, "========== LATENCY METRICS ==========")?;
        if m.is_enabled() {
            let verbose = if m.is_verbose() { "ON" } else { "OFF" };
            writeln!(f, "Status: ENABLED (verbose: {})", verbose)?;
        } else {
            writeln!(f, "Status: DISABLED")?;
        }
        writeln!(f, "Buzzes: {}", s.sample_count)?;
        writeln!(f, "{}", RULE)?;

        writeln!(f, "SYNC QUALITY:")?;
        if s.sync_probe_count > 0 {
            writeln!(f, "  Probes:     {}", s.sync_probe_count)?;
            writeln!(
                f,
                "  Min RTT:    {} us (one-way: {} us)",
                s.sync_min_rtt_us,
                s.sync_min_rtt_us / 2
            )?;
            writeln!(f, "  Max RTT:    {} us", s.sync_max_rtt_us)?;
            writeln!(f, "  Spread:     {} us", s.sync_spread_us)?;
            writeln!(f, "  Offset:     {:+} us", s.calculated_offset_us)?;
            writeln!(f, "  Confidence: {}", m.sync_confidence().as_str())?;
        } else {
            writeln!(f, "  (no sync probing data)")?;
        }
        writeln!(f, "{}", RULE)?;

        writeln!(f, "EXECUTION DRIFT:")?;
        if s.sample_count > 0 {
            let late = m.late_percent_x10();
            writeln!(f, "  Last:    {:+} us", s.last_drift_us)?;
            writeln!(f, "  Average: {:+} us", m.average_drift())?;
            writeln!(f, "  Min:     {:+} us", s.min_drift_us)?;
            writeln!(f, "  Max:     {:+} us", s.max_drift_us)?;
            writeln!(f, "  Jitter:  {} us", m.jitter())?;
            writeln!(
                f,
                "  Late (>{} us): {} ({}.{}%)",
                m.config().late_threshold_us,
                s.late_count,
                late / 10,
                late % 10
            )?;
            if s.early_count > 0 {
                writeln!(f, "  Early (<0): {}", s.early_count)?;
            }
        } else {
            writeln!(f, "  (no execution data)")?;
        }
        writeln!(f, "{}", RULE)?;

        writeln!(f, "ONGOING RTT:")?;
        if s.rtt_count > 0 {
            writeln!(f, "  Last:    {} us", s.last_rtt_us)?;
            writeln!(f, "  Average: {} us", m.average_rtt())?;
            writeln!(f, "  Min:     {} us", s.min_rtt_us)?;
            writeln!(f, "  Max:     {} us", s.max_rtt_us)?;
            writeln!(f, "  Samples: {}", s.rtt_count)?;
        } else {
            writeln!(f, "  (no RTT data)")?;
        }
        writeln!(f, "=====================================")
    }
}
