//! Property tests for the latency aggregator

use dyad_core::config::MetricsConfig;
use dyad_core::metrics::{LatencyMetrics, SyncConfidence};
use proptest::prelude::*;

fn enabled() -> LatencyMetrics {
    let mut metrics = LatencyMetrics::default();
    metrics.enable(false);
    metrics
}

proptest! {
    #[test]
    fn drift_bounds_hold(samples in prop::collection::vec(-50_000i32..50_000, 1..200)) {
        let mut metrics = enabled();
        for &d in &samples {
            metrics.record_execution(d);
        }
        let s = metrics.snapshot();
        prop_assert_eq!(s.sample_count as usize, samples.len());
        prop_assert!(samples.iter().all(|&d| s.min_drift_us <= d && d <= s.max_drift_us));
        prop_assert_eq!(s.min_drift_us, *samples.iter().min().unwrap());
        prop_assert_eq!(s.max_drift_us, *samples.iter().max().unwrap());
        prop_assert_eq!(metrics.jitter() as i64, s.max_drift_us as i64 - s.min_drift_us as i64);
    }

    #[test]
    fn rtt_bounds_and_average(samples in prop::collection::vec(0u32..200_000, 1..200)) {
        let mut metrics = enabled();
        for &r in &samples {
            metrics.record_rtt(r);
        }
        let s = metrics.snapshot();
        prop_assert_eq!(s.rtt_count as usize, samples.len());
        prop_assert!(samples.iter().all(|&r| s.min_rtt_us <= r && r <= s.max_rtt_us));

        let total: u64 = samples.iter().map(|&r| r as u64).sum();
        prop_assert_eq!(metrics.average_rtt() as u64, total / samples.len() as u64);
    }

    #[test]
    fn positive_drift_average_truncates(samples in prop::collection::vec(0i32..10_000, 1..100)) {
        let mut metrics = enabled();
        for &d in &samples {
            metrics.record_execution(d);
        }
        let total: i64 = samples.iter().map(|&d| d as i64).sum();
        prop_assert_eq!(metrics.average_drift() as i64, total / samples.len() as i64);
    }

    #[test]
    fn disabled_records_nothing(
        drift in prop::collection::vec(any::<i32>(), 0..50),
        rtt in prop::collection::vec(any::<u32>(), 0..50),
    ) {
        let mut metrics = LatencyMetrics::default();
        for &d in &drift {
            metrics.record_execution(d);
        }
        for &r in &rtt {
            metrics.record_rtt(r);
        }
        let s = metrics.snapshot();
        prop_assert_eq!(s.sample_count, 0);
        prop_assert_eq!(s.rtt_count, 0);
        prop_assert_eq!(metrics.average_drift(), 0);
        prop_assert_eq!(metrics.average_rtt(), 0);
    }

    #[test]
    fn sync_probes_recorded_while_disabled(samples in prop::collection::vec(1u32..100_000, 1..16)) {
        let mut metrics = LatencyMetrics::default();
        for &r in &samples {
            metrics.record_sync_probe(r);
        }
        let s = metrics.snapshot();
        let min = *samples.iter().min().unwrap();
        let max = *samples.iter().max().unwrap();
        prop_assert_eq!(s.sync_probe_count as usize, samples.len());
        prop_assert_eq!(s.sync_spread_us, max - min);
        prop_assert!(metrics.sync_confidence() != SyncConfidence::Unknown);
    }

    #[test]
    fn late_needs_strictly_more_than_threshold(threshold in 0i32..10_000, delta in 1i32..1_000) {
        let config = MetricsConfig { late_threshold_us: threshold, ..MetricsConfig::default() };
        let mut metrics = LatencyMetrics::new(config);
        metrics.enable(false);

        metrics.record_execution(threshold);
        prop_assert_eq!(metrics.snapshot().late_count, 0);
        metrics.record_execution(threshold + delta);
        prop_assert_eq!(metrics.snapshot().late_count, 1);
    }

    #[test]
    fn report_never_fails(drift in prop::collection::vec(any::<i32>(), 0..20), enable in any::<bool>()) {
        let mut metrics = LatencyMetrics::default();
        if enable {
            metrics.enable(true);
        }
        for &d in &drift {
            metrics.record_execution(d);
        }
        let before = metrics.snapshot();
        let text = metrics.report().to_string();
        prop_assert!(text.contains("LATENCY METRICS"));
        prop_assert_eq!(metrics.snapshot(), before);
    }
}

#[test]
fn drift_average_example() {
    let mut metrics = enabled();
    for d in [10, 10, 10, 7] {
        metrics.record_execution(d);
    }
    assert_eq!(metrics.average_drift(), 9);
}

#[test]
fn confidence_band_edges() {
    let cases = [
        (9_999, SyncConfidence::High),
        (10_000, SyncConfidence::Medium),
        (19_999, SyncConfidence::Medium),
        (20_000, SyncConfidence::Low),
    ];
    for (spread, expected) in cases {
        let mut metrics = LatencyMetrics::default();
        metrics.record_sync_probe(1_000);
        metrics.record_sync_probe(1_000 + spread);
        assert_eq!(metrics.sync_confidence(), expected, "spread {spread}");
    }
    assert_eq!(
        LatencyMetrics::default().sync_confidence(),
        SyncConfidence::Unknown
    );
}
