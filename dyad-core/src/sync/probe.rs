//! Round-trip probe samples and the clock offset they produce
//!
//! Sign convention: `reference = local + offset`. The SECONDARY clock is
//! the reference, so a PRIMARY whose clock runs behind gets a positive
//! offset and the SECONDARY's own offset is always zero.

/// Shift a timestamp by a signed delta, saturating at the u64 range
pub fn shift_us(t_us: u64, delta_us: i64) -> u64 {
    if delta_us >= 0 {
        t_us.saturating_add(delta_us as u64)
    } else {
        t_us.saturating_sub(delta_us.unsigned_abs())
    }
}

/// One round-trip sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SyncProbe {
    /// Local send time
    pub sent_at: u64,
    /// Peer time when the probe arrived
    pub echoed_at: u64,
    /// Peer time when the echo left, if the peer reported it
    pub echo_sent_at: Option<u64>,
    /// Local receive time of the echo
    pub received_at: u64,
}

impl SyncProbe {
    pub fn new(sent_at: u64, echoed_at: u64, received_at: u64) -> Self {
        Self {
            sent_at,
            echoed_at,
            echo_sent_at: None,
            received_at,
        }
    }

    /// Attach the peer's echo transmit time
    pub fn with_echo_sent(mut self, echo_sent_at: u64) -> Self {
        self.echo_sent_at = Some(echo_sent_at);
        self
    }

    /// Round-trip time excluding the peer's turnaround
    pub fn rtt_us(&self) -> u64 {
        let total = self.received_at.saturating_sub(self.sent_at);
        let turnaround = self
            .echo_sent_at
            .map_or(0, |t3| t3.saturating_sub(self.echoed_at));
        total.saturating_sub(turnaround)
    }

    /// Offset estimate assuming a symmetric path: `echoed - sent - rtt/2`
    ///
    /// With the turnaround excluded from the RTT this is the
    /// four-timestamp form `((t2 - t1) + (t3 - t4)) / 2`, up to 1us of
    /// rounding when the RTT is odd.
    ///
    /// `None` if the peer timestamps put the offset outside the i64 range.
    pub fn offset_estimate_us(&self) -> Option<i64> {
        let forward = i64::try_from(self.echoed_at as i128 - self.sent_at as i128).ok()?;
        forward.checked_sub((self.rtt_us() / 2) as i64)
    }
}

/// Offset from the local clock to the shared reference clock
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClockOffset {
    /// Offset at `updated_at_us`
    pub offset_us: i64,
    /// Estimated change of the offset per second
    pub drift_us_per_s: f32,
    /// Local time of the last update
    pub updated_at_us: u64,
}

impl ClockOffset {
    pub const ZERO: Self = Self {
        offset_us: 0,
        drift_us_per_s: 0.0,
        updated_at_us: 0,
    };

    pub fn new(offset_us: i64, updated_at_us: u64) -> Self {
        Self {
            offset_us,
            drift_us_per_s: 0.0,
            updated_at_us,
        }
    }

    /// Offset extrapolated with the drift estimate to `now_us`
    pub fn corrected(&self, now_us: u64) -> i64 {
        let elapsed_s = now_us.saturating_sub(self.updated_at_us) as f32 / 1_000_000.0;
        self.offset_us
            .saturating_add((self.drift_us_per_s * elapsed_s) as i64)
    }

    /// Convert a local timestamp to reference time
    pub fn to_reference(&self, local_us: u64) -> u64 {
        shift_us(local_us, self.corrected(local_us))
    }

    /// Convert a reference timestamp to local time
    pub fn to_local(&self, reference_us: u64) -> u64 {
        let approx = shift_us(reference_us, self.offset_us.saturating_neg());
        shift_us(reference_us, self.corrected(approx).saturating_neg())
    }
}

impl Default for ClockOffset {
    fn default() -> Self {
        Self::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symmetric_path_offset() {
        // Peer is 1000us ahead, 200us each way
        let probe = SyncProbe::new(10_000, 11_200, 10_400);
        assert_eq!(probe.rtt_us(), 400);
        assert_eq!(probe.offset_estimate_us(), Some(1_000));
    }

    #[test]
    fn test_turnaround_excluded() {
        // Same path, peer held the echo for 300us
        let probe = SyncProbe::new(10_000, 11_200, 10_700).with_echo_sent(11_500);
        assert_eq!(probe.rtt_us(), 400);
        assert_eq!(probe.offset_estimate_us(), Some(1_000));
    }

    #[test]
    fn test_four_timestamp_matches_ptp_form() {
        let (t1, t2, t3, t4) = (5_000u64, 3_150u64, 3_400u64, 5_610u64);
        let probe = SyncProbe::new(t1, t2, t4).with_echo_sent(t3);
        let ptp = ((t2 as i64 - t1 as i64) + (t3 as i64 - t4 as i64)) / 2;
        assert_eq!(probe.offset_estimate_us(), Some(ptp));
    }

    #[test]
    fn test_negative_offset() {
        let probe = SyncProbe::new(50_000, 20_100, 50_200);
        assert_eq!(probe.offset_estimate_us(), Some(-30_000));
    }

    #[test]
    fn test_peer_time_beyond_i64_range() {
        let probe = SyncProbe::new(1_000, 1 << 63, 3_000);
        assert_eq!(probe.offset_estimate_us(), None);

        let probe = SyncProbe::new(u64::MAX, 0, u64::MAX);
        assert_eq!(probe.offset_estimate_us(), None);
    }

    #[test]
    fn test_clock_offset_conversions() {
        let offset = ClockOffset::new(-2_500, 0);
        assert_eq!(offset.to_reference(10_000), 7_500);
        assert_eq!(offset.to_local(7_500), 10_000);
    }

    #[test]
    fn test_drift_extrapolation() {
        let offset = ClockOffset {
            offset_us: 100,
            drift_us_per_s: 20.0,
            updated_at_us: 1_000_000,
        };
        assert_eq!(offset.corrected(1_000_000), 100);
        assert_eq!(offset.corrected(3_000_000), 140);
        // Before the update point nothing is extrapolated
        assert_eq!(offset.corrected(0), 100);
    }

    #[test]
    fn test_shift_saturates() {
        assert_eq!(shift_us(5, -10), 0);
        assert_eq!(shift_us(u64::MAX - 1, 10), u64::MAX);
    }
}
