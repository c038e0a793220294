//! Configuration type definitions
//!
//! These types represent one glove's configuration. The firmware build
//! compiles `device.toml` into a postcard blob of [`DeviceConfig`].

use crate::metrics::SyncConfidence;
use crate::therapy::PatternKind;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Maximum probes in one sync session
pub const MAX_PROBES: usize = 16;

/// Maximum fingers per hand
pub const MAX_FINGERS: usize = 5;

/// Which glove this is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum DeviceRole {
    /// Initiates probes, owns the schedule
    #[default]
    Primary,
    /// Echoes probes, follows the schedule; its clock is the reference
    Secondary,
}

/// Configuration errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Probe count is zero or exceeds [`MAX_PROBES`]
    InvalidProbeCount,
    /// Minimum accepted probes is zero or above the probe count
    InvalidMinAccepted,
    /// A timeout is zero or the session timeout is shorter than one probe
    InvalidTimeout,
    /// Lead time bounds are not ordered min <= default <= max
    InvalidLeadTime,
    /// Confidence spread bands are not strictly increasing
    InvalidConfidenceBands,
    /// Late threshold is negative
    InvalidLateThreshold,
    /// Finger count is zero or exceeds [`MAX_FINGERS`]
    InvalidFingerCount,
    /// Burst timing leaves no room for the pattern
    InvalidTiming,
}

/// Latency telemetry thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MetricsConfig {
    /// Execution drift above this counts as late (strictly greater)
    pub late_threshold_us: i32,
    /// Probe RTT spread below this is HIGH confidence
    pub high_confidence_spread_us: u32,
    /// Probe RTT spread below this is MEDIUM confidence, otherwise LOW
    pub medium_confidence_spread_us: u32,
    /// Start accumulating execution and RTT samples when playback starts
    pub auto_enable: bool,
    /// Log every execution sample
    pub verbose: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            late_threshold_us: 1_000,
            high_confidence_spread_us: 10_000,
            medium_confidence_spread_us: 20_000,
            auto_enable: true,
            verbose: false,
        }
    }
}

impl MetricsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.late_threshold_us < 0 {
            return Err(ConfigError::InvalidLateThreshold);
        }
        if self.high_confidence_spread_us >= self.medium_confidence_spread_us {
            return Err(ConfigError::InvalidConfidenceBands);
        }
        Ok(())
    }
}

/// Clock synchronization parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SyncConfig {
    /// Probes sent per sync session
    pub probe_count: u8,
    /// Per-probe echo timeout; slower round trips are discarded
    pub probe_timeout_us: u32,
    /// Overall session timeout
    pub session_timeout_us: u64,
    /// Accepted probes required when the session times out
    pub min_accepted: u8,
    /// Interval between maintenance probes while running
    pub resync_interval_us: u64,
    /// Lower clamp for the adaptive lead time
    pub lead_time_min_us: u32,
    /// Upper clamp for the adaptive lead time
    pub lead_time_max_us: u32,
    /// Lead time used until enough RTT samples exist
    pub lead_time_default_us: u32,
    /// RTT samples required before the lead time adapts
    pub lead_time_min_samples: u8,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            probe_count: 5,
            probe_timeout_us: 100_000,
            session_timeout_us: 2_000_000,
            min_accepted: 3,
            resync_interval_us: 10_000_000,
            lead_time_min_us: 15_000,
            lead_time_max_us: 100_000,
            lead_time_default_us: 50_000,
            lead_time_min_samples: 5,
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.probe_count == 0 || self.probe_count as usize > MAX_PROBES {
            return Err(ConfigError::InvalidProbeCount);
        }
        if self.min_accepted == 0 || self.min_accepted > self.probe_count {
            return Err(ConfigError::InvalidMinAccepted);
        }
        if self.probe_timeout_us == 0
            || self.resync_interval_us == 0
            || self.session_timeout_us < self.probe_timeout_us as u64
        {
            return Err(ConfigError::InvalidTimeout);
        }
        if self.lead_time_min_us > self.lead_time_default_us
            || self.lead_time_default_us > self.lead_time_max_us
        {
            return Err(ConfigError::InvalidLeadTime);
        }
        Ok(())
    }
}

/// Therapy lifecycle and pattern parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TherapyConfig {
    /// Advertising + connecting must finish within this
    pub connect_timeout_us: u64,
    /// SECONDARY gives up on a silent PRIMARY after this long in Running; zero disables
    pub peer_silence_timeout_us: u64,
    /// Lowest sync confidence that allows playback
    pub min_confidence: SyncConfidence,
    /// Session length; zero runs until stopped
    pub session_duration_us: u64,
    /// Pattern used when a start request does not name one
    pub pattern: PatternKind,
    /// Fingers per hand
    pub fingers: u8,
    /// Burst on-time per finger
    pub burst_on_ms: u16,
    /// Gap after each finger burst
    pub burst_off_ms: u16,
    /// Pause after each full cycle
    pub relax_ms: u16,
    /// Drive amplitude, 0-100
    pub amplitude: u8,
    /// Random variation of each off-time, percent of `burst_off_ms`
    pub jitter_percent: u8,
    /// Length of the single calibration burst
    pub calibration_ms: u16,
}

impl Default for TherapyConfig {
    fn default() -> Self {
        Self {
            connect_timeout_us: 30_000_000,
            peer_silence_timeout_us: 30_000_000,
            min_confidence: SyncConfidence::Medium,
            session_duration_us: 7_200_000_000,
            pattern: PatternKind::RandomPermutation,
            fingers: 4,
            burst_on_ms: 100,
            burst_off_ms: 67,
            relax_ms: 668,
            amplitude: 100,
            jitter_percent: 0,
            calibration_ms: 500,
        }
    }
}

impl TherapyConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fingers == 0 || self.fingers as usize > MAX_FINGERS {
            return Err(ConfigError::InvalidFingerCount);
        }
        if self.burst_on_ms == 0
            || self.calibration_ms == 0
            || self.amplitude > 100
            || self.jitter_percent > 100
        {
            return Err(ConfigError::InvalidTiming);
        }
        if self.connect_timeout_us == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        Ok(())
    }

    /// Time from one finger's burst start to the next
    pub fn step_us(&self) -> u64 {
        (self.burst_on_ms as u64 + self.burst_off_ms as u64) * 1_000
    }
}

/// Complete per-glove configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DeviceConfig {
    pub role: DeviceRole,
    pub metrics: MetricsConfig,
    pub sync: SyncConfig,
    pub therapy: TherapyConfig,
    /// Seed for pattern shuffling
    pub seed: u64,
}

impl DeviceConfig {
    /// Validate every section
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.metrics.validate()?;
        self.sync.validate()?;
        self.therapy.validate()?;
        // Maintenance pings must fit inside the silence window
        let silence = self.therapy.peer_silence_timeout_us;
        if silence != 0 && silence <= self.sync.resync_interval_us {
            return Err(ConfigError::InvalidTimeout);
        }
        Ok(())
    }
}
