//! Events that trigger state transitions

use super::machine::ErrorKind;

/// Events that can trigger state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    // Command events
    /// Session start requested (or, on SECONDARY, the first probe arrived)
    Start,
    /// Single calibration burst requested
    Calibrate,
    /// Pattern playback requested
    PatternStart,
    Pause,
    Resume,
    /// Stop requested
    Stop,
    /// Leave the error state
    Reset,

    // Link events
    /// Transport found the peer
    PeerDiscovered,
    /// Transport link is up
    LinkEstablished,

    // Sync events
    /// Sync finished with acceptable confidence
    SyncComplete,

    // Completion events
    /// Calibration burst finished
    CalibrationDone,
    /// Schedule shifted past the pause
    ResumeComplete,
    /// Configured session duration elapsed
    SessionComplete,
    /// All actuators off on both sides
    StopComplete,

    /// Fault detected
    ErrorDetected(ErrorKind),
}
