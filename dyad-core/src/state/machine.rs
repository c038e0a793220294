//! State machine definition
//!
//! Connection, sync and playback are all a function of the current state
//! and an event.

use super::events::Event;
use crate::sync::SyncError;

/// Therapy lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// Nothing running; initial state
    Idle,
    /// Waiting for the peer to show up
    Advertising,
    /// Peer found, link coming up
    Connecting,
    /// Clock sync in progress
    Syncing,
    /// Single calibration burst playing
    Calibrating,
    /// Synced, waiting for a pattern
    Ready,
    /// Pattern playing
    Running,
    /// Playback held; elapsed time frozen
    Paused,
    /// Schedule being shifted past the pause
    Resuming,
    /// Actuators being switched off
    Stopping,
    /// Fault; outputs disabled until reset
    Error(ErrorKind),
}

/// Types of errors that can occur
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ErrorKind {
    /// Transport dropped the peer
    LinkLost,
    /// Peer not found or link not up in time
    ConnectTimeout,
    /// Sync session timed out below the minimum accepted probes
    SyncTimeout,
    /// No probe was accepted
    InsufficientSamples,
    /// Sync finished but below the required confidence
    LowConfidence,
    /// Sync engine misuse
    SyncFault,
}

impl From<SyncError> for ErrorKind {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::Timeout => ErrorKind::SyncTimeout,
            SyncError::InsufficientSamples => ErrorKind::InsufficientSamples,
            _ => ErrorKind::SyncFault,
        }
    }
}

impl State {
    /// Check if this is an error state
    pub fn is_error(&self) -> bool {
        matches!(self, State::Error(_))
    }

    /// Check if a therapy session exists in this state
    pub fn is_playback(&self) -> bool {
        matches!(
            self,
            State::Running | State::Paused | State::Resuming | State::Stopping
        )
    }

    /// Check if this state needs a live link
    pub fn needs_link(&self) -> bool {
        matches!(
            self,
            State::Syncing
                | State::Calibrating
                | State::Ready
                | State::Running
                | State::Paused
                | State::Resuming
        )
    }

    /// Check if buzz commands may be executed
    pub fn actuators_allowed(&self) -> bool {
        matches!(
            self,
            State::Running | State::Resuming | State::Calibrating
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            State::Idle => "IDLE",
            State::Advertising => "ADVERTISING",
            State::Connecting => "CONNECTING",
            State::Syncing => "SYNCING",
            State::Calibrating => "CALIBRATING",
            State::Ready => "READY",
            State::Running => "RUNNING",
            State::Paused => "PAUSED",
            State::Resuming => "RESUMING",
            State::Stopping => "STOPPING",
            State::Error(_) => "ERROR",
        }
    }

    /// Process an event and return the next state
    pub fn transition(self, event: Event) -> Self {
        use Event::*;
        use State::*;

        match (self, event) {
            (Idle, Start) => Advertising,

            (Advertising, PeerDiscovered) => Connecting,
            (Advertising, Stop) => Idle,

            (Connecting, LinkEstablished) => Syncing,
            (Connecting, Stop) => Idle,

            (Syncing, SyncComplete) => Ready,
            (Syncing, Stop) => Idle,

            (Ready, PatternStart) => Running,
            (Ready, Calibrate) => Calibrating,
            (Ready, Stop) => Idle,

            (Calibrating, CalibrationDone) => Ready,
            (Calibrating, Stop) => Ready,

            (Running, Pause) => Paused,
            (Running, Stop) => Stopping,
            (Running, SessionComplete) => Stopping,

            (Paused, Resume) => Resuming,
            (Paused, Stop) => Stopping,

            (Resuming, ResumeComplete) => Running,
            (Resuming, Stop) => Stopping,

            (Stopping, StopComplete) => Idle,

            (Error(_), Reset) => Idle,

            // Nothing to fail while idle; first fault wins
            (Idle, ErrorDetected(_)) => Idle,
            (Error(_), ErrorDetected(_)) => self,
            (_, ErrorDetected(kind)) => Error(kind),

            // Default: stay in current state
            _ => self,
        }
    }
}
