//! Core collaborator traits backed by the firmware's channels
//!
//! The therapy machine never blocks: every call here is a `try_send` or
//! an atomic load, and a full queue is reported back as an error.

use embassy_time::Instant;
use heapless::Vec;
use portable_atomic::Ordering;

use dyad_core::config::MAX_FINGERS;
use dyad_core::therapy::MotorCommand;
use dyad_core::traits::{HapticOutput, HardwareError, MonotonicClock, Transport, TransportError};

use crate::channels::{HapticRequest, HAPTIC_CMD, LINK_UP, OUTBOUND};

/// Transport that queues frames for the link TX task
pub struct UartLink;

impl Transport for UartLink {
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let frame = Vec::from_slice(bytes).map_err(|_| TransportError::QueueFull)?;
        OUTBOUND
            .try_send(frame)
            .map_err(|_| TransportError::QueueFull)
    }

    fn is_connected(&self) -> bool {
        LINK_UP.load(Ordering::Acquire)
    }
}

/// Haptic output that hands commands to the haptic task
pub struct ChannelHaptic;

impl HapticOutput for ChannelHaptic {
    fn execute(&mut self, command: MotorCommand) -> Result<(), HardwareError> {
        if command.actuator.finger as usize >= MAX_FINGERS {
            return Err(HardwareError::InvalidFinger);
        }
        HAPTIC_CMD
            .try_send(HapticRequest::Execute(command))
            .map_err(|_| HardwareError::Busy)
    }

    fn deactivate_all(&mut self) -> Result<(), HardwareError> {
        HAPTIC_CMD
            .try_send(HapticRequest::DeactivateAll)
            .map_err(|_| HardwareError::Busy)
    }
}

/// Embassy time driver as a microsecond clock
pub struct EmbassyClock;

impl MonotonicClock for EmbassyClock {
    fn now_us(&self) -> u64 {
        Instant::now().as_micros()
    }
}
