//! Collaborator doubles for unit tests

use core::cell::Cell;

use dyad_protocol::{FrameParser, Message};
use heapless::Vec;

use crate::therapy::MotorCommand;
use crate::traits::{HapticOutput, HardwareError, MonotonicClock, Transport, TransportError};

/// Transport that decodes and keeps everything sent through it
pub struct RecordingTransport {
    pub connected: bool,
    pub fail_sends: bool,
    pub sent: Vec<Message, 64>,
    parser: FrameParser,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            connected: true,
            fail_sends: false,
            sent: Vec::new(),
            parser: FrameParser::new(),
        }
    }

    pub fn drain(&mut self) -> Vec<Message, 64> {
        core::mem::take(&mut self.sent)
    }
}

impl Transport for RecordingTransport {
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.fail_sends {
            return Err(TransportError::QueueFull);
        }
        let (frame, _) = self
            .parser
            .feed_bytes(bytes)
            .ok()
            .flatten()
            .ok_or(TransportError::QueueFull)?;
        let message = Message::from_frame(&frame).map_err(TransportError::Encode)?;
        self.sent.push(message).map_err(|_| TransportError::QueueFull)
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

/// Haptic output that keeps every command
pub struct RecordingHaptic {
    pub commands: Vec<MotorCommand, 64>,
    pub deactivations: u32,
    pub fail: bool,
}

impl RecordingHaptic {
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
            deactivations: 0,
            fail: false,
        }
    }
}

impl HapticOutput for RecordingHaptic {
    fn execute(&mut self, command: MotorCommand) -> Result<(), HardwareError> {
        if self.fail {
            return Err(HardwareError::Busy);
        }
        self.commands.push(command).map_err(|_| HardwareError::Busy)
    }

    fn deactivate_all(&mut self) -> Result<(), HardwareError> {
        self.deactivations += 1;
        Ok(())
    }
}

/// Clock the test moves by hand
pub struct ManualClock(Cell<u64>);

impl ManualClock {
    pub fn new(start_us: u64) -> Self {
        Self(Cell::new(start_us))
    }

    pub fn advance(&self, delta_us: u64) {
        self.0.set(self.0.get() + delta_us);
    }
}

impl MonotonicClock for ManualClock {
    fn now_us(&self) -> u64 {
        self.0.get()
    }
}
