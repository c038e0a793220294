//! Haptic actuator output trait

use crate::therapy::MotorCommand;

/// Errors reported by the actuator hardware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HardwareError {
    /// Finger index has no actuator
    InvalidFinger,
    /// Command queue to the driver is full
    Busy,
    /// Driver bus error after its own retries
    Bus,
}

/// Motor driver for one glove's finger actuators
///
/// Commands are fire-and-forget: the implementation waits for each
/// command's local deadline and executes it. Bus retries are its own
/// business.
pub trait HapticOutput {
    /// Hand over a scheduled command
    fn execute(&mut self, command: MotorCommand) -> Result<(), HardwareError>;

    /// Switch every finger off now
    fn deactivate_all(&mut self) -> Result<(), HardwareError>;
}
