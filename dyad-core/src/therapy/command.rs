//! Scheduled actuator commands

use crate::config::DeviceRole;
use crate::sync::shift_us;

/// One finger actuator on one glove
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Actuator {
    pub side: DeviceRole,
    pub finger: u8,
}

/// A burst to play at a point in shared reference time
///
/// Carries the offset that was current when it was dispatched, so a later
/// resync never moves a command that is already out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotorCommand {
    pub actuator: Actuator,
    /// Drive amplitude, 0-100
    pub amplitude: u8,
    pub duration_ms: u16,
    /// Execution time on the reference clock
    pub execute_at_us: u64,
    /// Local-to-reference offset at dispatch
    pub offset_us: i64,
}

impl MotorCommand {
    /// Execution time on this glove's clock
    pub fn local_deadline_us(&self) -> u64 {
        shift_us(self.execute_at_us, self.offset_us.saturating_neg())
    }

    /// Signed execution error for a burst that started at `local_us`
    pub fn drift_us(&self, local_us: u64) -> i32 {
        let drift = local_us as i128 - self.local_deadline_us() as i128;
        drift.clamp(i32::MIN as i128, i32::MAX as i128) as i32
    }
}
