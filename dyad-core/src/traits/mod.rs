//! Collaborator traits
//!
//! These traits define the interface between the sync and therapy logic
//! and the radio, actuator and timer implementations.

pub mod clock;
pub mod haptic;
pub mod transport;

pub use clock::MonotonicClock;
pub use haptic::{HapticOutput, HardwareError};
pub use transport::{Transport, TransportError};
