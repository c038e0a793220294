//! Inter-task communication channels
//!
//! Defines the static channels used for communication between Embassy tasks.
//! Uses embassy-sync primitives for safe async communication.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use heapless::Vec;
use portable_atomic::AtomicBool;

use dyad_core::sync::EchoHandoff;
use dyad_core::therapy::{LinkEvent, MotorCommand};
use dyad_protocol::{Message, MAX_FRAME_SIZE};

/// Channel capacity for link traffic in either direction
const LINK_CHANNEL_SIZE: usize = 16;

/// Channel capacity for haptic commands
const HAPTIC_CHANNEL_SIZE: usize = 16;

/// Work for the haptic task
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum HapticRequest {
    /// Play a burst at its local deadline
    Execute(MotorCommand),
    /// Drop everything queued and switch all fingers off
    DeactivateAll,
}

/// Button gestures
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum Press {
    Short,
    Long,
}

/// Decoded link messages with their local arrival time
pub static INBOUND: Channel<CriticalSectionRawMutex, (Message, u64), LINK_CHANNEL_SIZE> =
    Channel::new();

/// Encoded frames waiting for the UART
pub static OUTBOUND: Channel<
    CriticalSectionRawMutex,
    Vec<u8, MAX_FRAME_SIZE>,
    LINK_CHANNEL_SIZE,
> = Channel::new();

/// Latest probe echo, bypassing the message queue
pub static ECHO: EchoHandoff = EchoHandoff::new();

/// Haptic work from the controller
pub static HAPTIC_CMD: Channel<CriticalSectionRawMutex, HapticRequest, HAPTIC_CHANNEL_SIZE> =
    Channel::new();

/// Execution drift of each played burst, in microseconds
pub static DRIFT: Channel<CriticalSectionRawMutex, i32, HAPTIC_CHANNEL_SIZE> = Channel::new();

/// Link up/down edges from the radio bridge
pub static LINK_EVENTS: Channel<CriticalSectionRawMutex, LinkEvent, 4> = Channel::new();

/// Button gestures for the controller
pub static BUTTON: Channel<CriticalSectionRawMutex, Press, 4> = Channel::new();

/// Radio bridge reports a connected peer
pub static LINK_UP: AtomicBool = AtomicBool::new(false);
