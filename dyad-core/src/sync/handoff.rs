//! Single-slot echo handoff between the receive path and the tick loop
//!
//! The receive side (interrupt or RX task) publishes the latest echo
//! together with the timestamp it captured on arrival; the tick loop takes
//! it. Both sides touch the slot only inside a critical section, so the
//! tick always sees a whole echo, never half of one.

use core::cell::Cell;

use critical_section::Mutex;

/// A probe echo as it arrived off the link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InboundEcho {
    /// Sequence number of the probe being answered
    pub seq: u16,
    /// Peer time when the probe arrived
    pub echoed_at: u64,
    /// Peer time when the echo left
    pub echo_sent_at: u64,
    /// Local time when the echo bytes arrived
    pub received_at: u64,
}

/// Single-producer single-consumer echo slot
pub struct EchoHandoff {
    slot: Mutex<Cell<Option<InboundEcho>>>,
}

impl Default for EchoHandoff {
    fn default() -> Self {
        Self::new()
    }
}

impl EchoHandoff {
    pub const fn new() -> Self {
        Self {
            slot: Mutex::new(Cell::new(None)),
        }
    }

    /// Store an echo, replacing any the tick has not taken yet
    ///
    /// Returns true if an untaken echo was overwritten.
    pub fn publish(&self, echo: InboundEcho) -> bool {
        critical_section::with(|cs| self.slot.borrow(cs).replace(Some(echo)).is_some())
    }

    /// Read and clear the slot
    pub fn take(&self) -> Option<InboundEcho> {
        critical_section::with(|cs| self.slot.borrow(cs).take())
    }

    /// Check for a pending echo without consuming it
    pub fn is_pending(&self) -> bool {
        critical_section::with(|cs| self.slot.borrow(cs).get().is_some())
    }
}
