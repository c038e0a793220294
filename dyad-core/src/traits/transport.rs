//! Glove link transport trait

use dyad_protocol::{FrameError, Message, MAX_FRAME_SIZE};

/// Errors that can occur when sending on the link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    /// No peer connected
    NotConnected,
    /// Outbound queue is full
    QueueFull,
    /// Message could not be framed
    Encode(FrameError),
}

impl From<FrameError> for TransportError {
    fn from(e: FrameError) -> Self {
        TransportError::Encode(e)
    }
}

/// Byte-level link to the peer glove
///
/// Connection setup, radio-level retries and fragmentation live behind
/// this trait. Inbound bytes are delivered separately through
/// [`LinkDecoder`](crate::sync::LinkDecoder).
pub trait Transport {
    /// Queue one encoded frame for transmission
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Check whether a peer is currently connected
    fn is_connected(&self) -> bool;

    /// Frame and send a message
    fn send_message(&mut self, message: &Message) -> Result<(), TransportError> {
        let mut buffer = [0u8; MAX_FRAME_SIZE];
        let len = message.encode(&mut buffer)?;
        self.send(&buffer[..len])
    }
}
