//! Inbound link decoding
//!
//! Turns raw transport bytes into echoes for the [`EchoHandoff`] and
//! messages for the tick loop. The receive timestamp is captured by the
//! caller when the bytes arrive and travels with everything decoded from
//! them.
//!
//! [`EchoHandoff`]: super::EchoHandoff

use dyad_protocol::{FrameError, FrameParser, Message};

use super::handoff::InboundEcho;

/// One decoded item from the link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Inbound {
    /// Probe echo, bound for the sync engine
    Echo(InboundEcho),
    /// Anything else, with the local arrival time
    Message { message: Message, received_at: u64 },
}

/// Streaming decoder for the glove link
#[derive(Debug, Clone, Default)]
pub struct LinkDecoder {
    parser: FrameParser,
    crc_errors: u32,
    malformed: u32,
}

impl LinkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a chunk of bytes that arrived at `received_at_us`
    ///
    /// Calls `sink` once per decoded item. Bad frames are counted and
    /// skipped; the parser resynchronises on the next start byte.
    pub fn feed(&mut self, bytes: &[u8], received_at_us: u64, mut sink: impl FnMut(Inbound)) {
        for &byte in bytes {
            let frame = match self.parser.feed(byte) {
                Ok(Some(frame)) => frame,
                Ok(None) => continue,
                Err(FrameError::InvalidCrc) => {
                    self.crc_errors = self.crc_errors.saturating_add(1);
                    continue;
                }
                Err(_) => {
                    self.malformed = self.malformed.saturating_add(1);
                    continue;
                }
            };

            match Message::from_frame(&frame) {
                Ok(Message::Pong { seq, t2, t3 }) => sink(Inbound::Echo(InboundEcho {
                    seq,
                    echoed_at: t2,
                    echo_sent_at: t3,
                    received_at: received_at_us,
                })),
                Ok(message) => sink(Inbound::Message {
                    message,
                    received_at: received_at_us,
                }),
                Err(_) => self.malformed = self.malformed.saturating_add(1),
            }
        }
    }

    /// Frames dropped for a bad checksum
    pub fn crc_errors(&self) -> u32 {
        self.crc_errors
    }

    /// Frames dropped for a bad length or unknown body
    pub fn malformed(&self) -> u32 {
        self.malformed
    }
}
