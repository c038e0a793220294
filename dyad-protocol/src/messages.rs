//! Message types exchanged between the two gloves
//!
//! Message types are divided into three groups:
//! - Clock sync: probe, echo and the PRIMARY's published result
//! - Session control: PRIMARY → SECONDARY lifecycle commands
//! - Haptics: scheduled finger bursts in the shared reference time base
//!
//! Payloads are postcard-encoded tuples of the variant's fields.

use crate::frame::{Frame, FrameError, MAX_FRAME_SIZE, MAX_PAYLOAD_SIZE};
use serde::{de::DeserializeOwned, Serialize};

// Message type IDs: clock sync
pub const MSG_PING: u8 = 0x01;
pub const MSG_PONG: u8 = 0x02;
pub const MSG_SYNC_REPORT: u8 = 0x03;

// Message type IDs: session control
pub const MSG_START_SESSION: u8 = 0x10;
pub const MSG_PAUSE_SESSION: u8 = 0x11;
pub const MSG_RESUME_SESSION: u8 = 0x12;
pub const MSG_STOP_SESSION: u8 = 0x13;

// Message type IDs: haptics
pub const MSG_BUZZ: u8 = 0x20;
pub const MSG_DEACTIVATE: u8 = 0x21;

/// A message on the glove link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Message {
    /// Sync probe from PRIMARY, `t1` is PRIMARY's send time
    Ping { seq: u16, t1: u64 },
    /// Echo from SECONDARY: `t2` probe receipt, `t3` echo transmit
    Pong { seq: u16, t2: u64, t3: u64 },
    /// Result of a completed sync session, confidence as its wire byte
    SyncReport { offset_us: i64, confidence: u8 },
    /// Begin playback of a pattern
    StartSession { pattern: u8 },
    PauseSession,
    ResumeSession,
    StopSession,
    /// Drive one finger at `execute_at_us` (reference time)
    Buzz {
        finger: u8,
        amplitude: u8,
        duration_ms: u16,
        execute_at_us: u64,
    },
    /// Switch off every finger immediately
    Deactivate,
}

impl Message {
    /// Message type identifier for this variant
    pub fn msg_type(&self) -> u8 {
        match self {
            Message::Ping { .. } => MSG_PING,
            Message::Pong { .. } => MSG_PONG,
            Message::SyncReport { .. } => MSG_SYNC_REPORT,
            Message::StartSession { .. } => MSG_START_SESSION,
            Message::PauseSession => MSG_PAUSE_SESSION,
            Message::ResumeSession => MSG_RESUME_SESSION,
            Message::StopSession => MSG_STOP_SESSION,
            Message::Buzz { .. } => MSG_BUZZ,
            Message::Deactivate => MSG_DEACTIVATE,
        }
    }

    /// Encode this message into a frame
    pub fn to_frame(&self) -> Result<Frame, FrameError> {
        let msg_type = self.msg_type();
        match *self {
            Message::Ping { seq, t1 } => with_body(msg_type, &(seq, t1)),
            Message::Pong { seq, t2, t3 } => with_body(msg_type, &(seq, t2, t3)),
            Message::SyncReport {
                offset_us,
                confidence,
            } => with_body(msg_type, &(offset_us, confidence)),
            Message::StartSession { pattern } => with_body(msg_type, &pattern),
            Message::Buzz {
                finger,
                amplitude,
                duration_ms,
                execute_at_us,
            } => with_body(msg_type, &(finger, amplitude, duration_ms, execute_at_us)),
            Message::PauseSession
            | Message::ResumeSession
            | Message::StopSession
            | Message::Deactivate => Ok(Frame::empty(msg_type)),
        }
    }

    /// Parse a message from a frame
    pub fn from_frame(frame: &Frame) -> Result<Self, FrameError> {
        match frame.msg_type {
            MSG_PING => {
                let (seq, t1) = body(frame)?;
                Ok(Message::Ping { seq, t1 })
            }
            MSG_PONG => {
                let (seq, t2, t3) = body(frame)?;
                Ok(Message::Pong { seq, t2, t3 })
            }
            MSG_SYNC_REPORT => {
                let (offset_us, confidence) = body(frame)?;
                Ok(Message::SyncReport {
                    offset_us,
                    confidence,
                })
            }
            MSG_START_SESSION => Ok(Message::StartSession {
                pattern: body(frame)?,
            }),
            MSG_PAUSE_SESSION => Ok(Message::PauseSession),
            MSG_RESUME_SESSION => Ok(Message::ResumeSession),
            MSG_STOP_SESSION => Ok(Message::StopSession),
            MSG_BUZZ => {
                let (finger, amplitude, duration_ms, execute_at_us) = body(frame)?;
                Ok(Message::Buzz {
                    finger,
                    amplitude,
                    duration_ms,
                    execute_at_us,
                })
            }
            MSG_DEACTIVATE => Ok(Message::Deactivate),
            _ => Err(FrameError::InvalidFrame),
        }
    }

    /// Encode this message straight into wire bytes
    ///
    /// Returns the number of bytes written
    pub fn encode(&self, buffer: &mut [u8]) -> Result<usize, FrameError> {
        self.to_frame()?.encode(buffer)
    }

    /// Encode this message into a heapless Vec of wire bytes
    pub fn encode_to_vec(&self) -> Result<heapless::Vec<u8, MAX_FRAME_SIZE>, FrameError> {
        self.to_frame()?.encode_to_vec()
    }
}

fn with_body<T: Serialize>(msg_type: u8, fields: &T) -> Result<Frame, FrameError> {
    let mut scratch = [0u8; MAX_PAYLOAD_SIZE];
    let used = postcard::to_slice(fields, &mut scratch).map_err(|_| FrameError::PayloadTooLarge)?;
    Frame::new(msg_type, used)
}

fn body<T: DeserializeOwned>(frame: &Frame) -> Result<T, FrameError> {
    postcard::from_bytes(&frame.payload).map_err(|_| FrameError::InvalidFrame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameParser;

    #[test]
    fn test_ping_payload_is_varint_tuple() {
        let frame = Message::Ping { seq: 1, t1: 300 }.to_frame().unwrap();
        assert_eq!(frame.msg_type, MSG_PING);
        assert_eq!(&frame.payload[..], &[0x01, 0xAC, 0x02]);
    }

    #[test]
    fn test_sync_report_negative_offset() {
        let frame = Message::SyncReport {
            offset_us: -5,
            confidence: 3,
        }
        .to_frame()
        .unwrap();
        // zigzag encoding
        assert_eq!(&frame.payload[..], &[0x09, 0x03]);
    }

    #[test]
    fn test_control_messages_have_empty_payload() {
        for msg in [
            Message::PauseSession,
            Message::ResumeSession,
            Message::StopSession,
            Message::Deactivate,
        ] {
            let frame = msg.to_frame().unwrap();
            assert!(frame.payload.is_empty());
            assert_eq!(Message::from_frame(&frame).unwrap(), msg);
        }
    }

    #[test]
    fn test_pong_full_width_timestamps() {
        let msg = Message::Pong {
            seq: 7,
            t2: u64::MAX - 1,
            t3: u64::MAX,
        };
        let frame = msg.to_frame().unwrap();
        assert_eq!(Message::from_frame(&frame).unwrap(), msg);
    }

    #[test]
    fn test_buzz_through_parser() {
        let msg = Message::Buzz {
            finger: 2,
            amplitude: 100,
            duration_ms: 100,
            execute_at_us: 12_345_678,
        };
        let mut buffer = [0u8; MAX_FRAME_SIZE];
        let len = msg.encode(&mut buffer).unwrap();

        let mut parser = FrameParser::new();
        let (frame, consumed) = parser.feed_bytes(&buffer[..len]).unwrap().unwrap();
        assert_eq!(consumed, len);
        assert_eq!(Message::from_frame(&frame).unwrap(), msg);
    }

    #[test]
    fn test_unknown_type_rejected() {
        let frame = Frame::empty(0x7F);
        assert_eq!(Message::from_frame(&frame), Err(FrameError::InvalidFrame));
    }

    #[test]
    fn test_truncated_payload_rejected() {
        let frame = Frame::new(MSG_PONG, &[0x01, 0x02]).unwrap();
        assert_eq!(Message::from_frame(&frame), Err(FrameError::InvalidFrame));
    }
}
