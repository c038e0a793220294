//! Every message survives encode, byte-wise parsing and decode

use dyad_protocol::{FrameParser, Message, FRAME_START};
use proptest::prelude::*;

fn any_message() -> impl Strategy<Value = Message> {
    prop_oneof![
        (any::<u16>(), any::<u64>()).prop_map(|(seq, t1)| Message::Ping { seq, t1 }),
        (any::<u16>(), any::<u64>(), any::<u64>())
            .prop_map(|(seq, t2, t3)| Message::Pong { seq, t2, t3 }),
        (any::<i64>(), any::<u8>()).prop_map(|(offset_us, confidence)| Message::SyncReport {
            offset_us,
            confidence,
        }),
        any::<u8>().prop_map(|pattern| Message::StartSession { pattern }),
        Just(Message::PauseSession),
        Just(Message::ResumeSession),
        Just(Message::StopSession),
        (any::<u8>(), any::<u8>(), any::<u16>(), any::<u64>()).prop_map(
            |(finger, amplitude, duration_ms, execute_at_us)| Message::Buzz {
                finger,
                amplitude,
                duration_ms,
                execute_at_us,
            }
        ),
        Just(Message::Deactivate),
    ]
}

proptest! {
    #[test]
    fn test_message_survives_the_wire(msg in any_message()) {
        let bytes = msg.encode_to_vec().unwrap();
        let mut parser = FrameParser::new();
        let (frame, consumed) = parser.feed_bytes(&bytes).unwrap().unwrap();
        prop_assert_eq!(consumed, bytes.len());
        prop_assert_eq!(Message::from_frame(&frame).unwrap(), msg);
    }

    #[test]
    fn test_leading_noise_is_skipped(
        msg in any_message(),
        noise in prop::collection::vec(any::<u8>().prop_filter("not a start byte", |b| *b != FRAME_START), 0..16),
    ) {
        let mut stream = noise;
        stream.extend_from_slice(&msg.encode_to_vec().unwrap());
        let mut parser = FrameParser::new();
        let (frame, consumed) = parser.feed_bytes(&stream).unwrap().unwrap();
        prop_assert_eq!(consumed, stream.len());
        prop_assert_eq!(Message::from_frame(&frame).unwrap(), msg);
    }
}

#[test]
fn test_extreme_timestamps_round_trip() {
    for msg in [
        Message::Ping { seq: u16::MAX, t1: u64::MAX },
        Message::SyncReport { offset_us: i64::MIN, confidence: 0 },
        Message::SyncReport { offset_us: i64::MAX, confidence: 3 },
    ] {
        let bytes = msg.encode_to_vec().unwrap();
        let (frame, _) = FrameParser::new().feed_bytes(&bytes).unwrap().unwrap();
        assert_eq!(Message::from_frame(&frame).unwrap(), msg);
    }
}
