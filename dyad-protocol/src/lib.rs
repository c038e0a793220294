//! Dyad glove-to-glove link protocol
//!
//! This crate defines the messages exchanged between the PRIMARY and
//! SECONDARY gloves over the wireless link. The radio itself is handled
//! elsewhere; this crate only turns typed messages into bytes and back.
//!
//! # Protocol Overview
//!
//! Every message travels in a small binary frame:
//! ```text
//! ┌───────┬────────┬──────┬─────────────┬──────┐
//! │ START │ LENGTH │ TYPE │ PAYLOAD     │ CRC8 │
//! │ 1B    │ 1B     │ 1B   │ 0–64B       │ 1B   │
//! └───────┴────────┴──────┴─────────────┴──────┘
//! ```
//!
//! Payloads are postcard-encoded tuples, so timestamps stay full 64-bit
//! without any high/low splitting.

#![no_std]
#![deny(unsafe_code)]

pub mod frame;
pub mod messages;

pub use frame::{Frame, FrameError, FrameParser, FRAME_START, MAX_FRAME_SIZE, MAX_PAYLOAD_SIZE};
pub use messages::Message;
