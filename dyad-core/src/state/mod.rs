//! Therapy lifecycle state machine
//!
//! The transition table is pure: a state and an event give the next
//! state. Entry actions live in [`crate::therapy::TherapyStateMachine`].

pub mod events;
pub mod machine;

pub use events::Event;
pub use machine::{ErrorKind, State};
