//! Pattern playback and the therapy lifecycle

pub mod command;
pub mod machine;
pub mod pattern;
pub mod session;

pub use command::{Actuator, MotorCommand};
pub use machine::{
    DispatchStats, LinkEvent, QueueFull, Request, TherapyStateMachine, TickReport, Transition,
    MAX_TRANSITIONS,
};
pub use pattern::{Pattern, PatternKind};
pub use session::{ScheduledStep, TherapySession};
