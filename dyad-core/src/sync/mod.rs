//! Clock synchronization between the two gloves

pub mod engine;
pub mod handoff;
pub mod link;
pub mod probe;
pub mod protocol;

pub use engine::{ClockSyncEngine, LatencyTracker, ProbeVerdict, SyncError, SyncOutcome};
pub use handoff::{EchoHandoff, InboundEcho};
pub use link::{Inbound, LinkDecoder};
pub use probe::{shift_us, ClockOffset, SyncProbe};
pub use protocol::{ProbePhase, SyncEvent, SyncProtocol, SyncStats};
