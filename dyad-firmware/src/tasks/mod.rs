//! Embassy async tasks
//!
//! Each task runs independently and communicates via channels/signals.

pub mod button;
pub mod controller;
pub mod haptic;
pub mod link_rx;
pub mod link_state;
pub mod link_tx;
pub mod tick;

pub use button::{button_task, ButtonConfig};
pub use controller::controller_task;
pub use haptic::haptic_task;
pub use link_rx::link_rx_task;
pub use link_state::{link_state_task, LinkStateConfig};
pub use link_tx::link_tx_task;
pub use tick::tick_task;
