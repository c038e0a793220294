//! Tick task for the therapy controller
//!
//! The controller does all of its work on these ticks: sync probing,
//! timeouts and step dispatch.

use defmt::*;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Ticker};

/// Tick interval in milliseconds
pub const TICK_INTERVAL_MS: u32 = 10;

/// Signal to notify controller of tick, carrying the tick count
pub static TICK_SIGNAL: Signal<CriticalSectionRawMutex, u32> = Signal::new();

#[embassy_executor::task]
pub async fn tick_task() {
    info!("Tick task started");

    let mut ticker = Ticker::every(Duration::from_millis(TICK_INTERVAL_MS as u64));
    let mut count: u32 = 0;

    loop {
        ticker.next().await;
        count = count.wrapping_add(1);
        TICK_SIGNAL.signal(count);
    }
}
