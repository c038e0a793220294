//! Radio bridge connection monitor
//!
//! Watches the bridge's STATE pin, which is held high while a peer is
//! connected, and publishes debounced edges.

use defmt::*;
use embassy_rp::gpio::Input;
use embassy_time::{Duration, Ticker};
use portable_atomic::Ordering;

use dyad_core::therapy::LinkEvent;

use crate::channels::{LINK_EVENTS, LINK_UP};

/// Sample period of the STATE pin
const POLL_MS: u32 = 10;

/// Link monitor configuration
pub struct LinkStateConfig {
    /// Debounce time in milliseconds
    pub debounce_ms: u32,
    /// Active level (true = high when connected)
    pub active_high: bool,
}

impl Default for LinkStateConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 50,
            active_high: true,
        }
    }
}

#[embassy_executor::task]
pub async fn link_state_task(state_pin: Input<'static>, config: LinkStateConfig) {
    info!("Link state task started");

    let mut ticker = Ticker::every(Duration::from_millis(POLL_MS as u64));
    let mut connected = false;
    let mut debounce_counter: u32 = 0;
    let debounce_threshold = (config.debounce_ms / POLL_MS).max(1);

    loop {
        let pin_connected = if config.active_high {
            state_pin.is_high()
        } else {
            state_pin.is_low()
        };

        if pin_connected != connected {
            debounce_counter = debounce_counter.saturating_add(1);
            if debounce_counter >= debounce_threshold {
                connected = pin_connected;
                debounce_counter = 0;
                LINK_UP.store(connected, Ordering::Release);

                let event = if connected {
                    info!("Peer connected");
                    LinkEvent::Established
                } else {
                    warn!("Peer disconnected");
                    LinkEvent::Lost
                };
                if LINK_EVENTS.try_send(event).is_err() {
                    warn!("Link event channel full, dropping {:?}", event);
                }
            }
        } else {
            debounce_counter = 0;
        }

        ticker.next().await;
    }
}
