//! User button task
//!
//! Short press starts, pauses and resumes; a long press stops. The
//! controller decides what a press means in the current state.

use defmt::*;
use embassy_rp::gpio::Input;
use embassy_time::{Duration, Instant, Timer};

use crate::channels::{Press, BUTTON};

/// Button configuration
pub struct ButtonConfig {
    /// Contact bounce settle time
    pub debounce_ms: u64,
    /// Hold time that turns a press into a long press
    pub long_press_ms: u64,
}

impl Default for ButtonConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 20,
            long_press_ms: 1_500,
        }
    }
}

/// Button task; the pin is active low with a pull-up
#[embassy_executor::task]
pub async fn button_task(mut pin: Input<'static>, config: ButtonConfig) {
    info!("Button task started");

    loop {
        pin.wait_for_falling_edge().await;
        Timer::after(Duration::from_millis(config.debounce_ms)).await;
        if pin.is_high() {
            continue;
        }

        let pressed_at = Instant::now();
        pin.wait_for_high().await;
        let held = pressed_at.elapsed();

        let press = if held >= Duration::from_millis(config.long_press_ms) {
            Press::Long
        } else {
            Press::Short
        };
        debug!("Button {:?} ({} ms)", press, held.as_millis());

        if BUTTON.try_send(press).is_err() {
            warn!("Button channel full, dropping press");
        }
        Timer::after(Duration::from_millis(config.debounce_ms)).await;
    }
}
