//! Finger actuator task
//!
//! Holds each burst until its local deadline, drives the finger pin for
//! the burst duration and reports how late it started. Amplitude is
//! on/off only: any non-zero amplitude drives the pin fully.

use defmt::*;
use embassy_futures::select::{select, Either};
use embassy_rp::gpio::Output;
use embassy_time::{Instant, Timer};
use heapless::Vec;

use dyad_core::config::MAX_FINGERS;
use dyad_core::therapy::MotorCommand;

use crate::channels::{HapticRequest, DRIFT, HAPTIC_CMD};

/// Bursts waiting for their deadline
const MAX_PENDING: usize = 16;

/// Pin state and schedule for all fingers
struct Fingers {
    pins: [Output<'static>; MAX_FINGERS],
    /// Local time each driven finger switches off
    off_at: [Option<u64>; MAX_FINGERS],
    pending: Vec<MotorCommand, MAX_PENDING>,
}

impl Fingers {
    /// Earliest start or stop still to happen
    fn next_wake(&self) -> Option<u64> {
        let starts = self.pending.iter().map(|c| c.local_deadline_us());
        let stops = self.off_at.iter().flatten().copied();
        starts.chain(stops).min()
    }

    fn queue(&mut self, command: MotorCommand) {
        if command.amplitude == 0 {
            return;
        }
        if self.pending.push(command).is_err() {
            warn!("Haptic queue full, dropping finger {}", command.actuator.finger);
        }
    }

    fn deactivate_all(&mut self) {
        self.pending.clear();
        for (pin, off_at) in self.pins.iter_mut().zip(self.off_at.iter_mut()) {
            pin.set_low();
            *off_at = None;
        }
    }

    /// Start and stop everything that is due at `now`
    fn service(&mut self, now: u64) {
        for (pin, off_at) in self.pins.iter_mut().zip(self.off_at.iter_mut()) {
            if off_at.is_some_and(|t| t <= now) {
                pin.set_low();
                *off_at = None;
            }
        }

        let mut i = 0;
        while i < self.pending.len() {
            if self.pending[i].local_deadline_us() > now {
                i += 1;
                continue;
            }
            let command = self.pending.swap_remove(i);
            let finger = command.actuator.finger as usize;
            let Some(pin) = self.pins.get_mut(finger) else {
                warn!("No finger {}", finger);
                continue;
            };

            pin.set_high();
            self.off_at[finger] = Some(now + command.duration_ms as u64 * 1_000);

            let drift = command.drift_us(now);
            trace!("Finger {} on, drift {} us", finger, drift);
            if DRIFT.try_send(drift).is_err() {
                trace!("Drift channel full");
            }
        }
    }
}

/// Haptic task - plays bursts from the controller on the finger pins
#[embassy_executor::task]
pub async fn haptic_task(pins: [Output<'static>; MAX_FINGERS]) {
    info!("Haptic task started");

    let mut fingers = Fingers {
        pins,
        off_at: [None; MAX_FINGERS],
        pending: Vec::new(),
    };

    loop {
        let wake = fingers
            .next_wake()
            .map(Instant::from_micros)
            .unwrap_or(Instant::MAX);

        match select(HAPTIC_CMD.receive(), Timer::at(wake)).await {
            Either::First(HapticRequest::Execute(command)) => fingers.queue(command),
            Either::First(HapticRequest::DeactivateAll) => {
                debug!("All fingers off");
                fingers.deactivate_all();
            }
            Either::Second(()) => {}
        }

        fingers.service(Instant::now().as_micros());
    }
}
