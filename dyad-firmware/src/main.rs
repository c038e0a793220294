//! Dyad - Bilateral Haptic Glove Firmware
//!
//! Main firmware binary for RP2040-based gloves. One build per glove:
//! `device.toml` decides whether this is the PRIMARY or the SECONDARY.
//!
//! The peer glove is reached through a UART radio bridge whose STATE
//! pin reports the connection.

#![no_std]
#![no_main]

use defmt::*;
use embassy_executor::Spawner;
use embassy_rp::bind_interrupts;
use embassy_rp::gpio::{Input, Level, Output, Pull};
use embassy_rp::peripherals::UART0;
use embassy_rp::uart::{BufferedInterruptHandler, Config as UartConfig, Uart};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use crate::config::load_device_config;

mod bridge;
mod channels;
mod config;
mod tasks;

bind_interrupts!(struct Irqs {
    UART0_IRQ => BufferedInterruptHandler<UART0>;
});

// Static cells for UART buffers (must live forever)
static TX_BUF: StaticCell<[u8; 256]> = StaticCell::new();
static RX_BUF: StaticCell<[u8; 256]> = StaticCell::new();

/// Main entry point
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Dyad firmware starting...");

    let p = embassy_rp::init(Default::default());
    info!("Peripherals initialized");

    let config = load_device_config();
    info!(
        "Configuration loaded: {:?}, {} fingers, pattern {:?}",
        config.role, config.therapy.fingers, config.therapy.pattern
    );

    // Radio bridge UART (GPIO0 TX, GPIO1 RX)
    let mut uart_config = UartConfig::default();
    uart_config.baudrate = 115_200;

    let tx_buf = TX_BUF.init([0u8; 256]);
    let rx_buf = RX_BUF.init([0u8; 256]);

    let uart = Uart::new_blocking(p.UART0, p.PIN_0, p.PIN_1, uart_config);
    let uart = uart.into_buffered(Irqs, tx_buf, rx_buf);
    let (tx, rx) = uart.split();

    info!("UART initialized for the glove link");

    // Bridge STATE pin (GPIO2), high while connected
    let link_state_pin = Input::new(p.PIN_2, Pull::Down);

    // User button (GPIO3), active low
    let button_pin = Input::new(p.PIN_3, Pull::Up);

    // Finger drivers, thumb to little finger (GPIO10-14)
    let fingers = [
        Output::new(p.PIN_10, Level::Low),
        Output::new(p.PIN_11, Level::Low),
        Output::new(p.PIN_12, Level::Low),
        Output::new(p.PIN_13, Level::Low),
        Output::new(p.PIN_14, Level::Low),
    ];

    info!("GPIO initialized");

    spawner.spawn(tasks::tick_task()).unwrap();
    spawner.spawn(tasks::link_rx_task(rx)).unwrap();
    spawner.spawn(tasks::link_tx_task(tx)).unwrap();
    spawner
        .spawn(tasks::link_state_task(
            link_state_pin,
            tasks::LinkStateConfig::default(),
        ))
        .unwrap();
    spawner
        .spawn(tasks::button_task(button_pin, tasks::ButtonConfig::default()))
        .unwrap();
    spawner.spawn(tasks::haptic_task(fingers)).unwrap();
    spawner.spawn(tasks::controller_task(config)).unwrap();

    info!("All tasks spawned, firmware running");

    loop {
        embassy_time::Timer::after_secs(60).await;
        trace!("Main loop heartbeat");
    }
}
