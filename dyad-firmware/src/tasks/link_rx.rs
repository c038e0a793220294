//! Link UART receive task
//!
//! Receives frames from the radio bridge. Echoes go straight to the
//! handoff slot; everything else queues for the controller.

use defmt::*;
use embassy_rp::uart::BufferedUartRx;
use embassy_time::Instant;
use embedded_io_async::Read;

use dyad_core::sync::{Inbound, LinkDecoder};

use crate::channels::{ECHO, INBOUND};

/// Buffer size for UART receive
const RX_BUF_SIZE: usize = 64;

/// Link RX task - timestamps and decodes bytes from the peer glove
#[embassy_executor::task]
pub async fn link_rx_task(mut rx: BufferedUartRx) {
    info!("Link RX task started");

    let mut decoder = LinkDecoder::new();
    let mut buf = [0u8; RX_BUF_SIZE];
    let mut crc_errors = 0;

    loop {
        match rx.read(&mut buf).await {
            Ok(n) if n > 0 => {
                // Arrival time for everything in this chunk
                let received_at = Instant::now().as_micros();
                trace!("RX: {} bytes", n);

                decoder.feed(&buf[..n], received_at, |item| match item {
                    Inbound::Echo(echo) => {
                        if ECHO.publish(echo) {
                            debug!("Echo {} replaced an untaken echo", echo.seq);
                        }
                    }
                    Inbound::Message {
                        message,
                        received_at,
                    } => {
                        if INBOUND.try_send((message, received_at)).is_err() {
                            warn!("Inbound channel full, dropping {:?}", message);
                        }
                    }
                });

                if decoder.crc_errors() != crc_errors {
                    crc_errors = decoder.crc_errors();
                    warn!("Link CRC errors: {}", crc_errors);
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!("UART read error: {:?}", e);
            }
        }
    }
}
