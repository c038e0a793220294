//! Link UART transmit task

use defmt::*;
use embassy_rp::uart::BufferedUartTx;
use embedded_io_async::Write;

use crate::channels::OUTBOUND;

/// Link TX task - writes queued frames to the radio bridge
#[embassy_executor::task]
pub async fn link_tx_task(mut tx: BufferedUartTx) {
    info!("Link TX task started");

    loop {
        let frame = OUTBOUND.receive().await;
        if let Err(e) = tx.write_all(&frame).await {
            warn!("Failed to send frame: {:?}", e);
        } else {
            trace!("TX: {} bytes", frame.len());
        }
    }
}
