//! Device configuration
//!
//! `device.toml` is validated by the build script and embedded as a
//! postcard blob, so decoding here only fails if the blob and the
//! firmware disagree on the layout.

use defmt::*;
use dyad_core::config::DeviceConfig;

/// Compiled device.toml
static DEVICE_BLOB: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/device.bin"));

/// Decode the embedded configuration, falling back to defaults
pub fn load_device_config() -> DeviceConfig {
    let config = match postcard::from_bytes::<DeviceConfig>(DEVICE_BLOB) {
        Ok(config) => config,
        Err(e) => {
            error!("Embedded config unreadable: {:?}", Debug2Format(&e));
            warn!("Using built-in defaults");
            return DeviceConfig::default();
        }
    };

    match config.validate() {
        Ok(()) => config,
        Err(e) => {
            error!("Embedded config rejected: {:?}", e);
            warn!("Using built-in defaults");
            DeviceConfig::default()
        }
    }
}
