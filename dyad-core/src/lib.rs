//! Board-agnostic core logic for the Dyad glove firmware
//!
//! This crate contains all application logic that does not depend on
//! specific hardware implementations:
//!
//! - Collaborator traits (link transport, haptic output, clock)
//! - Latency and sync-quality telemetry
//! - Probe-based clock offset estimation and the sync handshake
//! - Therapy lifecycle state machine and pattern scheduling
//! - Configuration type definitions

#![no_std]
#![deny(unsafe_code)]

pub mod config;
pub mod metrics;
pub mod state;
pub mod sync;
pub mod therapy;
pub mod traits;

#[cfg(test)]
mod testing;
