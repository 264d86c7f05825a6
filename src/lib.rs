//! Network-membership policy for a battery-powered end device.
//!
//! The [`commissioning`] engine turns stack status reports, timer expiries and
//! button presses into retry, transmit-power, feedback and persistence
//! decisions. [`runtime`] binds it to the outside world through small port
//! traits and drives it from a single ordered input queue.

#![cfg_attr(not(test), no_std)]

pub mod commissioning;
#[cfg(feature = "esp32")]
pub mod firmware;
pub mod runtime;

pub use commissioning::{
    BackoffState, CommissioningConfig, CommissioningEngine, CommissioningMode,
    CommissioningStatus, EngineOutput, NetworkMetrics, Phase, TxPowerMode,
};
pub use runtime::{CommissioningNode, NodeInput, StatusObserver};
