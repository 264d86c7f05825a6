pub mod actions;
pub mod backoff;
pub mod config;
pub mod engine;
pub(crate) mod events;
pub(crate) mod machine;
pub mod metrics;
pub mod store;
#[cfg(test)]
mod tests;
pub mod types;

pub use actions::{ActionBuffer, CommissioningAction};
pub use backoff::BackoffState;
pub use config::CommissioningConfig;
pub use engine::{CommissioningEngine, CommissioningSnapshot, EngineOutput};
pub use metrics::NetworkMetrics;
pub use store::{
    FlashRecordStore, PersistedCommissioning, RecordBuf, RecordId, RecordStore, StoreError,
};
pub use types::{
    BlinkPattern, CommissioningMode, CommissioningStatus, LinkSample, Phase, StatusReport,
    TimerKind, TxPowerMode,
};
