use fixed::types::U16F16;

use super::types::BlinkPattern;

// Rejoin backoff: 10 s start, x1.5 per failure, 15 min cap.
pub const REJOIN_START_DELAY_MS: u32 = 10_000;
pub const REJOIN_MAX_DELAY_MS: u32 = 900_000;
pub const REJOIN_TRIES: u8 = 30;
// 1.5 in U16F16.
pub const REJOIN_BACKOFF_FACTOR: U16F16 = U16F16::from_bits(0x0001_8000);

// 50 consecutive failures: switch to hourly retries.
pub const DEEP_SLEEP_THRESHOLD: u16 = 50;
pub const DEEP_SLEEP_INTERVAL_MS: u32 = 3_600_000;
// 150 consecutive failures (~4 days on the hourly cadence): stop retrying and
// wait for the button.
pub const GIVE_UP_THRESHOLD: u16 = 150;

// Coordinator interview (endpoint discovery, binds, reporting) runs while the
// device still polls fast.
pub const INTERVIEW_SETTLE_MS: u32 = 120_000;
pub const PAIRING_TIMEOUT_MS: u32 = 180_000;
pub const BUTTON_FAST_POLL_MS: u32 = 3_000;

pub const FAST_POLL_PERIOD_MS: u32 = 100;
pub const NORMAL_POLL_PERIOD_MS: u32 = 10_000;

// Transmit power steps: 0 dBm .. +4 dBm.
pub const TX_POWER_MAX_STEP: u8 = 4;

pub const CHANNEL_MIN: u8 = 11;
pub const CHANNEL_MAX: u8 = 26;

pub const PAIRING_BLINK: BlinkPattern = BlinkPattern::continuous(100, 100);
pub const PAIRING_SUCCESS_BLINK: BlinkPattern = BlinkPattern::burst(3, 500, 500);
pub const PAIRING_FAILURE_BLINK: BlinkPattern = BlinkPattern::burst(1, 1_500, 0);
pub const DEEP_SLEEP_BLINK: BlinkPattern = BlinkPattern::burst(3, 1_000, 1_000);

pub const RECORD_STORE_MAGIC: u32 = 0x5A43_4E31;
pub const RECORD_STORE_VERSION: u8 = 1;
pub const RECORD_SLOT_LEN: usize = 32;
// magic(4) + version + id + len + checksum
pub const RECORD_FRAME_OVERHEAD: usize = 8;
pub const RECORD_PAYLOAD_MAX: usize = RECORD_SLOT_LEN - RECORD_FRAME_OVERHEAD;

/// Tunables for one engine instance. Values are clamped by
/// [`CommissioningConfig::sanitized`] when the engine is built.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommissioningConfig {
    pub start_delay_ms: u32,
    pub max_delay_ms: u32,
    pub initial_retries: u8,
    pub backoff_factor: U16F16,
    pub deep_sleep_threshold: u16,
    pub deep_sleep_interval_ms: u32,
    pub give_up_threshold: u16,
    pub interview_settle_ms: u32,
    pub pairing_timeout_ms: u32,
    pub button_fast_poll_ms: u32,
    pub fast_poll_period_ms: u32,
    pub normal_poll_period_ms: u32,
    pub max_tx_power_step: u8,
}

impl CommissioningConfig {
    pub const fn defaults() -> Self {
        Self {
            start_delay_ms: REJOIN_START_DELAY_MS,
            max_delay_ms: REJOIN_MAX_DELAY_MS,
            initial_retries: REJOIN_TRIES,
            backoff_factor: REJOIN_BACKOFF_FACTOR,
            deep_sleep_threshold: DEEP_SLEEP_THRESHOLD,
            deep_sleep_interval_ms: DEEP_SLEEP_INTERVAL_MS,
            give_up_threshold: GIVE_UP_THRESHOLD,
            interview_settle_ms: INTERVIEW_SETTLE_MS,
            pairing_timeout_ms: PAIRING_TIMEOUT_MS,
            button_fast_poll_ms: BUTTON_FAST_POLL_MS,
            fast_poll_period_ms: FAST_POLL_PERIOD_MS,
            normal_poll_period_ms: NORMAL_POLL_PERIOD_MS,
            max_tx_power_step: TX_POWER_MAX_STEP,
        }
    }

    /// Clamps values that would break the backoff invariants.
    pub fn sanitized(self) -> Self {
        let start_delay_ms = self.start_delay_ms.max(1);
        let max_delay_ms = self.max_delay_ms.max(start_delay_ms);
        let backoff_factor = if self.backoff_factor > U16F16::ONE {
            self.backoff_factor
        } else {
            REJOIN_BACKOFF_FACTOR
        };
        let deep_sleep_threshold = self.deep_sleep_threshold.max(1);
        let give_up_threshold = self.give_up_threshold.max(deep_sleep_threshold);
        Self {
            start_delay_ms,
            max_delay_ms,
            backoff_factor,
            deep_sleep_threshold,
            give_up_threshold,
            max_tx_power_step: self.max_tx_power_step.min(TX_POWER_MAX_STEP),
            ..self
        }
    }
}

impl Default for CommissioningConfig {
    fn default() -> Self {
        Self::defaults()
    }
}
