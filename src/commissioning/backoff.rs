use fixed::types::{U16F16, U32F32};

use super::config::CommissioningConfig;

pub(crate) const BACKOFF_RECORD_LEN: usize = 5;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BackoffState {
    pub retries_remaining: u8,
    pub next_delay_ms: u32,
}

impl BackoffState {
    pub const fn initial(config: &CommissioningConfig) -> Self {
        Self {
            retries_remaining: config.initial_retries,
            next_delay_ms: config.start_delay_ms,
        }
    }

    /// Advances one failure: grows the delay while retries remain, then pins
    /// it at the configured maximum.
    pub fn advance(&mut self, config: &CommissioningConfig) {
        if self.retries_remaining > 0 {
            self.next_delay_ms =
                scale_delay(self.next_delay_ms, config.backoff_factor).min(config.max_delay_ms);
            self.retries_remaining -= 1;
        } else {
            self.next_delay_ms = config.max_delay_ms;
        }
    }

    pub fn exhausted(&self) -> bool {
        self.retries_remaining == 0
    }

    /// Pulls a restored record back into range. The deep-sleep interval is the
    /// only value allowed above the backoff cap.
    pub fn sanitized(self, config: &CommissioningConfig) -> Self {
        let ceiling = config.max_delay_ms.max(config.deep_sleep_interval_ms);
        let next_delay_ms = if self.next_delay_ms == config.deep_sleep_interval_ms {
            self.next_delay_ms
        } else {
            self.next_delay_ms
                .clamp(config.start_delay_ms, config.max_delay_ms)
        };
        Self {
            retries_remaining: self.retries_remaining.min(config.initial_retries),
            next_delay_ms: next_delay_ms.min(ceiling),
        }
    }

    pub(crate) fn record_bytes(self) -> [u8; BACKOFF_RECORD_LEN] {
        let mut record = [0u8; BACKOFF_RECORD_LEN];
        record[0] = self.retries_remaining;
        record[1..5].copy_from_slice(&self.next_delay_ms.to_le_bytes());
        record
    }

    pub(crate) fn from_record(record: &[u8]) -> Option<Self> {
        if record.len() != BACKOFF_RECORD_LEN {
            return None;
        }
        Some(Self {
            retries_remaining: record[0],
            next_delay_ms: u32::from_le_bytes([record[1], record[2], record[3], record[4]]),
        })
    }
}

fn scale_delay(delay_ms: u32, factor: U16F16) -> u32 {
    U32F32::from_num(delay_ms)
        .saturating_mul(U32F32::from_num(factor))
        .saturating_to_num::<u32>()
}
