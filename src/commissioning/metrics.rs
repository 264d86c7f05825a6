use super::config::{CHANNEL_MAX, CHANNEL_MIN};
use super::types::TxPowerMode;

pub(crate) const METRICS_RECORD_LEN: usize = 15;

/// Link and rejoin statistics. Also read by attribute reporting, which only
/// ever sees copies.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct NetworkMetrics {
    pub parent_link_quality: u8,
    pub rejoin_attempts: u16,
    pub rejoin_successes: u16,
    pub rejoin_failures: u16,
    pub last_rejoin_time_ms: u32,
    pub last_good_channel: u8,
    pub current_tx_power_step: u8,
    pub consecutive_failures: u16,
}

impl NetworkMetrics {
    pub fn record_failure(&mut self) {
        self.rejoin_attempts = self.rejoin_attempts.saturating_add(1);
        self.rejoin_failures = self.rejoin_failures.saturating_add(1);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
    }

    pub fn record_success(&mut self) {
        self.rejoin_successes = self.rejoin_successes.saturating_add(1);
        self.consecutive_failures = 0;
    }

    pub fn quick_rejoin_channel(&self) -> Option<u8> {
        is_valid_channel(self.last_good_channel).then_some(self.last_good_channel)
    }

    /// Raises or lowers the transmit power one step. Returns the new step when
    /// it changed; manual modes and the range bounds make this a no-op.
    pub fn adapt_tx_power(&mut self, mode: TxPowerMode, increase: bool, max_step: u8) -> Option<u8> {
        if !mode.is_adaptive() {
            return None;
        }
        let current = self.current_tx_power_step.min(max_step);
        let next = if increase {
            current.saturating_add(1).min(max_step)
        } else {
            current.saturating_sub(1)
        };
        if next == self.current_tx_power_step {
            return None;
        }
        self.current_tx_power_step = next;
        Some(next)
    }

    pub fn sanitized(self, max_step: u8) -> Self {
        Self {
            current_tx_power_step: self.current_tx_power_step.min(max_step),
            last_good_channel: if is_valid_channel(self.last_good_channel) {
                self.last_good_channel
            } else {
                0
            },
            ..self
        }
    }

    pub(crate) fn record_bytes(self) -> [u8; METRICS_RECORD_LEN] {
        let mut record = [0u8; METRICS_RECORD_LEN];
        record[0] = self.parent_link_quality;
        record[1..3].copy_from_slice(&self.rejoin_attempts.to_le_bytes());
        record[3..5].copy_from_slice(&self.rejoin_successes.to_le_bytes());
        record[5..7].copy_from_slice(&self.rejoin_failures.to_le_bytes());
        record[7..11].copy_from_slice(&self.last_rejoin_time_ms.to_le_bytes());
        record[11] = self.last_good_channel;
        record[12] = self.current_tx_power_step;
        record[13..15].copy_from_slice(&self.consecutive_failures.to_le_bytes());
        record
    }

    pub(crate) fn from_record(record: &[u8]) -> Option<Self> {
        if record.len() != METRICS_RECORD_LEN {
            return None;
        }
        Some(Self {
            parent_link_quality: record[0],
            rejoin_attempts: u16::from_le_bytes([record[1], record[2]]),
            rejoin_successes: u16::from_le_bytes([record[3], record[4]]),
            rejoin_failures: u16::from_le_bytes([record[5], record[6]]),
            last_rejoin_time_ms: u32::from_le_bytes([
                record[7], record[8], record[9], record[10],
            ]),
            last_good_channel: record[11],
            current_tx_power_step: record[12],
            consecutive_failures: u16::from_le_bytes([record[13], record[14]]),
        })
    }
}

pub const fn is_valid_channel(channel: u8) -> bool {
    channel >= CHANNEL_MIN && channel <= CHANNEL_MAX
}
