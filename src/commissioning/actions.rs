use heapless::Vec;

use super::backoff::BackoffState;
use super::metrics::NetworkMetrics;
use super::types::{BlinkPattern, TimerKind};

/// Side effects requested by the engine, applied in order by the runtime.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CommissioningAction {
    StartCommissioning,
    RequestRecovery,
    PreferChannel(u8),
    SetTxPower(u8),
    SetPollRate { period_ms: u32 },
    ArmTimer { kind: TimerKind, delay_ms: u32 },
    CancelTimer(TimerKind),
    Blink(BlinkPattern),
    SetIndicator(bool),
    PersistBackoff(BackoffState),
    PersistMetrics(NetworkMetrics),
    PersistLastChannel(u8),
}

const ACTION_BUFFER_CAP: usize = 20;

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct ActionBuffer {
    actions: Vec<CommissioningAction, ACTION_BUFFER_CAP>,
}

impl ActionBuffer {
    pub const fn new() -> Self {
        Self {
            actions: Vec::new(),
        }
    }

    pub fn push(&mut self, action: CommissioningAction) {
        if self.actions.push(action).is_err() {
            log::error!("commissioning: action buffer full, dropped {:?}", action);
        }
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CommissioningAction> {
        self.actions.iter()
    }

    pub fn contains(&self, action: &CommissioningAction) -> bool {
        self.actions.contains(action)
    }

    pub fn armed_delay(&self, kind: TimerKind) -> Option<u32> {
        self.actions.iter().rev().find_map(|action| match action {
            CommissioningAction::ArmTimer {
                kind: armed,
                delay_ms,
            } if *armed == kind => Some(*delay_ms),
            _ => None,
        })
    }

    pub fn requests_recovery(&self) -> bool {
        self.contains(&CommissioningAction::RequestRecovery)
    }

    pub fn blinks(&self) -> impl Iterator<Item = BlinkPattern> + '_ {
        self.iter().filter_map(|action| match action {
            CommissioningAction::Blink(pattern) => Some(*pattern),
            _ => None,
        })
    }
}

impl<'a> IntoIterator for &'a ActionBuffer {
    type Item = &'a CommissioningAction;
    type IntoIter = core::slice::Iter<'a, CommissioningAction>;

    fn into_iter(self) -> Self::IntoIter {
        self.actions.iter()
    }
}
