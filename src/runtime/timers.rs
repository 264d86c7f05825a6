use log::debug;

use super::ports::TimerSource;
use crate::commissioning::TimerKind;

/// Absolute deadlines, one slot per timer kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TimerSlots {
    now_ms: u64,
    deadlines: [Option<u64>; TimerKind::COUNT],
}

impl TimerSlots {
    pub const fn new() -> Self {
        Self {
            now_ms: 0,
            deadlines: [None; TimerKind::COUNT],
        }
    }

    /// Time base used for subsequent `after` calls.
    pub fn set_now(&mut self, now_ms: u64) {
        self.now_ms = now_ms;
    }

    pub fn deadline(&self, kind: TimerKind) -> Option<u64> {
        self.deadlines[kind.index()]
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.deadlines.iter().flatten().copied().min()
    }

    /// Removes and returns the earliest kind due at `now_ms`.
    pub fn take_due(&mut self, now_ms: u64) -> Option<TimerKind> {
        let kind = TimerKind::ALL
            .into_iter()
            .filter(|kind| matches!(self.deadline(*kind), Some(at) if at <= now_ms))
            .min_by_key(|kind| self.deadline(*kind))?;
        self.deadlines[kind.index()] = None;
        Some(kind)
    }
}

impl TimerSource for TimerSlots {
    fn after(&mut self, kind: TimerKind, delay_ms: u32) {
        let at = self.now_ms.saturating_add(u64::from(delay_ms));
        debug!(
            "commissioning: timer {} armed for {}ms",
            kind.as_str(),
            delay_ms
        );
        self.deadlines[kind.index()] = Some(at);
    }

    fn cancel(&mut self, kind: TimerKind) {
        self.deadlines[kind.index()] = None;
    }
}
