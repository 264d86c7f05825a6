use crate::commissioning::{
    BlinkPattern, CommissioningMode, CommissioningStatus, LinkSample, TimerKind,
};

/// The network stack as seen by the commissioning policy. Every call is fire
/// and forget; outcomes come back as status reports.
pub trait NetworkStack {
    fn start_commissioning(&mut self);
    fn request_recovery(&mut self);
    fn set_transmit_power(&mut self, step: u8);
    fn set_poll_rate(&mut self, period_ms: u32);
    fn prefer_channel(&mut self, channel: u8);
    fn link_sample(&self) -> LinkSample;
    fn bind_capacity(&self) -> BindCapacity;
}

pub trait FeedbackSignal {
    fn blink(&mut self, pattern: BlinkPattern);
    fn set_continuous(&mut self, on: bool);
}

/// One-shot timers keyed by kind. Arming a pending kind replaces it;
/// cancelling an idle kind does nothing.
pub trait TimerSource {
    fn after(&mut self, kind: TimerKind, delay_ms: u32);
    fn cancel(&mut self, kind: TimerKind);
}

pub trait StatusObserver {
    fn on_commissioning_status(
        &mut self,
        mode: CommissioningMode,
        status: CommissioningStatus,
        remaining_modes: u8,
    );
    fn on_bind_request(&mut self, request: Option<&BindRequest>);
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BindRequest {
    pub cluster_id: u16,
    pub destination_address: u64,
    pub endpoint: u8,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct BindCapacity {
    pub max: u8,
    pub used: u8,
}
