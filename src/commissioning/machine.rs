use log::{debug, info, warn};
use statig::prelude::*;

use super::actions::{ActionBuffer, CommissioningAction};
use super::backoff::BackoffState;
use super::config::{
    CommissioningConfig, DEEP_SLEEP_BLINK, PAIRING_BLINK, PAIRING_FAILURE_BLINK,
    PAIRING_SUCCESS_BLINK,
};
use super::events::CommissioningEvent;
use super::metrics::{is_valid_channel, NetworkMetrics};
use super::types::{
    CommissioningMode, CommissioningStatus, LinkSample, Phase, StatusReport, TimerKind,
    TxPowerMode,
};

#[derive(Clone, Copy, Debug)]
pub(super) struct CommissioningMachine {
    pub(super) config: CommissioningConfig,
    pub(super) tx_power_mode: TxPowerMode,
    pub(super) backoff: BackoffState,
    pub(super) metrics: NetworkMetrics,
    pub(super) phase: Phase,
    pub(super) pairing_active: bool,
    quick_rejoin_attempted: bool,
    deep_sleep_signalled: bool,
    streak_started_ms: Option<u64>,
}

#[derive(Default)]
pub(super) struct DispatchContext {
    pub(super) now_ms: u64,
    pub(super) actions: ActionBuffer,
}

impl DispatchContext {
    pub(super) fn at(now_ms: u64) -> Self {
        Self {
            now_ms,
            actions: ActionBuffer::new(),
        }
    }

    fn push(&mut self, action: CommissioningAction) {
        self.actions.push(action);
    }
}

impl CommissioningMachine {
    pub(super) fn new(
        config: CommissioningConfig,
        tx_power_mode: TxPowerMode,
        backoff: BackoffState,
        metrics: NetworkMetrics,
    ) -> Self {
        Self {
            config,
            tx_power_mode,
            backoff,
            metrics,
            phase: Phase::Initializing,
            pairing_active: false,
            quick_rejoin_attempted: false,
            deep_sleep_signalled: false,
            streak_started_ms: None,
        }
    }

    fn enter(&mut self, phase: Phase) -> Outcome<State> {
        if self.phase != phase {
            debug!(
                "commissioning: phase {} -> {}",
                self.phase.as_str(),
                phase.as_str()
            );
        }
        self.phase = phase;
        Transition(match phase {
            Phase::Initializing => State::initializing(),
            Phase::Pairing => State::pairing(),
            Phase::Attached => State::attached(),
            Phase::Detached => State::detached(),
            Phase::Rejoining => State::rejoining(),
            Phase::GaveUp => State::gave_up(),
        })
    }

    fn start(&mut self, context: &mut DispatchContext) {
        if self.tx_power_mode.is_adaptive() {
            context.push(CommissioningAction::SetTxPower(
                self.metrics.current_tx_power_step,
            ));
        }
        info!(
            "commissioning: start attempts={} successes={} failures={} tx_step={}",
            self.metrics.rejoin_attempts,
            self.metrics.rejoin_successes,
            self.metrics.rejoin_failures,
            self.metrics.current_tx_power_step
        );
        context.push(CommissioningAction::StartCommissioning);
    }

    fn on_status(&mut self, context: &mut DispatchContext, report: StatusReport) -> Outcome<State> {
        info!(
            "commissioning: mode={:?} status={:?} remaining=0x{:02X}",
            report.mode, report.status, report.remaining_modes
        );
        match (report.mode, report.status) {
            (CommissioningMode::Initialization, CommissioningStatus::NoNetwork) => {
                self.start_pairing(context);
                self.enter(Phase::Pairing)
            }
            (CommissioningMode::Initialization, CommissioningStatus::NetworkRestored)
            | (CommissioningMode::NetworkSteering, CommissioningStatus::Success) => {
                self.finish_pairing(context, true);
                self.on_connect(context, report.link);
                self.enter(Phase::Attached)
            }
            (CommissioningMode::NetworkSteering, CommissioningStatus::InProgress) => Handled,
            (CommissioningMode::NetworkSteering, _) => {
                self.finish_pairing(context, false);
                if matches!(self.phase, Phase::Rejoining | Phase::GaveUp) {
                    return Handled;
                }
                info!("commissioning: network join failed, press button to retry");
                self.enter(Phase::Detached)
            }
            (CommissioningMode::ParentLost, CommissioningStatus::NetworkRestored) => {
                self.on_parent_restored(context);
                self.enter(Phase::Attached)
            }
            (CommissioningMode::ParentLost, _) => {
                if self.handle_failure(context) {
                    self.enter(Phase::GaveUp)
                } else {
                    self.enter(Phase::Rejoining)
                }
            }
            _ => Handled,
        }
    }

    fn start_pairing(&mut self, context: &mut DispatchContext) {
        self.pairing_active = true;
        context.push(CommissioningAction::CancelTimer(TimerKind::PollStepDown));
        context.push(CommissioningAction::CancelTimer(TimerKind::PollRestore));
        context.push(CommissioningAction::Blink(PAIRING_BLINK));
        context.push(CommissioningAction::SetPollRate {
            period_ms: self.config.fast_poll_period_ms,
        });
        context.push(CommissioningAction::ArmTimer {
            kind: TimerKind::PairingTimeout,
            delay_ms: self.config.pairing_timeout_ms,
        });
        info!("commissioning: pairing mode");
    }

    fn finish_pairing(&mut self, context: &mut DispatchContext, success: bool) {
        if !self.pairing_active {
            if success {
                info!("commissioning: rejoin success (silent)");
            }
            return;
        }
        self.pairing_active = false;
        context.push(CommissioningAction::CancelTimer(TimerKind::PairingTimeout));
        context.push(CommissioningAction::SetIndicator(false));
        let pattern = if success {
            PAIRING_SUCCESS_BLINK
        } else {
            PAIRING_FAILURE_BLINK
        };
        context.push(CommissioningAction::Blink(pattern));
        info!(
            "commissioning: pairing {}",
            if success { "success" } else { "failed" }
        );
    }

    fn end_pairing_on_timeout(&mut self, context: &mut DispatchContext) {
        self.pairing_active = false;
        context.push(CommissioningAction::SetIndicator(false));
        context.push(CommissioningAction::SetPollRate {
            period_ms: self.config.normal_poll_period_ms,
        });
        info!("commissioning: pairing timeout");
    }

    fn on_connect(&mut self, context: &mut DispatchContext, link: LinkSample) {
        context.push(CommissioningAction::CancelTimer(TimerKind::PollRestore));
        context.push(CommissioningAction::CancelTimer(TimerKind::PollStepDown));

        self.metrics.record_success();
        self.close_streak(context.now_ms);
        self.metrics.parent_link_quality = link.lqi;
        if is_valid_channel(link.channel) {
            self.metrics.last_good_channel = link.channel;
        }
        info!(
            "commissioning: connected lqi={} channel={}",
            link.lqi, link.channel
        );

        if let Some(step) = self.metrics.adapt_tx_power(
            self.tx_power_mode,
            false,
            self.config.max_tx_power_step,
        ) {
            info!("commissioning: tx power lowered to step {}", step);
            context.push(CommissioningAction::SetTxPower(step));
        }
        context.push(CommissioningAction::PersistMetrics(self.metrics));
        context.push(CommissioningAction::PersistLastChannel(
            self.metrics.last_good_channel,
        ));

        self.reset_backoff(context);
        context.push(CommissioningAction::CancelTimer(TimerKind::RejoinRetry));

        context.push(CommissioningAction::SetPollRate {
            period_ms: self.config.fast_poll_period_ms,
        });
        context.push(CommissioningAction::ArmTimer {
            kind: TimerKind::PollStepDown,
            delay_ms: self.config.interview_settle_ms,
        });
    }

    fn on_parent_restored(&mut self, context: &mut DispatchContext) {
        info!("commissioning: network restored");
        self.reset_backoff(context);
        self.metrics.record_success();
        self.close_streak(context.now_ms);
        context.push(CommissioningAction::PersistMetrics(self.metrics));
        context.push(CommissioningAction::CancelTimer(TimerKind::RejoinRetry));
    }

    fn reset_backoff(&mut self, context: &mut DispatchContext) {
        self.backoff = BackoffState::initial(&self.config);
        self.quick_rejoin_attempted = false;
        self.deep_sleep_signalled = false;
        context.push(CommissioningAction::PersistBackoff(self.backoff));
    }

    fn close_streak(&mut self, now_ms: u64) {
        if let Some(started_ms) = self.streak_started_ms.take() {
            let elapsed = now_ms.saturating_sub(started_ms);
            self.metrics.last_rejoin_time_ms = u32::try_from(elapsed).unwrap_or(u32::MAX);
        }
    }

    /// Runs one rejoin failure. Returns `true` once the give-up threshold is
    /// reached and no retry was armed.
    fn handle_failure(&mut self, context: &mut DispatchContext) -> bool {
        self.metrics.record_failure();
        self.streak_started_ms.get_or_insert(context.now_ms);
        info!(
            "commissioning: rejoin attempt #{} failures={} retries_left={} delay={}ms",
            self.metrics.rejoin_attempts,
            self.metrics.consecutive_failures,
            self.backoff.retries_remaining,
            self.backoff.next_delay_ms
        );

        if let Some(step) = self.metrics.adapt_tx_power(
            self.tx_power_mode,
            true,
            self.config.max_tx_power_step,
        ) {
            info!("commissioning: tx power raised to step {}", step);
            context.push(CommissioningAction::SetTxPower(step));
        }

        self.backoff.advance(&self.config);

        let failures = self.metrics.consecutive_failures;
        if failures >= self.config.deep_sleep_threshold {
            self.backoff.next_delay_ms = self.config.deep_sleep_interval_ms;
            if !self.deep_sleep_signalled {
                self.deep_sleep_signalled = true;
                context.push(CommissioningAction::Blink(DEEP_SLEEP_BLINK));
                warn!(
                    "commissioning: deep sleep after {} failures, retry every {}ms",
                    failures, self.config.deep_sleep_interval_ms
                );
            }
        }
        context.push(CommissioningAction::PersistBackoff(self.backoff));

        if failures >= self.config.give_up_threshold {
            warn!(
                "commissioning: gave up after {} failures, waiting for button",
                failures
            );
            context.push(CommissioningAction::PersistMetrics(self.metrics));
            context.push(CommissioningAction::SetIndicator(false));
            context.push(CommissioningAction::CancelTimer(TimerKind::RejoinRetry));
            return true;
        }

        if !self.quick_rejoin_attempted && self.metrics.last_good_channel != 0 {
            self.quick_rejoin_attempted = true;
            match self.metrics.quick_rejoin_channel() {
                Some(channel) => {
                    info!("commissioning: quick rejoin on channel {}", channel);
                    context.push(CommissioningAction::PreferChannel(channel));
                }
                None => info!("commissioning: no valid last channel, full scan"),
            }
        }

        context.push(CommissioningAction::PersistMetrics(self.metrics));
        context.push(CommissioningAction::ArmTimer {
            kind: TimerKind::RejoinRetry,
            delay_ms: self.backoff.next_delay_ms,
        });
        false
    }

    fn bump_poll_rate(&mut self, context: &mut DispatchContext) {
        context.push(CommissioningAction::SetPollRate {
            period_ms: self.config.fast_poll_period_ms,
        });
        context.push(CommissioningAction::ArmTimer {
            kind: TimerKind::PollRestore,
            delay_ms: self.config.button_fast_poll_ms,
        });
    }

    fn manual_override(&mut self, context: &mut DispatchContext) {
        self.bump_poll_rate(context);
        if self.metrics.consecutive_failures >= self.config.give_up_threshold {
            info!("commissioning: button resets failure counter");
            self.metrics.consecutive_failures = 0;
            self.streak_started_ms = None;
            self.reset_backoff(context);
            context.push(CommissioningAction::PersistMetrics(self.metrics));
        }
        info!("commissioning: button, trying to restore network");
        context.push(CommissioningAction::CancelTimer(TimerKind::RejoinRetry));
        context.push(CommissioningAction::RequestRecovery);
    }

    fn factory_reset(&mut self, context: &mut DispatchContext) {
        self.metrics = NetworkMetrics::default();
        self.backoff = BackoffState::initial(&self.config);
        self.pairing_active = false;
        self.quick_rejoin_attempted = false;
        self.deep_sleep_signalled = false;
        self.streak_started_ms = None;

        context.push(CommissioningAction::PersistMetrics(self.metrics));
        context.push(CommissioningAction::PersistLastChannel(0));
        context.push(CommissioningAction::PersistBackoff(self.backoff));
        for kind in TimerKind::ALL {
            context.push(CommissioningAction::CancelTimer(kind));
        }
        // No poll timer is left to step the rate down.
        context.push(CommissioningAction::SetPollRate {
            period_ms: self.config.normal_poll_period_ms,
        });
        context.push(CommissioningAction::SetIndicator(false));
        if self.tx_power_mode.is_adaptive() {
            context.push(CommissioningAction::SetTxPower(0));
        }
        info!("commissioning: state reset");
    }

    fn on_timer(&mut self, context: &mut DispatchContext, kind: TimerKind) -> Outcome<State> {
        match kind {
            TimerKind::PollStepDown => {
                context.push(CommissioningAction::SetPollRate {
                    period_ms: self.config.normal_poll_period_ms,
                });
                context.push(CommissioningAction::SetIndicator(false));
                info!("commissioning: interview window over, low poll rate");
            }
            TimerKind::PollRestore => {
                context.push(CommissioningAction::SetPollRate {
                    period_ms: self.config.normal_poll_period_ms,
                });
            }
            TimerKind::RejoinRetry | TimerKind::PairingTimeout => {
                debug!(
                    "commissioning: stale {} timer in {}",
                    kind.as_str(),
                    self.phase.as_str()
                );
            }
        }
        Handled
    }
}

#[state_machine(initial = "State::initializing()")]
impl CommissioningMachine {
    #[state(superstate = "network")]
    fn initializing(
        &mut self,
        context: &mut DispatchContext,
        event: &CommissioningEvent,
    ) -> Outcome<State> {
        let _ = context;
        let _ = event;
        Super
    }

    #[state(superstate = "unattached")]
    fn pairing(
        &mut self,
        context: &mut DispatchContext,
        event: &CommissioningEvent,
    ) -> Outcome<State> {
        match event {
            CommissioningEvent::TimerFired(TimerKind::PairingTimeout) => {
                self.end_pairing_on_timeout(context);
                self.enter(Phase::Detached)
            }
            CommissioningEvent::ManualTrigger => {
                debug!("commissioning: button ignored while pairing");
                Handled
            }
            _ => Super,
        }
    }

    #[state(superstate = "network")]
    fn attached(
        &mut self,
        context: &mut DispatchContext,
        event: &CommissioningEvent,
    ) -> Outcome<State> {
        let _ = context;
        match event {
            CommissioningEvent::TimerFired(TimerKind::RejoinRetry) => {
                debug!("commissioning: rejoin timer fired while attached");
                Handled
            }
            _ => Super,
        }
    }

    #[state(superstate = "unattached")]
    fn detached(
        &mut self,
        context: &mut DispatchContext,
        event: &CommissioningEvent,
    ) -> Outcome<State> {
        let _ = context;
        let _ = event;
        Super
    }

    #[state(superstate = "unattached")]
    fn rejoining(
        &mut self,
        context: &mut DispatchContext,
        event: &CommissioningEvent,
    ) -> Outcome<State> {
        match event {
            CommissioningEvent::TimerFired(TimerKind::RejoinRetry) => {
                info!("commissioning: rejoin timer, attempting recovery");
                context.push(CommissioningAction::RequestRecovery);
                Handled
            }
            _ => Super,
        }
    }

    #[state(superstate = "unattached")]
    fn gave_up(
        &mut self,
        context: &mut DispatchContext,
        event: &CommissioningEvent,
    ) -> Outcome<State> {
        let _ = context;
        let _ = event;
        Super
    }

    #[superstate(superstate = "network")]
    fn unattached(
        &mut self,
        context: &mut DispatchContext,
        event: &CommissioningEvent,
    ) -> Outcome<State> {
        match event {
            CommissioningEvent::ManualTrigger => {
                self.manual_override(context);
                self.enter(Phase::Rejoining)
            }
            _ => Super,
        }
    }

    #[superstate]
    fn network(
        &mut self,
        context: &mut DispatchContext,
        event: &CommissioningEvent,
    ) -> Outcome<State> {
        match event {
            CommissioningEvent::Start => {
                self.start(context);
                Handled
            }
            CommissioningEvent::Status(report) => self.on_status(context, *report),
            CommissioningEvent::TimerFired(kind) => self.on_timer(context, *kind),
            CommissioningEvent::ManualTrigger => {
                self.bump_poll_rate(context);
                Handled
            }
            CommissioningEvent::SetTxPowerMode(mode) => {
                self.tx_power_mode = *mode;
                info!("commissioning: tx power mode {:?}", mode);
                Handled
            }
            CommissioningEvent::FactoryReset => {
                self.factory_reset(context);
                self.enter(Phase::Initializing)
            }
        }
    }
}
