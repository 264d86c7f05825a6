use statig::blocking::IntoStateMachineExt as _;

use super::actions::ActionBuffer;
use super::backoff::BackoffState;
use super::config::CommissioningConfig;
use super::events::CommissioningEvent;
use super::machine::{CommissioningMachine, DispatchContext};
use super::metrics::NetworkMetrics;
use super::store::PersistedCommissioning;
use super::types::{Phase, StatusReport, TimerKind, TxPowerMode};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EngineOutput {
    pub actions: ActionBuffer,
}

/// Read-only copy of the engine state for reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommissioningSnapshot {
    pub phase: Phase,
    pub backoff: BackoffState,
    pub metrics: NetworkMetrics,
    pub pairing_active: bool,
    pub tx_power_mode: TxPowerMode,
}

pub struct CommissioningEngine {
    machine: statig::blocking::StateMachine<CommissioningMachine>,
}

impl CommissioningEngine {
    pub fn new(
        config: CommissioningConfig,
        tx_power_mode: TxPowerMode,
        persisted: PersistedCommissioning,
    ) -> Self {
        let config = config.sanitized();
        let backoff = persisted
            .backoff
            .map(|backoff| backoff.sanitized(&config))
            .unwrap_or_else(|| BackoffState::initial(&config));
        let mut metrics = persisted
            .metrics
            .map(|metrics| metrics.sanitized(config.max_tx_power_step))
            .unwrap_or_default();
        if let Some(channel) = persisted.last_channel {
            if metrics.last_good_channel == 0 {
                metrics.last_good_channel = channel;
                metrics = metrics.sanitized(config.max_tx_power_step);
            }
        }
        Self {
            machine: CommissioningMachine::new(config, tx_power_mode, backoff, metrics)
                .state_machine(),
        }
    }

    /// Restored transmit power and the initial commissioning request.
    pub fn start(&mut self, now_ms: u64) -> EngineOutput {
        self.dispatch(CommissioningEvent::Start, now_ms)
    }

    pub fn commissioning_status(&mut self, report: StatusReport, now_ms: u64) -> EngineOutput {
        self.dispatch(CommissioningEvent::Status(report), now_ms)
    }

    pub fn timer_fired(&mut self, kind: TimerKind, now_ms: u64) -> EngineOutput {
        self.dispatch(CommissioningEvent::TimerFired(kind), now_ms)
    }

    pub fn manual_trigger(&mut self, now_ms: u64) -> EngineOutput {
        self.dispatch(CommissioningEvent::ManualTrigger, now_ms)
    }

    pub fn set_tx_power_mode(&mut self, mode: TxPowerMode, now_ms: u64) -> EngineOutput {
        self.dispatch(CommissioningEvent::SetTxPowerMode(mode), now_ms)
    }

    pub fn factory_reset(&mut self, now_ms: u64) -> EngineOutput {
        self.dispatch(CommissioningEvent::FactoryReset, now_ms)
    }

    pub fn snapshot(&self) -> CommissioningSnapshot {
        let inner = self.machine.inner();
        CommissioningSnapshot {
            phase: inner.phase,
            backoff: inner.backoff,
            metrics: inner.metrics,
            pairing_active: inner.pairing_active,
            tx_power_mode: inner.tx_power_mode,
        }
    }

    pub fn phase(&self) -> Phase {
        self.machine.inner().phase
    }

    pub fn metrics(&self) -> &NetworkMetrics {
        &self.machine.inner().metrics
    }

    pub fn backoff(&self) -> &BackoffState {
        &self.machine.inner().backoff
    }

    pub fn config(&self) -> &CommissioningConfig {
        &self.machine.inner().config
    }

    fn dispatch(&mut self, event: CommissioningEvent, now_ms: u64) -> EngineOutput {
        let mut context = DispatchContext::at(now_ms);
        self.machine.handle_with_context(&event, &mut context);
        EngineOutput {
            actions: context.actions,
        }
    }
}
