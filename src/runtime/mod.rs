//! Binds the commissioning engine to the stack, indicator, timers and record
//! store. All inputs are applied one at a time from a single queue.

pub mod ports;
pub mod task;
pub mod timers;

use log::{error, info};

use crate::commissioning::{
    store::{save_backoff, save_last_channel, save_metrics},
    CommissioningAction, CommissioningConfig, CommissioningEngine, CommissioningMode,
    CommissioningStatus, EngineOutput, PersistedCommissioning, RecordStore, StatusReport,
    TimerKind, TxPowerMode,
};

pub use ports::{
    BindCapacity, BindRequest, FeedbackSignal, NetworkStack, StatusObserver, TimerSource,
};
pub use task::run_commissioning_task;
pub use timers::TimerSlots;

/// Queue entries for the commissioning task. Timer expiries are produced by
/// the task itself.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum NodeInput {
    Status {
        mode: CommissioningMode,
        status: CommissioningStatus,
        remaining_modes: u8,
    },
    BindRequest(Option<BindRequest>),
    ManualTrigger,
    FactoryReset,
    SetTxPowerMode(TxPowerMode),
}

impl NodeInput {
    /// Decodes the application's transmit-power mode setting byte.
    pub fn tx_power_mode(value: u8) -> Option<Self> {
        TxPowerMode::from_u8(value).map(Self::SetTxPowerMode)
    }
}

pub struct CommissioningNode<S, N, F, T> {
    engine: CommissioningEngine,
    store: S,
    stack: N,
    feedback: F,
    timers: T,
    now_ms: u64,
}

impl<S, N, F, T> CommissioningNode<S, N, F, T>
where
    S: RecordStore,
    N: NetworkStack,
    F: FeedbackSignal,
    T: TimerSource,
{
    /// Loads the persisted records and builds the engine. Nothing is sent to
    /// the stack until [`Self::start`].
    pub fn boot(
        config: CommissioningConfig,
        tx_power_mode: TxPowerMode,
        mut store: S,
        stack: N,
        feedback: F,
        timers: T,
    ) -> Self {
        let persisted = PersistedCommissioning::load(&mut store);
        Self {
            engine: CommissioningEngine::new(config, tx_power_mode, persisted),
            store,
            stack,
            feedback,
            timers,
            now_ms: 0,
        }
    }

    pub fn set_now(&mut self, now_ms: u64) {
        self.now_ms = now_ms;
    }

    pub fn start(&mut self) {
        let output = self.engine.start(self.now_ms);
        self.apply(&output);
    }

    pub fn on_timer(&mut self, kind: TimerKind) {
        let output = self.engine.timer_fired(kind, self.now_ms);
        self.apply(&output);
    }

    pub fn on_manual_trigger(&mut self) {
        let output = self.engine.manual_trigger(self.now_ms);
        self.apply(&output);
    }

    pub fn reset_all(&mut self) {
        let output = self.engine.factory_reset(self.now_ms);
        self.apply(&output);
    }

    pub fn set_tx_power_mode(&mut self, mode: TxPowerMode) {
        let output = self.engine.set_tx_power_mode(mode, self.now_ms);
        self.apply(&output);
    }

    pub fn handle(&mut self, input: NodeInput) {
        match input {
            NodeInput::Status {
                mode,
                status,
                remaining_modes,
            } => self.on_commissioning_status(mode, status, remaining_modes),
            NodeInput::BindRequest(request) => self.on_bind_request(request.as_ref()),
            NodeInput::ManualTrigger => self.on_manual_trigger(),
            NodeInput::FactoryReset => self.reset_all(),
            NodeInput::SetTxPowerMode(mode) => self.set_tx_power_mode(mode),
        }
    }

    pub fn engine(&self) -> &CommissioningEngine {
        &self.engine
    }

    pub fn stack(&self) -> &N {
        &self.stack
    }

    pub fn feedback(&self) -> &F {
        &self.feedback
    }

    pub fn timers(&self) -> &T {
        &self.timers
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn apply(&mut self, output: &EngineOutput) {
        for action in &output.actions {
            match *action {
                CommissioningAction::StartCommissioning => self.stack.start_commissioning(),
                CommissioningAction::RequestRecovery => self.stack.request_recovery(),
                CommissioningAction::PreferChannel(channel) => self.stack.prefer_channel(channel),
                CommissioningAction::SetTxPower(step) => self.stack.set_transmit_power(step),
                CommissioningAction::SetPollRate { period_ms } => {
                    self.stack.set_poll_rate(period_ms)
                }
                CommissioningAction::ArmTimer { kind, delay_ms } => {
                    self.timers.after(kind, delay_ms)
                }
                CommissioningAction::CancelTimer(kind) => self.timers.cancel(kind),
                CommissioningAction::Blink(pattern) => self.feedback.blink(pattern),
                CommissioningAction::SetIndicator(on) => self.feedback.set_continuous(on),
                CommissioningAction::PersistBackoff(backoff) => {
                    save_backoff(&mut self.store, &backoff)
                }
                CommissioningAction::PersistMetrics(metrics) => {
                    save_metrics(&mut self.store, &metrics)
                }
                CommissioningAction::PersistLastChannel(channel) => {
                    save_last_channel(&mut self.store, channel)
                }
            }
        }
    }
}

impl<S, N, F> CommissioningNode<S, N, F, TimerSlots>
where
    S: RecordStore,
    N: NetworkStack,
    F: FeedbackSignal,
{
    /// Moves the clock forward and dispatches every timer due by `now_ms`.
    pub fn advance_to(&mut self, now_ms: u64) {
        self.set_now(now_ms);
        self.timers.set_now(now_ms);
        while let Some(kind) = self.timers.take_due(now_ms) {
            self.on_timer(kind);
        }
    }
}

impl<S, N, F, T> StatusObserver for CommissioningNode<S, N, F, T>
where
    S: RecordStore,
    N: NetworkStack,
    F: FeedbackSignal,
    T: TimerSource,
{
    fn on_commissioning_status(
        &mut self,
        mode: CommissioningMode,
        status: CommissioningStatus,
        remaining_modes: u8,
    ) {
        let report = StatusReport {
            mode,
            status,
            remaining_modes,
            link: self.stack.link_sample(),
        };
        let output = self.engine.commissioning_status(report, self.now_ms);
        self.apply(&output);
    }

    fn on_bind_request(&mut self, request: Option<&BindRequest>) {
        let Some(request) = request else {
            error!("commissioning: bind request without payload");
            return;
        };
        let capacity = self.stack.bind_capacity();
        info!(
            "commissioning: bind cluster=0x{:04X} dst=0x{:016X} ep={} table={}/{}",
            request.cluster_id,
            request.destination_address,
            request.endpoint,
            capacity.used,
            capacity.max
        );
    }
}
