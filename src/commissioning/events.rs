use super::types::{StatusReport, TimerKind, TxPowerMode};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum CommissioningEvent {
    Start,
    Status(StatusReport),
    TimerFired(TimerKind),
    ManualTrigger,
    SetTxPowerMode(TxPowerMode),
    FactoryReset,
}
