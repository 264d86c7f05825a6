#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CommissioningMode {
    Initialization,
    NetworkSteering,
    FindingBinding,
    ParentLost,
    Other(u8),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CommissioningStatus {
    Success,
    InProgress,
    NoNetwork,
    NetworkRestored,
    Failure(u8),
}

/// Owned by the application (user-selectable); the engine adapts power only in
/// [`TxPowerMode::Auto`].
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum TxPowerMode {
    #[default]
    Auto,
    Manual,
    Max,
    Eco,
}

impl TxPowerMode {
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Auto),
            1 => Some(Self::Manual),
            2 => Some(Self::Max),
            3 => Some(Self::Eco),
            _ => None,
        }
    }

    pub const fn is_adaptive(self) -> bool {
        matches!(self, Self::Auto)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TimerKind {
    RejoinRetry,
    PollStepDown,
    PairingTimeout,
    PollRestore,
}

impl TimerKind {
    pub const COUNT: usize = 4;
    pub const ALL: [Self; Self::COUNT] = [
        Self::RejoinRetry,
        Self::PollStepDown,
        Self::PairingTimeout,
        Self::PollRestore,
    ];

    pub const fn index(self) -> usize {
        match self {
            Self::RejoinRetry => 0,
            Self::PollStepDown => 1,
            Self::PairingTimeout => 2,
            Self::PollRestore => 3,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RejoinRetry => "rejoin_retry",
            Self::PollStepDown => "poll_step_down",
            Self::PairingTimeout => "pairing_timeout",
            Self::PollRestore => "poll_restore",
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Phase {
    Initializing,
    Pairing,
    Attached,
    Detached,
    Rejoining,
    GaveUp,
}

impl Phase {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Pairing => "pairing",
            Self::Attached => "attached",
            Self::Detached => "detached",
            Self::Rejoining => "rejoining",
            Self::GaveUp => "gave_up",
        }
    }
}

/// Indicator contract: `count` pulses of `on_ms`/`off_ms`, repeated after
/// `repeat_gap_ms` when non-zero. `count == 0` blinks until replaced or
/// switched off.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BlinkPattern {
    pub count: u8,
    pub on_ms: u16,
    pub off_ms: u16,
    pub repeat_gap_ms: u16,
}

impl BlinkPattern {
    pub const fn burst(count: u8, on_ms: u16, off_ms: u16) -> Self {
        Self {
            count,
            on_ms,
            off_ms,
            repeat_gap_ms: 0,
        }
    }

    pub const fn continuous(on_ms: u16, off_ms: u16) -> Self {
        Self {
            count: 0,
            on_ms,
            off_ms,
            repeat_gap_ms: 0,
        }
    }
}

/// Link state sampled from the stack when a report is delivered.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct LinkSample {
    pub channel: u8,
    pub lqi: u8,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct StatusReport {
    pub mode: CommissioningMode,
    pub status: CommissioningStatus,
    pub remaining_modes: u8,
    pub link: LinkSample,
}
