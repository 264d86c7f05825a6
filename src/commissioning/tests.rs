use super::{
    actions::CommissioningAction,
    backoff::BackoffState,
    config::{
        CommissioningConfig, DEEP_SLEEP_BLINK, PAIRING_BLINK, PAIRING_FAILURE_BLINK,
        PAIRING_SUCCESS_BLINK,
    },
    engine::{CommissioningEngine, EngineOutput},
    metrics::NetworkMetrics,
    store::{
        save_backoff, save_last_channel, save_metrics, PersistedCommissioning, RecordBuf,
        RecordId, RecordStore, StoreError,
    },
    types::{
        CommissioningMode, CommissioningStatus, LinkSample, Phase, StatusReport, TimerKind,
        TxPowerMode,
    },
};

fn engine_with(mode: TxPowerMode) -> CommissioningEngine {
    CommissioningEngine::new(
        CommissioningConfig::defaults(),
        mode,
        PersistedCommissioning::default(),
    )
}

fn report(mode: CommissioningMode, status: CommissioningStatus) -> StatusReport {
    StatusReport {
        mode,
        status,
        remaining_modes: 0,
        link: LinkSample::default(),
    }
}

fn steering_success(channel: u8, lqi: u8) -> StatusReport {
    StatusReport {
        link: LinkSample { channel, lqi },
        ..report(
            CommissioningMode::NetworkSteering,
            CommissioningStatus::Success,
        )
    }
}

fn parent_lost() -> StatusReport {
    report(CommissioningMode::ParentLost, CommissioningStatus::NoNetwork)
}

fn parent_restored() -> StatusReport {
    report(
        CommissioningMode::ParentLost,
        CommissioningStatus::NetworkRestored,
    )
}

fn attached_engine(mode: TxPowerMode, channel: u8) -> CommissioningEngine {
    let mut engine = engine_with(mode);
    let _ = engine.start(0);
    let _ = engine.commissioning_status(steering_success(channel, 180), 500);
    assert_eq!(engine.phase(), Phase::Attached);
    engine
}

fn tx_power_steps(output: &EngineOutput) -> Vec<u8> {
    output
        .actions
        .iter()
        .filter_map(|action| match action {
            CommissioningAction::SetTxPower(step) => Some(*step),
            _ => None,
        })
        .collect()
}

#[derive(Default)]
struct MemoryStore {
    records: [Option<RecordBuf>; 3],
    saves: usize,
}

impl MemoryStore {
    fn index(id: RecordId) -> usize {
        RecordId::ALL
            .iter()
            .position(|candidate| *candidate == id)
            .unwrap_or(0)
    }

    fn apply(&mut self, output: &EngineOutput) {
        for action in &output.actions {
            match action {
                CommissioningAction::PersistBackoff(backoff) => save_backoff(self, backoff),
                CommissioningAction::PersistMetrics(metrics) => save_metrics(self, metrics),
                CommissioningAction::PersistLastChannel(channel) => {
                    save_last_channel(self, *channel)
                }
                _ => {}
            }
        }
    }
}

impl RecordStore for MemoryStore {
    fn load(&mut self, id: RecordId) -> Option<RecordBuf> {
        self.records[Self::index(id)].clone()
    }

    fn save(&mut self, id: RecordId, payload: &[u8]) -> Result<(), StoreError> {
        self.saves += 1;
        self.records[Self::index(id)] =
            Some(RecordBuf::from_slice(payload).map_err(|_| StoreError::PayloadTooLarge)?);
        Ok(())
    }
}

#[test]
fn fresh_device_pairs_and_attaches() {
    let mut engine = engine_with(TxPowerMode::Auto);

    let boot = engine.start(0);
    assert_eq!(
        boot.actions.iter().copied().collect::<Vec<_>>(),
        vec![
            CommissioningAction::SetTxPower(0),
            CommissioningAction::StartCommissioning
        ]
    );

    let pairing = engine.commissioning_status(
        report(
            CommissioningMode::Initialization,
            CommissioningStatus::NoNetwork,
        ),
        100,
    );
    assert_eq!(engine.phase(), Phase::Pairing);
    assert!(engine.snapshot().pairing_active);
    assert!(pairing
        .actions
        .contains(&CommissioningAction::Blink(PAIRING_BLINK)));
    assert!(pairing
        .actions
        .contains(&CommissioningAction::SetPollRate { period_ms: 100 }));
    assert_eq!(
        pairing.actions.armed_delay(TimerKind::PairingTimeout),
        Some(180_000)
    );

    let joined = engine.commissioning_status(steering_success(15, 200), 8_000);
    assert_eq!(engine.phase(), Phase::Attached);
    assert!(!engine.snapshot().pairing_active);
    assert_eq!(
        joined.actions.blinks().collect::<Vec<_>>(),
        vec![PAIRING_SUCCESS_BLINK]
    );
    assert!(joined
        .actions
        .contains(&CommissioningAction::CancelTimer(TimerKind::PairingTimeout)));
    assert!(joined
        .actions
        .contains(&CommissioningAction::PersistLastChannel(15)));
    assert_eq!(
        joined.actions.armed_delay(TimerKind::PollStepDown),
        Some(120_000)
    );
    assert!(tx_power_steps(&joined).is_empty());

    let metrics = engine.metrics();
    assert_eq!(metrics.rejoin_successes, 1);
    assert_eq!(metrics.last_good_channel, 15);
    assert_eq!(metrics.parent_link_quality, 200);
    assert_eq!(metrics.consecutive_failures, 0);
}

#[test]
fn parent_loss_backs_off_and_recovers() {
    let mut engine = attached_engine(TxPowerMode::Auto, 15);

    let first = engine.commissioning_status(parent_lost(), 1_000);
    assert_eq!(engine.phase(), Phase::Rejoining);
    assert_eq!(tx_power_steps(&first), vec![1]);
    assert!(first.actions.contains(&CommissioningAction::PreferChannel(15)));
    assert_eq!(first.actions.armed_delay(TimerKind::RejoinRetry), Some(15_000));

    let expected = [(2u8, 22_500u32), (3, 33_750), (4, 50_625)];
    for (index, (step, delay)) in expected.into_iter().enumerate() {
        let output = engine.commissioning_status(parent_lost(), 2_000 + index as u64);
        assert_eq!(tx_power_steps(&output), vec![step]);
        assert_eq!(output.actions.armed_delay(TimerKind::RejoinRetry), Some(delay));
        assert!(!output
            .actions
            .iter()
            .any(|action| matches!(action, CommissioningAction::PreferChannel(_))));
    }
    assert_eq!(engine.metrics().consecutive_failures, 4);
    assert_eq!(engine.backoff().retries_remaining, 26);

    let retry = engine.timer_fired(TimerKind::RejoinRetry, 60_000);
    assert!(retry.actions.requests_recovery());
    assert_eq!(engine.phase(), Phase::Rejoining);

    let restored = engine.commissioning_status(parent_restored(), 61_000);
    assert_eq!(engine.phase(), Phase::Attached);
    assert!(restored
        .actions
        .contains(&CommissioningAction::CancelTimer(TimerKind::RejoinRetry)));
    assert_eq!(restored.actions.blinks().count(), 0);
    assert_eq!(
        *engine.backoff(),
        BackoffState::initial(&CommissioningConfig::defaults())
    );
    let metrics = engine.metrics();
    assert_eq!(metrics.consecutive_failures, 0);
    assert_eq!(metrics.rejoin_failures, 4);
    assert_eq!(metrics.rejoin_successes, 2);
    assert_eq!(metrics.last_rejoin_time_ms, 60_000);
}

#[test]
fn quick_rejoin_only_on_first_failure_of_streak() {
    let mut engine = attached_engine(TxPowerMode::Auto, 20);

    let first = engine.commissioning_status(parent_lost(), 1_000);
    let second = engine.commissioning_status(parent_lost(), 2_000);
    assert!(first.actions.contains(&CommissioningAction::PreferChannel(20)));
    assert!(!second.actions.contains(&CommissioningAction::PreferChannel(20)));

    let _ = engine.commissioning_status(parent_restored(), 3_000);
    let next_streak = engine.commissioning_status(parent_lost(), 4_000);
    assert!(next_streak
        .actions
        .contains(&CommissioningAction::PreferChannel(20)));
}

#[test]
fn unknown_channel_skips_quick_rejoin() {
    let mut engine = attached_engine(TxPowerMode::Auto, 0);
    let output = engine.commissioning_status(parent_lost(), 1_000);
    assert!(!output
        .actions
        .iter()
        .any(|action| matches!(action, CommissioningAction::PreferChannel(_))));
    assert_eq!(output.actions.armed_delay(TimerKind::RejoinRetry), Some(15_000));
}

#[test]
fn long_outage_enters_deep_sleep_then_gives_up() {
    let mut engine = attached_engine(TxPowerMode::Auto, 15);
    let mut deep_sleep_blinks = 0;

    for failure in 1..=149u16 {
        let output = engine.commissioning_status(parent_lost(), u64::from(failure) * 1_000);
        deep_sleep_blinks += output
            .actions
            .blinks()
            .filter(|pattern| *pattern == DEEP_SLEEP_BLINK)
            .count();
        let armed = output.actions.armed_delay(TimerKind::RejoinRetry);
        match failure {
            49 => assert_eq!(armed, Some(900_000)),
            50 => {
                assert_eq!(armed, Some(3_600_000));
                assert!(output.actions.contains(&CommissioningAction::PersistBackoff(
                    BackoffState {
                        retries_remaining: 0,
                        next_delay_ms: 3_600_000,
                    }
                )));
            }
            149 => assert_eq!(armed, Some(3_600_000)),
            _ => assert!(armed.is_some()),
        }
        assert_eq!(engine.phase(), Phase::Rejoining);
    }
    assert_eq!(deep_sleep_blinks, 1);

    let give_up = engine.commissioning_status(parent_lost(), 150_000);
    assert_eq!(engine.phase(), Phase::GaveUp);
    assert_eq!(give_up.actions.armed_delay(TimerKind::RejoinRetry), None);
    assert!(give_up
        .actions
        .contains(&CommissioningAction::CancelTimer(TimerKind::RejoinRetry)));
    assert!(give_up
        .actions
        .contains(&CommissioningAction::SetIndicator(false)));
    assert_eq!(engine.metrics().consecutive_failures, 150);

    let stale = engine.timer_fired(TimerKind::RejoinRetry, 151_000);
    assert!(stale.actions.is_empty());

    let button = engine.manual_trigger(200_000);
    assert_eq!(engine.phase(), Phase::Rejoining);
    assert!(button.actions.requests_recovery());
    assert!(button
        .actions
        .contains(&CommissioningAction::SetPollRate { period_ms: 100 }));
    assert_eq!(button.actions.armed_delay(TimerKind::PollRestore), Some(3_000));
    assert_eq!(engine.metrics().consecutive_failures, 0);
    assert_eq!(
        *engine.backoff(),
        BackoffState::initial(&CommissioningConfig::defaults())
    );
}

fn deep_sleep_blinks_over_streak(engine: &mut CommissioningEngine, start_ms: u64) -> usize {
    (0..50u64)
        .map(|n| engine.commissioning_status(parent_lost(), start_ms + n))
        .map(|output| {
            output
                .actions
                .blinks()
                .filter(|pattern| *pattern == DEEP_SLEEP_BLINK)
                .count()
        })
        .sum()
}

#[test]
fn deep_sleep_signal_repeats_for_a_new_streak() {
    let mut engine = attached_engine(TxPowerMode::Auto, 15);
    assert_eq!(deep_sleep_blinks_over_streak(&mut engine, 1_000), 1);
    let _ = engine.commissioning_status(parent_restored(), 5_000);
    assert_eq!(deep_sleep_blinks_over_streak(&mut engine, 10_000), 1);
}

#[test]
fn manual_tx_power_is_never_adapted() {
    let mut engine = engine_with(TxPowerMode::Manual);
    let boot = engine.start(0);
    assert!(tx_power_steps(&boot).is_empty());
    let _ = engine.commissioning_status(steering_success(15, 90), 100);

    for n in 0..5u64 {
        let output = engine.commissioning_status(parent_lost(), 1_000 + n);
        assert!(tx_power_steps(&output).is_empty());
    }
    assert_eq!(engine.metrics().current_tx_power_step, 0);
    assert_eq!(engine.metrics().consecutive_failures, 5);
}

#[test]
fn switching_mode_stops_adaptation() {
    let mut engine = attached_engine(TxPowerMode::Auto, 15);
    let raised = engine.commissioning_status(parent_lost(), 1_000);
    assert_eq!(tx_power_steps(&raised), vec![1]);

    let switched = engine.set_tx_power_mode(TxPowerMode::Max, 1_500);
    assert!(switched.actions.is_empty());
    assert_eq!(engine.snapshot().tx_power_mode, TxPowerMode::Max);

    let output = engine.commissioning_status(parent_lost(), 2_000);
    assert!(tx_power_steps(&output).is_empty());
    assert_eq!(engine.metrics().current_tx_power_step, 1);
}

#[test]
fn successful_join_lowers_tx_power_one_step() {
    let mut engine = attached_engine(TxPowerMode::Auto, 15);
    for n in 0..3u64 {
        let _ = engine.commissioning_status(parent_lost(), 1_000 + n);
    }
    assert_eq!(engine.metrics().current_tx_power_step, 3);

    let joined = engine.commissioning_status(steering_success(15, 150), 9_000);
    assert_eq!(tx_power_steps(&joined), vec![2]);
    assert_eq!(engine.metrics().current_tx_power_step, 2);
}

#[test]
fn join_after_failures_resets_backoff_and_counter() {
    let config = CommissioningConfig::defaults();
    let mut engine = attached_engine(TxPowerMode::Auto, 15);
    for n in 0..4u64 {
        let _ = engine.commissioning_status(parent_lost(), 1_000 + n);
    }
    assert_eq!(engine.metrics().current_tx_power_step, 4);
    assert_eq!(engine.backoff().retries_remaining, 26);

    let joined = engine.commissioning_status(steering_success(15, 150), 9_000);
    assert_eq!(engine.phase(), Phase::Attached);
    assert_eq!(engine.metrics().consecutive_failures, 0);
    assert_eq!(*engine.backoff(), BackoffState::initial(&config));
    assert!(joined
        .actions
        .contains(&CommissioningAction::PersistBackoff(BackoffState::initial(
            &config
        ))));
    assert_eq!(tx_power_steps(&joined), vec![3]);
    assert_eq!(engine.metrics().current_tx_power_step, 3);
}

#[test]
fn tx_power_is_capped_at_max_step() {
    let mut engine = attached_engine(TxPowerMode::Auto, 15);
    for n in 0..6u64 {
        let _ = engine.commissioning_status(parent_lost(), 1_000 + n);
    }
    assert_eq!(engine.metrics().current_tx_power_step, 4);
}

#[test]
fn pairing_failure_blinks_and_detaches() {
    let mut engine = engine_with(TxPowerMode::Auto);
    let _ = engine.start(0);
    let _ = engine.commissioning_status(
        report(
            CommissioningMode::Initialization,
            CommissioningStatus::NoNetwork,
        ),
        100,
    );
    let failed = engine.commissioning_status(
        report(
            CommissioningMode::NetworkSteering,
            CommissioningStatus::NoNetwork,
        ),
        30_000,
    );
    assert_eq!(engine.phase(), Phase::Detached);
    assert_eq!(
        failed.actions.blinks().collect::<Vec<_>>(),
        vec![PAIRING_FAILURE_BLINK]
    );
    assert!(failed
        .actions
        .contains(&CommissioningAction::CancelTimer(TimerKind::PairingTimeout)));
    assert!(!engine.snapshot().pairing_active);
}

#[test]
fn steering_in_progress_changes_nothing() {
    let mut engine = engine_with(TxPowerMode::Auto);
    let _ = engine.start(0);
    let _ = engine.commissioning_status(
        report(
            CommissioningMode::Initialization,
            CommissioningStatus::NoNetwork,
        ),
        100,
    );
    let before = engine.snapshot();
    let output = engine.commissioning_status(
        report(
            CommissioningMode::NetworkSteering,
            CommissioningStatus::InProgress,
        ),
        200,
    );
    assert!(output.actions.is_empty());
    assert_eq!(engine.snapshot(), before);
}

#[test]
fn pairing_timeout_stops_indication() {
    let mut engine = engine_with(TxPowerMode::Auto);
    let _ = engine.start(0);
    let _ = engine.commissioning_status(
        report(
            CommissioningMode::Initialization,
            CommissioningStatus::NoNetwork,
        ),
        100,
    );

    let ignored = engine.manual_trigger(1_000);
    assert!(ignored.actions.is_empty());
    assert_eq!(engine.phase(), Phase::Pairing);

    let timeout = engine.timer_fired(TimerKind::PairingTimeout, 180_100);
    assert_eq!(engine.phase(), Phase::Detached);
    assert!(timeout
        .actions
        .contains(&CommissioningAction::SetIndicator(false)));
    assert!(timeout
        .actions
        .contains(&CommissioningAction::SetPollRate { period_ms: 10_000 }));
    assert!(!engine.snapshot().pairing_active);

    let late_join = engine.commissioning_status(steering_success(25, 100), 190_000);
    assert_eq!(late_join.actions.blinks().count(), 0);
    assert_eq!(engine.phase(), Phase::Attached);
}

#[test]
fn rejoin_at_boot_is_silent() {
    let mut engine = engine_with(TxPowerMode::Auto);
    let _ = engine.start(0);
    let output = engine.commissioning_status(
        StatusReport {
            link: LinkSample {
                channel: 11,
                lqi: 255,
            },
            ..report(
                CommissioningMode::Initialization,
                CommissioningStatus::NetworkRestored,
            )
        },
        50,
    );
    assert_eq!(engine.phase(), Phase::Attached);
    assert_eq!(output.actions.blinks().count(), 0);
    assert!(!output
        .actions
        .iter()
        .any(|action| matches!(action, CommissioningAction::SetIndicator(_))));
    assert_eq!(engine.metrics().last_good_channel, 11);
}

#[test]
fn stale_rejoin_timer_while_attached_is_ignored() {
    let mut engine = attached_engine(TxPowerMode::Auto, 15);
    let output = engine.timer_fired(TimerKind::RejoinRetry, 10_000);
    assert!(output.actions.is_empty());
    assert_eq!(engine.phase(), Phase::Attached);
}

#[test]
fn button_while_attached_only_speeds_up_polling() {
    let mut engine = attached_engine(TxPowerMode::Auto, 15);
    let before = *engine.metrics();
    let output = engine.manual_trigger(5_000);
    assert_eq!(
        output.actions.iter().copied().collect::<Vec<_>>(),
        vec![
            CommissioningAction::SetPollRate { period_ms: 100 },
            CommissioningAction::ArmTimer {
                kind: TimerKind::PollRestore,
                delay_ms: 3_000,
            },
        ]
    );
    assert_eq!(*engine.metrics(), before);
    assert_eq!(engine.phase(), Phase::Attached);
}

#[test]
fn button_while_rejoining_requests_recovery_without_reset() {
    let mut engine = attached_engine(TxPowerMode::Auto, 15);
    for n in 0..3u64 {
        let _ = engine.commissioning_status(parent_lost(), 1_000 + n);
    }
    let output = engine.manual_trigger(5_000);
    assert!(output.actions.requests_recovery());
    assert!(output
        .actions
        .contains(&CommissioningAction::CancelTimer(TimerKind::RejoinRetry)));
    assert_eq!(engine.metrics().consecutive_failures, 3);
    assert_eq!(engine.backoff().next_delay_ms, 33_750);
}

#[test]
fn poll_timers_restore_normal_rate() {
    let mut engine = attached_engine(TxPowerMode::Auto, 15);
    let step_down = engine.timer_fired(TimerKind::PollStepDown, 120_500);
    assert!(step_down
        .actions
        .contains(&CommissioningAction::SetPollRate { period_ms: 10_000 }));
    assert!(step_down
        .actions
        .contains(&CommissioningAction::SetIndicator(false)));

    let _ = engine.manual_trigger(130_000);
    let restore = engine.timer_fired(TimerKind::PollRestore, 133_000);
    assert_eq!(
        restore.actions.iter().copied().collect::<Vec<_>>(),
        vec![CommissioningAction::SetPollRate { period_ms: 10_000 }]
    );
}

#[test]
fn factory_reset_clears_everything() {
    let mut engine = attached_engine(TxPowerMode::Auto, 15);
    for n in 0..3u64 {
        let _ = engine.commissioning_status(parent_lost(), 1_000 + n);
    }

    let reset = engine.factory_reset(9_000);
    assert_eq!(engine.phase(), Phase::Initializing);
    assert_eq!(*engine.metrics(), NetworkMetrics::default());
    assert_eq!(
        *engine.backoff(),
        BackoffState::initial(&CommissioningConfig::defaults())
    );
    for kind in TimerKind::ALL {
        assert!(reset.actions.contains(&CommissioningAction::CancelTimer(kind)));
    }
    assert!(reset
        .actions
        .contains(&CommissioningAction::PersistLastChannel(0)));
    assert!(reset
        .actions
        .contains(&CommissioningAction::PersistMetrics(NetworkMetrics::default())));
    assert_eq!(tx_power_steps(&reset), vec![0]);
    assert!(reset
        .actions
        .contains(&CommissioningAction::SetPollRate { period_ms: 10_000 }));

    let next = engine.commissioning_status(parent_lost(), 10_000);
    assert!(!next
        .actions
        .iter()
        .any(|action| matches!(action, CommissioningAction::PreferChannel(_))));
}

#[test]
fn persisted_state_survives_restart() {
    let mut store = MemoryStore::default();
    let mut engine = attached_engine(TxPowerMode::Auto, 18);
    for n in 0..4u64 {
        let output = engine.commissioning_status(parent_lost(), 1_000 + n);
        store.apply(&output);
    }
    assert!(store.saves > 0);
    let before = *engine.metrics();

    let persisted = PersistedCommissioning::load(&mut store);
    assert_eq!(persisted.metrics, Some(before));
    let mut restarted = CommissioningEngine::new(
        CommissioningConfig::defaults(),
        TxPowerMode::Auto,
        persisted,
    );
    assert_eq!(*restarted.metrics(), before);
    assert_eq!(restarted.backoff().next_delay_ms, 50_625);
    assert_eq!(restarted.backoff().retries_remaining, 26);

    let boot = restarted.start(0);
    assert_eq!(tx_power_steps(&boot), vec![4]);

    let next = restarted.commissioning_status(parent_lost(), 100);
    assert_eq!(next.actions.armed_delay(TimerKind::RejoinRetry), Some(75_937));
    assert!(next.actions.contains(&CommissioningAction::PreferChannel(18)));
}
