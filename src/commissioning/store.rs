use core::fmt;

use embedded_storage::{ReadStorage, Storage};
use heapless::Vec;
use log::warn;

use super::backoff::BackoffState;
use super::config::{
    RECORD_FRAME_OVERHEAD, RECORD_PAYLOAD_MAX, RECORD_SLOT_LEN, RECORD_STORE_MAGIC,
    RECORD_STORE_VERSION,
};
use super::metrics::NetworkMetrics;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RecordId {
    NetworkMetrics,
    LastChannel,
    BackoffState,
}

impl RecordId {
    pub const ALL: [Self; 3] = [Self::NetworkMetrics, Self::LastChannel, Self::BackoffState];

    pub const fn nv_id(self) -> u16 {
        match self {
            Self::NetworkMetrics => 0x0403,
            Self::LastChannel => 0x0404,
            Self::BackoffState => 0x0405,
        }
    }

    const fn slot(self) -> u32 {
        match self {
            Self::NetworkMetrics => 0,
            Self::LastChannel => 1,
            Self::BackoffState => 2,
        }
    }

    const fn tag(self) -> u8 {
        (self.nv_id() & 0xFF) as u8
    }
}

pub type RecordBuf = Vec<u8, RECORD_PAYLOAD_MAX>;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StoreError {
    Flash,
    OutOfRange,
    PayloadTooLarge,
    VerifyFailed,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flash => f.write_str("flash access failed"),
            Self::OutOfRange => f.write_str("record slot outside storage"),
            Self::PayloadTooLarge => f.write_str("payload exceeds record slot"),
            Self::VerifyFailed => f.write_str("read-back mismatch after write"),
        }
    }
}

/// Fixed-size records keyed by id. Saves are synchronous and best effort.
pub trait RecordStore {
    fn load(&mut self, id: RecordId) -> Option<RecordBuf>;
    fn save(&mut self, id: RecordId, payload: &[u8]) -> Result<(), StoreError>;
}

/// Durable state read at boot. Absent or corrupt records are `None`.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct PersistedCommissioning {
    pub metrics: Option<NetworkMetrics>,
    pub last_channel: Option<u8>,
    pub backoff: Option<BackoffState>,
}

impl PersistedCommissioning {
    pub fn load<S: RecordStore + ?Sized>(store: &mut S) -> Self {
        let metrics = store
            .load(RecordId::NetworkMetrics)
            .and_then(|record| NetworkMetrics::from_record(&record));
        let last_channel = store
            .load(RecordId::LastChannel)
            .and_then(|record| (record.len() == 1).then(|| record[0]));
        let backoff = store
            .load(RecordId::BackoffState)
            .and_then(|record| BackoffState::from_record(&record));
        if metrics.is_none() {
            log::info!("commissioning: first boot, no network metrics");
        }
        Self {
            metrics,
            last_channel,
            backoff,
        }
    }
}

pub fn save_metrics<S: RecordStore + ?Sized>(store: &mut S, metrics: &NetworkMetrics) {
    report(
        RecordId::NetworkMetrics,
        store.save(RecordId::NetworkMetrics, &metrics.record_bytes()),
    );
}

pub fn save_last_channel<S: RecordStore + ?Sized>(store: &mut S, channel: u8) {
    report(
        RecordId::LastChannel,
        store.save(RecordId::LastChannel, &[channel]),
    );
}

pub fn save_backoff<S: RecordStore + ?Sized>(store: &mut S, backoff: &BackoffState) {
    report(
        RecordId::BackoffState,
        store.save(RecordId::BackoffState, &backoff.record_bytes()),
    );
}

fn report(id: RecordId, result: Result<(), StoreError>) {
    if let Err(err) = result {
        warn!(
            "commissioning: save of record 0x{:04X} failed: {}",
            id.nv_id(),
            err
        );
    }
}

/// Record slots packed at `offset` in any `embedded_storage` device.
pub struct FlashRecordStore<F> {
    flash: F,
    offset: u32,
}

impl<F: Storage> FlashRecordStore<F> {
    pub fn new(flash: F, offset: u32) -> Self {
        Self { flash, offset }
    }

    pub fn into_inner(self) -> F {
        self.flash
    }

    fn slot_offset(&self, id: RecordId) -> Option<u32> {
        let start = self
            .offset
            .checked_add(id.slot() * RECORD_SLOT_LEN as u32)?;
        let end = start.checked_add(RECORD_SLOT_LEN as u32)?;
        (end as usize <= self.flash.capacity()).then_some(start)
    }

    fn read_slot(&mut self, id: RecordId) -> Option<[u8; RECORD_SLOT_LEN]> {
        let offset = self.slot_offset(id)?;
        let mut slot = [0u8; RECORD_SLOT_LEN];
        self.flash.read(offset, &mut slot).ok()?;
        Some(slot)
    }
}

impl<F: Storage> RecordStore for FlashRecordStore<F> {
    fn load(&mut self, id: RecordId) -> Option<RecordBuf> {
        let slot = self.read_slot(id)?;
        decode_slot(id, &slot)
    }

    fn save(&mut self, id: RecordId, payload: &[u8]) -> Result<(), StoreError> {
        let slot = encode_slot(id, payload)?;
        let offset = self.slot_offset(id).ok_or(StoreError::OutOfRange)?;
        if self.read_slot(id) == Some(slot) {
            return Ok(());
        }
        self.flash
            .write(offset, &slot)
            .map_err(|_| StoreError::Flash)?;
        match self.read_slot(id) {
            Some(written) if written == slot => Ok(()),
            _ => Err(StoreError::VerifyFailed),
        }
    }
}

fn encode_slot(id: RecordId, payload: &[u8]) -> Result<[u8; RECORD_SLOT_LEN], StoreError> {
    if payload.len() > RECORD_PAYLOAD_MAX {
        return Err(StoreError::PayloadTooLarge);
    }
    let mut slot = [0xFFu8; RECORD_SLOT_LEN];
    slot[0..4].copy_from_slice(&RECORD_STORE_MAGIC.to_le_bytes());
    slot[4] = RECORD_STORE_VERSION;
    slot[5] = id.tag();
    slot[6] = payload.len() as u8;
    slot[7..7 + payload.len()].copy_from_slice(payload);
    slot[RECORD_SLOT_LEN - 1] = checksum8(&slot[..RECORD_SLOT_LEN - 1]);
    Ok(slot)
}

fn decode_slot(id: RecordId, slot: &[u8; RECORD_SLOT_LEN]) -> Option<RecordBuf> {
    if slot.iter().all(|&byte| byte == 0xFF) {
        return None;
    }
    if u32::from_le_bytes([slot[0], slot[1], slot[2], slot[3]]) != RECORD_STORE_MAGIC {
        return None;
    }
    if slot[4] != RECORD_STORE_VERSION || slot[5] != id.tag() {
        return None;
    }
    let len = usize::from(slot[6]);
    if len > RECORD_SLOT_LEN - RECORD_FRAME_OVERHEAD {
        return None;
    }
    if slot[RECORD_SLOT_LEN - 1] != checksum8(&slot[..RECORD_SLOT_LEN - 1]) {
        return None;
    }
    Vec::from_slice(&slot[7..7 + len]).ok()
}

fn checksum8(bytes: &[u8]) -> u8 {
    let mut acc = 0x5Au8;
    for &byte in bytes {
        acc ^= byte.rotate_left(1);
    }
    acc
}
