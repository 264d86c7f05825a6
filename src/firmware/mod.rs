//! ESP32 bindings: logger, flash-backed record store and the input queue the
//! stack callbacks feed.

use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel::Channel};
use embedded_storage::ReadStorage;
use esp_storage::FlashStorage;

use crate::commissioning::FlashRecordStore;
use crate::runtime::NodeInput;

pub type CommissioningRecordStore<'d> = FlashRecordStore<FlashStorage<'d>>;

/// Stack callbacks, button handler and application settings post here; the
/// commissioning task is the only receiver.
pub static NODE_INPUTS: Channel<CriticalSectionRawMutex, NodeInput, 8> = Channel::new();

pub fn init_logging() {
    esp_println::logger::init_logger(log::LevelFilter::Info);
}

/// Record slots live in the last flash sector.
pub fn record_store<'d>(
    flash_peripheral: esp_hal::peripherals::FLASH<'d>,
) -> CommissioningRecordStore<'d> {
    let flash = FlashStorage::new(flash_peripheral).multicore_auto_park();
    let capacity = flash.capacity() as u32;
    let offset = capacity.saturating_sub(FlashStorage::SECTOR_SIZE);
    FlashRecordStore::new(flash, offset)
}

/// Queues an input, dropping it when the queue is full.
pub fn post_input(input: NodeInput) {
    if NODE_INPUTS.try_send(input).is_err() {
        log::warn!("commissioning: input queue full, dropped {:?}", input);
    }
}
