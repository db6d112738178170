use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A bookable (center, date, time) unit with finite capacity. Keys the slot
/// calendar; every mutation of a slot's booked count goes through a single
/// atomic store operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotKey {
    pub center: String,
    pub date: NaiveDate,
    pub time_slot: String,
}

impl SlotKey {
    pub fn new(center: impl Into<String>, date: NaiveDate, time_slot: impl Into<String>) -> Self {
        Self {
            center: center.into(),
            date,
            time_slot: time_slot.into(),
        }
    }
}

/// Capture windows offered at every center: mornings and afternoons on the
/// hour, with the midday hour reserved for walk-in overflow.
pub const STANDARD_TIME_SLOTS: [&str; 7] =
    ["09:00", "10:00", "11:00", "13:00", "14:00", "15:00", "16:00"];

pub fn is_standard_slot(time_slot: &str) -> bool {
    STANDARD_TIME_SLOTS.contains(&time_slot)
}

/// Calendar cell state. `booked` never exceeds `capacity`; the store enforces
/// this transactionally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotEntry {
    pub capacity: u32,
    pub booked: u32,
}

impl SlotEntry {
    pub fn remaining(&self) -> u32 {
        self.capacity.saturating_sub(self.booked)
    }
}

/// Read-only availability row returned for one standard time slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotAvailability {
    pub time_slot: String,
    pub capacity: u32,
    pub booked: u32,
    pub remaining: u32,
}
