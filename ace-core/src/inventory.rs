//! The user-maintained inventory: four records distinct from the
//! device-reported slots, hydrated from and persisted to the variable store.

use serde::{Deserialize, Serialize};

use crate::error::AceError;
use crate::persist::{VariableStore, KEY_INVENTORY};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InventoryStatus {
    Empty,
    Ready,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub status: InventoryStatus,
    pub color: [u8; 3],
    pub material: String,
    pub temp: i64,
}

impl InventoryRecord {
    pub fn empty() -> Self {
        InventoryRecord {
            status: InventoryStatus::Empty,
            color: [0, 0, 0],
            material: String::new(),
            temp: 0,
        }
    }

    pub fn ready(color: [u8; 3], material: impl Into<String>, temp: i64) -> Self {
        InventoryRecord {
            status: InventoryStatus::Ready,
            color,
            material: material.into(),
            temp,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status == InventoryStatus::Empty
    }
}

/// Four-slot inventory, hydrated from and persisted to a [`VariableStore`].
#[derive(Debug, Clone)]
pub struct Inventory {
    slots: [InventoryRecord; 4],
}

impl Inventory {
    /// Load from `store`, defaulting to four empty records if absent.
    pub fn load(store: &impl VariableStore) -> Self {
        let slots = store
            .get::<[InventoryRecord; 4]>(KEY_INVENTORY)
            .unwrap_or_else(|| {
                [
                    InventoryRecord::empty(),
                    InventoryRecord::empty(),
                    InventoryRecord::empty(),
                    InventoryRecord::empty(),
                ]
            });
        Inventory { slots }
    }

    pub fn get(&self, index: usize) -> Option<&InventoryRecord> {
        self.slots.get(index)
    }

    pub fn is_ready(&self, index: usize) -> bool {
        self.slots.get(index).map(|s| !s.is_empty()).unwrap_or(false)
    }

    /// Set `index` to `record`, validating `index ∈ 0..3`, and persist the
    /// whole array.
    pub fn set_slot(
        &mut self,
        store: &mut impl VariableStore,
        index: usize,
        record: InventoryRecord,
    ) -> Result<(), AceError> {
        if index >= 4 {
            return Err(AceError::InvalidArgument(format!(
                "index {index} out of range 0..3"
            )));
        }
        self.slots[index] = record;
        self.persist(store)
    }

    /// Mark `index` empty and persist, used by the endless-spool switchover
    /// when a slot exhausts.
    pub fn clear_slot(&mut self, store: &mut impl VariableStore, index: usize) -> Result<(), AceError> {
        self.set_slot(store, index, InventoryRecord::empty())
    }

    pub fn persist(&self, store: &mut impl VariableStore) -> Result<(), AceError> {
        store.set(KEY_INVENTORY, &self.slots)
    }

    pub fn as_slice(&self) -> &[InventoryRecord; 4] {
        &self.slots
    }
}

#[cfg(test)]
#[path = "inventory_tests.rs"]
mod tests;
