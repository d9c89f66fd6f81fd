//! Per-tool filament position tracking and the device state cache.

use serde::{Deserialize, Serialize};

use crate::protocol::DeviceStatus;

/// Where the filament physically sits, tracked per the currently loaded tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilamentPosition {
    /// In the long tube between the device and the extruder gear.
    Bowden,
    /// Retracted into the device's internal splitter.
    Spliter,
    /// Past the extruder gear, toolhead switch tripped.
    Toolhead,
    /// Advanced the fixed distance from the toolhead switch to the nozzle tip.
    Nozzle,
}

/// Mutable core state that persists across tool changes and reconnects.
#[derive(Debug, Clone)]
pub struct CoreState {
    pub current_loaded_index: i32,
    pub filament_position: FilamentPosition,
    pub endless_spool_enabled: bool,
    pub endless_spool_in_progress: bool,
    pub endless_spool_runout_detected: bool,
    pub park_in_progress: bool,
    pub feed_assist_index: i32,
}

impl Default for CoreState {
    fn default() -> Self {
        CoreState {
            current_loaded_index: -1,
            filament_position: FilamentPosition::Spliter,
            endless_spool_enabled: false,
            endless_spool_in_progress: false,
            endless_spool_runout_detected: false,
            park_in_progress: false,
            feed_assist_index: -1,
        }
    }
}

impl CoreState {
    /// True when, per the data-model invariant, no tool is loaded and the
    /// filament sits somewhere between bowden and splitter.
    pub fn is_unloaded(&self) -> bool {
        self.current_loaded_index == -1
            && matches!(
                self.filament_position,
                FilamentPosition::Bowden | FilamentPosition::Spliter
            )
    }
}

/// Latest device-reported snapshot, written only by the reader task's
/// continuations and read by the monitor and command surface.
#[derive(Debug, Clone, Default)]
pub struct DeviceStateCache {
    status: Option<DeviceStatus>,
}

impl DeviceStateCache {
    pub fn update(&mut self, status: DeviceStatus) {
        self.status = Some(status);
    }

    pub fn get(&self) -> Option<&DeviceStatus> {
        self.status.as_ref()
    }

    pub fn is_ready(&self) -> bool {
        matches!(
            self.status.as_ref().map(|s| s.status),
            Some(crate::protocol::DeviceOverallStatus::Ready)
        )
    }

    pub fn slot_status(&self, index: usize) -> Option<crate::protocol::SlotStatus> {
        self.status.as_ref().and_then(|s| s.slots.get(index)).map(|s| s.status)
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
