//! The tool-change state machine, plus the device-interaction helpers
//! (dryer, feed-assist, ad-hoc feed/retract, spool-change) it shares with
//! the command surface.

use std::time::Duration;

use serde_json::json;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::AceError;
use crate::persist::{VariableStore, KEY_CURRENT_INDEX, KEY_FILAMENT_POS};
use crate::printer::PrinterAdapter;
use crate::protocol::SlotStatus;
use crate::state::{CoreState, FilamentPosition};
use crate::transport::DeviceLink;

/// Bound on the load phase's wait for the extruder switch to trip. The
/// original's equivalent loop has no such bound; see the redesign notes.
const LOAD_JAM_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct Orchestrator<L: DeviceLink> {
    link: L,
    config: Config,
}

impl<L: DeviceLink> Orchestrator<L> {
    pub fn new(link: L, config: Config) -> Self {
        Orchestrator { link, config }
    }

    /// The underlying device link, shared with the endless-spool monitor so
    /// it can read device-reported slot status without its own copy of the
    /// wire-level request helpers.
    pub(crate) fn link(&self) -> &L {
        &self.link
    }

    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    /// Poll the cached device status until it reports `ready`.
    pub(crate) async fn wait_ready(&self) {
        loop {
            if self.link.is_device_ready() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }

    pub async fn enable_feed_assist(&self, state: &mut CoreState, index: i32) -> Result<(), AceError> {
        let response = self
            .link
            .send_request("start_feed_assist", json!({ "index": index }))
            .await?;
        if !response.is_success() {
            return Err(AceError::device(Some(index), response.msg));
        }
        state.feed_assist_index = index;
        tokio::time::sleep(Duration::from_millis(700)).await;
        Ok(())
    }

    pub async fn disable_feed_assist(&self, state: &mut CoreState, index: i32) -> Result<(), AceError> {
        let response = self
            .link
            .send_request("stop_feed_assist", json!({ "index": index }))
            .await?;
        if !response.is_success() {
            return Err(AceError::device(Some(index), response.msg));
        }
        state.feed_assist_index = -1;
        tokio::time::sleep(Duration::from_millis(300)).await;
        Ok(())
    }

    pub async fn feed(&self, index: i32, length: i64, speed: i64) -> Result<(), AceError> {
        validate_motion_args(index, length, speed)?;
        let response = self
            .link
            .send_request(
                "feed_filament",
                json!({ "index": index, "length": length, "speed": speed }),
            )
            .await?;
        if !response.is_success() {
            return Err(AceError::device(Some(index), response.msg));
        }
        let dwell_ms = ((length as f64 / speed as f64) + 0.1) * 1000.0;
        tokio::time::sleep(Duration::from_millis(dwell_ms as u64)).await;
        Ok(())
    }

    pub async fn retract(&self, index: i32, length: i64, speed: i64) -> Result<(), AceError> {
        validate_motion_args(index, length, speed)?;
        let response = self
            .link
            .send_request(
                "unwind_filament",
                json!({ "index": index, "length": length, "speed": speed }),
            )
            .await?;
        if !response.is_success() {
            return Err(AceError::device(Some(index), response.msg));
        }
        let dwell_ms = ((length as f64 / speed as f64) + 0.1) * 1000.0;
        tokio::time::sleep(Duration::from_millis(dwell_ms as u64)).await;
        Ok(())
    }

    pub async fn start_drying(&self, temp: i64, duration_s: i64) -> Result<(), AceError> {
        if duration_s <= 0 {
            return Err(AceError::InvalidArgument("duration must be greater than zero".into()));
        }
        if temp <= 0 || temp > self.config.max_dryer_temperature {
            return Err(AceError::InvalidArgument(format!(
                "temp must be in 1..={}",
                self.config.max_dryer_temperature
            )));
        }
        let response = self
            .link
            .send_request(
                "drying",
                json!({ "temp": temp, "fan_speed": 7000, "duration": duration_s }),
            )
            .await?;
        if !response.is_success() {
            return Err(AceError::device(None, response.msg));
        }
        Ok(())
    }

    pub async fn stop_drying(&self) -> Result<(), AceError> {
        let response = self.link.send_request("drying_stop", json!({})).await?;
        if !response.is_success() {
            return Err(AceError::device(None, response.msg));
        }
        Ok(())
    }

    /// `change_spool`: retract `index`'s current filament to the bowden
    /// tube, first unloading it as the active tool if it is loaded.
    pub async fn change_spool<P: PrinterAdapter>(
        &self,
        printer: &mut P,
        state: &mut CoreState,
        index: i32,
        inventory_is_ready: bool,
    ) -> Result<(), AceError> {
        if index == state.current_loaded_index {
            self.change_tool(printer, state, -1).await?;
        }

        let device_is_ready = self
            .link
            .device_slot_status(index as usize)
            .map(|s| s != SlotStatus::Empty)
            .unwrap_or(false);

        if device_is_ready || inventory_is_ready {
            self.retract(index, self.config.bowden_tube_length, self.config.retract_speed)
                .await?;
        }
        Ok(())
    }

    /// `change_tool`: the full unload/load state machine.
    pub async fn change_tool<P: PrinterAdapter>(
        &self,
        printer: &mut P,
        state: &mut CoreState,
        target: i32,
    ) -> Result<(), AceError> {
        if !(-1..=3).contains(&target) {
            return Err(AceError::InvalidArgument(format!("tool {target} out of range -1..3")));
        }

        let prev = state.current_loaded_index;
        if prev == target {
            self.enable_feed_assist(state, target).await?;
            return Ok(());
        }

        if target != -1 {
            let ready = self.link.device_slot_status(target as usize) == Some(SlotStatus::Ready);
            if !ready {
                printer
                    .run_script(&format!("_ACE_ON_EMPTY_ERROR INDEX={target}"))
                    .await?;
                return Ok(());
            }
        }

        let endless_spool_was_enabled = state.endless_spool_enabled;
        if endless_spool_was_enabled {
            state.endless_spool_enabled = false;
            state.endless_spool_runout_detected = false;
        }
        state.park_in_progress = true;
        printer
            .run_script(&format!("_ACE_PRE_TOOLCHANGE FROM={prev} TO={target}"))
            .await?;

        info!(from = prev, to = target, "tool change starting");

        if prev != -1 {
            self.unload(printer, state, prev).await?;
            if target != -1 {
                self.load(printer, state, target).await?;
            }
        } else {
            self.load(printer, state, target).await?;
        }

        printer.reset_last_position();
        printer
            .run_script(&format!("_ACE_POST_TOOLCHANGE FROM={prev} TO={target}"))
            .await?;

        state.current_loaded_index = target;
        self.link.note_current_loaded_index(target);
        printer.set(KEY_CURRENT_INDEX, &target)?;
        printer.set(KEY_FILAMENT_POS, &state.filament_position)?;
        printer.reset_last_position();

        state.park_in_progress = false;
        if endless_spool_was_enabled {
            state.endless_spool_enabled = true;
        }

        info!(from = prev, to = target, "tool change complete");
        Ok(())
    }

    async fn unload<P: PrinterAdapter>(
        &self,
        printer: &mut P,
        state: &mut CoreState,
        prev: i32,
    ) -> Result<(), AceError> {
        self.disable_feed_assist(state, prev).await?;
        self.wait_ready().await;

        if state.filament_position == FilamentPosition::Nozzle {
            printer.run_script("CUT_TIP").await?;
            state.filament_position = FilamentPosition::Toolhead;
        }

        if state.filament_position == FilamentPosition::Toolhead {
            while printer.extruder_switch_present() {
                printer.move_extruder(-50.0, 10).await?;
                self.retract(prev, 100, self.config.retract_speed).await?;
                self.wait_ready().await;
            }
            state.filament_position = FilamentPosition::Bowden;
        }

        self.wait_ready().await;
        self.retract(prev, self.config.toolchange_retract_length, self.config.retract_speed)
            .await?;
        self.wait_ready().await;
        state.filament_position = FilamentPosition::Spliter;
        Ok(())
    }

    async fn load<P: PrinterAdapter>(
        &self,
        printer: &mut P,
        state: &mut CoreState,
        target: i32,
    ) -> Result<(), AceError> {
        self.wait_ready().await;
        self.feed(target, self.config.toolchange_load_length, self.config.retract_speed)
            .await?;
        state.filament_position = FilamentPosition::Bowden;
        self.wait_ready().await;

        self.enable_feed_assist(state, target).await?;

        let deadline = tokio::time::Instant::now() + LOAD_JAM_TIMEOUT;
        loop {
            if printer.extruder_switch_present() {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                warn!(slot = target, "extruder switch never tripped during load");
                return Err(AceError::Jam(format!(
                    "extruder switch never tripped loading slot {target}"
                )));
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        state.filament_position = FilamentPosition::Spliter;

        while !printer.toolhead_switch_triggered() {
            printer.move_extruder(1.0, 5).await?;
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        state.filament_position = FilamentPosition::Toolhead;

        printer
            .move_extruder(self.config.toolhead_sensor_to_nozzle as f64, 5)
            .await?;
        state.filament_position = FilamentPosition::Nozzle;
        Ok(())
    }
}

fn validate_motion_args(index: i32, length: i64, speed: i64) -> Result<(), AceError> {
    if !(0..4).contains(&index) {
        return Err(AceError::InvalidArgument(format!("index {index} out of range 0..3")));
    }
    if length <= 0 {
        return Err(AceError::InvalidArgument("length must be greater than zero".into()));
    }
    if speed <= 0 {
        return Err(AceError::InvalidArgument("speed must be greater than zero".into()));
    }
    Ok(())
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
