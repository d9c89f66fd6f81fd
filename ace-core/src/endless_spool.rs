//! Runout detection and automatic slot switchover (§4.6). A timer-driven
//! monitor that, while enabled, watches the extruder switch and hot-swaps
//! to the next ready slot without pausing the print — distinct from
//! [`crate::orchestrator::Orchestrator::change_tool`], which this never
//! calls: the switchover skips the pre/post hooks and the nozzle cut
//! entirely, since it only ever touches bowden-stage filament.

use std::time::Duration;

use tracing::{info, warn};

use crate::error::AceError;
use crate::inventory::Inventory;
use crate::orchestrator::Orchestrator;
use crate::persist::{VariableStore, KEY_CURRENT_INDEX};
use crate::printer::PrinterAdapter;
use crate::protocol::SlotStatus;
use crate::state::CoreState;
use crate::transport::DeviceLink;

/// Monitor cadence while a print is actively running.
const PRINTING_PERIOD: Duration = Duration::from_millis(50);
/// Monitor cadence while idle.
const IDLE_PERIOD: Duration = Duration::from_millis(200);
/// Bound on the switchover's wait for the extruder switch to trip on the
/// newly fed slot, mirroring the load phase's jam timeout.
const SWITCHOVER_JAM_TIMEOUT: Duration = Duration::from_secs(30);

/// Periodic poller for endless-spool runout recovery. Shares a wire
/// connection with the orchestrator it is built from (cloning it clones the
/// underlying [`DeviceLink`], not a second connection) so a switchover and a
/// user-initiated tool change can never race on the serial port.
pub struct EndlessSpoolMonitor<L: DeviceLink + Clone> {
    orchestrator: Orchestrator<L>,
}

impl<L: DeviceLink + Clone> EndlessSpoolMonitor<L> {
    pub fn new(orchestrator: Orchestrator<L>) -> Self {
        EndlessSpoolMonitor { orchestrator }
    }

    /// Next wake delay for the reactor, reflecting the adaptive cadence:
    /// 50ms while printing, 200ms idle.
    pub fn next_wake(&self, printer: &impl PrinterAdapter) -> Duration {
        if printer.is_printing_active() {
            PRINTING_PERIOD
        } else {
            IDLE_PERIOD
        }
    }

    /// Run forever at the adaptive cadence, ticking until cancelled.
    /// Intended to be spawned as a reactor task alongside the transport's
    /// reader/writer.
    pub async fn run<P: PrinterAdapter>(&self, printer: &mut P, state: &mut CoreState, inventory: &mut Inventory) -> ! {
        loop {
            let delay = self.next_wake(printer);
            tokio::time::sleep(delay).await;
            if let Err(e) = self.tick(printer, state, inventory).await {
                warn!(error = %e, "endless-spool tick failed");
            }
        }
    }

    /// One monitor tick. No-ops unless endless-spool is enabled, a tool is
    /// loaded, no tool change is in progress, and no switchover is already
    /// running. Runout latches via `endless_spool_runout_detected` so a
    /// single low reading triggers at most one switchover.
    pub async fn tick<P: PrinterAdapter>(
        &self,
        printer: &mut P,
        state: &mut CoreState,
        inventory: &mut Inventory,
    ) -> Result<(), AceError> {
        if !state.endless_spool_enabled {
            return Ok(());
        }
        if state.current_loaded_index == -1 || state.park_in_progress || state.endless_spool_in_progress {
            return Ok(());
        }

        // Belt-and-braces: either reading going false is treated as runout,
        // compensating for host-side debouncing on just one of the two.
        let filament_present = printer.extruder_switch_present() && printer.extruder_endstop_triggered();
        if filament_present {
            return Ok(());
        }

        if state.endless_spool_runout_detected {
            return Ok(());
        }
        state.endless_spool_runout_detected = true;

        warn!(slot = state.current_loaded_index, "filament runout detected");
        self.switchover(printer, state, inventory).await
    }

    async fn next_eligible_slot(&self, exhausted: usize, inventory: &Inventory) -> Option<usize> {
        (1..4).map(|offset| (exhausted + offset) % 4).find(|&candidate| {
            inventory.is_ready(candidate) && self.orchestrator.link().device_slot_status(candidate) == Some(SlotStatus::Ready)
        })
    }

    async fn switchover<P: PrinterAdapter>(
        &self,
        printer: &mut P,
        state: &mut CoreState,
        inventory: &mut Inventory,
    ) -> Result<(), AceError> {
        let exhausted = state.current_loaded_index as usize;

        let Some(next) = self.next_eligible_slot(exhausted, inventory).await else {
            warn!(slot = exhausted, "no eligible slot for endless-spool switchover");
            printer.run_script("PAUSE").await?;
            state.endless_spool_runout_detected = false;
            return Err(AceError::NoEligibleSlot);
        };

        state.endless_spool_in_progress = true;
        state.endless_spool_runout_detected = false;

        inventory.clear_slot(printer, exhausted)?;

        self.orchestrator.disable_feed_assist(state, exhausted as i32).await?;
        self.orchestrator.wait_ready().await;

        let config = self.orchestrator.config();
        self.orchestrator
            .feed(next as i32, config.toolchange_load_length, config.retract_speed)
            .await?;
        self.orchestrator.wait_ready().await;

        let deadline = tokio::time::Instant::now() + SWITCHOVER_JAM_TIMEOUT;
        loop {
            if printer.extruder_switch_present() {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                warn!(slot = next, "extruder switch never tripped during endless-spool switchover");
                printer.run_script("PAUSE").await?;
                state.endless_spool_in_progress = false;
                return Err(AceError::Jam(format!(
                    "endless-spool switchover to slot {next} never tripped the extruder switch"
                )));
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        self.orchestrator.enable_feed_assist(state, next as i32).await?;

        state.current_loaded_index = next as i32;
        self.orchestrator.link().note_current_loaded_index(state.current_loaded_index);
        printer.set(KEY_CURRENT_INDEX, &state.current_loaded_index)?;
        state.endless_spool_in_progress = false;

        info!(from = exhausted, to = next, "endless-spool switchover complete");
        Ok(())
    }
}

#[cfg(test)]
#[path = "endless_spool_tests.rs"]
mod tests;
