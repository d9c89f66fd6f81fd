//! The interface consumed from the printer host: gcode scripts, sensor
//! state, extruder motion, persistent variables, and print-state queries.
//! None of the host itself is reimplemented here — see the scope notes in
//! the crate root.

use async_trait::async_trait;

use crate::error::AceError;
use crate::persist::VariableStore;

/// Everything the orchestrator and endless-spool monitor need from the host
/// printer, abstracted so tests can substitute a scripted fake.
#[async_trait]
pub trait PrinterAdapter: VariableStore {
    /// The extruder-gear filament-present switch's logical flag.
    fn extruder_switch_present(&self) -> bool;

    /// A direct endstop query for the same physical switch, read in addition
    /// to the logical flag as a belt-and-braces check against host debouncing.
    fn extruder_endstop_triggered(&self) -> bool;

    /// The toolhead filament-present switch.
    fn toolhead_switch_triggered(&self) -> bool;

    /// Move the extruder axis by `delta_mm` (signed) at `feed_rate` mm/min.
    async fn move_extruder(&mut self, delta_mm: f64, feed_rate: i64) -> Result<(), AceError>;

    /// Run a named gcode macro/hook (`CUT_TIP`, `PAUSE`, `_ACE_PRE_TOOLCHANGE FROM=.. TO=..`, ...).
    async fn run_script(&mut self, script: &str) -> Result<(), AceError>;

    /// True if the host considers a print currently active: homed toolhead
    /// axes, `print_stats` reporting `printing`, or the idle timeout in
    /// `Printing`/`Ready`.
    fn is_printing_active(&self) -> bool;

    /// Reset the gcode-move module's last-position bookkeeping after a long
    /// orchestrator-driven move sequence.
    fn reset_last_position(&mut self);
}

#[cfg(test)]
#[path = "printer_tests.rs"]
mod tests;
