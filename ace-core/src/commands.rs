//! The gcode command surface (§6). Each public method corresponds to one
//! `ACE_*` command name; parameter lookup and validation happen here, wire
//! and state-machine work is delegated to [`Orchestrator`] and [`Inventory`].

use std::collections::HashMap;

use serde_json::{json, Value};

use crate::error::AceError;
use crate::inventory::{Inventory, InventoryRecord};
use crate::orchestrator::Orchestrator;
use crate::persist::{VariableStore, KEY_ENDLESS_SPOOL_ENABLED};
use crate::printer::PrinterAdapter;
use crate::state::CoreState;
use crate::transport::DeviceLink;

/// A command's named parameters (`INDEX=2 LENGTH=100`), already split out of
/// the gcode line by the host's parser. Lookups are case-sensitive, matching
/// the documented parameter names in §6.
#[derive(Debug, Default, Clone)]
pub struct CommandArgs {
    values: HashMap<String, String>,
}

impl CommandArgs {
    pub fn new(values: HashMap<String, String>) -> Self {
        CommandArgs { values }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    fn require_str(&self, key: &str) -> Result<&str, AceError> {
        self.get(key)
            .ok_or_else(|| AceError::InvalidArgument(format!("missing parameter {key}")))
    }

    fn require_i64(&self, key: &str) -> Result<i64, AceError> {
        self.require_str(key)?
            .parse()
            .map_err(|_| AceError::InvalidArgument(format!("{key} must be an integer")))
    }

    fn i64_or(&self, key: &str, default: i64) -> Result<i64, AceError> {
        match self.get(key) {
            Some(_) => self.require_i64(key),
            None => Ok(default),
        }
    }

    /// `INDEX`-style parameter, validated into `0..4`.
    fn require_slot_index(&self, key: &str) -> Result<usize, AceError> {
        let value = self.require_i64(key)?;
        if !(0..4).contains(&value) {
            return Err(AceError::InvalidArgument(format!("{key} must be in 0..3")));
        }
        Ok(value as usize)
    }

    fn flag(&self, key: &str) -> bool {
        matches!(self.get(key), Some("1") | Some("true") | Some("TRUE"))
    }
}

fn parse_color(raw: &str) -> Result<[u8; 3], AceError> {
    let parts: Vec<&str> = raw.split(',').collect();
    if parts.len() != 3 {
        return Err(AceError::InvalidArgument(format!(
            "COLOR must be R,G,B, got {raw}"
        )));
    }
    let mut color = [0u8; 3];
    for (slot, part) in color.iter_mut().zip(parts) {
        *slot = part
            .trim()
            .parse()
            .map_err(|_| AceError::InvalidArgument(format!("COLOR component {part} is not 0..255")))?;
    }
    Ok(color)
}

/// Registers every `ACE_*` command and dispatches it against an owned
/// [`Orchestrator`], mirroring the way the endless-spool monitor owns one.
pub struct CommandSurface<L: DeviceLink + Clone> {
    orchestrator: Orchestrator<L>,
}

impl<L: DeviceLink + Clone> CommandSurface<L> {
    pub fn new(orchestrator: Orchestrator<L>) -> Self {
        CommandSurface { orchestrator }
    }

    /// Dispatch `command` (an `ACE_*` name) with `args` against the shared
    /// device link, printer host, and persisted state. Returns the JSON body
    /// of the command's response.
    pub async fn dispatch<P: PrinterAdapter>(
        &self,
        command: &str,
        args: &CommandArgs,
        printer: &mut P,
        state: &mut CoreState,
        inventory: &mut Inventory,
    ) -> Result<Value, AceError> {
        match command {
            "ACE_START_DRYING" => self.start_drying(args).await,
            "ACE_STOP_DRYING" => self.stop_drying().await,
            "ACE_ENABLE_FEED_ASSIST" => self.enable_feed_assist(args, state).await,
            "ACE_DISABLE_FEED_ASSIST" => self.disable_feed_assist(args, state).await,
            "ACE_FEED" => self.feed(args).await,
            "ACE_RETRACT" => self.retract(args).await,
            "ACE_CHANGE_TOOL" => self.change_tool(args, printer, state).await,
            "ACE_CHANGE_SPOOL" => self.change_spool(args, printer, state, inventory).await,
            "ACE_SET_SLOT" => self.set_slot(args, printer, inventory),
            "ACE_QUERY_SLOTS" => Ok(Self::query_slots(inventory)),
            "ACE_ENABLE_ENDLESS_SPOOL" => Self::enable_endless_spool(printer, state),
            "ACE_DISABLE_ENDLESS_SPOOL" => Self::disable_endless_spool(printer, state),
            "ACE_ENDLESS_SPOOL_STATUS" => Ok(Self::endless_spool_status(state)),
            "ACE_GET_CURRENT_INDEX" => Ok(json!({ "current_index": state.current_loaded_index })),
            "ACE_SAVE_INVENTORY" => {
                inventory.persist(printer)?;
                Ok(json!({ "saved": true }))
            }
            "ACE_TEST_RUNOUT_SENSOR" => Ok(Self::test_runout_sensor(printer)),
            "ACE_DEBUG" => self.debug(args).await,
            other => Err(AceError::InvalidArgument(format!("unknown command {other}"))),
        }
    }

    async fn start_drying(&self, args: &CommandArgs) -> Result<Value, AceError> {
        let temp = args.require_i64("TEMP")?;
        let duration = args.i64_or("DURATION", 240)?;
        self.orchestrator.start_drying(temp, duration).await?;
        Ok(json!({ "temp": temp, "duration": duration }))
    }

    async fn stop_drying(&self) -> Result<Value, AceError> {
        self.orchestrator.stop_drying().await?;
        Ok(json!({ "stopped": true }))
    }

    async fn enable_feed_assist(&self, args: &CommandArgs, state: &mut CoreState) -> Result<Value, AceError> {
        let index = args.require_i64("INDEX")? as i32;
        self.orchestrator.enable_feed_assist(state, index).await?;
        Ok(json!({ "index": index }))
    }

    /// Defaults `INDEX` to whichever slot feed-assist is currently enabled
    /// for, per §6.
    async fn disable_feed_assist(&self, args: &CommandArgs, state: &mut CoreState) -> Result<Value, AceError> {
        let index = args.i64_or("INDEX", state.feed_assist_index as i64)? as i32;
        if index < 0 {
            return Err(AceError::InvalidArgument(
                "no feed-assist index is active to disable".into(),
            ));
        }
        self.orchestrator.disable_feed_assist(state, index).await?;
        Ok(json!({ "index": index }))
    }

    async fn feed(&self, args: &CommandArgs) -> Result<Value, AceError> {
        let index = args.require_i64("INDEX")? as i32;
        let length = args.require_i64("LENGTH")?;
        let speed = args.i64_or("SPEED", self.orchestrator.config().feed_speed)?;
        self.orchestrator.feed(index, length, speed).await?;
        Ok(json!({ "index": index, "length": length, "speed": speed }))
    }

    async fn retract(&self, args: &CommandArgs) -> Result<Value, AceError> {
        let index = args.require_i64("INDEX")? as i32;
        let length = args.require_i64("LENGTH")?;
        let speed = args.i64_or("SPEED", self.orchestrator.config().retract_speed)?;
        self.orchestrator.retract(index, length, speed).await?;
        Ok(json!({ "index": index, "length": length, "speed": speed }))
    }

    async fn change_tool<P: PrinterAdapter>(
        &self,
        args: &CommandArgs,
        printer: &mut P,
        state: &mut CoreState,
    ) -> Result<Value, AceError> {
        let tool = args.require_i64("TOOL")? as i32;
        self.orchestrator.change_tool(printer, state, tool).await?;
        Ok(json!({ "current_index": state.current_loaded_index }))
    }

    async fn change_spool<P: PrinterAdapter>(
        &self,
        args: &CommandArgs,
        printer: &mut P,
        state: &mut CoreState,
        inventory: &Inventory,
    ) -> Result<Value, AceError> {
        let index = args.require_slot_index("INDEX")?;
        let inventory_is_ready = inventory.is_ready(index);
        self.orchestrator
            .change_spool(printer, state, index as i32, inventory_is_ready)
            .await?;
        Ok(json!({ "index": index }))
    }

    fn set_slot<P: PrinterAdapter>(
        &self,
        args: &CommandArgs,
        printer: &mut P,
        inventory: &mut Inventory,
    ) -> Result<Value, AceError> {
        let index = args.require_slot_index("INDEX")?;

        if args.flag("EMPTY") {
            inventory.clear_slot(printer, index)?;
            return Ok(json!({ "index": index, "status": "empty" }));
        }

        let color = parse_color(args.require_str("COLOR")?)?;
        let material = args.require_str("MATERIAL")?.to_string();
        let temp = args.require_i64("TEMP")?;
        if temp <= 0 {
            return Err(AceError::InvalidArgument("TEMP must be greater than zero".into()));
        }

        inventory.set_slot(printer, index, InventoryRecord::ready(color, material, temp))?;
        Ok(json!({ "index": index, "status": "ready" }))
    }

    fn query_slots(inventory: &Inventory) -> Value {
        json!(inventory.as_slice())
    }

    fn enable_endless_spool<P: PrinterAdapter>(printer: &mut P, state: &mut CoreState) -> Result<Value, AceError> {
        state.endless_spool_enabled = true;
        printer.set(KEY_ENDLESS_SPOOL_ENABLED, &true)?;
        Ok(json!({ "endless_spool_enabled": true }))
    }

    fn disable_endless_spool<P: PrinterAdapter>(printer: &mut P, state: &mut CoreState) -> Result<Value, AceError> {
        state.endless_spool_enabled = false;
        state.endless_spool_runout_detected = false;
        printer.set(KEY_ENDLESS_SPOOL_ENABLED, &false)?;
        Ok(json!({ "endless_spool_enabled": false }))
    }

    fn endless_spool_status(state: &CoreState) -> Value {
        json!({
            "enabled": state.endless_spool_enabled,
            "in_progress": state.endless_spool_in_progress,
            "runout_detected": state.endless_spool_runout_detected,
        })
    }

    fn test_runout_sensor<P: PrinterAdapter>(printer: &P) -> Value {
        let switch_present = printer.extruder_switch_present();
        let endstop_triggered = printer.extruder_endstop_triggered();
        json!({
            "extruder_switch_present": switch_present,
            "extruder_endstop_triggered": endstop_triggered,
            "predicted_runout": !(switch_present && endstop_triggered),
        })
    }

    async fn debug(&self, args: &CommandArgs) -> Result<Value, AceError> {
        let method = args.require_str("METHOD")?.to_string();
        let params = match args.get("PARAMS") {
            Some(raw) => serde_json::from_str(raw)?,
            None => json!({}),
        };
        let response = self.orchestrator.link().send_request(&method, params).await?;
        Ok(json!({ "code": response.code, "msg": response.msg, "result": response.result }))
    }
}

#[cfg(test)]
#[path = "commands_tests.rs"]
mod tests;
