//! Control core for a four-slot automatic filament changer ("ACE").
//!
//! Owns the framed serial transport to the device, the tool-change state
//! machine, the endless-spool runout monitor, and the persistent inventory.
//! The touchscreen UI and the gcode interpreter that hosts this core are not
//! part of this crate; see [`printer`] for the narrow interface consumed
//! from that host.

pub mod commands;
pub mod config;
pub mod endless_spool;
pub mod error;
pub mod frame;
pub mod inventory;
pub mod orchestrator;
pub mod persist;
pub mod printer;
pub mod protocol;
pub mod router;
pub mod state;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use error::AceError;
