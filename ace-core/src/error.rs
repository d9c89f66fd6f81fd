//! The single error type shared by every component of the core.
//!
//! Each variant corresponds to one of the error kinds in the design's
//! error-handling section. Internal seams always return `Result<T, AceError>`;
//! `anyhow` is reserved for the binary entry point and test harness, where
//! errors are only ever displayed, never matched on.

use thiserror::Error;

/// A slot index outside `0..4`, surfaced back to the caller for context.
pub type SlotIndex = i32;

#[derive(Debug, Error)]
pub enum AceError {
    /// The on-wire frame failed preamble, length, or CRC validation.
    #[error("framing error: {0}")]
    Framing(String),

    /// The serial port could not be read from or written to.
    #[error("transport fault: {0}")]
    Transport(#[from] std::io::Error),

    /// A request's continuation never arrived before the 2s deadline.
    #[error("request {0} timed out")]
    Timeout(u32),

    /// The device responded with a nonzero `code`.
    #[error("device error (slot {slot:?}): {message}")]
    Device {
        slot: Option<SlotIndex>,
        message: String,
    },

    /// A gcode command argument failed validation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The extruder or toolhead switch never tripped during a load.
    #[error("filament jam: {0}")]
    Jam(String),

    /// Endless-spool switchover found no slot that is both ready in
    /// inventory and ready on the device.
    #[error("no eligible slot for endless-spool switchover")]
    NoEligibleSlot,

    /// Failed to (de)serialize a wire payload or a persistent variable.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl AceError {
    pub fn device(slot: Option<SlotIndex>, message: impl Into<String>) -> Self {
        AceError::Device {
            slot,
            message: message.into(),
        }
    }

    /// True for errors the transport should react to by tearing down the
    /// port and scheduling a reconnect, per the recovery policy.
    pub fn is_transport_fault(&self) -> bool {
        matches!(self, AceError::Transport(_))
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
