//! Layered configuration: compiled-in defaults, overridden by environment
//! variables, overridden by CLI flags. Validation happens once, synchronously,
//! before any serial port is opened or any task is spawned.

use clap::Parser;

/// Runtime configuration for the ACE control core.
#[derive(Debug, Clone, Parser)]
#[command(name = "ace-core", version, about = "Control core for a four-slot filament changer")]
pub struct Config {
    /// Serial device path, logged at connect time. Per §4.2 the connect
    /// task always auto-discovers the ACE port by description rather than
    /// opening this path directly.
    #[arg(long, env = "ACE_SERIAL", default_value = "/dev/ttyACM0")]
    pub serial: String,

    /// Serial baud rate.
    #[arg(long, env = "ACE_BAUD", default_value = "115200")]
    pub baud: u32,

    /// GPIO/pin identifier for the extruder-gear filament switch (opaque, passed to the printer adapter).
    #[arg(long, env = "ACE_EXTRUDER_SENSOR_PIN")]
    pub extruder_sensor_pin: Option<String>,

    /// GPIO/pin identifier for the toolhead filament switch (opaque, passed to the printer adapter).
    #[arg(long, env = "ACE_TOOLHEAD_SENSOR_PIN")]
    pub toolhead_sensor_pin: Option<String>,

    /// Feed speed in mm/min used by default for ACE_FEED.
    #[arg(long, env = "ACE_FEED_SPEED", default_value = "50")]
    pub feed_speed: i64,

    /// Retract speed in mm/min used by default for ACE_RETRACT and toolchange motion.
    #[arg(long, env = "ACE_RETRACT_SPEED", default_value = "50")]
    pub retract_speed: i64,

    /// Length unwound from the exhausted slot during a tool change, in mm.
    #[arg(long, env = "ACE_TOOLCHANGE_RETRACT_LENGTH", default_value = "150")]
    pub toolchange_retract_length: i64,

    /// Length fed from the target slot during a tool change, in mm.
    #[arg(long, env = "ACE_TOOLCHANGE_LOAD_LENGTH", default_value = "630")]
    pub toolchange_load_length: i64,

    /// Extra extruder travel from the toolhead switch to the nozzle tip, in mm.
    #[arg(long, env = "ACE_TOOLHEAD_SENSOR_TO_NOZZLE", default_value = "0")]
    pub toolhead_sensor_to_nozzle: i64,

    /// Bowden tube length, in mm, used when retracting a spool for a spool change.
    #[arg(long, env = "ACE_BOWDEN_TUBE_LENGTH", default_value = "1000")]
    pub bowden_tube_length: i64,

    /// Highest dryer target temperature the core will accept, in °C.
    #[arg(long, env = "ACE_MAX_DRYER_TEMPERATURE", default_value = "55")]
    pub max_dryer_temperature: i64,

    /// Whether endless-spool runout recovery starts enabled.
    #[arg(long, env = "ACE_ENDLESS_SPOOL", default_value = "false")]
    pub endless_spool: bool,

    /// Reader task period, in milliseconds.
    #[arg(long, env = "ACE_READER_PERIOD_MS", default_value = "100")]
    pub reader_period_ms: u64,

    /// Writer task period, in milliseconds.
    #[arg(long, env = "ACE_WRITER_PERIOD_MS", default_value = "500")]
    pub writer_period_ms: u64,

    /// How long a connect attempt waits before retrying, in milliseconds.
    #[arg(long, env = "ACE_CONNECT_POLL_INTERVAL_MS", default_value = "1000")]
    pub connect_poll_interval_ms: u64,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "ACE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log format (json or text).
    #[arg(long, env = "ACE_LOG_FORMAT", default_value = "text")]
    pub log_format: String,
}

impl Config {
    /// Validate the configuration after parsing. Rejects nonsensical values
    /// before any component is constructed.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.baud == 0 {
            anyhow::bail!("baud must be greater than zero");
        }
        if self.feed_speed <= 0 {
            anyhow::bail!("feed_speed must be greater than zero");
        }
        if self.retract_speed <= 0 {
            anyhow::bail!("retract_speed must be greater than zero");
        }
        if self.toolchange_retract_length <= 0 {
            anyhow::bail!("toolchange_retract_length must be greater than zero");
        }
        if self.toolchange_load_length <= 0 {
            anyhow::bail!("toolchange_load_length must be greater than zero");
        }
        if self.toolhead_sensor_to_nozzle < 0 {
            anyhow::bail!("toolhead_sensor_to_nozzle must not be negative");
        }
        if self.bowden_tube_length <= 0 {
            anyhow::bail!("bowden_tube_length must be greater than zero");
        }
        if self.max_dryer_temperature <= 0 {
            anyhow::bail!("max_dryer_temperature must be greater than zero");
        }
        if self.reader_period_ms == 0 || self.writer_period_ms == 0 {
            anyhow::bail!("reader_period_ms and writer_period_ms must be greater than zero");
        }
        match self.log_format.as_str() {
            "json" | "text" => {}
            other => anyhow::bail!("invalid log format: {other} (expected json or text)"),
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
