//! Standalone entry point for the ACE control core: opens the serial
//! transport, runs the endless-spool monitor on its adaptive cadence, and
//! accepts `ACE_*` commands one per line on stdin (e.g.
//! `ACE_FEED INDEX=1 LENGTH=100`). The gcode interpreter and printer
//! electronics that normally host this core are out of scope (see
//! [`ace_core::printer`]); [`StubPrinter`] stands in for them so the core can
//! be exercised end-to-end against a real ACE device without one.

use std::collections::HashMap;

use async_trait::async_trait;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use ace_core::commands::{CommandArgs, CommandSurface};
use ace_core::config::Config;
use ace_core::endless_spool::EndlessSpoolMonitor;
use ace_core::error::AceError;
use ace_core::inventory::Inventory;
use ace_core::orchestrator::Orchestrator;
use ace_core::persist::{InMemoryVariableStore, VariableStore, KEY_CURRENT_INDEX, KEY_ENDLESS_SPOOL_ENABLED};
use ace_core::printer::PrinterAdapter;
use ace_core::state::CoreState;
use ace_core::transport::Transport;

/// Stands in for the real printer host. There are no electrical switches to
/// read here, so both report filament always present/triggered, and moves
/// and hook scripts are only logged — enough for the orchestrator and
/// command surface to run to completion against a real serial-connected
/// device without a gcode interpreter driving them.
struct StubPrinter {
    store: InMemoryVariableStore,
}

impl StubPrinter {
    fn new() -> Self {
        StubPrinter {
            store: InMemoryVariableStore::default(),
        }
    }
}

#[async_trait]
impl PrinterAdapter for StubPrinter {
    fn extruder_switch_present(&self) -> bool {
        true
    }

    fn extruder_endstop_triggered(&self) -> bool {
        true
    }

    fn toolhead_switch_triggered(&self) -> bool {
        true
    }

    async fn move_extruder(&mut self, delta_mm: f64, feed_rate: i64) -> Result<(), AceError> {
        info!(delta_mm, feed_rate, "stub printer: move_extruder");
        Ok(())
    }

    async fn run_script(&mut self, script: &str) -> Result<(), AceError> {
        info!(script, "stub printer: run_script");
        Ok(())
    }

    fn is_printing_active(&self) -> bool {
        false
    }

    fn reset_last_position(&mut self) {}
}

impl VariableStore for StubPrinter {
    fn get_raw(&self, key: &str) -> Option<String> {
        self.store.get_raw(key)
    }

    fn set_raw(&mut self, key: &str, value: String) {
        self.store.set_raw(key, value);
    }
}

/// Parse `ACE_FEED INDEX=1 LENGTH=100 SPEED=50` into a command name and its
/// `KEY=VALUE` parameters.
fn parse_line(line: &str) -> Option<(String, CommandArgs)> {
    let mut tokens = line.split_whitespace();
    let command = tokens.next()?.to_string();
    let mut values = HashMap::new();
    for token in tokens {
        if let Some((key, value)) = token.split_once('=') {
            values.insert(key.to_string(), value.to_string());
        }
    }
    Some((command, CommandArgs::new(values)))
}

fn init_logging(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_new(&config.log_level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    match config.log_format.as_str() {
        "json" => subscriber.json().init(),
        _ => subscriber.init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    config.validate()?;
    init_logging(&config);

    info!(serial = %config.serial, baud = config.baud, "ACE control core starting");

    let local = tokio::task::LocalSet::new();
    local.run_until(run(config)).await
}

async fn run(config: Config) -> anyhow::Result<()> {
    let transport = Transport::new(config.clone());

    let mut printer = StubPrinter::new();
    let mut state = CoreState::default();
    let mut inventory = Inventory::load(&printer);

    if let Some(current_index) = printer.get::<i32>(KEY_CURRENT_INDEX) {
        state.current_loaded_index = current_index;
        transport.note_current_loaded_index(current_index);
    }
    state.endless_spool_enabled = printer.get::<bool>(KEY_ENDLESS_SPOOL_ENABLED).unwrap_or(config.endless_spool);

    transport.spawn();

    let orchestrator = Orchestrator::new(transport, config);
    let monitor = EndlessSpoolMonitor::new(orchestrator.clone());
    let surface = CommandSurface::new(orchestrator);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    info!("ready for ACE_* commands on stdin");

    loop {
        let next_wake = monitor.next_wake(&printer);
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("received ctrl-c, shutting down");
                return Ok(());
            }
            _ = tokio::time::sleep(next_wake) => {
                if let Err(e) = monitor.tick(&mut printer, &mut state, &mut inventory).await {
                    warn!(error = %e, "endless-spool tick failed");
                }
            }
            line = lines.next_line() => {
                match line? {
                    None => {
                        info!("stdin closed, shutting down");
                        return Ok(());
                    }
                    Some(line) if line.trim().is_empty() => continue,
                    Some(line) => match parse_line(&line) {
                        None => warn!(line, "could not parse command line"),
                        Some((command, args)) => {
                            match surface.dispatch(&command, &args, &mut printer, &mut state, &mut inventory).await {
                                Ok(body) => println!("{body}"),
                                Err(e) => {
                                    warn!(command = %command, error = %e, "command failed");
                                    println!("{}", serde_json::json!({ "error": e.to_string() }));
                                }
                            }
                        }
                    },
                }
            }
        }
    }
}
