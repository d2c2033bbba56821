//! Process options.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Runs a configured workflow on a fixed schedule and alerts on new entities
#[derive(Debug, Clone, Parser)]
#[command(name = "stagewatchd")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Workflow configuration file (TOML, or JSON with a `.json` extension)
    #[arg(short, long, env = "CONFIG", default_value = "stagewatch.toml")]
    pub config: PathBuf,

    /// Enable debug logging
    #[arg(long, env = "DEBUG")]
    pub dbg: bool,

    /// Time between workflow runs, e.g. `30s`, `10m`, `1h`
    #[arg(long, env = "FREQUENCY", default_value = "10m", value_parser = humantime::parse_duration)]
    pub frequency: Duration,

    /// Database file for persisted change-detection state
    #[arg(short, long, env = "STORAGE_PATH", default_value = "/var/tmp/stagewatch.redb")]
    pub storage_path: PathBuf,

    /// Run the workflow once and exit
    #[arg(long)]
    pub once: bool,

    /// Keep state in memory only; `--storage-path` is ignored
    #[arg(long)]
    pub memory_store: bool,
}

impl Cli {
    /// Default log filter when `RUST_LOG` is unset.
    pub fn log_filter(&self) -> &'static str {
        if self.dbg {
            "debug"
        } else {
            "info"
        }
    }
}
