//! Library half of `stagewatchd`.
//!
//! The binary is a thin shell over this crate: [`cli::Cli`] holds the
//! process options, [`config::DaemonConfig`] the configuration file,
//! [`handlers`] the built-in task handlers and [`daemon`] the wiring
//! between them and the scheduler.

pub mod cli;
pub mod cloud;
pub mod config;
pub mod daemon;
pub mod handlers;

pub use cli::Cli;
pub use config::{ConfigError, DaemonConfig, Settings};
