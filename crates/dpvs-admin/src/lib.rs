//! `dpvsadm`: operator front end for the DPVS engine.
//!
//! - **cli**: command line definition
//! - **config**: YAML configuration with search paths and validation
//! - **commands**: builds engine commands from the command line and runs them

pub mod cli;
pub mod commands;
pub mod config;

pub use cli::{AdminCommand, Cli};
pub use commands::{Action, build, dispatch, exit_code, run};
pub use config::{Config, ConfigError, LogFormat};
