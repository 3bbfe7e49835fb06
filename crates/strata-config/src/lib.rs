//! Configuration for the strata surface tools.
//!
//! Settings persist to disk as `config.ron` and can be overridden from the
//! command line. Every section falls back to its defaults field by field, so
//! older and newer config files both load.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{Config, DebugConfig, FogConfig, SurfaceConfig, ViewerConfig, default_config_dir};
pub use error::ConfigError;
