//! Configuration for the vault query server.
//!
//! Provides TOML-based configuration with:
//! - `[network]` storage endpoint, network name and context
//! - `[session]` cache expiry, sweep and release behaviour
//! - `[server]` identity advertised to protocol clients
//! - `[schemas]` additions and overrides for the schema registry
//! - Config file layering (user config dir + project-local + explicit file)

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    config_dir, config_path, load_config, load_config_file, load_config_with_options, log_dir,
    save_config, ConfigSource, LoadedConfig, CONFIG_DIR_ENV,
};
pub use error::{ConfigError, Result};
pub use types::*;
