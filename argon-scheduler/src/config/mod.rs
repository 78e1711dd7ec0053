use std::{fs, path::Path};

use argon_common::error::Error;
use tracing::info;

pub mod parser;
pub mod schema;

pub use parser::parse_yaml;
pub use schema::SchedulerConfig;

/// Environment variable naming the config file when `--config` is not given
pub const CONFIG_ENV_VAR: &str = "ARGON_CONFIG";

/// Loads the config file at `path`, or the defaults if there is none.
pub fn load_config(path: Option<&Path>) -> Result<SchedulerConfig, Error> {
    let Some(path) = path else {
        info!("Config: No config file given, using defaults");
        return Ok(SchedulerConfig::default());
    };

    let contents = fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "Failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;

    info!("Config: Loaded {}", path.display());

    parse_yaml(&contents)
}
