//! Configuration parsing, validation and live settings.

pub mod env;
pub mod parser;
pub mod settings;
pub mod types;
pub mod validate;

use std::path::Path;

use crate::common::error::ConfigError;

pub use parser::load_config;
pub use settings::{settings_channel, Settings, SettingsPublisher};
pub use types::*;

/// Load a config file, apply environment overrides, then validate it.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let config = env::apply_env_overrides(load_config(path)?);
    validate::validate_config(&config)?;
    Ok(config)
}
