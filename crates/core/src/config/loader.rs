use std::path::Path;

use figment::providers::{Env, Format, Toml};
use figment::Figment;

use super::{types::Config, ConfigError};

/// Prefix for environment overrides. Nested keys are separated by `__`, so
/// `FILMROOM_TRACKER__POLL_INTERVAL_SECS=5` sets `tracker.poll_interval_secs`.
pub const ENV_PREFIX: &str = "FILMROOM_";

/// Read the TOML file at `path`, then layer `FILMROOM_*` environment
/// variables on top.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    Figment::from(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Parse a TOML document with no environment overrides.
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}
