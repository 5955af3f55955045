use super::{types::Config, ConfigError};

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.upload.max_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "upload.max_attempts must be at least 1".to_string(),
        ));
    }

    if config.tracker.poll_interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "tracker.poll_interval_secs cannot be 0".to_string(),
        ));
    }

    if config.tracker.max_processing_secs < config.tracker.poll_interval_secs {
        return Err(ConfigError::ValidationError(format!(
            "tracker.max_processing_secs ({}) is shorter than the poll interval ({})",
            config.tracker.max_processing_secs, config.tracker.poll_interval_secs
        )));
    }

    if config.storage.signing_secret.is_empty() {
        return Err(ConfigError::ValidationError(
            "storage.signing_secret cannot be empty".to_string(),
        ));
    }

    Ok(())
}
