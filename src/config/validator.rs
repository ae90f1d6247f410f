use thiserror::Error;

use super::parser::{Config, IdentityStrategy, MAX_MERGE_WINDOW_SECS};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

const MAX_FILES_PER_MESSAGE: usize = 10;

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.token_is_empty() {
            return Err(ConfigError::InvalidConfig(
                "auth.bot_token cannot be empty".to_string(),
            ));
        }

        if self.database.connection_string().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "database connection string cannot be empty".to_string(),
            ));
        }

        if self.guild_defaults.threshold == 0 {
            return Err(ConfigError::InvalidConfig(
                "guild_defaults.threshold must be at least 1".to_string(),
            ));
        }

        if self.pins.max_files_per_message == 0
            || self.pins.max_files_per_message > MAX_FILES_PER_MESSAGE
        {
            return Err(ConfigError::InvalidConfig(format!(
                "pins.max_files_per_message must be between 1 and {MAX_FILES_PER_MESSAGE}"
            )));
        }

        if self.pins.max_links_per_message == 0 {
            return Err(ConfigError::InvalidConfig(
                "pins.max_links_per_message must be at least 1".to_string(),
            ));
        }

        if self.pins.identity_strategy == IdentityStrategy::Rotate
            && self.pins.merge_window_secs == 0
        {
            return Err(ConfigError::InvalidConfig(
                "pins.merge_window_secs must be positive with the rotate strategy".to_string(),
            ));
        }

        if self.pins.merge_window_secs > MAX_MERGE_WINDOW_SECS {
            return Err(ConfigError::InvalidConfig(format!(
                "pins.merge_window_secs cannot exceed {MAX_MERGE_WINDOW_SECS}"
            )));
        }

        if self.pins.identity_name.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "pins.identity_name cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}
