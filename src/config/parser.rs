use super::ConfigError;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub pins: PinsConfig,
    #[serde(default)]
    pub guild_defaults: GuildDefaults,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub bot_token: SecretString,
    #[serde(default = "default_use_privileged_intents")]
    pub use_privileged_intents: bool,
}

impl AuthConfig {
    pub fn token(&self) -> &str {
        self.bot_token.expose_secret()
    }

    pub fn token_is_empty(&self) -> bool {
        self.bot_token.expose_secret().trim().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(alias = "console", default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub max_connections: Option<u32>,
    #[serde(default)]
    pub min_connections: Option<u32>,
}

impl DatabaseConfig {
    pub fn db_type(&self) -> DbType {
        let url = self.connection_string();
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            DbType::Postgres
        } else {
            DbType::Sqlite
        }
    }

    pub fn connection_string(&self) -> String {
        if let Some(ref url) = self.url {
            url.clone()
        } else if let Some(ref file) = self.filename {
            format!("sqlite://{}", file)
        } else {
            String::new()
        }
    }

    pub fn sqlite_path(&self) -> Option<String> {
        if let DbType::Sqlite = self.db_type() {
            let url = self.connection_string();
            Some(url.strip_prefix("sqlite://").unwrap_or(&url).to_string())
        } else {
            None
        }
    }

    pub fn max_connections(&self) -> Option<u32> {
        match self.db_type() {
            DbType::Postgres => self.max_connections,
            DbType::Sqlite => Some(1),
        }
    }

    pub fn min_connections(&self) -> Option<u32> {
        match self.db_type() {
            DbType::Postgres => self.min_connections,
            DbType::Sqlite => Some(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbType {
    Postgres,
    Sqlite,
}

/// How the posting identity is chosen for each replication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityStrategy {
    /// One identity per guild, recreated when reused inside the merge window.
    #[default]
    Rotate,
    /// Two identities per guild, used in strict alternation.
    Alternate,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PinsConfig {
    #[serde(default)]
    pub identity_strategy: IdentityStrategy,
    #[serde(default = "default_identity_name")]
    pub identity_name: String,
    #[serde(default = "default_merge_window_secs")]
    pub merge_window_secs: u64,
    #[serde(default = "default_max_files_per_message")]
    pub max_files_per_message: usize,
    #[serde(default = "default_max_links_per_message")]
    pub max_links_per_message: usize,
    #[serde(default = "default_true")]
    pub jump_footer: bool,
    #[serde(default = "default_true")]
    pub native_pins: bool,
    #[serde(default = "default_true")]
    pub ignore_bots: bool,
}

impl Default for PinsConfig {
    fn default() -> Self {
        Self {
            identity_strategy: IdentityStrategy::default(),
            identity_name: default_identity_name(),
            merge_window_secs: default_merge_window_secs(),
            max_files_per_message: default_max_files_per_message(),
            max_links_per_message: default_max_links_per_message(),
            jump_footer: true,
            native_pins: true,
            ignore_bots: true,
        }
    }
}

/// One week. Longer windows would keep a single identity forever anyway.
pub(crate) const MAX_MERGE_WINDOW_SECS: u64 = 7 * 24 * 60 * 60;

impl PinsConfig {
    pub fn merge_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.merge_window_secs.min(MAX_MERGE_WINDOW_SECS) as i64)
    }
}

/// Settings applied to a guild the first time it is seen.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GuildDefaults {
    #[serde(default = "default_threshold")]
    pub threshold: u32,
    #[serde(default)]
    pub nsfw: bool,
    #[serde(default)]
    pub selfpin: bool,
    /// Send the author a direct message with a link to the copy.
    #[serde(default = "default_true")]
    pub dm: bool,
    #[serde(default = "default_reply_depth")]
    pub reply_depth: u32,
    #[serde(default)]
    pub allowlist: Vec<String>,
}

impl Default for GuildDefaults {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            nsfw: false,
            selfpin: false,
            dm: true,
            reply_depth: default_reply_depth(),
            allowlist: Vec::new(),
        }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::load_from_str(&content)
    }

    pub fn load_from_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config = serde_yaml::from_str(content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("PINRELAY_AUTH_BOT_TOKEN") {
            self.auth.bot_token = SecretString::new(value);
        }
        if let Ok(value) = std::env::var("PINRELAY_DATABASE_URL") {
            self.database.url = Some(value);
        }
        if let Ok(value) = std::env::var("PINRELAY_LOG_LEVEL") {
            self.logging.level = value;
        }
    }
}

fn default_use_privileged_intents() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_identity_name() -> String {
    "pinrelay".to_string()
}

fn default_merge_window_secs() -> u64 {
    600
}

fn default_max_files_per_message() -> usize {
    10
}

fn default_max_links_per_message() -> usize {
    5
}

fn default_true() -> bool {
    true
}

fn default_threshold() -> u32 {
    3
}

fn default_reply_depth() -> u32 {
    1
}
