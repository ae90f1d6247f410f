pub use self::parser::{
    AuthConfig, Config, DatabaseConfig, DbType, GuildDefaults, IdentityStrategy, LogFormat,
    LoggingConfig, PinsConfig,
};
pub use self::validator::ConfigError;

mod parser;
mod validator;
