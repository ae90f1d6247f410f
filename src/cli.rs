use std::path::PathBuf;

use clap::Parser;

use crate::config::LogFormat;

#[derive(Debug, Parser)]
#[command(name = "pinrelay", version, about = "Reaction-driven pin forwarder for Discord")]
pub struct Args {
    /// Path to the YAML configuration file.
    #[arg(short, long, env = "CONFIG_PATH", default_value = "config.yaml")]
    pub config: PathBuf,

    /// Overrides `logging.format` from the config file.
    #[arg(long, value_parser = parse_log_format)]
    pub log_format: Option<LogFormat>,
}

fn parse_log_format(value: &str) -> Result<LogFormat, String> {
    match value.to_ascii_lowercase().as_str() {
        "pretty" => Ok(LogFormat::Pretty),
        "json" => Ok(LogFormat::Json),
        other => Err(format!("unknown log format '{other}', expected pretty or json")),
    }
}
