use crate::domain::LogLevel;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Sanitize NDJSON telemetry events and deliver them to a collector.
#[derive(Parser, Debug, Clone)]
#[command(name = "rask-telemetry-client", version, about)]
pub struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "RASK_TELEMETRY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Collector endpoint; overrides the config file and environment
    #[arg(short, long)]
    pub endpoint: Option<String>,

    /// NDJSON input file; stdin when omitted
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Directory for the persistent offline queue
    #[arg(long)]
    pub offline_path: Option<PathBuf>,

    /// Replace detected secrets with the redaction text instead of masking
    #[arg(long)]
    pub strict: bool,

    #[arg(long, env = "RASK_TELEMETRY_LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    #[arg(long, env = "RASK_TELEMETRY_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_overrides() {
        let cli = Cli::try_parse_from([
            "rask-telemetry-client",
            "--endpoint",
            "https://collector.example.com/ingest",
            "--input",
            "events.ndjson",
            "--strict",
            "--log-level",
            "warning",
            "--log-format",
            "json",
        ])
        .unwrap();

        assert_eq!(cli.endpoint.as_deref(), Some("https://collector.example.com/ingest"));
        assert_eq!(cli.input, Some(PathBuf::from("events.ndjson")));
        assert!(cli.strict);
        assert_eq!(cli.log_level, LogLevel::Warn);
        assert_eq!(cli.log_format, LogFormat::Json);
    }

    #[test]
    fn rejects_unknown_level() {
        assert!(Cli::try_parse_from(["rask-telemetry-client", "--log-level", "loud"]).is_err());
    }
}
