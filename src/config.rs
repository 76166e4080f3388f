//! Configuration module for speedtest-server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Command-line interface
#[derive(Parser, Debug)]
#[command(name = "speedtest-server")]
#[command(author = "speedtest-server authors")]
#[command(about = "HTTP bandwidth test server (download and upload)", long_about = None)]
#[command(disable_help_subcommand = true)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the server (default)
    #[command(alias = "s")]
    Start(StartArgs),
    /// Print the server version
    #[command(alias = "v")]
    Version,
    /// Print this help
    #[command(alias = "h")]
    Help,
}

/// Arguments for the `start` command
#[derive(Args, Debug, Default)]
pub struct StartArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Host to bind to; `::` listens on IPv6 and IPv4
    #[arg(long)]
    pub host: Option<String>,

    /// TCP port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Listen on a Unix domain socket at this path instead of TCP
    #[arg(short, long)]
    pub unix: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listener configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Unix socket path; selects the unix family when set
    pub unix: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            unix: None,
        }
    }
}

/// Request limits
#[derive(Debug, Deserialize)]
pub struct LimitsConfig {
    /// Maximum size of the request head in bytes
    #[serde(default = "default_max_header_size")]
    pub max_header_size: usize,
    /// Maximum accepted upload body in bytes
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: u64,
    /// Seconds allowed to receive the request head
    #[serde(default = "default_header_timeout")]
    pub header_timeout: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_header_size: default_max_header_size(),
            max_upload_size: default_max_upload_size(),
            header_timeout: default_header_timeout(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "::".to_string()
}

fn default_port() -> u16 {
    14000
}

fn default_max_header_size() -> usize {
    8 * 1024
}

fn default_max_upload_size() -> u64 {
    500 * 1024 * 1024 // largest `size` option
}

fn default_header_timeout() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Where the server listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Listen {
    Tcp { host: String, port: u16 },
    Unix(PathBuf),
}

impl fmt::Display for Listen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Listen::Tcp { host, port } if host.contains(':') => write!(f, "[{}]:{}", host, port),
            Listen::Tcp { host, port } => write!(f, "{}:{}", host, port),
            Listen::Unix(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Per-connection limits handed to the request handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    pub max_header_size: usize,
    pub max_upload_size: u64,
    pub header_timeout: Duration,
}

impl Default for Limits {
    fn default() -> Self {
        LimitsConfig::default().into()
    }
}

impl From<LimitsConfig> for Limits {
    fn from(config: LimitsConfig) -> Self {
        Limits {
            max_header_size: config.max_header_size,
            max_upload_size: config.max_upload_size,
            header_timeout: Duration::from_secs(config.header_timeout),
        }
    }
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: Listen,
    pub limits: Limits,
    pub log_level: String,
}

impl Config {
    /// Load configuration from `start` arguments and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load(cli: StartArgs) -> Result<Self, ConfigError> {
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Ok(Self::merge(cli, toml_config))
    }

    fn merge(cli: StartArgs, toml_config: TomlConfig) -> Self {
        let listen = match cli.unix.or(toml_config.server.unix) {
            Some(path) => Listen::Unix(path),
            None => Listen::Tcp {
                host: cli.host.unwrap_or(toml_config.server.host),
                port: cli.port.unwrap_or(toml_config.server.port),
            },
        };

        Config {
            listen,
            limits: toml_config.limits.into(),
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        }
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::merge(StartArgs::default(), TomlConfig::default());
        assert_eq!(
            config.listen,
            Listen::Tcp {
                host: "::".to_string(),
                port: 14000
            }
        );
        assert_eq!(config.limits, Limits::default());
        assert_eq!(config.limits.max_upload_size, 500 * 1024 * 1024);
        assert_eq!(config.limits.header_timeout, Duration::from_secs(10));
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            host = "127.0.0.1"
            port = 8080

            [limits]
            max_header_size = 4096
            header_timeout = 3

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.unix, None);
        assert_eq!(config.limits.max_header_size, 4096);
        assert_eq!(config.limits.max_upload_size, 500 * 1024 * 1024);
        assert_eq!(config.limits.header_timeout, 3);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_cli_overrides_file() {
        let file: TomlConfig = toml::from_str(
            r#"
            [server]
            host = "0.0.0.0"
            port = 9000

            [logging]
            level = "warn"
            "#,
        )
        .unwrap();

        let cli = StartArgs {
            port: Some(9100),
            log_level: Some("trace".to_string()),
            ..StartArgs::default()
        };

        let config = Config::merge(cli, file);
        assert_eq!(
            config.listen,
            Listen::Tcp {
                host: "0.0.0.0".to_string(),
                port: 9100
            }
        );
        assert_eq!(config.log_level, "trace");
    }

    #[test]
    fn test_unix_socket_selected() {
        let file: TomlConfig = toml::from_str("[server]\nunix = \"/tmp/speed.sock\"\n").unwrap();
        let config = Config::merge(StartArgs::default(), file);
        assert_eq!(config.listen, Listen::Unix(PathBuf::from("/tmp/speed.sock")));
    }

    #[test]
    fn test_listen_display() {
        let v6 = Listen::Tcp {
            host: "::".to_string(),
            port: 14000,
        };
        let v4 = Listen::Tcp {
            host: "127.0.0.1".to_string(),
            port: 80,
        };
        assert_eq!(v6.to_string(), "[::]:14000");
        assert_eq!(v4.to_string(), "127.0.0.1:80");
        assert_eq!(Listen::Unix("/run/s.sock".into()).to_string(), "/run/s.sock");
    }

    #[test]
    fn test_cli_subcommands() {
        let cli = CliArgs::try_parse_from(["speedtest-server", "s", "-p", "8080", "--host", "::1"])
            .unwrap();
        match cli.command {
            Some(Command::Start(args)) => {
                assert_eq!(args.port, Some(8080));
                assert_eq!(args.host.as_deref(), Some("::1"));
            }
            other => panic!("unexpected: {:?}", other),
        }

        let cli = CliArgs::try_parse_from(["speedtest-server", "v"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Version)));

        let cli = CliArgs::try_parse_from(["speedtest-server"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_missing_file() {
        let cli = StartArgs {
            config: Some(PathBuf::from("/nonexistent/speedtest.toml")),
            ..StartArgs::default()
        };
        assert!(matches!(Config::load(cli), Err(ConfigError::FileRead(..))));
    }
}
