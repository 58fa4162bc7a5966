//! Configuration module for the printable-count server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::Parser;
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Command-line arguments for the server
#[derive(Parser, Debug)]
#[command(name = "pcc-server")]
#[command(version)]
#[command(about = "Counts printable characters sent by clients", long_about = None)]
pub struct CliArgs {
    /// Port to listen on
    pub port: u16,

    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 0.0.0.0 or ::1)
    #[arg(long)]
    pub host: Option<String>,

    /// Listen queue size
    #[arg(long)]
    pub backlog: Option<i32>,

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
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Listen queue size
    #[serde(default = "default_backlog")]
    pub backlog: i32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            backlog: default_backlog(),
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
    "0.0.0.0".to_string()
}

fn default_backlog() -> i32 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: SocketAddr,
    pub backlog: i32,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    ///
    /// Argument errors make clap print usage and exit with a failure status.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(CliArgs::parse())
    }

    /// Resolve configuration from already-parsed arguments.
    pub fn from_args(cli: CliArgs) -> Result<Self, ConfigError> {
        let toml_config = match cli.config {
            Some(ref path) => Self::read_file(path)?,
            None => TomlConfig::default(),
        };

        let host = cli.host.unwrap_or(toml_config.server.host);
        let ip: IpAddr = host
            .parse()
            .map_err(|_| ConfigError::InvalidHost(host.clone()))?;

        let backlog = cli.backlog.unwrap_or(toml_config.server.backlog);
        if backlog <= 0 {
            return Err(ConfigError::InvalidBacklog(backlog));
        }

        Ok(Config {
            listen: SocketAddr::new(ip, cli.port),
            backlog,
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        })
    }

    fn read_file(path: &Path) -> Result<TomlConfig, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::TomlParse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {source}", .path.display())]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{}': {source}", .path.display())]
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Invalid bind address '{0}'")]
    InvalidHost(String),
    #[error("Invalid listen backlog {0}: must be positive")]
    InvalidBacklog(i32),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(std::iter::once("pcc-server").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = TomlConfig::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.backlog, 10);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            host = "127.0.0.1"
            backlog = 32

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.backlog, 32);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_port_only() {
        let config = Config::from_args(cli(&["7000"])).unwrap();
        assert_eq!(config.listen, "0.0.0.0:7000".parse().unwrap());
        assert_eq!(config.backlog, 10);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_cli_overrides() {
        let config = Config::from_args(cli(&[
            "7000",
            "--host",
            "::1",
            "--backlog",
            "64",
            "--log-level",
            "trace",
        ]))
        .unwrap();
        assert_eq!(config.listen, "[::1]:7000".parse().unwrap());
        assert_eq!(config.backlog, 64);
        assert_eq!(config.log_level, "trace");
    }

    #[test]
    fn test_port_is_required() {
        assert!(CliArgs::try_parse_from(["pcc-server"]).is_err());
    }

    #[test]
    fn test_port_must_fit_u16() {
        assert!(CliArgs::try_parse_from(["pcc-server", "70000"]).is_err());
        assert!(CliArgs::try_parse_from(["pcc-server", "http"]).is_err());
    }

    #[test]
    fn test_invalid_host() {
        let err = Config::from_args(cli(&["7000", "--host", "not-an-ip"])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidHost(_)));
    }

    #[test]
    fn test_invalid_backlog() {
        let err = Config::from_args(cli(&["7000", "--backlog", "0"])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBacklog(0)));
    }

    #[test]
    fn test_missing_config_file() {
        let err = Config::from_args(cli(&["7000", "-c", "/nonexistent/pcc.toml"])).unwrap_err();
        assert!(matches!(err, ConfigError::FileRead { .. }));
    }
}
