use super::types::*;
use crate::error_handling::types::ConfigError;
use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Command-line arguments.
///
/// Every flag can also be given through a `SCANRELAY_*` environment variable.
/// Values given here take precedence over the configuration file.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "scanrelay", about = "LLM vulnerability scan orchestrator")]
pub struct Args {
    /// Path to a TOML configuration file
    ///
    /// # Command Line
    /// Use `--config <FILE>` to set this value from the CLI
    #[arg(long, env = "SCANRELAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address the HTTP API binds to
    #[arg(long, env = "SCANRELAY_BIND_ADDRESS")]
    pub bind_address: Option<String>,

    /// Port the HTTP API listens on
    #[arg(long, env = "SCANRELAY_PORT")]
    pub port: Option<u16>,

    /// SQLite database holding scan sessions
    #[arg(long, env = "SCANRELAY_DATABASE_PATH")]
    pub database_path: Option<PathBuf>,

    /// Upper bound on scans running at the same time
    ///
    /// Attaching to a session beyond this limit is refused and the session
    /// stays pending.
    #[arg(long, env = "SCANRELAY_MAX_CONCURRENT_SCANS")]
    pub max_concurrent_scans: Option<usize>,
}

/// Application configuration.
///
/// # Fields Overview
///
/// - `server`: bind address and port of the HTTP API
/// - `storage`: location of the session database
/// - `scanner`: external binaries, reserved environments and execution limits
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub scanner: ScannerConfig,
}

impl Config {
    /// Builds the effective configuration: file (or defaults), then CLI
    /// overrides, then validation.
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let mut config = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(args);
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::TomlError(e.to_string()))
    }

    fn apply_overrides(&mut self, args: &Args) {
        if let Some(bind_address) = &args.bind_address {
            self.server.bind_address = bind_address.clone();
        }
        if let Some(port) = args.port {
            self.server.port = port;
        }
        if let Some(path) = &args.database_path {
            self.storage.database_path = path.clone();
        }
        if let Some(max) = args.max_concurrent_scans {
            self.scanner.max_concurrent_scans = max;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.bind_address.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "server.bind_address must not be empty".to_string(),
            ));
        }
        if self.server.port == 0 {
            return Err(ConfigError::NotInRange(
                "server.port must be between 1 and 65535".to_string(),
            ));
        }
        if self.scanner.max_concurrent_scans == 0 {
            return Err(ConfigError::NotInRange(
                "scanner.max_concurrent_scans must be at least 1".to_string(),
            ));
        }
        if self.scanner.conda_binary.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "scanner.conda_binary must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn termination_grace(&self) -> Duration {
        Duration::from_secs(self.scanner.termination_grace_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert_eq!(config.server.port, 8005);
        assert_eq!(
            config.storage.database_path,
            PathBuf::from("vulnerability_scanner.db")
        );
        assert_eq!(config.scanner.reserved_environments, vec!["base", "root"]);
        assert_eq!(config.scanner.max_concurrent_scans, 4);
        assert_eq!(config.termination_grace(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let config = Config::from_toml_str(
            r#"
            [server]
            port = 9000

            [scanner]
            conda_binary = "/opt/conda/bin/conda"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert_eq!(config.scanner.conda_binary, "/opt/conda/bin/conda");
        assert_eq!(config.scanner.ollama_binary, "ollama");
        assert_eq!(config.storage, StorageConfig::default());
    }

    #[test]
    fn malformed_toml_is_reported() {
        assert!(matches!(
            Config::from_toml_str("[server\nport = 1"),
            Err(ConfigError::TomlError(_))
        ));
        assert!(matches!(
            Config::from_toml_str("[server]\nport = \"high\""),
            Err(ConfigError::TomlError(_))
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        assert!(matches!(
            Config::from_file("/nonexistent/scanrelay.toml"),
            Err(ConfigError::IoError(_))
        ));
    }

    #[test]
    fn cli_overrides_file_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nport = 9000\nbind_address = \"127.0.0.1\"").unwrap();

        let args = Args::try_parse_from([
            "scanrelay",
            "--config",
            file.path().to_str().unwrap(),
            "--port",
            "9100",
            "--max-concurrent-scans",
            "2",
        ])
        .unwrap();
        let config = Config::load(&args).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.bind_address, "127.0.0.1");
        assert_eq!(config.scanner.max_concurrent_scans, 2);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let args = Args {
            max_concurrent_scans: Some(0),
            ..Default::default()
        };
        assert!(matches!(Config::load(&args), Err(ConfigError::NotInRange(_))));

        let mut config = Config::default();
        config.server.port = 0;
        assert!(matches!(config.validate(), Err(ConfigError::NotInRange(_))));

        let mut config = Config::default();
        config.server.bind_address = " ".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));
    }
}
