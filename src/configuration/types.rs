use serde::Deserialize;
use std::path::PathBuf;

use crate::storage::DatabaseStore;

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8005
}

fn default_database_path() -> PathBuf {
    PathBuf::from(DatabaseStore::DEFAULT_DB_FILE)
}

fn default_conda_binary() -> String {
    "conda".to_string()
}

fn default_ollama_binary() -> String {
    "ollama".to_string()
}

fn default_reserved_environments() -> Vec<String> {
    vec!["base".to_string(), "root".to_string()]
}

fn default_max_concurrent_scans() -> usize {
    4
}

fn default_termination_grace_secs() -> u64 {
    5
}

/// `[server]` section: where the HTTP API listens.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

/// `[storage]` section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// `[scanner]` section: external binaries and scan execution limits.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScannerConfig {
    #[serde(default = "default_conda_binary")]
    pub conda_binary: String,
    #[serde(default = "default_ollama_binary")]
    pub ollama_binary: String,
    /// Environment names never offered to clients.
    #[serde(default = "default_reserved_environments")]
    pub reserved_environments: Vec<String>,
    #[serde(default = "default_max_concurrent_scans")]
    pub max_concurrent_scans: usize,
    /// Seconds between SIGTERM and SIGKILL when a scan is stopped.
    #[serde(default = "default_termination_grace_secs")]
    pub termination_grace_secs: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            conda_binary: default_conda_binary(),
            ollama_binary: default_ollama_binary(),
            reserved_environments: default_reserved_environments(),
            max_concurrent_scans: default_max_concurrent_scans(),
            termination_grace_secs: default_termination_grace_secs(),
        }
    }
}
