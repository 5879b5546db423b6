use std::fmt;
use std::path::PathBuf;

use uuid::Uuid;

use crate::session_management::SessionStatus;

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    NotInRange(String),
    InvalidValue(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::NotInRange(e) => write!(f, "Value out of range: {}", e),
            ConfigError::InvalidValue(e) => write!(f, "Invalid value: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

/// Rejections of a scan creation request. Nothing is persisted when one of
/// these is returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    EmptyEnvironment,
    EmptyModelName,
    UnknownTool(String),
    MissingProbes,
    MissingWorkingDirectory,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyEnvironment => write!(f, "Environment is required"),
            ValidationError::EmptyModelName => write!(f, "Model name is required"),
            ValidationError::UnknownTool(t) => write!(f, "Unknown tool: {}", t),
            ValidationError::MissingProbes => {
                write!(f, "At least one probe is required for Garak")
            }
            ValidationError::MissingWorkingDirectory => {
                write!(f, "A working directory is required for Promptmap")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Preflight failures detected before any process is spawned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    ToolUnavailable(String),
    EnvironmentNotFound(String),
    MissingRequiredArgument(String),
    WorkingDirectoryNotFound(PathBuf),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::ToolUnavailable(e) => write!(f, "Tool runtime not available: {}", e),
            DispatchError::EnvironmentNotFound(env) => {
                write!(f, "Environment '{}' not found", env)
            }
            DispatchError::MissingRequiredArgument(arg) => {
                write!(f, "Missing required argument: {}", arg)
            }
            DispatchError::WorkingDirectoryNotFound(dir) => {
                write!(f, "Working directory '{}' does not exist", dir.display())
            }
        }
    }
}

impl std::error::Error for DispatchError {}

#[derive(Debug)]
pub enum StreamError {
    Spawn(std::io::Error),
    Read(std::io::Error),
    Wait(std::io::Error),
    MissingPipe(&'static str),
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::Spawn(e) => write!(f, "Failed to start scan process: {}", e),
            StreamError::Read(e) => write!(f, "Failed to read scan output: {}", e),
            StreamError::Wait(e) => write!(f, "Failed to wait for scan process: {}", e),
            StreamError::MissingPipe(p) => write!(f, "Scan process has no {} pipe", p),
        }
    }
}

impl std::error::Error for StreamError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    Closed,
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelError::Closed => write!(f, "Channel closed by observer"),
        }
    }
}

impl std::error::Error for ChannelError {}

#[derive(Debug)]
pub enum StorageError {
    ConnectionFailed(String),
    WriteFailed(String),
    ReadFailed(String),
    DuplicateId(Uuid),
    NotFound(Uuid),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::ConnectionFailed(e) => write!(f, "Storage connection failed: {}", e),
            StorageError::WriteFailed(e) => write!(f, "Storage write failed: {}", e),
            StorageError::ReadFailed(e) => write!(f, "Storage read failed: {}", e),
            StorageError::DuplicateId(id) => write!(f, "Session {} already exists", id),
            StorageError::NotFound(id) => write!(f, "Session {} not found", id),
        }
    }
}

impl std::error::Error for StorageError {}

#[derive(Debug)]
pub enum SessionError {
    Validation(ValidationError),
    StorageError(StorageError),
    NotFound(Uuid),
    NotRunning(Uuid),
    CapacityReached(usize),
    InvalidTransition {
        from: SessionStatus,
        to: SessionStatus,
    },
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Validation(e) => write!(f, "{}", e),
            SessionError::StorageError(e) => write!(f, "Storage error: {}", e),
            SessionError::NotFound(id) => write!(f, "Session {} not found", id),
            SessionError::NotRunning(id) => write!(f, "Session {} is not running", id),
            SessionError::CapacityReached(max) => {
                write!(f, "Scan capacity reached ({} concurrent scans)", max)
            }
            SessionError::InvalidTransition { from, to } => {
                write!(f, "Invalid status transition from {} to {}", from, to)
            }
        }
    }
}

impl std::error::Error for SessionError {}

impl From<ValidationError> for SessionError {
    fn from(err: ValidationError) -> Self {
        SessionError::Validation(err)
    }
}

impl From<StorageError> for SessionError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(id) => SessionError::NotFound(id),
            other => SessionError::StorageError(other),
        }
    }
}

#[derive(Debug)]
pub enum WebError {
    InvalidBindAddress(String),
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebError::InvalidBindAddress(e) => write!(f, "Invalid bind address: {}", e),
        }
    }
}

impl std::error::Error for WebError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_messages_are_user_facing() {
        assert_eq!(
            ValidationError::EmptyEnvironment.to_string(),
            "Environment is required"
        );
        assert_eq!(
            ValidationError::UnknownTool("nmap".into()).to_string(),
            "Unknown tool: nmap"
        );
    }

    #[test]
    fn environment_not_found_names_the_environment() {
        let err = DispatchError::EnvironmentNotFound("ghost_env".into());
        assert!(err.to_string().contains("ghost_env"));
    }

    #[test]
    fn storage_not_found_maps_to_session_not_found() {
        let id = Uuid::new_v4();
        match SessionError::from(StorageError::NotFound(id)) {
            SessionError::NotFound(found) => assert_eq!(found, id),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
