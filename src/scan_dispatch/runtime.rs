use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use log::{debug, warn};
use serde::Deserialize;
use tokio::process::Command;

use crate::error_handling::types::DispatchError;

/// Runtime through which the scanning tools are launched, and which owns the
/// named execution contexts (environments) they run in.
#[async_trait]
pub trait ToolRuntime: Send + Sync {
    /// Executable that prefixes every scan command.
    fn launcher(&self) -> &str;

    /// Whether the runtime can be invoked at all.
    async fn is_available(&self) -> bool;

    /// Names of the execution contexts, reserved defaults excluded.
    async fn list_environments(&self) -> Result<Vec<String>, DispatchError>;
}

/// Conda based runtime: tools run through `conda run -n <env>`.
#[derive(Debug, Clone)]
pub struct CondaRuntime {
    binary: String,
    reserved: Vec<String>,
}

impl CondaRuntime {
    pub fn new<S: Into<String>>(binary: S, reserved: Vec<String>) -> Self {
        Self {
            binary: binary.into(),
            reserved,
        }
    }
}

#[async_trait]
impl ToolRuntime for CondaRuntime {
    fn launcher(&self) -> &str {
        &self.binary
    }

    async fn is_available(&self) -> bool {
        let available = Command::new(&self.binary)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false);
        debug!("{} availability check: {}", self.binary, available);
        available
    }

    async fn list_environments(&self) -> Result<Vec<String>, DispatchError> {
        let output = Command::new(&self.binary)
            .args(["env", "list", "--json"])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                warn!("Failed to run {} env list: {}", self.binary, e);
                DispatchError::ToolUnavailable(format!("{}: {}", self.binary, e))
            })?;
        if !output.status.success() {
            return Err(DispatchError::ToolUnavailable(format!(
                "{} env list exited with {}",
                self.binary, output.status
            )));
        }
        parse_environment_list(&String::from_utf8_lossy(&output.stdout), &self.reserved)
    }
}

#[derive(Deserialize)]
struct EnvironmentList {
    #[serde(default)]
    envs: Vec<String>,
}

/// Extracts environment names from `conda env list --json` output.
///
/// Each entry is an environment prefix path; its last component is the name.
pub fn parse_environment_list(
    json: &str,
    reserved: &[String],
) -> Result<Vec<String>, DispatchError> {
    let list: EnvironmentList = serde_json::from_str(json).map_err(|e| {
        DispatchError::ToolUnavailable(format!("unreadable environment list: {}", e))
    })?;
    Ok(list
        .envs
        .iter()
        .filter_map(|prefix| Path::new(prefix).file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !reserved.iter().any(|r| r == name))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reserved() -> Vec<String> {
        vec!["base".into(), "root".into()]
    }

    #[test]
    fn environment_names_come_from_prefix_paths() {
        let json = r#"{"envs": ["/opt/conda/envs/base", "/opt/conda/envs/garak_env", "/home/u/envs/sec_env"]}"#;
        let names = parse_environment_list(json, &reserved()).unwrap();
        assert_eq!(names, vec!["garak_env", "sec_env"]);
    }

    #[test]
    fn missing_envs_key_yields_empty_list() {
        assert!(parse_environment_list("{}", &reserved()).unwrap().is_empty());
    }

    #[test]
    fn malformed_output_is_a_tool_error() {
        assert!(matches!(
            parse_environment_list("not json", &reserved()),
            Err(DispatchError::ToolUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn missing_binary_is_unavailable() {
        let runtime = CondaRuntime::new("/nonexistent/conda-binary", reserved());
        assert!(!runtime.is_available().await);
        assert!(matches!(
            runtime.list_environments().await,
            Err(DispatchError::ToolUnavailable(_))
        ));
    }
}
