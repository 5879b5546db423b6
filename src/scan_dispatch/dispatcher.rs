use std::sync::Arc;

use chrono::{DateTime, Local};
use log::{debug, info, warn};

use crate::error_handling::types::DispatchError;
use crate::scan_dispatch::runtime::ToolRuntime;
use crate::scan_dispatch::types::ScanCommand;
use crate::session_management::{ScanSession, ToolKind};

/// Builds tool-specific invocations and runs the preflight checks that must
/// pass before any process is spawned.
///
/// Preflight order, cheapest first:
/// 1. required tool parameters are present (and the working directory exists),
/// 2. the runtime is reachable,
/// 3. the session's environment is one of the runtime's environments.
///
/// No process belonging to the scan exists until [`prepare`] has returned `Ok`.
///
/// [`prepare`]: ScanDispatcher::prepare
#[derive(Clone)]
pub struct ScanDispatcher {
    runtime: Arc<dyn ToolRuntime>,
}

impl ScanDispatcher {
    pub fn new(runtime: Arc<dyn ToolRuntime>) -> Self {
        Self { runtime }
    }

    pub fn runtime(&self) -> &Arc<dyn ToolRuntime> {
        &self.runtime
    }

    /// Runs the preflight checks for `session` and returns its command.
    pub async fn prepare(&self, session: &ScanSession) -> Result<ScanCommand, DispatchError> {
        Self::check_arguments(session)?;

        if !self.runtime.is_available().await {
            warn!("[{}] runtime {} unavailable", session.id, self.runtime.launcher());
            return Err(DispatchError::ToolUnavailable(format!(
                "'{}' could not be executed",
                self.runtime.launcher()
            )));
        }

        let environments = self.runtime.list_environments().await?;
        if !environments.iter().any(|env| env == &session.environment) {
            warn!(
                "[{}] environment {} not among {:?}",
                session.id, session.environment, environments
            );
            return Err(DispatchError::EnvironmentNotFound(
                session.environment.clone(),
            ));
        }

        let command = self.build_command(session, Local::now());
        info!("[{}] prepared command: {}", session.id, command.command_line());
        Ok(command)
    }

    fn check_arguments(session: &ScanSession) -> Result<(), DispatchError> {
        match session.tool {
            ToolKind::Garak if session.probes.is_empty() => Err(
                DispatchError::MissingRequiredArgument("probes".to_string()),
            ),
            ToolKind::Garak => Ok(()),
            ToolKind::Promptmap => match &session.working_directory {
                None => Err(DispatchError::MissingRequiredArgument(
                    "working_directory".to_string(),
                )),
                Some(dir) if !dir.is_dir() => {
                    Err(DispatchError::WorkingDirectoryNotFound(dir.clone()))
                }
                Some(_) => Ok(()),
            },
        }
    }

    /// Builds the invocation for `session`, without any checks.
    pub fn build_command(&self, session: &ScanSession, now: DateTime<Local>) -> ScanCommand {
        let prefix = report_prefix(session.tool, now, &session.short_id());
        let base = ScanCommand::new(self.runtime.launcher())
            .args(["run", "--no-capture-output", "-n"])
            .arg(session.environment.as_str())
            .args(["python", "-m", session.tool.as_str()])
            .env("PYTHONIOENCODING", "utf-8")
            .env("PYTHONUTF8", "1");

        let mut command = match session.tool {
            ToolKind::Garak => base
                .args(["--model_type", "ollama", "--model_name"])
                .arg(session.model_name.as_str())
                .arg("--probes")
                .arg(session.probes.join(","))
                .arg("--report_prefix")
                .arg(prefix.as_str()),
            ToolKind::Promptmap => {
                let command = base
                    .arg("--model")
                    .arg(session.model_name.as_str())
                    .arg("--output")
                    .arg(prefix.as_str());
                match &session.working_directory {
                    Some(dir) => command.current_dir(dir.clone()),
                    None => command,
                }
            }
        };
        command.output_reference = Some(prefix);
        debug!("[{}] built {} command", session.id, session.tool);
        command
    }
}

/// Artifact prefix unique per run: tool, local time to the second, and the
/// session's short id so that concurrent runs never collide.
pub fn report_prefix(tool: ToolKind, now: DateTime<Local>, short_id: &str) -> String {
    format!(
        "{}_scan_{}_{}",
        tool.as_str(),
        now.format("%Y%m%d_%H%M%S"),
        short_id
    )
}
