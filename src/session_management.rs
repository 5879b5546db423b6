//! Session management core module.
//!
//! This module provides the core types and submodules for managing scan
//! sessions: the session record itself, the status state machine, the
//! registry of attached observer channels and the lifecycle orchestrator.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Submodule tracking which session currently has an observer attached.
pub mod channel_registry;
/// Submodule driving a session from `Pending` to a terminal status.
pub mod lifecycle;
/// Submodule for session data structures and creation requests.
pub mod session;

pub use channel_registry::{ActiveChannelGuard, ChannelRegistry};
pub use lifecycle::SessionLifecycle;
pub use session::{ScanRequest, ScanSession};

/// Represents the current status of a session.
///
/// Variants:
/// - `Pending`: The session was created and waits for an observer.
/// - `Running`: The scan has been dispatched.
/// - `Completed`: The scan process exited with code 0.
/// - `Failed`: Preflight, execution, transport or cancellation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }

    /// Transitions only move forward: Pending -> Running -> Completed | Failed.
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        matches!(
            (self, next),
            (SessionStatus::Pending, SessionStatus::Running)
                | (SessionStatus::Running, SessionStatus::Completed)
                | (SessionStatus::Running, SessionStatus::Failed)
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SessionStatus::Pending),
            "running" => Ok(SessionStatus::Running),
            "completed" => Ok(SessionStatus::Completed),
            "failed" => Ok(SessionStatus::Failed),
            other => Err(format!("unknown session status '{}'", other)),
        }
    }
}

/// External scanning program a session runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    /// Probe-based scanner; requires a non-empty probe list.
    Garak,
    /// Directory-based scanner; requires a working directory.
    Promptmap,
}

impl ToolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::Garak => "garak",
            ToolKind::Promptmap => "promptmap",
        }
    }

    /// Human readable name used in observer messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            ToolKind::Garak => "Garak",
            ToolKind::Promptmap => "Promptmap",
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "garak" => Ok(ToolKind::Garak),
            "promptmap" => Ok(ToolKind::Promptmap),
            other => Err(other.to_string()),
        }
    }
}
