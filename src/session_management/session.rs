use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::error_handling::types::{SessionError, ValidationError};
use crate::session_management::{SessionStatus, ToolKind};

fn default_tool() -> String {
    ToolKind::Garak.as_str().to_string()
}

/// Body of `POST /api/scan`.
///
/// Fields are loose (`String` tool, defaulted fields) so that
/// malformed input reaches [`ScanSession::from_request`] and is reported as a
/// [`ValidationError`] instead of a body deserialization rejection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScanRequest {
    #[serde(default)]
    pub environment: String,
    #[serde(default)]
    pub model_name: String,
    #[serde(default)]
    pub probes: Vec<String>,
    #[serde(default = "default_tool")]
    pub tool: String,
    #[serde(default, alias = "promptmap_directory")]
    pub working_directory: Option<String>,
}

/// One requested execution of a scanning tool, tracked to a terminal outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSession {
    pub id: Uuid,
    pub environment: String,
    pub model_name: String,
    pub tool: ToolKind,
    pub probes: Vec<String>,
    pub working_directory: Option<PathBuf>,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub output_file: Option<String>,
}

impl ScanSession {
    /// Validates a creation request and builds a `Pending` session from it.
    pub fn from_request(request: ScanRequest) -> Result<Self, ValidationError> {
        let environment = request.environment.trim();
        if environment.is_empty() {
            return Err(ValidationError::EmptyEnvironment);
        }
        let model_name = request.model_name.trim();
        if model_name.is_empty() {
            return Err(ValidationError::EmptyModelName);
        }
        let tool: ToolKind = request.tool.parse().map_err(ValidationError::UnknownTool)?;

        let (probes, working_directory) = match tool {
            ToolKind::Garak => {
                let probes: Vec<String> = request
                    .probes
                    .iter()
                    .map(|p| p.trim())
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect();
                if probes.is_empty() {
                    return Err(ValidationError::MissingProbes);
                }
                (probes, None)
            }
            ToolKind::Promptmap => {
                let dir = request
                    .working_directory
                    .as_deref()
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .ok_or(ValidationError::MissingWorkingDirectory)?;
                (Vec::new(), Some(PathBuf::from(dir)))
            }
        };

        Ok(Self {
            id: Uuid::new_v4(),
            environment: environment.to_string(),
            model_name: model_name.to_string(),
            tool,
            probes,
            working_directory,
            status: SessionStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
            error_message: None,
            output_file: None,
        })
    }

    /// Moves the session to `to`, keeping `completed_at` and `error_message`
    /// consistent with the new status.
    ///
    /// `error_message` is only kept for `Failed`; a failure without a message
    /// gets a generic one so that the field is always present on failure.
    pub fn transition(
        &mut self,
        to: SessionStatus,
        error_message: Option<String>,
    ) -> Result<(), SessionError> {
        if !self.status.can_transition_to(to) {
            return Err(SessionError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.completed_at = to.is_terminal().then(Utc::now);
        self.error_message = match to {
            SessionStatus::Failed => {
                Some(error_message.unwrap_or_else(|| "Scan failed".to_string()))
            }
            _ => None,
        };
        Ok(())
    }

    /// First eight hex characters of the id, used in artifact names.
    pub fn short_id(&self) -> String {
        self.id.simple().to_string()[..8].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn garak_request() -> ScanRequest {
        ScanRequest {
            environment: "sec_env".into(),
            model_name: "llama3".into(),
            probes: vec!["test.Test".into()],
            tool: "garak".into(),
            working_directory: None,
        }
    }

    #[test]
    fn valid_garak_request_creates_pending_session() {
        let session = ScanSession::from_request(garak_request()).unwrap();
        assert_eq!(session.status, SessionStatus::Pending);
        assert_eq!(session.tool, ToolKind::Garak);
        assert_eq!(session.probes, vec!["test.Test".to_string()]);
        assert!(session.completed_at.is_none());
        assert!(session.error_message.is_none());
    }

    #[test]
    fn blank_environment_or_model_is_rejected() {
        let mut req = garak_request();
        req.environment = "   ".into();
        assert_eq!(
            ScanSession::from_request(req),
            Err(ValidationError::EmptyEnvironment)
        );

        let mut req = garak_request();
        req.model_name = String::new();
        assert_eq!(
            ScanSession::from_request(req),
            Err(ValidationError::EmptyModelName)
        );
    }

    #[test]
    fn garak_without_probes_is_rejected() {
        let mut req = garak_request();
        req.probes = vec![];
        assert_eq!(
            ScanSession::from_request(req),
            Err(ValidationError::MissingProbes)
        );

        let mut req = garak_request();
        req.probes = vec!["  ".into()];
        assert_eq!(
            ScanSession::from_request(req),
            Err(ValidationError::MissingProbes)
        );
    }

    #[test]
    fn promptmap_requires_working_directory() {
        let req = ScanRequest {
            tool: "promptmap".into(),
            probes: vec![],
            ..garak_request()
        };
        assert_eq!(
            ScanSession::from_request(req),
            Err(ValidationError::MissingWorkingDirectory)
        );
    }

    #[test]
    fn promptmap_ignores_probes() {
        let req = ScanRequest {
            tool: "promptmap".into(),
            working_directory: Some("/opt/promptmap".into()),
            ..garak_request()
        };
        let session = ScanSession::from_request(req).unwrap();
        assert!(session.probes.is_empty());
        assert_eq!(
            session.working_directory,
            Some(PathBuf::from("/opt/promptmap"))
        );
    }

    #[test]
    fn unknown_tool_is_rejected() {
        let req = ScanRequest {
            tool: "nmap".into(),
            ..garak_request()
        };
        assert_eq!(
            ScanSession::from_request(req),
            Err(ValidationError::UnknownTool("nmap".into()))
        );
    }

    #[test]
    fn request_accepts_promptmap_directory_alias() {
        let req: ScanRequest = serde_json::from_str(
            r#"{"environment":"e","model_name":"m","tool":"promptmap","promptmap_directory":"/tmp"}"#,
        )
        .unwrap();
        assert_eq!(req.working_directory.as_deref(), Some("/tmp"));
        assert!(req.probes.is_empty());
    }

    #[test]
    fn transitions_keep_terminal_fields_consistent() {
        let mut session = ScanSession::from_request(garak_request()).unwrap();

        session.transition(SessionStatus::Running, None).unwrap();
        assert!(session.completed_at.is_none());
        assert!(session.error_message.is_none());

        session
            .transition(SessionStatus::Failed, Some("boom".into()))
            .unwrap();
        assert!(session.completed_at.is_some());
        assert_eq!(session.error_message.as_deref(), Some("boom"));

        assert!(session.transition(SessionStatus::Running, None).is_err());
        assert_eq!(session.status, SessionStatus::Failed);
    }

    #[test]
    fn completed_session_has_no_error_message() {
        let mut session = ScanSession::from_request(garak_request()).unwrap();
        session.transition(SessionStatus::Running, None).unwrap();
        session
            .transition(SessionStatus::Completed, Some("ignored".into()))
            .unwrap();
        assert!(session.error_message.is_none());
        assert!(session.completed_at.is_some());
    }

    #[test]
    fn pending_cannot_skip_to_terminal() {
        let mut session = ScanSession::from_request(garak_request()).unwrap();
        assert!(session.transition(SessionStatus::Completed, None).is_err());
        assert_eq!(session.status, SessionStatus::Pending);
    }
}
