use serde::Serialize;
use uuid::Uuid;

/// Error payload returned by every failing API call.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub message: String,
}

impl ApiError {
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RootResponse {
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct EnvironmentsResponse {
    pub environments: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub models: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ProbesResponse {
    pub probes: Vec<String>,
}

/// Reply to `POST /api/scan` and `POST /api/scan/{id}/cancel`.
#[derive(Debug, Serialize)]
pub struct ScanAccepted {
    pub session_id: Uuid,
    pub status: &'static str,
}
