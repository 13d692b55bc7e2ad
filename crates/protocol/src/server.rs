//! Server → Client responses and pushed events

use serde::{Deserialize, Serialize};

use crate::types::*;

// ---------------------------------------------------------------------------
// HTTP responses
// ---------------------------------------------------------------------------

/// Body of `/auth/login` and `/auth/register`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Body of `/auth/refresh`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeResponse {
    pub user: User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectsResponse {
    pub projects: Vec<Project>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

/// Single-project body (`GET`, `POST`, `PATCH .../status`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectResponse {
    pub project: Project,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerStatusResponse {
    pub status: EntityStatus,
}

/// Acknowledgement returned by container lifecycle endpoints.
/// Some report the resulting status, most only a message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerActionResponse {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub status: Option<EntityStatus>,
}

/// Structured error body. The backend sends `{"error": "..."}`; newer
/// handlers add `message` and `statusCode`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, rename = "statusCode")]
    pub status_code: Option<u16>,
}

impl ErrorBody {
    /// Most specific human-readable message, if any
    pub fn best_message(&self) -> Option<&str> {
        self.message
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .or_else(|| self.error.as_deref().filter(|e| !e.trim().is_empty()))
    }
}

// ---------------------------------------------------------------------------
// Event stream (`GET /containers/events`)
// ---------------------------------------------------------------------------

pub const EVENT_CONTAINER_STATUS_CHANGED: &str = "container_status_changed";
pub const EVENT_METRICS_UPDATED: &str = "metrics_updated";
pub const EVENT_AUTO_SHUTDOWN: &str = "auto_shutdown";
pub const EVENT_CONTAINER_ERROR: &str = "container_error";
pub const EVENT_CONNECTED: &str = "connected";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChangedPayload {
    #[serde(deserialize_with = "de_project_id")]
    pub project_id: String,
    pub status: EntityStatus,
    #[serde(default)]
    pub previous_status: Option<EntityStatus>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsUpdatedPayload {
    #[serde(deserialize_with = "de_project_id")]
    pub project_id: String,
    pub metrics: EntityMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoShutdownPayload {
    #[serde(deserialize_with = "de_project_id")]
    pub project_id: String,
}

/// `container_error` is also sent without a project when the backend
/// cannot list the user's containers at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerErrorPayload {
    #[serde(default, deserialize_with = "de_opt_project_id")]
    pub project_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, rename = "error_code")]
    pub error_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedPayload {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub user_email: Option<String>,
}

/// A typed event pushed over the stream
#[derive(Debug, Clone)]
pub enum StreamEvent {
    StatusChanged(StatusChangedPayload),
    MetricsUpdated(MetricsUpdatedPayload),
    AutoShutdown(AutoShutdownPayload),
    ContainerError(ContainerErrorPayload),
    Connected(ConnectedPayload),
}

/// Why an SSE frame could not become a [`StreamEvent`]
#[derive(Debug)]
pub enum StreamEventError {
    UnknownEvent(String),
    Payload {
        event: String,
        source: serde_json::Error,
    },
}

impl std::fmt::Display for StreamEventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamEventError::UnknownEvent(name) => write!(f, "unknown event '{name}'"),
            StreamEventError::Payload { event, source } => {
                write!(f, "malformed '{event}' payload: {source}")
            }
        }
    }
}

impl std::error::Error for StreamEventError {}

impl StreamEvent {
    /// Decode an SSE frame from its `event:` name and `data:` body
    pub fn from_sse(event: &str, data: &str) -> Result<Self, StreamEventError> {
        fn payload<T: serde::de::DeserializeOwned>(
            event: &str,
            data: &str,
        ) -> Result<T, StreamEventError> {
            serde_json::from_str(data).map_err(|source| StreamEventError::Payload {
                event: event.to_string(),
                source,
            })
        }

        match event {
            EVENT_CONTAINER_STATUS_CHANGED => payload(event, data).map(StreamEvent::StatusChanged),
            EVENT_METRICS_UPDATED => payload(event, data).map(StreamEvent::MetricsUpdated),
            EVENT_AUTO_SHUTDOWN => payload(event, data).map(StreamEvent::AutoShutdown),
            EVENT_CONTAINER_ERROR => payload(event, data).map(StreamEvent::ContainerError),
            EVENT_CONNECTED => payload(event, data).map(StreamEvent::Connected),
            other => Err(StreamEventError::UnknownEvent(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StreamEvent::StatusChanged(_) => EVENT_CONTAINER_STATUS_CHANGED,
            StreamEvent::MetricsUpdated(_) => EVENT_METRICS_UPDATED,
            StreamEvent::AutoShutdown(_) => EVENT_AUTO_SHUTDOWN,
            StreamEvent::ContainerError(_) => EVENT_CONTAINER_ERROR,
            StreamEvent::Connected(_) => EVENT_CONNECTED,
        }
    }
}

fn de_project_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "projectId must be a string or number, got {other}"
        ))),
    }
}

fn de_opt_project_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "projectId must be a string or number, got {other}"
        ))),
    }
}
