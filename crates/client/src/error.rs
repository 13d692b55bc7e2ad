//! Error types for the HTTP layer and the event stream

use std::time::Duration;

use clouddeploy_protocol::ErrorBody;
use thiserror::Error;

/// Status code used for failures that never reached the server
pub const STATUS_NETWORK: u16 = 0;
pub const STATUS_TIMEOUT: u16 = 408;

/// Errors surfaced by API calls.
///
/// `Clone` so a single refresh outcome can be handed to every waiter.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// No access token stored for a call that needs one
    #[error("No authentication token found")]
    MissingToken,

    /// The server rejected our credentials and no refresh applies
    #[error("{message}")]
    Unauthorized {
        message: String,
        body: Option<ErrorBody>,
    },

    /// The refresh token was missing, rejected or the refresh call failed
    #[error("Session expired: {message}")]
    RefreshFailed { status: u16, message: String },

    #[error("Network error - cannot reach server: {message}")]
    Network { message: String },

    #[error("Request timeout after {}s", .timeout.as_secs_f64())]
    Timeout { timeout: Duration },

    #[error("Server error ({status}): {message}")]
    Server {
        status: u16,
        message: String,
        body: Option<ErrorBody>,
    },

    /// Business rule rejected by the server (4xx other than 401/408)
    #[error("{message}")]
    Validation {
        status: u16,
        message: String,
        body: Option<ErrorBody>,
    },

    /// Rejected locally before any request was made
    #[error("{message}")]
    InvalidInput { message: String },

    /// Success status with a body we could not decode
    #[error("Unexpected response ({status}): {message}")]
    Decode { status: u16, message: String },
}

impl ApiError {
    /// Map a non-success HTTP status and its (possibly absent) error body
    pub fn from_status(status: u16, body: Option<ErrorBody>, fallback: &str) -> Self {
        let message = body
            .as_ref()
            .and_then(|b| b.best_message())
            .unwrap_or(fallback)
            .to_string();

        match status {
            401 => ApiError::Unauthorized { message, body },
            s if s >= 500 => ApiError::Server {
                status: s,
                message,
                body,
            },
            s => ApiError::Validation {
                status: s,
                message,
                body,
            },
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        ApiError::InvalidInput {
            message: message.into(),
        }
    }

    /// HTTP-style status for caller-side branching
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::MissingToken | ApiError::Unauthorized { .. } => 401,
            ApiError::RefreshFailed { status, .. } => *status,
            ApiError::Network { .. } => STATUS_NETWORK,
            ApiError::Timeout { .. } => STATUS_TIMEOUT,
            ApiError::Server { status, .. }
            | ApiError::Validation { status, .. }
            | ApiError::Decode { status, .. } => *status,
            ApiError::InvalidInput { .. } => 400,
        }
    }

    pub fn is_network_error(&self) -> bool {
        matches!(self, ApiError::Network { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ApiError::Timeout { .. })
    }

    /// True for every failure that means "log in again"
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            ApiError::MissingToken | ApiError::Unauthorized { .. } | ApiError::RefreshFailed { .. }
        )
    }

    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::Validation { status: 404, .. })
    }
}

/// Failures of the event stream. Never surfaced to callers: transport
/// errors feed the reconnect machine, parse errors drop the frame.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("event stream request failed: {0}")]
    Connect(#[source] reqwest::Error),

    #[error("event stream rejected with status {status}")]
    Status { status: u16 },

    #[error("event stream transport error: {0}")]
    Transport(String),

    #[error("malformed event: {0}")]
    Parse(#[from] clouddeploy_protocol::StreamEventError),

    #[error("event stream closed by server")]
    Disconnected,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_statuses() {
        assert!(ApiError::from_status(401, None, "Unauthorized").is_unauthorized());
        assert!(ApiError::from_status(503, None, "Service Unavailable").is_server_error());
        assert!(ApiError::from_status(404, None, "Not Found").is_not_found());
        assert_eq!(
            ApiError::Timeout {
                timeout: Duration::from_secs(30)
            }
            .status_code(),
            408
        );
        assert_eq!(
            ApiError::Network {
                message: "refused".into()
            }
            .status_code(),
            0
        );
    }

    #[test]
    fn message_prefers_body_then_fallback() {
        let body = ErrorBody {
            error: Some("Email already registered".into()),
            ..Default::default()
        };
        let err = ApiError::from_status(400, Some(body), "Bad Request");
        assert_eq!(err.to_string(), "Email already registered");

        let err = ApiError::from_status(400, None, "Bad Request");
        assert_eq!(err.to_string(), "Bad Request");
    }
}
