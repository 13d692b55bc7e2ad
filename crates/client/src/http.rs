//! HTTP request layer.
//!
//! Every call goes through [`ApiClient::request`]: bearer injection, a hard
//! wall-clock timeout, structured error mapping and the refresh-and-retry
//! protocol. Endpoint wrappers live in `auth`, `projects` and `containers`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use clouddeploy_protocol::{ErrorBody, RefreshTokenResponse};
use reqwest::header::ACCEPT;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::refresh::RefreshFlight;
use crate::session::SessionManager;

pub const REFRESH_ENDPOINT: &str = "/auth/refresh";
const REQUEST_ID_HEADER: &str = "x-request-id";

/// Per-call knobs
#[derive(Debug, Clone, Copy)]
pub struct RequestOptions {
    pub requires_auth: bool,
    /// Overrides the configured request timeout
    pub timeout: Option<Duration>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            requires_auth: true,
            timeout: None,
        }
    }
}

impl RequestOptions {
    /// No bearer token; used by login and register
    pub fn public() -> Self {
        Self {
            requires_auth: false,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Cheap to clone; all clones share the session and the refresh slot.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<Inner>,
}

struct Inner {
    http: reqwest::Client,
    config: ClientConfig,
    session: Arc<SessionManager>,
    refresh: RefreshFlight,
}

struct RawResponse {
    status: StatusCode,
    body: Bytes,
}

impl ApiClient {
    pub fn new(config: ClientConfig, session: Arc<SessionManager>) -> Self {
        Self::with_http(reqwest::Client::new(), config, session)
    }

    pub fn with_http(
        http: reqwest::Client,
        config: ClientConfig,
        session: Arc<SessionManager>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                http,
                config,
                session,
                refresh: RefreshFlight::new(),
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.inner.session
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.inner.http
    }

    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        self.request(Method::GET, endpoint, None::<&()>, RequestOptions::default())
            .await
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: Option<&B>,
    ) -> Result<T, ApiError> {
        self.request(Method::POST, endpoint, body, RequestOptions::default())
            .await
    }

    pub async fn put<B: Serialize, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.request(Method::PUT, endpoint, Some(body), RequestOptions::default())
            .await
    }

    pub async fn patch<B: Serialize, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.request(Method::PATCH, endpoint, Some(body), RequestOptions::default())
            .await
    }

    pub async fn delete<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        self.request(Method::DELETE, endpoint, None::<&()>, RequestOptions::default())
            .await
    }

    /// Issue one API call. A 401 on an authenticated call triggers the
    /// refresh protocol and exactly one retry with the new token.
    pub async fn request<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&B>,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        let body = body
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| ApiError::invalid_input(format!("Unserializable request body: {e}")))?;
        let timeout = options.timeout.unwrap_or(self.inner.config.request_timeout);
        let session = &self.inner.session;

        let mut is_retry = false;
        loop {
            let token = if options.requires_auth {
                Some(session.access_token().ok_or(ApiError::MissingToken)?)
            } else {
                None
            };

            let raw = self
                .inner
                .send(&method, endpoint, body.as_ref(), token.as_deref(), timeout)
                .await?;

            if raw.status.is_success() {
                return decode(&raw);
            }

            if raw.status == StatusCode::UNAUTHORIZED && options.requires_auth && !is_retry {
                if endpoint == REFRESH_ENDPOINT {
                    session.clear_and_signal_unauthorized();
                    return Err(error_from(&raw));
                }
                self.recover_from_unauthorized(token.as_deref()).await?;
                debug!(
                    component = "http",
                    event = "http.retry",
                    endpoint,
                    "Retrying with refreshed token"
                );
                is_retry = true;
                continue;
            }

            if raw.status == StatusCode::UNAUTHORIZED {
                session.clear_and_signal_unauthorized();
            }
            return Err(error_from(&raw));
        }
    }

    /// Get a new access token, sharing any refresh already in flight.
    pub async fn refresh(&self) -> Result<String, ApiError> {
        let inner = self.inner.clone();
        let (flight, started) = self
            .inner
            .refresh
            .join_or_start(move || async move { inner.perform_refresh().await });
        if !started {
            debug!(
                component = "http",
                event = "http.refresh.joined",
                "Joining in-flight token refresh"
            );
        }
        flight.await
    }

    /// The token that drew the 401 may already have been replaced by a
    /// refresh that finished meanwhile; then the retry uses the current one.
    pub(crate) async fn recover_from_unauthorized(
        &self,
        rejected: Option<&str>,
    ) -> Result<(), ApiError> {
        if let (Some(rejected), Some(current)) = (rejected, self.inner.session.access_token()) {
            if rejected != current {
                debug!(
                    component = "http",
                    event = "http.refresh.skipped",
                    "Token already rotated, retrying without refresh"
                );
                return Ok(());
            }
        }
        self.refresh().await.map(|_| ())
    }
}

impl Inner {
    async fn send(
        &self,
        method: &Method,
        endpoint: &str,
        body: Option<&serde_json::Value>,
        bearer: Option<&str>,
        timeout: Duration,
    ) -> Result<RawResponse, ApiError> {
        let url = self.config.endpoint_url(endpoint);
        let request_id = clouddeploy_protocol::new_id();

        let mut builder = self
            .http
            .request(method.clone(), &url)
            .header(ACCEPT, "application/json")
            .header(REQUEST_ID_HEADER, &request_id);
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let started = Instant::now();
        let exchange = async {
            let response = builder.send().await?;
            let status = response.status();
            let body = response.bytes().await?;
            Ok::<_, reqwest::Error>(RawResponse { status, body })
        };

        // Dropping `exchange` on expiry aborts the transport.
        match tokio::time::timeout(timeout, exchange).await {
            Err(_) => {
                warn!(
                    component = "http",
                    event = "http.timeout",
                    %method,
                    endpoint,
                    request_id = %request_id,
                    timeout_ms = timeout.as_millis() as u64,
                    "Request timed out"
                );
                Err(ApiError::Timeout { timeout })
            }
            Ok(Err(e)) => {
                warn!(
                    component = "http",
                    event = "http.network_error",
                    %method,
                    endpoint,
                    request_id = %request_id,
                    error = %e,
                    "Request failed before a response"
                );
                Err(ApiError::Network {
                    message: e.to_string(),
                })
            }
            Ok(Ok(raw)) => {
                debug!(
                    component = "http",
                    event = "http.response",
                    %method,
                    endpoint,
                    request_id = %request_id,
                    status = raw.status.as_u16(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Response received"
                );
                Ok(raw)
            }
        }
    }

    /// The network half of a refresh. Runs inside the shared future, so it
    /// executes once no matter how many callers wait on it.
    async fn perform_refresh(&self) -> Result<String, ApiError> {
        let Some(refresh_token) = self.session.refresh_token() else {
            self.session.clear_and_signal_unauthorized();
            return Err(ApiError::RefreshFailed {
                status: 401,
                message: "No refresh token available".into(),
            });
        };

        info!(
            component = "http",
            event = "http.refresh.start",
            "Refreshing access token"
        );

        let outcome = match self
            .send(
                &Method::POST,
                REFRESH_ENDPOINT,
                None,
                Some(&refresh_token),
                self.config.request_timeout,
            )
            .await
        {
            Ok(raw) if raw.status.is_success() => decode::<RefreshTokenResponse>(&raw),
            Ok(raw) => Err(error_from(&raw)),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(tokens) => {
                self.session
                    .update_tokens(&tokens.access_token, tokens.refresh_token.as_deref());
                info!(
                    component = "http",
                    event = "http.refresh.ok",
                    rotated_refresh_token = tokens.refresh_token.is_some(),
                    "Access token refreshed"
                );
                Ok(tokens.access_token)
            }
            Err(e) => {
                warn!(
                    component = "http",
                    event = "http.refresh.failed",
                    status = e.status_code(),
                    error = %e,
                    "Token refresh failed"
                );
                self.session.clear_and_signal_unauthorized();
                Err(ApiError::RefreshFailed {
                    status: e.status_code(),
                    message: e.to_string(),
                })
            }
        }
    }
}

/// Empty success bodies decode as JSON `null` so `()` and `Option<_>` work
/// for acknowledgement endpoints.
fn decode<T: DeserializeOwned>(raw: &RawResponse) -> Result<T, ApiError> {
    let body: &[u8] = if raw.body.iter().all(u8::is_ascii_whitespace) {
        b"null"
    } else {
        &raw.body
    };
    serde_json::from_slice(body).map_err(|e| ApiError::Decode {
        status: raw.status.as_u16(),
        message: e.to_string(),
    })
}

fn error_from(raw: &RawResponse) -> ApiError {
    let body = serde_json::from_slice::<ErrorBody>(&raw.body).ok();
    let fallback = raw.status.canonical_reason().unwrap_or("Request failed");
    ApiError::from_status(raw.status.as_u16(), body, fallback)
}
