//! In-process fake of the CloudDeploy backend.

#![allow(dead_code)]

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use clouddeploy_client::{ClientConfig, ClientContext, TokenStore};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;

pub const PASSWORD: &str = "secret1";
const CLOSE_STREAMS: &str = "__close__";

pub struct Backend {
    pub addr: SocketAddr,
    pub refresh_calls: AtomicUsize,
    pub refresh_delay: Mutex<Duration>,
    pub fail_refresh: AtomicBool,
    /// Every authenticated call answers 401 regardless of token
    pub reject_all: AtomicBool,
    pub fail_actions: AtomicBool,
    pub logout_calls: AtomicUsize,
    pub stream_connections: AtomicUsize,
    /// Set when a `/slow` request is dropped before it answers
    pub slow_cancelled: AtomicBool,
    access_token: Mutex<String>,
    refresh_token: Mutex<String>,
    /// Bearer tokens seen on `/projects`, in arrival order
    pub seen_tokens: Mutex<Vec<String>>,
    projects: Mutex<Vec<Value>>,
    events: broadcast::Sender<(String, String)>,
}

impl Backend {
    pub fn api_url(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    /// Invalidate the current access token; the next call sees a 401
    pub fn expire_access_token(&self) {
        *self.access_token.lock().unwrap() = "expired".into();
    }

    pub fn access_token(&self) -> String {
        self.access_token.lock().unwrap().clone()
    }

    /// Push a named event to every open stream
    pub fn push(&self, event: &str, data: Value) {
        let _ = self.events.send((event.to_string(), data.to_string()));
    }

    /// End every open stream from the server side
    pub fn close_streams(&self) {
        let _ = self.events.send((CLOSE_STREAMS.to_string(), String::new()));
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        *self.refresh_delay.lock().unwrap() = delay;
    }
}

pub async fn spawn_backend() -> Arc<Backend> {
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0))
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    let (events, _) = broadcast::channel(64);

    let backend = Arc::new(Backend {
        addr,
        refresh_calls: AtomicUsize::new(0),
        refresh_delay: Mutex::new(Duration::ZERO),
        fail_refresh: AtomicBool::new(false),
        reject_all: AtomicBool::new(false),
        fail_actions: AtomicBool::new(false),
        logout_calls: AtomicUsize::new(0),
        stream_connections: AtomicUsize::new(0),
        slow_cancelled: AtomicBool::new(false),
        access_token: Mutex::new(String::new()),
        refresh_token: Mutex::new("refresh-1".into()),
        seen_tokens: Mutex::new(Vec::new()),
        projects: Mutex::new(Vec::new()),
        events,
    });

    let api = Router::new()
        .route("/auth/login", post(login))
        .route("/auth/register", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/refresh", post(refresh))
        .route("/auth/me", get(me))
        .route("/projects", get(list_projects).post(create_project))
        .route("/projects/{id}", get(get_project).delete(delete_project))
        .route("/containers/events", get(events_stream))
        .route("/containers/{id}/status", get(container_status))
        .route("/containers/{id}/{action}", post(container_action))
        .route("/slow", get(slow))
        .route("/empty", delete(empty));
    let app = Router::new()
        .nest("/api", api)
        .with_state(backend.clone());

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    backend
}

/// Client wired to `backend` with short timeouts and an in-memory store
pub fn client(backend: &Backend) -> ClientContext {
    let config = ClientConfig::new(backend.api_url(), std::env::temp_dir())
        .with_request_timeout(Duration::from_millis(500))
        .with_reconnect_delay(Duration::from_millis(100));
    ClientContext::with_store(config, TokenStore::in_memory().expect("store")).expect("context")
}

/// Poll until `check` holds or two seconds pass
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

type Shared = State<Arc<Backend>>;

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": "Invalid or expired token"})),
    )
        .into_response()
}

fn authorize(backend: &Backend, headers: &HeaderMap) -> Result<(), Response> {
    if backend.reject_all.load(Ordering::SeqCst) {
        return Err(unauthorized());
    }
    match bearer(headers) {
        Some(token) if token == *backend.access_token.lock().unwrap() => Ok(()),
        _ => Err(unauthorized()),
    }
}

#[derive(Deserialize)]
struct Credentials {
    email: String,
    password: String,
    #[serde(default)]
    name: Option<String>,
}

async fn login(State(backend): Shared, Json(body): Json<Credentials>) -> Response {
    if body.password != PASSWORD {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "Invalid email or password"})),
        )
            .into_response();
    }
    *backend.access_token.lock().unwrap() = "access-1".into();
    *backend.refresh_token.lock().unwrap() = "refresh-1".into();
    let name = body
        .name
        .unwrap_or_else(|| body.email.split('@').next().unwrap_or("user").to_string());
    Json(json!({
        "user": {"id": 1, "email": body.email, "name": name},
        "token": "access-1",
        "refresh_token": "refresh-1",
    }))
    .into_response()
}

async fn logout(State(backend): Shared, headers: HeaderMap) -> Response {
    backend.logout_calls.fetch_add(1, Ordering::SeqCst);
    if let Err(response) = authorize(&backend, &headers) {
        return response;
    }
    Json(json!({"message": "Logged out"})).into_response()
}

async fn refresh(State(backend): Shared, headers: HeaderMap) -> Response {
    let call = backend.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
    let delay = *backend.refresh_delay.lock().unwrap();
    tokio::time::sleep(delay).await;

    let presented = bearer(&headers);
    let expected = backend.refresh_token.lock().unwrap().clone();
    if backend.fail_refresh.load(Ordering::SeqCst) || presented.as_deref() != Some(expected.as_str())
    {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "Invalid refresh token"})),
        )
            .into_response();
    }

    let access = format!("access-{}", call + 1);
    *backend.access_token.lock().unwrap() = access.clone();
    Json(json!({"access_token": access})).into_response()
}

async fn me(State(backend): Shared, headers: HeaderMap) -> Response {
    if let Err(response) = authorize(&backend, &headers) {
        return response;
    }
    Json(json!({"user": {"id": "1", "email": "a@b.com", "name": "a"}})).into_response()
}

async fn list_projects(State(backend): Shared, headers: HeaderMap) -> Response {
    if let Some(token) = bearer(&headers) {
        backend.seen_tokens.lock().unwrap().push(token);
    }
    if let Err(response) = authorize(&backend, &headers) {
        return response;
    }
    let projects = backend.projects.lock().unwrap().clone();
    Json(json!({"projects": projects, "count": projects.len()})).into_response()
}

#[derive(Deserialize)]
struct NewProject {
    name: String,
    github_url: String,
    template: String,
}

async fn create_project(
    State(backend): Shared,
    headers: HeaderMap,
    Json(body): Json<NewProject>,
) -> Response {
    if let Err(response) = authorize(&backend, &headers) {
        return response;
    }
    let mut projects = backend.projects.lock().unwrap();
    let project = json!({
        "id": format!("p{}", projects.len() + 1),
        "name": body.name,
        "status": "deploying",
        "url": format!("{}.a.localhost", body.name),
        "template": body.template,
        "github_url": body.github_url,
        "created_at": "2025-11-01T10:30:00Z",
        "metrics": {"cpu": 0, "memory": 0, "requests": 0},
    });
    projects.push(project.clone());
    (
        StatusCode::CREATED,
        Json(json!({"project": project, "message": "Project created"})),
    )
        .into_response()
}

async fn get_project(
    State(backend): Shared,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if let Err(response) = authorize(&backend, &headers) {
        return response;
    }
    let projects = backend.projects.lock().unwrap();
    match projects.iter().find(|p| p["id"] == id.as_str()) {
        Some(project) => Json(json!({"project": project})).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Project not found"})),
        )
            .into_response(),
    }
}

async fn delete_project(
    State(backend): Shared,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if let Err(response) = authorize(&backend, &headers) {
        return response;
    }
    backend
        .projects
        .lock()
        .unwrap()
        .retain(|p| p["id"] != id.as_str());
    Json(json!({"message": "Project deleted"})).into_response()
}

async fn container_status(
    State(backend): Shared,
    headers: HeaderMap,
    Path(_id): Path<String>,
) -> Response {
    if let Err(response) = authorize(&backend, &headers) {
        return response;
    }
    Json(json!({"status": "exited"})).into_response()
}

async fn container_action(
    State(backend): Shared,
    headers: HeaderMap,
    Path((_id, action)): Path<(String, String)>,
) -> Response {
    if let Err(response) = authorize(&backend, &headers) {
        return response;
    }
    if backend.fail_actions.load(Ordering::SeqCst) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "Docker daemon unavailable"})),
        )
            .into_response();
    }
    if action == "stop" {
        return StatusCode::NO_CONTENT.into_response();
    }
    Json(json!({"success": true, "message": format!("Container {action} requested")})).into_response()
}

/// Flags the backend if the handler future is dropped before completing
struct CancelGuard {
    backend: Arc<Backend>,
    done: bool,
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if !self.done {
            self.backend.slow_cancelled.store(true, Ordering::SeqCst);
        }
    }
}

async fn slow(State(backend): Shared) -> Response {
    let mut guard = CancelGuard {
        backend,
        done: false,
    };
    tokio::time::sleep(Duration::from_secs(5)).await;
    guard.done = true;
    Json(json!({})).into_response()
}

async fn empty() -> StatusCode {
    StatusCode::NO_CONTENT
}

#[derive(Deserialize)]
struct StreamQuery {
    token: Option<String>,
}

async fn events_stream(State(backend): Shared, Query(query): Query<StreamQuery>) -> Response {
    if query.token.as_deref() != Some(backend.access_token().as_str()) {
        return unauthorized();
    }
    backend.stream_connections.fetch_add(1, Ordering::SeqCst);

    let rx = backend.events.subscribe();
    let stream = futures::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok((name, _)) if name == CLOSE_STREAMS => return None,
                Ok((name, data)) => {
                    let event = Event::default().event(name).data(data);
                    return Some((Ok::<_, Infallible>(event), rx));
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });
    Sse::new(stream).into_response()
}
