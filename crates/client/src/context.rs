//! Application state for one client process.
//!
//! Built once at startup and passed explicitly. Owns the session, HTTP
//! client, projection and stream actor, and wires the signals between them:
//! logout or an unauthorized session tears the stream down; login and
//! project-list changes cycle it.

use std::sync::Arc;

use tracing::debug;

use crate::actions::Actions;
use crate::config::ClientConfig;
use crate::http::ApiClient;
use crate::projection::Projection;
use crate::session::SessionManager;
use crate::signals::{ProjectSignal, SessionSignal, Signals};
use crate::store::{StoreError, TokenStore};
use crate::stream::EventStreamHandle;

pub struct ClientContext {
    api: ApiClient,
    projection: Arc<Projection>,
    stream: EventStreamHandle,
    project_signals: Arc<Signals<ProjectSignal>>,
    actions: Actions,
}

impl ClientContext {
    /// Open the token store under `config.data_dir` and build the context.
    /// Must be called inside a tokio runtime (spawns the stream actor).
    pub fn open(config: ClientConfig) -> Result<Self, StoreError> {
        let store = TokenStore::open(&config.db_path())?;
        Self::with_store(config, store)
    }

    pub fn with_store(config: ClientConfig, store: TokenStore) -> Result<Self, StoreError> {
        let session = Arc::new(SessionManager::load(store)?);
        let api = ApiClient::new(config, session);
        Ok(Self::from_parts(api))
    }

    pub fn from_parts(api: ApiClient) -> Self {
        let projection = Arc::new(Projection::new());
        let stream = EventStreamHandle::spawn(api.clone(), projection.clone());
        let project_signals = Arc::new(Signals::new());
        let actions = Actions::new(api.clone(), projection.clone(), project_signals.clone());

        let ctx = Self {
            api,
            projection,
            stream,
            project_signals,
            actions,
        };
        ctx.wire();
        ctx
    }

    fn wire(&self) {
        let stream = self.stream.clone();
        self.api.session().signals().subscribe(move |signal| {
            debug!(
                component = "context",
                event = "context.session_signal",
                ?signal,
                "Session signal"
            );
            match signal {
                SessionSignal::LoggedOut | SessionSignal::Unauthorized => stream.teardown(),
                SessionSignal::LoggedIn => stream.refresh_scope(),
            }
        });

        let stream = self.stream.clone();
        self.project_signals.subscribe(move |signal| {
            debug!(
                component = "context",
                event = "context.project_signal",
                ?signal,
                "Project signal"
            );
            stream.refresh_scope();
        });
    }

    pub fn config(&self) -> &ClientConfig {
        self.api.config()
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        self.api.session()
    }

    pub fn projection(&self) -> &Arc<Projection> {
        &self.projection
    }

    pub fn stream(&self) -> &EventStreamHandle {
        &self.stream
    }

    pub fn actions(&self) -> &Actions {
        &self.actions
    }

    pub fn project_signals(&self) -> &Arc<Signals<ProjectSignal>> {
        &self.project_signals
    }

    /// Stop the stream actor; the context is unusable for streaming after
    pub fn shutdown(&self) {
        self.stream.shutdown();
    }
}
