//! Event-stream client.
//!
//! A single actor task owns the connection lifecycle. It feeds commands,
//! connection-task reports and the reconnect timer through the pure
//! [`transition`] function and executes the resulting effects. Callers talk
//! to it through [`EventStreamHandle`] (cheap to clone).
//!
//! Each connection runs in its own spawned task that parses SSE frames and
//! writes straight into the [`Projection`], tagged with the projection epoch
//! it was opened under. Aborting the task on close plus the epoch guard
//! keeps writes from landing after teardown.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clouddeploy_protocol::{EntityStatus, StreamEvent};
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Sleep;
use tracing::{debug, info, warn};

use crate::error::StreamError;
use crate::http::ApiClient;
use crate::projection::Projection;
use crate::transition::{transition, ConnectionState, Effect, Input, StreamState};

pub const EVENTS_ENDPOINT: &str = "/containers/events";

/// Transient user-facing notifications raised by the stream
#[derive(Debug, Clone, PartialEq)]
pub enum StreamNotice {
    Connected,
    StatusChanged {
        project_id: String,
        status: EntityStatus,
        previous: Option<EntityStatus>,
        name: Option<String>,
    },
    AutoShutdown {
        project_id: String,
    },
    ContainerError {
        project_id: Option<String>,
        message: String,
        error_code: Option<String>,
    },
}

#[derive(Debug)]
enum StreamCommand {
    Connect,
    ScopeChanged,
    Teardown,
    Shutdown,
}

/// Handle to the running stream actor (cheap to Clone).
#[derive(Clone)]
pub struct EventStreamHandle {
    command_tx: mpsc::Sender<StreamCommand>,
    /// Teardown and shutdown; unbounded so they are never dropped
    control_tx: mpsc::UnboundedSender<StreamCommand>,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    notices: broadcast::Sender<StreamNotice>,
    projection: Arc<Projection>,
    /// Set by `connect`; scope changes are ignored until then
    enabled: Arc<AtomicBool>,
}

impl EventStreamHandle {
    /// Spawn the actor. It starts `Disconnected`; call [`connect`](Self::connect).
    pub fn spawn(api: ApiClient, projection: Arc<Projection>) -> Self {
        let (command_tx, command_rx) = mpsc::channel(64);
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (conn_tx, conn_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let state_tx = Arc::new(state_tx);
        let (notices, _) = broadcast::channel(128);

        let actor = StreamActor {
            api,
            projection: projection.clone(),
            notices: notices.clone(),
            state_tx: state_tx.clone(),
            machine: StreamState::default(),
            attempt: 0,
            connection: None,
            reconnect_timer: None,
            conn_tx,
        };
        tokio::spawn(actor.run(control_rx, command_rx, conn_rx));

        Self {
            command_tx,
            control_tx,
            state_tx,
            notices,
            projection,
            enabled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Open the stream and keep it open (reconnecting as needed) until
    /// teardown
    pub fn connect(&self) {
        self.enabled.store(true, Ordering::SeqCst);
        self.send(StreamCommand::Connect);
    }

    /// Close and reopen so the server re-scopes the stream. Ignored if the
    /// stream was never asked to connect.
    pub fn refresh_scope(&self) {
        if !self.enabled.load(Ordering::SeqCst) {
            return;
        }
        self.send(StreamCommand::ScopeChanged);
    }

    /// Synchronously empty the projection and report `Disconnected`; the
    /// actor then aborts the connection and cancels any reconnect timer.
    pub fn teardown(&self) {
        self.projection.reset();
        self.state_tx.send_replace(ConnectionState::Disconnected);
        self.control(StreamCommand::Teardown);
    }

    /// Stop the actor for good
    pub fn shutdown(&self) {
        self.enabled.store(false, Ordering::SeqCst);
        self.teardown();
        self.control(StreamCommand::Shutdown);
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn notices(&self) -> broadcast::Receiver<StreamNotice> {
        self.notices.subscribe()
    }

    fn control(&self, cmd: StreamCommand) {
        if self.control_tx.send(cmd).is_err() {
            debug!(
                component = "event_stream",
                event = "stream.actor_gone",
                "Stream actor already stopped"
            );
        }
    }

    fn send(&self, cmd: StreamCommand) {
        if let Err(e) = self.command_tx.try_send(cmd) {
            warn!(
                component = "event_stream",
                event = "stream.command_dropped",
                error = %e,
                "Stream actor channel full or closed"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum ConnEvent {
    Opened,
    Ended(StreamError),
}

#[derive(Debug)]
struct ConnMessage {
    attempt: u64,
    epoch: u64,
    event: ConnEvent,
}

enum Wake {
    Command(StreamCommand),
    Connection(ConnMessage),
    ReconnectDue,
}

struct StreamActor {
    api: ApiClient,
    projection: Arc<Projection>,
    notices: broadcast::Sender<StreamNotice>,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    machine: StreamState,
    /// Id of the current connection; reports from older ones are ignored
    attempt: u64,
    connection: Option<JoinHandle<()>>,
    reconnect_timer: Option<Pin<Box<Sleep>>>,
    conn_tx: mpsc::UnboundedSender<ConnMessage>,
}

impl StreamActor {
    async fn run(
        mut self,
        mut control_rx: mpsc::UnboundedReceiver<StreamCommand>,
        mut command_rx: mpsc::Receiver<StreamCommand>,
        mut conn_rx: mpsc::UnboundedReceiver<ConnMessage>,
    ) {
        loop {
            let wake = tokio::select! {
                biased;
                cmd = control_rx.recv() => match cmd {
                    Some(cmd) => Wake::Command(cmd),
                    None => break,
                },
                cmd = command_rx.recv() => match cmd {
                    Some(cmd) => Wake::Command(cmd),
                    None => break,
                },
                Some(msg) = conn_rx.recv() => Wake::Connection(msg),
                () = wait_reconnect(self.reconnect_timer.as_mut()) => Wake::ReconnectDue,
            };

            let has_token = self.api.session().has_token();
            let input = match wake {
                Wake::Command(StreamCommand::Connect) => Input::Connect { has_token },
                Wake::Command(StreamCommand::ScopeChanged) => Input::ScopeChanged { has_token },
                Wake::Command(StreamCommand::Teardown) => Input::Teardown,
                Wake::Command(StreamCommand::Shutdown) => break,
                Wake::Connection(msg) => {
                    if msg.attempt != self.attempt {
                        continue;
                    }
                    match msg.event {
                        // Opened under an epoch that teardown already retired
                        ConnEvent::Opened if msg.epoch != self.projection.epoch() => continue,
                        ConnEvent::Opened => Input::Opened,
                        ConnEvent::Ended(reason) => {
                            log_stream_end(&reason, has_token);
                            Input::StreamEnded { has_token }
                        }
                    }
                }
                Wake::ReconnectDue => {
                    self.reconnect_timer = None;
                    Input::ReconnectDue { has_token }
                }
            };

            self.step(input);
        }

        self.close();
        self.reconnect_timer = None;
        debug!(
            component = "event_stream",
            event = "stream.actor_stopped",
            "Stream actor stopped"
        );
    }

    fn step(&mut self, input: Input) {
        let (next, effects) = transition(self.machine, input);
        debug!(
            component = "event_stream",
            event = "stream.transition",
            ?input,
            from = %self.machine.connection,
            to = %next.connection,
            effects = effects.len(),
            "Stream transition"
        );
        self.machine = next;

        for effect in effects {
            match effect {
                Effect::OpenConnection => self.open(),
                Effect::CloseConnection => self.close(),
                Effect::ScheduleReconnect => {
                    let delay = self.api.config().reconnect_delay;
                    info!(
                        component = "event_stream",
                        event = "stream.reconnect_scheduled",
                        delay_ms = delay.as_millis() as u64,
                        "Reconnect scheduled"
                    );
                    self.reconnect_timer = Some(Box::pin(tokio::time::sleep(delay)));
                }
                Effect::CancelReconnect => self.reconnect_timer = None,
                Effect::NotifyConnected => {
                    info!(
                        component = "event_stream",
                        event = "stream.connected",
                        "Event stream connected"
                    );
                    let _ = self.notices.send(StreamNotice::Connected);
                }
            }
        }

        let connection = next.connection;
        self.state_tx.send_if_modified(|current| {
            if *current == connection {
                return false;
            }
            *current = connection;
            true
        });
    }

    fn open(&mut self) {
        self.close();
        self.attempt += 1;
        let attempt = self.attempt;
        let epoch = self.projection.epoch();

        let Some(token) = self.api.session().access_token() else {
            let _ = self.conn_tx.send(ConnMessage {
                attempt,
                epoch,
                event: ConnEvent::Ended(StreamError::Disconnected),
            });
            return;
        };

        let connection = Connection {
            api: self.api.clone(),
            url: self.api.config().endpoint_url(EVENTS_ENDPOINT),
            token,
            attempt,
            epoch,
            projection: self.projection.clone(),
            notices: self.notices.clone(),
            conn_tx: self.conn_tx.clone(),
        };
        debug!(
            component = "event_stream",
            event = "stream.opening",
            attempt,
            epoch,
            "Opening event stream"
        );
        self.connection = Some(tokio::spawn(connection.run()));
    }

    fn close(&mut self) {
        if let Some(task) = self.connection.take() {
            task.abort();
        }
    }
}

async fn wait_reconnect(timer: Option<&mut Pin<Box<Sleep>>>) {
    match timer {
        Some(timer) => timer.await,
        None => std::future::pending().await,
    }
}

fn log_stream_end(reason: &StreamError, has_token: bool) {
    if has_token {
        warn!(
            component = "event_stream",
            event = "stream.disconnected",
            error = %reason,
            "Event stream disconnected"
        );
    } else {
        debug!(
            component = "event_stream",
            event = "stream.disconnected",
            error = %reason,
            "Event stream closed without a session"
        );
    }
}

// ---------------------------------------------------------------------------
// Connection task
// ---------------------------------------------------------------------------

struct Connection {
    api: ApiClient,
    url: String,
    token: String,
    attempt: u64,
    epoch: u64,
    projection: Arc<Projection>,
    notices: broadcast::Sender<StreamNotice>,
    conn_tx: mpsc::UnboundedSender<ConnMessage>,
}

impl Connection {
    async fn run(self) {
        let reason = self.stream().await;
        self.report(ConnEvent::Ended(reason));
    }

    /// Returns why the stream stopped
    async fn stream(&self) -> StreamError {
        let response = match self
            .api
            .http()
            .get(&self.url)
            .query(&[("token", self.token.as_str())])
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return StreamError::Connect(e),
        };

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            self.renew_token().await;
        }
        if !status.is_success() {
            return StreamError::Status {
                status: status.as_u16(),
            };
        }
        let is_event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("text/event-stream"));
        if !is_event_stream {
            return StreamError::Transport("response is not an event stream".into());
        }

        self.report(ConnEvent::Opened);

        let mut events = Box::pin(response.bytes_stream().eventsource());
        while let Some(frame) = events.next().await {
            match frame {
                Ok(frame) => self.dispatch(&frame.event, &frame.data),
                Err(e) => return StreamError::Transport(e.to_string()),
            }
        }
        StreamError::Disconnected
    }

    /// The server rejected our token. Refresh it (or end the session) before
    /// the reconnect, on a detached task so aborting this connection cannot
    /// strand the shared refresh.
    async fn renew_token(&self) {
        let api = self.api.clone();
        let rejected = self.token.clone();
        let renewal =
            tokio::spawn(async move { api.recover_from_unauthorized(Some(&rejected)).await });
        match renewal.await {
            Ok(Ok(())) => info!(
                component = "event_stream",
                event = "stream.token_renewed",
                attempt = self.attempt,
                "Stream token renewed"
            ),
            Ok(Err(e)) => warn!(
                component = "event_stream",
                event = "stream.token_rejected",
                attempt = self.attempt,
                error = %e,
                "Stream token rejected and refresh failed"
            ),
            Err(e) => warn!(
                component = "event_stream",
                event = "stream.token_renewal_aborted",
                error = %e,
                "Token renewal task did not finish"
            ),
        }
    }

    fn dispatch(&self, name: &str, data: &str) {
        let event = match StreamEvent::from_sse(name, data) {
            Ok(event) => event,
            Err(e) => {
                let e = StreamError::Parse(e);
                warn!(
                    component = "event_stream",
                    event = "stream.frame_dropped",
                    sse_event = name,
                    error = %e,
                    "Dropping event"
                );
                return;
            }
        };
        debug!(
            component = "event_stream",
            event = "stream.frame",
            sse_event = event.name(),
            "Event received"
        );

        match event {
            StreamEvent::StatusChanged(payload) => {
                if self
                    .projection
                    .apply_status_at(self.epoch, &payload.project_id, payload.status)
                {
                    self.notify(StreamNotice::StatusChanged {
                        project_id: payload.project_id,
                        status: payload.status,
                        previous: payload.previous_status,
                        name: payload.name,
                    });
                }
            }
            StreamEvent::MetricsUpdated(payload) => {
                self.projection
                    .apply_metrics_at(self.epoch, &payload.project_id, payload.metrics);
            }
            StreamEvent::AutoShutdown(payload) => {
                if self.projection.apply_status_at(
                    self.epoch,
                    &payload.project_id,
                    EntityStatus::Inactive,
                ) {
                    self.notify(StreamNotice::AutoShutdown {
                        project_id: payload.project_id,
                    });
                }
            }
            StreamEvent::ContainerError(payload) => {
                let applied = match &payload.project_id {
                    Some(id) => self
                        .projection
                        .apply_status_at(self.epoch, id, EntityStatus::Error),
                    None => self.projection.epoch() == self.epoch,
                };
                if applied {
                    self.notify(StreamNotice::ContainerError {
                        project_id: payload.project_id,
                        message: payload
                            .message
                            .unwrap_or_else(|| "Container error".to_string()),
                        error_code: payload.error_code,
                    });
                }
            }
            StreamEvent::Connected(payload) => {
                debug!(
                    component = "event_stream",
                    event = "stream.server_hello",
                    message = payload.message.as_deref().unwrap_or(""),
                    "Server acknowledged stream"
                );
            }
        }
    }

    fn notify(&self, notice: StreamNotice) {
        // No receivers is fine; notices are fire-and-forget
        let _ = self.notices.send(notice);
    }

    fn report(&self, event: ConnEvent) {
        let _ = self.conn_tx.send(ConnMessage {
            attempt: self.attempt,
            epoch: self.epoch,
            event,
        });
    }
}
