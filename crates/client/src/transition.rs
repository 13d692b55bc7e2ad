//! Pure state transition function for the event-stream connection
//!
//! All reconnect logic lives here as a pure, synchronous function:
//! `transition(state, input) -> (state, effects)`. The stream actor feeds it
//! inputs and carries out the effects. No IO, no timers, no locking.

// ---------------------------------------------------------------------------
// ConnectionState — published to the UI
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        }
    }

    /// A connection task exists (opening or open)
    pub fn is_active(&self) -> bool {
        !matches!(self, ConnectionState::Disconnected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// StreamState — everything the machine decides on
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamState {
    pub connection: ConnectionState,
    pub reconnect_pending: bool,
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// `has_token` is sampled by the actor when the input is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    /// Open the stream if it is not already open
    Connect { has_token: bool },
    /// Close and reopen (login completed, project created or deleted)
    ScopeChanged { has_token: bool },
    /// The server answered with an event stream
    Opened,
    /// The connection errored or the server closed it
    StreamEnded { has_token: bool },
    /// The reconnect timer fired
    ReconnectDue { has_token: bool },
    /// Logout or unauthorized
    Teardown,
}

// ---------------------------------------------------------------------------
// Effect
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    OpenConnection,
    /// Abort the current connection task
    CloseConnection,
    ScheduleReconnect,
    CancelReconnect,
    NotifyConnected,
}

// ---------------------------------------------------------------------------
// transition
// ---------------------------------------------------------------------------

pub fn transition(state: StreamState, input: Input) -> (StreamState, Vec<Effect>) {
    let mut effects = Vec::new();
    let mut next = state;

    match input {
        Input::Connect { has_token } => {
            if state.connection.is_active() || !has_token {
                return (state, effects);
            }
            cancel_pending(&mut next, &mut effects);
            open(&mut next, &mut effects);
        }

        Input::ScopeChanged { has_token } => {
            if state.connection.is_active() {
                effects.push(Effect::CloseConnection);
                next.connection = ConnectionState::Disconnected;
            }
            cancel_pending(&mut next, &mut effects);
            if has_token {
                open(&mut next, &mut effects);
            }
        }

        Input::Opened => {
            // A late open from a connection we already dropped is ignored
            if state.connection == ConnectionState::Connecting {
                next.connection = ConnectionState::Connected;
                effects.push(Effect::NotifyConnected);
            }
        }

        Input::StreamEnded { has_token } => {
            if !state.connection.is_active() {
                return (state, effects);
            }
            effects.push(Effect::CloseConnection);
            next.connection = ConnectionState::Disconnected;
            if has_token && !state.reconnect_pending {
                next.reconnect_pending = true;
                effects.push(Effect::ScheduleReconnect);
            }
        }

        Input::ReconnectDue { has_token } => {
            next.reconnect_pending = false;
            if state.connection == ConnectionState::Disconnected && has_token {
                open(&mut next, &mut effects);
            }
        }

        Input::Teardown => {
            if state.connection.is_active() {
                effects.push(Effect::CloseConnection);
            }
            cancel_pending(&mut next, &mut effects);
            next.connection = ConnectionState::Disconnected;
        }
    }

    (next, effects)
}

fn open(state: &mut StreamState, effects: &mut Vec<Effect>) {
    state.connection = ConnectionState::Connecting;
    effects.push(Effect::OpenConnection);
}

fn cancel_pending(state: &mut StreamState, effects: &mut Vec<Effect>) {
    if state.reconnect_pending {
        state.reconnect_pending = false;
        effects.push(Effect::CancelReconnect);
    }
}
