//! CloudDeploy client core
//!
//! The synchronization layer shared by CloudDeploy front ends: an HTTP layer
//! with single-flight token refresh, an SSE event-stream client with a
//! reconnect state machine, and a reactive projection of project status and
//! metrics. [`ClientContext`] ties them together.

pub mod actions;
pub mod auth;
pub mod config;
pub mod containers;
pub mod context;
pub mod error;
pub mod http;
pub mod projection;
pub mod projects;
pub mod refresh;
pub mod session;
pub mod signals;
pub mod store;
pub mod stream;
pub mod transition;

pub use actions::Actions;
pub use config::{ClientConfig, ConfigError, ConfigOverrides};
pub use context::ClientContext;
pub use error::{ApiError, StreamError};
pub use http::{ApiClient, RequestOptions};
pub use projection::{Optimistic, Projection, ProjectionSnapshot, Source};
pub use session::SessionManager;
pub use signals::{ProjectSignal, SessionSignal, Signals};
pub use store::{StoreError, TokenStore};
pub use stream::{EventStreamHandle, StreamNotice};
pub use transition::ConnectionState;
