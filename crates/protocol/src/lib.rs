//! CloudDeploy Protocol
//!
//! Wire types for the CloudDeploy hosting API: request bodies sent by the
//! client, responses and server-sent events produced by the backend.
//! Everything here is plain serde data; no IO.

use uuid::Uuid;

pub mod client;
pub mod server;
pub mod types;

pub use client::*;
pub use server::*;
pub use types::*;

/// Generate a new unique ID (used for request correlation)
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}
