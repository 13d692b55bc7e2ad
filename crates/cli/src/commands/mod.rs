pub mod auth;
pub mod container;
pub mod projects;
pub mod theme;
pub mod watch;

use clouddeploy_client::ApiError;

/// Attach a log-in hint to authentication failures. By the time the CLI sees
/// one the session has already been cleared.
pub fn api_error(err: ApiError) -> anyhow::Error {
    if err.is_unauthorized() {
        anyhow::Error::new(err).context("Not logged in, please log in with `clouddeploy login`")
    } else {
        anyhow::Error::new(err)
    }
}
