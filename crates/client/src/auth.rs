//! Authentication endpoints and credential validation.

use clouddeploy_protocol::{AuthResponse, LoginRequest, MeResponse, RegisterRequest, User};
use reqwest::Method;
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::http::{ApiClient, RequestOptions};

pub const MIN_PASSWORD_LEN: usize = 6;
pub const MIN_USERNAME_LEN: usize = 3;

pub fn validate_credentials(email: &str, password: &str) -> Result<(), ApiError> {
    let email = email.trim();
    if email.is_empty() || password.is_empty() {
        return Err(ApiError::invalid_input("Email and password are required"));
    }
    if !looks_like_email(email) {
        return Err(ApiError::invalid_input("Invalid email address"));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::invalid_input(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// Usernames end up in project hostnames (`<project>.<user>.localhost`).
pub fn validate_username(name: &str) -> Result<(), ApiError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::invalid_input("Username is required"));
    }
    if name.chars().count() < MIN_USERNAME_LEN {
        return Err(ApiError::invalid_input(format!(
            "Username must be at least {MIN_USERNAME_LEN} characters"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(ApiError::invalid_input(
            "Username may only contain letters, numbers, '_' and '-'",
        ));
    }
    Ok(())
}

fn looks_like_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
}

impl ApiClient {
    /// `POST /auth/login`; on success the session is established and
    /// `LoggedIn` is emitted.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, ApiError> {
        validate_credentials(email, password)?;
        let body = LoginRequest {
            email: email.trim().to_string(),
            password: password.to_string(),
        };
        let auth: AuthResponse = self
            .request(Method::POST, "/auth/login", Some(&body), RequestOptions::public())
            .await?;
        self.session().establish(&auth);
        Ok(auth.user)
    }

    /// `POST /auth/register` followed by an established session
    pub async fn register(&self, email: &str, password: &str, name: &str) -> Result<User, ApiError> {
        let auth = self.register_request(email, password, name).await?;
        self.session().establish(&auth);
        Ok(auth.user)
    }

    /// Create the account without logging in
    pub async fn register_only(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<User, ApiError> {
        let auth = self.register_request(email, password, name).await?;
        info!(
            component = "auth",
            event = "auth.registered",
            user_email = %auth.user.email,
            "Account created"
        );
        Ok(auth.user)
    }

    async fn register_request(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<AuthResponse, ApiError> {
        validate_credentials(email, password)?;
        validate_username(name)?;
        let body = RegisterRequest {
            email: email.trim().to_string(),
            password: password.to_string(),
            name: name.trim().to_string(),
        };
        self.request(Method::POST, "/auth/register", Some(&body), RequestOptions::public())
            .await
    }

    /// Best-effort server logout. The local session is cleared and
    /// `LoggedOut` emitted whatever the server says.
    pub async fn logout(&self) {
        if self.session().has_token() {
            if let Err(e) = self.post::<(), serde_json::Value>("/auth/logout", None).await {
                warn!(
                    component = "auth",
                    event = "auth.logout_failed",
                    error = %e,
                    "Server logout failed, clearing local session anyway"
                );
            }
        }
        self.session().logout();
    }

    /// `GET /auth/me`. Refreshes the cached profile; any failure ends the
    /// session and yields `None`.
    pub async fn current_user(&self) -> Option<User> {
        if !self.session().has_token() {
            return None;
        }
        match self.get::<MeResponse>("/auth/me").await {
            Ok(me) => {
                self.session().set_cached_user(&me.user);
                Some(me.user)
            }
            Err(e) => {
                debug!(
                    component = "auth",
                    event = "auth.me_failed",
                    error = %e,
                    "Could not load current user"
                );
                self.session().clear_and_signal_unauthorized();
                None
            }
        }
    }

    /// Profile from the last login or `/auth/me`, no network
    pub fn cached_user(&self) -> Option<User> {
        self.session().cached_user()
    }

    /// True if the stored token is still accepted by the server
    pub async fn validate_session(&self) -> bool {
        self.current_user().await.is_some()
    }
}
