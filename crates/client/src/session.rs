//! The one authenticated session of this process.
//!
//! State is held in memory and written through to the [`TokenStore`] so a
//! restarted CLI picks it up again. Persistence failures are logged and the
//! in-memory session stays authoritative for the rest of the process.

use std::sync::{Mutex, MutexGuard};

use clouddeploy_protocol::{AuthResponse, Theme, User};
use tracing::{info, warn};

use crate::signals::{SessionSignal, Signals};
use crate::store::{StoreError, TokenStore, KEY_AUTH_TOKEN, KEY_REFRESH_TOKEN};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub cached_user: Option<User>,
}

impl SessionState {
    fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none() && self.cached_user.is_none()
    }
}

pub struct SessionManager {
    store: TokenStore,
    state: Mutex<SessionState>,
    signals: Signals<SessionSignal>,
}

impl SessionManager {
    /// Load whatever a previous run left in `store`
    pub fn load(store: TokenStore) -> Result<Self, StoreError> {
        let cached_user = match store.cached_user() {
            Ok(user) => user,
            Err(StoreError::Corrupt { key, source }) => {
                warn!(
                    component = "session",
                    event = "session.cached_user_corrupt",
                    key,
                    error = %source,
                    "Dropping unreadable cached user"
                );
                None
            }
            Err(e) => return Err(e),
        };
        let state = SessionState {
            access_token: store.access_token()?,
            refresh_token: store.refresh_token()?,
            cached_user,
        };
        Ok(Self {
            store,
            state: Mutex::new(state),
            signals: Signals::new(),
        })
    }

    pub fn signals(&self) -> &Signals<SessionSignal> {
        &self.signals
    }

    pub fn snapshot(&self) -> SessionState {
        self.lock().clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.lock().access_token.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.lock().refresh_token.clone()
    }

    pub fn cached_user(&self) -> Option<User> {
        self.lock().cached_user.clone()
    }

    pub fn has_token(&self) -> bool {
        self.lock().access_token.is_some()
    }

    /// Install the session from a login/register response and announce it
    pub fn establish(&self, auth: &AuthResponse) {
        {
            let mut state = self.lock();
            *state = SessionState {
                access_token: Some(auth.token.clone()),
                refresh_token: auth.refresh_token.clone(),
                cached_user: Some(auth.user.clone()),
            };
        }
        self.persist(|store| {
            store.clear_auth()?;
            store.set(KEY_AUTH_TOKEN, &auth.token)?;
            if let Some(refresh) = &auth.refresh_token {
                store.set(KEY_REFRESH_TOKEN, refresh)?;
            }
            store.set_cached_user(&auth.user)
        });
        info!(
            component = "session",
            event = "session.established",
            user_email = %auth.user.email,
            has_refresh_token = auth.refresh_token.is_some(),
            "Session established"
        );
        self.signals.emit(&SessionSignal::LoggedIn);
    }

    /// Store a refreshed access token; the refresh token rotates only when
    /// the server hands out a new one.
    pub fn update_tokens(&self, access_token: &str, refresh_token: Option<&str>) {
        {
            let mut state = self.lock();
            state.access_token = Some(access_token.to_string());
            if let Some(refresh) = refresh_token {
                state.refresh_token = Some(refresh.to_string());
            }
        }
        self.persist(|store| {
            store.set(KEY_AUTH_TOKEN, access_token)?;
            if let Some(refresh) = refresh_token {
                store.set(KEY_REFRESH_TOKEN, refresh)?;
            }
            Ok(())
        });
    }

    pub fn set_cached_user(&self, user: &User) {
        self.lock().cached_user = Some(user.clone());
        self.persist(|store| store.set_cached_user(user));
    }

    /// Drop the session and emit `LoggedOut`
    pub fn logout(&self) {
        self.clear();
        info!(component = "session", event = "session.logged_out", "Logged out");
        self.signals.emit(&SessionSignal::LoggedOut);
    }

    /// Drop the session after a terminal auth failure. Emits `Unauthorized`
    /// only if there was something to clear, so a failure chain that reaches
    /// this point more than once signals once. Returns whether it did.
    pub fn clear_and_signal_unauthorized(&self) -> bool {
        if !self.clear() {
            return false;
        }
        warn!(
            component = "session",
            event = "session.unauthorized",
            "Session rejected by server, cleared"
        );
        self.signals.emit(&SessionSignal::Unauthorized);
        true
    }

    pub fn theme(&self) -> Result<Option<Theme>, StoreError> {
        self.store.theme()
    }

    pub fn set_theme(&self, theme: Theme) -> Result<(), StoreError> {
        self.store.set_theme(theme)
    }

    /// Returns true if a non-empty session was cleared
    fn clear(&self) -> bool {
        let had_session = {
            let mut state = self.lock();
            let had = !state.is_empty();
            *state = SessionState::default();
            had
        };
        self.persist(TokenStore::clear_auth);
        had_session
    }

    fn persist(&self, write: impl FnOnce(&TokenStore) -> Result<(), StoreError>) {
        if let Err(e) = write(&self.store) {
            warn!(
                component = "session",
                event = "session.persist_failed",
                error = %e,
                "Failed to persist session state"
            );
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    fn auth(token: &str, refresh: Option<&str>) -> AuthResponse {
        AuthResponse {
            user: User {
                id: "u1".into(),
                email: "a@b.com".into(),
                name: "A".into(),
            },
            token: token.into(),
            refresh_token: refresh.map(str::to_string),
        }
    }

    fn manager() -> SessionManager {
        SessionManager::load(TokenStore::in_memory().unwrap()).unwrap()
    }

    #[test]
    fn establish_persists_and_signals() {
        let session = manager();
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = seen.clone();
            session
                .signals()
                .subscribe(move |s| seen.lock().unwrap().push(s.clone()));
        }

        session.establish(&auth("access-1", Some("refresh-1")));

        assert_eq!(session.access_token().as_deref(), Some("access-1"));
        assert_eq!(session.store.refresh_token().unwrap().as_deref(), Some("refresh-1"));
        assert_eq!(session.store.cached_user().unwrap().unwrap().email, "a@b.com");
        assert_eq!(*seen.lock().unwrap(), vec![SessionSignal::LoggedIn]);
    }

    #[test]
    fn update_tokens_keeps_refresh_token_unless_rotated() {
        let session = manager();
        session.establish(&auth("access-1", Some("refresh-1")));

        session.update_tokens("access-2", None);
        assert_eq!(session.access_token().as_deref(), Some("access-2"));
        assert_eq!(session.refresh_token().as_deref(), Some("refresh-1"));

        session.update_tokens("access-3", Some("refresh-2"));
        assert_eq!(session.store.access_token().unwrap().as_deref(), Some("access-3"));
        assert_eq!(session.store.refresh_token().unwrap().as_deref(), Some("refresh-2"));
    }

    #[test]
    fn unauthorized_signals_once_per_session() {
        let session = manager();
        let hits = Arc::new(AtomicUsize::new(0));
        {
            let hits = hits.clone();
            session.signals().subscribe(move |s| {
                if *s == SessionSignal::Unauthorized {
                    hits.fetch_add(1, Ordering::SeqCst);
                }
            });
        }
        session.establish(&auth("access-1", None));

        assert!(session.clear_and_signal_unauthorized());
        assert!(!session.clear_and_signal_unauthorized());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!session.has_token());
        assert_eq!(session.store.access_token().unwrap(), None);
    }

    #[test]
    fn load_restores_previous_session() {
        let store = TokenStore::in_memory().unwrap();
        store.set(KEY_AUTH_TOKEN, "persisted").unwrap();
        let session = SessionManager::load(store).unwrap();
        assert!(session.has_token());
        assert_eq!(session.cached_user(), None);
    }
}
