//! Single-flight token refresh.
//!
//! At most one refresh is in flight per process. Callers arriving while it
//! runs join the same [`Shared`] future and observe the same outcome. The
//! slot is cleared by the future itself once the new tokens are persisted,
//! so the next expiry starts a fresh refresh.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::{BoxFuture, FutureExt, Shared};

use crate::error::ApiError;

pub type RefreshOutcome = Result<String, ApiError>;
pub type SharedRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

#[derive(Clone, Default)]
pub struct RefreshFlight {
    slot: Arc<Mutex<Option<SharedRefresh>>>,
}

impl RefreshFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the in-flight refresh, or start one with `start`. The flag is
    /// true when this call started it.
    pub fn join_or_start<F>(&self, start: impl FnOnce() -> F) -> (SharedRefresh, bool)
    where
        F: Future<Output = RefreshOutcome> + Send + 'static,
    {
        let mut slot = lock(&self.slot);
        if let Some(in_flight) = slot.as_ref() {
            return (in_flight.clone(), false);
        }

        let refresh = start();
        let clear = self.slot.clone();
        let shared = async move {
            let outcome = refresh.await;
            *lock(&clear) = None;
            outcome
        }
        .boxed()
        .shared();

        *slot = Some(shared.clone());
        (shared, true)
    }

    pub fn in_flight(&self) -> bool {
        lock(&self.slot).is_some()
    }
}

fn lock(slot: &Mutex<Option<SharedRefresh>>) -> MutexGuard<'_, Option<SharedRefresh>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
