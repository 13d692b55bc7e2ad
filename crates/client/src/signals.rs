//! In-process observer registry.
//!
//! Observers are plain callbacks run synchronously on the emitting task, in
//! registration order. They must not block; anything slow belongs in a
//! spawned task or behind a channel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Session lifecycle notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionSignal {
    /// Credentials were rejected for good; the session has been cleared
    Unauthorized,
    LoggedIn,
    LoggedOut,
}

/// Project-list changes made through this client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectSignal {
    Created(String),
    Deleted(String),
}

type Observer<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Returned by [`Signals::subscribe`]; pass to [`Signals::unsubscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

pub struct Signals<T> {
    next_id: AtomicU64,
    observers: Mutex<Vec<(ObserverId, Observer<T>)>>,
}

impl<T> Default for Signals<T> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            observers: Mutex::new(Vec::new()),
        }
    }
}

impl<T> Signals<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, observer: impl Fn(&T) + Send + Sync + 'static) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, Arc::new(observer)));
        id
    }

    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut observers = self.lock();
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    /// Deliver `signal` to every observer. The registry lock is released
    /// before callbacks run, so observers may subscribe or emit themselves.
    pub fn emit(&self, signal: &T) {
        let observers: Vec<Observer<T>> = self.lock().iter().map(|(_, o)| o.clone()).collect();
        for observer in observers {
            observer(signal);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(ObserverId, Observer<T>)>> {
        self.observers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_in_registration_order() {
        let signals = Signals::<SessionSignal>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second"] {
            let seen = seen.clone();
            signals.subscribe(move |signal: &SessionSignal| {
                seen.lock().unwrap().push((tag, signal.clone()));
            });
        }

        signals.emit(&SessionSignal::LoggedIn);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                ("first", SessionSignal::LoggedIn),
                ("second", SessionSignal::LoggedIn)
            ]
        );
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let signals = Signals::<ProjectSignal>::new();
        let hits = Arc::new(AtomicU64::new(0));
        let id = {
            let hits = hits.clone();
            signals.subscribe(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };

        signals.emit(&ProjectSignal::Created("p1".into()));
        assert!(signals.unsubscribe(id));
        assert!(!signals.unsubscribe(id));
        signals.emit(&ProjectSignal::Deleted("p1".into()));

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(signals.is_empty());
    }

    #[test]
    fn observer_may_emit_reentrantly() {
        let signals = Arc::new(Signals::<SessionSignal>::new());
        let hits = Arc::new(AtomicU64::new(0));
        {
            let inner = signals.clone();
            let hits = hits.clone();
            signals.subscribe(move |signal| {
                hits.fetch_add(1, Ordering::SeqCst);
                if *signal == SessionSignal::Unauthorized {
                    inner.emit(&SessionSignal::LoggedOut);
                }
            });
        }

        signals.emit(&SessionSignal::Unauthorized);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
