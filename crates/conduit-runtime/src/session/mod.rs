//! In-memory conversation sessions.

mod config;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use conduit_core::{Error, Message, Result};
use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;

pub use config::{DEFAULT_MAX_SESSIONS, SessionConfig};

use crate::TRACING_TARGET_SESSION;

#[derive(Default)]
struct Session {
    history: Mutex<Vec<Message>>,
    turn_lock: Arc<tokio::sync::Mutex<()>>,
    cancel: Mutex<Option<CancellationToken>>,
    last_turn: AtomicU64,
}

/// Exclusive right to run a turn in one session.
///
/// Dropping the guard ends the turn and forgets its cancellation token.
pub struct TurnGuard {
    session_id: String,
    session: Arc<Session>,
    _lock: OwnedMutexGuard<()>,
}

impl std::fmt::Debug for TurnGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnGuard")
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

impl TurnGuard {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Appends messages to the session history.
    pub fn append(&self, messages: impl IntoIterator<Item = Message>) {
        self.session
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(messages);
    }
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        self.session
            .cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

/// Per-session history and turn exclusivity.
///
/// A session runs at most one turn at a time; different sessions never
/// share turn state. Once `capacity` sessions exist, creating another
/// drops the idle session whose last turn started earliest. This type is
/// cheap to clone; clones share sessions.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, Arc<Session>>>>,
    clock: Arc<AtomicU64>,
    capacity: usize,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MAX_SESSIONS)
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("sessions", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding at most `capacity` idle sessions.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            sessions: Arc::default(),
            clock: Arc::default(),
            capacity: capacity.max(1),
        }
    }

    fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .cloned()
    }

    fn get_or_create(&self, session_id: &str) -> Arc<Session> {
        if let Some(session) = self.get(session_id) {
            return session;
        }

        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(session) = sessions.get(session_id) {
            return session.clone();
        }

        if sessions.len() >= self.capacity {
            Self::evict_idle(&mut sessions);
        }

        tracing::debug!(target: TRACING_TARGET_SESSION, session_id, "Session created");
        let session = Arc::<Session>::default();
        sessions.insert(session_id.to_owned(), session.clone());
        session
    }

    /// Drops the idle session whose last turn started earliest.
    ///
    /// A session referenced outside the map is running a turn or being read,
    /// and is never dropped. When every session is in use the store grows
    /// past its capacity.
    fn evict_idle(sessions: &mut HashMap<String, Arc<Session>>) {
        let oldest = sessions
            .iter()
            .filter(|(_, session)| Arc::strong_count(session) == 1)
            .min_by_key(|(_, session)| session.last_turn.load(Ordering::Relaxed))
            .map(|(id, _)| id.clone());

        match oldest {
            Some(session_id) => {
                sessions.remove(&session_id);
                tracing::debug!(target: TRACING_TARGET_SESSION, %session_id, "Idle session evicted");
            }
            None => {
                tracing::warn!(
                    target: TRACING_TARGET_SESSION,
                    sessions = sessions.len(),
                    "Session store over capacity, every session is busy"
                );
            }
        }
    }

    /// Starts a turn, registering `cancel` as the session's cancellation token.
    ///
    /// # Errors
    ///
    /// Fails with `turn_in_progress` when the session is already running a turn.
    pub fn begin_turn(&self, session_id: &str, cancel: CancellationToken) -> Result<TurnGuard> {
        let session = self.get_or_create(session_id);
        let lock = session.turn_lock.clone().try_lock_owned().map_err(|_| {
            Error::turn_in_progress()
                .with_message(format!("session `{session_id}` is already running a turn"))
        })?;

        *session.cancel.lock().unwrap_or_else(PoisonError::into_inner) = Some(cancel);
        let tick = self.clock.fetch_add(1, Ordering::Relaxed) + 1;
        session.last_turn.store(tick, Ordering::Relaxed);

        Ok(TurnGuard {
            session_id: session_id.to_owned(),
            session,
            _lock: lock,
        })
    }

    /// Cancels the running turn of a session; returns whether one was running.
    pub fn cancel(&self, session_id: &str) -> bool {
        let Some(session) = self.get(session_id) else {
            return false;
        };

        let token = session
            .cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        match token {
            Some(token) => {
                tracing::info!(target: TRACING_TARGET_SESSION, session_id, "Cancelling turn");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Returns whether a turn is running in the session.
    pub fn is_busy(&self, session_id: &str) -> bool {
        self.get(session_id)
            .is_some_and(|session| session.turn_lock.try_lock().is_err())
    }

    /// Returns the whole history of a session, oldest first.
    pub fn history(&self, session_id: &str) -> Vec<Message> {
        self.get(session_id)
            .map(|session| {
                session
                    .history
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone()
            })
            .unwrap_or_default()
    }

    /// Returns at most the last `window` messages of a session.
    pub fn recent(&self, session_id: &str, window: usize) -> Vec<Message> {
        let mut history = self.history(session_id);
        let skip = history.len().saturating_sub(window);
        history.drain(..skip);
        history
    }

    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_turn_per_session() {
        let store = SessionStore::new();

        let guard = store.begin_turn("a", CancellationToken::new()).unwrap();
        let error = store.begin_turn("a", CancellationToken::new()).unwrap_err();
        assert_eq!(error.kind(), conduit_core::ErrorKind::TurnInProgress);

        // Other sessions are independent.
        let other = store.begin_turn("b", CancellationToken::new()).unwrap();
        assert!(store.is_busy("a") && store.is_busy("b"));

        drop(guard);
        drop(other);
        assert!(!store.is_busy("a"));
        assert!(store.begin_turn("a", CancellationToken::new()).is_ok());
    }

    #[test]
    fn cancel_reaches_only_the_running_turn() {
        let store = SessionStore::new();
        let token = CancellationToken::new();
        let guard = store.begin_turn("a", token.clone()).unwrap();

        assert!(!store.cancel("b"));
        assert!(store.cancel("a"));
        assert!(token.is_cancelled());

        drop(guard);
        assert!(!store.cancel("a"));
    }

    #[test]
    fn recent_returns_the_tail_of_history() {
        let store = SessionStore::new();
        let guard = store.begin_turn("a", CancellationToken::new()).unwrap();
        guard.append((0..5).map(|i| Message::user(format!("m{i}"))));
        drop(guard);

        let recent: Vec<_> = store.recent("a", 2).into_iter().map(|m| m.content).collect();
        assert_eq!(recent, ["m3", "m4"]);
        assert_eq!(store.recent("a", 10).len(), 5);
        assert!(store.history("missing").is_empty());
    }

    #[test]
    fn full_store_evicts_the_least_recently_active_idle_session() {
        let store = SessionStore::with_capacity(2);
        for id in ["a", "b", "a"] {
            let guard = store.begin_turn(id, CancellationToken::new()).unwrap();
            guard.append([Message::user(id)]);
        }

        drop(store.begin_turn("c", CancellationToken::new()).unwrap());
        assert_eq!(store.len(), 2);
        assert!(store.history("b").is_empty());
        assert_eq!(store.history("a").len(), 2);

        // Busy sessions are kept even when they are the oldest.
        let busy = store.begin_turn("a", CancellationToken::new()).unwrap();
        let _d = store.begin_turn("d", CancellationToken::new()).unwrap();
        assert!(store.is_busy("a"));
        assert!(store.history("c").is_empty());

        // With nothing idle the store grows past its capacity.
        let _e = store.begin_turn("e", CancellationToken::new()).unwrap();
        assert_eq!(store.len(), 3);
        drop(busy);
    }
}
