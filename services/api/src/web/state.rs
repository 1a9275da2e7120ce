//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use case_tutor_core::{
    domain::UserProfile, ports::FeedbackOracle, session::SessionRunner, store::DualModeStore,
};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

/// How long a sign-in stays valid. Matches the cookie's `Max-Age`.
pub fn auth_session_ttl() -> Duration {
    Duration::days(30)
}

struct AuthSession {
    profile: UserProfile,
    expires_at: DateTime<Utc>,
}

type SessionLocks = StdMutex<HashMap<String, Arc<Mutex<()>>>>;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
pub struct AppState {
    pub store: Arc<DualModeStore>,
    pub runner: Arc<SessionRunner>,
    pub config: Arc<Config>,
    /// Auth session token -> signed-in profile. Lost on restart.
    auth_sessions: RwLock<HashMap<String, AuthSession>>,
    /// One lock per clinical session id with an answer in flight.
    session_locks: SessionLocks,
}

impl AppState {
    pub fn new(
        store: Arc<DualModeStore>,
        oracle: Arc<dyn FeedbackOracle>,
        config: Arc<Config>,
    ) -> Self {
        let runner = Arc::new(SessionRunner::new(
            store.clone(),
            oracle,
            config.oracle_timeout,
        ));
        Self {
            store,
            runner,
            config,
            auth_sessions: RwLock::new(HashMap::new()),
            session_locks: StdMutex::new(HashMap::new()),
        }
    }

    // --- Auth Sessions ---

    /// Signs `profile` in and returns the new auth session token.
    pub async fn create_auth_session(&self, profile: UserProfile) -> String {
        self.create_auth_session_at(profile, Utc::now()).await
    }

    async fn create_auth_session_at(&self, profile: UserProfile, now: DateTime<Utc>) -> String {
        let token = Uuid::new_v4().to_string();
        let mut sessions = self.auth_sessions.write().await;
        sessions.retain(|_, s| s.expires_at > now);
        sessions.insert(
            token.clone(),
            AuthSession {
                profile,
                expires_at: now + auth_session_ttl(),
            },
        );
        token
    }

    pub async fn validate_auth_session(&self, token: &str) -> Option<UserProfile> {
        self.validate_auth_session_at(token, Utc::now()).await
    }

    async fn validate_auth_session_at(&self, token: &str, now: DateTime<Utc>) -> Option<UserProfile> {
        {
            let sessions = self.auth_sessions.read().await;
            match sessions.get(token) {
                None => return None,
                Some(s) if s.expires_at > now => return Some(s.profile.clone()),
                Some(_) => {}
            }
        }
        // Expired: forget it.
        self.auth_sessions.write().await.remove(token);
        None
    }

    /// Returns `true` if the token was signed in.
    pub async fn delete_auth_session(&self, token: &str) -> bool {
        self.auth_sessions.write().await.remove(token).is_some()
    }

    // --- Per-Session Answer Locks ---

    /// Waits until no other request is working on `session_id`.
    ///
    /// The map entry is dropped with the last guard, so only ids with a request in
    /// flight are remembered.
    pub async fn lock_session(&self, session_id: &str) -> SessionGuard<'_> {
        let lock = {
            let mut locks = self
                .session_locks
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            locks
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let guard = lock.lock_owned().await;
        SessionGuard {
            locks: &self.session_locks,
            session_id: session_id.to_string(),
            guard: Some(guard),
        }
    }
}

/// Holds a clinical session's answer lock until dropped.
pub struct SessionGuard<'a> {
    locks: &'a SessionLocks,
    session_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        // Release the lock itself first so its Arc count reflects only waiters.
        drop(self.guard.take());
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(lock) = locks.get(&self.session_id) {
            if Arc::strong_count(lock) == 1 {
                locks.remove(&self.session_id);
            }
        }
    }
}
