//! crates/case_tutor_core/src/mirror.rs
//!
//! The local tier of the dual-mode store. Each entity kind lives under one fixed,
//! namespaced key as a JSON array. There is no schema version; records written by an
//! older build load with defaults for any field they lack.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::error;

use crate::domain::{ClinicalCase, ClinicalSession, UserProfile};
use crate::ports::{KeyValueStore, PortResult};

pub const PROFILES_KEY: &str = "case_tutor.profiles";
pub const CASES_KEY: &str = "case_tutor.cases";
pub const SESSIONS_KEY: &str = "case_tutor.sessions";

//=========================================================================================
// LocalMirror
//=========================================================================================

/// Typed access to the three local collections.
///
/// Failures never escape: a read that cannot be completed yields an empty collection
/// and a write that cannot be completed is logged.
pub struct LocalMirror {
    kv: Arc<dyn KeyValueStore>,
    /// Serializes read-modify-write cycles so two upserts cannot drop each other.
    write_lock: Mutex<()>,
}

impl LocalMirror {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            write_lock: Mutex::new(()),
        }
    }

    async fn load<T: DeserializeOwned>(&self, key: &str) -> Vec<T> {
        let raw = match self.kv.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                error!("Local mirror read of '{}' failed: {}", key, e);
                return Vec::new();
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            error!("Local mirror entry '{}' is not valid JSON: {}", key, e);
            Vec::new()
        })
    }

    async fn save<T: Serialize>(&self, key: &str, items: &[T]) {
        let raw = match serde_json::to_string(items) {
            Ok(raw) => raw,
            Err(e) => {
                error!("Failed to encode local mirror entry '{}': {}", key, e);
                return;
            }
        };
        if let Err(e) = self.kv.set(key, raw).await {
            error!("Local mirror write of '{}' failed: {}", key, e);
        }
    }

    /// Replaces the first item matching `same` or appends `item`.
    async fn upsert<T, F>(&self, key: &str, item: &T, same: F)
    where
        T: Serialize + DeserializeOwned + Clone,
        F: Fn(&T) -> bool,
    {
        let _guard = self.write_lock.lock().await;
        let mut items: Vec<T> = self.load(key).await;
        match items.iter_mut().find(|existing| same(existing)) {
            Some(slot) => *slot = item.clone(),
            None => items.push(item.clone()),
        }
        self.save(key, &items).await;
    }

    // --- Profiles ---

    pub async fn profiles(&self) -> Vec<UserProfile> {
        self.load(PROFILES_KEY).await
    }

    /// Upsert keyed by email.
    pub async fn upsert_profile(&self, profile: &UserProfile) {
        self.upsert(PROFILES_KEY, profile, |p: &UserProfile| p.email == profile.email)
            .await;
    }

    // --- Cases ---

    pub async fn cases(&self) -> Vec<ClinicalCase> {
        self.load(CASES_KEY).await
    }

    pub async fn upsert_case(&self, case: &ClinicalCase) {
        self.upsert(CASES_KEY, case, |c: &ClinicalCase| c.id == case.id).await;
    }

    pub async fn remove_case(&self, case_id: &str) {
        let _guard = self.write_lock.lock().await;
        let mut cases: Vec<ClinicalCase> = self.load(CASES_KEY).await;
        cases.retain(|c| c.id != case_id);
        self.save(CASES_KEY, &cases).await;
    }

    // --- Sessions ---

    pub async fn sessions(&self) -> Vec<ClinicalSession> {
        self.load(SESSIONS_KEY).await
    }

    pub async fn upsert_session(&self, session: &ClinicalSession) {
        self.upsert(SESSIONS_KEY, session, |s: &ClinicalSession| s.id == session.id)
            .await;
    }
}

//=========================================================================================
// MemoryKv
//=========================================================================================

/// A process-local `KeyValueStore`. Contents are lost when the process exits.
#[derive(Default)]
pub struct MemoryKv {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKv {
    async fn get(&self, key: &str) -> PortResult<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> PortResult<()> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }
}
