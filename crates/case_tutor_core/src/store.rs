//! crates/case_tutor_core/src/store.rs
//!
//! The dual-mode persistence façade. Every read tries the remote backend first and falls
//! back to the local mirror; every write lands in the local mirror before the remote
//! backend is attempted. The two tiers are never reconciled with each other.
//!
//! No method here returns an error. Remote failures are logged and absorbed, so the
//! application keeps working in a fully local mode.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::catalog;
use crate::domain::{ClinicalCase, ClinicalSession, UserProfile, UserRole};
use crate::mirror::LocalMirror;
use crate::ports::{KeyValueStore, PortError, PortResult, RemoteStore};

//=========================================================================================
// Lookup
//=========================================================================================

/// The result of a point read across both tiers.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    Found(T),
    /// Every tier that could be asked answered "no such entity".
    NotFound,
    /// The remote tier failed and the local mirror had nothing, so absence is unconfirmed.
    Unreachable,
}

impl<T> Lookup<T> {
    /// Combines the local mirror's answer with whether the remote tier failed.
    fn from_fallback(local: Option<T>, remote_failed: bool) -> Self {
        match (local, remote_failed) {
            (Some(found), _) => Lookup::Found(found),
            (None, true) => Lookup::Unreachable,
            (None, false) => Lookup::NotFound,
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::NotFound | Lookup::Unreachable => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }
}

//=========================================================================================
// DualModeStore
//=========================================================================================

pub struct DualModeStore {
    remote: Option<Arc<dyn RemoteStore>>,
    local: LocalMirror,
}

impl DualModeStore {
    /// Creates a store. Pass `None` for `remote` to run local-only.
    pub fn new(remote: Option<Arc<dyn RemoteStore>>, local: Arc<dyn KeyValueStore>) -> Self {
        Self {
            remote,
            local: LocalMirror::new(local),
        }
    }

    pub fn local_only(local: Arc<dyn KeyValueStore>) -> Self {
        Self::new(None, local)
    }

    pub fn is_remote_enabled(&self) -> bool {
        self.remote.is_some()
    }

    fn remote(&self) -> Option<&dyn RemoteStore> {
        self.remote.as_deref()
    }

    // --- Profiles ---

    pub async fn get_profile(&self, email: &str) -> Lookup<UserProfile> {
        let mut remote_failed = false;
        if let Some(remote) = self.remote() {
            match remote.find_profile_by_email(email).await {
                Ok(profile) => return Lookup::Found(profile),
                Err(PortError::NotFound(_)) => debug!("Profile {} not found remotely", email),
                Err(e) => {
                    warn!("Remote profile lookup failed, using local mirror: {}", e);
                    remote_failed = true;
                }
            }
        }

        let local = self
            .local
            .profiles()
            .await
            .into_iter()
            .find(|p| p.email == email);
        Lookup::from_fallback(local, remote_failed)
    }

    pub async fn save_profile(&self, profile: &UserProfile) {
        self.local.upsert_profile(profile).await;
        if let Some(remote) = self.remote() {
            log_remote_write("profile", &profile.email, remote.upsert_profile(profile).await);
        }
    }

    pub async fn get_all_students(&self) -> Vec<UserProfile> {
        if let Some(remote) = self.remote() {
            if let Some(students) = usable_rows("students", remote.list_students().await) {
                return students;
            }
        }

        self.local
            .profiles()
            .await
            .into_iter()
            .filter(|p| p.role == UserRole::Student)
            .collect()
    }

    // --- Cases ---

    /// Lists the catalog, newest first. Never empty: with nothing stored anywhere, the
    /// built-in seed case is returned.
    pub async fn get_cases(&self) -> Vec<ClinicalCase> {
        if let Some(remote) = self.remote() {
            if let Some(cases) = usable_rows("cases", remote.list_cases().await) {
                return cases;
            }
        }

        let mut cases = self.local.cases().await;
        if cases.is_empty() {
            info!("No cases stored in any tier; serving the seed case.");
            return vec![catalog::seed_case()];
        }
        cases.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        cases
    }

    pub async fn save_case(&self, case: &ClinicalCase) {
        self.local.upsert_case(case).await;
        if let Some(remote) = self.remote() {
            log_remote_write("case", &case.id, remote.upsert_case(case).await);
        }
    }

    /// Finds one case of the catalog. The seed case stays resolvable after other cases
    /// replace it in listings, so sessions started on it can still be continued.
    pub async fn find_case(&self, case_id: &str) -> Option<ClinicalCase> {
        let found = self.get_cases().await.into_iter().find(|c| c.id == case_id);
        found.or_else(|| (case_id == catalog::SEED_CASE_ID).then(catalog::seed_case))
    }

    pub async fn delete_case(&self, case_id: &str) {
        self.local.remove_case(case_id).await;
        if let Some(remote) = self.remote() {
            log_remote_write("case deletion", case_id, remote.delete_case(case_id).await);
        }
    }

    // --- Sessions ---

    /// All sessions of all students, newest first.
    pub async fn get_sessions(&self) -> Vec<ClinicalSession> {
        if let Some(remote) = self.remote() {
            if let Some(sessions) = usable_rows("sessions", remote.list_sessions().await) {
                return sessions;
            }
        }

        newest_first(self.local.sessions().await)
    }

    pub async fn get_user_sessions(&self, student_id: &str) -> Vec<ClinicalSession> {
        if let Some(remote) = self.remote() {
            let rows = remote.list_sessions_for_student(student_id).await;
            if let Some(sessions) = usable_rows("student sessions", rows) {
                return sessions;
            }
        }

        let mine = self
            .local
            .sessions()
            .await
            .into_iter()
            .filter(|s| s.student_id == student_id)
            .collect();
        newest_first(mine)
    }

    pub async fn save_session(&self, session: &ClinicalSession) {
        self.local.upsert_session(session).await;
        if let Some(remote) = self.remote() {
            log_remote_write("session", &session.id, remote.upsert_session(session).await);
        }
    }

    pub async fn get_session_by_id(&self, session_id: &str) -> Lookup<ClinicalSession> {
        let mut remote_failed = false;
        if let Some(remote) = self.remote() {
            match remote.find_session(session_id).await {
                Ok(session) => return Lookup::Found(session),
                Err(PortError::NotFound(_)) => debug!("Session {} not found remotely", session_id),
                Err(e) => {
                    warn!("Remote session lookup failed, using local mirror: {}", e);
                    remote_failed = true;
                }
            }
        }

        let local = self
            .local
            .sessions()
            .await
            .into_iter()
            .find(|s| s.id == session_id);
        Lookup::from_fallback(local, remote_failed)
    }
}

//=========================================================================================
// Helpers
//=========================================================================================

/// Remote rows worth serving. An empty or failed listing defers to the local mirror.
fn usable_rows<T>(what: &str, result: PortResult<Vec<T>>) -> Option<Vec<T>> {
    match result {
        Ok(rows) if !rows.is_empty() => Some(rows),
        Ok(_) => {
            debug!("Remote {} listing is empty; using local mirror.", what);
            None
        }
        Err(e) => {
            warn!("Remote {} listing failed, using local mirror: {}", what, e);
            None
        }
    }
}

fn log_remote_write(what: &str, key: &str, result: PortResult<()>) {
    if let Err(e) = result {
        warn!("Remote {} write for '{}' failed; kept locally only: {}", what, key, e);
    }
}

fn newest_first(mut sessions: Vec<ClinicalSession>) -> Vec<ClinicalSession> {
    sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    sessions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::MemoryKv;
    use crate::testing::{completed_session, profile, sample_case, session_for, FakeRemote};
    use chrono::{Duration, Utc};

    fn local_store() -> DualModeStore {
        DualModeStore::local_only(Arc::new(MemoryKv::new()))
    }

    fn hybrid_store() -> (Arc<FakeRemote>, DualModeStore) {
        let remote = Arc::new(FakeRemote::new());
        let store = DualModeStore::new(Some(remote.clone()), Arc::new(MemoryKv::new()));
        (remote, store)
    }

    #[test]
    fn remote_tier_is_reported_only_when_configured() {
        assert!(!local_store().is_remote_enabled());
        assert!(hybrid_store().1.is_remote_enabled());
    }

    #[tokio::test]
    async fn get_cases_never_returns_empty() {
        let store = local_store();
        let cases = store.get_cases().await;
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].id, catalog::SEED_CASE_ID);
    }

    #[tokio::test]
    async fn get_cases_with_empty_remote_serves_seed_case() {
        let (_, store) = hybrid_store();
        let cases = store.get_cases().await;
        assert_eq!(cases[0].id, catalog::SEED_CASE_ID);
    }

    #[tokio::test]
    async fn profile_round_trips_with_remote_unreachable() {
        let (remote, store) = hybrid_store();
        remote.set_online(false);
        let saved = profile("p1", "ana@school.edu", UserRole::Student);

        store.save_profile(&saved).await;

        assert_eq!(store.get_profile("ana@school.edu").await, Lookup::Found(saved));
    }

    #[tokio::test]
    async fn profile_lookup_distinguishes_missing_from_unreachable() {
        let (remote, store) = hybrid_store();
        assert_eq!(store.get_profile("nobody@school.edu").await, Lookup::NotFound);

        remote.set_online(false);
        assert_eq!(store.get_profile("nobody@school.edu").await, Lookup::Unreachable);
        assert_eq!(local_store().get_profile("nobody@school.edu").await, Lookup::NotFound);
    }

    #[tokio::test]
    async fn writes_reach_both_tiers() {
        let (remote, store) = hybrid_store();
        let case = sample_case("a", 3);

        store.save_case(&case).await;

        assert_eq!(remote.cases(), vec![case.clone()]);
        remote.set_online(false);
        assert_eq!(store.get_cases().await, vec![case]);
    }

    #[tokio::test]
    async fn remote_failure_on_write_is_swallowed() {
        let (remote, store) = hybrid_store();
        remote.set_online(false);
        let case = sample_case("a", 3);
        let session = session_for("s1", "p1", &case);

        store.save_session(&session).await;

        assert!(remote.sessions().is_empty());
        assert_eq!(store.get_session_by_id("s1").await, Lookup::Found(session));
    }

    #[tokio::test]
    async fn remote_answer_wins_over_local_mirror() {
        let (remote, store) = hybrid_store();
        let case = sample_case("a", 3);
        let mut session = session_for("s1", "p1", &case);
        store.save_session(&session).await;

        // Another device advanced the same session in the shared backend.
        session.current_step = 2;
        remote.put_session(session.clone());

        assert_eq!(store.get_session_by_id("s1").await, Lookup::Found(session));
    }

    #[tokio::test]
    async fn delete_case_removes_from_both_tiers() {
        let (remote, store) = hybrid_store();
        store.save_case(&sample_case("a", 2)).await;
        store.save_case(&sample_case("b", 2)).await;

        store.delete_case("a").await;

        let ids: Vec<_> = store.get_cases().await.into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["b".to_string()]);
        assert_eq!(remote.cases().len(), 1);
    }

    #[tokio::test]
    async fn seed_case_stays_resolvable() {
        let store = local_store();
        store.save_case(&sample_case("a", 2)).await;

        assert!(store.find_case("a").await.is_some());
        assert_eq!(
            store.find_case(catalog::SEED_CASE_ID).await.map(|c| c.steps.len()),
            Some(5)
        );
        assert!(store.find_case("missing").await.is_none());
    }

    #[tokio::test]
    async fn local_cases_are_listed_newest_first() {
        let store = local_store();
        let mut old = sample_case("old", 1);
        old.created_at = Utc::now() - Duration::days(3);
        let new = sample_case("new", 1);
        store.save_case(&old).await;
        store.save_case(&new).await;

        let ids: Vec<_> = store.get_cases().await.into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["new".to_string(), "old".to_string()]);
    }

    #[tokio::test]
    async fn students_are_filtered_by_role_in_fallback() {
        let store = local_store();
        store
            .save_profile(&profile("p1", "prof@school.edu", UserRole::Professor))
            .await;
        store
            .save_profile(&profile("s1", "ana@school.edu", UserRole::Student))
            .await;

        let students = store.get_all_students().await;
        assert_eq!(students.len(), 1);
        assert_eq!(students[0].id, "s1");
    }

    #[tokio::test]
    async fn user_sessions_are_filtered_by_student() {
        let (remote, store) = hybrid_store();
        remote.set_online(false);
        let case = sample_case("a", 2);
        store.save_session(&completed_session("s1", "ana", &case, 3.0)).await;
        store.save_session(&session_for("s2", "bia", &case)).await;

        let mine = store.get_user_sessions("ana").await;
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, "s1");
        assert_eq!(store.get_sessions().await.len(), 2);
    }
}
