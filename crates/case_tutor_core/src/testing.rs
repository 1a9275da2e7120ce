//! Fixtures and port fakes shared by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::domain::{
    CaseStep, ClinicalCase, ClinicalSession, Difficulty, Feedback, FeedbackRequest,
    SessionStatus, UserProfile, UserRole,
};
use crate::ports::{FeedbackOracle, KeyValueStore, PortError, PortResult, RemoteStore};

//=========================================================================================
// Fixtures
//=========================================================================================

pub fn profile(id: &str, email: &str, role: UserRole) -> UserProfile {
    UserProfile {
        id: id.to_string(),
        email: email.to_string(),
        name: format!("User {}", id),
        role,
        created_at: Utc::now(),
    }
}

pub fn sample_case(id: &str, steps: usize) -> ClinicalCase {
    ClinicalCase {
        id: id.to_string(),
        title: format!("Case {}", id),
        theme: "Cornea".to_string(),
        difficulty: Difficulty::Easy,
        tags: vec!["test".to_string()],
        steps: (0..steps)
            .map(|i| CaseStep {
                title: format!("Step {}", i + 1),
                content: format!("Findings for step {}", i + 1),
                question: format!("Question {}?", i + 1),
            })
            .collect(),
        created_at: Utc::now(),
        created_by: "prof".to_string(),
    }
}

pub fn session_for(id: &str, student_id: &str, case: &ClinicalCase) -> ClinicalSession {
    let mut session = crate::session::new_session(student_id, case, Utc::now());
    session.id = id.to_string();
    session
}

pub fn completed_session(
    id: &str,
    student_id: &str,
    case: &ClinicalCase,
    total_score: f64,
) -> ClinicalSession {
    let mut session = session_for(id, student_id, case);
    session.status = SessionStatus::Completed;
    session.current_step = case.last_step_index();
    session.total_score = total_score;
    session.finished_at = Some(Utc::now());
    session
}

//=========================================================================================
// Fakes
//=========================================================================================

/// A `KeyValueStore` that fails every call.
pub struct BrokenKv;

#[async_trait]
impl KeyValueStore for BrokenKv {
    async fn get(&self, key: &str) -> PortResult<Option<String>> {
        Err(PortError::Unavailable(format!("cannot read '{}'", key)))
    }

    async fn set(&self, key: &str, _value: String) -> PortResult<()> {
        Err(PortError::Unavailable(format!("cannot write '{}'", key)))
    }
}

/// An in-memory remote backend that can be switched offline.
pub struct FakeRemote {
    online: AtomicBool,
    profiles: Mutex<Vec<UserProfile>>,
    cases: Mutex<Vec<ClinicalCase>>,
    sessions: Mutex<Vec<ClinicalSession>>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self {
            online: AtomicBool::new(true),
            profiles: Mutex::new(Vec::new()),
            cases: Mutex::new(Vec::new()),
            sessions: Mutex::new(Vec::new()),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn cases(&self) -> Vec<ClinicalCase> {
        self.cases.lock().unwrap().clone()
    }

    pub fn sessions(&self) -> Vec<ClinicalSession> {
        self.sessions.lock().unwrap().clone()
    }

    /// Writes a session directly, as another device would.
    pub fn put_session(&self, session: ClinicalSession) {
        let mut sessions = self.sessions.lock().unwrap();
        sessions.retain(|s| s.id != session.id);
        sessions.push(session);
    }

    fn check(&self) -> PortResult<()> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(PortError::Unavailable("remote offline".to_string()))
        }
    }
}

#[async_trait]
impl RemoteStore for FakeRemote {
    async fn find_profile_by_email(&self, email: &str) -> PortResult<UserProfile> {
        self.check()?;
        self.profiles
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.email == email)
            .cloned()
            .ok_or_else(|| PortError::NotFound(email.to_string()))
    }

    async fn upsert_profile(&self, profile: &UserProfile) -> PortResult<()> {
        self.check()?;
        let mut profiles = self.profiles.lock().unwrap();
        profiles.retain(|p| p.email != profile.email);
        profiles.push(profile.clone());
        Ok(())
    }

    async fn list_students(&self) -> PortResult<Vec<UserProfile>> {
        self.check()?;
        Ok(self
            .profiles
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.role == UserRole::Student)
            .cloned()
            .collect())
    }

    async fn list_cases(&self) -> PortResult<Vec<ClinicalCase>> {
        self.check()?;
        let mut cases = self.cases();
        cases.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(cases)
    }

    async fn upsert_case(&self, case: &ClinicalCase) -> PortResult<()> {
        self.check()?;
        let mut cases = self.cases.lock().unwrap();
        cases.retain(|c| c.id != case.id);
        cases.push(case.clone());
        Ok(())
    }

    async fn delete_case(&self, case_id: &str) -> PortResult<()> {
        self.check()?;
        self.cases.lock().unwrap().retain(|c| c.id != case_id);
        Ok(())
    }

    async fn list_sessions(&self) -> PortResult<Vec<ClinicalSession>> {
        self.check()?;
        Ok(self.sessions())
    }

    async fn list_sessions_for_student(&self, student_id: &str) -> PortResult<Vec<ClinicalSession>> {
        self.check()?;
        Ok(self
            .sessions()
            .into_iter()
            .filter(|s| s.student_id == student_id)
            .collect())
    }

    async fn find_session(&self, session_id: &str) -> PortResult<ClinicalSession> {
        self.check()?;
        self.sessions()
            .into_iter()
            .find(|s| s.id == session_id)
            .ok_or_else(|| PortError::NotFound(session_id.to_string()))
    }

    async fn upsert_session(&self, session: &ClinicalSession) -> PortResult<()> {
        self.check()?;
        self.put_session(session.clone());
        Ok(())
    }
}

/// Replays a fixed list of answers, then scores everything 1.
pub struct ScriptedOracle {
    replies: Mutex<VecDeque<PortResult<Feedback>>>,
    calls: AtomicUsize,
}

impl ScriptedOracle {
    pub fn new(replies: Vec<PortResult<Feedback>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn scores(scores: &[f64]) -> Self {
        Self::new(
            scores
                .iter()
                .map(|&score| {
                    Ok(Feedback {
                        feedback: format!("Scored {}", score),
                        score,
                        justification: String::new(),
                    })
                })
                .collect(),
        )
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedbackOracle for ScriptedOracle {
    async fn evaluate(&self, _request: &FeedbackRequest) -> PortResult<Feedback> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.replies.lock().unwrap().pop_front().unwrap_or_else(|| {
            Ok(Feedback {
                feedback: "Default".to_string(),
                score: 1.0,
                justification: String::new(),
            })
        })
    }
}

/// Never answers.
pub struct HangingOracle;

#[async_trait]
impl FeedbackOracle for HangingOracle {
    async fn evaluate(&self, _request: &FeedbackRequest) -> PortResult<Feedback> {
        std::future::pending().await
    }
}
