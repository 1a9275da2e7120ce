//! crates/case_tutor_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the concrete database, local storage and LLM implementations.

use async_trait::async_trait;

use crate::domain::{ClinicalCase, ClinicalSession, Feedback, FeedbackRequest, UserProfile};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    /// The backend answered, and the entity does not exist.
    #[error("Item not found: {0}")]
    NotFound(String),
    /// The backend could not be reached or did not answer usefully.
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// The shared remote backend: `profiles`, `cases` and `sessions` collections.
///
/// Point lookups must return `PortError::NotFound` when the backend answered and has no
/// such row, and `PortError::Unavailable` for connection-level failures.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    // --- Profiles ---
    async fn find_profile_by_email(&self, email: &str) -> PortResult<UserProfile>;

    async fn upsert_profile(&self, profile: &UserProfile) -> PortResult<()>;

    async fn list_students(&self) -> PortResult<Vec<UserProfile>>;

    // --- Cases (newest first) ---
    async fn list_cases(&self) -> PortResult<Vec<ClinicalCase>>;

    async fn upsert_case(&self, case: &ClinicalCase) -> PortResult<()>;

    async fn delete_case(&self, case_id: &str) -> PortResult<()>;

    // --- Sessions (newest first) ---
    async fn list_sessions(&self) -> PortResult<Vec<ClinicalSession>>;

    async fn list_sessions_for_student(&self, student_id: &str) -> PortResult<Vec<ClinicalSession>>;

    async fn find_session(&self, session_id: &str) -> PortResult<ClinicalSession>;

    async fn upsert_session(&self, session: &ClinicalSession) -> PortResult<()>;
}

/// A device-local string key-value store (the local mirror's backing storage).
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Returns `Ok(None)` when nothing has been stored under `key` yet.
    async fn get(&self, key: &str) -> PortResult<Option<String>>;

    async fn set(&self, key: &str, value: String) -> PortResult<()>;
}

#[async_trait]
pub trait FeedbackOracle: Send + Sync {
    /// Scores a student's free-text answer to one step of a case.
    async fn evaluate(&self, request: &FeedbackRequest) -> PortResult<Feedback>;
}
