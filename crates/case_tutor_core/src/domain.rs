//! crates/case_tutor_core/src/domain.rs
//!
//! Defines the core data structures for the application.
//! These structs are shared by both storage tiers, so they carry their own JSON shape:
//! snake_case fields, and defaults for anything added after a record was first stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

//=========================================================================================
// Users
//=========================================================================================

/// The two roles a registered user can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Student,
    Professor,
}

/// An identity record. Created at registration and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    /// Unique lookup key for both storage tiers.
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn is_professor(&self) -> bool {
        self.role == UserRole::Professor
    }
}

//=========================================================================================
// Cases
//=========================================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

/// One stage of a case: the scenario revealed at this point and the question asked about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseStep {
    pub title: String,
    pub content: String,
    pub question: String,
}

/// A teaching unit made of an ordered, non-empty sequence of steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicalCase {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub theme: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub tags: Vec<String>,
    pub steps: Vec<CaseStep>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub created_by: String,
}

impl ClinicalCase {
    /// Index of the final step. Cases always have at least one step.
    pub fn last_step_index(&self) -> usize {
        self.steps.len().saturating_sub(1)
    }
}

//=========================================================================================
// Sessions
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    /// Terminal.
    Completed,
}

/// A single answered step. Immutable once appended to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStep {
    pub step_index: usize,
    pub student_response: String,
    pub ai_feedback: String,
    pub partial_score: f64,
    pub timestamp: DateTime<Utc>,
}

/// One student's attempt at one case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicalSession {
    pub id: String,
    pub student_id: String,
    pub case_id: String,
    /// Copied from the case when the session starts, so it survives case deletion.
    #[serde(default)]
    pub case_title: String,
    pub status: SessionStatus,
    pub current_step: usize,
    pub total_score: f64,
    #[serde(default)]
    pub steps_data: Vec<SessionStep>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl ClinicalSession {
    pub fn is_completed(&self) -> bool {
        self.status == SessionStatus::Completed
    }
}

//=========================================================================================
// Feedback
//=========================================================================================

/// What the feedback oracle is asked about a single answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedbackRequest {
    pub case_title: String,
    pub theme: String,
    pub step_index: usize,
    pub step_count: usize,
    pub step_content: String,
    pub step_question: String,
    pub student_response: String,
}

impl FeedbackRequest {
    /// Builds the request for the given step of a case.
    /// Returns `None` if the case has no step at that index.
    pub fn for_step(case: &ClinicalCase, step_index: usize, student_response: &str) -> Option<Self> {
        let step = case.steps.get(step_index)?;
        Some(Self {
            case_title: case.title.clone(),
            theme: case.theme.clone(),
            step_index,
            step_count: case.steps.len(),
            step_content: step.content.clone(),
            step_question: step.question.clone(),
            student_response: student_response.to_string(),
        })
    }
}

/// The oracle's verdict on an answer. `score` is expected in `[0, 2]` but is not enforced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub feedback: String,
    pub score: f64,
    #[serde(default)]
    pub justification: String,
}

impl Feedback {
    /// The placeholder used whenever the oracle cannot produce a usable answer.
    pub fn degraded(reason: &str) -> Self {
        Self {
            feedback: "A technical error occurred while evaluating your answer. \
                       Your response was recorded with a score of 0; you can continue with the case."
                .to_string(),
            score: 0.0,
            justification: reason.to_string(),
        }
    }
}
