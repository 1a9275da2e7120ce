//! crates/case_tutor_core/src/session.rs
//!
//! The session state machine. A session walks the steps of one case in order; each
//! answer is scored by the feedback oracle, appended to the session and persisted.
//!
//! `in_progress` --answer to last step--> `completed` (terminal)

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::{
    ClinicalCase, ClinicalSession, Feedback, FeedbackRequest, SessionStatus, SessionStep,
    UserProfile,
};
use crate::ports::FeedbackOracle;
use crate::store::DualModeStore;

/// The oracle timeout used when none is configured.
pub const DEFAULT_ORACLE_TIMEOUT: Duration = Duration::from_secs(30);

//=========================================================================================
// Outcomes
//=========================================================================================

/// Why an answer was not applied. The session is left untouched in every case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    SessionCompleted,
    BlankResponse,
    CaseMismatch,
    StepOutOfRange,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmitOutcome {
    Recorded {
        step_index: usize,
        score: f64,
        completed: bool,
        /// The oracle failed or timed out and a zero-score placeholder was recorded.
        degraded: bool,
    },
    Rejected {
        reason: RejectReason,
    },
}

//=========================================================================================
// Pure Transitions
//=========================================================================================

/// The initial state of a student's attempt at `case`.
pub fn new_session(student_id: &str, case: &ClinicalCase, now: DateTime<Utc>) -> ClinicalSession {
    ClinicalSession {
        id: Uuid::new_v4().to_string(),
        student_id: student_id.to_string(),
        case_id: case.id.clone(),
        case_title: case.title.clone(),
        status: SessionStatus::InProgress,
        current_step: 0,
        total_score: 0.0,
        steps_data: Vec::new(),
        started_at: now,
        finished_at: None,
    }
}

/// Checks whether an answer may be applied to `session` right now.
pub fn check_submission(
    session: &ClinicalSession,
    case: &ClinicalCase,
    response: &str,
) -> Result<(), RejectReason> {
    if session.is_completed() {
        return Err(RejectReason::SessionCompleted);
    }
    if response.trim().is_empty() {
        return Err(RejectReason::BlankResponse);
    }
    if session.case_id != case.id {
        return Err(RejectReason::CaseMismatch);
    }
    if session.current_step >= case.steps.len() {
        return Err(RejectReason::StepOutOfRange);
    }
    Ok(())
}

/// Appends the scored answer and advances the session. Returns `true` when the session
/// became completed. Callers must have passed `check_submission` first.
pub fn apply_feedback(
    session: &mut ClinicalSession,
    case: &ClinicalCase,
    response: &str,
    feedback: &Feedback,
    now: DateTime<Utc>,
) -> bool {
    session.steps_data.push(SessionStep {
        step_index: session.current_step,
        student_response: response.to_string(),
        ai_feedback: feedback.feedback.clone(),
        partial_score: feedback.score,
        timestamp: now,
    });
    session.total_score += feedback.score;

    if session.current_step >= case.last_step_index() {
        // current_step stays on the last step so the final scenario can still be shown.
        session.status = SessionStatus::Completed;
        session.finished_at = Some(now);
        true
    } else {
        session.current_step += 1;
        false
    }
}

//=========================================================================================
// SessionRunner
//=========================================================================================

/// Drives sessions against the oracle and the store.
///
/// Not re-entrant per session: callers must not submit two answers to the same
/// session concurrently.
pub struct SessionRunner {
    store: Arc<DualModeStore>,
    oracle: Arc<dyn FeedbackOracle>,
    oracle_timeout: Duration,
}

impl SessionRunner {
    pub fn new(
        store: Arc<DualModeStore>,
        oracle: Arc<dyn FeedbackOracle>,
        oracle_timeout: Duration,
    ) -> Self {
        Self {
            store,
            oracle,
            oracle_timeout,
        }
    }


    /// Creates and persists a new in-progress session.
    pub async fn start_session(&self, student: &UserProfile, case: &ClinicalCase) -> ClinicalSession {
        let session = new_session(&student.id, case, Utc::now());
        info!(
            "Starting session {} for student {} on case '{}'",
            session.id, student.id, case.title
        );
        self.store.save_session(&session).await;
        session
    }

    /// Scores `response` against the current step, advances `session` and persists it.
    ///
    /// A rejected submission changes nothing. An oracle failure or timeout still records
    /// the step with the degraded zero-score feedback.
    pub async fn submit_answer(
        &self,
        session: &mut ClinicalSession,
        case: &ClinicalCase,
        response: &str,
    ) -> SubmitOutcome {
        if let Err(reason) = check_submission(session, case, response) {
            warn!("Ignoring answer for session {}: {:?}", session.id, reason);
            return SubmitOutcome::Rejected { reason };
        }

        let step_index = session.current_step;
        let Some(request) = FeedbackRequest::for_step(case, step_index, response) else {
            return SubmitOutcome::Rejected {
                reason: RejectReason::StepOutOfRange,
            };
        };
        let (feedback, degraded) = self.ask_oracle(&request).await;

        let completed = apply_feedback(session, case, response, &feedback, Utc::now());
        self.store.save_session(session).await;

        if completed {
            info!(
                "Session {} completed with total score {}",
                session.id, session.total_score
            );
        }
        SubmitOutcome::Recorded {
            step_index,
            score: feedback.score,
            completed,
            degraded,
        }
    }

    async fn ask_oracle(&self, request: &FeedbackRequest) -> (Feedback, bool) {
        match tokio::time::timeout(self.oracle_timeout, self.oracle.evaluate(request)).await {
            Ok(Ok(feedback)) => (feedback, false),
            Ok(Err(e)) => {
                error!("Feedback oracle failed: {}", e);
                (Feedback::degraded("The feedback service returned an error."), true)
            }
            Err(_) => {
                error!(
                    "Feedback oracle timed out after {:?}",
                    self.oracle_timeout
                );
                (Feedback::degraded("The feedback service did not answer in time."), true)
            }
        }
    }
}
