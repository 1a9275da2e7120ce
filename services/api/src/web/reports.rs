//! services/api/src/web/reports.rs
//!
//! Professor-facing class reports. All numbers are recomputed from the store on every request.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use case_tutor_core::{
    domain::{ClinicalSession, UserProfile},
    report::{self, ClassStats, LeaderboardRow, StudentRow},
};
use futures::future::{join, join3};
use std::sync::Arc;

use crate::web::{auth::ensure_professor, state::AppState};

#[utoipa::path(
    get,
    path = "/reports/leaderboard",
    responses(
        (status = 200, description = "Students ranked by average score of completed sessions"),
        (status = 403, description = "Not a professor")
    )
)]
pub async fn leaderboard_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserProfile>,
) -> Result<Json<Vec<LeaderboardRow>>, (StatusCode, String)> {
    ensure_professor(&user)?;
    let (students, sessions) = join(state.store.get_all_students(), state.store.get_sessions()).await;
    Ok(Json(report::leaderboard(
        &students,
        &sessions,
        state.config.leaderboard_size,
    )))
}

#[utoipa::path(
    get,
    path = "/reports/stats",
    responses(
        (status = 200, description = "Class-wide totals and average"),
        (status = 403, description = "Not a professor")
    )
)]
pub async fn stats_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserProfile>,
) -> Result<Json<ClassStats>, (StatusCode, String)> {
    ensure_professor(&user)?;
    let (cases, sessions, students) = join3(
        state.store.get_cases(),
        state.store.get_sessions(),
        state.store.get_all_students(),
    )
    .await;
    Ok(Json(report::class_stats(&cases, &sessions, &students)))
}

#[utoipa::path(
    get,
    path = "/reports/sessions",
    responses(
        (status = 200, description = "Every session, newest first"),
        (status = 403, description = "Not a professor")
    )
)]
pub async fn all_sessions_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserProfile>,
) -> Result<Json<Vec<ClinicalSession>>, (StatusCode, String)> {
    ensure_professor(&user)?;
    Ok(Json(state.store.get_sessions().await))
}

#[utoipa::path(
    get,
    path = "/reports/export.csv",
    responses(
        (status = 200, description = "All sessions as text/csv, one row per session"),
        (status = 403, description = "Not a professor")
    )
)]
pub async fn export_csv_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserProfile>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    ensure_professor(&user)?;
    let sessions = state.store.get_sessions().await;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"clinical_sessions.csv\"",
            ),
        ],
        report::export_csv(&sessions),
    ))
}

#[utoipa::path(
    get,
    path = "/students",
    responses(
        (status = 200, description = "Every registered student"),
        (status = 403, description = "Not a professor")
    )
)]
pub async fn list_students_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserProfile>,
) -> Result<Json<Vec<UserProfile>>, (StatusCode, String)> {
    ensure_professor(&user)?;
    Ok(Json(state.store.get_all_students().await))
}

#[utoipa::path(
    get,
    path = "/reports/students",
    responses(
        (status = 200, description = "Every student with session count and average score (completed sessions only)"),
        (status = 403, description = "Not a professor")
    )
)]
pub async fn student_roster_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserProfile>,
) -> Result<Json<Vec<StudentRow>>, (StatusCode, String)> {
    ensure_professor(&user)?;
    let (students, sessions) = join(state.store.get_all_students(), state.store.get_sessions()).await;
    Ok(Json(report::student_roster(&students, &sessions)))
}
