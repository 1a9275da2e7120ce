//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the case and session endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::{auth, auth::ensure_professor, reports, state::AppState};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use case_tutor_core::{
    catalog::{self, CatalogError},
    domain::{CaseStep, ClinicalCase, ClinicalSession, Difficulty, UserProfile},
    report::{self, StudentSummary},
    session::SubmitOutcome,
    store::Lookup,
};
use chrono::Utc;
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::{OpenApi, ToSchema};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::register_handler,
        auth::login_handler,
        auth::logout_handler,
        auth::me_handler,
        my_summary_handler,
        my_sessions_handler,
        list_cases_handler,
        get_case_handler,
        create_case_handler,
        update_case_handler,
        delete_case_handler,
        case_template_handler,
        import_cases_handler,
        start_random_session_handler,
        get_session_handler,
        submit_answer_handler,
        reports::leaderboard_handler,
        reports::stats_handler,
        reports::all_sessions_handler,
        reports::export_csv_handler,
        reports::list_students_handler,
        reports::student_roster_handler,
    ),
    components(
        schemas(
            auth::RegisterRequest,
            auth::LoginRequest,
            auth::AuthResponse,
            CaseInput,
            AnswerRequest,
        )
    ),
    tags(
        (name = "Clinical Case Tutor API", description = "Step-by-step clinical cases with automated feedback.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// The editable part of a case, as sent by professors.
#[derive(Deserialize, ToSchema)]
pub struct CaseInput {
    pub title: String,
    #[serde(default)]
    pub theme: String,
    #[serde(default)]
    #[schema(value_type = String, example = "medium")]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Ordered steps, each with `title`, `content` and `question`.
    #[schema(value_type = Vec<Object>)]
    pub steps: Vec<CaseStep>,
}

#[derive(Deserialize, ToSchema)]
pub struct AnswerRequest {
    pub response: String,
}

#[derive(Serialize)]
pub struct StartedSession {
    pub session: ClinicalSession,
    pub case: ClinicalCase,
}

#[derive(Serialize)]
pub struct SessionDetail {
    pub session: ClinicalSession,
    /// `None` if the case was deleted after the session started.
    pub case: Option<ClinicalCase>,
}

#[derive(Serialize)]
pub struct AnswerResponse {
    pub outcome: SubmitOutcome,
    pub session: ClinicalSession,
}

//=========================================================================================
// Helpers
//=========================================================================================

fn catalog_error(e: CatalogError) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, e.to_string())
}

fn case_not_found(case_id: &str) -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, format!("Case {} not found", case_id))
}

async fn load_session(
    state: &AppState,
    session_id: &str,
) -> Result<ClinicalSession, (StatusCode, String)> {
    match state.store.get_session_by_id(session_id).await {
        Lookup::Found(session) => Ok(session),
        Lookup::NotFound => Err((
            StatusCode::NOT_FOUND,
            format!("Session {} not found", session_id),
        )),
        Lookup::Unreachable => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            "Session storage is unreachable; try again later".to_string(),
        )),
    }
}

//=========================================================================================
// Student Dashboard
//=========================================================================================

/// Totals and average over the signed-in user's sessions.
#[utoipa::path(
    get,
    path = "/me/summary",
    responses((status = 200, description = "Session counts and average score (completed sessions only)"))
)]
pub async fn my_summary_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserProfile>,
) -> Json<StudentSummary> {
    let sessions = state.store.get_user_sessions(&user.id).await;
    Json(report::student_summary(&sessions))
}

/// The signed-in user's sessions, newest first.
#[utoipa::path(
    get,
    path = "/me/sessions",
    responses((status = 200, description = "The caller's sessions, newest first"))
)]
pub async fn my_sessions_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserProfile>,
) -> Json<Vec<ClinicalSession>> {
    Json(state.store.get_user_sessions(&user.id).await)
}

//=========================================================================================
// Case Handlers
//=========================================================================================

/// List the case catalog, newest first. Never empty.
#[utoipa::path(
    get,
    path = "/cases",
    responses((status = 200, description = "The case catalog; the built-in case when nothing is stored"))
)]
pub async fn list_cases_handler(State(state): State<Arc<AppState>>) -> Json<Vec<ClinicalCase>> {
    Json(state.store.get_cases().await)
}

#[utoipa::path(
    get,
    path = "/cases/{id}",
    params(("id" = String, Path, description = "Case id")),
    responses(
        (status = 200, description = "The case"),
        (status = 404, description = "No such case")
    )
)]
pub async fn get_case_handler(
    State(state): State<Arc<AppState>>,
    Path(case_id): Path<String>,
) -> Result<Json<ClinicalCase>, (StatusCode, String)> {
    state
        .store
        .find_case(&case_id)
        .await
        .map(Json)
        .ok_or_else(|| case_not_found(&case_id))
}

/// Create a case (professors only).
#[utoipa::path(
    post,
    path = "/cases",
    request_body = CaseInput,
    responses(
        (status = 201, description = "Case created"),
        (status = 400, description = "Missing title, steps or questions"),
        (status = 403, description = "Not a professor")
    )
)]
pub async fn create_case_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserProfile>,
    Json(input): Json<CaseInput>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    ensure_professor(&user)?;
    let case = ClinicalCase {
        id: catalog::new_case_id(),
        title: input.title,
        theme: input.theme,
        difficulty: input.difficulty,
        tags: input.tags,
        steps: input.steps,
        created_at: Utc::now(),
        created_by: user.id.clone(),
    };
    catalog::validate_case(&case).map_err(catalog_error)?;
    state.store.save_case(&case).await;
    info!("{} created case '{}'", user.email, case.title);
    Ok((StatusCode::CREATED, Json(case)))
}

/// Replace a case's content (professors only). Id, author and creation time are kept.
#[utoipa::path(
    put,
    path = "/cases/{id}",
    params(("id" = String, Path, description = "Case id")),
    request_body = CaseInput,
    responses(
        (status = 200, description = "Case updated"),
        (status = 400, description = "Missing title, steps or questions"),
        (status = 403, description = "Not a professor"),
        (status = 404, description = "No such case"),
        (status = 409, description = "The edit would remove the current step of an in-progress session")
    )
)]
pub async fn update_case_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserProfile>,
    Path(case_id): Path<String>,
    Json(input): Json<CaseInput>,
) -> Result<Json<ClinicalCase>, (StatusCode, String)> {
    ensure_professor(&user)?;
    let existing = state
        .store
        .find_case(&case_id)
        .await
        .ok_or_else(|| case_not_found(&case_id))?;
    let case = ClinicalCase {
        title: input.title,
        theme: input.theme,
        difficulty: input.difficulty,
        tags: input.tags,
        steps: input.steps,
        ..existing
    };
    catalog::validate_case(&case).map_err(catalog_error)?;

    let sessions = state.store.get_sessions().await;
    let stranded = catalog::sessions_stranded_by_edit(&case.id, case.steps.len(), &sessions);
    if !stranded.is_empty() {
        warn!(
            "Refusing to cut case {} to {} step(s): {} session(s) in progress past that point",
            case.id,
            case.steps.len(),
            stranded.len()
        );
        return Err((
            StatusCode::CONFLICT,
            format!(
                "{} in-progress session(s) are already past step {}; keep at least {} steps",
                stranded.len(),
                case.steps.len(),
                stranded.iter().map(|s| s.current_step + 1).max().unwrap_or(0)
            ),
        ));
    }

    state.store.save_case(&case).await;
    Ok(Json(case))
}

/// Delete a case (professors only). Existing sessions keep their recorded case title.
#[utoipa::path(
    delete,
    path = "/cases/{id}",
    params(("id" = String, Path, description = "Case id")),
    responses(
        (status = 204, description = "Case deleted"),
        (status = 403, description = "Not a professor")
    )
)]
pub async fn delete_case_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserProfile>,
    Path(case_id): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    ensure_professor(&user)?;
    state.store.delete_case(&case_id).await;
    info!("{} deleted case {}", user.email, case_id);
    Ok(StatusCode::NO_CONTENT)
}

/// A blank five-step case to start editing from (professors only). Not stored.
#[utoipa::path(
    get,
    path = "/cases/template",
    responses(
        (status = 200, description = "An unsaved blank case"),
        (status = 403, description = "Not a professor")
    )
)]
pub async fn case_template_handler(
    Extension(user): Extension<UserProfile>,
) -> Result<Json<ClinicalCase>, (StatusCode, String)> {
    ensure_professor(&user)?;
    Ok(Json(catalog::blank_case(&user.id, Utc::now())))
}

/// Import one case or an array of cases from a JSON document (professors only).
///
/// Nothing is stored unless every case in the document is valid.
#[utoipa::path(
    post,
    path = "/cases/import",
    request_body(content = String, content_type = "application/json", description = "A case object or an array of case objects."),
    responses(
        (status = 201, description = "The imported cases"),
        (status = 400, description = "Malformed JSON or an invalid case"),
        (status = 403, description = "Not a professor")
    )
)]
pub async fn import_cases_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserProfile>,
    body: String,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    ensure_professor(&user)?;
    let cases = catalog::import_cases(&body, &user.id, Utc::now()).map_err(catalog_error)?;
    for case in &cases {
        state.store.save_case(case).await;
    }
    info!("{} imported {} case(s)", user.email, cases.len());
    Ok((StatusCode::CREATED, Json(cases)))
}

//=========================================================================================
// Session Handlers
//=========================================================================================

/// Pick the caller's next case and start a session on it.
#[utoipa::path(
    post,
    path = "/sessions/random",
    responses((status = 201, description = "The new session together with its case"))
)]
pub async fn start_random_session_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserProfile>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let cases = state.store.get_cases().await;
    let history = state.store.get_user_sessions(&user.id).await;

    let mut rng = StdRng::from_entropy();
    let case = catalog::select_next_case(&cases, &history, &mut rng)
        .cloned()
        .ok_or_else(|| {
            error!("Case catalog was empty");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "No clinical case is available".to_string(),
            )
        })?;

    let session = state.runner.start_session(&user, &case).await;
    Ok((StatusCode::CREATED, Json(StartedSession { session, case })))
}

/// Fetch a session. Visible to its student and to professors.
#[utoipa::path(
    get,
    path = "/sessions/{id}",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "The session and its case"),
        (status = 403, description = "Someone else's session"),
        (status = 404, description = "No such session"),
        (status = 503, description = "Session storage unreachable")
    )
)]
pub async fn get_session_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserProfile>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionDetail>, (StatusCode, String)> {
    let session = load_session(&state, &session_id).await?;
    if session.student_id != user.id && !user.is_professor() {
        return Err((
            StatusCode::FORBIDDEN,
            "This session belongs to another student".to_string(),
        ));
    }
    let case = state.store.find_case(&session.case_id).await;
    Ok(Json(SessionDetail { session, case }))
}

/// Answer the current step of one of the caller's sessions.
///
/// Answers to the same session are handled one at a time. A rejected answer
/// (blank, or the session is already completed) changes nothing and returns 409.
#[utoipa::path(
    post,
    path = "/sessions/{id}/answers",
    params(("id" = String, Path, description = "Session id")),
    request_body = AnswerRequest,
    responses(
        (status = 200, description = "Answer scored and recorded"),
        (status = 403, description = "Someone else's session"),
        (status = 404, description = "No such session, or its case was deleted"),
        (status = 409, description = "Answer rejected; the session is unchanged")
    )
)]
pub async fn submit_answer_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserProfile>,
    Path(session_id): Path<String>,
    Json(req): Json<AnswerRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let _guard = state.lock_session(&session_id).await;

    let mut session = load_session(&state, &session_id).await?;
    if session.student_id != user.id {
        return Err((
            StatusCode::FORBIDDEN,
            "Only the session's student can answer it".to_string(),
        ));
    }
    let case = state
        .store
        .find_case(&session.case_id)
        .await
        .ok_or_else(|| case_not_found(&session.case_id))?;

    let outcome = state
        .runner
        .submit_answer(&mut session, &case, &req.response)
        .await;
    let status = match outcome {
        SubmitOutcome::Recorded { .. } => StatusCode::OK,
        SubmitOutcome::Rejected { .. } => StatusCode::CONFLICT,
    };
    Ok((status, Json(AnswerResponse { outcome, session })))
}
