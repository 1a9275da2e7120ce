pub mod auth;
pub mod middleware;
pub mod reports;
pub mod rest;
pub mod state;

pub use middleware::require_auth;
pub use state::AppState;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Builds every API route. CORS and the Swagger UI are layered on by the binary.
pub fn build_router(app_state: Arc<AppState>) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/logout", post(auth::logout_handler));

    // Protected routes (auth required); professor-only handlers check the role themselves.
    let protected_routes = Router::new()
        .route("/me", get(auth::me_handler))
        .route("/me/summary", get(rest::my_summary_handler))
        .route("/me/sessions", get(rest::my_sessions_handler))
        .route(
            "/cases",
            get(rest::list_cases_handler).post(rest::create_case_handler),
        )
        .route("/cases/template", get(rest::case_template_handler))
        .route("/cases/import", post(rest::import_cases_handler))
        .route(
            "/cases/{id}",
            get(rest::get_case_handler)
                .put(rest::update_case_handler)
                .delete(rest::delete_case_handler),
        )
        .route("/sessions/random", post(rest::start_random_session_handler))
        .route("/sessions/{id}", get(rest::get_session_handler))
        .route("/sessions/{id}/answers", post(rest::submit_answer_handler))
        .route("/reports/leaderboard", get(reports::leaderboard_handler))
        .route("/reports/stats", get(reports::stats_handler))
        .route("/reports/sessions", get(reports::all_sessions_handler))
        .route("/reports/export.csv", get(reports::export_csv_handler))
        .route("/reports/students", get(reports::student_roster_handler))
        .route("/students", get(reports::list_students_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(app_state)
}
