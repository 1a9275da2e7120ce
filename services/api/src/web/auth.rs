//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for self-registration, login, and logout.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use case_tutor_core::{
    accounts::{self, AccountError, NewAccount},
    domain::{UserProfile, UserRole},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::web::{
    middleware::session_token,
    state::{auth_session_ttl, AppState},
};

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub name: String,
    /// `student` or `professor`.
    #[schema(value_type = String, example = "student")]
    pub role: UserRole,
    /// The shared registration code for the chosen role.
    pub auth_code: String,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
}

#[derive(Serialize, ToSchema)]
pub struct AuthResponse {
    pub user_id: String,
    pub email: String,
    pub name: String,
    #[schema(value_type = String)]
    pub role: UserRole,
}

impl From<&UserProfile> for AuthResponse {
    fn from(profile: &UserProfile) -> Self {
        Self {
            user_id: profile.id.clone(),
            email: profile.email.clone(),
            name: profile.name.clone(),
            role: profile.role,
        }
    }
}

//=========================================================================================
// Helpers
//=========================================================================================

fn account_error_status(err: &AccountError) -> StatusCode {
    match err {
        AccountError::InvalidCode => StatusCode::FORBIDDEN,
        AccountError::MissingField(_) => StatusCode::BAD_REQUEST,
        AccountError::EmailTaken(_) => StatusCode::CONFLICT,
        AccountError::UnknownEmail(_) => StatusCode::NOT_FOUND,
        AccountError::Unreachable => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn session_cookie(token: &str) -> String {
    format!(
        "session={}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age={}",
        token,
        auth_session_ttl().num_seconds()
    )
}

/// Rejects non-professors with 403.
pub fn ensure_professor(user: &UserProfile) -> Result<(), (StatusCode, String)> {
    if user.is_professor() {
        Ok(())
    } else {
        Err((
            StatusCode::FORBIDDEN,
            "This action is reserved for professors".to_string(),
        ))
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/register - Create an account with the role's registration code
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created and signed in", body = AuthResponse),
        (status = 400, description = "Missing email or name"),
        (status = 403, description = "Invalid registration code for the role"),
        (status = 409, description = "An account already exists for the email")
    )
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let account = NewAccount {
        email: req.email,
        name: req.name,
        role: req.role,
        auth_code: req.auth_code,
    };
    let profile = accounts::register(&state.store, &state.config.registration_codes, account)
        .await
        .map_err(|e| {
            warn!("Registration refused: {}", e);
            (account_error_status(&e), e.to_string())
        })?;

    let response = AuthResponse::from(&profile);
    let token = state.create_auth_session(profile).await;

    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, session_cookie(&token))],
        Json(response),
    ))
}

/// POST /auth/login - Sign in with an existing account's email
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 404, description = "No account for this email; register first"),
        (status = 503, description = "The account service is unreachable")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let profile = accounts::login(&state.store, &req.email)
        .await
        .map_err(|e| (account_error_status(&e), e.to_string()))?;

    info!("{} signed in", profile.email);
    let response = AuthResponse::from(&profile);
    let token = state.create_auth_session(profile).await;

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, session_cookie(&token))],
        Json(response),
    ))
}

/// POST /auth/logout - Logout and invalidate session
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logout successful"),
        (status = 401, description = "No active session")
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let token = session_token(&headers)
        .ok_or((StatusCode::UNAUTHORIZED, "No session found".to_string()))?;

    if !state.delete_auth_session(token).await {
        return Err((StatusCode::UNAUTHORIZED, "No session found".to_string()));
    }

    let cookie = "session=; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age=0";
    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie.to_string())]))
}

/// GET /me - The signed-in profile
#[utoipa::path(
    get,
    path = "/me",
    responses(
        (status = 200, description = "The signed-in profile", body = AuthResponse),
        (status = 401, description = "Not signed in")
    )
)]
pub async fn me_handler(Extension(user): Extension<UserProfile>) -> Json<AuthResponse> {
    Json(AuthResponse::from(&user))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_errors_map_to_distinct_statuses() {
        assert_eq!(account_error_status(&AccountError::InvalidCode), StatusCode::FORBIDDEN);
        assert_eq!(
            account_error_status(&AccountError::UnknownEmail("x".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            account_error_status(&AccountError::Unreachable),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
