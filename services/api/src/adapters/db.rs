//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `RemoteStore` port from the `core` crate. It handles all interactions
//! with the shared PostgreSQL backend using `sqlx`.

use async_trait::async_trait;
use case_tutor_core::domain::{
    CaseStep, ClinicalCase, ClinicalSession, Difficulty, SessionStatus, SessionStep, UserProfile,
    UserRole,
};
use case_tutor_core::ports::{PortError, PortResult, RemoteStore};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tracing::info;

use crate::config::RemoteSettings;
use crate::error::ApiError;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `RemoteStore` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to the configured backend and brings its schema up to date.
    pub async fn connect(settings: &RemoteSettings) -> Result<Self, ApiError> {
        info!("Connecting to remote database...");
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .connect(&settings.database_url)
            .await?;
        let adapter = Self::new(pool);
        info!("Running database migrations...");
        adapter.run_migrations().await?;
        info!("Database migrations complete.");
        Ok(adapter)
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

/// Connection-level failures mean "unreachable"; everything else is unexpected.
fn map_db_error(e: sqlx::Error) -> PortError {
    match e {
        sqlx::Error::RowNotFound => PortError::NotFound(e.to_string()),
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => PortError::Unavailable(e.to_string()),
        _ => PortError::Unexpected(e.to_string()),
    }
}

//=========================================================================================
// Column Encodings
//=========================================================================================

fn role_to_sql(role: UserRole) -> &'static str {
    match role {
        UserRole::Student => "student",
        UserRole::Professor => "professor",
    }
}

fn role_from_sql(raw: &str) -> PortResult<UserRole> {
    match raw {
        "student" => Ok(UserRole::Student),
        "professor" => Ok(UserRole::Professor),
        other => Err(PortError::Unexpected(format!("Unknown role '{}'", other))),
    }
}

fn difficulty_to_sql(difficulty: Difficulty) -> &'static str {
    match difficulty {
        Difficulty::Easy => "easy",
        Difficulty::Medium => "medium",
        Difficulty::Hard => "hard",
    }
}

fn difficulty_from_sql(raw: &str) -> Difficulty {
    match raw {
        "easy" => Difficulty::Easy,
        "hard" => Difficulty::Hard,
        _ => Difficulty::Medium,
    }
}

fn status_to_sql(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::InProgress => "in_progress",
        SessionStatus::Completed => "completed",
    }
}

fn status_from_sql(raw: &str) -> PortResult<SessionStatus> {
    match raw {
        "in_progress" => Ok(SessionStatus::InProgress),
        "completed" => Ok(SessionStatus::Completed),
        other => Err(PortError::Unexpected(format!("Unknown session status '{}'", other))),
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct ProfileRecord {
    id: String,
    email: String,
    name: String,
    role: String,
    created_at: DateTime<Utc>,
}
impl ProfileRecord {
    fn to_domain(self) -> PortResult<UserProfile> {
        Ok(UserProfile {
            id: self.id,
            email: self.email,
            name: self.name,
            role: role_from_sql(&self.role)?,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct CaseRecord {
    id: String,
    title: String,
    theme: String,
    difficulty: String,
    tags: Vec<String>,
    steps: Json<Vec<CaseStep>>,
    created_at: DateTime<Utc>,
    created_by: String,
}
impl CaseRecord {
    fn to_domain(self) -> ClinicalCase {
        ClinicalCase {
            id: self.id,
            title: self.title,
            theme: self.theme,
            difficulty: difficulty_from_sql(&self.difficulty),
            tags: self.tags,
            steps: self.steps.0,
            created_at: self.created_at,
            created_by: self.created_by,
        }
    }
}

#[derive(FromRow)]
struct SessionRecord {
    id: String,
    student_id: String,
    case_id: String,
    case_title: String,
    status: String,
    current_step: i32,
    total_score: f64,
    steps_data: Json<Vec<SessionStep>>,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}
impl SessionRecord {
    fn to_domain(self) -> PortResult<ClinicalSession> {
        Ok(ClinicalSession {
            id: self.id,
            student_id: self.student_id,
            case_id: self.case_id,
            case_title: self.case_title,
            status: status_from_sql(&self.status)?,
            current_step: usize::try_from(self.current_step).map_err(|_| {
                PortError::Unexpected(format!("Negative current_step {}", self.current_step))
            })?,
            total_score: self.total_score,
            steps_data: self.steps_data.0,
            started_at: self.started_at,
            finished_at: self.finished_at,
        })
    }
}

const PROFILE_COLUMNS: &str = "id, email, name, role, created_at";
const CASE_COLUMNS: &str = "id, title, theme, difficulty, tags, steps, created_at, created_by";
const SESSION_COLUMNS: &str = "id, student_id, case_id, case_title, status, current_step, \
                               total_score, steps_data, started_at, finished_at";

//=========================================================================================
// `RemoteStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl RemoteStore for DbAdapter {
    async fn find_profile_by_email(&self, email: &str) -> PortResult<UserProfile> {
        let sql = format!("SELECT {} FROM profiles WHERE email = $1", PROFILE_COLUMNS);
        let record = sqlx::query_as::<_, ProfileRecord>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?
            .ok_or_else(|| PortError::NotFound(format!("Profile {} not found", email)))?;
        record.to_domain()
    }

    async fn upsert_profile(&self, profile: &UserProfile) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO profiles (id, email, name, role, created_at) VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (email) DO UPDATE SET id = EXCLUDED.id, name = EXCLUDED.name, \
             role = EXCLUDED.role, created_at = EXCLUDED.created_at",
        )
        .bind(&profile.id)
        .bind(&profile.email)
        .bind(&profile.name)
        .bind(role_to_sql(profile.role))
        .bind(profile.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(())
    }

    async fn list_students(&self) -> PortResult<Vec<UserProfile>> {
        let sql = format!(
            "SELECT {} FROM profiles WHERE role = 'student' ORDER BY created_at ASC",
            PROFILE_COLUMNS
        );
        let records = sqlx::query_as::<_, ProfileRecord>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_error)?;
        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn list_cases(&self) -> PortResult<Vec<ClinicalCase>> {
        let sql = format!("SELECT {} FROM cases ORDER BY created_at DESC", CASE_COLUMNS);
        let records = sqlx::query_as::<_, CaseRecord>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_error)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn upsert_case(&self, case: &ClinicalCase) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO cases (id, title, theme, difficulty, tags, steps, created_at, created_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (id) DO UPDATE SET title = EXCLUDED.title, theme = EXCLUDED.theme, \
             difficulty = EXCLUDED.difficulty, tags = EXCLUDED.tags, steps = EXCLUDED.steps, \
             created_at = EXCLUDED.created_at, created_by = EXCLUDED.created_by",
        )
        .bind(&case.id)
        .bind(&case.title)
        .bind(&case.theme)
        .bind(difficulty_to_sql(case.difficulty))
        .bind(&case.tags)
        .bind(Json(&case.steps))
        .bind(case.created_at)
        .bind(&case.created_by)
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(())
    }

    async fn delete_case(&self, case_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM cases WHERE id = $1")
            .bind(case_id)
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;
        Ok(())
    }

    async fn list_sessions(&self) -> PortResult<Vec<ClinicalSession>> {
        let sql = format!("SELECT {} FROM sessions ORDER BY started_at DESC", SESSION_COLUMNS);
        let records = sqlx::query_as::<_, SessionRecord>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_error)?;
        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn list_sessions_for_student(&self, student_id: &str) -> PortResult<Vec<ClinicalSession>> {
        let sql = format!(
            "SELECT {} FROM sessions WHERE student_id = $1 ORDER BY started_at DESC",
            SESSION_COLUMNS
        );
        let records = sqlx::query_as::<_, SessionRecord>(&sql)
            .bind(student_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_error)?;
        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn find_session(&self, session_id: &str) -> PortResult<ClinicalSession> {
        let sql = format!("SELECT {} FROM sessions WHERE id = $1", SESSION_COLUMNS);
        let record = sqlx::query_as::<_, SessionRecord>(&sql)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?
            .ok_or_else(|| PortError::NotFound(format!("Session {} not found", session_id)))?;
        record.to_domain()
    }

    async fn upsert_session(&self, session: &ClinicalSession) -> PortResult<()> {
        let current_step = i32::try_from(session.current_step)
            .map_err(|_| PortError::Unexpected("current_step out of range".to_string()))?;
        sqlx::query(
            "INSERT INTO sessions (id, student_id, case_id, case_title, status, current_step, \
             total_score, steps_data, started_at, finished_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (id) DO UPDATE SET status = EXCLUDED.status, \
             current_step = EXCLUDED.current_step, total_score = EXCLUDED.total_score, \
             steps_data = EXCLUDED.steps_data, case_title = EXCLUDED.case_title, \
             finished_at = EXCLUDED.finished_at",
        )
        .bind(&session.id)
        .bind(&session.student_id)
        .bind(&session.case_id)
        .bind(&session.case_title)
        .bind(status_to_sql(session.status))
        .bind(current_step)
        .bind(session.total_score)
        .bind(Json(&session.steps_data))
        .bind(session.started_at)
        .bind(session.finished_at)
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(())
    }
}
