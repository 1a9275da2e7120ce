//! crates/case_tutor_core/src/accounts.rs
//!
//! Self-registration and login. Registration is gated by a shared code per role; this is
//! a classroom-scale gate, not a security boundary.

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::domain::{UserProfile, UserRole};
use crate::store::{DualModeStore, Lookup};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AccountError {
    #[error("Invalid registration code for this role")]
    InvalidCode,
    #[error("The {0} field is required")]
    MissingField(&'static str),
    #[error("An account already exists for {0}")]
    EmailTaken(String),
    #[error("No account found for {0}")]
    UnknownEmail(String),
    #[error("The account service is unreachable; try again later")]
    Unreachable,
}

/// The shared secrets that gate registration, one per role.
#[derive(Debug, Clone)]
pub struct RegistrationCodes {
    pub student: String,
    pub professor: String,
}

impl RegistrationCodes {
    pub fn accepts(&self, role: UserRole, code: &str) -> bool {
        let expected = match role {
            UserRole::Student => &self.student,
            UserRole::Professor => &self.professor,
        };
        code.trim() == expected
    }
}

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub auth_code: String,
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Creates and stores a profile.
///
/// The code is checked before anything is read or written.
pub async fn register(
    store: &DualModeStore,
    codes: &RegistrationCodes,
    account: NewAccount,
) -> Result<UserProfile, AccountError> {
    if !codes.accepts(account.role, &account.auth_code) {
        return Err(AccountError::InvalidCode);
    }
    let email = normalize_email(&account.email);
    if email.is_empty() {
        return Err(AccountError::MissingField("email"));
    }
    let name = account.name.trim().to_string();
    if name.is_empty() {
        return Err(AccountError::MissingField("name"));
    }

    // An unreachable remote cannot confirm uniqueness; the local-first write goes ahead.
    if store.get_profile(&email).await.is_found() {
        return Err(AccountError::EmailTaken(email));
    }

    let profile = UserProfile {
        id: Uuid::new_v4().to_string(),
        email,
        name,
        role: account.role,
        created_at: Utc::now(),
    };
    store.save_profile(&profile).await;
    info!("Registered {:?} {}", profile.role, profile.email);
    Ok(profile)
}

pub async fn login(store: &DualModeStore, email: &str) -> Result<UserProfile, AccountError> {
    let email = normalize_email(email);
    match store.get_profile(&email).await {
        Lookup::Found(profile) => Ok(profile),
        Lookup::NotFound => Err(AccountError::UnknownEmail(email)),
        Lookup::Unreachable => Err(AccountError::Unreachable),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::MemoryKv;
    use crate::testing::FakeRemote;
    use std::sync::Arc;

    fn codes() -> RegistrationCodes {
        RegistrationCodes {
            student: "2026".to_string(),
            professor: "2317".to_string(),
        }
    }

    fn account(email: &str, role: UserRole, code: &str) -> NewAccount {
        NewAccount {
            email: email.to_string(),
            name: "Ana Souza".to_string(),
            role,
            auth_code: code.to_string(),
        }
    }

    #[tokio::test]
    async fn register_then_login() {
        let store = DualModeStore::local_only(Arc::new(MemoryKv::new()));

        let created = register(&store, &codes(), account(" Ana@School.edu ", UserRole::Student, "2026"))
            .await
            .unwrap();

        assert_eq!(created.email, "ana@school.edu");
        assert_eq!(login(&store, "ANA@school.edu").await, Ok(created));
    }

    #[tokio::test]
    async fn wrong_code_is_rejected_before_any_write() {
        let store = DualModeStore::local_only(Arc::new(MemoryKv::new()));

        let result = register(&store, &codes(), account("p@school.edu", UserRole::Professor, "2026")).await;

        assert_eq!(result, Err(AccountError::InvalidCode));
        assert!(!store.get_profile("p@school.edu").await.is_found());
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let store = DualModeStore::local_only(Arc::new(MemoryKv::new()));
        register(&store, &codes(), account("ana@school.edu", UserRole::Student, "2026"))
            .await
            .unwrap();

        let again = register(&store, &codes(), account("ana@school.edu", UserRole::Student, "2026")).await;

        assert_eq!(again, Err(AccountError::EmailTaken("ana@school.edu".to_string())));
    }

    #[tokio::test]
    async fn blank_name_is_rejected() {
        let store = DualModeStore::local_only(Arc::new(MemoryKv::new()));
        let mut new = account("ana@school.edu", UserRole::Student, "2026");
        new.name = "  ".to_string();

        assert_eq!(
            register(&store, &codes(), new).await,
            Err(AccountError::MissingField("name"))
        );
    }

    #[tokio::test]
    async fn login_reports_unknown_and_unreachable_separately() {
        let remote = Arc::new(FakeRemote::new());
        let store = DualModeStore::new(Some(remote.clone()), Arc::new(MemoryKv::new()));

        assert_eq!(
            login(&store, "ghost@school.edu").await,
            Err(AccountError::UnknownEmail("ghost@school.edu".to_string()))
        );

        remote.set_online(false);
        assert_eq!(login(&store, "ghost@school.edu").await, Err(AccountError::Unreachable));
    }
}
