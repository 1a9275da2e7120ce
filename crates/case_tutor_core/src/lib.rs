pub mod accounts;
pub mod catalog;
pub mod domain;
pub mod mirror;
pub mod ports;
pub mod report;
pub mod session;
pub mod store;

#[cfg(test)]
mod testing;

pub use domain::{
    CaseStep, ClinicalCase, ClinicalSession, Difficulty, Feedback, FeedbackRequest,
    SessionStatus, SessionStep, UserProfile, UserRole,
};
pub use mirror::{LocalMirror, MemoryKv};
pub use ports::{FeedbackOracle, KeyValueStore, PortError, PortResult, RemoteStore};
pub use session::{SessionRunner, SubmitOutcome};
pub use store::{DualModeStore, Lookup};
