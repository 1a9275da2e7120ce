pub mod db;
pub mod feedback_llm;
pub mod file_kv;

pub use db::DbAdapter;
pub use feedback_llm::{OpenAiFeedbackAdapter, UnconfiguredOracle};
pub use file_kv::FileKv;
