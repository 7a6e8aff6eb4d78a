pub mod config;
pub mod ledger;
pub mod types;

// Re-export commonly used types for convenience
pub use config::Config;
pub use types::{EvaluationResult, JobRequest, JobStatus, Language, Submission, TestSpec, Verdict};
