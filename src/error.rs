//! Error types for verifyq.
//!
//! [`Error`] is what the crate's own operations return. [`JobError`] is the
//! job-scoped failure delivered to a single job's completion handler; it never
//! escapes `submit`, `pause` or `resume`.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{Verdict, VerifierKind};

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("verifier error: {0}")]
    Verifier(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Why a single job did not produce a verdict.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    #[error("deadline {deadline} passed before verification could start")]
    DeadlineExceeded { deadline: DateTime<Utc> },

    #[error("no verifier registered for kind {0}")]
    UnknownVerifier(VerifierKind),

    #[error("failed to start verification: {0}")]
    StartFailed(String),

    #[error("verification failed: {0}")]
    Verification(String),
}

/// Outcome handed to a job's completion handler.
pub type JobResult = std::result::Result<Verdict, JobError>;

impl From<Error> for JobError {
    fn from(e: Error) -> Self {
        JobError::StartFailed(e.to_string())
    }
}
