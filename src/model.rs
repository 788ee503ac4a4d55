//! Core data model.
//!
//! A job is one verification request for a rendered work unit. It names the
//! verifier strategy, the key of the work unit, a deadline after which it must
//! not start, and opaque parameters for the verifier.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::JobResult;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Key of the work unit being verified. Used as the registry key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobKey(pub String);

impl JobKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for JobKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Which verification strategy to instantiate for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VerifierKind(pub String);

impl VerifierKind {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VerifierKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VerifierKind {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for VerifierKind {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ---------------------------------------------------------------------------
// Verdict
// ---------------------------------------------------------------------------

/// What a verifier decided about a work unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Accepted,
    Rejected { reason: String },
}

impl Verdict {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Verdict::Rejected {
            reason: reason.into(),
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Accepted => write!(f, "accepted"),
            Verdict::Rejected { reason } => write!(f, "rejected ({reason})"),
        }
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Lifecycle state of a job inside the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Submitted, waiting in the pending FIFO.
    Pending,
    /// Moved into the registry; a verifier owns it.
    Admitted,
    /// Completion recorded and handler invoked. Terminal.
    Completed,
}

impl JobState {
    /// Can transition from self to `to`?
    pub fn can_transition_to(self, to: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, to),
            (Pending, Admitted) | (Admitted, Completed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobState::Pending => "pending",
            JobState::Admitted => "admitted",
            JobState::Completed => "completed",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Job Descriptor
// ---------------------------------------------------------------------------

/// Handler invoked exactly once with a job's outcome.
pub type CompletionHandler = Box<dyn FnOnce(JobResult) + Send + 'static>;

/// An immutable verification request, as held in the pending FIFO.
pub struct JobDescriptor {
    pub verifier_kind: VerifierKind,
    pub job_key: JobKey,
    pub deadline: DateTime<Utc>,
    pub params: serde_json::Value,
    pub(crate) on_complete: CompletionHandler,
}

impl std::fmt::Debug for JobDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobDescriptor")
            .field("verifier_kind", &self.verifier_kind)
            .field("job_key", &self.job_key)
            .field("deadline", &self.deadline)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for a verification request. The queue's public API for submitting jobs.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub(crate) verifier_kind: VerifierKind,
    pub(crate) job_key: JobKey,
    pub(crate) deadline: DateTime<Utc>,
    pub(crate) params: serde_json::Value,
}

impl NewJob {
    pub fn new(
        verifier_kind: impl Into<VerifierKind>,
        job_key: impl Into<JobKey>,
        deadline: DateTime<Utc>,
    ) -> Self {
        Self {
            verifier_kind: verifier_kind.into(),
            job_key: job_key.into(),
            deadline,
            params: serde_json::Value::Null,
        }
    }

    /// Deadline `timeout` from now.
    pub fn within(
        verifier_kind: impl Into<VerifierKind>,
        job_key: impl Into<JobKey>,
        timeout: std::time::Duration,
    ) -> Self {
        let timeout = chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::MAX);
        let deadline = Utc::now()
            .checked_add_signed(timeout)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self::new(verifier_kind, job_key, deadline)
    }

    pub fn params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }

    pub fn job_key(&self) -> &JobKey {
        &self.job_key
    }

    pub fn verifier_kind(&self) -> &VerifierKind {
        &self.verifier_kind
    }

    pub fn deadline(&self) -> DateTime<Utc> {
        self.deadline
    }

    pub(crate) fn into_descriptor(self, on_complete: CompletionHandler) -> JobDescriptor {
        JobDescriptor {
            verifier_kind: self.verifier_kind,
            job_key: self.job_key,
            deadline: self.deadline,
            params: self.params,
            on_complete,
        }
    }
}
