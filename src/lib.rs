//! # verifyq
//!
//! Admission-and-execution queue for verifying rendered work units.
//!
//! Jobs are admitted in FIFO order up to a concurrency limit, rejected if
//! their deadline passed before admission, and report their outcome to their
//! handler exactly once. `pause` stops admission and returns a future that
//! resolves when the jobs already running have drained.

pub mod config;
pub mod error;
pub mod model;
pub mod queue;
pub mod telemetry;
pub mod verifier;

pub use error::{Error, JobError, JobResult, Result};
pub use model::{JobKey, NewJob, Verdict, VerifierKind};
pub use queue::{Drain, DrainReport, QueueStats, VerificationQueue};
pub use verifier::{CompletionSignal, FastPath, Verifier, VerifierFactory, VerifierRegistry};
