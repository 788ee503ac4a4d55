//! Verifier contract and registry.
//!
//! A verifier is the pluggable strategy that decides whether a rendered work
//! unit passes. The queue never looks inside one: it builds a verifier for each
//! admitted job through the [`VerifierRegistry`], hands it a
//! [`CompletionSignal`], and waits for that signal to fire.

pub mod command;

use crate::error::{Error, JobResult, Result};
use crate::model::{JobKey, Verdict, VerifierKind};
use crate::queue::Shared;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

pub use command::{CommandVerifier, VerifierDefinition};

/// Answer of a verifier's fast-path check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FastPath {
    /// The outcome is already known; call [`Verifier::finalize`].
    Resolved,
    /// Full verification is required; call [`Verifier::start`].
    NeedsFull,
}

/// A verification strategy bound to one job.
///
/// Exactly one of `finalize`, `start` or `deadline_exceeded` is called, and
/// each consumes the verifier. `finalize` and `start` must eventually fire the
/// [`CompletionSignal`] the verifier was built with.
pub trait Verifier: Send {
    /// Cheap check that may settle the outcome without full verification.
    fn fast_path(&mut self, params: &serde_json::Value) -> Result<FastPath>;

    /// Begin full verification. Should return promptly and signal later.
    ///
    /// Must not block until the job completes. `start` runs inside the
    /// admission loop, and while it runs, slots freed by completions on other
    /// threads are not refilled.
    fn start(self: Box<Self>, params: serde_json::Value) -> Result<()>;

    /// Report the outcome settled by the fast path.
    fn finalize(self: Box<Self>) -> Result<()>;

    /// The job was rejected at admission because its deadline had passed.
    fn deadline_exceeded(self: Box<Self>, job_key: &JobKey);
}

/// Builds a verifier for each admitted job of one kind.
pub trait VerifierFactory: Send + Sync {
    fn create(&self, signal: CompletionSignal) -> Result<Box<dyn Verifier>>;
}

impl<F> VerifierFactory for F
where
    F: Fn(CompletionSignal) -> Result<Box<dyn Verifier>> + Send + Sync,
{
    fn create(&self, signal: CompletionSignal) -> Result<Box<dyn Verifier>> {
        self(signal)
    }
}

// ---------------------------------------------------------------------------
// Completion signal
// ---------------------------------------------------------------------------

/// Callback target handed to a verifier.
///
/// Cloneable and callable from any thread. Only the first completion for an
/// admission takes effect; later ones are discarded. A live signal keeps the
/// queue state alive, so a job still reports its outcome after the last
/// [`VerificationQueue`](crate::VerificationQueue) handle is dropped.
#[derive(Clone)]
pub struct CompletionSignal {
    queue: Arc<Shared>,
    job_key: JobKey,
    ticket: u64,
}

impl CompletionSignal {
    pub(crate) fn new(queue: Arc<Shared>, job_key: JobKey, ticket: u64) -> Self {
        Self {
            queue,
            job_key,
            ticket,
        }
    }

    pub fn job_key(&self) -> &JobKey {
        &self.job_key
    }

    /// Admission ticket this signal belongs to.
    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    /// Report the job's outcome. Returns `false` if the signal was discarded.
    pub fn complete(&self, result: JobResult) -> bool {
        Shared::on_job_done(&self.queue, &self.job_key, self.ticket, result)
    }

    pub fn accept(&self) -> bool {
        self.complete(Ok(Verdict::Accepted))
    }

    pub fn reject(&self, reason: impl Into<String>) -> bool {
        self.complete(Ok(Verdict::rejected(reason)))
    }
}

impl std::fmt::Debug for CompletionSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionSignal")
            .field("job_key", &self.job_key)
            .field("ticket", &self.ticket)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Registry of verifier factories, indexed by kind.
#[derive(Clone, Default)]
pub struct VerifierRegistry {
    factories: HashMap<VerifierKind, Arc<dyn VerifierFactory>>,
}

impl VerifierRegistry {
    /// Create an empty registry with no verifiers.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Register (or replace) the factory for `kind`.
    pub fn register(
        &mut self,
        kind: impl Into<VerifierKind>,
        factory: impl VerifierFactory + 'static,
    ) -> &mut Self {
        self.factories.insert(kind.into(), Arc::new(factory));
        self
    }

    /// Load every `.toml` command verifier definition in a directory.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let mut registry = Self::empty();

        let entries = std::fs::read_dir(dir).map_err(|e| {
            Error::Config(format!("cannot read verifier dir {}: {e}", dir.display()))
        })?;

        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "toml") {
                let definition = VerifierDefinition::load(&path)?;
                tracing::debug!(
                    verifier = %definition.name,
                    path = %path.display(),
                    "loaded verifier definition"
                );
                let kind = definition.name.clone();
                registry.register(kind, CommandVerifier::factory(definition));
            }
        }

        Ok(registry)
    }

    pub fn get(&self, kind: &VerifierKind) -> Option<&Arc<dyn VerifierFactory>> {
        self.factories.get(kind)
    }

    pub fn contains(&self, kind: &VerifierKind) -> bool {
        self.factories.contains_key(kind)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<&VerifierKind> {
        let mut kinds: Vec<_> = self.factories.keys().collect();
        kinds.sort();
        kinds
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}
