//! Verification admission-and-execution queue.
//!
//! Accepts verification jobs, bounds how many run at once, rejects jobs whose
//! deadline passed before admission, and reports each job's outcome to its
//! handler exactly once. One mutex guards the pending FIFO, the running
//! registry, the pause flag and the drain barriers; verifiers and completion
//! handlers are always invoked with the lock released.

mod drain;
mod pending;
mod registry;

pub use drain::{Drain, DrainReport};

use crate::error::{Error, JobError, JobResult, Result};
use crate::model::{JobKey, NewJob};
use crate::telemetry::metrics::QueueMetrics;
use crate::verifier::{CompletionSignal, FastPath, VerifierRegistry};
use chrono::Utc;
use drain::DrainBarriers;
use pending::PendingQueue;
use registry::{AdmittedJob, JobRegistry};
use serde::Serialize;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

/// Point-in-time view of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub concurrency_limit: usize,
    pub paused: bool,
    pub pending: usize,
    pub running: usize,
    /// Pause drains still waiting on running jobs.
    pub draining: usize,
}

#[derive(Default)]
struct QueueState {
    paused: bool,
    /// Set while some context runs the admission loop.
    admitting: bool,
    pending: PendingQueue,
    running: JobRegistry,
    drains: DrainBarriers,
}

impl QueueState {
    fn has_capacity(&self, limit: usize) -> bool {
        !self.paused && self.running.len() < limit
    }

    /// Move the head of the FIFO into the registry, if allowed.
    ///
    /// A head whose key is still running waits for that admission to finish;
    /// nothing behind it may jump ahead.
    fn admit_head(&mut self, limit: usize) -> Option<AdmittedJob> {
        if !self.has_capacity(limit) {
            return None;
        }
        let head = self.pending.front()?;
        if self.running.contains(&head.job_key) {
            return None;
        }
        let job = self.pending.pop()?;
        Some(self.running.admit(job))
    }
}

/// State shared between the queue handle and every completion signal.
pub(crate) struct Shared {
    concurrency_limit: usize,
    verifiers: VerifierRegistry,
    metrics: QueueMetrics,
    state: Mutex<QueueState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // Never held across external code, so a poisoned lock still has consistent state.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit pending jobs while capacity allows.
    ///
    /// Only one context runs the loop at a time. A call arriving while another
    /// context is admitting returns at once; the active loop re-checks state on
    /// every iteration, so nothing is missed and completions raised from inside
    /// a verifier do not recurse.
    ///
    /// The loop runs verifier `start` calls inline. While one of them is
    /// running, a slot freed on another thread stays empty until that call
    /// returns and the loop comes round again.
    fn try_admit_next(self: &Arc<Self>) {
        {
            let mut state = self.lock();
            if state.admitting {
                return;
            }
            state.admitting = true;
        }

        loop {
            let next = {
                let mut state = self.lock();
                match state.admit_head(self.concurrency_limit) {
                    Some(job) => job,
                    None => {
                        state.admitting = false;
                        return;
                    }
                }
            };
            self.start(next);
        }
    }

    /// Build and launch the verifier for an admitted job.
    fn start(self: &Arc<Self>, job: AdmittedJob) {
        let span = job.span.clone();
        let _enter = span.enter();
        info!("running verification");

        let job_key = job.job_key.clone();
        let ticket = job.ticket;
        let signal = CompletionSignal::new(Arc::clone(self), job_key.clone(), ticket);

        let failure = match panic::catch_unwind(AssertUnwindSafe(|| self.launch(job, signal))) {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e,
            Err(payload) => JobError::StartFailed(format!(
                "verifier panicked: {}",
                panic_message(payload.as_ref())
            )),
        };

        match &failure {
            JobError::DeadlineExceeded { deadline } => {
                warn!(%deadline, "deadline passed, rejecting without verification");
            }
            e => error!(error = %e, "failed to start verification"),
        }
        self.finish(&job_key, ticket, Err(failure));
    }

    fn launch(&self, job: AdmittedJob, signal: CompletionSignal) -> std::result::Result<(), JobError> {
        let factory = self
            .verifiers
            .get(&job.verifier_kind)
            .ok_or_else(|| JobError::UnknownVerifier(job.verifier_kind.clone()))?;
        let mut verifier = factory.create(signal)?;

        if job.deadline <= Utc::now() {
            verifier.deadline_exceeded(&job.job_key);
            return Err(JobError::DeadlineExceeded {
                deadline: job.deadline,
            });
        }

        match verifier.fast_path(&job.params)? {
            FastPath::Resolved => {
                debug!("fast path settled the outcome");
                verifier.finalize()?;
            }
            FastPath::NeedsFull => verifier.start(job.params)?,
        }
        Ok(())
    }

    /// Completion dispatcher entry point for verifier signals.
    pub(crate) fn on_job_done(self: &Arc<Self>, job_key: &JobKey, ticket: u64, result: JobResult) -> bool {
        if !self.finish(job_key, ticket, result) {
            return false;
        }
        self.try_admit_next();
        true
    }

    /// Record a completion and invoke the job's handler.
    ///
    /// The registry check, the state transition and the removal happen in one
    /// critical section, so of two racing completions exactly one wins.
    fn finish(&self, job_key: &JobKey, ticket: u64, result: JobResult) -> bool {
        let (job, resolved) = {
            let mut state = self.lock();
            let Some(job) = state.running.complete(job_key, ticket) else {
                drop(state);
                debug!(%job_key, ticket, "discarding stale completion");
                self.metrics.discarded_signals.add(1, &[]);
                return false;
            };
            let resolved = state.drains.record(ticket, result.is_err());
            (job, resolved)
        };
        let _enter = job.span.enter();

        let label = match &result {
            Ok(verdict) => {
                info!(%job_key, ticket, %verdict, duration_ms = job.elapsed_ms, "finished verification");
                if verdict.is_accepted() { "accepted" } else { "rejected" }
            }
            Err(e) => {
                warn!(%job_key, ticket, error = %e, duration_ms = job.elapsed_ms, "verification failed");
                "failed"
            }
        };
        let attrs = [
            opentelemetry::KeyValue::new("verifier", job.verifier_kind.to_string()),
            opentelemetry::KeyValue::new("result", label),
        ];
        self.metrics.completed.add(1, &attrs);
        self.metrics.duration_ms.record(job.elapsed_ms as f64, &attrs);

        let handler = job.on_complete;
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || handler(result))) {
            error!(%job_key, panic = %panic_message(payload.as_ref()), "completion handler panicked");
        }

        resolved.notify();
        true
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ---------------------------------------------------------------------------
// Public handle
// ---------------------------------------------------------------------------

/// Handle to a verification queue. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct VerificationQueue {
    shared: Arc<Shared>,
}

impl VerificationQueue {
    /// Create a queue admitting at most `concurrency_limit` jobs at once.
    pub fn new(concurrency_limit: usize, verifiers: VerifierRegistry) -> Result<Self> {
        if concurrency_limit == 0 {
            return Err(Error::Config(
                "concurrency limit must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            shared: Arc::new(Shared {
                concurrency_limit,
                verifiers,
                metrics: QueueMetrics::new(),
                state: Mutex::new(QueueState::default()),
            }),
        })
    }

    /// Enqueue a job and try to admit it right away.
    ///
    /// `on_complete` runs exactly once with the job's outcome, on whichever
    /// context records the completion.
    pub fn submit<F>(&self, job: NewJob, on_complete: F)
    where
        F: FnOnce(JobResult) + Send + 'static,
    {
        debug!(
            verifier = %job.verifier_kind,
            job_key = %job.job_key,
            deadline = %job.deadline,
            params = %job.params,
            "verification queue submit"
        );
        self.shared.metrics.submitted.add(
            1,
            &[opentelemetry::KeyValue::new(
                "verifier",
                job.verifier_kind.to_string(),
            )],
        );

        let descriptor = job.into_descriptor(Box::new(on_complete));
        self.shared.lock().pending.push(descriptor);
        self.shared.try_admit_next();
    }

    /// Stop admitting and return a future that resolves once every job
    /// running now has completed. Jobs submitted meanwhile stay pending.
    pub fn pause(&self) -> Drain {
        let mut state = self.shared.lock();
        state.paused = true;
        let tickets: Vec<u64> = state.running.tickets().collect();
        info!(in_flight = tickets.len(), pending = state.pending.len(), "verification queue paused");
        state.drains.add(tickets)
    }

    /// Re-enable admission and start draining the pending FIFO.
    pub fn resume(&self) {
        {
            let mut state = self.shared.lock();
            state.paused = false;
            info!(pending = state.pending.len(), "verification queue resumed");
        }
        self.shared.try_admit_next();
    }

    /// Not paused and below the concurrency limit.
    pub fn can_run(&self) -> bool {
        self.shared.lock().has_capacity(self.shared.concurrency_limit)
    }

    pub fn is_paused(&self) -> bool {
        self.shared.lock().paused
    }

    pub fn concurrency_limit(&self) -> usize {
        self.shared.concurrency_limit
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.shared.lock();
        QueueStats {
            concurrency_limit: self.shared.concurrency_limit,
            paused: state.paused,
            pending: state.pending.len(),
            running: state.running.len(),
            draining: state.drains.outstanding(),
        }
    }
}
