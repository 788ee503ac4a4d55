//! Running-job registry.
//!
//! Maps a job key to its live admission. The registry is the authoritative
//! count of running jobs; an entry exists from admission until its first
//! completion is recorded.

use crate::model::{CompletionHandler, JobDescriptor, JobKey, JobState, VerifierKind};
use crate::telemetry::job::{record_state_transition, start_job_span};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Instant;
use tracing::Span;

/// What the admission controller needs to launch a verifier.
#[derive(Debug)]
pub(crate) struct AdmittedJob {
    pub(crate) ticket: u64,
    pub(crate) verifier_kind: VerifierKind,
    pub(crate) job_key: JobKey,
    pub(crate) deadline: DateTime<Utc>,
    pub(crate) params: serde_json::Value,
    pub(crate) span: Span,
}

/// Removed entry, returned to the completion dispatcher.
pub(crate) struct CompletedJob {
    pub(crate) verifier_kind: VerifierKind,
    pub(crate) on_complete: CompletionHandler,
    pub(crate) elapsed_ms: u64,
    pub(crate) span: Span,
}

struct RunningJob {
    ticket: u64,
    state: JobState,
    verifier_kind: VerifierKind,
    on_complete: Option<CompletionHandler>,
    admitted_at: Instant,
    span: Span,
}

impl RunningJob {
    /// Move to `to` if the lifecycle allows it, recording it on the job span.
    fn transition(&mut self, to: JobState) -> bool {
        if self.state.can_transition_to(to) {
            record_state_transition(&self.span, self.state, to);
            self.state = to;
            true
        } else {
            false
        }
    }
}

#[derive(Default)]
pub(crate) struct JobRegistry {
    jobs: HashMap<JobKey, RunningJob>,
    next_ticket: u64,
}

impl JobRegistry {
    pub(crate) fn len(&self) -> usize {
        self.jobs.len()
    }

    pub(crate) fn contains(&self, key: &JobKey) -> bool {
        self.jobs.contains_key(key)
    }

    /// Tickets of every live admission.
    pub(crate) fn tickets(&self) -> impl Iterator<Item = u64> + '_ {
        self.jobs.values().map(|job| job.ticket)
    }

    /// Register a pending job as running. The caller guarantees its key is not live.
    pub(crate) fn admit(&mut self, job: JobDescriptor) -> AdmittedJob {
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        let span = start_job_span(job.verifier_kind.as_str(), job.job_key.as_str(), ticket);

        let mut running = RunningJob {
            ticket,
            state: JobState::Pending,
            verifier_kind: job.verifier_kind.clone(),
            on_complete: Some(job.on_complete),
            admitted_at: Instant::now(),
            span: span.clone(),
        };
        running.transition(JobState::Admitted);
        self.jobs.insert(job.job_key.clone(), running);

        AdmittedJob {
            ticket,
            verifier_kind: job.verifier_kind,
            job_key: job.job_key,
            deadline: job.deadline,
            params: job.params,
            span,
        }
    }

    /// Record the completion of admission `ticket` for `key`.
    ///
    /// Returns `None` if the key is not live, belongs to another admission, or
    /// was already completed. Otherwise the entry is removed.
    pub(crate) fn complete(&mut self, key: &JobKey, ticket: u64) -> Option<CompletedJob> {
        let job = self.jobs.get_mut(key)?;
        if job.ticket != ticket || !job.transition(JobState::Completed) {
            return None;
        }
        let on_complete = job.on_complete.take()?;
        let job = self.jobs.remove(key)?;

        Some(CompletedJob {
            verifier_kind: job.verifier_kind,
            on_complete,
            elapsed_ms: job.admitted_at.elapsed().as_millis() as u64,
            span: job.span,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewJob;

    fn descriptor(key: &str) -> JobDescriptor {
        NewJob::within("manual", key, std::time::Duration::from_secs(60))
            .into_descriptor(Box::new(|_| {}))
    }

    #[test]
    fn admit_assigns_increasing_tickets() {
        let mut registry = JobRegistry::default();
        let a = registry.admit(descriptor("a"));
        let b = registry.admit(descriptor("b"));
        assert!(b.ticket > a.ticket);
        assert_eq!(registry.len(), 2);
        assert!(registry.contains(&JobKey::from("a")));
    }

    #[test]
    fn complete_only_once() {
        let mut registry = JobRegistry::default();
        let a = registry.admit(descriptor("a"));
        let key = JobKey::from("a");

        assert!(registry.complete(&key, a.ticket).is_some());
        assert!(registry.complete(&key, a.ticket).is_none());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn complete_with_stale_ticket_is_ignored() {
        let mut registry = JobRegistry::default();
        let key = JobKey::from("a");

        let first = registry.admit(descriptor("a"));
        assert!(registry.complete(&key, first.ticket).is_some());

        let second = registry.admit(descriptor("a"));
        assert!(registry.complete(&key, first.ticket).is_none());
        assert!(registry.contains(&key));
        assert!(registry.complete(&key, second.ticket).is_some());
    }

    #[test]
    fn unknown_key_is_ignored() {
        let mut registry = JobRegistry::default();
        assert!(registry.complete(&JobKey::from("nope"), 1).is_none());
    }
}
