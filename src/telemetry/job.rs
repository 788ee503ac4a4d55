//! Job span helpers.
//!
//! Provides span creation and state-transition recording for verification
//! jobs moving through the queue.

use crate::model::JobState;
use tracing::Span;

/// Start a span covering one admission of a verification job.
///
/// The `job.state` field is declared empty and can be updated via
/// [`record_state_transition`].
pub fn start_job_span(verifier: &str, job_key: &str, ticket: u64) -> Span {
    tracing::info_span!(
        "job.verify",
        "job.verifier" = verifier,
        "job.key" = job_key,
        "job.ticket" = ticket,
        "job.state" = tracing::field::Empty,
    )
}

/// Record a state transition on the given span.
///
/// Updates `job.state` and emits a tracing `info` event scoped to the span.
pub fn record_state_transition(span: &Span, from: JobState, to: JobState) {
    span.record("job.state", tracing::field::display(to));
    span.in_scope(|| {
        tracing::info!(
            from = %from,
            to = %to,
            terminal = to.is_terminal(),
            "state_transition"
        );
    });
}
