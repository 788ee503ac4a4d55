//! Metric instrument factories for verifyq.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments come from the `"verifyq"` meter. Without a provider they
//! are no-ops.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for verifyq instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("verifyq")
}

/// Counter: verification jobs submitted.
/// Labels: `verifier`.
pub fn jobs_submitted() -> Counter<u64> {
    meter()
        .u64_counter("verifyq.jobs.submitted")
        .with_description("Number of verification jobs submitted")
        .build()
}

/// Counter: verification jobs completed.
/// Labels: `verifier`, `result` ("accepted" | "rejected" | "failed").
pub fn jobs_completed() -> Counter<u64> {
    meter()
        .u64_counter("verifyq.jobs.completed")
        .with_description("Number of verification jobs completed")
        .build()
}

/// Counter: completion signals discarded as stale or duplicate.
pub fn discarded_signals() -> Counter<u64> {
    meter()
        .u64_counter("verifyq.jobs.discarded_signals")
        .with_description("Completion signals discarded by the idempotency guard")
        .build()
}

/// Histogram: time from admission to completion in milliseconds.
/// Labels: `verifier`, `result`.
pub fn job_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("verifyq.job.duration_ms")
        .with_description("Verification job duration in milliseconds")
        .with_unit("ms")
        .build()
}

/// Instruments held by a queue for its lifetime.
#[derive(Clone)]
pub(crate) struct QueueMetrics {
    pub(crate) submitted: Counter<u64>,
    pub(crate) completed: Counter<u64>,
    pub(crate) discarded_signals: Counter<u64>,
    pub(crate) duration_ms: Histogram<f64>,
}

impl QueueMetrics {
    pub(crate) fn new() -> Self {
        Self {
            submitted: jobs_submitted(),
            completed: jobs_completed(),
            discarded_signals: discarded_signals(),
            duration_ms: job_duration_ms(),
        }
    }
}
