//! Job span state transitions, observed through a capturing subscriber.
//!
//! Lives in its own test binary so the scoped subscriber is the only one
//! any callsite ever sees.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::layer::{Context, SubscriberExt};
use verifyq::{
    CompletionSignal, FastPath, JobKey, NewJob, VerificationQueue, Verifier, VerifierRegistry,
};

/// `(from, to)` of every `state_transition` event.
#[derive(Clone, Default)]
struct TransitionLog(Arc<Mutex<Vec<(String, String)>>>);

impl TransitionLog {
    fn entries(&self) -> Vec<(String, String)> {
        self.0.lock().unwrap().clone()
    }
}

#[derive(Default)]
struct TransitionFields {
    from: Option<String>,
    to: Option<String>,
}

impl tracing::field::Visit for TransitionFields {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        match field.name() {
            "from" => self.from = Some(format!("{value:?}")),
            "to" => self.to = Some(format!("{value:?}")),
            _ => {}
        }
    }
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for TransitionLog {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut fields = TransitionFields::default();
        event.record(&mut fields);
        if let (Some(from), Some(to)) = (fields.from, fields.to) {
            self.0.lock().unwrap().push((from, to));
        }
    }
}

/// Accepts as soon as it is started.
struct Immediate {
    signal: CompletionSignal,
}

impl Verifier for Immediate {
    fn fast_path(&mut self, _params: &serde_json::Value) -> verifyq::Result<FastPath> {
        Ok(FastPath::NeedsFull)
    }

    fn start(self: Box<Self>, _params: serde_json::Value) -> verifyq::Result<()> {
        self.signal.accept();
        Ok(())
    }

    fn finalize(self: Box<Self>) -> verifyq::Result<()> {
        Ok(())
    }

    fn deadline_exceeded(self: Box<Self>, _job_key: &JobKey) {}
}

fn transition(from: &str, to: &str) -> (String, String) {
    (from.to_string(), to.to_string())
}

#[test]
fn admission_and_completion_are_recorded_for_every_job() {
    let log = TransitionLog::default();
    let subscriber = tracing_subscriber::registry().with(log.clone());

    tracing::subscriber::with_default(subscriber, || {
        let mut registry = VerifierRegistry::empty();
        registry.register(
            "immediate",
            |signal: CompletionSignal| -> verifyq::Result<Box<dyn Verifier>> {
                Ok(Box::new(Immediate { signal }))
            },
        );
        let queue = VerificationQueue::new(1, registry).unwrap();

        queue.submit(
            NewJob::within("immediate", "a", Duration::from_secs(60)),
            |_| {},
        );
        // Fails at start; still completes through the same path.
        queue.submit(NewJob::within("missing", "b", Duration::from_secs(60)), |_| {});
    });

    assert_eq!(
        log.entries(),
        vec![
            transition("pending", "admitted"),
            transition("admitted", "completed"),
            transition("pending", "admitted"),
            transition("admitted", "completed"),
        ]
    );
}
