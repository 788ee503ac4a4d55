//! Drain barriers backing `pause()`.
//!
//! Each pause snapshots the tickets running at that instant. Completions tick
//! them off; when none are left the barrier resolves its [`Drain`] future.
//! Failed jobs count toward resolution just like successful ones.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Summary of the jobs a drain waited on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainReport {
    /// Jobs that finished with a verdict.
    pub completed: usize,
    /// Jobs that finished with a job error.
    pub failed: usize,
}

impl DrainReport {
    pub fn total(&self) -> usize {
        self.completed + self.failed
    }
}

/// Future returned by `pause()`. Resolves once every job running at pause
/// time has completed.
#[derive(Debug)]
#[must_use = "a drain does nothing unless awaited"]
pub struct Drain {
    rx: oneshot::Receiver<DrainReport>,
}

impl Drain {
    /// The report, if the drain has already resolved.
    pub fn try_report(&mut self) -> Option<DrainReport> {
        self.rx.try_recv().ok()
    }
}

impl Future for Drain {
    type Output = DrainReport;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<DrainReport> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|report| report.unwrap_or_default())
    }
}

struct Barrier {
    waiting: HashSet<u64>,
    report: DrainReport,
    tx: Option<oneshot::Sender<DrainReport>>,
}

impl Barrier {
    fn resolve(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(self.report);
        }
    }
}

impl Drop for Barrier {
    // Queue dropped mid-drain: hand back what was observed.
    fn drop(&mut self) {
        self.resolve();
    }
}

/// Barriers whose jobs all completed. Resolved outside the queue lock.
pub(crate) struct Resolved(Vec<Barrier>);

impl Resolved {
    pub(crate) fn notify(self) {
        for mut barrier in self.0 {
            barrier.resolve();
        }
    }
}

#[derive(Default)]
pub(crate) struct DrainBarriers {
    barriers: Vec<Barrier>,
}

impl DrainBarriers {
    /// Add a barrier over `tickets`. Resolves immediately if there are none.
    pub(crate) fn add(&mut self, tickets: impl IntoIterator<Item = u64>) -> Drain {
        let (tx, rx) = oneshot::channel();
        let mut barrier = Barrier {
            waiting: tickets.into_iter().collect(),
            report: DrainReport::default(),
            tx: Some(tx),
        };

        if barrier.waiting.is_empty() {
            barrier.resolve();
        } else {
            self.barriers.push(barrier);
        }
        Drain { rx }
    }

    /// Tick `ticket` off every barrier waiting on it.
    pub(crate) fn record(&mut self, ticket: u64, failed: bool) -> Resolved {
        for barrier in &mut self.barriers {
            if barrier.waiting.remove(&ticket) {
                if failed {
                    barrier.report.failed += 1;
                } else {
                    barrier.report.completed += 1;
                }
            }
        }

        let (done, waiting) = std::mem::take(&mut self.barriers)
            .into_iter()
            .partition(|barrier| barrier.waiting.is_empty());
        self.barriers = waiting;
        Resolved(done)
    }

    pub(crate) fn outstanding(&self) -> usize {
        self.barriers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_barrier_resolves_immediately() {
        let mut barriers = DrainBarriers::default();
        let mut drain = barriers.add(Vec::<u64>::new());
        assert_eq!(drain.try_report(), Some(DrainReport::default()));
        assert_eq!(barriers.outstanding(), 0);
    }

    #[test]
    fn barrier_resolves_after_last_ticket() {
        let mut barriers = DrainBarriers::default();
        let mut drain = barriers.add([1, 2]);

        barriers.record(1, false).notify();
        assert_eq!(drain.try_report(), None);

        barriers.record(3, false).notify();
        assert_eq!(drain.try_report(), None);

        barriers.record(2, true).notify();
        assert_eq!(
            drain.try_report(),
            Some(DrainReport {
                completed: 1,
                failed: 1
            })
        );
        assert_eq!(barriers.outstanding(), 0);
    }

    #[test]
    fn dropping_barriers_resolves_with_partial_report() {
        let mut barriers = DrainBarriers::default();
        let mut drain = barriers.add([1, 2]);
        barriers.record(1, false).notify();
        drop(barriers);
        assert_eq!(
            drain.try_report(),
            Some(DrainReport {
                completed: 1,
                failed: 0
            })
        );
    }
}
