//! verifyq CLI: run a batch of verification jobs through the queue.

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{info, warn};
use verifyq::config::Config;
use verifyq::telemetry::{TelemetryConfig, init_telemetry};
use verifyq::{
    DrainReport, JobKey, JobResult, NewJob, VerificationQueue, VerifierKind, VerifierRegistry,
};

#[derive(Parser)]
#[command(name = "verifyq", about = "Verification admission-and-execution queue")]
struct Cli {
    /// Directory containing verifier TOML definitions
    #[arg(long, global = true)]
    verifiers: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit every job in a jobs file and report outcomes
    Run {
        /// TOML file with `[[job]]` entries
        #[arg(long)]
        jobs: PathBuf,
        /// Maximum concurrent verifications (overrides VERIFYQ_CONCURRENCY)
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// List the verifier kinds that would be loaded
    Verifiers,
}

/// Top-level jobs file.
#[derive(Debug, Deserialize)]
struct JobsFile {
    #[serde(default)]
    job: Vec<JobEntry>,
}

#[derive(Debug, Deserialize)]
struct JobEntry {
    key: String,
    verifier: String,
    /// Seconds from now until the job may no longer start.
    deadline_secs: u64,
    #[serde(default)]
    params: Option<serde_json::Value>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;
    let verifier_dir = cli.verifiers.unwrap_or_else(|| config.verifier_dir.clone());

    match cli.command {
        Command::Run { jobs, concurrency } => {
            let _guard = init_telemetry(TelemetryConfig {
                endpoint: config.otel_endpoint.clone(),
                service_name: "verifyq".to_string(),
                log_level: config.log_level.clone(),
            })?;
            let concurrency = concurrency.unwrap_or(config.concurrency);
            cmd_run(&verifier_dir, &jobs, concurrency).await
        }
        Command::Verifiers => cmd_verifiers(&verifier_dir),
    }
}

async fn cmd_run(verifier_dir: &Path, jobs: &Path, concurrency: usize) -> anyhow::Result<()> {
    let registry = VerifierRegistry::load_from_dir(verifier_dir)?;
    let content = std::fs::read_to_string(jobs)
        .with_context(|| format!("cannot read jobs file {}", jobs.display()))?;
    let file: JobsFile = toml::from_str(&content)
        .with_context(|| format!("bad jobs file {}", jobs.display()))?;

    for entry in &file.job {
        if !registry.contains(&VerifierKind::from(entry.verifier.as_str())) {
            warn!(job_key = %entry.key, verifier = %entry.verifier, "no such verifier, job will fail");
        }
    }

    info!(verifiers = registry.len(), "loaded verifier registry");
    let queue = VerificationQueue::new(concurrency, registry)?;
    let (tx, mut rx) = mpsc::unbounded_channel::<(JobKey, JobResult)>();

    let total = file.job.len();
    info!(total, concurrency, "submitting jobs");
    for entry in file.job {
        let key = JobKey::from(entry.key);
        let mut job = NewJob::within(
            entry.verifier,
            key.clone(),
            std::time::Duration::from_secs(entry.deadline_secs),
        );
        if let Some(params) = entry.params {
            job = job.params(params);
        }
        let tx = tx.clone();
        queue.submit(job, move |result| {
            let _ = tx.send((key, result));
        });
    }
    drop(tx);

    let mut tally = Tally::default();
    loop {
        tokio::select! {
            outcome = rx.recv() => {
                let Some((key, result)) = outcome else { break };
                tally.record(&key, result);
            }
            _ = tokio::signal::ctrl_c() => {
                let stats = queue.stats();
                println!(
                    "Interrupted: pausing ({} running, {} pending)",
                    stats.running, stats.pending
                );
                let report = pause_and_drain(&queue, &mut rx, &mut tally).await;
                println!(
                    "Drained {} running job(s): {} completed, {} failed",
                    report.total(),
                    report.completed,
                    report.failed
                );
                break;
            }
        }
    }

    println!("{}/{total} finished, {} accepted", tally.finished, tally.accepted);
    Ok(())
}

/// Outcomes printed so far.
#[derive(Debug, Default)]
struct Tally {
    finished: usize,
    accepted: usize,
}

impl Tally {
    fn record(&mut self, key: &JobKey, result: JobResult) {
        self.finished += 1;
        match result {
            Ok(verdict) => {
                if verdict.is_accepted() {
                    self.accepted += 1;
                }
                println!("{key}: {verdict}");
            }
            Err(e) => println!("{key}: error: {e}"),
        }
    }
}

/// Pause the queue and report every outcome that arrives while it drains.
///
/// Handlers run before the drain resolves, so once it has, the outcomes of
/// the drained jobs are already in `rx`.
async fn pause_and_drain(
    queue: &VerificationQueue,
    rx: &mut mpsc::UnboundedReceiver<(JobKey, JobResult)>,
    tally: &mut Tally,
) -> DrainReport {
    let mut drain = queue.pause();
    let report = loop {
        tokio::select! {
            report = &mut drain => break report,
            Some((key, result)) = rx.recv() => tally.record(&key, result),
        }
    };
    while let Ok((key, result)) = rx.try_recv() {
        tally.record(&key, result);
    }
    report
}

fn cmd_verifiers(verifier_dir: &Path) -> anyhow::Result<()> {
    let registry = VerifierRegistry::load_from_dir(verifier_dir)?;
    if registry.is_empty() {
        println!("No verifiers in {}", verifier_dir.display());
        return Ok(());
    }
    for kind in registry.kinds() {
        println!("{kind}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use verifyq::{CompletionSignal, FastPath, Verifier};

    /// Accepts from a background thread shortly after starting.
    struct Delayed {
        signal: CompletionSignal,
    }

    impl Verifier for Delayed {
        fn fast_path(&mut self, _params: &serde_json::Value) -> verifyq::Result<FastPath> {
            Ok(FastPath::NeedsFull)
        }

        fn start(self: Box<Self>, _params: serde_json::Value) -> verifyq::Result<()> {
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(30));
                self.signal.accept();
            });
            Ok(())
        }

        fn finalize(self: Box<Self>) -> verifyq::Result<()> {
            Ok(())
        }

        fn deadline_exceeded(self: Box<Self>, _job_key: &JobKey) {}
    }

    #[tokio::test]
    async fn drained_jobs_are_counted_as_finished() {
        let mut registry = VerifierRegistry::empty();
        registry.register(
            "delayed",
            |signal: CompletionSignal| -> verifyq::Result<Box<dyn Verifier>> {
                Ok(Box::new(Delayed { signal }))
            },
        );
        let queue = VerificationQueue::new(2, registry).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        for key in ["a", "b", "c"] {
            let tx = tx.clone();
            let key = JobKey::from(key);
            queue.submit(
                NewJob::within("delayed", key.clone(), Duration::from_secs(60)),
                move |result| {
                    let _ = tx.send((key, result));
                },
            );
        }

        let mut tally = Tally::default();
        let report = pause_and_drain(&queue, &mut rx, &mut tally).await;

        assert_eq!(report.completed, 2);
        assert_eq!(tally.finished, 2);
        assert_eq!(tally.accepted, 2);
        assert_eq!(queue.stats().pending, 1);
    }
}
