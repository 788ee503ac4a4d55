//! Command verifier: checks declared result files, then runs an executable.
//!
//! The fast path looks at the `results` parameter (a list of file paths). An
//! empty list, or any missing or empty file, settles the job as rejected
//! without running anything. Otherwise the configured command runs on the
//! tokio runtime and its exit status becomes the verdict.

use crate::error::{Error, JobError, JobResult, Result};
use crate::model::{JobKey, Verdict};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{CompletionSignal, FastPath, Verifier, VerifierFactory};

/// Top-level TOML wrapper.
#[derive(Debug, Deserialize)]
struct VerifierFile {
    verifier: VerifierDefinition,
}

/// A command verifier's definition.
#[derive(Debug, Clone, Deserialize)]
pub struct VerifierDefinition {
    pub name: String,
    pub command: PathBuf,
}

impl VerifierDefinition {
    pub fn new(name: impl Into<String>, command: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
        }
    }

    /// Parse a `[verifier]` TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let file: VerifierFile = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("bad verifier config {}: {e}", path.display())))?;
        Ok(file.verifier)
    }
}

pub struct CommandVerifier {
    definition: Arc<VerifierDefinition>,
    signal: CompletionSignal,
    settled: Option<Verdict>,
}

impl CommandVerifier {
    pub fn new(definition: Arc<VerifierDefinition>, signal: CompletionSignal) -> Self {
        Self {
            definition,
            signal,
            settled: None,
        }
    }

    /// Factory building a `CommandVerifier` per admitted job.
    pub fn factory(definition: VerifierDefinition) -> impl VerifierFactory {
        let definition = Arc::new(definition);
        move |signal: CompletionSignal| -> Result<Box<dyn Verifier>> {
            Ok(Box::new(CommandVerifier::new(Arc::clone(&definition), signal)))
        }
    }
}

impl Verifier for CommandVerifier {
    fn fast_path(&mut self, params: &serde_json::Value) -> Result<FastPath> {
        let Some(results) = params.get("results") else {
            return Ok(FastPath::NeedsFull);
        };
        let results = results
            .as_array()
            .ok_or_else(|| Error::Verifier("`results` must be an array of paths".to_string()))?;

        if results.is_empty() {
            self.settled = Some(Verdict::rejected("no result files"));
            return Ok(FastPath::Resolved);
        }

        for result in results {
            let path = result
                .as_str()
                .ok_or_else(|| Error::Verifier(format!("result path is not a string: {result}")))?;
            match std::fs::metadata(path) {
                Ok(meta) if meta.len() > 0 => {}
                Ok(_) => {
                    self.settled = Some(Verdict::rejected(format!("empty result file {path}")));
                    return Ok(FastPath::Resolved);
                }
                Err(e) => {
                    self.settled = Some(Verdict::rejected(format!("missing result file {path}: {e}")));
                    return Ok(FastPath::Resolved);
                }
            }
        }

        Ok(FastPath::NeedsFull)
    }

    fn start(self: Box<Self>, params: serde_json::Value) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Verifier(format!("no tokio runtime to run verifier: {e}")))?;
        let params = serde_json::to_string(&params)
            .map_err(|e| Error::Verifier(format!("serialize params: {e}")))?;

        let CommandVerifier {
            definition, signal, ..
        } = *self;
        runtime.spawn(async move {
            let result = run_command(&definition, signal.job_key(), &params).await;
            signal.complete(result);
        });
        Ok(())
    }

    fn finalize(self: Box<Self>) -> Result<()> {
        let verdict = self
            .settled
            .ok_or_else(|| Error::Verifier("finalize called before the fast path settled".to_string()))?;
        self.signal.complete(Ok(verdict));
        Ok(())
    }

    fn deadline_exceeded(self: Box<Self>, job_key: &JobKey) {
        warn!(
            verifier = %self.definition.name,
            job_key = %job_key,
            "deadline passed before verification started"
        );
    }
}

async fn run_command(definition: &VerifierDefinition, job_key: &JobKey, params: &str) -> JobResult {
    // Relative commands resolve against the process CWD.
    let command = if definition.command.is_relative() {
        std::env::current_dir()
            .map_err(|e| JobError::Verification(format!("cannot resolve cwd: {e}")))?
            .join(&definition.command)
    } else {
        definition.command.clone()
    };

    debug!(
        verifier = %definition.name,
        job_key = %job_key,
        command = %command.display(),
        "running verifier command"
    );

    let status = Command::new(&command)
        .env("VERIFYQ_JOB_KEY", job_key.as_str())
        .env("VERIFYQ_VERIFIER", &definition.name)
        .env("VERIFYQ_PARAMS", params)
        .status()
        .await
        .map_err(|e| {
            JobError::Verification(format!("failed to run {}: {e}", command.display()))
        })?;

    if status.success() {
        Ok(Verdict::Accepted)
    } else {
        Ok(Verdict::rejected(format!(
            "{} exited with status {}",
            definition.name,
            status.code().unwrap_or(-1)
        )))
    }
}
