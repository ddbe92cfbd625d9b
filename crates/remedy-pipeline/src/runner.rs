// ABOUTME: Runs the correctness suite against the patched source as a bounded child process
// ABOUTME: Output is captured whole; spawn failures and timeouts surface as RemedyError::Runner
use async_trait::async_trait;
use remedy_core::{CorrectnessOutcome, RemedyError, Result, RunnerConfig};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

#[async_trait]
pub trait CorrectnessRunner: Send + Sync {
    async fn run(&self, target: &Path) -> Result<CorrectnessOutcome>;
}

/// Invokes `program args... target` and reports the exit status.
pub struct CommandRunner {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    working_dir: Option<PathBuf>,
}

impl CommandRunner {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
            working_dir: None,
        }
    }

    pub fn from_config(config: &RunnerConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            timeout: config.timeout(),
            working_dir: config.working_dir.clone(),
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

#[async_trait]
impl CorrectnessRunner for CommandRunner {
    async fn run(&self, target: &Path) -> Result<CorrectnessOutcome> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(target)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        debug!(program = %self.program, target = %target.display(), "running correctness check");
        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| {
                RemedyError::Runner(format!(
                    "{} timed out after {}s",
                    self.program,
                    self.timeout.as_secs_f64()
                ))
            })?
            .map_err(|e| RemedyError::Runner(format!("failed to run {}: {}", self.program, e)))?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            if !combined.is_empty() && !combined.ends_with('\n') {
                combined.push('\n');
            }
            combined.push_str(&stderr);
        }

        let success = output.status.success();
        info!(program = %self.program, success, status = ?output.status.code(), "correctness check finished");
        Ok(CorrectnessOutcome {
            success,
            output: combined,
        })
    }
}
