//! Job handlers.

use async_trait::async_trait;
use lockhead_core::{Error, Job, Result};
use tokio::process::Command;
use tracing::debug;

/// Executes a claimed job.
///
/// Returning an error leaves the job claimed and in the store; the queue does
/// not retry failed executions.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> Result<()>;
}

/// Runs each job's details as a shell command.
#[derive(Debug, Clone)]
pub struct ShellHandler {
    shell: String,
}

impl ShellHandler {
    pub fn new() -> Self {
        Self::with_shell("/bin/sh")
    }

    pub fn with_shell(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

impl Default for ShellHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobHandler for ShellHandler {
    async fn handle(&self, job: &Job) -> Result<()> {
        let output = Command::new(&self.shell)
            .arg("-c")
            .arg(&job.details)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::ExecutionFailed(format!("failed to spawn {}: {}", self.shell, e)))?;

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            debug!(job_id = %job.id, stream = "stdout", "{}", line);
        }
        for line in String::from_utf8_lossy(&output.stderr).lines() {
            debug!(job_id = %job.id, stream = "stderr", "{}", line);
        }

        if output.status.success() {
            Ok(())
        } else {
            Err(Error::ExecutionFailed(format!(
                "command exited with {}",
                output.status
            )))
        }
    }
}
