// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Backend that runs commands directly on the host

use super::{with_shebang, BackendError, ExecutionBackend};
use crate::subprocess::run_streaming;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tk_core::{CommandResult, CommandSpec, JobConfig, SnapshotId};
use tk_reporter::LogBuffer;

/// Runs each command as a host process inside a workspace directory.
///
/// No isolation: suitable for trusted jobs and local runs.
#[derive(Clone)]
pub struct NullBackend {
    workspace: PathBuf,
    job: Arc<Mutex<Option<Arc<JobConfig>>>>,
}

impl NullBackend {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            job: Arc::new(Mutex::new(None)),
        }
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    fn resolve_cwd(&self, cwd: &str) -> PathBuf {
        let cwd = Path::new(cwd);
        if cwd.is_absolute() {
            cwd.to_path_buf()
        } else {
            self.workspace.join(cwd)
        }
    }
}

/// Command that runs `path` through the interpreter named on its `#!` line.
///
/// Going through the interpreter avoids executing a file that was just
/// written, which can fail with ETXTBSY while another thread forks.
fn interpreter_command(script: &str, path: &Path) -> std::process::Command {
    let line = script
        .lines()
        .next()
        .and_then(|l| l.strip_prefix("#!"))
        .unwrap_or("/bin/bash");
    let mut parts = line.split_whitespace();
    let program = parts.next().unwrap_or("/bin/bash");
    let mut cmd = std::process::Command::new(program);
    cmd.args(parts).arg(path);
    cmd
}

#[async_trait]
impl ExecutionBackend for NullBackend {
    fn name(&self) -> &'static str {
        "basic"
    }

    async fn init(&self, job: Arc<JobConfig>) -> Result<(), BackendError> {
        *self.job.lock() = Some(job);
        Ok(())
    }

    async fn prepare(&self, log: &LogBuffer) -> Result<(), BackendError> {
        if self.job.lock().is_none() {
            return Err(BackendError::NotInitialized);
        }
        tokio::fs::create_dir_all(&self.workspace).await?;
        log.line(format_args!(
            "[basic] running commands in {}",
            self.workspace.display()
        ));
        Ok(())
    }

    async fn run(&self, cmd: &CommandSpec, log: &LogBuffer) -> Result<CommandResult, BackendError> {
        let cwd = self.resolve_cwd(&cmd.cwd);
        tokio::fs::create_dir_all(&cwd).await?;

        let script = with_shebang(&cmd.script);
        let mut file = tempfile::Builder::new().prefix("script-").tempfile()?;
        file.write_all(script.as_bytes())?;
        file.flush()?;

        let mut process = interpreter_command(&script, file.path());
        process.current_dir(&cwd).envs(cmd.env.iter());

        let out = run_streaming(process, log, cmd.capture_output).await?;
        Ok(CommandResult::new(out.exit_code, out.captured))
    }

    async fn capture_snapshot(
        &self,
        _id: &SnapshotId,
        _log: &LogBuffer,
    ) -> Result<(), BackendError> {
        Err(BackendError::Unsupported {
            operation: "capture_snapshot",
            backend: self.name(),
        })
    }

    async fn shutdown(&self, _log: &LogBuffer) -> Result<(), BackendError> {
        Ok(())
    }

    async fn collect_artifacts(
        &self,
        patterns: &[String],
        _log: &LogBuffer,
    ) -> Result<Vec<PathBuf>, BackendError> {
        Ok(crate::artifacts::find(&self.workspace, patterns)?)
    }
}

#[cfg(test)]
#[path = "null_tests.rs"]
mod tests;
