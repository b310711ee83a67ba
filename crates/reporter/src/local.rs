// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reporter for running a job by hand: console output goes to stdout and
//! artifacts are copied into a local directory.

use crate::{ReportError, Reporter};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tk_core::{BuildResult, BuildStatus, CommandId, CommandSpec, SnapshotId, SnapshotStatus};
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone, Default)]
pub struct LocalReporter {
    artifacts_dir: Option<PathBuf>,
}

impl LocalReporter {
    pub fn new(artifacts_dir: Option<PathBuf>) -> Self {
        Self { artifacts_dir }
    }
}

/// Destination for `src` inside `dir`, prefixing the command id on name clashes.
fn artifact_destination(dir: &Path, command: &CommandId, src: &Path) -> PathBuf {
    let name = src
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string());
    let dest = dir.join(&name);
    if dest.exists() {
        dir.join(format!("{command}-{name}"))
    } else {
        dest
    }
}

#[async_trait]
impl Reporter for LocalReporter {
    async fn push_job_status(
        &self,
        status: BuildStatus,
        result: Option<BuildResult>,
    ) -> Result<(), ReportError> {
        match result {
            Some(result) => tracing::info!(%status, %result, "job status"),
            None => tracing::info!(%status, "job status"),
        }
        Ok(())
    }

    async fn push_command_status(
        &self,
        command: &CommandId,
        status: BuildStatus,
        exit_code: Option<i32>,
        _output: Option<&[u8]>,
    ) -> Result<(), ReportError> {
        tracing::info!(%command, %status, ?exit_code, "command status");
        Ok(())
    }

    async fn push_log_chunk(&self, _source: &str, chunk: &[u8]) -> Result<(), ReportError> {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(chunk).await?;
        stdout.flush().await?;
        Ok(())
    }

    async fn push_snapshot_status(
        &self,
        snapshot: &SnapshotId,
        status: SnapshotStatus,
    ) -> Result<(), ReportError> {
        tracing::info!(%snapshot, %status, "snapshot status");
        Ok(())
    }

    async fn publish_artifacts(
        &self,
        command: &CommandSpec,
        artifacts: &[PathBuf],
    ) -> Result<(), ReportError> {
        let Some(dir) = &self.artifacts_dir else {
            for path in artifacts {
                tracing::info!(command = %command.id, artifact = %path.display(), "artifact found");
            }
            return Ok(());
        };

        tokio::fs::create_dir_all(dir).await?;
        for src in artifacts {
            let dest = artifact_destination(dir, &command.id, src);
            tokio::fs::copy(src, &dest).await?;
            tracing::info!(command = %command.id, artifact = %dest.display(), "artifact copied");
        }
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ReportError> {
        Ok(())
    }
}

#[cfg(test)]
#[path = "local_tests.rs"]
mod tests;
