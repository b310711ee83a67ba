// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! No-op reporter

use crate::{ReportError, Reporter};
use async_trait::async_trait;
use std::path::PathBuf;
use tk_core::{BuildResult, BuildStatus, CommandId, CommandSpec, SnapshotId, SnapshotStatus};

/// Reporter that discards everything
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpReporter;

impl NoOpReporter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Reporter for NoOpReporter {
    async fn push_job_status(
        &self,
        _status: BuildStatus,
        _result: Option<BuildResult>,
    ) -> Result<(), ReportError> {
        Ok(())
    }

    async fn push_command_status(
        &self,
        _command: &CommandId,
        _status: BuildStatus,
        _exit_code: Option<i32>,
        _output: Option<&[u8]>,
    ) -> Result<(), ReportError> {
        Ok(())
    }

    async fn push_log_chunk(&self, _source: &str, _chunk: &[u8]) -> Result<(), ReportError> {
        Ok(())
    }

    async fn push_snapshot_status(
        &self,
        _snapshot: &SnapshotId,
        _status: SnapshotStatus,
    ) -> Result<(), ReportError> {
        Ok(())
    }

    async fn publish_artifacts(
        &self,
        _command: &CommandSpec,
        _artifacts: &[PathBuf],
    ) -> Result<(), ReportError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ReportError> {
        Ok(())
    }
}
