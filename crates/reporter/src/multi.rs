// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fan-out over several reporters.

use crate::{ReportError, Reporter};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tk_core::{BuildResult, BuildStatus, CommandId, CommandSpec, SnapshotId, SnapshotStatus};

/// Forwards every call to each destination in order.
///
/// All destinations are always tried. The first fatal error is returned,
/// otherwise the first error encountered.
#[derive(Clone, Default)]
pub struct MultiReporter {
    reporters: Vec<Arc<dyn Reporter>>,
}

impl MultiReporter {
    pub fn new(reporters: Vec<Arc<dyn Reporter>>) -> Self {
        Self { reporters }
    }

    pub fn len(&self) -> usize {
        self.reporters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reporters.is_empty()
    }
}

/// Keep the first error, upgraded to the first fatal one; log the rest.
fn merge(first: &mut Option<ReportError>, result: Result<(), ReportError>) {
    let Err(e) = result else {
        return;
    };
    match first {
        Some(kept) if e.is_fatal() && !kept.is_fatal() => {
            tracing::warn!(error = %kept, "additional reporter error");
            *first = Some(e);
        }
        Some(_) => tracing::warn!(error = %e, "additional reporter error"),
        None => *first = Some(e),
    }
}

fn finish(first: Option<ReportError>) -> Result<(), ReportError> {
    match first {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[async_trait]
impl Reporter for MultiReporter {
    async fn push_job_status(
        &self,
        status: BuildStatus,
        result: Option<BuildResult>,
    ) -> Result<(), ReportError> {
        let mut first = None;
        for r in &self.reporters {
            merge(&mut first, r.push_job_status(status, result).await);
        }
        finish(first)
    }

    async fn push_command_status(
        &self,
        command: &CommandId,
        status: BuildStatus,
        exit_code: Option<i32>,
        output: Option<&[u8]>,
    ) -> Result<(), ReportError> {
        let mut first = None;
        for r in &self.reporters {
            merge(
                &mut first,
                r.push_command_status(command, status, exit_code, output)
                    .await,
            );
        }
        finish(first)
    }

    async fn push_log_chunk(&self, source: &str, chunk: &[u8]) -> Result<(), ReportError> {
        let mut first = None;
        for r in &self.reporters {
            merge(&mut first, r.push_log_chunk(source, chunk).await);
        }
        finish(first)
    }

    async fn push_snapshot_status(
        &self,
        snapshot: &SnapshotId,
        status: SnapshotStatus,
    ) -> Result<(), ReportError> {
        let mut first = None;
        for r in &self.reporters {
            merge(&mut first, r.push_snapshot_status(snapshot, status).await);
        }
        finish(first)
    }

    async fn publish_artifacts(
        &self,
        command: &CommandSpec,
        artifacts: &[PathBuf],
    ) -> Result<(), ReportError> {
        let mut first = None;
        for r in &self.reporters {
            merge(&mut first, r.publish_artifacts(command, artifacts).await);
        }
        finish(first)
    }

    async fn shutdown(&self) -> Result<(), ReportError> {
        let mut first = None;
        for r in &self.reporters {
            merge(&mut first, r.shutdown().await);
        }
        finish(first)
    }
}

#[cfg(test)]
#[path = "multi_tests.rs"]
mod tests;
