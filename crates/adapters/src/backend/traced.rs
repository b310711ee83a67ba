// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Traced backend wrapper for consistent observability

use super::{BackendError, ExecutionBackend};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tk_core::{CommandResult, CommandSpec, JobConfig, SnapshotId};
use tk_reporter::LogBuffer;
use tracing::Instrument;

/// Wrapper that adds spans and timing to any ExecutionBackend
#[derive(Clone)]
pub struct TracedBackend<B> {
    inner: B,
}

impl<B> TracedBackend<B> {
    pub fn new(inner: B) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }
}

#[async_trait]
impl<B: ExecutionBackend> ExecutionBackend for TracedBackend<B> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn init(&self, job: Arc<JobConfig>) -> Result<(), BackendError> {
        tracing::debug!(backend = self.name(), job = %job.id, commands = job.commands.len(), "init");
        self.inner.init(job).await
    }

    async fn prepare(&self, log: &LogBuffer) -> Result<(), BackendError> {
        async {
            tracing::info!("preparing");
            let start = Instant::now();
            let result = self.inner.prepare(log).await;
            let elapsed_ms = start.elapsed().as_millis() as u64;
            match &result {
                Ok(()) => tracing::info!(elapsed_ms, "prepared"),
                Err(e) => tracing::error!(elapsed_ms, error = %e, "prepare failed"),
            }
            result
        }
        .instrument(tracing::info_span!("backend.prepare", backend = self.name()))
        .await
    }

    async fn run(&self, cmd: &CommandSpec, log: &LogBuffer) -> Result<CommandResult, BackendError> {
        async {
            tracing::info!(env_count = cmd.env.len(), capture = cmd.capture_output, "starting");
            let start = Instant::now();
            let result = self.inner.run(cmd, log).await;
            let elapsed_ms = start.elapsed().as_millis() as u64;
            match &result {
                Ok(r) => tracing::info!(exit_code = r.exit_code, elapsed_ms, "command finished"),
                Err(e) => tracing::error!(elapsed_ms, error = %e, "command failed to run"),
            }
            result
        }
        .instrument(tracing::info_span!("backend.run", command = %cmd.id, cwd = %cmd.cwd))
        .await
    }

    async fn capture_snapshot(&self, id: &SnapshotId, log: &LogBuffer) -> Result<(), BackendError> {
        async {
            let start = Instant::now();
            let result = self.inner.capture_snapshot(id, log).await;
            let elapsed_ms = start.elapsed().as_millis() as u64;
            match &result {
                Ok(()) => tracing::info!(elapsed_ms, "snapshot captured"),
                Err(e) => tracing::error!(elapsed_ms, error = %e, "snapshot failed"),
            }
            result
        }
        .instrument(tracing::info_span!("backend.snapshot", snapshot = %id))
        .await
    }

    async fn shutdown(&self, log: &LogBuffer) -> Result<(), BackendError> {
        let result = self.inner.shutdown(log).await;
        tracing::info_span!("backend.shutdown", backend = self.name()).in_scope(|| match &result {
            Ok(()) => tracing::info!("shut down"),
            Err(e) => tracing::warn!(error = %e, "shutdown failed"),
        });
        result
    }

    async fn collect_artifacts(
        &self,
        patterns: &[String],
        log: &LogBuffer,
    ) -> Result<Vec<PathBuf>, BackendError> {
        let result = self.inner.collect_artifacts(patterns, log).await;
        tracing::debug!(
            ?patterns,
            found = result.as_ref().map(|v| v.len()).ok(),
            "collected artifacts"
        );
        result
    }
}

#[cfg(test)]
#[path = "traced_tests.rs"]
mod tests;
