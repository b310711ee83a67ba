// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution backends: where and how a job's commands run

mod any;
mod null;
mod traced;

pub use any::AnyBackend;
pub use null::NullBackend;
pub use traced::TracedBackend;

#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{BackendCall, FakeBackend};

use crate::container::ContainerError;
use crate::lock::LockError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tk_core::{CommandResult, CommandSpec, JobConfig, SnapshotId};
use tk_reporter::LogBuffer;

/// Errors from execution backends
#[derive(Debug, Error)]
pub enum BackendError {
    #[error(transparent)]
    Container(#[from] ContainerError),
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid artifact pattern: {0}")]
    Pattern(#[from] glob::PatternError),
    #[error("{operation} is not supported by the {backend} backend")]
    Unsupported {
        operation: &'static str,
        backend: &'static str,
    },
    #[error("backend used before init")]
    NotInitialized,
    #[error("backend used before prepare")]
    NotPrepared,
    #[error("{0}")]
    Failed(String),
}

/// Environment that runs a job's commands.
///
/// Call order is `init`, `prepare`, any number of `run` and
/// `collect_artifacts`, optionally `capture_snapshot`, then `shutdown`.
/// `shutdown` must succeed when nothing was ever prepared and when called
/// more than once.
#[async_trait]
pub trait ExecutionBackend: Send + Sync + 'static {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Accept the job description. No side effects outside the process.
    async fn init(&self, job: Arc<JobConfig>) -> Result<(), BackendError>;

    /// Build the environment commands run in.
    async fn prepare(&self, log: &LogBuffer) -> Result<(), BackendError>;

    /// Run one command, streaming its output into `log`.
    async fn run(&self, cmd: &CommandSpec, log: &LogBuffer) -> Result<CommandResult, BackendError>;

    /// Persist the environment as a reusable snapshot image.
    async fn capture_snapshot(&self, id: &SnapshotId, log: &LogBuffer)
        -> Result<(), BackendError>;

    /// Tear the environment down.
    async fn shutdown(&self, log: &LogBuffer) -> Result<(), BackendError>;

    /// Host paths of files matching `patterns` in the workspace.
    async fn collect_artifacts(
        &self,
        patterns: &[String],
        log: &LogBuffer,
    ) -> Result<Vec<PathBuf>, BackendError>;
}

/// Script text with an interpreter line, defaulting to bash.
pub(crate) fn with_shebang(script: &str) -> String {
    if script.starts_with("#!") {
        script.to_string()
    } else {
        format!("#!/bin/bash\n{script}")
    }
}

#[cfg(test)]
#[path = "../backend_tests.rs"]
mod tests;
