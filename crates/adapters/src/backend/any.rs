// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Backend selected once at startup

use super::{BackendError, ExecutionBackend, NullBackend};
use crate::container::{ContainerBackend, LxcRuntime};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tk_core::{CommandResult, CommandSpec, JobConfig, SnapshotId};
use tk_reporter::LogBuffer;

/// One of the concrete backends, dispatched by match.
pub enum AnyBackend {
    Null(NullBackend),
    Lxc(Box<ContainerBackend<LxcRuntime>>),
}

impl From<NullBackend> for AnyBackend {
    fn from(backend: NullBackend) -> Self {
        AnyBackend::Null(backend)
    }
}

impl From<ContainerBackend<LxcRuntime>> for AnyBackend {
    fn from(backend: ContainerBackend<LxcRuntime>) -> Self {
        AnyBackend::Lxc(Box::new(backend))
    }
}

impl AnyBackend {
    /// Clean up after a crashed predecessor before anything is created.
    pub async fn clean_leftover_state(&self) -> Option<String> {
        match self {
            AnyBackend::Null(_) => None,
            AnyBackend::Lxc(b) => b.clean_leftover_state().await,
        }
    }
}

macro_rules! dispatch {
    ($self:ident, $b:ident => $call:expr) => {
        match $self {
            AnyBackend::Null($b) => $call,
            AnyBackend::Lxc($b) => $call,
        }
    };
}

#[async_trait]
impl ExecutionBackend for AnyBackend {
    fn name(&self) -> &'static str {
        dispatch!(self, b => b.name())
    }

    async fn init(&self, job: Arc<JobConfig>) -> Result<(), BackendError> {
        dispatch!(self, b => b.init(job).await)
    }

    async fn prepare(&self, log: &LogBuffer) -> Result<(), BackendError> {
        dispatch!(self, b => b.prepare(log).await)
    }

    async fn run(&self, cmd: &CommandSpec, log: &LogBuffer) -> Result<CommandResult, BackendError> {
        dispatch!(self, b => b.run(cmd, log).await)
    }

    async fn capture_snapshot(&self, id: &SnapshotId, log: &LogBuffer) -> Result<(), BackendError> {
        dispatch!(self, b => b.capture_snapshot(id, log).await)
    }

    async fn shutdown(&self, log: &LogBuffer) -> Result<(), BackendError> {
        dispatch!(self, b => b.shutdown(log).await)
    }

    async fn collect_artifacts(
        &self,
        patterns: &[String],
        log: &LogBuffer,
    ) -> Result<Vec<PathBuf>, BackendError> {
        dispatch!(self, b => b.collect_artifacts(patterns, log).await)
    }
}
