// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake execution backend for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{BackendError, ExecutionBackend};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tk_core::{CommandId, CommandResult, CommandSpec, JobConfig, SnapshotId};
use tk_reporter::LogBuffer;

/// Recorded backend call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Init { job: String },
    Prepare,
    Run { id: CommandId },
    CaptureSnapshot { id: SnapshotId },
    Shutdown,
    CollectArtifacts { patterns: Vec<String> },
}

#[derive(Default)]
struct FakeBackendState {
    calls: Vec<BackendCall>,
    exit_codes: HashMap<String, i32>,
    outputs: HashMap<String, Vec<u8>>,
    run_errors: HashSet<String>,
    blocked: HashSet<String>,
    artifacts: Vec<PathBuf>,
    fail_prepare: Option<String>,
    fail_snapshot: Option<String>,
}

/// Fake backend that records calls and returns scripted results
#[derive(Clone, Default)]
pub struct FakeBackend {
    inner: Arc<Mutex<FakeBackendState>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<BackendCall> {
        self.inner.lock().calls.clone()
    }

    /// Exit code for a command (default 0)
    pub fn set_exit_code(&self, cmd: &str, code: i32) {
        self.inner.lock().exit_codes.insert(cmd.to_string(), code);
    }

    /// Output a command writes to the log
    pub fn set_output(&self, cmd: &str, output: &[u8]) {
        self.inner
            .lock()
            .outputs
            .insert(cmd.to_string(), output.to_vec());
    }

    /// Make `run` return an error for this command
    pub fn set_run_error(&self, cmd: &str) {
        self.inner.lock().run_errors.insert(cmd.to_string());
    }

    /// Make `run` for this command never complete
    pub fn block(&self, cmd: &str) {
        self.inner.lock().blocked.insert(cmd.to_string());
    }

    pub fn set_artifacts(&self, files: Vec<PathBuf>) {
        self.inner.lock().artifacts = files;
    }

    pub fn fail_prepare(&self, reason: &str) {
        self.inner.lock().fail_prepare = Some(reason.to_string());
    }

    pub fn fail_snapshot(&self, reason: &str) {
        self.inner.lock().fail_snapshot = Some(reason.to_string());
    }

    /// Whether `run` has been called for `cmd`
    pub fn ran(&self, cmd: &str) -> bool {
        self.calls()
            .iter()
            .any(|c| matches!(c, BackendCall::Run { id } if id == cmd))
    }
}

#[async_trait]
impl ExecutionBackend for FakeBackend {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn init(&self, job: Arc<JobConfig>) -> Result<(), BackendError> {
        self.inner.lock().calls.push(BackendCall::Init {
            job: job.id.to_string(),
        });
        Ok(())
    }

    async fn prepare(&self, _log: &LogBuffer) -> Result<(), BackendError> {
        let mut inner = self.inner.lock();
        inner.calls.push(BackendCall::Prepare);
        match &inner.fail_prepare {
            Some(reason) => Err(BackendError::Failed(reason.clone())),
            None => Ok(()),
        }
    }

    async fn run(&self, cmd: &CommandSpec, log: &LogBuffer) -> Result<CommandResult, BackendError> {
        let (blocked, failed, code, output) = {
            let mut inner = self.inner.lock();
            inner.calls.push(BackendCall::Run { id: cmd.id.clone() });
            (
                inner.blocked.contains(cmd.id.as_str()),
                inner.run_errors.contains(cmd.id.as_str()),
                inner.exit_codes.get(cmd.id.as_str()).copied().unwrap_or(0),
                inner.outputs.get(cmd.id.as_str()).cloned(),
            )
        };
        if blocked {
            std::future::pending::<()>().await;
        }
        if failed {
            return Err(BackendError::Failed(format!("cannot run {}", cmd.id)));
        }
        if let Some(output) = &output {
            log.write(output)
                .map_err(|e| BackendError::Failed(e.to_string()))?;
        }
        let captured = if cmd.capture_output { output } else { None };
        Ok(CommandResult::new(code, captured))
    }

    async fn capture_snapshot(&self, id: &SnapshotId, _log: &LogBuffer) -> Result<(), BackendError> {
        let mut inner = self.inner.lock();
        inner
            .calls
            .push(BackendCall::CaptureSnapshot { id: id.clone() });
        match &inner.fail_snapshot {
            Some(reason) => Err(BackendError::Failed(reason.clone())),
            None => Ok(()),
        }
    }

    async fn shutdown(&self, _log: &LogBuffer) -> Result<(), BackendError> {
        self.inner.lock().calls.push(BackendCall::Shutdown);
        Ok(())
    }

    async fn collect_artifacts(
        &self,
        patterns: &[String],
        _log: &LogBuffer,
    ) -> Result<Vec<PathBuf>, BackendError> {
        let mut inner = self.inner.lock();
        inner.calls.push(BackendCall::CollectArtifacts {
            patterns: patterns.to_vec(),
        });
        if patterns.is_empty() {
            return Ok(Vec::new());
        }
        Ok(inner.artifacts.clone())
    }
}
