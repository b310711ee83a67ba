// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake reporter and heartbeat for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use crate::heartbeat::{Heartbeat, Upstream};
use crate::{ReportError, Reporter};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tk_core::{BuildResult, BuildStatus, CommandId, CommandSpec, SnapshotId, SnapshotStatus};

/// Recorded reporter call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportCall {
    JobStatus {
        status: BuildStatus,
        result: Option<BuildResult>,
    },
    CommandStatus {
        id: CommandId,
        status: BuildStatus,
        exit_code: Option<i32>,
        output: Option<Vec<u8>>,
    },
    LogChunk {
        source: String,
        chunk: Vec<u8>,
    },
    SnapshotStatus {
        id: SnapshotId,
        status: SnapshotStatus,
    },
    Artifacts {
        command: CommandId,
        files: Vec<PathBuf>,
    },
    Shutdown,
}

#[derive(Default)]
struct FakeReporterState {
    calls: Vec<ReportCall>,
    fatal: Option<String>,
    closed: bool,
}

/// Fake reporter that records every call in order
#[derive(Clone, Default)]
pub struct FakeReporter {
    inner: Arc<Mutex<FakeReporterState>>,
}

impl FakeReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<ReportCall> {
        self.inner.lock().calls.clone()
    }

    /// Recorded calls excluding log chunks
    pub fn status_calls(&self) -> Vec<ReportCall> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, ReportCall::LogChunk { .. }))
            .collect()
    }

    /// All log chunks concatenated
    pub fn log_text(&self) -> String {
        let inner = self.inner.lock();
        let mut bytes = Vec::new();
        for call in &inner.calls {
            if let ReportCall::LogChunk { chunk, .. } = call {
                bytes.extend_from_slice(chunk);
            }
        }
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Make every subsequent call fail as if delivery were exhausted
    pub fn fail_fatally(&self, reason: &str) {
        self.inner.lock().fatal = Some(reason.to_string());
    }

    /// Make every subsequent call fail as if the reporter were already shut down
    pub fn close(&self) {
        self.inner.lock().closed = true;
    }

    fn record(&self, call: ReportCall) -> Result<(), ReportError> {
        let mut inner = self.inner.lock();
        if let Some(reason) = &inner.fatal {
            return Err(ReportError::Fatal(reason.clone()));
        }
        if inner.closed {
            return Err(ReportError::Closed);
        }
        inner.calls.push(call);
        Ok(())
    }
}

#[async_trait]
impl Reporter for FakeReporter {
    async fn push_job_status(
        &self,
        status: BuildStatus,
        result: Option<BuildResult>,
    ) -> Result<(), ReportError> {
        self.record(ReportCall::JobStatus { status, result })
    }

    async fn push_command_status(
        &self,
        command: &CommandId,
        status: BuildStatus,
        exit_code: Option<i32>,
        output: Option<&[u8]>,
    ) -> Result<(), ReportError> {
        self.record(ReportCall::CommandStatus {
            id: command.clone(),
            status,
            exit_code,
            output: output.map(<[u8]>::to_vec),
        })
    }

    async fn push_log_chunk(&self, source: &str, chunk: &[u8]) -> Result<(), ReportError> {
        self.record(ReportCall::LogChunk {
            source: source.to_string(),
            chunk: chunk.to_vec(),
        })
    }

    async fn push_snapshot_status(
        &self,
        snapshot: &SnapshotId,
        status: SnapshotStatus,
    ) -> Result<(), ReportError> {
        self.record(ReportCall::SnapshotStatus {
            id: snapshot.clone(),
            status,
        })
    }

    async fn publish_artifacts(
        &self,
        command: &CommandSpec,
        artifacts: &[PathBuf],
    ) -> Result<(), ReportError> {
        self.record(ReportCall::Artifacts {
            command: command.id.clone(),
            files: artifacts.to_vec(),
        })
    }

    async fn shutdown(&self) -> Result<(), ReportError> {
        self.record(ReportCall::Shutdown)
    }
}

#[derive(Default)]
struct FakeHeartbeatState {
    beats: u32,
    aborted: bool,
    failing: bool,
}

/// Fake upstream heartbeat, running until told otherwise
#[derive(Clone, Default)]
pub struct FakeHeartbeat {
    inner: Arc<Mutex<FakeHeartbeatState>>,
}

impl FakeHeartbeat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report the job as aborted on the next beat
    pub fn abort(&self) {
        self.inner.lock().aborted = true;
    }

    /// Make beats fail with a transient error
    pub fn set_failing(&self, failing: bool) {
        self.inner.lock().failing = failing;
    }

    /// Number of beats observed
    pub fn beats(&self) -> u32 {
        self.inner.lock().beats
    }
}

#[async_trait]
impl Heartbeat for FakeHeartbeat {
    async fn beat(&self) -> Result<Upstream, ReportError> {
        let mut inner = self.inner.lock();
        inner.beats += 1;
        if inner.failing {
            return Err(ReportError::Status {
                status: 502,
                url: "fake://heartbeat".to_string(),
            });
        }
        Ok(if inner.aborted {
            Upstream::Aborted
        } else {
            Upstream::Running
        })
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
