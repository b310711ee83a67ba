// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
// Enable coverage(off) attribute for excluding test infrastructure
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Reporting pipeline: delivers build status, console output, and artifacts
//! to the control server without blocking the build.

pub mod env;
pub mod heartbeat;
mod http;
mod local;
pub mod log_buffer;
mod multi;
mod noop;
pub mod transport;

pub use heartbeat::{Heartbeat, HttpHeartbeat, Upstream};
pub use http::HttpReporter;
pub use local::LocalReporter;
pub use log_buffer::{LogBuffer, LogBufferError};
pub use multi::MultiReporter;
pub use noop::NoOpReporter;
pub use transport::{Transport, TransportConfig};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeHeartbeat, FakeReporter, ReportCall};

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;
use tk_core::{BuildResult, BuildStatus, CommandId, CommandSpec, SnapshotId, SnapshotStatus};

/// Errors from reporting operations
#[derive(Debug, Error)]
pub enum ReportError {
    /// Delivery retries were exhausted; the run can no longer be reported faithfully.
    #[error("report delivery failed permanently: {0}")]
    Fatal(String),
    /// The server no longer knows the job (HTTP 410).
    #[error("resource gone on control server: {0}")]
    Gone(String),
    #[error("reporter already shut down")]
    Closed,
    #[error("unexpected response status {status} from {url}")]
    Status { status: u16, url: String },
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReportError {
    /// Whether this error must terminate the process rather than just fail the build.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ReportError::Fatal(_))
    }
}

/// Destination for everything a run reports upstream.
///
/// Implementations must preserve call order per stream: log chunks pushed in
/// order are delivered in order, and command statuses follow declaration order.
#[async_trait]
pub trait Reporter: Send + Sync + 'static {
    /// Report the job step's status and, once finished, its result.
    async fn push_job_status(
        &self,
        status: BuildStatus,
        result: Option<BuildResult>,
    ) -> Result<(), ReportError>;

    /// Report one command's status, exit code, and captured output.
    async fn push_command_status(
        &self,
        command: &CommandId,
        status: BuildStatus,
        exit_code: Option<i32>,
        output: Option<&[u8]>,
    ) -> Result<(), ReportError>;

    /// Append a chunk of console output for `source`.
    async fn push_log_chunk(&self, source: &str, chunk: &[u8]) -> Result<(), ReportError>;

    /// Report the state of a captured snapshot image.
    async fn push_snapshot_status(
        &self,
        snapshot: &SnapshotId,
        status: SnapshotStatus,
    ) -> Result<(), ReportError>;

    /// Publish artifact files for a finished command.
    ///
    /// Returns only after delivery so callers can safely tear down the
    /// environment the files live in.
    async fn publish_artifacts(
        &self,
        command: &CommandSpec,
        artifacts: &[PathBuf],
    ) -> Result<(), ReportError>;

    /// Drain pending deliveries and stop accepting new ones.
    async fn shutdown(&self) -> Result<(), ReportError>;
}
