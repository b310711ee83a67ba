// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reporter for the build control server's REST API.

use crate::transport::{Transport, TransportConfig};
use crate::{ReportError, Reporter};
use async_trait::async_trait;
use std::path::PathBuf;
use tk_core::{
    BuildResult, BuildStatus, CommandId, CommandSpec, JobStepId, ReportPayload, SnapshotId,
    SnapshotStatus,
};

/// Maps reporter calls onto server resources and queues them on a [`Transport`].
pub struct HttpReporter {
    transport: Transport,
    job: JobStepId,
    node: String,
}

impl HttpReporter {
    /// Create a reporter for `job`. `node` identifies this host to the server.
    pub fn new(
        config: TransportConfig,
        job: JobStepId,
        node: impl Into<String>,
    ) -> Result<Self, ReportError> {
        Ok(Self {
            transport: Transport::spawn(config)?,
            job,
            node: node.into(),
        })
    }

    fn jobstep_path(&self, suffix: &str) -> String {
        format!("/jobsteps/{}/{}", self.job, suffix)
    }
}

#[async_trait]
impl Reporter for HttpReporter {
    async fn push_job_status(
        &self,
        status: BuildStatus,
        result: Option<BuildResult>,
    ) -> Result<(), ReportError> {
        let mut payload = ReportPayload::new(self.jobstep_path(""))
            .field("status", status.as_str())
            .field("node", self.node.clone());
        if let Some(result) = result {
            payload = payload.field("result", result.as_str());
        }
        self.transport.push(payload).await
    }

    async fn push_command_status(
        &self,
        command: &CommandId,
        status: BuildStatus,
        exit_code: Option<i32>,
        output: Option<&[u8]>,
    ) -> Result<(), ReportError> {
        let mut payload =
            ReportPayload::new(format!("/commands/{command}/")).field("status", status.as_str());
        if let Some(code) = exit_code {
            payload = payload.field("return_code", code.to_string());
        }
        if let Some(output) = output {
            payload = payload.field("output", String::from_utf8_lossy(output));
        }
        self.transport.push(payload).await
    }

    async fn push_log_chunk(&self, source: &str, chunk: &[u8]) -> Result<(), ReportError> {
        if chunk.is_empty() {
            return Ok(());
        }
        let payload = ReportPayload::new(self.jobstep_path("logappend/"))
            .field("source", source)
            .field("text", String::from_utf8_lossy(chunk));
        self.transport.push(payload).await
    }

    async fn push_snapshot_status(
        &self,
        snapshot: &SnapshotId,
        status: SnapshotStatus,
    ) -> Result<(), ReportError> {
        let payload = ReportPayload::new(format!("/snapshotimages/{snapshot}/"))
            .field("status", status.as_str());
        self.transport.push(payload).await
    }

    async fn publish_artifacts(
        &self,
        command: &CommandSpec,
        artifacts: &[PathBuf],
    ) -> Result<(), ReportError> {
        for path in artifacts {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            tracing::info!(command = %command.id, artifact = %name, "publishing artifact");
            let payload = ReportPayload::new(self.jobstep_path("artifacts/"))
                .field("name", name)
                .file(path);
            self.transport.push_sync(payload).await?;
        }
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ReportError> {
        self.transport.shutdown().await
    }
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
