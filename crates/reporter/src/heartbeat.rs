// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Upstream liveness checks.
//!
//! The control server can abort a job step at any time. A heartbeat asks it
//! whether this step should keep running.

use crate::ReportError;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use tk_core::JobStepId;

/// What the control server thinks of the running job step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upstream {
    Running,
    /// Deleted, finished, or otherwise no longer wanted.
    Aborted,
}

/// A single upstream liveness probe.
#[async_trait]
pub trait Heartbeat: Send + Sync + 'static {
    /// Errors are transient: callers log them and keep polling.
    async fn beat(&self) -> Result<Upstream, ReportError>;
}

/// Heartbeat against `POST {server}/jobsteps/{id}/heartbeat/`.
pub struct HttpHeartbeat {
    client: reqwest::Client,
    url: String,
}

impl HttpHeartbeat {
    pub fn new(server: &str, job: &JobStepId) -> Result<Self, ReportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            url: format!("{}/jobsteps/{}/heartbeat/", server.trim_end_matches('/'), job),
        })
    }
}

/// Extract a status name from either `"finished"` or `{"id": "finished"}`.
fn status_name(value: Option<&serde_json::Value>) -> Option<&str> {
    match value? {
        serde_json::Value::String(s) => Some(s.as_str()),
        serde_json::Value::Object(map) => map.get("id").and_then(|v| v.as_str()),
        _ => None,
    }
}

/// Interpret a successful heartbeat body.
pub(crate) fn classify_body(body: &[u8]) -> Upstream {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) else {
        return Upstream::Running;
    };
    if status_name(value.get("status")) == Some("finished") {
        return Upstream::Aborted;
    }
    Upstream::Running
}

#[async_trait]
impl Heartbeat for HttpHeartbeat {
    async fn beat(&self) -> Result<Upstream, ReportError> {
        let response = self.client.post(&self.url).send().await?;
        match response.status() {
            StatusCode::GONE => Ok(Upstream::Aborted),
            status if status.is_success() => {
                let body = response.bytes().await?;
                Ok(classify_body(&body))
            }
            status => Err(ReportError::Status {
                status: status.as_u16(),
                url: self.url.clone(),
            }),
        }
    }
}

#[cfg(test)]
#[path = "heartbeat_tests.rs"]
mod tests;
