// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded delivery queue in front of the control server.
//!
//! Producers enqueue [`ReportPayload`]s and return as soon as the queue has
//! room. A single worker delivers payloads strictly in enqueue order, retrying
//! each a fixed number of times before the transport is marked failed.

use crate::ReportError;
use parking_lot::Mutex;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use tk_core::ReportPayload;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Per-request timeout for a single delivery attempt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Settings for a [`Transport`].
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// API base, e.g. `https://changes.example.com/api/0`. No trailing slash.
    pub base_url: String,
    /// Total delivery attempts per payload.
    pub attempts: u32,
    /// Pause between consecutive attempts.
    pub retry_delay: Duration,
    /// Queue capacity before `push` waits.
    pub backlog: usize,
    /// Drop payloads instead of sending them.
    pub dry_run: bool,
}

impl TransportConfig {
    /// Config with defaults taken from the environment.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            attempts: crate::env::report_attempts(),
            retry_delay: crate::env::report_retry_delay(),
            backlog: crate::env::report_backlog(),
            dry_run: false,
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_backlog(mut self, backlog: usize) -> Self {
        self.backlog = backlog.max(1);
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// Delivery health shared between producers and the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Health {
    Ok,
    /// Server answered 410; remaining payloads are dropped.
    Gone(String),
    /// Retries exhausted for some payload.
    Failed(String),
}

struct Envelope {
    payload: ReportPayload,
    ack: Option<oneshot::Sender<Result<(), ReportError>>>,
}

/// Ordered, retrying, backpressured HTTP delivery.
pub struct Transport {
    tx: Mutex<Option<mpsc::Sender<Envelope>>>,
    worker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    health: Arc<Mutex<Health>>,
}

impl Transport {
    /// Start the delivery worker. Must be called inside a tokio runtime.
    pub fn spawn(config: TransportConfig) -> Result<Self, ReportError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        let (tx, rx) = mpsc::channel(config.backlog.max(1));
        let health = Arc::new(Mutex::new(Health::Ok));
        let worker = tokio::spawn(deliver_loop(rx, client, config, Arc::clone(&health)));

        Ok(Self {
            tx: Mutex::new(Some(tx)),
            worker: tokio::sync::Mutex::new(Some(worker)),
            health,
        })
    }

    /// Enqueue a payload, waiting only while the queue is full.
    pub async fn push(&self, payload: ReportPayload) -> Result<(), ReportError> {
        self.enqueue(Envelope { payload, ack: None }).await
    }

    /// Enqueue a payload and wait until it has been delivered (or dropped).
    pub async fn push_sync(&self, payload: ReportPayload) -> Result<(), ReportError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.enqueue(Envelope {
            payload,
            ack: Some(ack_tx),
        })
        .await?;
        match ack_rx.await {
            Ok(result) => result,
            Err(_) => Err(self.failure().unwrap_or(ReportError::Closed)),
        }
    }

    /// Stop accepting payloads and wait for the queue to drain.
    ///
    /// Returns [`ReportError::Fatal`] if any payload exhausted its retries.
    pub async fn shutdown(&self) -> Result<(), ReportError> {
        // Dropping the last sender ends the worker once the queue is empty
        drop(self.tx.lock().take());
        if let Some(worker) = self.worker.lock().await.take() {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "report worker panicked");
                return Err(ReportError::Fatal(format!("report worker panicked: {e}")));
            }
        }
        match self.failure() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn enqueue(&self, envelope: Envelope) -> Result<(), ReportError> {
        if let Some(e) = self.failure() {
            return Err(e);
        }
        let tx = self.tx.lock().clone().ok_or(ReportError::Closed)?;
        tx.send(envelope)
            .await
            .map_err(|_| self.failure().unwrap_or(ReportError::Closed))
    }

    fn failure(&self) -> Option<ReportError> {
        match &*self.health.lock() {
            Health::Failed(msg) => Some(ReportError::Fatal(msg.clone())),
            _ => None,
        }
    }
}

async fn deliver_loop(
    mut rx: mpsc::Receiver<Envelope>,
    client: reqwest::Client,
    config: TransportConfig,
    health: Arc<Mutex<Health>>,
) {
    while let Some(Envelope { payload, ack }) = rx.recv().await {
        let current = health.lock().clone();
        let result = match current {
            Health::Ok => deliver(&client, &config, payload).await,
            Health::Gone(_) => {
                tracing::debug!(path = %payload.path, "dropping payload, job is gone");
                Ok(())
            }
            Health::Failed(msg) => Err(ReportError::Fatal(msg)),
        };

        let result = match result {
            Err(ReportError::Gone(path)) => {
                tracing::warn!(%path, "control server returned 410, dropping remaining reports");
                *health.lock() = Health::Gone(path);
                Ok(())
            }
            Err(ReportError::Fatal(msg)) => {
                let mut h = health.lock();
                if *h == Health::Ok {
                    tracing::error!(error = %msg, "report delivery failed permanently");
                    *h = Health::Failed(msg.clone());
                }
                Err(ReportError::Fatal(msg))
            }
            other => other,
        };

        if let Some(ack) = ack {
            let _ = ack.send(result);
        }
    }
}

/// Deliver one payload with the configured retry policy.
async fn deliver(
    client: &reqwest::Client,
    config: &TransportConfig,
    payload: ReportPayload,
) -> Result<(), ReportError> {
    if config.dry_run {
        tracing::debug!(path = %payload.path, fields = ?payload.fields, "dry run, payload dropped");
        return Ok(());
    }

    let url = format!("{}{}", config.base_url, payload.path);
    let date = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true);
    let attempts = config.attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        match post_once(client, &url, &payload, &date).await {
            Ok(status) if status.is_success() => {
                tracing::trace!(%url, attempt, "payload delivered");
                return Ok(());
            }
            Ok(StatusCode::GONE) => return Err(ReportError::Gone(payload.path)),
            Ok(status) => {
                last_error = format!("status {} from {}", status.as_u16(), url);
            }
            Err(e) => {
                last_error = format!("{url}: {e}");
            }
        }

        tracing::warn!(%url, attempt, attempts, error = %last_error, "report delivery attempt failed");
        if attempt < attempts {
            tokio::time::sleep(config.retry_delay).await;
        }
    }

    Err(ReportError::Fatal(format!(
        "giving up after {attempts} attempts: {last_error}"
    )))
}

async fn post_once(
    client: &reqwest::Client,
    url: &str,
    payload: &ReportPayload,
    date: &str,
) -> Result<StatusCode, ReportError> {
    let mut form = Form::new().text("date", date.to_string());
    for (key, value) in &payload.fields {
        form = form.text(key.clone(), value.clone());
    }
    if let Some(path) = &payload.file {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "artifact".to_string());
        form = form.part("file", Part::bytes(bytes).file_name(name));
    }

    let response = client.post(url).multipart(form).send().await?;
    Ok(response.status())
}

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;
