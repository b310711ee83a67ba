// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local console log that is streamed upstream in chunks.
//!
//! Writes always land in a temporary file first, so output produced before
//! reporting starts (or while the server is slow) is never lost. Once
//! [`LogBuffer::start_reporting`] is called, a tailer task reads the file
//! from the beginning and forwards every byte exactly once, in order.

use crate::Reporter;
use parking_lot::Mutex;
use std::fmt::Display;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::sync::{mpsc, oneshot, watch};

/// Largest chunk handed to the reporter in one call.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Errors from log buffer operations
#[derive(Debug, Error)]
pub enum LogBufferError {
    #[error("log reporting already started")]
    AlreadyStarted,
    #[error("log buffer is shut down")]
    Closed,
    #[error("no async runtime to run the log tailer")]
    NoRuntime,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Default)]
struct Lifecycle {
    reporting: bool,
    closed: bool,
}

struct Inner {
    source: String,
    file: NamedTempFile,
    writer: Mutex<std::fs::File>,
    lifecycle: Mutex<Lifecycle>,
    stop: watch::Sender<bool>,
    done: watch::Sender<bool>,
    syncs: mpsc::UnboundedSender<oneshot::Sender<()>>,
    sync_rx: Mutex<Option<mpsc::UnboundedReceiver<oneshot::Sender<()>>>>,
    flush_interval: Duration,
}

/// Cheaply cloneable handle to a shared console log.
#[derive(Clone)]
pub struct LogBuffer {
    inner: Arc<Inner>,
}

impl LogBuffer {
    /// Create a buffer whose chunks are reported under `source`.
    pub fn new(source: &str) -> Result<Self, LogBufferError> {
        Self::with_flush_interval(source, crate::env::log_flush_interval())
    }

    pub fn with_flush_interval(source: &str, interval: Duration) -> Result<Self, LogBufferError> {
        let file = NamedTempFile::new()?;
        let writer = file.reopen()?;
        let (stop, _) = watch::channel(false);
        let (done, _) = watch::channel(false);
        let (syncs, sync_rx) = mpsc::unbounded_channel();
        Ok(Self {
            inner: Arc::new(Inner {
                source: source.to_string(),
                file,
                writer: Mutex::new(writer),
                lifecycle: Mutex::new(Lifecycle::default()),
                stop,
                done,
                syncs,
                sync_rx: Mutex::new(Some(sync_rx)),
                flush_interval: interval,
            }),
        })
    }

    /// Append raw bytes. Never blocks on the network.
    pub fn write(&self, data: &[u8]) -> Result<(), LogBufferError> {
        let mut writer = self.inner.writer.lock();
        writer.write_all(data)?;
        Ok(())
    }

    /// Append a progress line (`msg` plus newline), logging rather than
    /// propagating local write failures.
    pub fn line(&self, msg: impl Display) {
        if let Err(e) = self.write(format!("{msg}\n").as_bytes()) {
            tracing::warn!(error = %e, "failed to write console log line");
        }
    }

    /// Begin forwarding buffered and future output to `reporter`.
    ///
    /// May be called at most once, and not after [`LogBuffer::shutdown`].
    pub fn start_reporting(&self, reporter: Arc<dyn Reporter>) -> Result<(), LogBufferError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| LogBufferError::NoRuntime)?;
        let mut lifecycle = self.inner.lifecycle.lock();
        if lifecycle.closed {
            return Err(LogBufferError::Closed);
        }
        if lifecycle.reporting {
            return Err(LogBufferError::AlreadyStarted);
        }
        let reader = tokio::fs::File::from_std(self.inner.file.reopen()?);
        let Some(syncs) = self.inner.sync_rx.lock().take() else {
            return Err(LogBufferError::AlreadyStarted);
        };
        lifecycle.reporting = true;
        handle.spawn(tail(Arc::clone(&self.inner), reader, syncs, reporter));
        Ok(())
    }

    /// Wait until everything written so far has been handed to the reporter.
    ///
    /// Returns immediately when reporting is not running. A trailing partial
    /// UTF-8 sequence stays buffered until the rest of it arrives.
    pub async fn sync(&self) {
        {
            let lifecycle = self.inner.lifecycle.lock();
            if !lifecycle.reporting || lifecycle.closed {
                return;
            }
        }
        let (ack, flushed) = oneshot::channel();
        if self.inner.syncs.send(ack).is_err() {
            return;
        }
        // Dropped unanswered if the tailer exits first
        let _ = flushed.await;
    }

    /// Flush everything written so far and stop reporting.
    ///
    /// Idempotent and safe to call concurrently; every caller returns only
    /// after the final flush completed. If reporting never started, the
    /// buffer is simply disabled.
    pub async fn shutdown(&self) {
        let reporting = {
            let mut lifecycle = self.inner.lifecycle.lock();
            lifecycle.closed = true;
            lifecycle.reporting
        };
        if !reporting {
            self.inner.done.send_replace(true);
        }
        self.inner.stop.send_replace(true);

        let mut done = self.inner.done.subscribe();
        // The sender lives in `inner`, which we hold, so this cannot fail
        let _ = done.wait_for(|finished| *finished).await;
    }

    /// Path of the backing file.
    pub fn path(&self) -> &std::path::Path {
        self.inner.file.path()
    }
}

impl std::fmt::Debug for LogBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogBuffer")
            .field("source", &self.inner.source)
            .field("path", &self.inner.file.path())
            .finish()
    }
}

/// Length of the longest prefix of `buf` that does not end inside a
/// multi-byte UTF-8 sequence.
fn utf8_safe_len(buf: &[u8]) -> usize {
    match std::str::from_utf8(buf) {
        Ok(_) => buf.len(),
        // `error_len() == None` means the input ended mid-sequence
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        Err(_) => buf.len(),
    }
}

enum Wake {
    Tick,
    Sync(oneshot::Sender<()>),
    Stop,
}

async fn tail(
    inner: Arc<Inner>,
    mut reader: tokio::fs::File,
    mut syncs: mpsc::UnboundedReceiver<oneshot::Sender<()>>,
    reporter: Arc<dyn Reporter>,
) {
    let mut stop = inner.stop.subscribe();
    let mut carry: Vec<u8> = Vec::new();
    loop {
        let wake = tokio::select! {
            _ = tokio::time::sleep(inner.flush_interval) => Wake::Tick,
            Some(ack) = syncs.recv() => Wake::Sync(ack),
            _ = stop.wait_for(|s| *s) => Wake::Stop,
        };
        let last = matches!(wake, Wake::Stop);
        if let Err(e) = flush(&inner, &mut reader, &mut carry, &*reporter, last).await {
            tracing::warn!(error = %e, "console log flush failed");
        }
        match wake {
            Wake::Tick => {}
            Wake::Sync(ack) => {
                let _ = ack.send(());
            }
            Wake::Stop => break,
        }
    }
    inner.done.send_replace(true);
}

/// Forward everything currently in the file. Bytes of an incomplete UTF-8
/// sequence are held back until the next flush, unless this is the last one.
async fn flush(
    inner: &Inner,
    reader: &mut tokio::fs::File,
    carry: &mut Vec<u8>,
    reporter: &dyn Reporter,
    last: bool,
) -> Result<(), LogBufferError> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        carry.extend_from_slice(&buf[..n]);
        send_ready(inner, carry, reporter, false).await;
    }
    if last {
        send_ready(inner, carry, reporter, true).await;
    }
    Ok(())
}

async fn send_ready(inner: &Inner, carry: &mut Vec<u8>, reporter: &dyn Reporter, all: bool) {
    while !carry.is_empty() {
        let window = carry.len().min(CHUNK_SIZE);
        let mut cut = utf8_safe_len(&carry[..window]);
        if cut == 0 {
            // Only a partial code point is left; wait for the rest unless closing
            if !all && window == carry.len() {
                return;
            }
            cut = window;
        }
        let chunk: Vec<u8> = carry.drain(..cut).collect();
        push(inner, reporter, &chunk).await;
    }
}

async fn push(inner: &Inner, reporter: &dyn Reporter, chunk: &[u8]) {
    if let Err(e) = reporter.push_log_chunk(&inner.source, chunk).await {
        tracing::warn!(source = %inner.source, error = %e, "failed to report log chunk");
    }
}

#[cfg(test)]
#[path = "log_buffer_tests.rs"]
mod tests;
