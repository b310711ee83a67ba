// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cancellation sources.
//!
//! Both listeners feed one [`CancellationToken`]: an operator interrupt on
//! this host, or the control server saying the job step is no longer wanted.

use std::sync::Arc;
use std::time::Duration;
use tk_reporter::{Heartbeat, Upstream};
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Exit status used when a second interrupt forces the process down.
const FORCED_EXIT: i32 = 130;

/// Cancel `token` on SIGINT or SIGTERM. A second signal while the first is
/// being honoured exits the process immediately.
pub fn spawn_signal_listener(token: CancellationToken) -> std::io::Result<JoinHandle<()>> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    Ok(tokio::spawn(async move {
        let mut received = 0u32;
        loop {
            let name = tokio::select! {
                _ = sigint.recv() => "SIGINT",
                _ = sigterm.recv() => "SIGTERM",
            };
            received += 1;
            if received > 1 {
                tracing::error!(signal = name, "second signal received, exiting immediately");
                std::process::exit(FORCED_EXIT);
            }
            tracing::warn!(signal = name, "signal received, aborting build");
            token.cancel();
        }
    }))
}

/// Poll `heartbeat` every `interval` until it reports the job aborted (which
/// cancels `token`) or `token` is cancelled elsewhere. Failed beats are
/// logged and polling continues.
pub fn spawn_heartbeat_poller(
    heartbeat: Arc<dyn Heartbeat>,
    interval: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(interval) => {}
            }
            match heartbeat.beat().await {
                Ok(Upstream::Running) => tracing::trace!("heartbeat ok"),
                Ok(Upstream::Aborted) => {
                    tracing::warn!("control server aborted the job step");
                    token.cancel();
                    return;
                }
                Err(e) => tracing::warn!(error = %e, "heartbeat failed"),
            }
        }
    })
}

/// Running cancellation listeners. Dropping this aborts every listener.
#[derive(Default)]
pub(crate) struct Listeners {
    signals: Option<JoinHandle<()>>,
    heartbeat: Option<JoinHandle<()>>,
}

impl Listeners {
    pub(crate) fn new(signals: Option<JoinHandle<()>>, heartbeat: Option<JoinHandle<()>>) -> Self {
        Self { signals, heartbeat }
    }

    /// Stop polling upstream. Local signals stay handled until drop, so a
    /// second interrupt still forces an exit while reports drain.
    pub(crate) fn stop_heartbeat(&mut self) {
        if let Some(poller) = self.heartbeat.take() {
            poller.abort();
        }
    }
}

impl Drop for Listeners {
    fn drop(&mut self) {
        for task in self.signals.iter().chain(self.heartbeat.iter()) {
            task.abort();
        }
    }
}

#[cfg(test)]
#[path = "cancel_tests.rs"]
mod tests;
