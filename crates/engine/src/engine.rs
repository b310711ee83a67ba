// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The build state machine.
//!
//! A run moves through init, prepare, the command sequence (raced against
//! cancellation), an optional snapshot capture, and an unconditional
//! backend shutdown before the final status is reported.

use crate::cancel::{spawn_heartbeat_poller, spawn_signal_listener, Listeners};
use crate::error::{reported, EngineError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tk_adapters::ExecutionBackend;
use tk_core::{
    format_duration, BuildResult, BuildStatus, CommandSpec, JobConfig, SnapshotStatus,
    FAILED_EXIT_CODE,
};
use tk_reporter::{Heartbeat, LogBuffer, ReportError, Reporter};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Tunables for a run.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub heartbeat_interval: Duration,
    /// Install SIGINT/SIGTERM handlers for the duration of the run.
    pub handle_signals: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            heartbeat_interval: crate::env::heartbeat_interval(),
            handle_signals: true,
        }
    }
}

/// Runs one job against one backend.
pub struct Engine<B: ExecutionBackend> {
    job: Arc<JobConfig>,
    backend: Arc<B>,
    reporter: Arc<dyn Reporter>,
    heartbeat: Option<Arc<dyn Heartbeat>>,
    log: LogBuffer,
    cancel: CancellationToken,
    options: EngineOptions,
}

type ArtifactTasks = JoinSet<Result<(), ReportError>>;

impl<B: ExecutionBackend> Engine<B> {
    pub fn new(job: JobConfig, backend: B, reporter: Arc<dyn Reporter>, log: LogBuffer) -> Self {
        Self {
            job: Arc::new(job),
            backend: Arc::new(backend),
            reporter,
            heartbeat: None,
            log,
            cancel: CancellationToken::new(),
            options: EngineOptions::default(),
        }
    }

    /// Poll the control server for aborts while the build runs.
    pub fn with_heartbeat(mut self, heartbeat: Arc<dyn Heartbeat>) -> Self {
        self.heartbeat = Some(heartbeat);
        self
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// Token that aborts the run when cancelled.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drive the job to completion and return its result.
    ///
    /// Build failures and cancellation are results, not errors. An error
    /// means the outcome could not be reported and the process should exit
    /// non-zero.
    pub async fn run(self) -> Result<BuildResult, EngineError> {
        let span = tracing::info_span!("run", job = %self.job.id, backend = self.backend.name());
        async {
            let started = Instant::now();
            let mut listeners = Listeners::default();
            let outcome = match self.log.start_reporting(Arc::clone(&self.reporter)) {
                Ok(()) => {
                    listeners = self.spawn_listeners();
                    self.execute().await
                }
                Err(e) => Err(EngineError::from(e)),
            };
            listeners.stop_heartbeat();

            let outcome = match outcome {
                Ok(result) => {
                    self.log.line(format_args!(
                        "[tinker] build {} after {}",
                        result.as_str(),
                        format_duration(started.elapsed())
                    ));
                    tracing::info!(result = result.as_str(), "build finished");
                    reported(
                        self.reporter
                            .push_job_status(BuildStatus::Finished, Some(result))
                            .await,
                    )
                    .map(|()| result)
                }
                Err(e) => {
                    self.log.line(format_args!("[tinker] run failed: {e}"));
                    tracing::error!(error = %e, "run failed");
                    Err(e)
                }
            };

            self.log.shutdown().await;
            let drained = reported(self.reporter.shutdown().await);
            drop(listeners);
            match (outcome, drained) {
                (Ok(result), Ok(())) => Ok(result),
                (Err(e), _) | (Ok(_), Err(e)) => Err(e),
            }
        }
        .instrument(span)
        .await
    }

    fn spawn_listeners(&self) -> Listeners {
        let signals = if self.options.handle_signals {
            spawn_signal_listener(self.cancel.clone())
                .map_err(|e| tracing::warn!(error = %e, "cannot install signal handlers"))
                .ok()
        } else {
            None
        };
        let heartbeat = self.heartbeat.as_ref().map(|heartbeat| {
            spawn_heartbeat_poller(
                Arc::clone(heartbeat),
                self.options.heartbeat_interval,
                self.cancel.clone(),
            )
        });
        Listeners::new(signals, heartbeat)
    }

    /// Everything between the first and the final job status. The backend
    /// is always shut down, whatever happened before.
    async fn execute(&self) -> Result<BuildResult, EngineError> {
        let built = self.build().await;

        self.log.line("[tinker] tearing down environment");
        if let Err(e) = self.backend.shutdown(&self.log).await {
            self.log.line(format_args!("[tinker] teardown failed: {e}"));
            tracing::error!(error = %e, "backend shutdown failed");
        }
        built
    }

    async fn build(&self) -> Result<BuildResult, EngineError> {
        reported(
            self.reporter
                .push_job_status(BuildStatus::InProgress, None)
                .await,
        )?;

        let mut artifacts = ArtifactTasks::new();
        let result = tokio::select! {
            sequence = self.run_sequence(&mut artifacts) => sequence,
            _ = self.cancel.cancelled() => {
                self.log.line("[tinker] build aborted");
                Ok(BuildResult::Aborted)
            }
        };

        // Artifact uploads must finish before the environment goes away
        let published = self.await_artifacts(artifacts).await;
        let result = result?;
        published?;

        self.snapshot(result).await
    }

    /// Prepare the backend, then run every command in declaration order,
    /// stopping at the first failure.
    async fn run_sequence(&self, artifacts: &mut ArtifactTasks) -> Result<BuildResult, EngineError> {
        self.log.line(format_args!(
            "[tinker] preparing {} environment",
            self.backend.name()
        ));
        match self.prepare().await {
            Ok(()) => {}
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                self.log
                    .line(format_args!("[tinker] failed to prepare environment: {e}"));
                tracing::error!(error = %e, "prepare failed");
                return Ok(BuildResult::Failed);
            }
        }

        for cmd in &self.job.commands {
            let exit_code = self.run_command(cmd).await?;
            if !cmd.artifacts.is_empty() {
                self.spawn_artifacts(cmd, artifacts);
            }
            if exit_code != 0 {
                return Ok(BuildResult::Failed);
            }
        }
        Ok(BuildResult::Passed)
    }

    async fn prepare(&self) -> Result<(), EngineError> {
        self.backend.init(Arc::clone(&self.job)).await?;
        self.backend.prepare(&self.log).await?;
        Ok(())
    }

    async fn run_command(&self, cmd: &CommandSpec) -> Result<i32, EngineError> {
        reported(
            self.reporter
                .push_command_status(&cmd.id, BuildStatus::InProgress, None, None)
                .await,
        )?;
        self.log.line(format_args!("[tinker] running command {}", cmd.id));

        let started = Instant::now();
        let (exit_code, output) = match self.backend.run(cmd, &self.log).await {
            Ok(result) => (result.exit_code, result.output),
            Err(e) => {
                self.log.line(format_args!(
                    "[tinker] command {} could not run: {e}",
                    cmd.id
                ));
                (FAILED_EXIT_CODE, None)
            }
        };
        self.log.line(format_args!(
            "[tinker] command {} exited with {exit_code} after {}",
            cmd.id,
            format_duration(started.elapsed())
        ));

        // Output reaches the server before the command is marked finished
        self.log.sync().await;
        reported(
            self.reporter
                .push_command_status(
                    &cmd.id,
                    BuildStatus::Finished,
                    Some(exit_code),
                    output.as_deref(),
                )
                .await,
        )?;
        Ok(exit_code)
    }

    /// Collect and publish a finished command's artifacts in the background.
    fn spawn_artifacts(&self, cmd: &CommandSpec, tasks: &mut ArtifactTasks) {
        let backend = Arc::clone(&self.backend);
        let reporter = Arc::clone(&self.reporter);
        let log = self.log.clone();
        let cmd = cmd.clone();
        let span = tracing::info_span!("artifacts", command = %cmd.id);
        tasks.spawn(
            async move {
                let files = match backend.collect_artifacts(&cmd.artifacts, &log).await {
                    Ok(files) => files,
                    Err(e) => {
                        log.line(format_args!(
                            "[tinker] could not collect artifacts for {}: {e}",
                            cmd.id
                        ));
                        return Ok(());
                    }
                };
                if files.is_empty() {
                    log.line(format_args!("[tinker] no artifacts found for {}", cmd.id));
                    return Ok(());
                }
                log.line(format_args!(
                    "[tinker] publishing {} artifact(s) for {}",
                    files.len(),
                    cmd.id
                ));
                reporter.publish_artifacts(&cmd, &files).await
            }
            .instrument(span),
        );
    }

    async fn await_artifacts(&self, mut tasks: ArtifactTasks) -> Result<(), EngineError> {
        let mut fatal = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => {
                    if let Err(e) = reported(outcome) {
                        fatal.get_or_insert(e);
                    }
                }
                Err(e) => tracing::warn!(error = %e, "artifact task did not complete"),
            }
        }
        fatal.map_or(Ok(()), Err)
    }

    /// Capture the requested output snapshot after a passing build. A failed
    /// capture fails the build.
    async fn snapshot(&self, result: BuildResult) -> Result<BuildResult, EngineError> {
        let Some(id) = self.job.output_snapshot() else {
            return Ok(result);
        };
        if result != BuildResult::Passed {
            reported(
                self.reporter
                    .push_snapshot_status(id, SnapshotStatus::Failed)
                    .await,
            )?;
            return Ok(result);
        }

        self.log.line(format_args!("[tinker] capturing snapshot {id}"));
        let (result, status) = match self.backend.capture_snapshot(id, &self.log).await {
            Ok(()) => (BuildResult::Passed, SnapshotStatus::Active),
            Err(e) => {
                self.log
                    .line(format_args!("[tinker] snapshot capture failed: {e}"));
                tracing::error!(error = %e, snapshot = %id, "snapshot capture failed");
                (BuildResult::Failed, SnapshotStatus::Failed)
            }
        };
        reported(self.reporter.push_snapshot_status(id, status).await)?;
        Ok(result)
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
