// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess execution helpers

use std::io::Read;
use std::process::{ExitStatus, Output, Stdio};
use std::time::Duration;
use tk_core::FAILED_EXIT_CODE;
use tk_reporter::LogBuffer;
use tokio::process::Command;

/// Default timeout for quick container runtime queries (info, ls, stop).
pub const RUNTIME_TIMEOUT: Duration = Duration::from_secs(120);

/// Default timeout for container creation, which may download a template.
pub const CREATE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Default timeout for archiving or syncing snapshot images.
pub const IMAGE_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);

/// Read size for the output pump.
const PUMP_BUF: usize = 8 * 1024;

/// Run a subprocess command with a timeout.
///
/// Wraps `Command::output()` with `tokio::time::timeout`, converting
/// timeout expiration into a descriptive error message. The child process
/// is killed if the timeout elapses.
pub async fn run_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    description: &str,
) -> Result<Output, String> {
    cmd.kill_on_drop(true);
    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(io_err)) => Err(format!("{} failed: {}", description, io_err)),
        Err(_elapsed) => Err(format!(
            "{} timed out after {}s",
            description,
            timeout.as_secs()
        )),
    }
}

/// Like [`run_with_timeout`], but a non-zero exit is also an error carrying stderr.
pub async fn check_output(
    cmd: Command,
    timeout: Duration,
    description: &str,
) -> Result<Output, String> {
    let output = run_with_timeout(cmd, timeout, description).await?;
    if output.status.success() {
        return Ok(output);
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(format!(
        "{} exited with {}: {}",
        description,
        exit_code(output.status),
        stderr.trim()
    ))
}

/// Numeric exit code, mapping signal deaths to `128 + signal`.
pub fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => 128 + signal,
        (None, None) => FAILED_EXIT_CODE,
    }
}

/// Result of a streamed process run.
#[derive(Debug)]
pub struct Streamed {
    pub exit_code: i32,
    /// Merged output, present only when capture was requested.
    pub captured: Option<Vec<u8>>,
}

/// Run `cmd` with stdout and stderr merged into one ordered stream that is
/// copied into `log` (and into memory when `capture` is set).
///
/// The child is killed if the returned future is dropped.
pub async fn run_streaming(
    cmd: std::process::Command,
    log: &LogBuffer,
    capture: bool,
) -> std::io::Result<Streamed> {
    let (reader, writer) = std::io::pipe()?;
    let writer_err = writer.try_clone()?;

    let mut command = Command::from(cmd);
    command
        .stdin(Stdio::null())
        .stdout(writer)
        .stderr(writer_err)
        .kill_on_drop(true);
    let mut child = command.spawn()?;
    // Drop our copies of the write end so the pump sees EOF when the child exits
    drop(command);

    let log = log.clone();
    let pump = tokio::task::spawn_blocking(move || pump_output(reader, &log, capture));

    let status = child.wait().await?;
    let captured = pump.await.map_err(std::io::Error::other)??;
    Ok(Streamed {
        exit_code: exit_code(status),
        captured,
    })
}

fn pump_output(
    mut reader: std::io::PipeReader,
    log: &LogBuffer,
    capture: bool,
) -> std::io::Result<Option<Vec<u8>>> {
    let mut captured = capture.then(Vec::new);
    let mut buf = [0u8; PUMP_BUF];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        if let Err(e) = log.write(&buf[..n]) {
            tracing::warn!(error = %e, "failed to append command output to log");
        }
        if let Some(captured) = captured.as_mut() {
            captured.extend_from_slice(&buf[..n]);
        }
    }
    Ok(captured)
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;
