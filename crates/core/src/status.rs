// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Build, command, and snapshot status values as reported upstream.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Return code reported for a command the backend could not execute at all.
pub const FAILED_EXIT_CODE: i32 = 255;

/// Lifecycle status of a job step or command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    InProgress,
    Finished,
}

impl BuildStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStatus::InProgress => "in_progress",
            BuildStatus::Finished => "finished",
        }
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal result of a job step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildResult {
    Passed,
    Failed,
    /// Cancelled by a local signal or an upstream abort; distinct from `Failed`.
    Aborted,
}

impl BuildResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildResult::Passed => "passed",
            BuildResult::Failed => "failed",
            BuildResult::Aborted => "aborted",
        }
    }

    /// Record a failure without overriding a cancellation.
    pub fn fail(self) -> BuildResult {
        match self {
            BuildResult::Aborted => BuildResult::Aborted,
            _ => BuildResult::Failed,
        }
    }
}

impl fmt::Display for BuildResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a snapshot image on the control server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotStatus {
    Active,
    Failed,
}

impl SnapshotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotStatus::Active => "active",
            SnapshotStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for SnapshotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one executed command. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub exit_code: i32,
    /// Merged stdout/stderr, present only when the command asked for capture.
    pub output: Option<Vec<u8>>,
}

impl CommandResult {
    pub fn new(exit_code: i32, output: Option<Vec<u8>>) -> Self {
        Self { exit_code, output }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
