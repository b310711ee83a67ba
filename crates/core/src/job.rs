// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job description decoded from the control server.
//!
//! A [`JobConfig`] is loaded once at startup and never mutated afterwards;
//! the engine shares it behind an `Arc` for the duration of the run.

use crate::id::{CommandId, JobStepId, SnapshotId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

/// Errors from decoding or validating a job description
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid job config JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid job config: {0}")]
    Invalid(String),
}

/// One command of the build plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandSpec {
    pub id: CommandId,
    pub script: String,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Working directory; relative paths resolve against the backend's workspace root.
    #[serde(default)]
    pub cwd: String,
    #[serde(default)]
    pub capture_output: bool,
    /// Glob patterns, relative to the workspace root, of files to publish after the command.
    #[serde(default, alias = "artifactPatterns")]
    pub artifacts: Vec<String>,
}

impl CommandSpec {
    /// Environment as ordered `(key, value)` pairs ready for process injection.
    pub fn env_pairs(&self) -> Vec<(String, String)> {
        self.env
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Requested resource limits for the execution environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    #[serde(default)]
    pub cpus: Option<u32>,
    #[serde(default, rename = "mem", alias = "memory")]
    pub memory_mb: Option<u64>,
}

impl ResourceLimits {
    /// Fill unset limits from `fallback` (command-line values win only when the job is silent).
    pub fn or(self, fallback: ResourceLimits) -> ResourceLimits {
        ResourceLimits {
            cpus: self.cpus.or(fallback.cpus),
            memory_mb: self.memory_mb.or(fallback.memory_mb),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryInfo {
    pub url: String,
    #[serde(default)]
    pub backend: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    pub sha: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    #[serde(default)]
    pub revision: Option<Revision>,
    #[serde(default)]
    pub patch: Option<Patch>,
}

/// Reference to the snapshot image a successful run should capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRef {
    pub id: SnapshotId,
}

/// Immutable job description.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfig {
    /// Base URL of the control server; supplied by the caller, not the payload.
    #[serde(skip)]
    pub server: String,
    pub id: JobStepId,
    #[serde(default)]
    pub commands: Vec<CommandSpec>,
    #[serde(default)]
    pub resources: ResourceLimits,
    #[serde(default)]
    pub repository: Option<RepositoryInfo>,
    #[serde(default)]
    pub source: Option<SourceInfo>,
    #[serde(default)]
    pub expected_snapshot: Option<SnapshotRef>,
}

impl JobConfig {
    /// Decode and validate a job description.
    pub fn from_json(server: &str, body: &[u8]) -> Result<Self, ConfigError> {
        let mut config: JobConfig = serde_json::from_slice(body)?;
        config.server = server.trim_end_matches('/').to_string();
        config.validate()?;
        Ok(config)
    }

    /// Check structural invariants the engine relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id.as_str().is_empty() {
            return Err(ConfigError::Invalid("job step id is empty".to_string()));
        }
        let mut seen = HashSet::new();
        for cmd in &self.commands {
            if cmd.id.as_str().is_empty() {
                return Err(ConfigError::Invalid("command id is empty".to_string()));
            }
            if !seen.insert(cmd.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate command id '{}'",
                    cmd.id
                )));
            }
        }
        Ok(())
    }

    /// Identifier of the output snapshot, if this run should capture one.
    pub fn output_snapshot(&self) -> Option<&SnapshotId> {
        self.expected_snapshot.as_ref().map(|s| &s.id)
    }
}

#[cfg(any(test, feature = "test-support"))]
impl CommandSpec {
    /// Minimal command for tests.
    pub fn new(id: &str, script: &str) -> Self {
        Self {
            id: CommandId::new(id),
            script: script.to_string(),
            env: BTreeMap::new(),
            cwd: String::new(),
            capture_output: false,
            artifacts: Vec::new(),
        }
    }

    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn capturing(mut self) -> Self {
        self.capture_output = true;
        self
    }

    pub fn with_artifacts(mut self, patterns: &[&str]) -> Self {
        self.artifacts = patterns.iter().map(|p| p.to_string()).collect();
        self
    }
}

#[cfg(any(test, feature = "test-support"))]
impl JobConfig {
    /// Job with the given commands and no snapshot, for tests.
    pub fn for_test(id: &str, commands: Vec<CommandSpec>) -> Self {
        Self {
            server: "http://changes.invalid/api/0".to_string(),
            id: JobStepId::new(id),
            commands,
            ..Default::default()
        }
    }

    pub fn with_expected_snapshot(mut self, id: &str) -> Self {
        self.expected_snapshot = Some(SnapshotRef {
            id: SnapshotId::new(id),
        });
        self
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
