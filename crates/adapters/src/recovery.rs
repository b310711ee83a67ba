// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Executor slots and stale container recovery.
//!
//! A runner slot records the container it currently owns in
//! `{dir}/{slot}.json`. If the process dies without tearing its container
//! down, the next process in the same slot finds the record on startup and
//! removes the leftover container before creating its own.
//!
//! Every operation here is best-effort: failures are logged and never
//! propagated, since the new container's name collision check still applies.

use crate::container::ContainerRuntime;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Contents of a slot file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRecord {
    pub container: String,
    #[serde(default)]
    pub pid: u32,
}

/// A named runner slot.
#[derive(Debug, Clone)]
pub struct ExecutorSlot {
    dir: PathBuf,
    name: String,
}

impl ExecutorSlot {
    pub fn new(dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(format!("{}.json", self.name))
    }

    /// Record that this slot owns `container`. Atomically replaces any previous record.
    pub fn register(&self, container: &str) {
        let record = SlotRecord {
            container: container.to_string(),
            pid: std::process::id(),
        };
        let path = self.path();
        let tmp_path = path.with_extension("json.tmp");

        if let Err(e) = std::fs::create_dir_all(&self.dir).and_then(|_| {
            let json = serde_json::to_string_pretty(&record).map_err(std::io::Error::other)?;
            std::fs::write(&tmp_path, json.as_bytes())?;
            std::fs::rename(&tmp_path, &path)
        }) {
            tracing::warn!(slot = %self.name, container, error = %e, "failed to register executor slot");
        }
    }

    /// Forget the owned container.
    pub fn deregister(&self) {
        match std::fs::remove_file(self.path()) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(slot = %self.name, error = %e, "failed to deregister executor slot"),
        }
    }

    /// Read and delete the slot record, so it is processed at most once.
    pub fn take(&self) -> Option<SlotRecord> {
        let path = self.path();
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(slot = %self.name, error = %e, "failed to read executor slot");
                return None;
            }
        };
        if let Err(e) = std::fs::remove_file(&path) {
            tracing::warn!(slot = %self.name, error = %e, "failed to remove executor slot file");
        }
        match parse_record(&content) {
            Some(record) => Some(record),
            None => {
                tracing::warn!(slot = %self.name, "ignoring unreadable executor slot file");
                None
            }
        }
    }

    /// Destroy a container left behind by a previous run in this slot.
    ///
    /// Returns the name of the container that was found, if any.
    pub async fn clean_leftover_state<R: ContainerRuntime>(&self, runtime: &R) -> Option<String> {
        let record = self.take()?;
        let name = record.container;
        tracing::warn!(slot = %self.name, container = %name, pid = record.pid, "found leftover container");

        match runtime.exists(&name).await {
            Ok(false) => {
                tracing::info!(container = %name, "leftover container already gone");
                return Some(name);
            }
            Ok(true) => {}
            Err(e) => tracing::warn!(container = %name, error = %e, "cannot check leftover container"),
        }

        match runtime.is_running(&name).await {
            Ok(true) => {
                if let Err(e) = runtime.kill(&name).await {
                    tracing::warn!(container = %name, error = %e, "failed to kill leftover container");
                }
            }
            Ok(false) => {}
            Err(e) => tracing::warn!(container = %name, error = %e, "cannot query leftover container"),
        }

        match runtime.destroy(&name).await {
            Ok(()) => tracing::info!(container = %name, "destroyed leftover container"),
            Err(e) => tracing::warn!(container = %name, error = %e, "failed to destroy leftover container"),
        }
        Some(name)
    }
}

/// Accept both the JSON record and a bare container name.
fn parse_record(content: &str) -> Option<SlotRecord> {
    if let Ok(record) = serde_json::from_str::<SlotRecord>(content) {
        return Some(record);
    }
    let name = content.trim();
    if name.is_empty() || name.contains(char::is_whitespace) {
        return None;
    }
    Some(SlotRecord {
        container: name.to_string(),
        pid: 0,
    })
}

#[cfg(test)]
#[path = "recovery_tests.rs"]
mod tests;
