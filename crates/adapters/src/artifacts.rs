// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Artifact discovery under a workspace root.
//!
//! A pattern containing `/` is a glob relative to the root. A bare pattern
//! such as `*.xml` matches file names at any depth.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Files under `root` matching any of `patterns`, sorted and deduplicated.
pub fn find(root: &Path, patterns: &[String]) -> Result<Vec<PathBuf>, glob::PatternError> {
    let mut found = BTreeSet::new();
    for pattern in patterns {
        let pattern = pattern.trim().trim_start_matches("./");
        if pattern.is_empty() {
            continue;
        }
        let full = if pattern.contains('/') {
            root.join(pattern.trim_start_matches('/'))
        } else {
            root.join("**").join(pattern)
        };
        for entry in glob::glob(&full.to_string_lossy())? {
            match entry {
                Ok(path) if path.is_file() => {
                    found.insert(path);
                }
                Ok(_) => {}
                Err(e) => tracing::debug!(error = %e, "skipping unreadable artifact candidate"),
            }
        }
    }
    Ok(found.into_iter().collect())
}

#[cfg(test)]
#[path = "artifacts_tests.rs"]
mod tests;
