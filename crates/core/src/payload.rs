// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Report payloads queued for delivery to the control server.

use std::collections::BTreeMap;
use std::path::PathBuf;

/// One multipart POST: a server-relative path, form fields, and an optional file part.
///
/// Produced by any reporter call and consumed exactly once by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPayload {
    pub path: String,
    pub fields: BTreeMap<String, String>,
    pub file: Option<PathBuf>,
}

impl ReportPayload {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            fields: BTreeMap::new(),
            file: None,
        }
    }

    pub fn field(mut self, key: &str, value: impl Into<String>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }
}

#[cfg(test)]
#[path = "payload_tests.rs"]
mod tests;
