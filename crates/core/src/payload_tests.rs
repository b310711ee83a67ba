// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn builder_collects_fields_and_file() {
    let payload = ReportPayload::new("/jobsteps/js-1/artifacts/")
        .field("name", "junit.xml")
        .file("/tmp/junit.xml");

    assert_eq!(payload.path, "/jobsteps/js-1/artifacts/");
    assert_eq!(payload.fields.get("name").map(String::as_str), Some("junit.xml"));
    assert_eq!(payload.file, Some(PathBuf::from("/tmp/junit.xml")));
}

#[test]
fn later_field_overrides_earlier() {
    let payload = ReportPayload::new("/x/")
        .field("status", "in_progress")
        .field("status", "finished");
    assert_eq!(payload.fields.len(), 1);
    assert_eq!(payload.fields["status"], "finished");
}
