// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn bare_scripts_get_bash() {
    assert_eq!(with_shebang("make test\n"), "#!/bin/bash\nmake test\n");
}

#[test]
fn existing_interpreter_is_kept() {
    let script = "#!/usr/bin/env python3\nprint('hi')\n";
    assert_eq!(with_shebang(script), script);
}

#[test]
fn unsupported_error_names_backend() {
    let err = BackendError::Unsupported {
        operation: "capture_snapshot",
        backend: "basic",
    };
    assert_eq!(
        err.to_string(),
        "capture_snapshot is not supported by the basic backend"
    );
}

#[test]
fn any_backend_reports_the_selected_name() {
    let dir = tempfile::tempdir().unwrap();
    let null: AnyBackend = NullBackend::new(dir.path()).into();
    assert_eq!(null.name(), "basic");

    let cache = crate::container::ImageCache::new(dir.path().join("cache"), None);
    let lxc: AnyBackend = crate::container::ContainerBackend::new(
        crate::container::LxcRuntime::new(dir.path().join("lxc")),
        cache,
        crate::container::ContainerOptions::default(),
    )
    .into();
    assert_eq!(lxc.name(), "lxc");
}

#[tokio::test]
async fn any_backend_delegates_to_null() {
    let dir = tempfile::tempdir().unwrap();
    let backend: AnyBackend = NullBackend::new(dir.path().join("ws")).into();
    let log = LogBuffer::new("console").unwrap();
    backend
        .init(Arc::new(JobConfig::for_test("js-1", vec![])))
        .await
        .unwrap();
    backend.prepare(&log).await.unwrap();

    let result = backend
        .run(&CommandSpec::new("c1", "exit 3"), &log)
        .await
        .unwrap();
    assert_eq!(result.exit_code, 3);
    assert!(matches!(
        backend.capture_snapshot(&SnapshotId::new("s"), &log).await,
        Err(BackendError::Unsupported { .. })
    ));
    backend.shutdown(&log).await.unwrap();
}
