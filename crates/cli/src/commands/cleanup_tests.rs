// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tk_adapters::FakeRuntime;

#[tokio::test]
async fn removes_the_recorded_container() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = FakeRuntime::new(&dir.path().join("lxc"));
    runtime.add_container("js-crashed", true);
    let slot = ExecutorSlot::new(dir.path().join("slots"), "runner-1");
    slot.register("js-crashed");

    let message = clean(&slot, &runtime).await;

    assert_eq!(message, "Removed container js-crashed from slot runner-1");
    assert!(runtime.container_names().is_empty());
    assert!(!slot.path().exists());
}

#[tokio::test]
async fn empty_slot_reports_nothing_to_do() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = FakeRuntime::new(&dir.path().join("lxc"));
    let slot = ExecutorSlot::new(dir.path().join("slots"), "runner-1");

    assert_eq!(
        clean(&slot, &runtime).await,
        "Nothing to clean up in slot runner-1"
    );
    assert!(runtime.calls().is_empty());
}
