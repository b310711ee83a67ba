//! Stale container cleanup specs

use crate::prelude::*;

#[test]
fn empty_slot_has_nothing_to_clean() {
    let dir = tempfile::tempdir().unwrap();
    cli()
        .args(&[
            "cleanup",
            "--executor",
            "runner-1",
            "--executor-path",
            &dir.path().to_string_lossy(),
        ])
        .passes()
        .stdout_has("Nothing to clean up in slot runner-1");
}

#[test]
fn cleanup_requires_an_executor() {
    cli().args(&["cleanup"]).exits(2);
}
