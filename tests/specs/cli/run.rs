//! End-to-end runs on the host backend with the local reporter

use crate::prelude::*;

#[test]
fn passing_build_streams_output_and_exits_zero() {
    let job = Job::with_commands(&[("c1", "echo hello-from-c1"), ("c2", "echo hello-from-c2")]);
    job.run()
        .passes()
        .stdout_has("hello-from-c1")
        .stdout_has("hello-from-c2")
        .stdout_has("[tinker] build passed");
}

#[test]
fn failed_build_still_exits_zero_and_stops_early() {
    let job = Job::with_commands(&[
        ("c1", "echo before"),
        ("c2", "exit 3"),
        ("c3", "echo never-runs"),
    ]);
    job.run()
        .passes()
        .stdout_has("before")
        .stdout_has("command c2 exited with 3")
        .stdout_has("[tinker] build failed")
        .stdout_lacks("never-runs");
}

#[test]
fn commands_run_in_the_workspace() {
    let job = Job::with_commands(&[("c1", "echo made > marker.txt")]);
    job.run().passes();
    let marker = std::fs::read_to_string(job.workspace().join("marker.txt")).unwrap();
    assert_eq!(marker.trim(), "made");
}

#[test]
fn artifacts_are_copied_by_the_local_reporter() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("job.json");
    let workspace = dir.path().join("ws");
    let artifacts = dir.path().join("artifacts");
    std::fs::create_dir_all(&workspace).unwrap();
    std::fs::write(
        &config,
        serde_json::to_vec(&serde_json::json!({
            "id": "js-spec",
            "commands": [
                {"id": "c1", "script": "echo '<testsuite/>' > junit.xml", "artifacts": ["*.xml"]}
            ]
        }))
        .unwrap(),
    )
    .unwrap();

    cli()
        .args(&[
            "run",
            "--config-file",
            &config.to_string_lossy(),
            "--workspace",
            &workspace.to_string_lossy(),
            "--reporter",
            "local",
            "--artifacts-dir",
            &artifacts.to_string_lossy(),
        ])
        .passes();

    assert!(artifacts.join("junit.xml").exists());
}
