// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn copies_artifacts_into_directory() {
    let src = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let file = src.path().join("report.xml");
    std::fs::write(&file, "<ok/>").unwrap();

    let reporter = LocalReporter::new(Some(out.path().join("artifacts")));
    let cmd = CommandSpec::new("c1", "true");
    reporter.publish_artifacts(&cmd, &[file]).await.unwrap();

    let copied = out.path().join("artifacts/report.xml");
    assert_eq!(std::fs::read_to_string(copied).unwrap(), "<ok/>");
}

#[tokio::test]
async fn name_clash_is_prefixed_with_command_id() {
    let src = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let file = src.path().join("report.xml");
    std::fs::write(&file, "first").unwrap();

    let reporter = LocalReporter::new(Some(out.path().to_path_buf()));
    reporter
        .publish_artifacts(&CommandSpec::new("c1", "true"), &[file.clone()])
        .await
        .unwrap();
    std::fs::write(&file, "second").unwrap();
    reporter
        .publish_artifacts(&CommandSpec::new("c2", "true"), &[file])
        .await
        .unwrap();

    assert_eq!(
        std::fs::read_to_string(out.path().join("report.xml")).unwrap(),
        "first"
    );
    assert_eq!(
        std::fs::read_to_string(out.path().join("c2-report.xml")).unwrap(),
        "second"
    );
}

#[tokio::test]
async fn without_directory_artifacts_are_only_logged() {
    let reporter = LocalReporter::default();
    reporter
        .publish_artifacts(
            &CommandSpec::new("c1", "true"),
            &[PathBuf::from("/nonexistent/file")],
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn missing_source_file_is_an_io_error() {
    let out = tempfile::tempdir().unwrap();
    let reporter = LocalReporter::new(Some(out.path().to_path_buf()));
    let err = reporter
        .publish_artifacts(
            &CommandSpec::new("c1", "true"),
            &[out.path().join("missing.txt")],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ReportError::Io(_)));
}
