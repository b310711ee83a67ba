// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const JOB: &str = r#"{
    "id": "js-1",
    "commands": [
        {"id": "c1", "script": "make", "env": {"CI": "1"}, "captureOutput": true}
    ],
    "resources": {"cpus": 4, "mem": 2048}
}"#;

fn loader() -> ConfigLoader {
    ConfigLoader::new()
        .unwrap()
        .with_retries(3, Duration::from_millis(1))
}

#[tokio::test]
async fn fetches_a_job_step() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/0/jobsteps/js-1/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(JOB))
        .expect(1)
        .mount(&server)
        .await;
    let base = format!("{}/api/0/", server.uri());

    let job = loader()
        .load(&ConfigSource::JobStep("js-1".to_string()), &base)
        .await
        .unwrap();

    assert_eq!(job.id, "js-1");
    assert_eq!(job.server, format!("{}/api/0", server.uri()));
    assert_eq!(job.commands.len(), 1);
    assert!(job.commands[0].capture_output);
    assert_eq!(job.resources.memory_mb, Some(2048));
}

#[tokio::test]
async fn fetches_a_snapshot_image_build() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/snapshotimages/img-1/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(JOB))
        .mount(&server)
        .await;

    let job = loader()
        .load(&ConfigSource::SnapshotImage("img-1".to_string()), &server.uri())
        .await
        .unwrap();
    assert_eq!(job.id, "js-1");
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jobsteps/js-1/"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/jobsteps/js-1/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(JOB))
        .mount(&server)
        .await;

    let job = loader()
        .load(&ConfigSource::JobStep("js-1".to_string()), &server.uri())
        .await
        .unwrap();
    assert_eq!(job.id, "js-1");
}

#[tokio::test]
async fn persistent_error_status_is_reported_after_every_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jobsteps/js-1/"))
        .respond_with(ResponseTemplate::new(404))
        .expect(3)
        .mount(&server)
        .await;

    let err = loader()
        .load(&ConfigSource::JobStep("js-1".to_string()), &server.uri())
        .await
        .unwrap_err();
    assert!(matches!(err, LoadError::Status { status: 404, .. }));
}

#[tokio::test]
async fn invalid_body_is_a_config_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jobsteps/js-1/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let err = loader()
        .load(&ConfigSource::JobStep("js-1".to_string()), &server.uri())
        .await
        .unwrap_err();
    assert!(matches!(err, LoadError::Config(ConfigError::Parse(_))));
}

#[tokio::test]
async fn reads_a_local_file() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("job.json");
    std::fs::write(&file, JOB).unwrap();

    let job = loader()
        .load(&ConfigSource::File(file), "http://localhost:5000")
        .await
        .unwrap();
    assert_eq!(job.commands[0].env.get("CI").map(String::as_str), Some("1"));
    assert_eq!(job.server, "http://localhost:5000");
}

#[tokio::test]
async fn missing_file_names_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("absent.json");

    let err = loader()
        .load(&ConfigSource::File(file.clone()), "http://localhost:5000")
        .await
        .unwrap_err();
    assert!(matches!(err, LoadError::Read { .. }));
    assert!(err.to_string().contains(&file.display().to_string()));
}
