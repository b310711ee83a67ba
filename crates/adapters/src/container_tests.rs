// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::recovery::ExecutorSlot;

struct Setup {
    dir: tempfile::TempDir,
    runtime: FakeRuntime,
    store: FakeObjectStore,
    log: LogBuffer,
}

impl Setup {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let runtime = FakeRuntime::new(&dir.path().join("lxc"));
        Self {
            dir,
            runtime,
            store: FakeObjectStore::new(),
            log: LogBuffer::with_flush_interval("console", Duration::from_secs(3600)).unwrap(),
        }
    }

    fn options(&self) -> ContainerOptions {
        ContainerOptions {
            lock_dir: self.dir.path().join("locks"),
            network_wait: Duration::from_millis(50),
            limits: ResourceLimits {
                cpus: Some(2),
                memory_mb: None,
            },
            ..Default::default()
        }
    }

    fn slot(&self) -> ExecutorSlot {
        ExecutorSlot::new(self.dir.path().join("slots"), "runner-1")
    }

    fn backend(&self, options: ContainerOptions) -> ContainerBackend<FakeRuntime> {
        let cache = ImageCache::new(
            self.dir.path().join("cache"),
            Some(Arc::new(self.store.clone())),
        );
        ContainerBackend::new(self.runtime.clone(), cache, options).with_slot(self.slot())
    }

    async fn prepared(&self, options: ContainerOptions, job: JobConfig) -> ContainerBackend<FakeRuntime> {
        let backend = self.backend(options);
        backend.init(Arc::new(job)).await.unwrap();
        backend.prepare(&self.log).await.unwrap();
        backend
    }
}

fn job() -> JobConfig {
    JobConfig::for_test("js-1", vec![])
}

fn bootstrap_spec() -> AttachSpec {
    AttachSpec::root(&["bash", "-c", BOOTSTRAP_SCRIPT, "bootstrap", "ubuntu"])
}

fn last_attach(runtime: &FakeRuntime) -> (AttachSpec, Option<String>) {
    runtime
        .calls()
        .into_iter()
        .rev()
        .find_map(|c| match c {
            RuntimeCall::Attach { spec, script, .. } => Some((spec, script)),
            _ => None,
        })
        .unwrap()
}

#[tokio::test]
async fn fresh_container_is_created_configured_started_and_bootstrapped() {
    let s = Setup::new();
    let backend = s.prepared(s.options(), job()).await;

    let limits = ResourceLimits {
        cpus: Some(2),
        memory_mb: None,
    };
    assert_eq!(
        s.runtime.calls(),
        vec![
            RuntimeCall::Create {
                name: "js-1".to_string(),
                template: Template {
                    dist: "ubuntu".to_string(),
                    release: "trusty".to_string(),
                    arch: "amd64".to_string(),
                },
            },
            RuntimeCall::AppendConfig {
                name: "js-1".to_string(),
                lines: isolation_config(limits, &[]),
            },
            RuntimeCall::Start {
                name: "js-1".to_string()
            },
            RuntimeCall::Attach {
                name: "js-1".to_string(),
                spec: bootstrap_spec(),
                script: None,
            },
        ]
    );
    assert_eq!(backend.phase(), Phase::Running);
    assert_eq!(s.slot().take().unwrap().container, "js-1");
    // Lock is released once the container is defined
    assert!(!s.dir.path().join("locks").join("js-1.lock").exists());
}

#[tokio::test]
async fn job_limits_win_over_fallback() {
    let s = Setup::new();
    let mut job = job();
    job.resources = ResourceLimits {
        cpus: Some(8),
        memory_mb: Some(4096),
    };
    s.prepared(s.options(), job).await;

    let lines = s
        .runtime
        .calls()
        .into_iter()
        .find_map(|c| match c {
            RuntimeCall::AppendConfig { lines, .. } => Some(lines),
            _ => None,
        })
        .unwrap();
    assert!(lines.contains(&"lxc.cgroup.cpu.shares = 8192".to_string()));
    assert!(lines.contains(&"lxc.cgroup.memory.limit_in_bytes = 4096M".to_string()));
}

#[tokio::test]
async fn output_snapshot_names_the_container() {
    let s = Setup::new();
    let backend = s.backend(s.options());
    backend
        .init(Arc::new(job().with_expected_snapshot("snap-9")))
        .await
        .unwrap();
    assert_eq!(backend.container_name().as_deref(), Some("snap-9"));
}

#[tokio::test]
async fn missing_base_is_downloaded_created_and_cloned() {
    let s = Setup::new();
    let rel = "ubuntu/trusty/amd64/base-7";
    s.store.put(rel, "rootfs.tar.xz", b"rootfs");
    s.store.put(rel, "meta.tar.xz", b"meta");
    s.store.put(rel, "origin", b"snap-build");
    let options = ContainerOptions {
        base_snapshot: Some(SnapshotId::new("base-7")),
        ..s.options()
    };

    s.prepared(options, job()).await;

    assert_eq!(s.store.downloads(), vec![rel.to_string()]);
    let calls = s.runtime.calls();
    assert_eq!(
        calls[..2],
        [
            RuntimeCall::CreateFromImage {
                name: "base-7".to_string()
            },
            RuntimeCall::Clone {
                base: "base-7".to_string(),
                name: "js-1".to_string()
            },
        ]
    );
    assert!(!s.dir.path().join("locks").join("base-7.lock").exists());
}

#[tokio::test]
async fn existing_base_is_cloned_without_download() {
    let s = Setup::new();
    s.runtime.add_container("base-7", false);
    let options = ContainerOptions {
        base_snapshot: Some(SnapshotId::new("base-7")),
        ..s.options()
    };

    s.prepared(options, job()).await;

    assert!(s.store.downloads().is_empty());
    assert_eq!(
        s.runtime.calls()[0],
        RuntimeCall::Clone {
            base: "base-7".to_string(),
            name: "js-1".to_string()
        }
    );
}

#[tokio::test]
async fn unavailable_base_fails_prepare_and_releases_lock() {
    let s = Setup::new();
    let options = ContainerOptions {
        base_snapshot: Some(SnapshotId::new("base-7")),
        ..s.options()
    };
    let backend = s.backend(options);
    backend.init(Arc::new(job())).await.unwrap();

    let err = backend.prepare(&s.log).await.unwrap_err();

    assert!(matches!(
        err,
        BackendError::Container(ContainerError::ImageMissing(_))
    ));
    assert_eq!(backend.phase(), Phase::Defining);
    assert!(!s.dir.path().join("locks").join("base-7.lock").exists());
    // Nothing was created, so nothing is torn down
    backend.shutdown(&s.log).await.unwrap();
    assert!(s.runtime.calls().is_empty());
    assert_eq!(backend.phase(), Phase::Destroyed);
    assert!(!s.slot().path().exists());
}

#[tokio::test]
async fn name_collision_leaves_the_other_container_alone() {
    let s = Setup::new();
    s.runtime.add_container("js-1", true);
    let backend = s.backend(s.options());
    backend.init(Arc::new(job())).await.unwrap();

    let err = backend.prepare(&s.log).await.unwrap_err();
    assert!(matches!(
        err,
        BackendError::Container(ContainerError::AlreadyExists(ref n)) if n == "js-1"
    ));
    assert!(s.runtime.calls().is_empty());
    assert_eq!(backend.phase(), Phase::Undefined);
    assert!(!s.slot().path().exists());

    backend.shutdown(&s.log).await.unwrap();
    assert_eq!(s.runtime.container_names(), vec!["js-1"]);
}

#[tokio::test]
async fn container_left_by_a_failed_create_is_torn_down() {
    let s = Setup::new();
    s.runtime.fail_midway("create");
    let backend = s.backend(s.options());
    backend.init(Arc::new(job())).await.unwrap();

    assert!(backend.prepare(&s.log).await.is_err());
    assert_eq!(backend.phase(), Phase::Defining);
    assert_eq!(s.runtime.container_names(), vec!["js-1"]);
    assert!(s.slot().path().exists());

    backend.shutdown(&s.log).await.unwrap();
    assert!(s.runtime.container_names().is_empty());
    assert_eq!(backend.phase(), Phase::Destroyed);
    assert!(!s.slot().path().exists());
}

#[tokio::test]
async fn abandoned_clone_is_recorded_and_torn_down() {
    let s = Setup::new();
    s.runtime.add_container("base-7", false);
    s.runtime.hang("clone");
    let options = ContainerOptions {
        base_snapshot: Some(SnapshotId::new("base-7")),
        ..s.options()
    };
    let backend = s.backend(options);
    backend.init(Arc::new(job())).await.unwrap();

    let abandoned = tokio::time::timeout(Duration::from_millis(50), backend.prepare(&s.log)).await;
    assert!(abandoned.is_err());
    let record = std::fs::read_to_string(s.slot().path()).unwrap();
    assert!(record.contains("js-1"));
    assert!(!s.dir.path().join("locks").join("base-7.lock").exists());

    backend.shutdown(&s.log).await.unwrap();
    assert_eq!(s.runtime.container_names(), vec!["base-7"]);
    assert!(!s.slot().path().exists());
}

#[tokio::test]
async fn prepare_requires_init() {
    let s = Setup::new();
    assert!(matches!(
        s.backend(s.options()).prepare(&s.log).await,
        Err(BackendError::NotInitialized)
    ));
}

#[tokio::test]
async fn no_network_address_is_fatal_but_still_torn_down() {
    let s = Setup::new();
    s.runtime.set_addresses(Vec::new());
    let backend = s.backend(s.options());
    backend.init(Arc::new(job())).await.unwrap();

    let err = backend.prepare(&s.log).await.unwrap_err();
    assert!(matches!(
        err,
        BackendError::Container(ContainerError::NoNetwork { .. })
    ));

    backend.shutdown(&s.log).await.unwrap();
    assert!(s.runtime.container_names().is_empty());
    assert_eq!(backend.phase(), Phase::Destroyed);
}

#[tokio::test]
async fn failed_bootstrap_fails_prepare() {
    let s = Setup::new();
    s.runtime.set_attach_result(100, b"E: Unable to locate package\n");
    let backend = s.backend(s.options());
    backend.init(Arc::new(job())).await.unwrap();

    assert!(matches!(
        backend.prepare(&s.log).await,
        Err(BackendError::Container(ContainerError::Bootstrap(100)))
    ));
}

#[tokio::test]
async fn pre_launch_hook_sees_container_name_and_rootfs() {
    let s = Setup::new();
    let hook = s.dir.path().join("pre-launch.sh");
    let out = s.dir.path().join("hook.out");
    std::fs::write(
        &hook,
        format!(
            "#!/bin/sh\necho \"$LXC_NAME $LXC_ROOTFS\" > {}\n",
            out.display()
        ),
    )
    .unwrap();
    std::fs::set_permissions(&hook, std::fs::Permissions::from_mode(0o755)).unwrap();
    let options = ContainerOptions {
        pre_launch: Some(hook),
        ..s.options()
    };

    s.prepared(options, job()).await;

    let seen = std::fs::read_to_string(out).unwrap();
    assert_eq!(
        seen.trim(),
        format!("js-1 {}", s.runtime.rootfs("js-1").display())
    );
}

#[tokio::test]
async fn failing_pre_launch_hook_stops_before_start() {
    let s = Setup::new();
    let options = ContainerOptions {
        pre_launch: Some(PathBuf::from("/bin/false")),
        ..s.options()
    };
    let backend = s.backend(options);
    backend.init(Arc::new(job())).await.unwrap();

    assert!(matches!(
        backend.prepare(&s.log).await,
        Err(BackendError::Container(ContainerError::Hook {
            hook: "pre-launch",
            code: 1
        }))
    ));
    assert!(!s
        .runtime
        .calls()
        .iter()
        .any(|c| matches!(c, RuntimeCall::Start { .. })));
}

#[tokio::test]
async fn post_launch_hook_runs_inside_as_root() {
    let s = Setup::new();
    let hook = s.dir.path().join("post-launch.sh");
    std::fs::write(&hook, "apt-get install -y make\n").unwrap();
    let options = ContainerOptions {
        post_launch: Some(hook),
        ..s.options()
    };

    s.prepared(options, job()).await;

    let (spec, script) = last_attach(&s.runtime);
    assert_eq!(spec.user, None);
    assert!(spec.argv[0].starts_with("/tmp/post-launch-"));
    assert_eq!(
        script.as_deref(),
        Some("#!/bin/bash\napt-get install -y make\n")
    );
}

#[tokio::test]
async fn run_executes_script_as_user_in_cwd() {
    let s = Setup::new();
    let backend = s.prepared(s.options(), job()).await;
    s.runtime.set_attach_result(0, b"built\n");
    let mut cmd = CommandSpec::new("c1", "make test")
        .with_env("CI", "1")
        .capturing();
    cmd.cwd = "src".to_string();

    let result = backend.run(&cmd, &s.log).await.unwrap();

    assert!(result.success());
    assert_eq!(result.output.as_deref(), Some(&b"built\n"[..]));
    let (spec, script) = last_attach(&s.runtime);
    assert_eq!(spec.user.as_deref(), Some("ubuntu"));
    assert!(spec.capture);
    let argv: Vec<&str> = spec.argv.iter().map(String::as_str).collect();
    assert_eq!(argv[..4], ["bash", "-c", ENTER_CWD, "/home/ubuntu/src"]);
    assert!(argv[4].starts_with("/tmp/script-"));
    assert_eq!(script.as_deref(), Some("#!/bin/bash\nmake test"));
    assert!(spec.env.contains(&("CI".to_string(), "1".to_string())));
    assert!(spec
        .env
        .contains(&("HOME".to_string(), "/home/ubuntu".to_string())));

    // The script does not outlive the command
    let tmp = s.runtime.rootfs("js-1").join("tmp");
    assert_eq!(std::fs::read_dir(tmp).unwrap().count(), 0);
}

#[tokio::test]
async fn run_reports_exit_code() {
    let s = Setup::new();
    let backend = s.prepared(s.options(), job()).await;
    s.runtime.set_attach_result(2, b"");

    let result = backend
        .run(&CommandSpec::new("c1", "exit 2"), &s.log)
        .await
        .unwrap();
    assert_eq!(result.exit_code, 2);
    assert_eq!(result.output, None);
}

#[tokio::test]
async fn run_before_prepare_is_rejected() {
    let s = Setup::new();
    let backend = s.backend(s.options());
    backend.init(Arc::new(job())).await.unwrap();
    assert!(matches!(
        backend.run(&CommandSpec::new("c1", "true"), &s.log).await,
        Err(BackendError::NotPrepared)
    ));
}

#[tokio::test]
async fn shutdown_stops_destroys_and_is_idempotent() {
    let s = Setup::new();
    let backend = s.prepared(s.options(), job()).await;

    backend.shutdown(&s.log).await.unwrap();
    let after_first = s.runtime.calls();
    backend.shutdown(&s.log).await.unwrap();
    backend.shutdown(&s.log).await.unwrap();

    assert_eq!(
        after_first[after_first.len() - 2..],
        [
            RuntimeCall::Stop {
                name: "js-1".to_string()
            },
            RuntimeCall::Destroy {
                name: "js-1".to_string()
            },
        ]
    );
    assert_eq!(s.runtime.calls(), after_first);
    assert!(s.runtime.container_names().is_empty());
    assert_eq!(backend.phase(), Phase::Destroyed);
    assert!(!s.slot().path().exists());
}

#[tokio::test]
async fn shutdown_before_prepare_is_a_no_op() {
    let s = Setup::new();
    let backend = s.backend(s.options());
    backend.shutdown(&s.log).await.unwrap();
    backend.init(Arc::new(job())).await.unwrap();
    backend.shutdown(&s.log).await.unwrap();
    assert!(s.runtime.calls().is_empty());
}

#[tokio::test]
async fn container_that_refuses_to_stop_is_an_error() {
    let s = Setup::new();
    let backend = s.prepared(s.options(), job()).await;
    s.runtime.refuse_stop();

    let err = backend.shutdown(&s.log).await.unwrap_err();

    assert!(matches!(
        err,
        BackendError::Container(ContainerError::StillRunning(ref n)) if n == "js-1"
    ));
    assert!(!s
        .runtime
        .calls()
        .iter()
        .any(|c| matches!(c, RuntimeCall::Destroy { .. })));
}

#[tokio::test]
async fn kept_container_survives_shutdown() {
    let s = Setup::new();
    let options = ContainerOptions {
        keep: true,
        ..s.options()
    };
    let backend = s.prepared(options, job()).await;

    backend.shutdown(&s.log).await.unwrap();

    assert_eq!(s.runtime.container_names(), vec!["js-1"]);
    assert!(!s
        .runtime
        .calls()
        .iter()
        .any(|c| matches!(c, RuntimeCall::Stop { .. })));
    assert!(s.slot().path().exists());
}

#[tokio::test]
async fn capture_snapshot_exports_records_origin_and_uploads() {
    let s = Setup::new();
    let backend = s
        .prepared(s.options(), job().with_expected_snapshot("snap-1"))
        .await;

    backend
        .capture_snapshot(&SnapshotId::new("snap-1"), &s.log)
        .await
        .unwrap();

    let calls = s.runtime.calls();
    assert_eq!(
        calls[calls.len() - 2..],
        [
            RuntimeCall::Stop {
                name: "snap-1".to_string()
            },
            RuntimeCall::Export {
                name: "snap-1".to_string()
            },
        ]
    );
    let image_dir = s.dir.path().join("cache/ubuntu/trusty/amd64/snap-1");
    assert_eq!(
        std::fs::read_to_string(image_dir.join("origin")).unwrap(),
        "snap-1"
    );
    assert_eq!(s.store.uploads(), vec!["ubuntu/trusty/amd64/snap-1"]);
    assert_eq!(
        s.store.files("ubuntu/trusty/amd64/snap-1"),
        vec!["meta.tar.xz", "origin", "rootfs.tar.xz"]
    );
    assert_eq!(backend.phase(), Phase::Stopped);

    // Teardown after capture still destroys the stopped container
    backend.shutdown(&s.log).await.unwrap();
    assert!(s.runtime.container_names().is_empty());
}

#[tokio::test]
async fn failed_export_fails_capture() {
    let s = Setup::new();
    let backend = s.prepared(s.options(), job()).await;
    s.runtime.fail("export");

    assert!(backend
        .capture_snapshot(&SnapshotId::new("snap-1"), &s.log)
        .await
        .is_err());
    assert!(s.store.uploads().is_empty());
}

#[tokio::test]
async fn artifacts_are_found_under_the_user_home() {
    let s = Setup::new();
    let backend = s.prepared(s.options(), job()).await;
    let home = s.runtime.rootfs("js-1").join("home/ubuntu");
    std::fs::create_dir_all(home.join("out")).unwrap();
    std::fs::write(home.join("out/junit.xml"), "<testsuite/>").unwrap();
    std::fs::write(home.join("out/notes.txt"), "").unwrap();

    let found = backend
        .collect_artifacts(&["*.xml".to_string()], &s.log)
        .await
        .unwrap();

    assert_eq!(found, vec![home.join("out/junit.xml")]);
}

#[test]
fn guest_cwd_resolves_against_home() {
    let options = ContainerOptions::default();
    assert_eq!(options.guest_cwd(""), "/home/ubuntu");
    assert_eq!(options.guest_cwd("build"), "/home/ubuntu/build");
    assert_eq!(options.guest_cwd("/srv/app"), "/srv/app");
}

#[tokio::test]
async fn leftover_from_slot_is_cleaned_before_prepare() {
    let s = Setup::new();
    s.runtime.add_container("js-0", true);
    s.slot().register("js-0");
    let backend = s.backend(s.options());

    assert_eq!(backend.clean_leftover_state().await.as_deref(), Some("js-0"));
    assert!(s.runtime.container_names().is_empty());

    let unslotted = ContainerBackend::new(
        s.runtime.clone(),
        ImageCache::new(s.dir.path().join("cache"), None),
        s.options(),
    );
    assert!(unslotted.clean_leftover_state().await.is_none());
}
