// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

fn args(cmd: &std::process::Command) -> Vec<String> {
    cmd.get_args()
        .map(|a| a.to_string_lossy().into_owned())
        .collect()
}

#[parameterized(
    plain_dir = { "lxc.rootfs.path = dir:/var/lib/lxc/c1/rootfs\n", Some(RootfsSource::Dir("/var/lib/lxc/c1/rootfs".into())) },
    legacy_key = { "lxc.rootfs = /var/lib/lxc/c1/rootfs\n", Some(RootfsSource::Dir("/var/lib/lxc/c1/rootfs".into())) },
    overlay = {
        "lxc.arch = amd64\nlxc.rootfs.path = overlayfs:/var/lib/lxc/base/rootfs:/var/lib/lxc/c1/delta0\n",
        Some(RootfsSource::Overlay { lower: "/var/lib/lxc/base/rootfs".into(), upper: "/var/lib/lxc/c1/delta0".into() })
    },
    missing = { "lxc.arch = amd64\n", None },
)]
fn parses_rootfs_source(config: &str, expected: Option<RootfsSource>) {
    assert_eq!(rootfs_source(config), expected);
}

#[test]
fn portable_config_drops_host_specific_keys() {
    let config = "lxc.arch = amd64\nlxc.rootfs.path = dir:/x\nlxc.uts.name = c1\nlxc.mount.entry = a b\nlxc.include = common.conf\n";
    assert_eq!(
        portable_config(config),
        "lxc.arch = amd64\nlxc.include = common.conf\n"
    );
}

#[test]
fn attach_as_user_goes_through_sudo() {
    let rt = LxcRuntime::new("/srv/lxc");
    let spec = AttachSpec {
        user: Some("ubuntu".to_string()),
        env: vec![("VAR".to_string(), "hello world".to_string())],
        argv: vec!["bash".to_string(), "-c".to_string(), "true".to_string()],
        capture: false,
    };

    let cmd = rt.attach_command("job-1", &spec);

    assert_eq!(cmd.get_program(), "lxc-attach");
    assert_eq!(
        args(&cmd),
        vec![
            "-P",
            "/srv/lxc",
            "-n",
            "job-1",
            "--clear-env",
            "-v",
            "PATH=/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin",
            "-v",
            "VAR=hello world",
            "--",
            "sudo",
            "-EHu",
            "ubuntu",
            "--",
            "bash",
            "-c",
            "true",
        ]
    );
}

#[test]
fn attach_as_root_runs_argv_directly() {
    let rt = LxcRuntime::new("/srv/lxc");
    let cmd = rt.attach_command("job-1", &AttachSpec::root(&["apt-get", "update"]));
    let args = args(&cmd);
    let tail: Vec<&str> = args.iter().skip_while(|a| *a != "--").map(String::as_str).collect();
    assert_eq!(tail, vec!["--", "apt-get", "update"]);
}

#[tokio::test]
async fn rootfs_prefers_overlay_upper_layer() {
    let dir = tempfile::tempdir().unwrap();
    let rt = LxcRuntime::new(dir.path());
    std::fs::create_dir_all(dir.path().join("plain/rootfs")).unwrap();
    std::fs::create_dir_all(dir.path().join("clone/delta0")).unwrap();

    assert_eq!(rt.rootfs("plain"), dir.path().join("plain/rootfs"));
    assert_eq!(rt.rootfs("clone"), dir.path().join("clone/delta0"));
}

#[tokio::test]
async fn exists_and_append_config_use_container_dir() {
    let dir = tempfile::tempdir().unwrap();
    let rt = LxcRuntime::new(dir.path());
    assert!(!rt.exists("c1").await.unwrap());

    std::fs::create_dir_all(dir.path().join("c1")).unwrap();
    std::fs::write(dir.path().join("c1/config"), "lxc.arch = amd64\n").unwrap();
    assert!(rt.exists("c1").await.unwrap());

    rt.append_config("c1", &["lxc.autodev = 1".to_string()])
        .await
        .unwrap();
    assert_eq!(
        std::fs::read_to_string(dir.path().join("c1/config")).unwrap(),
        "lxc.arch = amd64\nlxc.autodev = 1\n"
    );
}
