// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! LXC runtime driven through the `lxc-*` command-line tools

use super::image::ImageFiles;
use super::runtime::{AttachSpec, ContainerRuntime, Template};
use super::ContainerError;
use crate::subprocess::{
    check_output, run_streaming, Streamed, CREATE_TIMEOUT, IMAGE_TIMEOUT, RUNTIME_TIMEOUT,
};
use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;

/// Seconds `lxc-stop` waits for a clean shutdown before giving up.
const STOP_TIMEOUT_SECS: u64 = 30;

/// PATH inside containers for attached programs.
const GUEST_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// Config keys that belong to a specific container and must not travel with an image.
const HOST_SPECIFIC_KEYS: &[&str] = &["lxc.rootfs", "lxc.utsname", "lxc.uts.name", "lxc.mount"];

/// LXC container runtime rooted at an lxcpath (usually `/var/lib/lxc`).
#[derive(Debug, Clone)]
pub struct LxcRuntime {
    lxcpath: PathBuf,
}

impl Default for LxcRuntime {
    fn default() -> Self {
        Self::new("/var/lib/lxc")
    }
}

/// Where a container's filesystem comes from, per its config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RootfsSource {
    Dir(PathBuf),
    Overlay { lower: PathBuf, upper: PathBuf },
}

/// Parse the rootfs entry of an LXC config file.
pub(crate) fn rootfs_source(config: &str) -> Option<RootfsSource> {
    let value = config.lines().find_map(|line| {
        let (key, value) = line.split_once('=')?;
        matches!(key.trim(), "lxc.rootfs.path" | "lxc.rootfs").then(|| value.trim().to_string())
    })?;

    for prefix in ["overlayfs:", "overlay:"] {
        if let Some(rest) = value.strip_prefix(prefix) {
            let (lower, upper) = rest.rsplit_once(':')?;
            return Some(RootfsSource::Overlay {
                lower: PathBuf::from(lower),
                upper: PathBuf::from(upper),
            });
        }
    }
    let dir = value.strip_prefix("dir:").unwrap_or(&value);
    Some(RootfsSource::Dir(PathBuf::from(dir)))
}

/// Config suitable for shipping inside an image's metadata archive.
pub(crate) fn portable_config(config: &str) -> String {
    config
        .lines()
        .filter(|line| {
            let key = line.split('=').next().unwrap_or("").trim();
            !HOST_SPECIFIC_KEYS.iter().any(|k| key.starts_with(k))
        })
        .map(|line| format!("{line}\n"))
        .collect()
}

impl LxcRuntime {
    pub fn new(lxcpath: impl Into<PathBuf>) -> Self {
        Self {
            lxcpath: lxcpath.into(),
        }
    }

    fn container_dir(&self, name: &str) -> PathBuf {
        self.lxcpath.join(name)
    }

    fn config_path(&self, name: &str) -> PathBuf {
        self.container_dir(name).join("config")
    }

    fn lxc(&self, tool: &str, name: &str) -> Command {
        let mut cmd = Command::new(tool);
        cmd.arg("-P").arg(&self.lxcpath).arg("-n").arg(name);
        cmd
    }

    async fn checked(
        &self,
        cmd: Command,
        timeout: Duration,
        op: &'static str,
        name: &str,
    ) -> Result<std::process::Output, ContainerError> {
        check_output(cmd, timeout, op)
            .await
            .map_err(|message| ContainerError::Runtime {
                op,
                name: name.to_string(),
                message,
            })
    }

    /// `lxc-attach` invocation for `spec`.
    pub(crate) fn attach_command(&self, name: &str, spec: &AttachSpec) -> std::process::Command {
        let mut cmd = std::process::Command::new("lxc-attach");
        cmd.arg("-P")
            .arg(&self.lxcpath)
            .arg("-n")
            .arg(name)
            .arg("--clear-env")
            .arg("-v")
            .arg(format!("PATH={GUEST_PATH}"));
        for (key, value) in &spec.env {
            cmd.arg("-v").arg(format!("{key}={value}"));
        }
        cmd.arg("--");
        if let Some(user) = &spec.user {
            cmd.args(["sudo", "-EHu", user.as_str(), "--"]);
        }
        cmd.args(&spec.argv);
        cmd
    }

    async fn tar(
        &self,
        name: &str,
        src: &Path,
        dest: &Path,
        program: &str,
    ) -> Result<(), ContainerError> {
        let mut cmd = Command::new("tar");
        cmd.arg("--numeric-owner")
            .arg(format!("--use-compress-program={program}"))
            .arg("-C")
            .arg(src)
            .arg("-cf")
            .arg(dest)
            .arg(".");
        self.checked(cmd, IMAGE_TIMEOUT, "tar", name).await?;
        Ok(())
    }

    /// Archive an overlay clone through a temporary merged mount.
    async fn tar_overlay(
        &self,
        name: &str,
        lower: &Path,
        upper: &Path,
        dest: &Path,
        program: &str,
    ) -> Result<(), ContainerError> {
        let work = self.container_dir(name).join("olwork");
        tokio::fs::create_dir_all(&work).await?;
        let mnt = tempfile::Builder::new().prefix("tk-export-").tempdir()?;

        let mut mount = Command::new("mount");
        mount
            .args(["-t", "overlay", "overlay", "-o"])
            .arg(format!(
                "lowerdir={},upperdir={},workdir={}",
                lower.display(),
                upper.display(),
                work.display()
            ))
            .arg(mnt.path());
        self.checked(mount, RUNTIME_TIMEOUT, "mount", name).await?;

        let archived = self.tar(name, mnt.path(), dest, program).await;

        let mut umount = Command::new("umount");
        umount.arg(mnt.path());
        let unmounted = self.checked(umount, RUNTIME_TIMEOUT, "umount", name).await;
        archived?;
        unmounted.map(|_| ())
    }
}

#[async_trait]
impl ContainerRuntime for LxcRuntime {
    async fn exists(&self, name: &str) -> Result<bool, ContainerError> {
        Ok(tokio::fs::try_exists(self.config_path(name)).await?)
    }

    async fn create(&self, name: &str, template: &Template) -> Result<(), ContainerError> {
        let mut cmd = self.lxc("lxc-create", name);
        cmd.args(["-t", "download", "--", "--dist"])
            .arg(&template.dist)
            .arg("--release")
            .arg(&template.release)
            .arg("--arch")
            .arg(&template.arch);
        self.checked(cmd, CREATE_TIMEOUT, "lxc-create", name).await?;
        Ok(())
    }

    async fn create_from_image(
        &self,
        name: &str,
        image: &ImageFiles,
    ) -> Result<(), ContainerError> {
        let mut cmd = self.lxc("lxc-create", name);
        cmd.args(["-t", "local", "--", "--metadata"])
            .arg(&image.meta)
            .arg("--fstree")
            .arg(&image.rootfs);
        self.checked(cmd, CREATE_TIMEOUT, "lxc-create", name).await?;
        Ok(())
    }

    async fn clone_snapshot(&self, base: &str, name: &str) -> Result<(), ContainerError> {
        let mut cmd = self.lxc("lxc-copy", base);
        cmd.arg("-N").arg(name).args(["-s", "-B", "overlayfs"]);
        self.checked(cmd, CREATE_TIMEOUT, "lxc-copy", name).await?;
        Ok(())
    }

    async fn append_config(&self, name: &str, lines: &[String]) -> Result<(), ContainerError> {
        let path = self.config_path(name);
        let mut file = std::fs::OpenOptions::new().append(true).open(&path)?;
        for line in lines {
            writeln!(file, "{line}")?;
        }
        Ok(())
    }

    fn rootfs(&self, name: &str) -> PathBuf {
        // Overlay clones expose writes through their upper layer
        let delta = self.container_dir(name).join("delta0");
        if delta.is_dir() {
            delta
        } else {
            self.container_dir(name).join("rootfs")
        }
    }

    async fn start(&self, name: &str) -> Result<(), ContainerError> {
        let mut cmd = self.lxc("lxc-start", name);
        cmd.arg("-d");
        self.checked(cmd, RUNTIME_TIMEOUT, "lxc-start", name).await?;
        Ok(())
    }

    async fn addresses(&self, name: &str) -> Result<Vec<String>, ContainerError> {
        let mut cmd = self.lxc("lxc-info", name);
        cmd.args(["-i", "-H"]);
        let output = self.checked(cmd, RUNTIME_TIMEOUT, "lxc-info", name).await?;
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn is_running(&self, name: &str) -> Result<bool, ContainerError> {
        let mut cmd = self.lxc("lxc-info", name);
        cmd.args(["-s", "-H"]);
        let output = self.checked(cmd, RUNTIME_TIMEOUT, "lxc-info", name).await?;
        Ok(String::from_utf8_lossy(&output.stdout).trim() == "RUNNING")
    }

    async fn stop(&self, name: &str) -> Result<(), ContainerError> {
        if !self.is_running(name).await? {
            return Ok(());
        }
        let mut cmd = self.lxc("lxc-stop", name);
        cmd.arg("-t").arg(STOP_TIMEOUT_SECS.to_string());
        self.checked(
            cmd,
            RUNTIME_TIMEOUT + Duration::from_secs(STOP_TIMEOUT_SECS),
            "lxc-stop",
            name,
        )
        .await?;
        Ok(())
    }

    async fn kill(&self, name: &str) -> Result<(), ContainerError> {
        let mut cmd = self.lxc("lxc-stop", name);
        cmd.arg("-k");
        self.checked(cmd, RUNTIME_TIMEOUT, "lxc-stop -k", name).await?;
        Ok(())
    }

    async fn destroy(&self, name: &str) -> Result<(), ContainerError> {
        let cmd = self.lxc("lxc-destroy", name);
        self.checked(cmd, RUNTIME_TIMEOUT, "lxc-destroy", name).await?;
        Ok(())
    }

    async fn attach(
        &self,
        name: &str,
        spec: &AttachSpec,
        log: &tk_reporter::LogBuffer,
    ) -> Result<Streamed, ContainerError> {
        let cmd = self.attach_command(name, spec);
        Ok(run_streaming(cmd, log, spec.capture).await?)
    }

    async fn export(&self, name: &str, image: &ImageFiles) -> Result<(), ContainerError> {
        let config = tokio::fs::read_to_string(self.config_path(name)).await?;
        let program = image.compression.program();
        tokio::fs::create_dir_all(&image.dir).await?;

        match rootfs_source(&config) {
            Some(RootfsSource::Overlay { lower, upper }) => {
                self.tar_overlay(name, &lower, &upper, &image.rootfs, program)
                    .await?
            }
            Some(RootfsSource::Dir(dir)) => self.tar(name, &dir, &image.rootfs, program).await?,
            None => {
                let dir = self.container_dir(name).join("rootfs");
                self.tar(name, &dir, &image.rootfs, program).await?
            }
        }

        let meta = tempfile::Builder::new().prefix("tk-meta-").tempdir()?;
        tokio::fs::write(meta.path().join("config"), portable_config(&config)).await?;
        self.tar(name, meta.path(), &image.meta, program).await
    }
}

#[cfg(test)]
#[path = "lxc_tests.rs"]
mod tests;
