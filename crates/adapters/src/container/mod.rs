// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Container-backed execution.
//!
//! [`ContainerBackend`] drives one system container through its lifecycle:
//! locked definition (fresh from a template, or cloned from a cached snapshot
//! image), isolation config, launch hooks, network wait, bootstrap, command
//! execution as an unprivileged user, snapshot capture and teardown.

mod config;
mod image;
mod lxc;
mod runtime;

#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeObjectStore, FakeRuntime, RuntimeCall};

pub use config::{isolation_config, BindMount};
pub use image::{Compression, ImageCache, ImageFiles, ImageKey, ObjectStore, S3Sync};
pub use lxc::LxcRuntime;
pub use runtime::{AttachSpec, ContainerRuntime, Template};

use crate::backend::{with_shebang, BackendError, ExecutionBackend};
use crate::lock::FileLock;
use crate::recovery::ExecutorSlot;
use crate::subprocess::run_streaming;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tk_core::{format_duration, CommandResult, CommandSpec, JobConfig, ResourceLimits, SnapshotId};
use tk_reporter::LogBuffer;

/// Errors from container operations
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("{op} failed for container {name}: {message}")]
    Runtime {
        op: &'static str,
        name: String,
        message: String,
    },
    #[error("container {0} already exists")]
    AlreadyExists(String),
    #[error("container {name} has no network address after {secs}s")]
    NoNetwork { name: String, secs: u64 },
    #[error("container {0} is still running after stop")]
    StillRunning(String),
    #[error("snapshot image {0} is not available")]
    ImageMissing(String),
    #[error("{hook} hook exited with {code}")]
    Hook { hook: &'static str, code: i32 },
    #[error("container bootstrap exited with {0}")]
    Bootstrap(i32),
    #[error("image {op} failed: {message}")]
    Store { op: &'static str, message: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Where the container is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Undefined,
    /// The name is claimed and creation has begun; a partial container may exist.
    Defining,
    Created,
    Running,
    Stopped,
    Destroyed,
}

/// Interval between network address probes after start.
const NETWORK_POLL: Duration = Duration::from_millis(500);

/// Installs the tooling later steps depend on and grants `$1` passwordless sudo.
const BOOTSTRAP_SCRIPT: &str = r#"set -e
export DEBIAN_FRONTEND=noninteractive
apt-get update -qq
apt-get install -y -qq ca-certificates
id -u "$1" >/dev/null 2>&1 || useradd --create-home --shell /bin/bash "$1"
mkdir -p /etc/sudoers.d
printf 'Defaults:%s !requiretty\n%s ALL=(ALL) NOPASSWD: ALL\n' "$1" "$1" > /etc/sudoers.d/tinker
chmod 0440 /etc/sudoers.d/tinker
"#;

/// Changes into `$0` and replaces itself with the script at `$1`.
const ENTER_CWD: &str = r#"cd "$0" && exec "$1""#;

/// Settings for [`ContainerBackend`].
#[derive(Debug, Clone)]
pub struct ContainerOptions {
    pub dist: String,
    pub release: String,
    pub arch: String,
    /// Snapshot image to clone instead of building from the template.
    pub base_snapshot: Option<SnapshotId>,
    /// Unprivileged user commands run as.
    pub user: String,
    /// Leave the container in place on shutdown.
    pub keep: bool,
    /// Host script run after definition, before start.
    pub pre_launch: Option<PathBuf>,
    /// Script run inside the container as root after bootstrap.
    pub post_launch: Option<PathBuf>,
    pub compression: Compression,
    pub bind_mounts: Vec<BindMount>,
    /// Limits used when the job does not request its own.
    pub limits: ResourceLimits,
    pub lock_dir: PathBuf,
    pub network_wait: Duration,
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self {
            dist: "ubuntu".to_string(),
            release: "trusty".to_string(),
            arch: "amd64".to_string(),
            base_snapshot: None,
            user: "ubuntu".to_string(),
            keep: false,
            pre_launch: None,
            post_launch: None,
            compression: Compression::default(),
            bind_mounts: Vec::new(),
            limits: ResourceLimits::default(),
            lock_dir: std::env::temp_dir().join("tinker-locks"),
            network_wait: crate::env::network_wait(),
        }
    }
}

impl ContainerOptions {
    fn template(&self) -> Template {
        Template {
            dist: self.dist.clone(),
            release: self.release.clone(),
            arch: self.arch.clone(),
        }
    }

    fn image_key(&self, snapshot: &SnapshotId) -> ImageKey {
        ImageKey {
            dist: self.dist.clone(),
            release: self.release.clone(),
            arch: self.arch.clone(),
            name: snapshot.to_string(),
        }
    }

    fn home(&self) -> String {
        format!("/home/{}", self.user)
    }

    /// Guest working directory; relative paths resolve against the user's home.
    fn guest_cwd(&self, cwd: &str) -> String {
        if cwd.is_empty() {
            self.home()
        } else if cwd.starts_with('/') {
            cwd.to_string()
        } else {
            format!("{}/{}", self.home(), cwd)
        }
    }
}

struct State {
    job: Option<Arc<JobConfig>>,
    name: Option<String>,
    phase: Phase,
}

/// Execution backend that runs each job in its own system container.
pub struct ContainerBackend<R: ContainerRuntime> {
    runtime: R,
    cache: ImageCache,
    slot: Option<ExecutorSlot>,
    options: ContainerOptions,
    state: Mutex<State>,
}

/// Script file placed in a container's filesystem; removed on drop.
struct PlacedScript {
    host: PathBuf,
    guest: String,
}

impl Drop for PlacedScript {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.host) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %self.host.display(), error = %e, "failed to remove script"),
        }
    }
}

impl<R: ContainerRuntime> ContainerBackend<R> {
    pub fn new(runtime: R, cache: ImageCache, options: ContainerOptions) -> Self {
        Self {
            runtime,
            cache,
            slot: None,
            options,
            state: Mutex::new(State {
                job: None,
                name: None,
                phase: Phase::Undefined,
            }),
        }
    }

    /// Record the owned container in `slot` so a later run can recover it.
    pub fn with_slot(mut self, slot: ExecutorSlot) -> Self {
        self.slot = Some(slot);
        self
    }

    /// Remove a container a crashed run left behind in this backend's slot.
    ///
    /// Without a slot there is nothing to recover from.
    pub async fn clean_leftover_state(&self) -> Option<String> {
        let slot = self.slot.as_ref()?;
        slot.clean_leftover_state(&self.runtime).await
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn phase(&self) -> Phase {
        self.state.lock().phase
    }

    /// Name of the container, once the job is known.
    pub fn container_name(&self) -> Option<String> {
        self.state.lock().name.clone()
    }

    fn set_phase(&self, phase: Phase) {
        self.state.lock().phase = phase;
    }

    fn defined_name(&self) -> Result<String, BackendError> {
        let state = self.state.lock();
        match (&state.name, state.phase) {
            (Some(name), Phase::Created | Phase::Running | Phase::Stopped) => Ok(name.clone()),
            _ => Err(BackendError::NotPrepared),
        }
    }

    /// Define the container while holding the cross-process lock for its source.
    async fn define(&self, name: &str, log: &LogBuffer) -> Result<(), BackendError> {
        let key = self
            .options
            .base_snapshot
            .as_ref()
            .map_or(name, |s| s.as_str());
        let guard = FileLock::new(&self.options.lock_dir, key).acquire().await?;
        let defined = match self.runtime.exists(name).await {
            Ok(false) => {
                self.claim(name);
                self.create_container(name, log).await
            }
            Ok(true) => Err(ContainerError::AlreadyExists(name.to_string()).into()),
            Err(e) => Err(e.into()),
        };
        if let Err(e) = guard.release() {
            tracing::warn!(error = %e, "failed to release container lock");
        }
        defined
    }

    /// Mark `name` as ours before anything is created, so teardown and
    /// slot recovery both find a container left half-built.
    fn claim(&self, name: &str) {
        self.set_phase(Phase::Defining);
        if let Some(slot) = &self.slot {
            slot.register(name);
        }
    }

    async fn create_container(&self, name: &str, log: &LogBuffer) -> Result<(), BackendError> {
        let Some(snapshot) = &self.options.base_snapshot else {
            log.line(format_args!(
                "[lxc] creating {name} from {} {} {}",
                self.options.dist, self.options.release, self.options.arch
            ));
            self.runtime.create(name, &self.options.template()).await?;
            return Ok(());
        };

        let base = snapshot.as_str();
        if !self.runtime.exists(base).await? {
            let key = self.options.image_key(snapshot);
            log.line(format_args!(
                "[lxc] fetching snapshot image {}",
                key.relative_path()
            ));
            let started = Instant::now();
            let files = self.cache.ensure(&key).await?;
            log.line(format_args!(
                "[lxc] snapshot image ready after {}",
                format_duration(started.elapsed())
            ));
            self.runtime.create_from_image(base, &files).await?;
        }
        log.line(format_args!("[lxc] cloning {base} as {name}"));
        self.runtime.clone_snapshot(base, name).await?;
        Ok(())
    }

    async fn run_pre_launch(&self, hook: &Path, name: &str, log: &LogBuffer) -> Result<(), BackendError> {
        log.line(format_args!("[lxc] running pre-launch hook {}", hook.display()));
        let mut cmd = std::process::Command::new(hook);
        cmd.env("LXC_ROOTFS", self.runtime.rootfs(name))
            .env("LXC_NAME", name);
        let out = run_streaming(cmd, log, false).await?;
        if out.exit_code != 0 {
            return Err(ContainerError::Hook {
                hook: "pre-launch",
                code: out.exit_code,
            }
            .into());
        }
        Ok(())
    }

    async fn run_post_launch(&self, hook: &Path, name: &str, log: &LogBuffer) -> Result<(), BackendError> {
        log.line(format_args!("[lxc] running post-launch hook {}", hook.display()));
        let content = tokio::fs::read_to_string(hook).await?;
        let script = self.place_script(name, "post-launch", &with_shebang(&content))?;
        let spec = AttachSpec::root(&[script.guest.as_str()]);
        let out = self.runtime.attach(name, &spec, log).await?;
        if out.exit_code != 0 {
            return Err(ContainerError::Hook {
                hook: "post-launch",
                code: out.exit_code,
            }
            .into());
        }
        Ok(())
    }

    async fn wait_for_network(&self, name: &str, log: &LogBuffer) -> Result<(), BackendError> {
        let wait = self.options.network_wait;
        let started = Instant::now();
        loop {
            let addresses = self.runtime.addresses(name).await?;
            if let Some(addr) = addresses.first() {
                log.line(format_args!("[lxc] {name} is up at {addr}"));
                return Ok(());
            }
            let waited = started.elapsed();
            if waited >= wait {
                return Err(ContainerError::NoNetwork {
                    name: name.to_string(),
                    secs: wait.as_secs(),
                }
                .into());
            }
            tokio::time::sleep(NETWORK_POLL.min(wait - waited)).await;
        }
    }

    async fn bootstrap(&self, name: &str, log: &LogBuffer) -> Result<(), BackendError> {
        log.line("[lxc] installing base tooling");
        let spec = AttachSpec::root(&[
            "bash",
            "-c",
            BOOTSTRAP_SCRIPT,
            "bootstrap",
            self.options.user.as_str(),
        ]);
        let out = self.runtime.attach(name, &spec, log).await?;
        if out.exit_code != 0 {
            return Err(ContainerError::Bootstrap(out.exit_code).into());
        }
        Ok(())
    }

    /// Write `content` into the container's `/tmp` as an executable script.
    ///
    /// The host temp file is hard-linked into the rootfs, falling back to a
    /// copy when the two live on different filesystems.
    fn place_script(&self, name: &str, prefix: &str, content: &str) -> Result<PlacedScript, BackendError> {
        use std::io::Write;

        let file_name = format!("{prefix}-{}", uuid::Uuid::new_v4().simple());
        let guest_tmp = self.runtime.rootfs(name).join("tmp");
        std::fs::create_dir_all(&guest_tmp)?;
        let host = guest_tmp.join(&file_name);

        let mut staged = tempfile::Builder::new().prefix("tk-script-").tempfile()?;
        staged.write_all(content.as_bytes())?;
        staged.flush()?;
        if std::fs::hard_link(staged.path(), &host).is_err() {
            std::fs::copy(staged.path(), &host)?;
        }
        let placed = PlacedScript {
            host,
            guest: format!("/tmp/{file_name}"),
        };
        std::fs::set_permissions(&placed.host, std::fs::Permissions::from_mode(0o755))?;
        Ok(placed)
    }

    /// Graceful stop, verified by checking the container actually stopped.
    async fn stop_verified(&self, name: &str) -> Result<(), BackendError> {
        self.runtime.stop(name).await?;
        if self.runtime.is_running(name).await? {
            return Err(ContainerError::StillRunning(name.to_string()).into());
        }
        self.set_phase(Phase::Stopped);
        Ok(())
    }
}

#[async_trait]
impl<R: ContainerRuntime> ExecutionBackend for ContainerBackend<R> {
    fn name(&self) -> &'static str {
        "lxc"
    }

    async fn init(&self, job: Arc<JobConfig>) -> Result<(), BackendError> {
        // Snapshot builds name the container after the snapshot
        let name = job
            .output_snapshot()
            .map_or_else(|| job.id.to_string(), |s| s.to_string());
        let mut state = self.state.lock();
        state.name = Some(name);
        state.job = Some(job);
        Ok(())
    }

    async fn prepare(&self, log: &LogBuffer) -> Result<(), BackendError> {
        let (job, name) = {
            let state = self.state.lock();
            match (&state.job, &state.name) {
                (Some(job), Some(name)) => (Arc::clone(job), name.clone()),
                _ => return Err(BackendError::NotInitialized),
            }
        };

        self.define(&name, log).await?;
        self.set_phase(Phase::Created);

        let limits = job.resources.or(self.options.limits);
        self.runtime
            .append_config(&name, &isolation_config(limits, &self.options.bind_mounts))
            .await?;

        if let Some(hook) = &self.options.pre_launch {
            self.run_pre_launch(hook, &name, log).await?;
        }

        log.line(format_args!("[lxc] starting {name}"));
        self.runtime.start(&name).await?;
        self.set_phase(Phase::Running);
        self.wait_for_network(&name, log).await?;
        self.bootstrap(&name, log).await?;

        if let Some(hook) = &self.options.post_launch {
            self.run_post_launch(hook, &name, log).await?;
        }
        Ok(())
    }

    async fn run(&self, cmd: &CommandSpec, log: &LogBuffer) -> Result<CommandResult, BackendError> {
        let name = self.defined_name()?;
        let script = self.place_script(&name, "script", &with_shebang(&cmd.script))?;

        let mut env = cmd.env_pairs();
        env.push(("HOME".to_string(), self.options.home()));
        env.push(("USER".to_string(), self.options.user.clone()));
        let spec = AttachSpec {
            user: Some(self.options.user.clone()),
            env,
            argv: vec![
                "bash".to_string(),
                "-c".to_string(),
                ENTER_CWD.to_string(),
                self.options.guest_cwd(&cmd.cwd),
                script.guest.clone(),
            ],
            capture: cmd.capture_output,
        };

        let out = self.runtime.attach(&name, &spec, log).await?;
        Ok(CommandResult::new(out.exit_code, out.captured))
    }

    async fn capture_snapshot(&self, id: &SnapshotId, log: &LogBuffer) -> Result<(), BackendError> {
        let name = self.defined_name()?;
        log.line(format_args!("[lxc] stopping {name} to capture snapshot {id}"));
        self.stop_verified(&name).await?;

        let key = self.options.image_key(id);
        let files = self.cache.layout(&key, self.options.compression);
        let started = Instant::now();
        self.runtime.export(&name, &files).await?;
        tokio::fs::write(&files.origin, name.as_bytes()).await?;
        log.line(format_args!(
            "[lxc] exported snapshot {} in {}",
            key.relative_path(),
            format_duration(started.elapsed())
        ));

        if self.cache.publish(&key).await? {
            log.line(format_args!("[lxc] uploaded snapshot {}", key.relative_path()));
        }
        Ok(())
    }

    async fn shutdown(&self, log: &LogBuffer) -> Result<(), BackendError> {
        let (name, phase) = {
            let state = self.state.lock();
            (state.name.clone(), state.phase)
        };
        let Some(name) = name else {
            return Ok(());
        };
        if matches!(phase, Phase::Undefined | Phase::Destroyed) {
            return Ok(());
        }
        if self.options.keep {
            log.line(format_args!("[lxc] keeping container {name}"));
            return Ok(());
        }

        if self.runtime.exists(&name).await? {
            log.line(format_args!("[lxc] stopping {name}"));
            self.stop_verified(&name).await?;
            log.line(format_args!("[lxc] destroying {name}"));
            self.runtime.destroy(&name).await?;
        }
        self.set_phase(Phase::Destroyed);
        if let Some(slot) = &self.slot {
            slot.deregister();
        }
        Ok(())
    }

    async fn collect_artifacts(
        &self,
        patterns: &[String],
        _log: &LogBuffer,
    ) -> Result<Vec<PathBuf>, BackendError> {
        let name = self.defined_name()?;
        let home = self
            .runtime
            .rootfs(&name)
            .join(self.options.home().trim_start_matches('/'));
        Ok(crate::artifacts::find(&home, patterns)?)
    }
}

#[cfg(test)]
#[path = "../container_tests.rs"]
mod tests;
