// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `tinker run` - run one job step end to end

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tk_adapters::{BindMount, Compression, ContainerOptions, ExecutorSlot, TracedBackend};
use tk_core::{ResourceLimits, SnapshotId};
use tk_engine::{BackendSettings, Engine, Registry, RegistryError, ReporterSettings};
use tk_reporter::{HttpHeartbeat, LogBuffer};

use crate::config::{ConfigLoader, ConfigSource};
use crate::exit_error::ExitError;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Control server API base URL
    #[arg(long, env = "TINKER_SERVER", default_value = "http://localhost:5000/api/0")]
    pub server: String,

    /// Job step to fetch and run
    #[arg(
        long,
        env = "TINKER_JOBSTEP_ID",
        required_unless_present_any = ["snapshot_image_id", "config_file"]
    )]
    pub jobstep_id: Option<String>,

    /// Snapshot image build to fetch and run
    #[arg(long, env = "TINKER_SNAPSHOT_IMAGE_ID", conflicts_with = "jobstep_id")]
    pub snapshot_image_id: Option<String>,

    /// Read the job description from a JSON file instead of the server
    #[arg(long, conflicts_with_all = ["jobstep_id", "snapshot_image_id"])]
    pub config_file: Option<PathBuf>,

    /// Where commands run: basic (host) or lxc (container)
    #[arg(long, env = "TINKER_BACKEND", default_value = "basic")]
    pub backend: String,

    /// Where progress is reported (repeatable, or comma-separated)
    #[arg(
        long = "reporter",
        env = "TINKER_REPORTER",
        value_delimiter = ',',
        default_value = "http"
    )]
    pub reporters: Vec<String>,

    /// Build payloads without sending them
    #[arg(long)]
    pub debug: bool,

    /// Directory the local reporter copies artifacts into
    #[arg(long, env = "TINKER_ARTIFACTS_DIR")]
    pub artifacts_dir: Option<PathBuf>,

    /// Host directory for the basic backend (default: current directory)
    #[arg(long, env = "TINKER_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    #[arg(long, default_value = "ubuntu")]
    pub dist: String,

    #[arg(long, default_value = "trusty")]
    pub release: String,

    #[arg(long, default_value = "amd64")]
    pub arch: String,

    /// Snapshot image to start the container from
    #[arg(long)]
    pub base_snapshot: Option<String>,

    /// Unprivileged user commands run as inside the container
    #[arg(long, default_value = "ubuntu")]
    pub user: String,

    /// Leave the container in place after the run
    #[arg(long)]
    pub keep_container: bool,

    /// Host script run after the container is defined, before it starts
    #[arg(long)]
    pub pre_launch: Option<PathBuf>,

    /// Script run as root inside the container once it is up
    #[arg(long)]
    pub post_launch: Option<PathBuf>,

    /// Archive compression for captured snapshots (xz or lz4)
    #[arg(long, default_value_t)]
    pub compression: Compression,

    /// Host directory to mount into the container, as source:target[:options]
    #[arg(long = "bind-mount")]
    pub bind_mounts: Vec<BindMount>,

    /// CPU limit when the job does not request one
    #[arg(long)]
    pub cpus: Option<u32>,

    /// Memory limit in MiB when the job does not request one
    #[arg(long)]
    pub memory: Option<u64>,

    /// Bucket holding snapshot images
    #[arg(long, env = "TINKER_S3_BUCKET")]
    pub s3_bucket: Option<String>,

    #[arg(long, env = "TINKER_LXC_PATH", default_value = "/var/lib/lxc")]
    pub lxc_path: PathBuf,

    #[arg(long, env = "TINKER_IMAGE_CACHE", default_value = "/var/cache/tinker/images")]
    pub image_cache: PathBuf,

    /// Directory of lock files guarding shared base containers
    #[arg(long, env = "TINKER_LOCK_DIR")]
    pub lock_dir: Option<PathBuf>,

    /// Executor slot name, used to clean up after a crashed run
    #[arg(long, env = "TINKER_EXECUTOR")]
    pub executor: Option<String>,

    #[arg(long, env = "TINKER_EXECUTOR_PATH", default_value = "/var/lib/tinker/executors")]
    pub executor_path: PathBuf,
}

impl RunArgs {
    pub fn config_source(&self) -> Option<ConfigSource> {
        if let Some(path) = &self.config_file {
            return Some(ConfigSource::File(path.clone()));
        }
        if let Some(id) = &self.snapshot_image_id {
            return Some(ConfigSource::SnapshotImage(id.clone()));
        }
        self.jobstep_id.clone().map(ConfigSource::JobStep)
    }

    pub fn container_options(&self) -> ContainerOptions {
        let defaults = ContainerOptions::default();
        ContainerOptions {
            dist: self.dist.clone(),
            release: self.release.clone(),
            arch: self.arch.clone(),
            base_snapshot: self.base_snapshot.as_deref().map(SnapshotId::new),
            user: self.user.clone(),
            keep: self.keep_container,
            pre_launch: self.pre_launch.clone(),
            post_launch: self.post_launch.clone(),
            compression: self.compression,
            bind_mounts: self.bind_mounts.clone(),
            limits: ResourceLimits {
                cpus: self.cpus,
                memory_mb: self.memory,
            },
            lock_dir: self.lock_dir.clone().unwrap_or(defaults.lock_dir),
            network_wait: defaults.network_wait,
        }
    }

    /// Heartbeats go to the control server, so only when reporting there for real.
    pub fn polls_upstream(&self) -> bool {
        !self.debug && self.reporters.iter().any(|r| r == "http")
    }

    pub fn backend_settings(&self) -> Result<BackendSettings> {
        let workspace = match &self.workspace {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().context("cannot determine working directory")?,
        };
        Ok(BackendSettings {
            workspace,
            container: self.container_options(),
            lxc_path: self.lxc_path.clone(),
            image_cache: self.image_cache.clone(),
            s3_bucket: self.s3_bucket.clone(),
            slot: self
                .executor
                .as_ref()
                .map(|name| ExecutorSlot::new(&self.executor_path, name)),
        })
    }
}

/// Unknown adapter names are usage errors.
fn usage_or(err: RegistryError) -> anyhow::Error {
    match err {
        RegistryError::UnknownBackend { .. }
        | RegistryError::UnknownReporter { .. }
        | RegistryError::NoReporter => ExitError::usage(err.to_string()).into(),
        RegistryError::Report(e) => anyhow::Error::new(e).context("cannot start reporter"),
    }
}

/// Reject unknown reporter names before any network traffic.
fn check_reporters(registry: &Registry, names: &[String]) -> Result<()> {
    let known = registry.reporter_names();
    for name in names {
        if !known.contains(&name.as_str()) {
            return Err(usage_or(RegistryError::UnknownReporter {
                name: name.clone(),
                available: known.join(", "),
            }));
        }
    }
    Ok(())
}

fn hostname() -> String {
    nix::unistd::gethostname()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "cannot read hostname");
            "unknown".to_string()
        })
}

pub async fn handle(args: RunArgs) -> Result<()> {
    let registry = Registry::with_defaults();
    let backend = registry
        .backend(&args.backend, &args.backend_settings()?)
        .map_err(usage_or)?;
    check_reporters(&registry, &args.reporters)?;

    let source = args.config_source().ok_or_else(|| {
        ExitError::usage("one of --jobstep-id, --snapshot-image-id or --config-file is required")
    })?;
    let job = ConfigLoader::new()?
        .load(&source, &args.server)
        .await
        .context("cannot load job config")?;
    tracing::info!(
        job = %job.id,
        commands = job.commands.len(),
        backend = %args.backend,
        "loaded job"
    );

    let reporter = registry
        .reporter(
            &args.reporters,
            &ReporterSettings {
                server: args.server.clone(),
                job: job.id.clone(),
                node: hostname(),
                debug: args.debug,
                artifacts_dir: args.artifacts_dir.clone(),
            },
        )
        .map_err(usage_or)?;

    if let Some(container) = backend.clean_leftover_state().await {
        tracing::info!(%container, "removed container left by a previous run");
    }

    let heartbeat = if args.polls_upstream() {
        Some(HttpHeartbeat::new(&args.server, &job.id).context("cannot start heartbeat")?)
    } else {
        None
    };

    let log = LogBuffer::new("console").context("cannot create console log")?;
    let mut engine = Engine::new(job, TracedBackend::new(backend), reporter, log);
    if let Some(heartbeat) = heartbeat {
        engine = engine.with_heartbeat(Arc::new(heartbeat));
    }

    // Failed and aborted builds are reported upstream, not through the exit code
    let result = engine.run().await.context("build could not be reported")?;
    tracing::info!(result = result.as_str(), "run complete");
    Ok(())
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
