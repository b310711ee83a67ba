// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Container runtime primitives

use super::image::ImageFiles;
use super::ContainerError;
use crate::subprocess::Streamed;
use async_trait::async_trait;
use std::path::PathBuf;
use tk_reporter::LogBuffer;

/// Distribution template for a fresh container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub dist: String,
    pub release: String,
    pub arch: String,
}

/// A program to run inside a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachSpec {
    /// Unprivileged user to run as; root when `None`.
    pub user: Option<String>,
    pub env: Vec<(String, String)>,
    pub argv: Vec<String>,
    pub capture: bool,
}

impl AttachSpec {
    /// Run `argv` as root with no extra environment.
    pub fn root(argv: &[&str]) -> Self {
        Self {
            user: None,
            env: Vec::new(),
            argv: argv.iter().map(|s| s.to_string()).collect(),
            capture: false,
        }
    }
}

/// Operations on named system containers.
///
/// Names are the only handle: implementations hold no per-container state,
/// so the same runtime can be shared by the backend and stale-state recovery.
#[async_trait]
pub trait ContainerRuntime: Clone + Send + Sync + 'static {
    async fn exists(&self, name: &str) -> Result<bool, ContainerError>;

    /// Create from a distribution template.
    async fn create(&self, name: &str, template: &Template) -> Result<(), ContainerError>;

    /// Create from cached snapshot image files.
    async fn create_from_image(&self, name: &str, image: &ImageFiles)
        -> Result<(), ContainerError>;

    /// Copy-on-write clone of `base` named `name`.
    async fn clone_snapshot(&self, base: &str, name: &str) -> Result<(), ContainerError>;

    async fn append_config(&self, name: &str, lines: &[String]) -> Result<(), ContainerError>;

    /// Host path through which files can be placed in the container's filesystem.
    fn rootfs(&self, name: &str) -> PathBuf;

    async fn start(&self, name: &str) -> Result<(), ContainerError>;

    /// Network addresses; empty until the container's network is up.
    async fn addresses(&self, name: &str) -> Result<Vec<String>, ContainerError>;

    async fn is_running(&self, name: &str) -> Result<bool, ContainerError>;

    /// Graceful stop.
    async fn stop(&self, name: &str) -> Result<(), ContainerError>;

    /// Immediate termination.
    async fn kill(&self, name: &str) -> Result<(), ContainerError>;

    async fn destroy(&self, name: &str) -> Result<(), ContainerError>;

    /// Run a program inside the container, streaming merged output into `log`.
    async fn attach(
        &self,
        name: &str,
        spec: &AttachSpec,
        log: &LogBuffer,
    ) -> Result<Streamed, ContainerError>;

    /// Write the stopped container's filesystem and metadata archives.
    async fn export(&self, name: &str, image: &ImageFiles) -> Result<(), ContainerError>;
}
