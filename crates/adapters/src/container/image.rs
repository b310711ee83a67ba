// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshot image cache.
//!
//! Images live under `{root}/{dist}/{release}/{arch}/{name}/` as a rootfs
//! archive, a metadata archive, and an `origin` file naming the container
//! the image was captured from. Remote storage mirrors the same layout.

use super::ContainerError;
use crate::subprocess::{check_output, IMAGE_TIMEOUT};
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tokio::process::Command;

/// Archive compression for snapshot images.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Compression {
    #[default]
    Xz,
    Lz4,
}

impl Compression {
    pub const ALL: [Compression; 2] = [Compression::Xz, Compression::Lz4];

    pub fn extension(&self) -> &'static str {
        match self {
            Compression::Xz => "xz",
            Compression::Lz4 => "lz4",
        }
    }

    /// Program passed to `tar --use-compress-program`.
    pub fn program(&self) -> &'static str {
        match self {
            Compression::Xz => "xz",
            Compression::Lz4 => "lz4",
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for Compression {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "xz" => Ok(Compression::Xz),
            "lz4" => Ok(Compression::Lz4),
            other => Err(format!("unknown compression '{other}' (expected xz or lz4)")),
        }
    }
}

/// Identity of an image in the cache layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageKey {
    pub dist: String,
    pub release: String,
    pub arch: String,
    pub name: String,
}

impl ImageKey {
    /// `{dist}/{release}/{arch}/{name}`
    pub fn relative_path(&self) -> String {
        format!("{}/{}/{}/{}", self.dist, self.release, self.arch, self.name)
    }
}

/// Files making up one cached image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFiles {
    pub dir: PathBuf,
    pub rootfs: PathBuf,
    pub meta: PathBuf,
    pub origin: PathBuf,
    pub compression: Compression,
}

impl ImageFiles {
    fn layout(dir: PathBuf, compression: Compression) -> Self {
        let ext = compression.extension();
        Self {
            rootfs: dir.join(format!("rootfs.tar.{ext}")),
            meta: dir.join(format!("meta.tar.{ext}")),
            origin: dir.join("origin"),
            dir,
            compression,
        }
    }

    fn is_complete(&self) -> bool {
        self.rootfs.is_file() && self.meta.is_file() && self.origin.is_file()
    }
}

/// Remote blob storage for image directories.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Copy everything under remote `key` into local `dest`.
    async fn download(&self, key: &str, dest: &Path) -> Result<(), ContainerError>;

    /// Copy everything in local `src` to remote `key`.
    async fn upload(&self, src: &Path, key: &str) -> Result<(), ContainerError>;
}

/// Object store backed by `aws s3 sync`.
#[derive(Debug, Clone)]
pub struct S3Sync {
    bucket: String,
}

impl S3Sync {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
        }
    }

    fn url(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key)
    }

    async fn sync(&self, from: &str, to: &str, op: &'static str) -> Result<(), ContainerError> {
        let mut cmd = Command::new("aws");
        cmd.args(["s3", "sync", "--quiet", from, to]);
        check_output(cmd, IMAGE_TIMEOUT, "aws s3 sync")
            .await
            .map(|_| ())
            .map_err(|message| ContainerError::Store { op, message })
    }
}

#[async_trait]
impl ObjectStore for S3Sync {
    async fn download(&self, key: &str, dest: &Path) -> Result<(), ContainerError> {
        tokio::fs::create_dir_all(dest).await?;
        self.sync(&self.url(key), &dest.to_string_lossy(), "download")
            .await
    }

    async fn upload(&self, src: &Path, key: &str) -> Result<(), ContainerError> {
        self.sync(&src.to_string_lossy(), &self.url(key), "upload")
            .await
    }
}

/// Local image cache, optionally backed by remote storage.
#[derive(Clone)]
pub struct ImageCache {
    root: PathBuf,
    store: Option<Arc<dyn ObjectStore>>,
}

impl ImageCache {
    pub fn new(root: impl Into<PathBuf>, store: Option<Arc<dyn ObjectStore>>) -> Self {
        Self {
            root: root.into(),
            store,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn has_remote(&self) -> bool {
        self.store.is_some()
    }

    fn dir(&self, key: &ImageKey) -> PathBuf {
        self.root.join(key.relative_path())
    }

    /// Where an image with `compression` would be written.
    pub fn layout(&self, key: &ImageKey, compression: Compression) -> ImageFiles {
        ImageFiles::layout(self.dir(key), compression)
    }

    /// The cached image, if all of its files are present.
    pub fn lookup(&self, key: &ImageKey) -> Option<ImageFiles> {
        Compression::ALL
            .into_iter()
            .map(|c| self.layout(key, c))
            .find(ImageFiles::is_complete)
    }

    /// The cached image, downloading it first if it is missing locally.
    pub async fn ensure(&self, key: &ImageKey) -> Result<ImageFiles, ContainerError> {
        if let Some(files) = self.lookup(key) {
            tracing::debug!(image = %key.relative_path(), "image cache hit");
            return Ok(files);
        }
        let Some(store) = &self.store else {
            return Err(ContainerError::ImageMissing(key.relative_path()));
        };

        tracing::info!(image = %key.relative_path(), "downloading image");
        store.download(&key.relative_path(), &self.dir(key)).await?;
        self.lookup(key)
            .ok_or_else(|| ContainerError::ImageMissing(key.relative_path()))
    }

    /// Upload a cached image. Returns false when there is no remote store.
    pub async fn publish(&self, key: &ImageKey) -> Result<bool, ContainerError> {
        let Some(store) = &self.store else {
            return Ok(false);
        };
        tracing::info!(image = %key.relative_path(), "uploading image");
        store.upload(&self.dir(key), &key.relative_path()).await?;
        Ok(true)
    }
}

#[cfg(test)]
#[path = "image_tests.rs"]
mod tests;
