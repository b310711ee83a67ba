// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Named backends and reporters, selected at startup.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tk_adapters::{
    AnyBackend, ContainerBackend, ContainerOptions, ExecutorSlot, ImageCache, LxcRuntime,
    NullBackend, ObjectStore, S3Sync,
};
use tk_core::JobStepId;
use tk_reporter::{
    HttpReporter, LocalReporter, MultiReporter, NoOpReporter, ReportError, Reporter,
    TransportConfig,
};

/// Errors from registry lookups
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown backend {name:?} (available: {available})")]
    UnknownBackend { name: String, available: String },
    #[error("unknown reporter {name:?} (available: {available})")]
    UnknownReporter { name: String, available: String },
    #[error("no reporter selected")]
    NoReporter,
    #[error(transparent)]
    Report(#[from] ReportError),
}

/// Everything a backend factory may need.
#[derive(Debug, Clone)]
pub struct BackendSettings {
    /// Host directory the basic backend runs commands in.
    pub workspace: PathBuf,
    pub container: ContainerOptions,
    /// Where the container runtime keeps its containers.
    pub lxc_path: PathBuf,
    /// Local snapshot image cache.
    pub image_cache: PathBuf,
    /// Remote image storage.
    pub s3_bucket: Option<String>,
    pub slot: Option<ExecutorSlot>,
}

/// Everything a reporter factory may need.
#[derive(Debug, Clone)]
pub struct ReporterSettings {
    pub server: String,
    pub job: JobStepId,
    /// Host name attached to job status reports.
    pub node: String,
    /// Drop HTTP payloads instead of sending them.
    pub debug: bool,
    /// Where the local reporter copies artifacts.
    pub artifacts_dir: Option<PathBuf>,
}

type BackendFactory = Box<dyn Fn(&BackendSettings) -> AnyBackend + Send + Sync>;
type ReporterFactory =
    Box<dyn Fn(&ReporterSettings) -> Result<Arc<dyn Reporter>, ReportError> + Send + Sync>;

/// Backends and reporters by name.
pub struct Registry {
    backends: BTreeMap<String, BackendFactory>,
    reporters: BTreeMap<String, ReporterFactory>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            backends: BTreeMap::new(),
            reporters: BTreeMap::new(),
        }
    }

    /// Backends `basic` and `lxc`; reporters `http`, `local` and `noop`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_backend("basic", |s| NullBackend::new(&s.workspace).into());
        registry.register_backend("lxc", |s| container_backend(s).into());
        registry.register_reporter("http", |s| {
            let config = TransportConfig::new(&s.server).dry_run(s.debug);
            let reporter = HttpReporter::new(config, s.job.clone(), &s.node)?;
            Ok(Arc::new(reporter) as Arc<dyn Reporter>)
        });
        registry.register_reporter("local", |s| {
            Ok(Arc::new(LocalReporter::new(s.artifacts_dir.clone())) as Arc<dyn Reporter>)
        });
        registry.register_reporter("noop", |_| Ok(Arc::new(NoOpReporter::new()) as Arc<dyn Reporter>));
        registry
    }

    /// Add or replace a backend.
    pub fn register_backend<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&BackendSettings) -> AnyBackend + Send + Sync + 'static,
    {
        self.backends.insert(name.to_string(), Box::new(factory));
    }

    /// Add or replace a reporter.
    pub fn register_reporter<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&ReporterSettings) -> Result<Arc<dyn Reporter>, ReportError> + Send + Sync + 'static,
    {
        self.reporters.insert(name.to_string(), Box::new(factory));
    }

    pub fn backend_names(&self) -> Vec<&str> {
        self.backends.keys().map(String::as_str).collect()
    }

    pub fn reporter_names(&self) -> Vec<&str> {
        self.reporters.keys().map(String::as_str).collect()
    }

    /// Build the backend registered as `name`.
    pub fn backend(
        &self,
        name: &str,
        settings: &BackendSettings,
    ) -> Result<AnyBackend, RegistryError> {
        let factory = self
            .backends
            .get(name)
            .ok_or_else(|| RegistryError::UnknownBackend {
                name: name.to_string(),
                available: self.backend_names().join(", "),
            })?;
        Ok(factory(settings))
    }

    /// Build the reporters in `names`. Several names fan out through a
    /// [`MultiReporter`] in the order given.
    ///
    /// Every name is checked before any reporter is built.
    pub fn reporter(
        &self,
        names: &[String],
        settings: &ReporterSettings,
    ) -> Result<Arc<dyn Reporter>, RegistryError> {
        let factories = names
            .iter()
            .map(|name| {
                self.reporters
                    .get(name)
                    .ok_or_else(|| RegistryError::UnknownReporter {
                        name: name.clone(),
                        available: self.reporter_names().join(", "),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut reporters = factories
            .into_iter()
            .map(|factory| factory(settings))
            .collect::<Result<Vec<_>, _>>()?;
        match reporters.len() {
            0 => Err(RegistryError::NoReporter),
            1 => Ok(reporters.remove(0)),
            _ => Ok(Arc::new(MultiReporter::new(reporters))),
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn container_backend(settings: &BackendSettings) -> ContainerBackend<LxcRuntime> {
    let store = settings
        .s3_bucket
        .as_ref()
        .map(|bucket| Arc::new(S3Sync::new(bucket.clone())) as Arc<dyn ObjectStore>);
    let cache = ImageCache::new(&settings.image_cache, store);
    let mut backend = ContainerBackend::new(
        LxcRuntime::new(&settings.lxc_path),
        cache,
        settings.container.clone(),
    );
    if let Some(slot) = &settings.slot {
        backend = backend.with_slot(slot.clone());
    }
    backend
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
