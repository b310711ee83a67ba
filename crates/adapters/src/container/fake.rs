// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake container runtime and object store for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::image::{ImageFiles, ObjectStore};
use super::runtime::{AttachSpec, ContainerRuntime, Template};
use super::ContainerError;
use crate::subprocess::Streamed;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tk_reporter::LogBuffer;

/// Recorded runtime call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    Create {
        name: String,
        template: Template,
    },
    CreateFromImage {
        name: String,
    },
    Clone {
        base: String,
        name: String,
    },
    AppendConfig {
        name: String,
        lines: Vec<String>,
    },
    Start {
        name: String,
    },
    Stop {
        name: String,
    },
    Kill {
        name: String,
    },
    Destroy {
        name: String,
    },
    Attach {
        name: String,
        spec: AttachSpec,
        /// Content of the script file named by the last argument, if any.
        script: Option<String>,
    },
    Export {
        name: String,
    },
}

#[derive(Debug, Default)]
struct FakeContainer {
    running: bool,
}

struct FakeRuntimeState {
    root: PathBuf,
    containers: HashMap<String, FakeContainer>,
    calls: Vec<RuntimeCall>,
    addresses: Vec<String>,
    attach_exit: i32,
    attach_output: Vec<u8>,
    failing: HashSet<&'static str>,
    midway: HashSet<&'static str>,
    hanging: HashSet<&'static str>,
    stop_refused: bool,
}

/// In-memory container runtime whose root filesystems live under a directory
#[derive(Clone)]
pub struct FakeRuntime {
    inner: Arc<Mutex<FakeRuntimeState>>,
}

impl FakeRuntime {
    /// Root filesystems are created under `root/{name}/rootfs`.
    pub fn new(root: &Path) -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeRuntimeState {
                root: root.to_path_buf(),
                containers: HashMap::new(),
                calls: Vec::new(),
                addresses: vec!["10.0.3.15".to_string()],
                attach_exit: 0,
                attach_output: Vec::new(),
                failing: HashSet::new(),
                midway: HashSet::new(),
                hanging: HashSet::new(),
                stop_refused: false,
            })),
        }
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.inner.lock().calls.clone()
    }

    /// Pretend a container already exists
    pub fn add_container(&self, name: &str, running: bool) {
        let mut inner = self.inner.lock();
        let _ = std::fs::create_dir_all(inner.root.join(name).join("rootfs"));
        inner
            .containers
            .insert(name.to_string(), FakeContainer { running });
    }

    pub fn container_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.lock().containers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Addresses reported once started (empty simulates no network)
    pub fn set_addresses(&self, addresses: Vec<String>) {
        self.inner.lock().addresses = addresses;
    }

    /// Exit code and output for every attach
    pub fn set_attach_result(&self, exit_code: i32, output: &[u8]) {
        let mut inner = self.inner.lock();
        inner.attach_exit = exit_code;
        inner.attach_output = output.to_vec();
    }

    /// Make an operation fail: "create", "clone", "start", "stop", "kill", "destroy", "export"
    pub fn fail(&self, op: &'static str) {
        self.inner.lock().failing.insert(op);
    }

    /// Make "create" or "clone" define the container and then fail
    pub fn fail_midway(&self, op: &'static str) {
        self.inner.lock().midway.insert(op);
    }

    /// Make "create" or "clone" define the container and then never return
    pub fn hang(&self, op: &'static str) {
        self.inner.lock().hanging.insert(op);
    }

    /// Containers keep running after a graceful stop
    pub fn refuse_stop(&self) {
        self.inner.lock().stop_refused = true;
    }

    fn check(&self, op: &'static str, name: &str) -> Result<(), ContainerError> {
        if self.inner.lock().failing.contains(op) {
            return Err(ContainerError::Runtime {
                op,
                name: name.to_string(),
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn define(&self, name: &str, call: RuntimeCall) -> Result<(), ContainerError> {
        let mut inner = self.inner.lock();
        inner.calls.push(call);
        if inner.containers.contains_key(name) {
            return Err(ContainerError::Runtime {
                op: "create",
                name: name.to_string(),
                message: "container already exists".to_string(),
            });
        }
        std::fs::create_dir_all(inner.root.join(name).join("rootfs"))?;
        inner
            .containers
            .insert(name.to_string(), FakeContainer::default());
        Ok(())
    }

    /// Outcome of a create-like operation whose container is already defined.
    async fn finish_define(&self, op: &'static str, name: &str) -> Result<(), ContainerError> {
        let (midway, hanging) = {
            let inner = self.inner.lock();
            (inner.midway.contains(op), inner.hanging.contains(op))
        };
        if hanging {
            std::future::pending::<()>().await;
        }
        if midway {
            return Err(ContainerError::Runtime {
                op,
                name: name.to_string(),
                message: "interrupted after defining".to_string(),
            });
        }
        Ok(())
    }

    fn missing(op: &'static str, name: &str) -> ContainerError {
        ContainerError::Runtime {
            op,
            name: name.to_string(),
            message: "no such container".to_string(),
        }
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn exists(&self, name: &str) -> Result<bool, ContainerError> {
        Ok(self.inner.lock().containers.contains_key(name))
    }

    async fn create(&self, name: &str, template: &Template) -> Result<(), ContainerError> {
        self.check("create", name)?;
        self.define(
            name,
            RuntimeCall::Create {
                name: name.to_string(),
                template: template.clone(),
            },
        )?;
        self.finish_define("create", name).await
    }

    async fn create_from_image(
        &self,
        name: &str,
        _image: &ImageFiles,
    ) -> Result<(), ContainerError> {
        self.check("create", name)?;
        self.define(
            name,
            RuntimeCall::CreateFromImage {
                name: name.to_string(),
            },
        )
    }

    async fn clone_snapshot(&self, base: &str, name: &str) -> Result<(), ContainerError> {
        self.check("clone", name)?;
        if !self.inner.lock().containers.contains_key(base) {
            return Err(Self::missing("clone", base));
        }
        self.define(
            name,
            RuntimeCall::Clone {
                base: base.to_string(),
                name: name.to_string(),
            },
        )?;
        self.finish_define("clone", name).await
    }

    async fn append_config(&self, name: &str, lines: &[String]) -> Result<(), ContainerError> {
        self.inner.lock().calls.push(RuntimeCall::AppendConfig {
            name: name.to_string(),
            lines: lines.to_vec(),
        });
        Ok(())
    }

    fn rootfs(&self, name: &str) -> PathBuf {
        self.inner.lock().root.join(name).join("rootfs")
    }

    async fn start(&self, name: &str) -> Result<(), ContainerError> {
        self.check("start", name)?;
        let mut inner = self.inner.lock();
        inner.calls.push(RuntimeCall::Start {
            name: name.to_string(),
        });
        match inner.containers.get_mut(name) {
            Some(c) => {
                c.running = true;
                Ok(())
            }
            None => Err(Self::missing("start", name)),
        }
    }

    async fn addresses(&self, name: &str) -> Result<Vec<String>, ContainerError> {
        let inner = self.inner.lock();
        match inner.containers.get(name) {
            Some(c) if c.running => Ok(inner.addresses.clone()),
            Some(_) => Ok(Vec::new()),
            None => Err(Self::missing("addresses", name)),
        }
    }

    async fn is_running(&self, name: &str) -> Result<bool, ContainerError> {
        match self.inner.lock().containers.get(name) {
            Some(c) => Ok(c.running),
            None => Err(Self::missing("is_running", name)),
        }
    }

    async fn stop(&self, name: &str) -> Result<(), ContainerError> {
        self.check("stop", name)?;
        let mut inner = self.inner.lock();
        inner.calls.push(RuntimeCall::Stop {
            name: name.to_string(),
        });
        let refused = inner.stop_refused;
        if let Some(c) = inner.containers.get_mut(name) {
            if !refused {
                c.running = false;
            }
        }
        Ok(())
    }

    async fn kill(&self, name: &str) -> Result<(), ContainerError> {
        self.check("kill", name)?;
        let mut inner = self.inner.lock();
        inner.calls.push(RuntimeCall::Kill {
            name: name.to_string(),
        });
        if let Some(c) = inner.containers.get_mut(name) {
            c.running = false;
        }
        Ok(())
    }

    async fn destroy(&self, name: &str) -> Result<(), ContainerError> {
        self.check("destroy", name)?;
        let mut inner = self.inner.lock();
        inner.calls.push(RuntimeCall::Destroy {
            name: name.to_string(),
        });
        let running = inner.containers.get(name).map(|c| c.running);
        match running {
            Some(true) => Err(ContainerError::Runtime {
                op: "destroy",
                name: name.to_string(),
                message: "container is running".to_string(),
            }),
            Some(false) => {
                inner.containers.remove(name);
                let _ = std::fs::remove_dir_all(inner.root.join(name));
                Ok(())
            }
            None => Err(Self::missing("destroy", name)),
        }
    }

    async fn attach(
        &self,
        name: &str,
        spec: &AttachSpec,
        log: &LogBuffer,
    ) -> Result<Streamed, ContainerError> {
        let rootfs = self.rootfs(name);
        let script = spec
            .argv
            .last()
            .filter(|a| a.starts_with("/tmp/"))
            .and_then(|a| std::fs::read_to_string(rootfs.join(a.trim_start_matches('/'))).ok());

        let (exit_code, output) = {
            let mut inner = self.inner.lock();
            inner.calls.push(RuntimeCall::Attach {
                name: name.to_string(),
                spec: spec.clone(),
                script,
            });
            (inner.attach_exit, inner.attach_output.clone())
        };
        log.write(&output)
            .map_err(|e| ContainerError::Io(std::io::Error::other(e.to_string())))?;
        Ok(Streamed {
            exit_code,
            captured: spec.capture.then_some(output),
        })
    }

    async fn export(&self, name: &str, image: &ImageFiles) -> Result<(), ContainerError> {
        self.check("export", name)?;
        self.inner.lock().calls.push(RuntimeCall::Export {
            name: name.to_string(),
        });
        std::fs::create_dir_all(&image.dir)?;
        std::fs::write(&image.rootfs, b"rootfs")?;
        std::fs::write(&image.meta, b"meta")?;
        Ok(())
    }
}

#[derive(Default)]
struct FakeStoreState {
    /// key -> (file name -> content)
    objects: HashMap<String, HashMap<String, Vec<u8>>>,
    downloads: Vec<String>,
    uploads: Vec<String>,
}

/// In-memory object store
#[derive(Clone, Default)]
pub struct FakeObjectStore {
    inner: Arc<Mutex<FakeStoreState>>,
}

impl FakeObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a remote file
    pub fn put(&self, key: &str, file: &str, content: &[u8]) {
        self.inner
            .lock()
            .objects
            .entry(key.to_string())
            .or_default()
            .insert(file.to_string(), content.to_vec());
    }

    pub fn downloads(&self) -> Vec<String> {
        self.inner.lock().downloads.clone()
    }

    pub fn uploads(&self) -> Vec<String> {
        self.inner.lock().uploads.clone()
    }

    /// File names stored under `key`
    pub fn files(&self, key: &str) -> Vec<String> {
        let mut files: Vec<String> = self
            .inner
            .lock()
            .objects
            .get(key)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        files.sort();
        files
    }
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    async fn download(&self, key: &str, dest: &Path) -> Result<(), ContainerError> {
        let files = {
            let mut inner = self.inner.lock();
            inner.downloads.push(key.to_string());
            inner.objects.get(key).cloned().unwrap_or_default()
        };
        std::fs::create_dir_all(dest)?;
        for (name, content) in files {
            std::fs::write(dest.join(name), content)?;
        }
        Ok(())
    }

    async fn upload(&self, src: &Path, key: &str) -> Result<(), ContainerError> {
        let mut files = HashMap::new();
        for entry in std::fs::read_dir(src)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                files.insert(
                    entry.file_name().to_string_lossy().into_owned(),
                    std::fs::read(entry.path())?,
                );
            }
        }
        let mut inner = self.inner.lock();
        inner.uploads.push(key.to_string());
        inner.objects.insert(key.to_string(), files);
        Ok(())
    }
}
