// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
// Enable coverage(off) attribute for excluding test infrastructure
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Adapters for the environments commands run in

pub mod artifacts;
pub mod backend;
pub mod container;
mod env;
pub mod lock;
pub mod recovery;
pub mod subprocess;

pub use backend::{AnyBackend, BackendError, ExecutionBackend, NullBackend, TracedBackend};
pub use container::{
    BindMount, Compression, ContainerBackend, ContainerError, ContainerOptions, ContainerRuntime,
    ImageCache, ImageKey, LxcRuntime, ObjectStore, S3Sync,
};
pub use lock::{FileLock, LockError, LockGuard};
pub use recovery::ExecutorSlot;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use backend::{BackendCall, FakeBackend};
#[cfg(any(test, feature = "test-support"))]
pub use container::{FakeObjectStore, FakeRuntime, RuntimeCall};
