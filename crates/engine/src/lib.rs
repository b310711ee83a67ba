// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Build orchestration: runs a job's commands against a backend and
//! reports everything upstream.

mod cancel;
mod engine;
pub mod env;
mod error;
mod registry;

pub use cancel::{spawn_heartbeat_poller, spawn_signal_listener};
pub use engine::{Engine, EngineOptions};
pub use error::EngineError;
pub use registry::{BackendSettings, Registry, RegistryError, ReporterSettings};
