// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! tk-core: data model shared by the tinker build agent crates

pub mod id;
pub mod job;
pub mod payload;
pub mod status;
pub mod time_fmt;

pub use id::{CommandId, JobStepId, SnapshotId};
pub use job::{
    CommandSpec, ConfigError, JobConfig, RepositoryInfo, ResourceLimits, SnapshotRef, SourceInfo,
};
pub use payload::ReportPayload;
pub use status::{BuildResult, BuildStatus, CommandResult, SnapshotStatus, FAILED_EXIT_CODE};
pub use time_fmt::{format_duration, format_elapsed};
