// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `tinker cleanup` - remove a container a crashed run left behind

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use tk_adapters::{ContainerRuntime, ExecutorSlot, LxcRuntime};

#[derive(Args, Debug)]
pub struct CleanupArgs {
    /// Executor slot to recover
    #[arg(long, env = "TINKER_EXECUTOR")]
    pub executor: String,

    #[arg(long, env = "TINKER_EXECUTOR_PATH", default_value = "/var/lib/tinker/executors")]
    pub executor_path: PathBuf,

    #[arg(long, env = "TINKER_LXC_PATH", default_value = "/var/lib/lxc")]
    pub lxc_path: PathBuf,
}

/// Recover `slot` and describe what happened.
pub async fn clean<R: ContainerRuntime>(slot: &ExecutorSlot, runtime: &R) -> String {
    match slot.clean_leftover_state(runtime).await {
        Some(container) => format!("Removed container {container} from slot {}", slot.name()),
        None => format!("Nothing to clean up in slot {}", slot.name()),
    }
}

pub async fn handle(args: CleanupArgs) -> Result<()> {
    let slot = ExecutorSlot::new(&args.executor_path, &args.executor);
    let runtime = LxcRuntime::new(&args.lxc_path);
    println!("{}", clean(&slot, &runtime).await);
    Ok(())
}

#[cfg(test)]
#[path = "cleanup_tests.rs"]
mod tests;
