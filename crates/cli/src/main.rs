// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! tinker - CI build agent

mod commands;
mod config;
mod env;
mod exit_error;
mod logging;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use commands::{cleanup, run};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "tinker",
    version,
    about = "tinker - runs CI job steps in isolated environments"
)]
struct Cli {
    /// Also write diagnostics to this file
    #[arg(long, env = "TINKER_LOG_FILE", global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a job step, run its commands, and report the outcome
    Run(Box<run::RunArgs>),
    /// Remove a container a crashed run left behind
    Cleanup(cleanup::CleanupArgs),
}

fn cli_command() -> clap::Command {
    Cli::command()
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        let code = e
            .downcast_ref::<exit_error::ExitError>()
            .map_or(1, |c| c.code);
        let msg = format_error(&e);
        if !msg.is_empty() {
            eprintln!("Error: {}", msg);
        }
        std::process::exit(code);
    }
}

/// Format an anyhow error, skipping causes the top-level message already
/// contains.
fn format_error(err: &anyhow::Error) -> String {
    let top = err.to_string();
    let chain_redundant = err
        .chain()
        .skip(1)
        .all(|cause| top.contains(&cause.to_string()));
    if chain_redundant {
        return top;
    }

    let mut buf = top;
    for (i, cause) in err.chain().skip(1).enumerate() {
        buf.push_str(&format!("\n\nCaused by:\n    {}: {}", i, cause));
    }
    buf
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        cli_command().print_help()?;
        println!();
        return Ok(());
    };

    let _log_guard = logging::setup(cli.log_file.as_deref())?;
    match command {
        Commands::Run(args) => run::handle(*args).await,
        Commands::Cleanup(args) => cleanup::handle(args).await,
    }
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
