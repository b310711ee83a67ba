//! CLI help output specs

use crate::prelude::*;

#[test]
fn tinker_no_args_shows_usage_and_exits_zero() {
    cli().passes().stdout_has("Usage:");
}

#[test]
fn tinker_help_lists_subcommands() {
    cli()
        .args(&["--help"])
        .passes()
        .stdout_has("run")
        .stdout_has("cleanup");
}

#[test]
fn tinker_run_help_shows_flags() {
    cli()
        .args(&["run", "--help"])
        .passes()
        .stdout_has("--jobstep-id")
        .stdout_has("--backend")
        .stdout_has("--keep-container")
        .stdout_has("--bind-mount");
}
