//! Usage and infrastructure error specs

use crate::prelude::*;

#[test]
fn unknown_flag_is_a_usage_error() {
    cli().args(&["run", "--no-such-flag"]).exits(2);
}

#[test]
fn missing_job_source_is_a_usage_error() {
    cli()
        .args(&["run"])
        .exits(2)
        .stderr_has("--jobstep-id");
}

#[test]
fn unknown_backend_is_a_usage_error() {
    let job = Job::with_commands(&[("c1", "true")]);
    job.run()
        .args(&["--backend", "docker"])
        .exits(2)
        .stderr_has("unknown backend \"docker\"");
}

#[test]
fn unknown_reporter_is_a_usage_error() {
    let job = Job::with_commands(&[("c1", "true")]);
    job.run()
        .args(&["--reporter", "pager"])
        .exits(2)
        .stderr_has("unknown reporter \"pager\"");
}

#[test]
fn unreadable_config_is_an_infrastructure_error() {
    let job = Job::with_commands(&[("c1", "true")]);
    std::fs::remove_file(job.config_file()).unwrap();
    job.run()
        .exits(1)
        .stderr_has("cannot load job config");
}
