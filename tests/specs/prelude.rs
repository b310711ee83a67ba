//! Test helpers for behavioral specifications.
//!
//! Provides a small DSL for running the tinker binary and checking its output.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]

use std::path::{Path, PathBuf};
use std::process::Output;

// Fast timings so runs finish quickly.
const TK_LOG_FLUSH_MS: &str = "20";
const TK_REPORT_RETRY_MS: &str = "10";
const TK_CONFIG_RETRY_MS: &str = "10";
const TK_HEARTBEAT_MS: &str = "50";

/// Returns the path to a binary, checking the llvm-cov target directory first.
fn binary_path(name: &str) -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));

    let llvm_cov_path = manifest_dir.join("target/llvm-cov-target/debug").join(name);
    if llvm_cov_path.exists() {
        return llvm_cov_path;
    }

    let standard = manifest_dir.join("target/debug").join(name);
    if standard.exists() {
        return standard;
    }

    // The test binary lives at target/debug/deps/specs-<hash>
    if let Ok(exe) = std::env::current_exe() {
        if let Some(debug_dir) = exe.parent().and_then(|d| d.parent()) {
            let fallback = debug_dir.join(name);
            if fallback.exists() {
                return fallback;
            }
        }
    }

    standard
}

/// Create a CLI builder for tinker commands
pub fn cli() -> CliBuilder {
    CliBuilder::new()
}

/// High-level CLI builder for fluent test assertions
pub struct CliBuilder {
    args: Vec<String>,
    dir: Option<PathBuf>,
    envs: Vec<(String, String)>,
}

impl CliBuilder {
    fn new() -> Self {
        Self {
            args: Vec::new(),
            dir: None,
            envs: vec![
                ("TK_LOG_FLUSH_MS".into(), TK_LOG_FLUSH_MS.into()),
                ("TK_REPORT_RETRY_MS".into(), TK_REPORT_RETRY_MS.into()),
                ("TK_CONFIG_RETRY_MS".into(), TK_CONFIG_RETRY_MS.into()),
                ("TK_HEARTBEAT_MS".into(), TK_HEARTBEAT_MS.into()),
            ],
        }
    }

    /// Add CLI arguments
    pub fn args(mut self, args: &[&str]) -> Self {
        self.args.extend(args.iter().map(|s| s.to_string()));
        self
    }

    /// Set working directory
    pub fn pwd(mut self, path: impl Into<PathBuf>) -> Self {
        self.dir = Some(path.into());
        self
    }

    /// Set environment variable
    pub fn env(mut self, key: &str, value: impl AsRef<Path>) -> Self {
        self.envs.push((
            key.to_string(),
            value.as_ref().to_string_lossy().to_string(),
        ));
        self
    }

    /// Build the command without running it
    pub fn command(self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::Command::new(binary_path("tinker"));
        cmd.args(&self.args);

        if let Some(dir) = self.dir {
            cmd.current_dir(dir);
        }

        // Keep the caller's configuration out of the run
        for key in [
            "TINKER_SERVER",
            "TINKER_JOBSTEP_ID",
            "TINKER_SNAPSHOT_IMAGE_ID",
            "TINKER_BACKEND",
            "TINKER_REPORTER",
            "TINKER_EXECUTOR",
            "TINKER_LOG_FILE",
        ] {
            cmd.env_remove(key);
        }

        for (key, value) in self.envs {
            cmd.env(key, value);
        }

        cmd
    }

    /// Run and expect success (exit code 0)
    pub fn passes(self) -> RunAssert {
        let output = self.command().assert().success().get_output().clone();
        RunAssert { output }
    }

    /// Run and expect exactly `code`
    pub fn exits(self, code: i32) -> RunAssert {
        let output = self.command().assert().code(code).get_output().clone();
        RunAssert { output }
    }

    /// Run and expect failure (non-zero exit code)
    pub fn fails(self) -> RunAssert {
        let output = self.command().assert().failure().get_output().clone();
        RunAssert { output }
    }
}

/// Result of a CLI run for chaining assertions
pub struct RunAssert {
    output: Output,
}

impl RunAssert {
    /// Get stdout as string
    pub fn stdout(&self) -> String {
        String::from_utf8_lossy(&self.output.stdout).into_owned()
    }

    /// Get stderr as string
    pub fn stderr(&self) -> String {
        String::from_utf8_lossy(&self.output.stderr).into_owned()
    }

    /// Assert stdout contains substring.
    pub fn stdout_has(self, expected: &str) -> Self {
        let stdout = self.stdout();
        assert!(
            stdout.contains(expected),
            "stdout does not contain '{}'\nstdout: {}",
            expected,
            stdout
        );
        self
    }

    /// Assert stdout does not contain substring.
    pub fn stdout_lacks(self, unexpected: &str) -> Self {
        let stdout = self.stdout();
        assert!(
            !stdout.contains(unexpected),
            "stdout should not contain '{}'\nstdout: {}",
            unexpected,
            stdout
        );
        self
    }

    /// Assert stderr contains substring.
    pub fn stderr_has(self, expected: &str) -> Self {
        let stderr = self.stderr();
        assert!(
            stderr.contains(expected),
            "stderr does not contain '{}'\nstderr: {}",
            expected,
            stderr
        );
        self
    }
}

// =============================================================================
// Jobs
// =============================================================================

/// Temporary directory holding a job description and a workspace.
pub struct Job {
    dir: tempfile::TempDir,
}

impl Job {
    /// A job whose commands are `(id, script)` pairs, run in order.
    pub fn with_commands(commands: &[(&str, &str)]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let commands: Vec<serde_json::Value> = commands
            .iter()
            .map(|(id, script)| serde_json::json!({ "id": id, "script": script }))
            .collect();
        let config = serde_json::json!({ "id": "js-spec", "commands": commands });
        std::fs::write(
            dir.path().join("job.json"),
            serde_json::to_vec_pretty(&config).unwrap(),
        )
        .unwrap();
        std::fs::create_dir_all(dir.path().join("ws")).unwrap();
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn config_file(&self) -> PathBuf {
        self.dir.path().join("job.json")
    }

    pub fn workspace(&self) -> PathBuf {
        self.dir.path().join("ws")
    }

    /// Builder for running this job on the host with the local reporter.
    pub fn run(&self) -> CliBuilder {
        let config = self.config_file();
        let workspace = self.workspace();
        cli().args(&[
            "run",
            "--config-file",
            &config.to_string_lossy(),
            "--workspace",
            &workspace.to_string_lossy(),
            "--reporter",
            "local",
        ])
    }
}
