// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the CLI.

use std::time::Duration;

fn parse_duration_ms(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// Attempts at fetching the job config before giving up.
pub const CONFIG_ATTEMPTS: u32 = 5;

/// Delay between job config fetch attempts (default: 3000ms).
pub fn config_retry_delay() -> Duration {
    parse_duration_ms("TK_CONFIG_RETRY_MS").unwrap_or(Duration::from_secs(3))
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
