// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the adapters crate.

use std::time::Duration;

fn parse_duration_ms(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// Sleep between lock acquisition attempts (default: 3000ms).
pub fn lock_poll_interval() -> Duration {
    parse_duration_ms("TK_LOCK_POLL_MS").unwrap_or(Duration::from_secs(3))
}

/// Give up waiting for a busy lock after this long (default: 10 minutes).
pub fn lock_timeout() -> Duration {
    parse_duration_ms("TK_LOCK_TIMEOUT_MS").unwrap_or(Duration::from_secs(600))
}

/// How long a started container may take to get an address (default: 30000ms).
pub fn network_wait() -> Duration {
    parse_duration_ms("TK_NETWORK_WAIT_MS").unwrap_or(Duration::from_secs(30))
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
