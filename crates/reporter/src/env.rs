// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the reporter crate.

use std::time::Duration;

fn parse_duration_ms(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

fn parse_usize(var: &str) -> Option<usize> {
    std::env::var(var).ok().and_then(|s| s.parse::<usize>().ok())
}

/// Delivery attempts per report payload (default: 8).
pub fn report_attempts() -> u32 {
    std::env::var("TK_REPORT_ATTEMPTS")
        .ok()
        .and_then(|s| s.parse::<u32>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(8)
}

/// Delay between delivery attempts (default: 5000ms).
pub fn report_retry_delay() -> Duration {
    parse_duration_ms("TK_REPORT_RETRY_MS").unwrap_or(Duration::from_secs(5))
}

/// Payloads queued before `push` starts blocking (default: 64).
pub fn report_backlog() -> usize {
    parse_usize("TK_REPORT_BACKLOG")
        .filter(|n| *n > 0)
        .unwrap_or(64)
}

/// Console log flush interval (default: 1000ms).
pub fn log_flush_interval() -> Duration {
    parse_duration_ms("TK_LOG_FLUSH_MS").unwrap_or(Duration::from_secs(1))
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
