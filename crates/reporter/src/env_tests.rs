// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;

#[test]
#[serial]
fn defaults_apply_when_unset() {
    std::env::remove_var("TK_REPORT_ATTEMPTS");
    std::env::remove_var("TK_REPORT_BACKLOG");
    assert_eq!(report_attempts(), 8);
    assert_eq!(report_backlog(), 64);
}

#[test]
#[serial]
fn overrides_are_parsed() {
    std::env::set_var("TK_REPORT_ATTEMPTS", "3");
    std::env::set_var("TK_REPORT_RETRY_MS", "25");
    assert_eq!(report_attempts(), 3);
    assert_eq!(report_retry_delay(), Duration::from_millis(25));
    std::env::remove_var("TK_REPORT_ATTEMPTS");
    std::env::remove_var("TK_REPORT_RETRY_MS");
}

#[test]
#[serial]
fn zero_attempts_is_ignored() {
    std::env::set_var("TK_REPORT_ATTEMPTS", "0");
    assert_eq!(report_attempts(), 8);
    std::env::remove_var("TK_REPORT_ATTEMPTS");
}
