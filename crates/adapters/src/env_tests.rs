// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;

#[test]
#[serial]
fn defaults_apply_when_unset() {
    std::env::remove_var("TK_LOCK_POLL_MS");
    std::env::remove_var("TK_LOCK_TIMEOUT_MS");
    std::env::remove_var("TK_NETWORK_WAIT_MS");
    assert_eq!(lock_poll_interval(), Duration::from_secs(3));
    assert_eq!(lock_timeout(), Duration::from_secs(600));
    assert_eq!(network_wait(), Duration::from_secs(30));
}

#[test]
#[serial]
fn overrides_are_parsed() {
    std::env::set_var("TK_LOCK_POLL_MS", "15");
    std::env::set_var("TK_NETWORK_WAIT_MS", "200");
    assert_eq!(lock_poll_interval(), Duration::from_millis(15));
    assert_eq!(network_wait(), Duration::from_millis(200));
    std::env::remove_var("TK_LOCK_POLL_MS");
    std::env::remove_var("TK_NETWORK_WAIT_MS");
}

#[test]
#[serial]
fn garbage_falls_back_to_the_default() {
    std::env::set_var("TK_LOCK_TIMEOUT_MS", "forever");
    assert_eq!(lock_timeout(), Duration::from_secs(600));
    std::env::remove_var("TK_LOCK_TIMEOUT_MS");
}
