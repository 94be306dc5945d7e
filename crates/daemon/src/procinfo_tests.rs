// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn parses_plain_stat_line() {
    let line = "1234 (svn) S 1 1234 1234 0 -1 4194304 100 0 0 0 7 3 0 0 20 0 1 0 12345 1000000 250 18446744073709551615";
    let parsed = parse_stat(line).unwrap();
    assert_eq!(parsed.state, 'S');
    assert_eq!(parsed.ppid, 1);
    assert_eq!(parsed.utime_ticks, 7);
    assert_eq!(parsed.stime_ticks, 3);
    assert_eq!(parsed.rss_pages, 250);
}

#[test]
fn comm_with_spaces_and_parens_is_handled() {
    let line = "42 (git svn (fetch)) Z 7 42 42 0 -1 4194304 0 0 0 0 1 2 0 0 20 0 1 0 99 0 0 0";
    let parsed = parse_stat(line).unwrap();
    assert_eq!(parsed.state, 'Z');
    assert_eq!(parsed.ppid, 7);
}

#[test]
fn short_stat_line_yields_none() {
    assert!(parse_stat("1 (x) R 0").is_none());
    assert!(parse_stat("").is_none());
}

#[test]
fn sampling_self_gives_a_live_record() {
    let sample = sample(std::process::id()).expect("own pid must be sampleable");
    assert!(matches!(sample.state, 'R' | 'S' | 'D'));
    assert!(sample.rss_bytes > 0);
    let fds = sample.open_fds.expect("own fd dir is readable");
    assert!(fds > 0);
    assert!(sample.sockets.unwrap_or(0) <= fds);
}

#[test]
fn sampling_a_dead_pid_yields_none() {
    // Pid near the default pid_max; extremely unlikely to exist.
    assert!(sample(4_194_000).is_none());
}

#[test]
fn no_zombie_children_for_a_fresh_test_process() {
    // The test harness has no unreaped children of its own.
    assert!(zombie_children(std::process::id()).is_empty());
}
