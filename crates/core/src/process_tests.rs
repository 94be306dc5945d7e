// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn new_record_is_running() {
    let rec = ProcessRecord::new(42, 42, "git svn fetch".into(), None);
    assert!(rec.status.is_running());
    assert_eq!(rec.pid, 42);
    assert_eq!(rec.ppid, std::process::id());
    assert!(rec.output.is_empty());
}

#[test]
fn exit_code_only_for_normal_exits() {
    assert_eq!(ProcessStatus::Exited { code: 0 }.exit_code(), Some(0));
    assert_eq!(ProcessStatus::Exited { code: 128 }.exit_code(), Some(128));
    assert_eq!(ProcessStatus::Signalled { signal: 15 }.exit_code(), None);
    assert_eq!(ProcessStatus::Stalled.exit_code(), None);
    assert_eq!(ProcessStatus::Running.exit_code(), None);
}

#[test]
fn status_display_names() {
    assert_eq!(ProcessStatus::Running.to_string(), "running");
    assert_eq!(ProcessStatus::Exited { code: 1 }.to_string(), "exited");
    assert_eq!(ProcessStatus::Stalled.to_string(), "stalled");
    assert_eq!(ProcessStatus::TimedOut.to_string(), "timeout");
    assert_eq!(
        ProcessStatus::SpawnError { error: "ENOENT".into() }.to_string(),
        "spawn_error"
    );
}
