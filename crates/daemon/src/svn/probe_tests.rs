// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn lines(text: &str) -> Vec<String> {
    text.lines().map(str::to_string).collect()
}

const FULL_INFO: &str = "\
Path: xmlbeans
URL: https://svn.apache.org/repos/asf/xmlbeans
Relative URL: ^/xmlbeans
Repository Root: https://svn.apache.org/repos/asf
Repository UUID: 13f79535-47bb-0310-9956-ffa450edef68
Revision: 1913907
Node Kind: directory
Last Changed Author: someone
Last Changed Rev: 1896750
Last Changed Date: 2021-12-01 10:00:00 +0000
";

#[test]
fn parses_full_svn_info_output() {
    let info = parse_svn_info(&lines(FULL_INFO)).unwrap();
    assert_eq!(info.url, "https://svn.apache.org/repos/asf/xmlbeans");
    assert_eq!(info.repository_root, "https://svn.apache.org/repos/asf");
    assert_eq!(info.repository_uuid, "13f79535-47bb-0310-9956-ffa450edef68");
    assert_eq!(info.revision, 1_913_907);
    assert_eq!(info.last_changed_rev, 1_896_750);
}

#[test]
fn missing_last_changed_rev_fails_parse() {
    let partial = "URL: https://x\nRepository Root: https://x\nRepository UUID: u\nRevision: 5\n";
    assert!(parse_svn_info(&lines(partial)).is_none());
}

#[test]
fn garbage_revision_fails_parse() {
    let bad = FULL_INFO.replace("Revision: 1913907", "Revision: unknown");
    assert!(parse_svn_info(&lines(&bad)).is_none());
}

#[test]
fn last_changed_rev_prefix_is_not_confused_with_date() {
    // "Last Changed Date" also starts with "Last Changed"; the field
    // match must be exact.
    let info = parse_svn_info(&lines(FULL_INFO)).unwrap();
    assert_eq!(info.last_changed_rev, 1_896_750);
}

#[test]
fn probe_error_detail_is_accessible() {
    let err = ProbeError::Transient { detail: "Connection refused".into() };
    assert_eq!(err.detail(), "Connection refused");
    let err = ProbeError::Auth { detail: "403 Forbidden".into() };
    assert_eq!(err.detail(), "403 Forbidden");
}
