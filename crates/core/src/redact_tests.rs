// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn unregistered_input_passes_through() {
    let r = Redactor::new();
    assert_eq!(r.redact("svn info https://example.com"), "svn info https://example.com");
}

#[test]
fn registered_secret_is_replaced_everywhere() {
    let r = Redactor::new();
    r.register("hunter2");
    let out = r.redact("--password hunter2 plus hunter2 again");
    assert_eq!(out, format!("--password {PLACEHOLDER} plus {PLACEHOLDER} again"));
    assert!(!out.contains("hunter2"));
}

#[test]
fn blank_secrets_are_ignored() {
    let r = Redactor::new();
    r.register("");
    r.register("   ");
    assert!(r.is_empty());
    assert_eq!(r.redact("anything"), "anything");
}

#[test]
fn registration_is_idempotent() {
    let r = Redactor::new();
    r.register("s3cret");
    r.register("s3cret");
    assert_eq!(r.len(), 1);
}

#[test]
fn longer_secrets_are_replaced_before_their_substrings() {
    let r = Redactor::new();
    r.register("pass");
    r.register("password123");
    let out = r.redact("url?token=password123");
    assert!(!out.contains("word123"), "fragment leaked: {out}");
}

#[test]
fn clones_share_the_secret_set() {
    let a = Redactor::new();
    let b = a.clone();
    a.register("shared");
    assert_eq!(b.redact("shared"), PLACEHOLDER);
}

#[test]
fn argv_redaction_joins_and_scrubs() {
    let r = Redactor::new();
    r.register("tops3cret");
    let argv = vec![
        "svn".to_string(),
        "info".to_string(),
        "--password".to_string(),
        "tops3cret".to_string(),
    ];
    assert_eq!(r.redact_argv(&argv), format!("svn info --password {PLACEHOLDER}"));
}
