// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn terminal_states() {
    assert!(JobState::UpToDate.is_terminal());
    assert!(JobState::Done.is_terminal());
    assert!(JobState::DoneWithWarnings.is_terminal());
    assert!(JobState::PermanentFailure.is_terminal());
    assert!(JobState::Corruption.is_terminal());

    assert!(!JobState::New.is_terminal());
    assert!(!JobState::Probing.is_terminal());
    assert!(!JobState::RetryWait.is_terminal());
    assert!(!JobState::Creating.is_terminal());
    assert!(!JobState::Fetching.is_terminal());
    assert!(!JobState::Maintaining.is_terminal());
}

#[test]
fn state_display_is_snake_case() {
    assert_eq!(JobState::UpToDate.to_string(), "up_to_date");
    assert_eq!(JobState::DoneWithWarnings.to_string(), "done_with_warnings");
}

#[test]
fn only_successful_outcomes_advance_next_fetch_time() {
    assert!(JobOutcome::NoWork.is_success());
    assert!(JobOutcome::Done.is_success());
    assert!(JobOutcome::DoneWithWarnings.is_success());

    assert!(!JobOutcome::AlreadyRunning.is_success());
    assert!(!JobOutcome::Shutdown.is_success());
    assert!(!JobOutcome::ProbeFailed { reason: "dns".into() }.is_success());
    assert!(!JobOutcome::PermanentFailure { reason: "stall".into() }.is_success());
    assert!(!JobOutcome::Corruption { before: 10, after: 9 }.is_success());
    assert!(!JobOutcome::LocalError { reason: "enospc".into() }.is_success());
}

#[test]
fn auth_failures_keep_the_log_window() {
    let auth = FetchClassification::AuthFailed { token: "403 Forbidden".into() };
    assert!(!auth.halves_window());
    assert!(auth.is_retriable());
}

#[test]
fn stalls_and_timeouts_halve_the_log_window() {
    assert!(FetchClassification::Stalled.halves_window());
    assert!(FetchClassification::TimedOut.halves_window());
    assert!(FetchClassification::Silent.halves_window());
    assert!(FetchClassification::Transient { token: "Connection refused".into() }
        .halves_window());
}

#[test]
fn corruption_is_never_retried() {
    let c = FetchClassification::Corruption { before: 10, after: 8 };
    assert!(!c.is_retriable());
    assert!(!c.halves_window());
}

#[test]
fn progress_is_terminal_for_the_attempt_loop() {
    let p = FetchClassification::Progressed { before: 5, after: 10, commits: 5 };
    assert!(!p.is_retriable());
}

#[test]
fn new_job_starts_in_new_state() {
    let job = ConversionJob::new(
        RepoKey::derive("xmlbeans"),
        ServerKey::new("apache"),
        "abcd1234".into(),
    );
    assert_eq!(job.state, JobState::New);
    assert_eq!(job.retries, 0);
}
