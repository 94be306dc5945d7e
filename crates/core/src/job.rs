// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Conversion-job state machine and outcome classification.

use crate::repo::{RepoKey, ServerKey};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// State of one in-flight conversion job.
///
/// ```text
///   New → Probing → (RetryWait → Probing)*
///        → UpToDate                          (terminal: success)
///        → Creating → Fetching
///        → Fetching → (RetryWait → Fetching)*
///                  → Maintaining → Done      (terminal: success)
///                  → DoneWithWarnings        (terminal: success, demoted)
///                  → PermanentFailure        (terminal: failure)
///                  → Corruption              (terminal: failure, alert)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    New,
    Probing,
    RetryWait,
    Creating,
    Fetching,
    Maintaining,
    UpToDate,
    Done,
    DoneWithWarnings,
    PermanentFailure,
    Corruption,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::UpToDate
                | JobState::Done
                | JobState::DoneWithWarnings
                | JobState::PermanentFailure
                | JobState::Corruption
        )
    }
}

crate::simple_display! {
    JobState {
        New => "new",
        Probing => "probing",
        RetryWait => "retry_wait",
        Creating => "creating",
        Fetching => "fetching",
        Maintaining => "maintaining",
        UpToDate => "up_to_date",
        Done => "done",
        DoneWithWarnings => "done_with_warnings",
        PermanentFailure => "permanent_failure",
        Corruption => "corruption",
    }
}

/// Terminal outcome of one conversion job, as reported to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    /// Remote tip equals local tip; nothing to do beyond the probe.
    NoWork,
    /// Fetch progressed and maintenance completed cleanly.
    Done,
    /// Fetch progressed but maintenance logged warnings (ref collisions,
    /// default-branch fallback).
    DoneWithWarnings,
    /// Another worker already owns this repo; exited without acquiring
    /// anything.
    AlreadyRunning,
    /// `svn info` never succeeded within the retry budget.
    ProbeFailed { reason: String },
    /// Fetch attempts exhausted the retry budget.
    PermanentFailure { reason: String },
    /// The local tip moved backwards; never retried.
    Corruption { before: u64, after: u64 },
    /// Local filesystem trouble (permissions, missing repo dir).
    LocalError { reason: String },
    /// Interrupted by supervisor shutdown.
    Shutdown,
}

impl JobOutcome {
    /// Whether the repo's `next_fetch_time` should advance.
    ///
    /// Failed jobs must not advance it, so the next cycle retries them
    /// instead of waiting out the fetch interval.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            JobOutcome::NoWork | JobOutcome::Done | JobOutcome::DoneWithWarnings
        )
    }
}

crate::simple_display! {
    JobOutcome {
        NoWork => "no_work",
        Done => "done",
        DoneWithWarnings => "done_with_warnings",
        AlreadyRunning => "already_running",
        ProbeFailed { .. } => "probe_failed",
        PermanentFailure { .. } => "permanent_failure",
        Corruption { .. } => "corruption",
        LocalError { .. } => "local_error",
        Shutdown => "shutdown",
    }
}

/// Classification of a single `git svn fetch` attempt.
///
/// The wrapped tool's exit code is untrusted; classification is by
/// observable progress plus output patterns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchClassification {
    /// Local tip advanced and the output shows committed revisions.
    Progressed { before: u64, after: u64, commits: usize },
    /// No progress, output carries a known transient error token.
    Transient { token: String },
    /// No progress, output carries an authentication error token.
    /// Retried without shrinking the log window.
    AuthFailed { token: String },
    /// Exit code 0, no progress, no recognisable error, output empty.
    Silent,
    /// The runner killed the child for output inactivity.
    Stalled,
    /// The runner killed the child on the wall clock.
    TimedOut,
    /// The local tip moved backwards.
    Corruption { before: u64, after: u64 },
}

impl FetchClassification {
    /// Whether a retry should halve the log window. Auth failures keep
    /// the window: a smaller batch will not fix credentials.
    pub fn halves_window(&self) -> bool {
        matches!(
            self,
            FetchClassification::Transient { .. }
                | FetchClassification::Silent
                | FetchClassification::Stalled
                | FetchClassification::TimedOut
        )
    }

    pub fn is_retriable(&self) -> bool {
        !matches!(
            self,
            FetchClassification::Progressed { .. } | FetchClassification::Corruption { .. }
        )
    }
}

crate::simple_display! {
    FetchClassification {
        Progressed { .. } => "progressed",
        Transient { .. } => "transient_failure",
        AuthFailed { .. } => "auth_failure",
        Silent => "silent_failure",
        Stalled => "stalled",
        TimedOut => "timeout",
        Corruption { .. } => "corruption",
    }
}

/// A single in-flight attempt to advance one repo.
///
/// Created when the scheduler elects a repo to run; dropped after the
/// worker subtree is reaped and the slot tokens returned (the tokens are
/// held by the scheduler's guard, not here, so this stays `Clone` for
/// monitor snapshots).
#[derive(Debug, Clone)]
pub struct ConversionJob {
    pub repo_key: RepoKey,
    pub server_key: ServerKey,
    /// Short correlation id linking all events of this job in the logs.
    pub correlation_id: String,
    pub spawned_at: Instant,
    pub state: JobState,
    pub retries: u32,
}

impl ConversionJob {
    pub fn new(repo_key: RepoKey, server_key: ServerKey, correlation_id: String) -> Self {
        Self {
            repo_key,
            server_key,
            correlation_id,
            spawned_at: Instant::now(),
            state: JobState::New,
            retries: 0,
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
