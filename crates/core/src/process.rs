// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Child-process records tracked by the supervisor.

use crate::repo::RepoKey;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Final or current status of a tracked child process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    Running,
    Exited { code: i32 },
    /// Reaped after dying to a signal not sent by us.
    Signalled { signal: i32 },
    /// Killed by the runner on the wall clock.
    TimedOut,
    /// Killed by the runner after producing no output for too long.
    Stalled,
    /// The OS refused to start the child.
    SpawnError { error: String },
}

impl ProcessStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, ProcessStatus::Running)
    }

    /// Exit code when the process exited normally.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ProcessStatus::Exited { code } => Some(*code),
            _ => None,
        }
    }
}

crate::simple_display! {
    ProcessStatus {
        Running => "running",
        Exited { .. } => "exited",
        Signalled { .. } => "signalled",
        TimedOut => "timeout",
        Stalled => "stalled",
        SpawnError { .. } => "spawn_error",
    }
}

/// One entry per tracked OS process.
///
/// Created on spawn, mutated only by the process runner, destroyed after
/// reap (moved to the terminal history). The argv is redacted before the
/// record is constructed; the raw argv never reaches a record or a log.
#[derive(Debug, Clone)]
pub struct ProcessRecord {
    pub pid: u32,
    pub ppid: u32,
    /// Process-group id of the child's session; signal target.
    pub pgid: i32,
    /// Redacted argv, joined for display.
    pub command: String,
    pub repo_key: Option<RepoKey>,
    pub started_at: Instant,
    pub status: ProcessStatus,
    /// Captured (merged, redacted) output lines, capped by the runner.
    pub output: Vec<String>,
    /// Instant of the most recent output byte; drives stall detection.
    pub last_activity: Instant,
}

impl ProcessRecord {
    pub fn new(pid: u32, pgid: i32, command: String, repo_key: Option<RepoKey>) -> Self {
        let now = Instant::now();
        Self {
            pid,
            ppid: std::process::id(),
            pgid,
            command,
            repo_key,
            started_at: now,
            status: ProcessStatus::Running,
            output: Vec::new(),
            last_activity: now,
        }
    }

    pub fn runtime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
