// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared table of tracked child processes.
//!
//! The process runner is the only writer for a given pid; the signal
//! manager, scheduler, and monitors read snapshots. Readers never hold a
//! lock for longer than one copy.

use parking_lot::{Mutex, RwLock};
use repoconv_core::{ProcessRecord, ProcessStatus, RepoKey};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

/// How many reaped records the terminal history keeps.
const FINISHED_HISTORY: usize = 128;

#[derive(Clone, Default)]
pub struct ProcessTable {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    running: RwLock<HashMap<u32, ProcessRecord>>,
    finished: Mutex<VecDeque<ProcessRecord>>,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a freshly spawned child.
    pub fn insert(&self, record: ProcessRecord) {
        self.inner.running.write().insert(record.pid, record);
    }

    /// Record one captured output line (already redacted and capped by
    /// the runner) and refresh the activity instant.
    pub fn append_output(&self, pid: u32, line: String, max_lines: usize) {
        if let Some(record) = self.inner.running.write().get_mut(&pid) {
            record.last_activity = Instant::now();
            record.output.push(line);
            if record.output.len() > max_lines {
                let excess = record.output.len() - max_lines;
                record.output.drain(..excess);
            }
        }
    }

    /// Move a reaped child to the terminal history with its final status.
    pub fn finish(&self, pid: u32, status: ProcessStatus) -> Option<ProcessRecord> {
        let mut record = self.inner.running.write().remove(&pid)?;
        record.status = status;
        let mut finished = self.inner.finished.lock();
        if finished.len() >= FINISHED_HISTORY {
            finished.pop_front();
        }
        finished.push_back(record.clone());
        Some(record)
    }

    /// Copy of every running record.
    pub fn snapshot(&self) -> Vec<ProcessRecord> {
        self.inner.running.read().values().cloned().collect()
    }

    /// Copy of the terminal history, oldest first.
    pub fn recent_finished(&self) -> Vec<ProcessRecord> {
        self.inner.finished.lock().iter().cloned().collect()
    }

    /// Pid of a running process owned by this repo, if any.
    pub fn running_for_repo(&self, repo_key: &RepoKey) -> Option<u32> {
        self.inner
            .running
            .read()
            .values()
            .find(|r| r.repo_key.as_ref() == Some(repo_key))
            .map(|r| r.pid)
    }

    /// Process-group ids of every running child; shutdown signal targets.
    pub fn tracked_pgids(&self) -> Vec<i32> {
        let mut pgids: Vec<i32> =
            self.inner.running.read().values().map(|r| r.pgid).collect();
        pgids.sort_unstable();
        pgids.dedup();
        pgids
    }

    /// Whether a pid is tracked as running.
    pub fn contains(&self, pid: u32) -> bool {
        self.inner.running.read().contains_key(&pid)
    }

    pub fn running_len(&self) -> usize {
        self.inner.running.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.running.read().is_empty()
    }
}

#[cfg(test)]
#[path = "table_tests.rs"]
mod tests;
