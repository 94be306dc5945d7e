// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recovery from lock files left behind by a killed tool.
//!
//! A `git svn` or `git gc` process that dies mid-operation leaves its
//! lock file on shared storage, and every later invocation fails with
//! "File exists" until someone removes it. After a failed invocation,
//! when no live process owns the repo, the well-known lock files are
//! cleared so the next attempt can proceed.

use crate::svn::progress::git_internal_dir;
use crate::table::ProcessTable;
use repoconv_core::RepoKey;
use std::path::Path;
use tracing::{error, warn};

/// Lock files the wrapped tools are known to leave behind, relative to
/// the git dir, with the operation that writes them.
const LOCK_FILES: &[(&str, &str)] = &[
    ("git gc", "gc.pid"),
    ("svn metadata update", "svn/.metadata.lock"),
    ("git svn fetch (git-svn)", "svn/refs/remotes/git-svn/index.lock"),
    ("git svn fetch (origin/trunk)", "svn/refs/remotes/origin/trunk/index.lock"),
];

/// Remove stale lock files for a repo nothing is currently working on.
///
/// Returns true when at least one lock file was removed, meaning the
/// preceding failure was probably the lock's fault and worth a retry.
pub fn clear_stale_lock_files(table: &ProcessTable, repo_key: &RepoKey, repo_path: &Path) -> bool {
    if let Some(pid) = table.running_for_repo(repo_key) {
        // A live process may legitimately hold these locks.
        warn!(repo_key = %repo_key, pid, "skipping lock cleanup while a process is running");
        return false;
    }

    let git_dir = git_internal_dir(repo_path);
    let mut cleared = false;
    for (operation, relative) in LOCK_FILES {
        let lock_path = git_dir.join(relative);
        if !lock_path.exists() {
            continue;
        }
        let content = std::fs::read_to_string(&lock_path).unwrap_or_default();
        match std::fs::remove_file(&lock_path) {
            Ok(()) => {
                warn!(
                    repo_key = %repo_key,
                    operation,
                    path = %lock_path.display(),
                    content = content.trim(),
                    "removed stale lock file left by a previous run"
                );
                cleared = true;
            }
            Err(err) => {
                error!(
                    repo_key = %repo_key,
                    path = %lock_path.display(),
                    error = %err,
                    "failed to remove stale lock file"
                );
            }
        }
    }
    cleared
}

#[cfg(test)]
#[path = "locks_tests.rs"]
mod tests;
