// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide context threaded explicitly into every component.

use crate::gate::ConversionGate;
use crate::store::RepoStore;
use crate::table::ProcessTable;
use parking_lot::Mutex;
use repoconv_config::EnvConfig;
use repoconv_core::{Redactor, RepoKey};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;

/// Shared state for the supervisor. One instance, created at startup,
/// passed as `Arc<Context>`; no component reaches for globals.
pub struct Context {
    pub env: EnvConfig,
    pub redactor: Redactor,
    pub store: RepoStore,
    pub gate: ConversionGate,
    pub table: ProcessTable,
    /// Main-loop cycle counter; carried on every log event.
    cycle: AtomicU64,
    /// Cooperative shutdown flag; observed at every sleep and acquire.
    pub shutdown: CancellationToken,
    /// repo_keys with a conversion job task in flight.
    running: Mutex<HashSet<RepoKey>>,
    /// Earliest epoch-seconds at which each repo may fetch again.
    /// Advanced only on successful outcomes.
    next_fetch: Mutex<HashMap<RepoKey, u64>>,
    /// Container identity carried on every structured event.
    pub hostname: String,
    /// Supervisor start instant, for uptime reporting.
    pub started_at: std::time::Instant,
}

impl Context {
    pub fn new(env: EnvConfig, redactor: Redactor) -> Self {
        let gate = ConversionGate::new(env.max_concurrent_global, env.max_concurrent_per_server);
        Self {
            env,
            redactor,
            store: RepoStore::new(),
            gate,
            table: ProcessTable::new(),
            cycle: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
            running: Mutex::new(HashSet::new()),
            next_fetch: Mutex::new(HashMap::new()),
            hostname: hostname(),
            started_at: std::time::Instant::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn cycle(&self) -> u64 {
        self.cycle.load(Ordering::Relaxed)
    }

    pub fn next_cycle(&self) -> u64 {
        self.cycle.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Claim a repo for a job task. Returns false when a job is already
    /// in flight for it.
    pub fn claim_repo(&self, repo_key: &RepoKey) -> bool {
        self.running.lock().insert(repo_key.clone())
    }

    pub fn release_repo(&self, repo_key: &RepoKey) {
        self.running.lock().remove(repo_key);
    }

    pub fn repo_is_running(&self, repo_key: &RepoKey) -> bool {
        self.running.lock().contains(repo_key)
    }

    pub fn running_jobs(&self) -> usize {
        self.running.lock().len()
    }

    /// Next allowed fetch time, if a fetch interval gated this repo.
    pub fn next_fetch_time(&self, repo_key: &RepoKey) -> Option<u64> {
        self.next_fetch.lock().get(repo_key).copied()
    }

    pub fn set_next_fetch_time(&self, repo_key: &RepoKey, epoch_secs: u64) {
        self.next_fetch.lock().insert(repo_key.clone(), epoch_secs);
    }
}

fn hostname() -> String {
    nix::unistd::gethostname()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
