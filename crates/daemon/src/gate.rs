// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Global and per-server conversion slots.
//!
//! A job must hold one global and one per-server slot for its entire
//! lifetime. Acquisition is non-blocking: when either slot is exhausted
//! the attempt fails fast and the scheduler moves on. Acquisition order
//! is always global first, then server; [`SlotGuard`] releases in
//! reverse, which gives a total order across all gates.

use parking_lot::Mutex;
use repoconv_core::{RepoKey, ServerKey};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Counting-slot gate for conversion jobs.
pub struct ConversionGate {
    global: Arc<Semaphore>,
    global_cap: usize,
    default_server_cap: usize,
    servers: Mutex<HashMap<ServerKey, ServerGate>>,
    /// repo_keys currently holding a slot, per server; for the monitors.
    active: Arc<Mutex<HashMap<ServerKey, Vec<RepoKey>>>>,
}

struct ServerGate {
    semaphore: Arc<Semaphore>,
    cap: usize,
}

/// Point-in-time view of slot usage, for the concurrency monitor.
#[derive(Debug, Clone)]
pub struct GateStatus {
    pub global_in_use: usize,
    pub global_cap: usize,
    pub servers: Vec<ServerStatus>,
}

#[derive(Debug, Clone)]
pub struct ServerStatus {
    pub server_key: ServerKey,
    pub in_use: usize,
    pub cap: usize,
    pub active_repos: Vec<RepoKey>,
}

impl ConversionGate {
    pub fn new(global_cap: usize, default_server_cap: usize) -> Self {
        Self {
            global: Arc::new(Semaphore::new(global_cap)),
            global_cap,
            default_server_cap,
            servers: Mutex::new(HashMap::new()),
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Try to take both slots. Returns `None` without blocking when
    /// either is unavailable.
    pub fn try_acquire(
        &self,
        repo_key: &RepoKey,
        server_key: &ServerKey,
        server_cap_override: Option<usize>,
    ) -> Option<SlotGuard> {
        // Global first; the permit drops (and releases) if the server
        // slot is unavailable.
        let global_permit = Arc::clone(&self.global).try_acquire_owned().ok()?;

        let server_semaphore = self.server_semaphore(server_key, server_cap_override);
        let server_permit = server_semaphore.try_acquire_owned().ok()?;

        self.active
            .lock()
            .entry(server_key.clone())
            .or_default()
            .push(repo_key.clone());

        Some(SlotGuard {
            // Field order is drop order: server slot returns before the
            // global slot, the reverse of acquisition.
            _server_permit: server_permit,
            _global_permit: global_permit,
            active: Arc::clone(&self.active),
            server_key: server_key.clone(),
            repo_key: repo_key.clone(),
        })
    }

    /// Semaphore for one server, created on first use. The cap is fixed
    /// for the lifetime of the process; a changed manifest override only
    /// applies to servers that have not gated anything yet.
    fn server_semaphore(
        &self,
        server_key: &ServerKey,
        cap_override: Option<usize>,
    ) -> Arc<Semaphore> {
        let mut servers = self.servers.lock();
        let gate = servers.entry(server_key.clone()).or_insert_with(|| {
            let cap = cap_override.unwrap_or(self.default_server_cap);
            ServerGate { semaphore: Arc::new(Semaphore::new(cap)), cap }
        });
        Arc::clone(&gate.semaphore)
    }

    /// Current slot usage across the global gate and every known server.
    pub fn status(&self) -> GateStatus {
        let active = self.active.lock().clone();
        let servers = self.servers.lock();
        let mut server_statuses: Vec<ServerStatus> = servers
            .iter()
            .map(|(server_key, gate)| ServerStatus {
                server_key: server_key.clone(),
                in_use: gate.cap - gate.semaphore.available_permits(),
                cap: gate.cap,
                active_repos: active.get(server_key).cloned().unwrap_or_default(),
            })
            .collect();
        server_statuses.sort_by(|a, b| a.server_key.as_str().cmp(b.server_key.as_str()));

        GateStatus {
            global_in_use: self.global_cap - self.global.available_permits(),
            global_cap: self.global_cap,
            servers: server_statuses,
        }
    }

    pub fn global_available(&self) -> usize {
        self.global.available_permits()
    }
}

/// RAII token pair for one job's slots.
///
/// Dropping the guard — on normal completion, panic, or task abort —
/// returns the server slot, then the global slot, and removes the repo
/// from the active set.
pub struct SlotGuard {
    _server_permit: OwnedSemaphorePermit,
    _global_permit: OwnedSemaphorePermit,
    active: Arc<Mutex<HashMap<ServerKey, Vec<RepoKey>>>>,
    server_key: ServerKey,
    repo_key: RepoKey,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let mut active = self.active.lock();
        if let Some(repos) = active.get_mut(&self.server_key) {
            if let Some(pos) = repos.iter().position(|k| k == &self.repo_key) {
                repos.remove(pos);
            }
            if repos.is_empty() {
                active.remove(&self.server_key);
            }
        }
    }
}

#[cfg(test)]
#[path = "gate_tests.rs"]
mod tests;
