// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Read-mostly store of declared repositories.
//!
//! Each cycle the scheduler reloads the manifest into a fresh immutable
//! snapshot. On reload failure the previous snapshot is retained so a
//! transiently broken manifest never empties the fleet mid-flight.

use parking_lot::RwLock;
use repoconv_config::manifest::{self, Manifest, ManifestDefaults};
use repoconv_config::ManifestError;
use repoconv_core::{Redactor, RepoDescriptor, RepoKey, ServerKey};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Immutable view of the manifest at one reload.
#[derive(Debug, Default)]
pub struct StoreSnapshot {
    /// Declaration order; the scheduler walks this in order.
    pub repos: Vec<RepoDescriptor>,
    pub server_caps: HashMap<ServerKey, usize>,
}

impl StoreSnapshot {
    pub fn get(&self, key: &RepoKey) -> Option<&RepoDescriptor> {
        self.repos.iter().find(|r| &r.repo_key == key)
    }

    pub fn len(&self) -> usize {
        self.repos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repos.is_empty()
    }
}

/// Atomically replaceable snapshot holder.
#[derive(Clone, Default)]
pub struct RepoStore {
    snapshot: Arc<RwLock<Arc<StoreSnapshot>>>,
}

impl RepoStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot; cheap to take, never blocks a reload for long.
    pub fn snapshot(&self) -> Arc<StoreSnapshot> {
        Arc::clone(&self.snapshot.read())
    }

    /// Replace the snapshot from a freshly parsed manifest.
    pub fn install(&self, manifest: Manifest) {
        let snapshot = StoreSnapshot {
            repos: manifest.repos,
            server_caps: manifest.server_caps,
        };
        info!(repos = snapshot.repos.len(), "repository store reloaded");
        *self.snapshot.write() = Arc::new(snapshot);
    }

    /// Reload from the manifest file.
    ///
    /// Startup calls this with `fatal` semantics by propagating the
    /// error; the scheduler calls [`RepoStore::reload_or_keep`] instead.
    pub fn reload(
        &self,
        path: &Path,
        defaults: ManifestDefaults,
        redactor: &Redactor,
    ) -> Result<(), ManifestError> {
        let manifest = manifest::load_manifest(path, defaults, redactor)?;
        self.install(manifest);
        Ok(())
    }

    /// Runtime reload: on failure keep the previous snapshot and warn.
    pub fn reload_or_keep(&self, path: &Path, defaults: ManifestDefaults, redactor: &Redactor) {
        if let Err(error) = self.reload(path, defaults, redactor) {
            warn!(%error, "manifest reload failed, keeping previous snapshot");
        }
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
