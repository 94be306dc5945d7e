// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Repository identifiers and the fully-resolved repo descriptor.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Stable, filesystem- and URL-safe identifier for one logical repository.
///
/// Derived deterministically from the declared repo name so that edits to
/// the manifest never silently fork a repo into two on-disk directories.
/// Uniqueness across the whole manifest is enforced at load time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoKey(String);

impl RepoKey {
    /// Derive a key from a declared repo name, replacing every character
    /// that is unsafe in a path segment or URL with `-`.
    pub fn derive(name: &str) -> Self {
        let mut key: String = name
            .trim()
            .trim_matches('/')
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '-'
                }
            })
            .collect();
        // "." and ".." are valid under the character filter but not as
        // directory names.
        if key.is_empty() || key == "." || key == ".." {
            key = "unnamed".to_string();
        }
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RepoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Borrow<str> for RepoKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Named group under which one or more repos are declared in the manifest.
///
/// Also the identity used for per-server concurrency gating.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerKey(pub String);

impl ServerKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ServerKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Source version-control system of a declared repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VcsType {
    Svn,
    /// Reserved; declared repos of this type are skipped with a warning.
    Tfvc,
    /// Reserved; declared repos of this type are skipped with a warning.
    Git,
}

impl VcsType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "svn" | "subversion" => Some(VcsType::Svn),
            "tfvc" => Some(VcsType::Tfvc),
            "git" => Some(VcsType::Git),
            _ => None,
        }
    }
}

crate::simple_display! {
    VcsType {
        Svn => "svn",
        Tfvc => "tfvc",
        Git => "git",
    }
}

/// Mapping from the SVN directory layout to Git refs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SvnLayout {
    /// The conventional trunk/branches/tags layout.
    Standard,
    /// Explicitly declared paths. `trunk` is single; `branches` and `tags`
    /// are ordered (order matters for ref-collision precedence).
    Explicit {
        trunk: Option<String>,
        branches: Vec<String>,
        tags: Vec<String>,
    },
}

impl SvnLayout {
    /// Whether this layout declares any branch or tag paths at all.
    /// A trunk-only layout never needs branches/tags metadata scans.
    pub fn has_branches_or_tags(&self) -> bool {
        match self {
            SvnLayout::Standard => true,
            SvnLayout::Explicit { branches, tags, .. } => {
                !branches.is_empty() || !tags.is_empty()
            }
        }
    }
}

/// A fully-resolved description of one repository to convert.
///
/// Produced by the manifest loader after the three-level merge
/// (repo > server > global > built-in default); read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoDescriptor {
    pub repo_key: RepoKey,
    pub server_key: ServerKey,
    pub vcs: VcsType,
    /// Full URL of the repo code root on the remote server.
    pub url: String,
    /// Host identity used for the first path segment under the serve root.
    pub code_host_name: String,
    /// Org / collection segment under the code host.
    pub git_org_name: String,
    /// `scheme://host` portion of `url`; refined by the probe at runtime.
    pub repo_root_url: String,
    pub username: Option<String>,
    /// Registered with the redaction sink the moment it is read.
    pub password: Option<String>,
    pub layout: SvnLayout,
    pub git_default_branch: String,
    pub bare_clone: bool,
    pub default_branch_only: bool,
    /// Initial `--log-window-size` for `git svn fetch`.
    pub fetch_batch_size: u32,
    pub authors_file: Option<PathBuf>,
    pub authors_prog: Option<PathBuf>,
    pub git_ignore_file: Option<PathBuf>,
    pub max_retries: u32,
    /// Minimum interval between fetches; absent means every cycle.
    pub fetch_interval: Option<Duration>,
    /// Whether a wedged fetch may be killed on output inactivity.
    pub allow_inactivity_timeout: bool,
}

impl RepoDescriptor {
    /// On-disk directory for this repo under the serve root.
    pub fn local_path(&self, serve_root: &Path) -> PathBuf {
        serve_root
            .join(&self.code_host_name)
            .join(&self.git_org_name)
            .join(self.repo_key.as_str())
    }
}

#[cfg(test)]
#[path = "repo_tests.rs"]
mod tests;
