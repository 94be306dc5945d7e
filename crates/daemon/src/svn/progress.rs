// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reading conversion progress out of the tool-maintained on-disk state.
//!
//! `git svn` keeps revision-map files (fixed-width binary records of
//! big-endian SVN revision + raw commit OID) and a metadata file with
//! `branches-maxRev` / `tags-maxRev`. Both are authoritative for "how
//! far did we get"; this module only ever reads them.

use std::path::{Path, PathBuf};

/// SHA-1 revision-map record: 4-byte revision + 20-byte OID.
const REVMAP_RECORD_SHA1: usize = 24;
/// SHA-256 revision-map record: 4-byte revision + 32-byte OID.
const REVMAP_RECORD_SHA256: usize = 36;

/// Where the git internals live: `<repo>/.git` for a worktree clone,
/// the repo directory itself for a bare one.
pub fn git_internal_dir(repo_path: &Path) -> PathBuf {
    let dot_git = repo_path.join(".git");
    if dot_git.is_dir() {
        dot_git
    } else {
        repo_path.to_path_buf()
    }
}

/// Whether a git repo (bare or not) has been initialised at this path.
pub fn repo_initialized(repo_path: &Path) -> bool {
    repo_path.join(".git").is_dir() || repo_path.join("HEAD").is_file()
}

/// Last converted SVN revision, from the tails of every revision-map
/// file under the git dir. 0 when nothing has been converted yet.
pub fn last_converted_rev(repo_path: &Path) -> u64 {
    let svn_dir = git_internal_dir(repo_path).join("svn");
    let mut max_rev = 0;
    for revmap in find_revmaps(&svn_dir) {
        if let Ok(bytes) = std::fs::read(&revmap) {
            if let Some(rev) = revmap_last_rev(&bytes) {
                max_rev = max_rev.max(rev);
            }
        }
    }
    max_rev
}

/// Recursively collect `.rev_map.*` files under the svn state dir.
fn find_revmaps(svn_dir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut stack = vec![svn_dir.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else { continue };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(".rev_map."))
            {
                found.push(path);
            }
        }
    }
    found
}

/// Highest revision recorded in one revision-map, scanning backwards
/// past any all-zero padding records at the tail.
///
/// The record width depends on the repo's object format; files that are
/// a multiple of the SHA-1 width are read as SHA-1 (the `git svn`
/// default), otherwise as SHA-256.
pub fn revmap_last_rev(bytes: &[u8]) -> Option<u64> {
    let record = if bytes.len() % REVMAP_RECORD_SHA1 == 0 {
        REVMAP_RECORD_SHA1
    } else if bytes.len() % REVMAP_RECORD_SHA256 == 0 {
        REVMAP_RECORD_SHA256
    } else {
        return None;
    };

    let mut offset = bytes.len().checked_sub(record)?;
    loop {
        let entry = &bytes[offset..offset + record];
        if entry.iter().any(|b| *b != 0) {
            let rev = u32::from_be_bytes([entry[0], entry[1], entry[2], entry[3]]);
            // A padding record can have a revision with a zero OID.
            if entry[4..].iter().any(|b| *b != 0) {
                return Some(rev as u64);
            }
        }
        offset = offset.checked_sub(record)?;
    }
}

/// Branch/tag scan progress out of the tool's metadata file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SvnMetadata {
    pub branches_max_rev: Option<u64>,
    pub tags_max_rev: Option<u64>,
}

impl SvnMetadata {
    /// Whether branches and tags have been scanned at least to `rev`.
    /// `needs_branches` is false for trunk-only layouts, where the
    /// scan markers never appear.
    pub fn scanned_to(&self, rev: u64, needs_branches: bool) -> bool {
        if !needs_branches {
            return true;
        }
        self.branches_max_rev.unwrap_or(0) >= rev && self.tags_max_rev.unwrap_or(0) >= rev
    }
}

/// Read `svn/.metadata`. Missing file or fields yield `None` markers.
pub fn read_metadata(repo_path: &Path) -> SvnMetadata {
    let path = git_internal_dir(repo_path).join("svn").join(".metadata");
    let Ok(content) = std::fs::read_to_string(path) else {
        return SvnMetadata::default();
    };
    parse_metadata(&content)
}

fn parse_metadata(content: &str) -> SvnMetadata {
    let mut metadata = SvnMetadata::default();
    for line in content.lines() {
        let line = line.trim();
        if let Some(value) = key_value(line, "branches-maxRev") {
            metadata.branches_max_rev = value.parse().ok();
        } else if let Some(value) = key_value(line, "tags-maxRev") {
            metadata.tags_max_rev = value.parse().ok();
        }
    }
    metadata
}

fn key_value<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(key)?;
    let rest = rest.trim_start();
    let rest = rest.strip_prefix('=')?;
    Some(rest.trim())
}

#[cfg(test)]
#[path = "progress_tests.rs"]
mod tests;
