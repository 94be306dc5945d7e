// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Post-fetch git maintenance.
//!
//! `git svn` leaves everything it converts under `refs/remotes/`, where
//! the downstream Git server will not surface it. After a successful
//! fetch the remote refs are promoted to local branches and tags, HEAD
//! is pointed at the configured default branch, and the new tip is
//! recorded. All promotion work is local filesystem work.

use crate::context::Context;
use crate::runner::{self, RunRequest};
use crate::svn::progress::git_internal_dir;
use repoconv_core::RepoDescriptor;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const LOCAL_BRANCH_PREFIX: &str = "refs/heads/";
const LOCAL_TAG_PREFIX: &str = "refs/tags/";
const REMOTE_PREFIX: &str = "refs/remotes/";
const REMOTE_TAG_PREFIX: &str = "refs/remotes/origin/tags/";

/// Ref names containing these fragments are `git svn` artifacts, not
/// branches or tags anyone wants served.
const REF_EXCLUSIONS: &[&str] = &["@"];

/// What one promotion pass did.
#[derive(Debug, Clone, Default)]
pub struct MaintenanceReport {
    pub promoted_branches: usize,
    pub promoted_tags: usize,
    pub collisions: usize,
    pub head_fallback: bool,
    /// Local branch names in precedence order (trunk first).
    pub branch_names: Vec<String>,
}

impl MaintenanceReport {
    /// Warnings that demote the job outcome from `done` to
    /// `done_with_warnings`.
    pub fn warnings(&self) -> usize {
        self.collisions + usize::from(self.head_fallback)
    }
}

/// Promote `git svn`'s remote refs to local branches and tags.
///
/// Local heads and tags are rebuilt from the remote refs every pass, so
/// a branch deleted upstream disappears locally too. Name collisions
/// resolve by precedence (trunk, then branches, then tags) and each one
/// is logged rather than silently dropped.
pub fn promote_refs(
    repo_path: &Path,
    default_branch: &str,
) -> io::Result<MaintenanceReport> {
    let git_dir = git_internal_dir(repo_path);
    let mut report = MaintenanceReport::default();

    // Remote refs come from both the packed file and loose files; loose
    // entries are newer and win.
    let packed = read_packed_refs(&git_dir)?;
    let mut remote_refs: BTreeMap<String, String> = packed
        .entries
        .iter()
        .filter(|(_, path)| path.starts_with(REMOTE_PREFIX))
        .map(|(hash, path)| (path.clone(), hash.clone()))
        .collect();
    for (path, hash) in read_loose_refs(&git_dir.join("refs/remotes"), REMOTE_PREFIX)? {
        remote_refs.insert(path, hash);
    }

    // rank 0: trunk / the git-svn ref; rank 1: branches; rank 2: tags.
    let mut promotions: BTreeMap<String, (String, u8)> = BTreeMap::new();
    let mut promote = |local: String, hash: String, rank: u8, report: &mut MaintenanceReport| {
        match promotions.get(&local) {
            Some((_, existing_rank)) if *existing_rank <= rank => {
                report.collisions += 1;
                warn!(
                    r#ref = local,
                    "ref collision during promotion, keeping the higher-precedence source"
                );
            }
            Some(_) => {
                report.collisions += 1;
                warn!(r#ref = local, "ref collision during promotion, replacing lower precedence");
                promotions.insert(local, (hash, rank));
            }
            None => {
                promotions.insert(local, (hash, rank));
            }
        }
    };

    for (path, hash) in &remote_refs {
        if REF_EXCLUSIONS.iter().any(|x| path.contains(x)) {
            continue;
        }
        if path == "refs/remotes/git-svn" {
            // Unlayouted remote: the whole history becomes the default
            // branch.
            promote(
                format!("{LOCAL_BRANCH_PREFIX}{default_branch}"),
                hash.clone(),
                0,
                &mut report,
            );
        } else if let Some(name) = path.strip_prefix(REMOTE_TAG_PREFIX) {
            promote(format!("{LOCAL_TAG_PREFIX}{name}"), hash.clone(), 2, &mut report);
        } else if let Some(name) = path.strip_prefix("refs/remotes/origin/") {
            let rank = if name == "trunk" || name == default_branch { 0 } else { 1 };
            promote(format!("{LOCAL_BRANCH_PREFIX}{name}"), hash.clone(), rank, &mut report);
        } else {
            debug!(r#ref = path, "leaving unrecognised remote ref alone");
        }
    }

    // Rebuild local refs: drop every stale local entry, then write the
    // promoted set as loose refs.
    clear_local_refs(&git_dir)?;
    if packed.existed {
        write_packed_refs_without_locals(&git_dir, &packed)?;
    }
    for (local, (hash, _)) in &promotions {
        let ref_path = git_dir.join(local);
        if let Some(parent) = ref_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&ref_path, format!("{hash}\n"))?;
        if local.starts_with(LOCAL_BRANCH_PREFIX) {
            report.promoted_branches += 1;
        } else {
            report.promoted_tags += 1;
        }
    }

    let mut names: Vec<(u8, String)> = promotions
        .iter()
        .filter_map(|(local, (_, rank))| {
            local.strip_prefix(LOCAL_BRANCH_PREFIX).map(|n| (*rank, n.to_string()))
        })
        .collect();
    names.sort();
    report.branch_names = names.into_iter().map(|(_, n)| n).collect();

    info!(
        branches = report.promoted_branches,
        tags = report.promoted_tags,
        collisions = report.collisions,
        "promoted remote refs"
    );
    Ok(report)
}

/// Point HEAD at the default branch, falling back to the first promoted
/// branch when the default does not exist.
pub fn set_head(repo_path: &Path, default_branch: &str, report: &mut MaintenanceReport) {
    let git_dir = git_internal_dir(repo_path);
    let target = if report.branch_names.iter().any(|n| n == default_branch) {
        default_branch.to_string()
    } else if let Some(first) = report.branch_names.first() {
        warn!(
            wanted = default_branch,
            using = %first,
            "default branch missing, pointing HEAD at the first branch"
        );
        report.head_fallback = true;
        first.clone()
    } else {
        debug!(wanted = default_branch, "no branches promoted, leaving HEAD as declared");
        default_branch.to_string()
    };
    if let Err(error) = std::fs::write(git_dir.join("HEAD"), format!("ref: {LOCAL_BRANCH_PREFIX}{target}\n"))
    {
        warn!(%error, "failed to update HEAD");
        report.head_fallback = true;
    }
}

/// Drop exact duplicate lines from the repo's git config.
///
/// `git svn` appends duplicate entries which later break it with
/// "multiple values" errors; deduplication before each update fetch
/// keeps the file sane.
pub fn dedup_config(repo_path: &Path) -> io::Result<usize> {
    let config_path = git_internal_dir(repo_path).join("config");
    let content = std::fs::read_to_string(&config_path)?;
    let mut seen = std::collections::HashSet::new();
    let mut kept = Vec::new();
    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        if seen.insert(line.to_string()) {
            kept.push(line);
        }
    }
    let removed = content.lines().filter(|l| !l.trim().is_empty()).count() - kept.len();
    if removed > 0 {
        debug!(removed, "removed duplicate git config lines");
        std::fs::write(&config_path, kept.join("\n") + "\n")?;
    }
    Ok(removed)
}

/// Compacting garbage collection. Run on bootstrap by default; failures
/// are warnings, never job failures.
pub async fn garbage_collect(ctx: &Context, repo: &RepoDescriptor, repo_path: &Path) {
    let argv = git_argv(repo_path, &["gc"]);
    let result = runner::run(
        ctx,
        RunRequest::new(argv).repo_key(repo.repo_key.clone()).quiet(),
    )
    .await;
    if !result.succeeded {
        warn!(repo_key = %repo.repo_key, status = %result.status, "git gc failed");
    }
}

/// Record the newly reached revision in the repo config so operators can
/// read progress without decoding revision maps.
pub async fn record_tip(ctx: &Context, repo: &RepoDescriptor, repo_path: &Path, rev: u64) {
    let rev = rev.to_string();
    let argv =
        git_argv(repo_path, &["config", "--replace-all", "repoconv.last-converted-rev", &rev]);
    let result = runner::run(
        ctx,
        RunRequest::new(argv).repo_key(repo.repo_key.clone()).quiet(),
    )
    .await;
    if !result.succeeded {
        warn!(repo_key = %repo.repo_key, "failed to record converted revision");
    }
}

/// Settings applied on create and refreshed on update, so operators can
/// change them without restarting a conversion from scratch: authors
/// files and the ignore file.
pub async fn apply_repo_settings(ctx: &Context, repo: &RepoDescriptor, repo_path: &Path) {
    for (key, value) in [
        ("svn.authorsfile", &repo.authors_file),
        ("svn.authorsProg", &repo.authors_prog),
    ] {
        let Some(path) = value else { continue };
        if path.exists() {
            set_config(ctx, repo, repo_path, key, &path.to_string_lossy()).await;
        } else {
            warn!(
                repo_key = %repo.repo_key,
                key,
                path = %path.display(),
                "configured file does not exist, unsetting"
            );
            unset_config(ctx, repo, repo_path, key).await;
        }
    }

    if let Some(ignore) = &repo.git_ignore_file {
        if ignore.exists() {
            let file_name = ignore.file_name().unwrap_or_else(|| ".gitignore".as_ref());
            let target = repo_path.join(file_name);
            if let Err(error) = std::fs::copy(ignore, &target) {
                warn!(repo_key = %repo.repo_key, %error, "failed to copy ignore file");
            }
        } else {
            warn!(
                repo_key = %repo.repo_key,
                path = %ignore.display(),
                "ignore file does not exist, skipping copy"
            );
        }
    }
}

async fn set_config(ctx: &Context, repo: &RepoDescriptor, repo_path: &Path, key: &str, value: &str) {
    let argv = git_argv(repo_path, &["config", "--replace-all", key, value]);
    let result = runner::run(
        ctx,
        RunRequest::new(argv).repo_key(repo.repo_key.clone()).quiet(),
    )
    .await;
    if !result.succeeded {
        warn!(repo_key = %repo.repo_key, key, "failed to set repo config");
    }
}

async fn unset_config(ctx: &Context, repo: &RepoDescriptor, repo_path: &Path, key: &str) {
    let argv = git_argv(repo_path, &["config", "--unset", key]);
    // Unset fails when the key was never set; that is fine.
    let _ = runner::run(
        ctx,
        RunRequest::new(argv).repo_key(repo.repo_key.clone()).quiet(),
    )
    .await;
}

/// One-time global git configuration: trust every directory on the
/// shared storage (the serving process owns them with a different uid)
/// and pin the default branch name for fresh inits.
pub async fn git_global_setup(ctx: &Context) {
    for args in [
        ["config", "--global", "--replace-all", "safe.directory", "*"],
        ["config", "--global", "--replace-all", "init.defaultBranch", "main"],
    ] {
        let mut argv = vec!["git".to_string()];
        argv.extend(args.iter().map(|s| s.to_string()));
        let result = runner::run(ctx, RunRequest::new(argv).quiet()).await;
        if !result.succeeded {
            warn!(status = %result.status, "global git configuration failed");
        }
    }
}

/// `git -C <repo> <args...>` as an owned argv.
pub fn git_argv(repo_path: &Path, args: &[&str]) -> Vec<String> {
    let mut argv = vec![
        "git".to_string(),
        "-C".to_string(),
        repo_path.to_string_lossy().into_owned(),
    ];
    argv.extend(args.iter().map(|s| s.to_string()));
    argv
}

struct PackedRefs {
    existed: bool,
    header: Vec<String>,
    entries: Vec<(String, String)>,
}

fn read_packed_refs(git_dir: &Path) -> io::Result<PackedRefs> {
    let path = git_dir.join("packed-refs");
    if !path.exists() {
        return Ok(PackedRefs { existed: false, header: Vec::new(), entries: Vec::new() });
    }
    let content = std::fs::read_to_string(path)?;
    let mut header = Vec::new();
    let mut entries = Vec::new();
    for line in content.lines() {
        if line.starts_with('#') || line.starts_with('^') {
            header.push(line.to_string());
        } else if let Some((hash, ref_path)) = line.split_once(' ') {
            entries.push((hash.to_string(), ref_path.to_string()));
        }
    }
    Ok(PackedRefs { existed: true, header, entries })
}

/// Rewrite packed-refs keeping only remote entries, so stale packed
/// local branches and tags cannot shadow the rebuilt loose refs.
fn write_packed_refs_without_locals(git_dir: &Path, packed: &PackedRefs) -> io::Result<()> {
    let mut lines: Vec<String> = packed
        .header
        .iter()
        .filter(|l| l.starts_with('#'))
        .cloned()
        .collect();
    let mut remotes: Vec<&(String, String)> = packed
        .entries
        .iter()
        .filter(|(_, path)| path.starts_with(REMOTE_PREFIX))
        .collect();
    remotes.sort_by(|a, b| a.1.cmp(&b.1));
    for (hash, path) in remotes {
        lines.push(format!("{hash} {path}"));
    }
    std::fs::write(git_dir.join("packed-refs"), lines.join("\n") + "\n")
}

fn read_loose_refs(dir: &Path, prefix: &str) -> io::Result<Vec<(String, String)>> {
    let mut refs = Vec::new();
    if !dir.is_dir() {
        return Ok(refs);
    }
    let mut stack = vec![dir.to_path_buf()];
    let base = dir
        .parent()
        .and_then(|p| p.parent())
        .map(PathBuf::from)
        .unwrap_or_else(|| dir.to_path_buf());
    while let Some(current) = stack.pop() {
        for entry in std::fs::read_dir(&current)?.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if let Ok(content) = std::fs::read_to_string(&path) {
                let hash = content.trim().to_string();
                if hash.is_empty() {
                    continue;
                }
                if let Ok(relative) = path.strip_prefix(&base) {
                    let ref_name = relative.to_string_lossy().replace('\\', "/");
                    debug_assert!(ref_name.starts_with(prefix.trim_end_matches('/')));
                    refs.push((ref_name, hash));
                }
            }
        }
    }
    Ok(refs)
}

fn clear_local_refs(git_dir: &Path) -> io::Result<()> {
    for sub in ["refs/heads", "refs/tags"] {
        let dir = git_dir.join(sub);
        if !dir.is_dir() {
            continue;
        }
        let mut stack = vec![dir];
        while let Some(current) = stack.pop() {
            for entry in std::fs::read_dir(&current)?.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                } else {
                    std::fs::remove_file(path)?;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "maintenance_tests.rs"]
mod tests;
