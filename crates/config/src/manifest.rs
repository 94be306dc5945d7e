// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Loader for the repos-to-convert YAML manifest.
//!
//! The manifest has three levels: a `global` mapping of defaults, named
//! server groups (defaults for one code host), and per-repo entries under
//! each group's `repos` list. Attribute precedence is
//! repo > server > global > built-in default.
//!
//! File-level problems (missing file, YAML syntax) are errors; a broken
//! server group or repo entry is logged and skipped so one bad entry
//! cannot take the rest of the manifest down.

use repoconv_core::{Redactor, RepoDescriptor, RepoKey, ServerKey, SvnLayout, VcsType};
use serde_yaml::{Mapping, Value};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML syntax error in manifest: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("manifest root must be a mapping of server groups")]
    NotAMapping,
}

/// Built-in defaults that come from the environment rather than the file.
#[derive(Debug, Clone, Copy)]
pub struct ManifestDefaults {
    pub max_retries: u32,
}

/// Parsed manifest: descriptors in declaration order plus per-server
/// concurrency-cap overrides.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    pub repos: Vec<RepoDescriptor>,
    pub server_caps: HashMap<ServerKey, usize>,
}

/// Keys this loader understands at any level. Anything else is warned
/// about, never rejected.
const KNOWN_KEYS: &[&str] = &[
    "allow-inactivity-timeout",
    "authors-file-path",
    "authors-prog-path",
    "bare-clone",
    "branches",
    "code-host-name",
    "default-branch-only",
    "fetch-batch-size",
    "fetch-interval-seconds",
    "git-default-branch",
    "git-ignore-file-path",
    "git-org-name",
    "git-repo-name",
    "layout",
    "max-concurrent-conversions",
    "max-retries",
    "password",
    "repo-parent-url",
    "repos",
    "tags",
    "trunk",
    "type",
    "url",
    "username",
];

/// Load and parse the manifest file.
pub fn load_manifest(
    path: &Path,
    defaults: ManifestDefaults,
    redactor: &Redactor,
) -> Result<Manifest, ManifestError> {
    let text = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_manifest(&text, defaults, redactor)
}

/// Parse manifest text. Separated from [`load_manifest`] for tests.
pub fn parse_manifest(
    text: &str,
    defaults: ManifestDefaults,
    redactor: &Redactor,
) -> Result<Manifest, ManifestError> {
    let root: Value = serde_yaml::from_str(text)?;
    let root = root.as_mapping().ok_or(ManifestError::NotAMapping)?;

    let mut global = Mapping::new();
    let mut manifest = Manifest::default();
    let mut seen_keys: HashSet<RepoKey> = HashSet::new();

    // First pass picks up the global defaults regardless of where the
    // `global` key sits in the file.
    for (key, value) in root {
        let Some(name) = key.as_str() else { continue };
        if matches!(name.to_ascii_lowercase().as_str(), "global" | "globals") {
            if let Some(map) = value.as_mapping() {
                global = map.clone();
            } else {
                warn!("global section is not a mapping, ignoring");
            }
        }
    }

    for (key, value) in root {
        let Some(group_name) = key.as_str() else {
            warn!("skipping non-string top-level key in manifest");
            continue;
        };
        if matches!(group_name.to_ascii_lowercase().as_str(), "global" | "globals") {
            continue;
        }
        let Some(server_map) = value.as_mapping() else {
            error!(server_key = group_name, "server group is not a mapping, skipping");
            continue;
        };

        let server_key = ServerKey::new(group_name);
        load_server_group(
            &server_key,
            server_map,
            &global,
            defaults,
            redactor,
            &mut seen_keys,
            &mut manifest,
        );
    }

    Ok(manifest)
}

fn load_server_group(
    server_key: &ServerKey,
    server_map: &Mapping,
    global: &Mapping,
    defaults: ManifestDefaults,
    redactor: &Redactor,
    seen_keys: &mut HashSet<RepoKey>,
    manifest: &mut Manifest,
) {
    warn_unknown_keys(server_key.as_str(), server_map);

    if let Some(cap) = get_u64(server_map, "max-concurrent-conversions") {
        if cap > 0 {
            manifest.server_caps.insert(server_key.clone(), cap as usize);
        } else {
            warn!(server_key = %server_key, "max-concurrent-conversions must be positive, ignoring");
        }
    }

    let repos = match server_map.get(&key("repos")) {
        // A single repo may be declared as a bare string.
        Some(Value::String(name)) => vec![Value::String(name.clone())],
        Some(Value::Sequence(entries)) => entries.clone(),
        Some(_) => {
            error!(server_key = %server_key, "repos must be a list or a string, skipping server");
            return;
        }
        None => {
            error!(server_key = %server_key, "server group has no repos, skipping");
            return;
        }
    };

    // Server-level defaults: global overlaid with everything except the
    // repos list itself.
    let mut server_defaults = global.clone();
    for (k, v) in server_map {
        if k.as_str() == Some("repos") {
            continue;
        }
        server_defaults.insert(k.clone(), v.clone());
    }

    for entry in &repos {
        let (declared_name, overrides) = match entry {
            Value::String(name) => (name.clone(), Mapping::new()),
            Value::Mapping(map) if map.len() == 1 => {
                let (name, body) = map.iter().next().expect("len checked");
                let Some(name) = name.as_str() else {
                    error!(server_key = %server_key, "repo entry key is not a string, skipping");
                    continue;
                };
                let body = match body {
                    Value::Mapping(m) => m.clone(),
                    Value::Null => Mapping::new(),
                    _ => {
                        error!(server_key = %server_key, repo = name,
                               "repo overrides must be a mapping, skipping");
                        continue;
                    }
                };
                (name.to_string(), body)
            }
            _ => {
                error!(server_key = %server_key, "unrecognised repo entry shape, skipping");
                continue;
            }
        };

        let mut merged = server_defaults.clone();
        for (k, v) in &overrides {
            merged.insert(k.clone(), v.clone());
        }
        warn_unknown_keys(&declared_name, &overrides);

        match build_descriptor(server_key, &declared_name, &merged, defaults, redactor) {
            Some(repo) => {
                if !seen_keys.insert(repo.repo_key.clone()) {
                    error!(
                        repo_key = %repo.repo_key,
                        server_key = %server_key,
                        "duplicate repo_key in manifest, skipping later declaration"
                    );
                    continue;
                }
                manifest.repos.push(repo);
            }
            None => {
                debug!(server_key = %server_key, repo = declared_name, "repo entry not loaded");
            }
        }
    }
}

/// Resolve one merged mapping into a descriptor. Returns `None` (with the
/// specific problem already logged) when a required field is missing.
fn build_descriptor(
    server_key: &ServerKey,
    declared_name: &str,
    merged: &Mapping,
    defaults: ManifestDefaults,
    redactor: &Redactor,
) -> Option<RepoDescriptor> {
    let repo_name = get_str(merged, "git-repo-name").unwrap_or_else(|| declared_name.to_string());
    let repo_key = RepoKey::derive(&repo_name);

    let Some(type_raw) = get_str(merged, "type") else {
        error!(server_key = %server_key, repo = declared_name, "repo has no type, skipping");
        return None;
    };
    let Some(vcs) = VcsType::parse(&type_raw) else {
        error!(
            server_key = %server_key,
            repo = declared_name,
            vcs = type_raw,
            "unsupported repo type, skipping"
        );
        return None;
    };

    let url = match get_str(merged, "url") {
        Some(url) => trim_url(&url),
        None => match get_str(merged, "repo-parent-url") {
            Some(parent) => format!("{}/{}", trim_url(&parent), declared_name),
            None => {
                error!(
                    server_key = %server_key,
                    repo = declared_name,
                    "repo has neither url nor repo-parent-url, skipping"
                );
                return None;
            }
        },
    };

    let code_host_name = get_str(merged, "code-host-name")
        .or_else(|| url_host(&url))
        .unwrap_or_else(|| server_key.as_str().to_string());
    let git_org_name =
        get_str(merged, "git-org-name").unwrap_or_else(|| server_key.as_str().to_string());

    let password = get_str(merged, "password");
    if let Some(ref secret) = password {
        redactor.register(secret);
    }

    let layout = resolve_layout(merged, declared_name);

    let fetch_batch_size = match get_u64(merged, "fetch-batch-size") {
        Some(0) => {
            warn!(repo = declared_name, "fetch-batch-size must be positive, using 100");
            100
        }
        Some(n) => n as u32,
        None => 100,
    };

    Some(RepoDescriptor {
        repo_key,
        server_key: server_key.clone(),
        vcs,
        repo_root_url: url_root(&url),
        url,
        code_host_name,
        git_org_name,
        username: get_str(merged, "username"),
        password,
        layout,
        git_default_branch: get_str(merged, "git-default-branch")
            .unwrap_or_else(|| "trunk".to_string()),
        bare_clone: get_bool(merged, "bare-clone").unwrap_or(true),
        default_branch_only: get_bool(merged, "default-branch-only").unwrap_or(false),
        fetch_batch_size,
        authors_file: get_str(merged, "authors-file-path").map(PathBuf::from),
        authors_prog: get_str(merged, "authors-prog-path").map(PathBuf::from),
        git_ignore_file: get_str(merged, "git-ignore-file-path").map(PathBuf::from),
        max_retries: get_u64(merged, "max-retries")
            .map(|n| n as u32)
            .unwrap_or(defaults.max_retries),
        fetch_interval: get_u64(merged, "fetch-interval-seconds")
            .filter(|n| *n > 0)
            .map(Duration::from_secs),
        allow_inactivity_timeout: get_bool(merged, "allow-inactivity-timeout").unwrap_or(false),
    })
}

/// Exactly one of `layout: standard` or explicit trunk/branches/tags is
/// expected. When both appear the shorthand wins; when neither appears we
/// fall back to the standard layout.
fn resolve_layout(merged: &Mapping, repo: &str) -> SvnLayout {
    let shorthand = get_str(merged, "layout");
    let trunk = get_str(merged, "trunk");
    let branches = get_str_list(merged, "branches");
    let tags = get_str_list(merged, "tags");
    let has_explicit = trunk.is_some() || !branches.is_empty() || !tags.is_empty();

    if let Some(value) = shorthand {
        if !value.to_ascii_lowercase().contains("st") {
            warn!(
                repo,
                layout = value,
                "only standard is supported for the layout shorthand, continuing as standard"
            );
        }
        if has_explicit {
            warn!(repo, "both layout shorthand and explicit paths given, using the shorthand");
        }
        return SvnLayout::Standard;
    }

    if has_explicit {
        return SvnLayout::Explicit { trunk, branches, tags };
    }

    debug!(repo, "no layout declared, assuming standard");
    SvnLayout::Standard
}

fn warn_unknown_keys(context: &str, map: &Mapping) {
    for k in map.keys() {
        if let Some(name) = k.as_str() {
            if !KNOWN_KEYS.contains(&name) {
                warn!(context, key = name, "unknown manifest key, ignoring");
            }
        }
    }
}

fn key(name: &str) -> Value {
    Value::String(name.to_string())
}

fn get_str(map: &Mapping, name: &str) -> Option<String> {
    match map.get(&key(name))? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn get_bool(map: &Mapping, name: &str) -> Option<bool> {
    map.get(&key(name))?.as_bool()
}

fn get_u64(map: &Mapping, name: &str) -> Option<u64> {
    map.get(&key(name))?.as_u64()
}

/// A string value or a list of strings; order preserved.
fn get_str_list(map: &Mapping, name: &str) -> Vec<String> {
    match map.get(&key(name)) {
        Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
        Some(Value::Sequence(seq)) => seq
            .iter()
            .filter_map(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn trim_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// Hostname portion of a URL, when one can be found.
fn url_host(url: &str) -> Option<String> {
    let rest = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let host = rest.split(['/', '?']).next()?;
    let host = host.rsplit_once('@').map(|(_, h)| h).unwrap_or(host);
    let host = host.split(':').next()?;
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

/// `scheme://host` portion of a URL.
fn url_root(url: &str) -> String {
    match (url.split_once("://"), url_host(url)) {
        (Some((scheme, _)), Some(host)) => format!("{scheme}://{host}"),
        (None, Some(host)) => host,
        _ => url.to_string(),
    }
}

#[cfg(test)]
#[path = "manifest_tests.rs"]
mod tests;
