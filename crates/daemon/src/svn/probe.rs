// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote probing via `svn info`.
//!
//! The probe doubles as the connectivity and credential check: it is the
//! one network call the up-to-date fast path is allowed to make.

use crate::context::Context;
use crate::runner::{self, RunRequest};
use repoconv_core::RepoDescriptor;
use std::time::Duration;
use tracing::warn;

/// Probes are short interactions; a probe that cannot answer within this
/// bound is treated as a failed attempt.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(300);

/// Parsed `svn info` answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SvnInfo {
    pub url: String,
    pub repository_root: String,
    pub repository_uuid: String,
    /// Repo-wide tip revision.
    pub revision: u64,
    /// Tip of the subtree in scope; the authoritative "remote tip".
    pub last_changed_rev: u64,
}

/// Probe failure, classified for the retry policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    Auth { detail: String },
    Transient { detail: String },
}

impl ProbeError {
    pub fn detail(&self) -> &str {
        match self {
            ProbeError::Auth { detail } | ProbeError::Transient { detail } => detail,
        }
    }
}

/// Error tokens that mean the credentials are wrong, not the network.
const AUTH_TOKENS: &[&str] = &[
    "Authentication failed",
    "authorization failed",
    "401 Unauthorized",
    "403 Forbidden",
    "E170001",
    "E215004",
];

/// Run `svn info` against the repo's URL.
pub async fn svn_info(ctx: &Context, repo: &RepoDescriptor) -> Result<SvnInfo, ProbeError> {
    let mut argv = vec!["svn".to_string(), "info".to_string(), "--non-interactive".to_string()];
    if let Some(username) = &repo.username {
        argv.push("--username".to_string());
        argv.push(username.clone());
    }
    if let Some(password) = &repo.password {
        argv.push("--password".to_string());
        argv.push(password.clone());
    }
    argv.push(repo.url.clone());

    let mut request = RunRequest::new(argv)
        .wall_timeout(PROBE_TIMEOUT)
        .repo_key(repo.repo_key.clone())
        .quiet();
    if let Some(password) = &repo.password {
        request = request.stdin_line(password.clone());
    }

    let result = runner::run(ctx, request).await;
    if result.succeeded {
        match parse_svn_info(&result.output) {
            Some(info) => Ok(info),
            None => {
                warn!(
                    repo_key = %repo.repo_key,
                    "svn info exited 0 but its output could not be parsed"
                );
                Err(ProbeError::Transient { detail: "unparseable svn info output".to_string() })
            }
        }
    } else {
        let detail = result
            .output
            .last()
            .cloned()
            .unwrap_or_else(|| result.status.to_string());
        if AUTH_TOKENS.iter().any(|token| result.output_contains(token)) {
            Err(ProbeError::Auth { detail })
        } else {
            Err(ProbeError::Transient { detail })
        }
    }
}

/// Parse the colon-separated fields out of `svn info` output.
pub fn parse_svn_info(lines: &[String]) -> Option<SvnInfo> {
    let field = |name: &str| -> Option<String> {
        let prefix = format!("{name}: ");
        lines
            .iter()
            .find_map(|line| line.strip_prefix(&prefix))
            .map(|rest| rest.trim().to_string())
    };

    Some(SvnInfo {
        url: field("URL")?,
        repository_root: field("Repository Root")?,
        repository_uuid: field("Repository UUID")?,
        revision: field("Revision")?.parse().ok()?,
        last_changed_rev: field("Last Changed Rev")?.parse().ok()?,
    })
}

#[cfg(test)]
#[path = "probe_tests.rs"]
mod tests;
