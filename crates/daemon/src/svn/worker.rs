// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-repo conversion worker.
//!
//! One call to [`convert_repo`] is one conversion job: probe the remote,
//! initialise or update the local clone, fetch in batches, judge
//! progress from the on-disk state (the tool's exit code is untrusted),
//! and hand off to maintenance. Failures stay inside the job; the
//! scheduler only ever sees a [`JobOutcome`].

use crate::context::Context;
use crate::locks;
use crate::maintenance::{self, git_argv, MaintenanceReport};
use crate::runner::{self, RunRequest, RunResult};
use crate::svn::probe::{self, PROBE_TIMEOUT};
use crate::svn::progress;
use rand::Rng;
use regex::Regex;
use repoconv_core::{
    ConversionJob, FetchClassification, JobOutcome, JobState, ProcessStatus, RepoDescriptor,
    SvnLayout,
};
use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{error, info, warn};

/// Inactivity bound applied to the fetch when the repo opts in.
/// Conservative: killing `git svn` mid-branch-scan is not known to be
/// safe, so the default is off and the bound generous.
pub const FETCH_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(1800);

/// Backoff ceiling between attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Output tokens that mean the remote hiccuped and a retry is worth it.
const TRANSIENT_TOKENS: &[&str] = &[
    "Can't create session",
    "Unable to connect to a repository",
    "Error running context",
    "Connection refused",
    "Connection timed out",
    "Connection reset",
    "connection was closed",
    "429 Too Many Requests",
    "502 Bad Gateway",
    "503 Service Unavailable",
];

/// Tokens that mean the credentials are wrong; retried without touching
/// the log window, a smaller batch will not fix a password.
const AUTH_TOKENS: &[&str] = &[
    "Authentication failed",
    "authorization failed",
    "401 Unauthorized",
    "403 Forbidden",
    "E170001",
    "E215004",
];

/// One line per revision the tool commits, e.g. `r42 = <oid> (refs/...)`.
fn commit_line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\s*r\d+ = [0-9a-f]+").expect("static pattern"))
}

/// Run one conversion job for one repo. Never panics the supervisor;
/// every failure mode is a [`JobOutcome`].
pub async fn convert_repo(ctx: &Arc<Context>, repo: &RepoDescriptor) -> JobOutcome {
    let correlation_id: String = uuid::Uuid::new_v4().to_string()[..8].to_string();
    let mut job =
        ConversionJob::new(repo.repo_key.clone(), repo.server_key.clone(), correlation_id.clone());

    info!(
        repo_key = %repo.repo_key,
        server_key = %repo.server_key,
        correlation_id,
        cycle = ctx.cycle(),
        "conversion job started"
    );

    let outcome = drive(ctx, repo, &mut job).await;

    let level_is_failure = !outcome.is_success() && outcome != JobOutcome::Shutdown;
    if level_is_failure {
        warn!(
            repo_key = %repo.repo_key,
            server_key = %repo.server_key,
            correlation_id,
            cycle = ctx.cycle(),
            outcome = %outcome,
            state = %job.state,
            retries = job.retries,
            runtime_secs = job.spawned_at.elapsed().as_secs(),
            "conversion job finished"
        );
    } else {
        info!(
            repo_key = %repo.repo_key,
            server_key = %repo.server_key,
            correlation_id,
            cycle = ctx.cycle(),
            outcome = %outcome,
            state = %job.state,
            retries = job.retries,
            runtime_secs = job.spawned_at.elapsed().as_secs(),
            "conversion job finished"
        );
    }
    outcome
}

/// Phases A through I. Any retry re-runs from the probe: credentials
/// and URLs may have rotated between attempts.
async fn drive(ctx: &Arc<Context>, repo: &RepoDescriptor, job: &mut ConversionJob) -> JobOutcome {
    let repo_path = repo.local_path(&ctx.env.serve_root);
    let mut window = repo.fetch_batch_size.max(1);

    loop {
        if ctx.is_shutting_down() {
            return JobOutcome::Shutdown;
        }

        // Phase A — probe the remote.
        job.state = JobState::Probing;
        let remote = match probe::svn_info(ctx, repo).await {
            Ok(info) => info,
            Err(err) => {
                warn!(
                    repo_key = %repo.repo_key,
                    detail = err.detail(),
                    retries = job.retries,
                    "probe failed"
                );
                if job.retries >= repo.max_retries {
                    job.state = JobState::PermanentFailure;
                    return JobOutcome::ProbeFailed { reason: err.detail().to_string() };
                }
                job.retries += 1;
                job.state = JobState::RetryWait;
                if !backoff(ctx, job.retries).await {
                    return JobOutcome::Shutdown;
                }
                continue;
            }
        };

        // Phase B — local state.
        let creating = !progress::repo_initialized(&repo_path);
        if creating {
            job.state = JobState::Creating;
            info!(repo_key = %repo.repo_key, path = %repo_path.display(), "no local clone, initialising");
            if let Err(reason) = init_repo(ctx, repo, &repo_path).await {
                job.state = JobState::PermanentFailure;
                return JobOutcome::LocalError { reason };
            }
        }
        let before = progress::last_converted_rev(&repo_path);
        let metadata = progress::read_metadata(&repo_path);

        // Phase C — already-up-to-date fast path: one probe, one stat,
        // one metadata read, zero tool invocations.
        let needs_scan = repo.layout.has_branches_or_tags() && !repo.default_branch_only;
        if !creating && before == remote.last_changed_rev && metadata.scanned_to(before, needs_scan)
        {
            job.state = JobState::UpToDate;
            info!(repo_key = %repo.repo_key, rev = before, "up to date");
            return JobOutcome::NoWork;
        }

        // Phase D — belt-and-suspenders mutual exclusion beside the gate.
        if let Some(pid) = ctx.table.running_for_repo(&repo.repo_key) {
            error!(
                repo_key = %repo.repo_key,
                pid,
                "another process is already converting this repo"
            );
            return JobOutcome::AlreadyRunning;
        }

        // Refresh operator-adjustable settings so they apply without
        // restarting the clone from scratch.
        maintenance::apply_repo_settings(ctx, repo, &repo_path).await;
        if !creating {
            if let Err(error) = maintenance::dedup_config(&repo_path) {
                warn!(repo_key = %repo.repo_key, %error, "config deduplication failed");
            }
        }

        if ctx.is_shutting_down() {
            return JobOutcome::Shutdown;
        }

        // Phases E/F — fetch with the current log window.
        job.state = JobState::Fetching;
        // On a fresh clone the implicit base resolves to r0 and floods
        // the server with empty requests; seed it with the first real
        // revision when we can learn it.
        let seed = if creating { first_revision(ctx, repo).await } else { None };
        info!(
            repo_key = %repo.repo_key,
            window,
            before,
            remote_tip = remote.last_changed_rev,
            creating,
            "starting git svn fetch"
        );
        let result = fetch(ctx, repo, &repo_path, window, seed).await;

        // Phase G — success is observable progress, not the exit code.
        let after = progress::last_converted_rev(&repo_path);
        match classify(before, after, &result) {
            FetchClassification::Progressed { before, after, commits } => {
                info!(
                    repo_key = %repo.repo_key,
                    before,
                    after,
                    commits,
                    "fetch progressed"
                );
                // Phase H — maintenance.
                job.state = JobState::Maintaining;
                let warnings = run_maintenance(ctx, repo, &repo_path, creating, after).await;
                if warnings > 0 {
                    job.state = JobState::DoneWithWarnings;
                    return JobOutcome::DoneWithWarnings;
                }
                job.state = JobState::Done;
                return JobOutcome::Done;
            }
            FetchClassification::Corruption { before, after } => {
                job.state = JobState::Corruption;
                error!(
                    repo_key = %repo.repo_key,
                    before,
                    after,
                    "local tip moved backwards, refusing to retry"
                );
                return JobOutcome::Corruption { before, after };
            }
            failure => {
                warn!(
                    repo_key = %repo.repo_key,
                    classification = %failure,
                    window,
                    retries = job.retries,
                    "fetch attempt failed"
                );
                // A dead tool's leftover lock file fails every later
                // attempt; clearing it makes the retry meaningful.
                locks::clear_stale_lock_files(&ctx.table, &repo.repo_key, &repo_path);

                if job.retries >= repo.max_retries {
                    job.state = JobState::PermanentFailure;
                    return JobOutcome::PermanentFailure { reason: failure.to_string() };
                }
                job.retries += 1;
                if failure.halves_window() {
                    window = next_window(window);
                    info!(repo_key = %repo.repo_key, window, "halved log window for retry");
                }
                job.state = JobState::RetryWait;
                if !backoff(ctx, job.retries).await {
                    return JobOutcome::Shutdown;
                }
                // Phase I — the retry re-runs phases A through H.
            }
        }
    }
}

/// Classify one fetch attempt from observable progress plus output.
pub fn classify(before: u64, after: u64, result: &RunResult) -> FetchClassification {
    match &result.status {
        ProcessStatus::Stalled => return FetchClassification::Stalled,
        ProcessStatus::TimedOut => return FetchClassification::TimedOut,
        // The tool never ran; an infrastructure fault, not a silent
        // tool-contract violation.
        ProcessStatus::SpawnError { error } => {
            return FetchClassification::Transient { token: format!("spawn error: {error}") }
        }
        _ => {}
    }
    if after < before {
        return FetchClassification::Corruption { before, after };
    }
    if after > before && result.matched_lines > 0 {
        return FetchClassification::Progressed { before, after, commits: result.matched_lines };
    }
    if let Some(token) = find_token(result, AUTH_TOKENS) {
        return FetchClassification::AuthFailed { token };
    }
    if let Some(token) = find_token(result, TRANSIENT_TOKENS) {
        return FetchClassification::Transient { token };
    }
    if result.total_lines == 0 {
        return FetchClassification::Silent;
    }
    match result.exit_code() {
        // Ran, exited 0, no progress, nothing recognisable: the tool
        // contract violation case.
        Some(0) => FetchClassification::Silent,
        Some(code) => FetchClassification::Transient { token: format!("exit code {code}") },
        None => FetchClassification::Transient { token: result.status.to_string() },
    }
}

fn find_token(result: &RunResult, tokens: &[&str]) -> Option<String> {
    tokens.iter().find(|t| result.output_contains(t)).map(|t| t.to_string())
}

/// Halve the log window, floor 1.
pub fn next_window(window: u32) -> u32 {
    (window / 2).max(1)
}

/// Exponential backoff with jitter. Returns false when shutdown
/// interrupted the wait.
async fn backoff(ctx: &Context, attempt: u32) -> bool {
    let delay = backoff_delay(attempt);
    info!(delay_secs = delay.as_secs(), attempt, "waiting before retry");
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = ctx.shutdown.cancelled() => false,
    }
}

/// `min(2^attempt, 60)` seconds plus up to `attempt` seconds of jitter.
pub fn backoff_delay(attempt: u32) -> Duration {
    let base = Duration::from_secs(1 << attempt.min(6)).min(MAX_BACKOFF);
    let jitter_ms = rand::thread_rng().gen_range(0..=u64::from(attempt) * 1000);
    base + Duration::from_millis(jitter_ms)
}

/// `git svn init` plus the knobs that must be in place before the first
/// fetch.
async fn init_repo(ctx: &Arc<Context>, repo: &RepoDescriptor, repo_path: &Path) -> Result<(), String> {
    std::fs::create_dir_all(repo_path)
        .map_err(|e| format!("failed to create {}: {e}", repo_path.display()))?;

    let mut argv = git_argv(repo_path, &["svn", "init", "--prefix=origin/"]);
    push_layout_args(&mut argv, repo);
    if let Some(username) = &repo.username {
        argv.push("--username".to_string());
        argv.push(username.clone());
    }
    argv.push(repo.url.clone());

    let mut request = RunRequest::new(argv).repo_key(repo.repo_key.clone());
    if let Some(password) = &repo.password {
        request = request.stdin_line(password.clone());
    }
    let result = runner::run(ctx, request).await;
    if !result.succeeded {
        return Err(format!(
            "git svn init failed: {}",
            result.output.last().cloned().unwrap_or_else(|| result.status.to_string())
        ));
    }

    if repo.bare_clone {
        let result = runner::run(
            ctx,
            RunRequest::new(git_argv(repo_path, &["config", "core.bare", "true"]))
                .repo_key(repo.repo_key.clone())
                .quiet(),
        )
        .await;
        if !result.succeeded {
            return Err("failed to configure bare clone".to_string());
        }
    }
    Ok(())
}

fn push_layout_args(argv: &mut Vec<String>, repo: &RepoDescriptor) {
    match (&repo.layout, repo.default_branch_only) {
        (SvnLayout::Standard, false) => argv.push("--stdlayout".to_string()),
        (SvnLayout::Standard, true) => {
            argv.push("--trunk".to_string());
            argv.push("trunk".to_string());
        }
        (SvnLayout::Explicit { trunk, branches, tags }, default_only) => {
            if let Some(trunk) = trunk {
                argv.push("--trunk".to_string());
                argv.push(trunk.clone());
            }
            if !default_only {
                for branch in branches {
                    argv.push("--branches".to_string());
                    argv.push(branch.clone());
                }
                for tag in tags {
                    argv.push("--tags".to_string());
                    argv.push(tag.clone());
                }
            }
        }
    }
}

/// One `git svn fetch` attempt. No wall clock: legitimate fetches run
/// for hours. The inactivity bound applies only when the repo opted in.
async fn fetch(
    ctx: &Arc<Context>,
    repo: &RepoDescriptor,
    repo_path: &Path,
    window: u32,
    seed: Option<u64>,
) -> RunResult {
    let mut argv = git_argv(repo_path, &["svn", "fetch", "--log-window-size"]);
    argv.push(window.to_string());
    if let Some(base) = seed {
        argv.push("--revision".to_string());
        argv.push(format!("{base}:HEAD"));
    }
    if let Some(username) = &repo.username {
        argv.push("--username".to_string());
        argv.push(username.clone());
    }

    let mut request = RunRequest::new(argv)
        .repo_key(repo.repo_key.clone())
        .count_pattern(commit_line_pattern().clone());
    if repo.allow_inactivity_timeout {
        request = request.inactivity_timeout(FETCH_INACTIVITY_TIMEOUT);
    }
    if let Some(password) = &repo.password {
        request = request.stdin_line(password.clone());
    }
    runner::run(ctx, request).await
}

/// First real revision of the subtree, for seeding a fresh clone's
/// fetch. Best effort: `None` simply means an unseeded fetch.
async fn first_revision(ctx: &Arc<Context>, repo: &RepoDescriptor) -> Option<u64> {
    let mut argv = vec![
        "svn".to_string(),
        "log".to_string(),
        "--xml".to_string(),
        "--with-no-revprops".to_string(),
        "--non-interactive".to_string(),
        "--limit".to_string(),
        "1".to_string(),
        "--revision".to_string(),
        "1:HEAD".to_string(),
    ];
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
    if !result.succeeded {
        return None;
    }
    parse_first_revision(&result.output)
}

/// Pull the first `revision="N"` attribute out of `svn log --xml`.
pub fn parse_first_revision(lines: &[String]) -> Option<u64> {
    for line in lines {
        if let Some(rest) = line.split_once("revision=\"").map(|(_, rest)| rest) {
            if let Some(number) = rest.split('"').next() {
                if let Ok(rev) = number.parse() {
                    return Some(rev);
                }
            }
        }
    }
    None
}

/// Phase H: promotion, HEAD, optional gc, tip recording. Returns the
/// number of warnings that demote `done` to `done_with_warnings`.
async fn run_maintenance(
    ctx: &Arc<Context>,
    repo: &RepoDescriptor,
    repo_path: &Path,
    bootstrap: bool,
    new_tip: u64,
) -> usize {
    let mut extra_warnings = 0;
    let mut report = match maintenance::promote_refs(repo_path, &repo.git_default_branch) {
        Ok(report) => report,
        Err(error) => {
            warn!(repo_key = %repo.repo_key, %error, "ref promotion failed");
            extra_warnings += 1;
            MaintenanceReport::default()
        }
    };
    maintenance::set_head(repo_path, &repo.git_default_branch, &mut report);
    if bootstrap {
        maintenance::garbage_collect(ctx, repo, repo_path).await;
    }
    maintenance::record_tip(ctx, repo, repo_path, new_tip).await;
    extra_warnings + report.warnings()
}

/// Retry/window schedule for a given starting batch size, as the worker
/// would walk it on repeated stalls.
#[cfg(test)]
pub fn window_schedule(start: u32, steps: usize) -> Vec<u32> {
    let mut schedule = vec![start.max(1)];
    for _ in 0..steps {
        let next = next_window(*schedule.last().expect("non-empty"));
        schedule.push(next);
    }
    schedule
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
