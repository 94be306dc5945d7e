// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The main loop: periodic tick, eligibility, job dispatch.
//!
//! The loop never waits for jobs; workers run as their own tasks and
//! report through the process table and the job registry. Slot guards
//! and repo claims travel into the worker task so they release when the
//! job ends, however it ends.

use crate::context::Context;
use crate::gate::SlotGuard;
use crate::signals;
use crate::svn;
use repoconv_core::{Clock, RepoDescriptor, RepoKey, VcsType};
use repoconv_config::manifest::ManifestDefaults;
use std::sync::Arc;
use tracing::{debug, info};

/// Why a repo was skipped this tick; one concise debug line each.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Skip {
    ShuttingDown,
    /// fetch-interval not yet elapsed; carries the due time.
    NotDue { due_epoch_secs: u64 },
    JobAlreadyRunning,
    NoSlots,
    UnsupportedType,
}

repoconv_core::simple_display! {
    Skip {
        ShuttingDown => "shutting down",
        NotDue { .. } => "fetch interval not elapsed",
        JobAlreadyRunning => "job already running",
        NoSlots => "no conversion slots available",
        UnsupportedType => "unsupported repo type",
    }
}

/// Releases a repo's running-claim when the job task ends, panics
/// included.
struct RepoClaim {
    ctx: Arc<Context>,
    repo_key: RepoKey,
}

impl Drop for RepoClaim {
    fn drop(&mut self) {
        self.ctx.release_repo(&self.repo_key);
    }
}

pub struct Scheduler<C: Clock> {
    ctx: Arc<Context>,
    clock: C,
}

impl<C: Clock> Scheduler<C> {
    pub fn new(ctx: Arc<Context>, clock: C) -> Self {
        Self { ctx, clock }
    }

    /// Run ticks until shutdown or `MAX_CYCLES`. Returns the number of
    /// completed cycles.
    pub async fn run(&self) -> u64 {
        let defaults = ManifestDefaults { max_retries: self.ctx.env.max_retries };
        loop {
            if self.ctx.is_shutting_down() {
                break;
            }
            let cycle = self.ctx.next_cycle();
            info!(cycle, uptime_secs = self.ctx.uptime_secs(), "starting cycle");

            // Pick up manifest edits made while we slept; tidy any
            // orphans from the previous cycle.
            self.ctx.store.reload_or_keep(
                &self.ctx.env.repos_to_convert,
                defaults,
                &self.ctx.redactor,
            );
            signals::reap_orphans(&self.ctx.table);

            let snapshot = self.ctx.store.snapshot();
            let mut spawned = 0usize;
            let mut skipped = 0usize;
            for repo in &snapshot.repos {
                if self.ctx.is_shutting_down() {
                    break;
                }
                let server_cap = snapshot.server_caps.get(&repo.server_key).copied();
                match self.dispatch(repo, server_cap) {
                    Ok(()) => spawned += 1,
                    Err(skip) => {
                        skipped += 1;
                        debug!(
                            cycle,
                            repo_key = %repo.repo_key,
                            server_key = %repo.server_key,
                            reason = %skip,
                            "skipping repo this cycle"
                        );
                    }
                }
            }
            info!(
                cycle,
                repos = snapshot.repos.len(),
                spawned,
                skipped,
                running = self.ctx.running_jobs(),
                "finished cycle dispatch"
            );

            if self.ctx.env.max_cycles > 0 && cycle >= self.ctx.env.max_cycles {
                info!(cycle, max_cycles = self.ctx.env.max_cycles, "reached MAX_CYCLES, exiting loop");
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.ctx.env.interval) => {}
                _ = self.ctx.shutdown.cancelled() => {}
            }
        }
        self.ctx.cycle()
    }

    /// Eligibility checks in order; on success the job task owns the
    /// slot guard and the repo claim.
    fn dispatch(&self, repo: &RepoDescriptor, server_cap: Option<usize>) -> Result<(), Skip> {
        self.check_eligibility(repo)?;

        // Claim before gating so two dispatches can never race one repo.
        if !self.ctx.claim_repo(&repo.repo_key) {
            return Err(Skip::JobAlreadyRunning);
        }
        let claim = RepoClaim { ctx: Arc::clone(&self.ctx), repo_key: repo.repo_key.clone() };

        let Some(slots) = self.ctx.gate.try_acquire(&repo.repo_key, &repo.server_key, server_cap)
        else {
            // Claim guard releases on drop.
            drop(claim);
            return Err(Skip::NoSlots);
        };

        self.spawn_job(repo.clone(), slots, claim);
        Ok(())
    }

    /// The stateless parts of eligibility, separated for tests.
    fn check_eligibility(&self, repo: &RepoDescriptor) -> Result<(), Skip> {
        if self.ctx.is_shutting_down() {
            return Err(Skip::ShuttingDown);
        }
        if repo.vcs != VcsType::Svn {
            return Err(Skip::UnsupportedType);
        }
        if let Some(due) = self.ctx.next_fetch_time(&repo.repo_key) {
            if self.clock.epoch_secs() < due {
                return Err(Skip::NotDue { due_epoch_secs: due });
            }
        }
        if self.ctx.repo_is_running(&repo.repo_key) {
            return Err(Skip::JobAlreadyRunning);
        }
        Ok(())
    }

    fn spawn_job(&self, repo: RepoDescriptor, slots: SlotGuard, claim: RepoClaim) {
        let ctx = Arc::clone(&self.ctx);
        let clock = self.clock.clone();
        tokio::spawn(async move {
            let outcome = svn::convert_repo(&ctx, &repo).await;
            if outcome.is_success() {
                if let Some(interval) = repo.fetch_interval {
                    ctx.set_next_fetch_time(
                        &repo.repo_key,
                        clock.epoch_secs() + interval.as_secs(),
                    );
                }
            }
            // Slot release happens strictly after the worker (and its
            // child-process reaps) finished: guards drop here.
            drop(slots);
            drop(claim);
        });
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
