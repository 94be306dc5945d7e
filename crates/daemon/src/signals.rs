// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Signal handling and shutdown propagation.
//!
//! TERM, INT, and HUP set the process-wide shutdown token; the actual
//! teardown runs in [`drain`], called by the binary once the scheduler
//! loop has stopped spawning. CHLD drives a non-blocking sweep of
//! reparented orphans (the supervisor runs as pid 1 in its container);
//! children the runner owns are reaped by their own tasks and are never
//! waited on here.

use crate::context::Context;
use crate::procinfo;
use crate::table::ProcessTable;
use nix::sys::signal::{killpg, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, error, info, warn};

/// How long surviving process groups get between TERM and KILL.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Install the handlers and run them until the process exits.
pub fn spawn(ctx: Arc<Context>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move { handle_signals(ctx).await })
}

async fn handle_signals(ctx: Arc<Context>) {
    let (Ok(mut term), Ok(mut int), Ok(mut hup), Ok(mut chld)) = (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
        signal(SignalKind::hangup()),
        signal(SignalKind::child()),
    ) else {
        error!("failed to install signal handlers");
        return;
    };

    loop {
        tokio::select! {
            _ = term.recv() => observe_shutdown_signal(&ctx, "SIGTERM"),
            _ = int.recv() => observe_shutdown_signal(&ctx, "SIGINT"),
            _ = hup.recv() => observe_shutdown_signal(&ctx, "SIGHUP"),
            _ = chld.recv() => reap_orphans(&ctx.table),
        }
    }
}

/// Flip the shutdown token. Re-entry while already shutting down is a
/// no-op; teardown itself happens in [`drain`].
fn observe_shutdown_signal(ctx: &Arc<Context>, name: &str) {
    if ctx.is_shutting_down() {
        debug!(signal = name, "already shutting down, ignoring repeat signal");
        return;
    }
    info!(signal = name, "shutdown signal received, blocking new job spawns");
    ctx.shutdown.cancel();
}

/// Propagate shutdown to every tracked process group and wait for the
/// table to empty.
///
/// TERM first; groups still alive after [`SHUTDOWN_GRACE`] receive KILL.
/// Returns once every tracked child is reaped and every job task has
/// released its repo claim, or after a final bounded wait past the KILL.
pub async fn drain(ctx: &Arc<Context>) {
    let pgids = ctx.table.tracked_pgids();
    if !pgids.is_empty() {
        info!(groups = pgids.len(), "sending TERM to tracked process groups");
        for pgid in &pgids {
            let _ = killpg(Pid::from_raw(*pgid), Signal::SIGTERM);
        }
    }

    if wait_for_drain(ctx, SHUTDOWN_GRACE).await {
        info!("all children reaped, shutdown drain complete");
        return;
    }

    let survivors = ctx.table.tracked_pgids();
    warn!(groups = survivors.len(), "grace period expired, sending KILL to survivors");
    for pgid in &survivors {
        let _ = killpg(Pid::from_raw(*pgid), Signal::SIGKILL);
    }

    if wait_for_drain(ctx, Duration::from_secs(5)).await {
        info!("all children reaped after KILL, shutdown drain complete");
    } else {
        error!(
            remaining = ctx.table.running_len(),
            jobs = ctx.running_jobs(),
            "process table did not drain; exiting with stragglers"
        );
    }
}

/// Poll until no tracked child and no claimed repo remains.
async fn wait_for_drain(ctx: &Arc<Context>, limit: Duration) -> bool {
    let deadline = Instant::now() + limit;
    loop {
        reap_orphans(&ctx.table);
        if ctx.table.is_empty() && ctx.running_jobs() == 0 {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
}

/// Wait on zombie children that were reparented to us, without blocking
/// and without stealing the runner's own children.
pub fn reap_orphans(table: &ProcessTable) {
    for pid in procinfo::zombie_children(std::process::id()) {
        if table.contains(pid) {
            // The runner's task will reap this one itself.
            continue;
        }
        match waitpid(Pid::from_raw(pid as i32), Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::Exited(_, code)) if code != 0 => {
                warn!(pid, code, "reaped orphaned child with non-zero exit");
            }
            Ok(WaitStatus::Exited(_, _)) => {
                debug!(pid, "reaped orphaned child");
            }
            Ok(WaitStatus::Signaled(_, sig, _)) => {
                warn!(pid, signal = sig as i32, "reaped orphaned child killed by signal");
            }
            Ok(_) => {}
            Err(error) => {
                debug!(pid, %error, "orphan disappeared before it could be reaped");
            }
        }
    }
}

#[cfg(test)]
#[path = "signals_tests.rs"]
mod tests;
