// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background monitors: per-process status and concurrency usage.
//!
//! Both run on fixed intervals, hold no locks while collecting (they
//! work from table/gate snapshots), and emit one structured event per
//! observation. A disappeared pid produces a partial record, never an
//! error.

use crate::context::Context;
use crate::gate::GateStatus;
use crate::procinfo;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

/// Periodic snapshot of every tracked child process. Disabled when the
/// interval is zero.
pub fn spawn_status_monitor(ctx: Arc<Context>) -> Option<JoinHandle<()>> {
    let interval = ctx.env.status_monitor_interval;
    if interval.is_zero() {
        return None;
    }
    Some(tokio::spawn(async move {
        monitor_loop(ctx, interval, emit_process_status).await;
    }))
}

/// Periodic slot-usage summary. Disabled when the interval is zero.
pub fn spawn_concurrency_monitor(ctx: Arc<Context>) -> Option<JoinHandle<()>> {
    let interval = ctx.env.concurrency_monitor_interval;
    if interval.is_zero() {
        return None;
    }
    Some(tokio::spawn(async move {
        monitor_loop(ctx, interval, emit_concurrency_status).await;
    }))
}

async fn monitor_loop(ctx: Arc<Context>, interval: Duration, emit: fn(&Context)) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = ctx.shutdown.cancelled() => break,
        }
        emit(&ctx);
    }
}

/// One event per currently tracked process, with whatever `/proc` still
/// knows about it.
pub fn emit_process_status(ctx: &Context) {
    for record in ctx.table.snapshot() {
        let sample = procinfo::sample(record.pid);
        let state = sample.as_ref().map(|s| s.state.to_string());
        let state = state.as_deref();
        let utime = sample.as_ref().map(|s| s.utime_ticks);
        let stime = sample.as_ref().map(|s| s.stime_ticks);
        let rss = sample.as_ref().map(|s| s.rss_bytes);
        let open_fds = sample.as_ref().and_then(|s| s.open_fds);
        let sockets = sample.as_ref().and_then(|s| s.sockets);
        info!(
            cycle = ctx.cycle(),
            pid = record.pid,
            ppid = record.ppid,
            pgid = record.pgid,
            repo_key = record.repo_key.as_ref().map(|k| k.as_str()).unwrap_or("-"),
            command = %record.command,
            status = %record.status,
            runtime_secs = record.runtime_secs(),
            idle_secs = record.last_activity.elapsed().as_secs(),
            state,
            utime_ticks = utime,
            stime_ticks = stime,
            rss_bytes = rss,
            open_fds,
            sockets,
            "process status"
        );
    }
}

/// One summary event for the gate.
pub fn emit_concurrency_status(ctx: &Context) {
    let status = ctx.gate.status();
    info!(
        cycle = ctx.cycle(),
        global_in_use = status.global_in_use,
        global_cap = status.global_cap,
        servers = %server_summary(&status),
        running_jobs = ctx.running_jobs(),
        "concurrency status"
    );
}

/// `"host-a: 5/10 [r1, r2]; host-b: 1/10 [r9]"`, or `"none active"`.
pub fn server_summary(status: &GateStatus) -> String {
    let parts: Vec<String> = status
        .servers
        .iter()
        .filter(|s| s.in_use > 0)
        .map(|s| {
            let repos: Vec<&str> = s.active_repos.iter().map(|k| k.as_str()).collect();
            format!("{}: {}/{} [{}]", s.server_key, s.in_use, s.cap, repos.join(", "))
        })
        .collect();
    if parts.is_empty() {
        "none active".to_string()
    } else {
        parts.join("; ")
    }
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;
