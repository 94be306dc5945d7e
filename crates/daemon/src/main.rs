// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! repoconvd: the conversion supervisor binary.
//!
//! No subcommands; all control is environment variables, the manifest
//! file, and Unix signals. Exit code 0 means a normal termination
//! (MAX_CYCLES reached, or a shutdown signal arrived and the process
//! table drained); anything else is a startup failure.

use anyhow::Context as _;
use clap::Parser;
use repoconv_config::manifest::ManifestDefaults;
use repoconv_config::EnvConfig;
use repoconv_core::{Redactor, SystemClock};
use repoconv_daemon::{maintenance, monitor, scheduler::Scheduler, signals, Context};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Converts remote Subversion repositories into locally served bare Git
/// repositories, continuously.
#[derive(Parser)]
#[command(name = "repoconvd", version)]
struct Args {}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    Args::parse();

    let env = EnvConfig::load().context("invalid environment configuration")?;
    init_logging(&env);

    let redactor = Redactor::new();
    let ctx = Arc::new(Context::new(env, redactor));

    info!(
        hostname = %ctx.hostname,
        pid = std::process::id(),
        manifest = %ctx.env.repos_to_convert.display(),
        serve_root = %ctx.env.serve_root.display(),
        interval_secs = ctx.env.interval.as_secs(),
        global_slots = ctx.env.max_concurrent_global,
        per_server_slots = ctx.env.max_concurrent_per_server,
        build = ?ctx.env.build_metadata,
        "starting supervisor"
    );

    // Startup validation is fatal; runtime reloads are not.
    std::fs::create_dir_all(&ctx.env.serve_root).with_context(|| {
        format!("serve root {} is not writable", ctx.env.serve_root.display())
    })?;
    let defaults = ManifestDefaults { max_retries: ctx.env.max_retries };
    ctx.store
        .reload(&ctx.env.repos_to_convert, defaults, &ctx.redactor)
        .context("failed to load the repos-to-convert manifest")?;

    maintenance::git_global_setup(&ctx).await;

    let _signals = signals::spawn(Arc::clone(&ctx));
    let _status_monitor = monitor::spawn_status_monitor(Arc::clone(&ctx));
    let _concurrency_monitor = monitor::spawn_concurrency_monitor(Arc::clone(&ctx));

    let scheduler = Scheduler::new(Arc::clone(&ctx), SystemClock);
    let cycles = scheduler.run().await;

    // A MAX_CYCLES exit still drains like a signalled one: stop job
    // tasks, then TERM/KILL whatever is left in the table.
    ctx.shutdown.cancel();
    signals::drain(&ctx).await;

    info!(cycles, uptime_secs = ctx.uptime_secs(), hostname = %ctx.hostname, "supervisor stopped");
    Ok(())
}

/// JSON logs on stdout, one object per line, with source location.
/// `RUST_LOG` overrides the manifest-style `LOG_LEVEL` when set.
fn init_logging(env: &EnvConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(env.tracing_directive()));
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .init();
}
