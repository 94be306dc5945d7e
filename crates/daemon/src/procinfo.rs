// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Defensive `/proc` sampling for tracked processes.
//!
//! Pids disappear between listing and reading, permissions vary, and
//! stat files occasionally fail to parse; every reader here degrades to
//! a partial record (or `None`) instead of failing.

use std::path::Path;

/// Linux containers this runs in use 4 KiB pages.
const PAGE_SIZE: u64 = 4096;

/// Point-in-time resource sample for one process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcSample {
    pub pid: u32,
    /// Kernel state letter (R, S, D, Z, T, ...).
    pub state: char,
    /// User CPU time in clock ticks.
    pub utime_ticks: u64,
    /// System CPU time in clock ticks.
    pub stime_ticks: u64,
    pub rss_bytes: u64,
    /// Open file descriptors; `None` when unreadable.
    pub open_fds: Option<usize>,
    /// Descriptors that are sockets; `None` when unreadable.
    pub sockets: Option<usize>,
}

/// Sample one pid. `None` when the process is gone or its stat file is
/// unreadable.
pub fn sample(pid: u32) -> Option<ProcSample> {
    let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    let parsed = parse_stat(&stat)?;

    let (open_fds, sockets) = count_fds(pid);

    Some(ProcSample {
        pid,
        state: parsed.state,
        utime_ticks: parsed.utime_ticks,
        stime_ticks: parsed.stime_ticks,
        rss_bytes: parsed.rss_pages.max(0) as u64 * PAGE_SIZE,
        open_fds,
        sockets,
    })
}

/// Direct children of `parent` currently in the zombie state.
///
/// Used by the reaper to wait on orphans that were reparented to us
/// (we run as pid 1 in the container) without touching the children the
/// runner owns and reaps itself.
pub fn zombie_children(parent: u32) -> Vec<u32> {
    let mut zombies = Vec::new();
    let Ok(entries) = std::fs::read_dir("/proc") else {
        return zombies;
    };
    for entry in entries.flatten() {
        let Some(pid) = entry.file_name().to_str().and_then(|n| n.parse::<u32>().ok()) else {
            continue;
        };
        let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) else {
            continue;
        };
        if let Some(parsed) = parse_stat(&stat) {
            if parsed.ppid == parent && parsed.state == 'Z' {
                zombies.push(pid);
            }
        }
    }
    zombies.sort_unstable();
    zombies
}

#[derive(Debug)]
struct StatFields {
    state: char,
    ppid: u32,
    utime_ticks: u64,
    stime_ticks: u64,
    rss_pages: i64,
}

/// Parse `/proc/<pid>/stat`. The comm field is parenthesised and may
/// itself contain spaces and parentheses, so split at the LAST `)`.
fn parse_stat(content: &str) -> Option<StatFields> {
    let rest = content.rsplit_once(')').map(|(_, rest)| rest)?;
    let fields: Vec<&str> = rest.split_whitespace().collect();
    // Fields counted from "state" onwards: state ppid pgrp session
    // tty_nr tpgid flags minflt cminflt majflt cmajflt utime stime
    // cutime cstime priority nice num_threads itrealvalue starttime
    // vsize rss ...
    if fields.len() < 22 {
        return None;
    }
    Some(StatFields {
        state: fields[0].chars().next()?,
        ppid: fields[1].parse().ok()?,
        utime_ticks: fields[11].parse().ok()?,
        stime_ticks: fields[12].parse().ok()?,
        rss_pages: fields[21].parse().ok()?,
    })
}

/// Count open descriptors and how many of them are sockets.
fn count_fds(pid: u32) -> (Option<usize>, Option<usize>) {
    let fd_dir = format!("/proc/{pid}/fd");
    let Ok(entries) = std::fs::read_dir(Path::new(&fd_dir)) else {
        return (None, None);
    };
    let mut fds = 0usize;
    let mut sockets = 0usize;
    for entry in entries.flatten() {
        fds += 1;
        if let Ok(target) = std::fs::read_link(entry.path()) {
            if target.to_string_lossy().starts_with("socket:") {
                sockets += 1;
            }
        }
    }
    (Some(fds), Some(sockets))
}

#[cfg(test)]
#[path = "procinfo_tests.rs"]
mod tests;
