// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Child-process execution with capture, timeouts, and guaranteed reap.
//!
//! Every external tool invocation flows through [`run`]. Children are
//! placed in their own session by default so a single signal to the
//! process group reaches the whole tool subtree. stdout and stderr are
//! merged into line-oriented records, redacted, and capped; the last
//! lines are always kept because diagnostic signals appear at the tail.

use crate::context::Context;
use regex::Regex;
use repoconv_core::{ProcessRecord, ProcessStatus, RepoKey};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// How long a signalled process group gets to exit before SIGKILL.
const KILL_GRACE: Duration = Duration::from_secs(10);

/// Hook deciding success independent of the exit code.
pub type SuccessPredicate = Arc<dyn Fn(Option<i32>, &[String]) -> bool + Send + Sync>;

/// One external tool invocation.
pub struct RunRequest {
    pub argv: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Extra environment, merged over the inherited one.
    pub env: Vec<(String, String)>,
    /// Place the child in its own session/process group. On by default;
    /// a child sharing our group cannot be group-killed without killing
    /// the supervisor.
    pub new_session: bool,
    pub wall_timeout: Option<Duration>,
    /// Kill the child when no output byte arrives for this long.
    pub inactivity_timeout: Option<Duration>,
    /// Line written to the child's stdin, then stdin is closed.
    pub stdin_line: Option<String>,
    /// Lines matching this pattern are counted into
    /// [`RunResult::matched_lines`] before truncation can drop them.
    pub count_pattern: Option<Regex>,
    /// Classify success independent of the exit code.
    pub success_when: Option<SuccessPredicate>,
    pub repo_key: Option<RepoKey>,
    /// Suppress non-error logging.
    pub quiet: bool,
}

impl RunRequest {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            cwd: None,
            env: Vec::new(),
            new_session: true,
            wall_timeout: None,
            inactivity_timeout: None,
            stdin_line: None,
            count_pattern: None,
            success_when: None,
            repo_key: None,
            quiet: false,
        }
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn wall_timeout(mut self, timeout: Duration) -> Self {
        self.wall_timeout = Some(timeout);
        self
    }

    pub fn inactivity_timeout(mut self, timeout: Duration) -> Self {
        self.inactivity_timeout = Some(timeout);
        self
    }

    pub fn stdin_line(mut self, line: impl Into<String>) -> Self {
        self.stdin_line = Some(line.into());
        self
    }

    pub fn count_pattern(mut self, pattern: Regex) -> Self {
        self.count_pattern = Some(pattern);
        self
    }

    pub fn repo_key(mut self, key: RepoKey) -> Self {
        self.repo_key = Some(key);
        self
    }

    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }
}

/// Outcome of one invocation. Failure modes are data, not errors.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub status: ProcessStatus,
    /// Redacted, truncated output; the tail is always kept.
    pub output: Vec<String>,
    /// Line count before truncation.
    pub total_lines: usize,
    /// Lines that matched the request's count pattern.
    pub matched_lines: usize,
    pub runtime: Duration,
    pub pid: Option<u32>,
    /// Exit-code success, or the request's predicate when one was given.
    pub succeeded: bool,
}

impl RunResult {
    pub fn exit_code(&self) -> Option<i32> {
        self.status.exit_code()
    }

    /// Whether any captured line contains the token.
    pub fn output_contains(&self, token: &str) -> bool {
        self.output.iter().any(|line| line.contains(token))
    }

    fn spawn_error(error: String, runtime: Duration) -> Self {
        Self {
            status: ProcessStatus::SpawnError { error },
            output: Vec::new(),
            total_lines: 0,
            matched_lines: 0,
            runtime,
            pid: None,
            succeeded: false,
        }
    }
}

/// Spawn, capture, and reap one child process.
pub async fn run(ctx: &Context, request: RunRequest) -> RunResult {
    let started = Instant::now();
    // Redaction happens once, here; the raw argv is never logged.
    let display_cmd = ctx.redactor.redact_argv(&request.argv);

    let mut command = Command::new(&request.argv[0]);
    command
        .args(&request.argv[1..])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(if request.stdin_line.is_some() { Stdio::piped() } else { Stdio::null() })
        .kill_on_drop(true);
    if let Some(cwd) = &request.cwd {
        command.current_dir(cwd);
    }
    for (key, value) in &request.env {
        command.env(key, value);
    }
    if request.new_session {
        command.process_group(0);
    }

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(error) => {
            warn!(command = %display_cmd, %error, "child spawn failed");
            return RunResult::spawn_error(error.to_string(), started.elapsed());
        }
    };

    let pid = child.id().unwrap_or(0);
    let pgid = if request.new_session { pid as i32 } else { nix::unistd::getpgrp().as_raw() };
    ctx.table
        .insert(ProcessRecord::new(pid, pgid, display_cmd.clone(), request.repo_key.clone()));
    if !request.quiet {
        debug!(command = %display_cmd, pid, pgid, "child started");
    }

    if let Some(line) = &request.stdin_line {
        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.write_all(line.as_bytes()).await;
            let _ = stdin.write_all(b"\n").await;
            // Dropping stdin closes the pipe so the child sees EOF.
        }
    }

    let (tx, mut rx) = mpsc::channel::<String>(256);
    if let Some(stdout) = child.stdout.take() {
        forward_lines(stdout, tx.clone());
    }
    if let Some(stderr) = child.stderr.take() {
        forward_lines(stderr, tx);
    } else {
        drop(tx);
    }

    let mut capture = Capture::new(ctx, &request, pid);
    let deadline = request.wall_timeout.map(|t| started + t);
    let mut kill_status: Option<ProcessStatus> = None;

    loop {
        let wait = next_wait(deadline, request.inactivity_timeout);
        let received = match wait {
            Some(duration) => match tokio::time::timeout(duration, rx.recv()).await {
                Ok(received) => received,
                Err(_) => {
                    let wall = deadline.is_some_and(|d| Instant::now() >= d);
                    kill_status = Some(if wall {
                        ProcessStatus::TimedOut
                    } else {
                        ProcessStatus::Stalled
                    });
                    break;
                }
            },
            None => rx.recv().await,
        };
        match received {
            Some(line) => capture.push(line),
            // Both streams closed: the child is done writing.
            None => break,
        }
    }

    if let Some(status) = &kill_status {
        warn!(command = %display_cmd, pid, status = %status, "killing child process group");
        terminate_child(&mut child, pgid, request.new_session).await;
    }

    // Collect anything buffered between the last recv and the reap.
    while let Ok(line) = rx.try_recv() {
        capture.push(line);
    }

    let wait_result = child.wait().await;
    let final_status = match kill_status {
        Some(status) => status,
        None => match wait_result {
            Ok(exit) => match exit.code() {
                Some(code) => ProcessStatus::Exited { code },
                None => {
                    use std::os::unix::process::ExitStatusExt;
                    ProcessStatus::Signalled { signal: exit.signal().unwrap_or(0) }
                }
            },
            Err(error) => {
                warn!(command = %display_cmd, pid, %error, "failed to reap child");
                ProcessStatus::Exited { code: -1 }
            }
        },
    };
    ctx.table.finish(pid, final_status.clone());

    let output = capture.into_output();
    let runtime = started.elapsed();
    let exit_code = final_status.exit_code();
    let succeeded = match &request.success_when {
        Some(predicate) => predicate(exit_code, &output.lines),
        None => exit_code == Some(0),
    };

    if succeeded || request.quiet {
        debug!(
            command = %display_cmd,
            pid,
            status = %final_status,
            exit_code,
            runtime_secs = runtime.as_secs(),
            lines = output.total,
            "child finished"
        );
    } else {
        warn!(
            command = %display_cmd,
            pid,
            status = %final_status,
            exit_code,
            runtime_secs = runtime.as_secs(),
            output = ?output.lines,
            "child failed"
        );
    }

    RunResult {
        status: final_status,
        output: output.lines,
        total_lines: output.total,
        matched_lines: output.matched,
        runtime,
        pid: Some(pid),
        succeeded,
    }
}

/// TERM the child (or its whole group), allow a grace period, then KILL.
/// The caller reaps afterwards; this never returns with the child still
/// catchable.
async fn terminate_child(child: &mut Child, pgid: i32, own_group: bool) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let child_pid = child.id();
    let term = move |signal: Signal| {
        if own_group {
            let _ = killpg(Pid::from_raw(pgid), signal);
        } else if let Some(pid) = child_pid {
            let _ = nix::sys::signal::kill(Pid::from_raw(pid as i32), signal);
        }
    };

    term(Signal::SIGTERM);
    if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_err() {
        term(Signal::SIGKILL);
    }
}

fn forward_lines<R>(reader: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).await.is_err() {
                break;
            }
        }
    });
}

fn next_wait(deadline: Option<Instant>, inactivity: Option<Duration>) -> Option<Duration> {
    let until_deadline = deadline.map(|d| d.saturating_duration_since(Instant::now()));
    match (until_deadline, inactivity) {
        (Some(wall), Some(idle)) => Some(wall.min(idle)),
        (Some(wall), None) => Some(wall),
        (None, idle) => idle,
    }
}

/// Rolling line capture: redacts, caps line length, keeps the tail, and
/// counts pattern matches over the full stream.
struct Capture<'a> {
    ctx: &'a Context,
    pattern: Option<&'a Regex>,
    pid: u32,
    tail: VecDeque<String>,
    max_lines: usize,
    max_line_length: usize,
    total: usize,
    matched: usize,
}

struct CapturedOutput {
    lines: Vec<String>,
    total: usize,
    matched: usize,
}

impl<'a> Capture<'a> {
    fn new(ctx: &'a Context, request: &'a RunRequest, pid: u32) -> Self {
        Self {
            ctx,
            pattern: request.count_pattern.as_ref(),
            pid,
            tail: VecDeque::new(),
            max_lines: ctx.env.truncate_max_lines,
            max_line_length: ctx.env.truncate_max_line_length,
            total: 0,
            matched: 0,
        }
    }

    fn push(&mut self, raw: String) {
        self.total += 1;
        if self.pattern.is_some_and(|p| p.is_match(&raw)) {
            self.matched += 1;
        }
        let mut line = self.ctx.redactor.redact(&raw);
        if line.chars().count() > self.max_line_length {
            let kept: String = line.chars().take(self.max_line_length).collect();
            line = format!("{kept}...LINE TRUNCATED");
        }
        if self.tail.len() >= self.max_lines {
            self.tail.pop_front();
        }
        self.tail.push_back(line.clone());
        self.ctx.table.append_output(self.pid, line, self.max_lines);
    }

    fn into_output(self) -> CapturedOutput {
        let mut lines: Vec<String> = self.tail.into();
        if self.total > self.max_lines {
            // Marker leads the capture; the tool's true final line must
            // stay last because callers read diagnostics from the tail.
            lines.insert(
                0,
                format!(
                    "...OUTPUT TRUNCATED FROM {} LINES TO {} LINES",
                    self.total, self.max_lines
                ),
            );
        }
        CapturedOutput { lines, total: self.total, matched: self.matched }
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
