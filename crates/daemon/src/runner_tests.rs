// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use repoconv_config::EnvConfig;
use repoconv_core::Redactor;
use serial_test::serial;

fn test_context() -> Context {
    Context::new(EnvConfig::load().unwrap(), Redactor::new())
}

fn sh(script: &str) -> RunRequest {
    RunRequest::new(["sh", "-c", script]).quiet()
}

#[tokio::test]
#[serial]
async fn captures_merged_stdout_and_stderr() {
    let ctx = test_context();
    let result = run(&ctx, sh("echo out; echo err >&2")).await;
    assert_eq!(result.status, ProcessStatus::Exited { code: 0 });
    assert!(result.succeeded);
    assert_eq!(result.total_lines, 2);
    assert!(result.output_contains("out"));
    assert!(result.output_contains("err"));
}

#[tokio::test]
#[serial]
async fn reports_exit_code() {
    let ctx = test_context();
    let result = run(&ctx, sh("exit 3")).await;
    assert_eq!(result.status, ProcessStatus::Exited { code: 3 });
    assert!(!result.succeeded);
}

#[tokio::test]
#[serial]
async fn spawn_failure_is_classified_not_raised() {
    let ctx = test_context();
    let result = run(&ctx, RunRequest::new(["/nonexistent/definitely-not-a-binary"])).await;
    assert!(matches!(result.status, ProcessStatus::SpawnError { .. }));
    assert!(!result.succeeded);
    assert!(result.pid.is_none());
    // Nothing left behind in the table
    assert!(ctx.table.is_empty());
}

#[tokio::test]
#[serial]
async fn inactivity_timeout_kills_the_group() {
    let ctx = test_context();
    let request = sh("sleep 30").inactivity_timeout(Duration::from_millis(100));
    let started = Instant::now();
    let result = run(&ctx, request).await;
    assert_eq!(result.status, ProcessStatus::Stalled);
    assert!(started.elapsed() < Duration::from_secs(20), "kill happened promptly");
    assert!(ctx.table.is_empty(), "child reaped and removed from running table");
}

#[tokio::test]
#[serial]
async fn wall_clock_timeout_is_distinct_from_stall() {
    let ctx = test_context();
    // The child keeps producing output, so only the wall clock can fire.
    let request = sh("while true; do echo tick; sleep 0.05; done")
        .wall_timeout(Duration::from_millis(300))
        .inactivity_timeout(Duration::from_secs(30));
    let result = run(&ctx, request).await;
    assert_eq!(result.status, ProcessStatus::TimedOut);
}

#[tokio::test]
#[serial]
async fn truncation_keeps_the_tail_with_marker() {
    let mut env = EnvConfig::load().unwrap();
    env.truncate_max_lines = 5;
    let ctx = Context::new(env, Redactor::new());

    let result = run(&ctx, sh("seq 1 50")).await;
    assert_eq!(result.total_lines, 50);
    // Truncation marker, then the last 5 lines
    assert_eq!(result.output.len(), 6);
    assert!(result.output[0].contains("TRUNCATED FROM 50 LINES TO 5 LINES"));
    assert_eq!(result.output[1], "46");
    // The tool's true final line stays last; failure reasons are read
    // from the tail.
    assert_eq!(result.output.last().map(String::as_str), Some("50"));
}

#[tokio::test]
#[serial]
async fn long_lines_are_capped() {
    let mut env = EnvConfig::load().unwrap();
    env.truncate_max_line_length = 10;
    let ctx = Context::new(env, Redactor::new());

    let result = run(&ctx, sh("printf 'aaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\\n'")).await;
    assert!(result.output[0].starts_with("aaaaaaaaaa"));
    assert!(result.output[0].ends_with("...LINE TRUNCATED"));
}

#[tokio::test]
#[serial]
async fn secrets_never_reach_captured_output() {
    let redactor = Redactor::new();
    redactor.register("hunter2");
    let ctx = Context::new(EnvConfig::load().unwrap(), redactor);

    let result = run(&ctx, sh("echo password is hunter2")).await;
    assert!(!result.output.iter().any(|l| l.contains("hunter2")));
    assert!(result.output_contains("REDACTED_SECRET"));
}

#[tokio::test]
#[serial]
async fn stdin_line_is_delivered_then_closed() {
    let ctx = test_context();
    let request = sh("read line; echo got:$line").stdin_line("s3same");
    let result = run(&ctx, request).await;
    assert!(result.output_contains("got:s3same"));
}

#[tokio::test]
#[serial]
async fn count_pattern_sees_lines_that_truncation_drops() {
    let mut env = EnvConfig::load().unwrap();
    env.truncate_max_lines = 2;
    let ctx = Context::new(env, Redactor::new());

    let request = sh("for i in 1 2 3 4 5; do echo r$i = abc; done; echo done")
        .count_pattern(Regex::new(r"^r\d+ = ").unwrap());
    let result = run(&ctx, request).await;
    assert_eq!(result.matched_lines, 5);
    assert!(result.output.len() <= 3);
}

#[tokio::test]
#[serial]
async fn success_predicate_overrides_exit_code() {
    let ctx = test_context();
    let mut request = sh("echo all good; exit 1");
    request.success_when =
        Some(Arc::new(|_code, output| output.iter().any(|l| l.contains("all good"))));
    let result = run(&ctx, request).await;
    assert_eq!(result.status, ProcessStatus::Exited { code: 1 });
    assert!(result.succeeded);
}

#[tokio::test]
#[serial]
async fn finished_children_land_in_terminal_history() {
    let ctx = test_context();
    let before = ctx.table.recent_finished().len();
    run(&ctx, sh("true")).await;
    let finished = ctx.table.recent_finished();
    assert_eq!(finished.len(), before + 1);
    assert_eq!(finished.last().unwrap().status, ProcessStatus::Exited { code: 0 });
}
