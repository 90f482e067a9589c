//! Executor tests against real child processes, using `sh` scripts in place
//! of the jar.

#![cfg(unix)]

mod common;

use std::time::{Duration, Instant};

use common::sh_program;
use tprunner::executor::{ExecutionResult, Executor, ProgramConfig, StderrPolicy};

fn executor(script: &str) -> Executor {
    Executor::new(sh_program(script))
}

#[tokio::test]
async fn stdout_only_is_success() {
    let result = executor("cat").execute("hello\nworld", false).await;

    match result {
        ExecutionResult::Success { output, .. } => assert_eq!(output, "hello\nworld"),
        other => panic!("expected success, got {other:?}"),
    }
}

#[tokio::test]
async fn stderr_with_zero_exit_is_process_error() {
    let result = executor("cat >/dev/null; echo out; echo 'oops' >&2; exit 0")
        .execute("x", false)
        .await;

    assert_eq!(
        result,
        ExecutionResult::ProcessError {
            message: "oops\n".to_string()
        }
    );
}

#[tokio::test]
async fn nonzero_exit_without_stderr_is_success_by_default() {
    let result = executor("cat; exit 2").execute("x", false).await;
    assert!(result.is_success(), "{result:?}");
}

#[tokio::test]
async fn nonzero_exit_policy_ignores_warnings() {
    let mut config = sh_program("cat; echo 'warning' >&2");
    config.stderr_policy = StderrPolicy::NonZeroExit;

    let result = Executor::new(config).execute("fine", false).await;

    match result {
        ExecutionResult::Success { output, .. } => assert_eq!(output, "fine"),
        other => panic!("expected success, got {other:?}"),
    }
}

#[tokio::test]
async fn large_output_before_reading_input_does_not_deadlock() {
    // Writes ~1 MiB before touching stdin; both pipes would fill up if
    // input and output were not handled concurrently.
    let script = "head -c 1048576 /dev/zero | tr '\\000' 'a'; cat >/dev/null";
    let input = "b".repeat(1024 * 1024);

    let result = executor(script).execute(&input, false).await;

    match result {
        ExecutionResult::Success { output, .. } => assert_eq!(output.len(), 1024 * 1024),
        other => panic!("expected success, got {other:?}"),
    }
}

#[tokio::test]
async fn program_ignoring_stdin_is_not_an_error() {
    let input = "c".repeat(1024 * 1024);

    let result = executor("echo done").execute(&input, false).await;

    match result {
        ExecutionResult::Success { output, .. } => assert_eq!(output, "done\n"),
        other => panic!("expected success, got {other:?}"),
    }
}

#[tokio::test]
async fn invalid_utf8_is_decoded_lossily() {
    let result = executor("cat >/dev/null; printf 'a\\377b'").execute("x", false).await;

    match result {
        ExecutionResult::Success { output, .. } => assert_eq!(output, "a\u{FFFD}b"),
        other => panic!("expected success, got {other:?}"),
    }
}

#[tokio::test]
async fn elapsed_time_covers_the_run() {
    let result = executor("cat >/dev/null; sleep 0.2").execute("x", false).await;

    match result {
        ExecutionResult::Success { elapsed_ms, .. } => assert!(elapsed_ms >= 150, "{elapsed_ms}"),
        other => panic!("expected success, got {other:?}"),
    }
}

#[tokio::test]
async fn hanging_program_is_killed_after_timeout() {
    let config = ProgramConfig {
        timeout: Duration::from_millis(300),
        ..sh_program("sleep 30 & sleep 30")
    };
    let started = Instant::now();

    let result = Executor::new(config).execute("x", false).await;

    assert!(started.elapsed() < Duration::from_secs(10));
    match result {
        ExecutionResult::ProcessError { message } => {
            assert!(message.contains("did not finish"), "{message}")
        }
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn concurrent_runs_are_independent() {
    let executor = std::sync::Arc::new(executor("cat"));
    let mut handles = Vec::new();
    for i in 0..8 {
        let executor = executor.clone();
        handles.push(tokio::spawn(async move {
            (i, executor.execute(&format!("run-{i}"), false).await)
        }));
    }

    for handle in handles {
        let (i, result) = handle.await.unwrap();
        match result {
            ExecutionResult::Success { output, .. } => assert_eq!(output, format!("run-{i}")),
            other => panic!("expected success, got {other:?}"),
        }
    }
}
