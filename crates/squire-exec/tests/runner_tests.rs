//! Process runner behaviour against real programs (unix only)

#![cfg(unix)]

use squire_exec::{CancellationToken, ExecError, ProcessRunner, RunOptions, Tool};
use std::time::{Duration, Instant};

const SH: Tool = Tool::new("sh", "running test scripts", "Install a POSIX shell.");

#[tokio::test]
async fn streams_stdout_into_sink() {
    let runner = ProcessRunner::default();
    let mut sink = Vec::new();

    let output = runner
        .run(&SH, ["-c", "printf 'one\\ntwo\\n'"], RunOptions::default(), &mut sink)
        .await
        .unwrap();

    assert_eq!(sink, b"one\ntwo\n");
    assert_eq!(output.bytes, 8);
    assert_eq!(output.stderr, None);
}

#[tokio::test]
async fn output_collects_string() {
    let runner = ProcessRunner::default();
    let out = runner
        .output(&SH, ["-c", "echo hello"], RunOptions::default())
        .await
        .unwrap();
    assert_eq!(out, "hello\n");
}

#[tokio::test]
async fn non_zero_exit_carries_captured_stderr() {
    let runner = ProcessRunner::default();
    let err = runner
        .output(&SH, ["-c", "echo broken >&2; exit 3"], RunOptions::default().capture_stderr())
        .await
        .unwrap_err();

    match &err {
        ExecError::Failed { program, status, stderr } => {
            assert_eq!(program, "sh");
            assert_eq!(status.code(), Some(3));
            assert_eq!(stderr.trim(), "broken");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.to_string().ends_with(": broken"));
}

#[tokio::test]
async fn captured_stderr_returned_on_success() {
    let runner = ProcessRunner::default();
    let mut sink = Vec::new();
    let output = runner
        .run(
            &SH,
            ["-c", "echo warn >&2; echo ok"],
            RunOptions::default().capture_stderr(),
            &mut sink,
        )
        .await
        .unwrap();

    assert_eq!(sink, b"ok\n");
    assert_eq!(output.stderr.as_deref(), Some("warn\n"));
}

#[tokio::test]
async fn missing_tool_is_reported_before_spawning() {
    let tool = Tool::new("squire-missing-tool", "nothing", "Do not install this.");
    let err = ProcessRunner::default()
        .output(&tool, ["--version"], RunOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.missing_tool(), Some(&tool));
    assert!(err.detail().unwrap().contains("Do not install this."));
}

#[tokio::test]
async fn cancellation_kills_child_promptly() {
    let cancel = CancellationToken::new();
    let runner = ProcessRunner::new(cancel.clone());

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = runner
        .output(&SH, ["-c", "sleep 10"], RunOptions::default())
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn already_cancelled_runner_does_not_wait() {
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = ProcessRunner::new(cancel)
        .output(&SH, ["-c", "sleep 10"], RunOptions::default())
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
}

#[tokio::test]
async fn timeout_kills_child() {
    let err = ProcessRunner::default()
        .output(
            &SH,
            ["-c", "sleep 10"],
            RunOptions::default().with_timeout(Duration::from_millis(50)),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ExecError::TimedOut { .. }));
}
