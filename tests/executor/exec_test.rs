/*!
 * Exec Launch Tests
 * Serializable jobs run by the bounded-worker binary
 */

use super::support::{is_alive, read_pid, worker_config, JOIN_TIMEOUT};
use bounded_exec::jobs::{Fail, Join, RunCommand, Sleep, Sum};
use bounded_exec::{BoundedExecutor, ExecError};
use pretty_assertions::assert_eq;
use serial_test::serial;
use std::error::Error;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn executor() -> BoundedExecutor {
    BoundedExecutor::new(worker_config()).unwrap()
}

#[test]
#[serial]
fn test_sum_job() {
    let total = executor()
        .run_job(Duration::from_secs(10), &Sum { values: vec![1, 2, 3] })
        .unwrap();
    assert_eq!(total, 6);
}

#[test]
#[serial]
fn test_join_job() {
    let job = Join {
        separator: ", ".to_string(),
        parts: vec!["alpha".to_string(), "beta".to_string()],
    };
    let joined = executor().run_job(Duration::from_secs(10), &job).unwrap();
    assert_eq!(joined, "alpha, beta");
}

#[test]
#[serial]
fn test_failing_job() {
    let job = Fail {
        message: "x".to_string(),
    };
    let err = executor().run_job(Duration::from_secs(10), &job).unwrap_err();

    let cause = err.job_cause().expect("job error");
    assert_eq!(cause.message, "x");
    assert!(cause.kind.ends_with("JobError"), "kind: {}", cause.kind);
    assert_eq!(err.source().unwrap().to_string(), "x");
}

#[test]
#[serial]
fn test_oversized_output_is_a_codec_failure() {
    // Roughly 69 MiB of output from a 1 MiB request
    let job = Join {
        separator: "x".repeat(1 << 20),
        parts: vec![String::new(); 70],
    };
    let err = executor().run_job(Duration::from_secs(30), &job).unwrap_err();

    let cause = err.job_cause().expect("job error");
    assert!(cause.kind.ends_with("CodecError"), "kind: {}", cause.kind);
}

#[test]
#[serial]
fn test_sleep_job_times_out() {
    let timeout = Duration::from_millis(500);
    let start = Instant::now();

    let err = executor()
        .run_job(timeout, &Sleep { seconds: 5.0 })
        .unwrap_err();

    assert!(err.is_timeout(), "unexpected error: {err}");
    assert!(start.elapsed() < timeout + JOIN_TIMEOUT + Duration::from_millis(500));
    match err {
        ExecError::Timeout { target, .. } => assert_eq!(target, "sleep"),
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
#[serial]
fn test_run_command_exit_code() {
    let job = RunCommand::new("sh").with_args(["-c", "echo noise; exit 42"]);
    let code = executor().run_job(Duration::from_secs(10), &job).unwrap();
    assert_eq!(code, 42);
}

#[test]
#[serial]
fn test_run_command_check_fails() {
    let job = RunCommand::new("false").with_check(true);
    let err = executor().run_job(Duration::from_secs(10), &job).unwrap_err();
    assert!(err.job_cause().is_some(), "unexpected error: {err}");
}

#[test]
#[serial]
fn test_descendant_is_terminated() {
    let dir = TempDir::new().unwrap();
    let pid_file = dir.path().join("child.pid");
    let job = RunCommand::new("sh").with_args([
        "-c",
        "echo $$ > \"$0\"; exec sleep 30",
        pid_file.to_str().unwrap(),
    ]);

    let err = executor()
        .run_job(Duration::from_secs(1), &job)
        .unwrap_err();
    assert!(err.is_timeout(), "unexpected error: {err}");

    let child = read_pid(&pid_file);
    assert!(!is_alive(child), "descendant {child} outlived the call");
}

#[test]
#[serial]
fn test_missing_worker_program() {
    let executor = BoundedExecutor::new(
        worker_config().with_worker_program("/nonexistent/bounded-worker"),
    )
    .unwrap();
    let err = executor
        .run_job(Duration::from_secs(1), &Sum { values: vec![] })
        .unwrap_err();
    assert!(matches!(err, ExecError::Spawn(_)), "unexpected error: {err}");
}
