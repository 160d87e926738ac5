/*!
 * Fork Launch Tests
 * Closures run in a forked worker
 */

use super::support::{fast_config, JOIN_TIMEOUT};
use bounded_exec::core::limits::MAX_FRAME_SIZE;
use bounded_exec::{BacktraceMode, BoundedExecutor, ExecError};
use pretty_assertions::assert_eq;
use serde::{Deserialize, Serialize, Serializer};
use serial_test::serial;
use std::error::Error;
use std::io;
use std::time::{Duration, Instant};

fn executor() -> BoundedExecutor {
    BoundedExecutor::new(fast_config()).unwrap()
}

#[test]
#[serial]
fn test_returns_value() {
    let values = vec![1i64, 2, 3];
    let total = executor()
        .run(Duration::from_secs(5), move || {
            Ok::<_, io::Error>(values.iter().sum::<i64>())
        })
        .unwrap();
    assert_eq!(total, 6);
}

#[test]
#[serial]
fn test_returns_structured_value() {
    let words = executor()
        .run(Duration::from_secs(5), || {
            Ok::<_, io::Error>(vec![("a".to_string(), 1u8), ("b".to_string(), 2)])
        })
        .unwrap();
    assert_eq!(words, vec![("a".to_string(), 1), ("b".to_string(), 2)]);
}

#[test]
#[serial]
fn test_unbounded_timeout() {
    let value = executor()
        .run(Duration::MAX, || Ok::<_, io::Error>(1))
        .unwrap();
    assert_eq!(value, 1);
}

#[test]
#[serial]
fn test_oversized_value_is_a_codec_failure() {
    let err = executor()
        .run(Duration::from_secs(20), || {
            Ok::<_, io::Error>(vec![0u8; MAX_FRAME_SIZE + 1])
        })
        .unwrap_err();

    let cause = err.job_cause().expect("job error");
    assert!(cause.kind.ends_with("CodecError"), "kind: {}", cause.kind);
}

#[derive(Debug, Deserialize)]
struct Unencodable;

impl Serialize for Unencodable {
    fn serialize<S: Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
        Err(serde::ser::Error::custom("refuses to serialize"))
    }
}

#[test]
#[serial]
fn test_unencodable_value_is_a_codec_failure() {
    let err = executor()
        .run(Duration::from_secs(5), || Ok::<_, io::Error>(Unencodable))
        .unwrap_err();

    let cause = err.job_cause().expect("job error");
    assert!(cause.kind.ends_with("CodecError"), "kind: {}", cause.kind);
    assert!(cause.message.contains("refuses to serialize"));
}

#[test]
#[serial]
fn test_timeout_is_bounded() {
    let timeout = Duration::from_millis(500);
    let start = Instant::now();

    let err = executor()
        .run(timeout, || {
            std::thread::sleep(Duration::from_secs(2));
            Ok::<_, io::Error>(())
        })
        .unwrap_err();

    let elapsed = start.elapsed();
    assert!(err.is_timeout(), "unexpected error: {err}");
    assert!(elapsed >= timeout);
    // SIGTERM ends the sleep well inside the first join window
    assert!(elapsed < timeout + JOIN_TIMEOUT + Duration::from_millis(500));

    match err {
        ExecError::Timeout { target, timeout: t } => {
            assert!(target.contains("fork_test"), "target: {target}");
            assert_eq!(t, timeout);
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
#[serial]
fn test_error_is_propagated_with_cause() {
    let err = executor()
        .run(Duration::from_secs(5), || Err::<(), _>("x".to_string()))
        .unwrap_err();

    let cause = err.job_cause().expect("job error");
    assert_eq!(cause.message, "x");
    assert_eq!(err.source().unwrap().to_string(), "x");
    assert!(err.to_string().contains("x"));
}

#[test]
#[serial]
fn test_typed_error_keeps_source_chain() {
    let err = executor()
        .run(Duration::from_secs(5), || {
            let inner = io::Error::new(io::ErrorKind::NotFound, "config.toml");
            Err::<(), _>(io::Error::other(inner))
        })
        .unwrap_err();

    let cause = err.job_cause().expect("job error");
    assert!(cause.kind.ends_with("io::error::Error"), "kind: {}", cause.kind);
    assert_eq!(cause.message, "config.toml");
}

#[test]
#[serial]
fn test_panic_is_reported() {
    let err = executor()
        .run(Duration::from_secs(5), || -> Result<(), io::Error> {
            panic!("boom at step {}", 3)
        })
        .unwrap_err();

    let cause = err.job_cause().expect("job error");
    assert!(cause.is_panic());
    assert_eq!(cause.message, "boom at step 3");
    assert!(err.to_string().contains("fork_test.rs"), "trace: {err}");
}

#[test]
#[serial]
fn test_backtrace_always_is_attached() {
    let executor =
        BoundedExecutor::new(fast_config().with_backtrace(BacktraceMode::Always)).unwrap();
    let err = executor
        .run(Duration::from_secs(5), || Err::<(), _>("x".to_string()))
        .unwrap_err();
    assert!(err.to_string().contains("Stack backtrace"));
}

#[test]
#[serial]
fn test_worker_exit_without_result() {
    let start = Instant::now();
    let err = executor()
        .run(Duration::from_secs(10), || -> Result<(), io::Error> {
            unsafe { libc::_exit(3) }
        })
        .unwrap_err();

    // Reported as soon as the pipe closes, not after the timeout
    assert!(start.elapsed() < Duration::from_secs(5));
    match err {
        ExecError::WorkerExited { status } => assert_eq!(status, "exit code 3"),
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
#[serial]
fn test_worker_abort() {
    let err = executor()
        .run(Duration::from_secs(10), || -> Result<(), io::Error> {
            std::process::abort()
        })
        .unwrap_err();

    match err {
        ExecError::WorkerExited { status } => assert_eq!(status, "killed by SIGABRT"),
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
#[serial]
fn test_concurrent_calls_do_not_share_pipes() {
    let sleepers: Vec<_> = (0..4)
        .map(|_| {
            std::thread::spawn(|| {
                executor().run(Duration::from_secs(10), || {
                    std::thread::sleep(Duration::from_secs(3));
                    Ok::<_, io::Error>(())
                })
            })
        })
        .collect();

    // A sleeper holding this call's write end would delay the close by seconds
    for _ in 0..10 {
        let start = Instant::now();
        let err = executor()
            .run(Duration::from_secs(10), || -> Result<(), io::Error> {
                unsafe { libc::_exit(3) }
            })
            .unwrap_err();
        assert!(matches!(err, ExecError::WorkerExited { .. }), "unexpected: {err:?}");
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    for sleeper in sleepers {
        sleeper.join().unwrap().unwrap();
    }
}

#[test]
#[serial]
fn test_consecutive_calls_are_independent() {
    let executor = executor();
    for i in 0..5u32 {
        let value = executor
            .run(Duration::from_secs(5), move || Ok::<_, io::Error>(i * 10))
            .unwrap();
        assert_eq!(value, i * 10);
    }
}
