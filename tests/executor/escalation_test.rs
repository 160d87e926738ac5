/*!
 * Escalation Tests
 * Terminate/kill ordering, zombie detection and descendant cleanup
 */

use super::support::{
    fast_config, is_alive, kill_and_reap, read_pid, worker_config, RecordingControl, JOIN_TIMEOUT,
};
use bounded_exec::jobs::RunCommand;
use bounded_exec::{BoundedExecutor, ExecError, TerminationSignal};
use nix::sys::signal::{signal, SigHandler, Signal};
use nix::unistd::Pid;
use pretty_assertions::assert_eq;
use serial_test::serial;
use std::io;
use std::process::Command;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn ignore_sigterm() {
    unsafe {
        let _ = signal(Signal::SIGTERM, SigHandler::SigIgn);
    }
}

#[test]
#[serial]
fn test_ignored_terminate_is_followed_by_kill() {
    let executor = BoundedExecutor::with_control(fast_config(), RecordingControl::new()).unwrap();
    let timeout = Duration::from_millis(300);
    let start = Instant::now();

    let err = executor
        .run(timeout, || -> Result<(), io::Error> {
            ignore_sigterm();
            loop {
                std::thread::sleep(Duration::from_millis(50));
            }
        })
        .unwrap_err();

    assert!(err.is_timeout(), "unexpected error: {err}");
    // A full join window separates SIGTERM from SIGKILL
    assert!(start.elapsed() >= timeout + JOIN_TIMEOUT);

    let sent = executor.control().sent();
    let worker = sent[0].0;
    assert_eq!(
        executor.control().signals_to(worker),
        vec![TerminationSignal::Terminate, TerminationSignal::Kill]
    );
    assert!(!is_alive(worker));
}

#[test]
#[serial]
fn test_cooperative_worker_gets_terminate_only() {
    let executor = BoundedExecutor::with_control(fast_config(), RecordingControl::new()).unwrap();

    let err = executor
        .run(Duration::from_millis(200), || -> Result<(), io::Error> {
            std::thread::sleep(Duration::from_secs(10));
            Ok(())
        })
        .unwrap_err();

    assert!(err.is_timeout());
    let signals: Vec<_> = executor.control().sent().into_iter().map(|(_, s)| s).collect();
    assert_eq!(signals, vec![TerminationSignal::Terminate]);
}

#[test]
#[serial]
fn test_surviving_worker_is_reported_as_zombie() {
    let executor =
        BoundedExecutor::with_control(fast_config(), RecordingControl::swallowing_kill()).unwrap();
    let start = Instant::now();

    let err = executor
        .run(Duration::from_millis(200), || -> Result<(), io::Error> {
            ignore_sigterm();
            loop {
                std::thread::sleep(Duration::from_millis(50));
            }
        })
        .unwrap_err();

    // Zombie takes precedence over the timeout, and nothing hangs
    assert!(start.elapsed() < Duration::from_secs(5));
    let pids = match err {
        ExecError::ZombieProcess { survivors, pids } => {
            assert_eq!(survivors, 1);
            pids
        }
        other => panic!("unexpected: {other:?}"),
    };

    let worker = Pid::from_raw(pids[0]);
    assert!(is_alive(worker));
    kill_and_reap(worker);
}

#[test]
#[serial]
fn test_forked_descendant_is_terminated() {
    let dir = TempDir::new().unwrap();
    let pid_file = dir.path().join("child.pid");
    let path = pid_file.clone();
    let executor = BoundedExecutor::new(fast_config()).unwrap();

    let err = executor
        .run(Duration::from_secs(1), move || -> Result<(), io::Error> {
            Command::new("sh")
                .arg("-c")
                .arg("echo $$ > \"$0\"; exec sleep 30")
                .arg(&path)
                .spawn()?;
            loop {
                std::thread::sleep(Duration::from_millis(50));
            }
        })
        .unwrap_err();

    assert!(err.is_timeout(), "unexpected error: {err}");
    let child = read_pid(&pid_file);
    assert!(!is_alive(child), "descendant {child} outlived the call");
}

#[test]
#[serial]
fn test_surviving_descendant_is_reported_as_zombie() {
    let executor =
        BoundedExecutor::with_control(worker_config(), RecordingControl::swallowing_kill())
            .unwrap();
    let job = RunCommand::new("sh").with_args(["-c", "trap '' TERM; while :; do :; done"]);

    let err = executor
        .run_job(Duration::from_secs(1), &job)
        .unwrap_err();

    let pids = match err {
        ExecError::ZombieProcess { survivors, pids } => {
            assert_eq!(survivors, 1);
            pids
        }
        other => panic!("unexpected: {other:?}"),
    };

    // The worker binary obeyed SIGTERM; only the shell survived
    let shell = Pid::from_raw(pids[0]);
    assert!(is_alive(shell));
    kill_and_reap(shell);
}
