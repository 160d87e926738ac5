/*!
 * Shared helpers for executor tests
 */

use bounded_exec::{BacktraceMode, ExecutorConfig, ProcessControl, SystemProcesses, TerminationSignal};
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::waitpid;
use nix::unistd::Pid;
use std::io;
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub const JOIN_TIMEOUT: Duration = Duration::from_millis(300);

/// Short join timeout and fast polling
pub fn fast_config() -> ExecutorConfig {
    ExecutorConfig::new()
        .with_join_timeout(JOIN_TIMEOUT)
        .with_poll_interval(Duration::from_millis(5))
        .with_backtrace(BacktraceMode::Never)
}

/// `fast_config` plus the worker binary built for this test run
pub fn worker_config() -> ExecutorConfig {
    fast_config().with_worker_program(env!("CARGO_BIN_EXE_bounded-worker"))
}

/// Wait for a descendant to write its pid into `path`
pub fn read_pid(path: &Path) -> Pid {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Ok(raw) = std::fs::read_to_string(path) {
            if let Ok(pid) = raw.trim().parse::<i32>() {
                return Pid::from_raw(pid);
            }
        }
        assert!(Instant::now() < deadline, "no pid written to {}", path.display());
        std::thread::sleep(Duration::from_millis(10));
    }
}

pub fn is_alive(pid: Pid) -> bool {
    SystemProcesses::new().is_alive(pid)
}

/// SIGKILL a leftover process; reap it too if it is our child
pub fn kill_and_reap(pid: Pid) {
    let _ = kill(pid, Signal::SIGKILL);
    let _ = waitpid(pid, None);
}

/// Real process control that records every signal, optionally swallowing SIGKILL
#[derive(Debug, Default)]
pub struct RecordingControl {
    inner: SystemProcesses,
    swallow_kill: bool,
    sent: Mutex<Vec<(Pid, TerminationSignal)>>,
}

impl RecordingControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn swallowing_kill() -> Self {
        Self {
            swallow_kill: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<(Pid, TerminationSignal)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn signals_to(&self, pid: Pid) -> Vec<TerminationSignal> {
        self.sent()
            .into_iter()
            .filter(|(target, _)| *target == pid)
            .map(|(_, signal)| signal)
            .collect()
    }
}

impl ProcessControl for RecordingControl {
    fn descendants(&self, root: Pid) -> io::Result<Vec<Pid>> {
        self.inner.descendants(root)
    }

    fn signal(&self, pid: Pid, signal: TerminationSignal) -> io::Result<()> {
        self.sent.lock().unwrap().push((pid, signal));
        if self.swallow_kill && signal == TerminationSignal::Kill {
            return Ok(());
        }
        self.inner.signal(pid, signal)
    }

    fn is_alive(&self, pid: Pid) -> bool {
        self.inner.is_alive(pid)
    }
}
