/*!
 * Process Types
 * Signals used by the escalation and worker exit statuses
 */

use nix::sys::signal::Signal;
use nix::sys::wait::WaitStatus;
use std::fmt;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;

pub use nix::unistd::Pid;

/// Signals applied to a non-responsive process tree, in escalation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminationSignal {
    /// SIGTERM: lets well-behaved processes run cleanup handlers
    Terminate,
    /// SIGKILL: cannot be trapped or ignored
    Kill,
}

impl TerminationSignal {
    /// Graceful first, forceful second
    pub const ESCALATION: [TerminationSignal; 2] =
        [TerminationSignal::Terminate, TerminationSignal::Kill];

    pub fn as_signal(self) -> Signal {
        match self {
            TerminationSignal::Terminate => Signal::SIGTERM,
            TerminationSignal::Kill => Signal::SIGKILL,
        }
    }
}

impl fmt::Display for TerminationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_signal().as_str())
    }
}

/// How a worker process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    /// Exited with a status code
    Exited(i32),
    /// Killed by a signal (raw signal number)
    Signaled(i32),
    /// Reaped elsewhere; status unavailable
    Unknown,
}

impl WorkerStatus {
    /// Convert a `waitpid` result; `None` while the process is still running
    pub fn from_wait(status: WaitStatus) -> Option<Self> {
        match status {
            WaitStatus::Exited(_, code) => Some(WorkerStatus::Exited(code)),
            WaitStatus::Signaled(_, signal, _) => Some(WorkerStatus::Signaled(signal as i32)),
            _ => None,
        }
    }

    pub fn from_exit_status(status: ExitStatus) -> Self {
        match (status.code(), status.signal()) {
            (Some(code), _) => WorkerStatus::Exited(code),
            (None, Some(signal)) => WorkerStatus::Signaled(signal),
            (None, None) => WorkerStatus::Unknown,
        }
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerStatus::Exited(code) => write!(f, "exit code {}", code),
            WorkerStatus::Signaled(raw) => match Signal::try_from(*raw) {
                Ok(signal) => write!(f, "killed by {}", signal.as_str()),
                Err(_) => write!(f, "killed by signal {}", raw),
            },
            WorkerStatus::Unknown => f.write_str("unknown status"),
        }
    }
}
