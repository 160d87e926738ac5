/*!
 * Process Control
 * Process-table introspection and signalling used by the escalation
 */

use super::types::{Pid, TerminationSignal};
use nix::errno::Errno;
use nix::sys::signal::kill;
use std::io;

/// Seam between the escalation and the operating system
///
/// `SystemProcesses` is the real implementation; tests substitute their
/// own to observe or intercept signals.
#[cfg_attr(test, mockall::automock)]
pub trait ProcessControl {
    /// Transitive children of `root`, excluding `root`
    fn descendants(&self, root: Pid) -> io::Result<Vec<Pid>>;

    /// Deliver `signal` to `pid`. A process that is already gone is not an error.
    fn signal(&self, pid: Pid, signal: TerminationSignal) -> io::Result<()>;

    /// Whether `pid` is still running (exited-but-unreaped counts as dead)
    fn is_alive(&self, pid: Pid) -> bool;
}

/// The host's process table
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcesses;

impl SystemProcesses {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessControl for SystemProcesses {
    #[cfg(target_os = "linux")]
    fn descendants(&self, root: Pid) -> io::Result<Vec<Pid>> {
        let table = super::tree::scan_proc()?;
        Ok(super::tree::descendants_of(&table, root))
    }

    #[cfg(not(target_os = "linux"))]
    fn descendants(&self, root: Pid) -> io::Result<Vec<Pid>> {
        tracing::warn!(%root, "descendant enumeration not supported on this platform");
        Ok(Vec::new())
    }

    fn signal(&self, pid: Pid, signal: TerminationSignal) -> io::Result<()> {
        match kill(pid, signal.as_signal()) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    #[cfg(target_os = "linux")]
    fn is_alive(&self, pid: Pid) -> bool {
        match super::tree::read_stat(pid) {
            Ok(Some(stat)) => stat.is_running(),
            Ok(None) => false,
            Err(_) => answers_signal_zero(pid),
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn is_alive(&self, pid: Pid) -> bool {
        answers_signal_zero(pid)
    }
}

/// Signal 0: true while the pid exists, zombies included
fn answers_signal_zero(pid: Pid) -> bool {
    !matches!(kill(pid, None), Err(Errno::ESRCH))
}
