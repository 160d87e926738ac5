/*!
 * Process Handle
 * Exclusive owner of the worker process and its exit status
 */

use super::types::{Pid, WorkerStatus};
use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitPidFlag};
use std::io;
use std::process::Child;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug)]
enum Worker {
    /// Forked copy of the caller
    Forked(Pid),
    /// Executed worker binary
    Spawned(Child),
}

/// Handle to the worker of one bounded call
///
/// The handle is the only place the worker is reaped. Dropping it performs
/// a final non-blocking reap so an exited worker never lingers as a zombie.
#[derive(Debug)]
pub struct ProcessHandle {
    worker: Worker,
    status: Option<WorkerStatus>,
}

impl ProcessHandle {
    pub fn forked(pid: Pid) -> Self {
        Self {
            worker: Worker::Forked(pid),
            status: None,
        }
    }

    pub fn spawned(child: Child) -> Self {
        Self {
            worker: Worker::Spawned(child),
            status: None,
        }
    }

    /// OS pid of the worker
    pub fn pid(&self) -> Pid {
        match &self.worker {
            Worker::Forked(pid) => *pid,
            Worker::Spawned(child) => Pid::from_raw(child.id() as i32),
        }
    }

    /// Exit status, once reaped
    pub fn status(&self) -> Option<WorkerStatus> {
        self.status
    }

    /// Reap the worker if it has exited, without blocking
    pub fn try_reap(&mut self) -> io::Result<Option<WorkerStatus>> {
        if self.status.is_some() {
            return Ok(self.status);
        }

        let status = match &mut self.worker {
            Worker::Forked(pid) => match waitpid(*pid, Some(WaitPidFlag::WNOHANG)) {
                Ok(status) => WorkerStatus::from_wait(status),
                // Already reaped by someone else
                Err(Errno::ECHILD) => Some(WorkerStatus::Unknown),
                Err(Errno::EINTR) => None,
                Err(e) => return Err(e.into()),
            },
            Worker::Spawned(child) => child.try_wait()?.map(WorkerStatus::from_exit_status),
        };

        if let Some(status) = status {
            debug!(pid = %self.pid(), %status, "worker reaped");
            self.status = Some(status);
        }
        Ok(status)
    }

    /// Whether the worker is still running
    pub fn is_running(&mut self) -> io::Result<bool> {
        Ok(self.try_reap()?.is_none())
    }

    /// Poll until the worker exits or `timeout` elapses
    ///
    /// A timeout too large to form a deadline polls until exit.
    pub fn wait_timeout(
        &mut self,
        timeout: Duration,
        poll_interval: Duration,
    ) -> io::Result<Option<WorkerStatus>> {
        let deadline = Instant::now().checked_add(timeout);
        loop {
            if let Some(status) = self.try_reap()? {
                return Ok(Some(status));
            }
            let pause = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(None);
                    }
                    poll_interval.min(deadline - now)
                }
                None => poll_interval,
            };
            std::thread::sleep(pause);
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if self.status.is_none() {
            let _ = self.try_reap();
        }
    }
}
