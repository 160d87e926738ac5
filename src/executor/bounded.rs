/*!
 * Bounded Executor
 * Run a job in a worker process under a hard timeout
 *
 * Every call owns exactly one worker. On timeout the worker and all of its
 * descendants are escalated through SIGTERM and SIGKILL; whatever outlives
 * both signals is reported instead of silently leaking.
 */

use super::config::{timeout_from_secs, ExecutorConfig};
use super::job::{Job, JobRequest};
use super::launch::{self, Launched};
use crate::core::errors::{ExecError, ExecResult};
use crate::core::serialization::decode;
use crate::ipc::{ChannelEvent, Envelope, Received};
use crate::process::{Escalation, ProcessControl, ProcessHandle, ProcessTree, SystemProcesses};
use serde::{de::DeserializeOwned, Serialize};
use std::any::type_name;
use std::error::Error;
use std::time::Duration;
use tracing::{debug, error, instrument, warn};

/// Executes targets in isolated worker processes
#[derive(Debug, Clone)]
pub struct BoundedExecutor<C: ProcessControl = SystemProcesses> {
    config: ExecutorConfig,
    control: C,
}

impl BoundedExecutor {
    /// Executor over the real process table
    pub fn new(config: ExecutorConfig) -> ExecResult<Self> {
        Self::with_control(config, SystemProcesses::new())
    }

    /// Executor configured from `BOUNDED_EXEC_*` environment variables
    pub fn from_env() -> ExecResult<Self> {
        Self::new(ExecutorConfig::from_env()?)
    }
}

impl Default for BoundedExecutor {
    fn default() -> Self {
        Self {
            config: ExecutorConfig::default(),
            control: SystemProcesses::new(),
        }
    }
}

impl<C: ProcessControl> BoundedExecutor<C> {
    /// Executor that signals and inspects processes through `control`
    pub fn with_control(config: ExecutorConfig, control: C) -> ExecResult<Self> {
        config.validate()?;
        Ok(Self { config, control })
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn control(&self) -> &C {
        &self.control
    }

    /// Run `target` in a forked worker and return its value
    ///
    /// The closure runs in a copy of the calling process, so it may capture
    /// anything; only its `Ok` value must be serializable.
    ///
    /// Launches through this crate are serialized, so concurrent calls never
    /// inherit each other's result pipe. A fork made elsewhere in the process
    /// while a launch is in flight can still hold a copy of the write end; a
    /// worker that dies without reporting is then noticed only once that copy
    /// closes, or at the timeout.
    pub fn run<F, T, E>(&self, timeout: Duration, target: F) -> ExecResult<T>
    where
        F: FnOnce() -> Result<T, E>,
        T: Serialize + DeserializeOwned,
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        check_timeout(timeout)?;
        let launched = launch::fork_worker(target, self.config.backtrace)?;
        self.supervise(launched, type_name::<F>(), timeout)
    }

    /// Run a serializable job in the configured worker binary
    pub fn run_job<J: Job>(&self, timeout: Duration, job: &J) -> ExecResult<J::Output> {
        check_timeout(timeout)?;
        let program = self.config.worker_program()?;
        let request = JobRequest::new(job, self.config.backtrace)?;
        let launched = launch::exec_worker(program, &request)?;
        self.supervise(launched, J::NAME, timeout)
    }

    #[instrument(
        level = "debug",
        skip(self, launched),
        fields(pid = %launched.handle.pid(), kind = %launched.kind)
    )]
    fn supervise<T: DeserializeOwned>(
        &self,
        launched: Launched,
        description: &str,
        timeout: Duration,
    ) -> ExecResult<T> {
        let Launched {
            mut handle,
            receiver,
            ..
        } = launched;
        debug!("worker started");

        match receiver.recv_timeout(timeout) {
            Received::Event(ChannelEvent::Frame(frame)) => {
                debug!(bytes = frame.len(), "envelope received");
                self.settle(&mut handle)?;
                match decode::<Envelope<T>>(&frame)? {
                    Envelope::Success(value) => Ok(value),
                    Envelope::Failure(failure) => {
                        debug!(kind = %failure.error.kind, "job failed in worker");
                        Err(ExecError::Job {
                            trace: failure.trace,
                            cause: failure.error,
                        })
                    }
                }
            }
            Received::Event(ChannelEvent::Closed) => {
                self.settle(&mut handle)?;
                let status = handle
                    .status()
                    .map(|status| status.to_string())
                    .unwrap_or_else(|| "status unknown".to_string());
                Err(ExecError::WorkerExited { status })
            }
            Received::Event(ChannelEvent::Failed(e)) => {
                self.settle(&mut handle)?;
                Err(e.into())
            }
            Received::TimedOut => {
                warn!(?timeout, "call timed out");
                if handle.is_running()? {
                    self.terminate(&mut handle)?;
                }
                Err(ExecError::Timeout {
                    target: description.to_string(),
                    timeout,
                })
            }
        }
    }

    /// Give a worker that is done reporting the join timeout to exit
    fn settle(&self, handle: &mut ProcessHandle) -> ExecResult<()> {
        let exited = handle.wait_timeout(self.config.join_timeout, self.config.poll_interval)?;
        if exited.is_some() {
            return Ok(());
        }
        warn!("worker still running after reporting");
        self.terminate(handle)
    }

    /// Escalate over the worker's tree, then reap the worker
    fn terminate(&self, handle: &mut ProcessHandle) -> ExecResult<()> {
        let tree = ProcessTree::snapshot(&self.control, handle.pid());
        let report =
            Escalation::new(&self.control, self.config.join_timeout, self.config.poll_interval)
                .run(tree);
        handle.try_reap()?;

        if report.is_clean() {
            debug!(
                processes = report.tree.len(),
                signals = ?report.signals(),
                "worker tree terminated"
            );
            return Ok(());
        }

        let pids: Vec<i32> = report.survivors().iter().map(|pid| pid.as_raw()).collect();
        error!(survivors = pids.len(), ?pids, "processes survived SIGKILL");
        Err(ExecError::ZombieProcess {
            survivors: pids.len(),
            pids,
        })
    }
}

fn check_timeout(timeout: Duration) -> ExecResult<()> {
    if timeout.is_zero() {
        return Err(ExecError::InvalidConfig(
            "timeout must be positive".to_string(),
        ));
    }
    Ok(())
}

/// Run `target` in a worker process, bounded by `timeout_secs`
///
/// Uses the configuration from the environment. On timeout the worker and
/// its descendants are terminated before `Timeout` is returned.
///
/// ```no_run
/// use bounded_exec::call_with_timeout;
///
/// let total = call_with_timeout(1.0, || Ok::<_, std::io::Error>([1, 2, 3].iter().sum::<i32>()))?;
/// assert_eq!(total, 6);
/// # Ok::<(), bounded_exec::ExecError>(())
/// ```
pub fn call_with_timeout<F, T, E>(timeout_secs: f64, target: F) -> ExecResult<T>
where
    F: FnOnce() -> Result<T, E>,
    T: Serialize + DeserializeOwned,
    E: Into<Box<dyn Error + Send + Sync>>,
{
    let timeout = timeout_from_secs(timeout_secs)?;
    BoundedExecutor::from_env()?.run(timeout, target)
}
