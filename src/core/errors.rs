/*!
 * Error Types
 * Centralized error handling with thiserror and miette
 */

use crate::core::serialization::CodecError;
use crate::ipc::RemoteError;
use miette::Diagnostic;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type for bounded execution
pub type ExecResult<T> = Result<T, ExecError>;

/// Errors surfaced by a bounded call
#[derive(Error, Debug, Diagnostic)]
pub enum ExecError {
    #[error("call to {target} did not complete in {timeout:?}")]
    #[diagnostic(
        code(exec::timeout),
        help("The worker and its descendants were terminated. Raise the timeout if the job is expected to run longer.")
    )]
    Timeout { target: String, timeout: Duration },

    /// The job failed inside the worker. Displays the captured trace;
    /// the original error is the `source()`.
    #[error("{trace}")]
    #[diagnostic(code(exec::job_failed))]
    Job {
        trace: String,
        #[source]
        cause: RemoteError,
    },

    #[error("processes still alive: {survivors}")]
    #[diagnostic(
        code(exec::zombie_process),
        help("Processes survived both SIGTERM and SIGKILL. They may be in uninterruptible sleep or owned by another user.")
    )]
    ZombieProcess { survivors: usize, pids: Vec<i32> },

    #[error("worker exited without reporting a result ({status})")]
    #[diagnostic(
        code(exec::worker_exited),
        help("The worker crashed, aborted or was killed externally before writing its result.")
    )]
    WorkerExited { status: String },

    #[error("Serialization error: {0}")]
    #[diagnostic(
        code(exec::serialization),
        help("Job, arguments and result must round-trip through bincode.")
    )]
    Serialization(#[from] CodecError),

    #[error("Failed to spawn worker: {0}")]
    #[diagnostic(
        code(exec::spawn_failed),
        help("Check process limits and the configured worker program.")
    )]
    Spawn(String),

    #[error("Invalid configuration: {0}")]
    #[diagnostic(code(exec::invalid_config))]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    #[diagnostic(code(exec::io))]
    Io(#[from] io::Error),
}

impl From<nix::Error> for ExecError {
    fn from(err: nix::Error) -> Self {
        ExecError::Io(io::Error::from(err))
    }
}

impl ExecError {
    /// Whether the call ran out of time
    pub fn is_timeout(&self) -> bool {
        matches!(self, ExecError::Timeout { .. })
    }

    /// Whether processes survived the escalation
    pub fn is_zombie(&self) -> bool {
        matches!(self, ExecError::ZombieProcess { .. })
    }

    /// The original job failure, if this is a job error
    pub fn job_cause(&self) -> Option<&RemoteError> {
        match self {
            ExecError::Job { cause, .. } => Some(cause),
            _ => None,
        }
    }
}
