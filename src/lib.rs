/*!
 * Bounded Exec Library
 * Run work in an isolated process under a hard timeout
 *
 * A call spawns exactly one worker process, waits up to the timeout for a
 * single result envelope, and on expiry terminates the worker together with
 * every descendant (SIGTERM, then SIGKILL). Processes that survive both
 * signals are reported as `ExecError::ZombieProcess`.
 *
 * Two ways to describe the work:
 * - a closure, run in a forked copy of the caller (`BoundedExecutor::run`,
 *   `call_with_timeout`)
 * - a serializable `Job`, run by the `bounded-worker` binary
 *   (`BoundedExecutor::run_job`)
 */

pub mod core;
pub mod executor;
pub mod ipc;
pub mod jobs;
pub mod monitoring;
pub mod process;

// Re-exports
pub use crate::core::{CodecError, ExecError, ExecResult};
pub use crate::executor::{
    call_with_timeout, serve, BacktraceMode, BoundedExecutor, ExecutorConfig, Job, JobRegistry,
    JobRequest,
};
pub use crate::ipc::RemoteError;
pub use crate::monitoring::init_tracing;
pub use crate::process::{ProcessControl, SystemProcesses, TerminationSignal};
