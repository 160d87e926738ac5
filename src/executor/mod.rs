/*!
 * Executor
 * Bounded calls: configuration, launch, worker side and supervision
 */

pub mod bounded;
pub mod config;
pub mod job;
mod launch;
pub mod worker;

pub use bounded::{call_with_timeout, BoundedExecutor};
pub use config::{timeout_from_secs, BacktraceMode, ExecutorConfig};
pub use job::{Job, JobRegistry, JobRequest, UnknownJob};
pub use launch::LaunchKind;
pub use worker::serve;
