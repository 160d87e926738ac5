/*!
 * Executor Configuration
 *
 * Tunables threaded into every bounded call: how long each escalation
 * phase may wait, how often liveness is polled, whether failures carry a
 * backtrace, and which binary hosts exec-launched jobs.
 */

use crate::core::errors::{ExecError, ExecResult};
use crate::core::limits::{
    DEFAULT_JOIN_TIMEOUT, DEFAULT_POLL_INTERVAL, ENV_BACKTRACE, ENV_JOIN_TIMEOUT,
    ENV_POLL_INTERVAL_MS, ENV_WORKER,
};
use serde::{Deserialize, Serialize};
use std::backtrace::{Backtrace, BacktraceStatus};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// When a failing job captures a stack backtrace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BacktraceMode {
    /// Follow `RUST_BACKTRACE` / `RUST_LIB_BACKTRACE`
    #[default]
    Env,
    Always,
    Never,
}

impl BacktraceMode {
    /// Capture and render a backtrace at the call site, if enabled
    pub fn capture(self) -> Option<String> {
        match self {
            BacktraceMode::Env => {
                let backtrace = Backtrace::capture();
                match backtrace.status() {
                    BacktraceStatus::Captured => Some(backtrace.to_string()),
                    _ => None,
                }
            }
            BacktraceMode::Always => Some(Backtrace::force_capture().to_string()),
            BacktraceMode::Never => None,
        }
    }
}

impl FromStr for BacktraceMode {
    type Err = ExecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "env" => Ok(BacktraceMode::Env),
            "always" | "1" | "full" => Ok(BacktraceMode::Always),
            "never" | "0" => Ok(BacktraceMode::Never),
            other => Err(ExecError::InvalidConfig(format!(
                "unknown backtrace mode '{}' (expected env, always or never)",
                other
            ))),
        }
    }
}

/// Configuration for a `BoundedExecutor`
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorConfig {
    /// Maximum wait after each escalation signal (default: 3s)
    pub join_timeout: Duration,

    /// Liveness poll interval while waiting for exits (default: 10ms)
    pub poll_interval: Duration,

    /// Backtrace capture for failing jobs (default: follow the environment)
    pub backtrace: BacktraceMode,

    /// Worker binary for `run_job` (default: none)
    pub worker_program: Option<PathBuf>,
}

impl ExecutorConfig {
    /// Create default configuration
    pub fn new() -> Self {
        Self {
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            backtrace: BacktraceMode::Env,
            worker_program: None,
        }
    }

    /// Defaults overridden by `BOUNDED_EXEC_*` environment variables
    pub fn from_env() -> ExecResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ExecResult<Self> {
        let mut config = Self::new();

        if let Some(raw) = lookup(ENV_JOIN_TIMEOUT) {
            let secs: f64 = raw.trim().parse().map_err(|_| {
                ExecError::InvalidConfig(format!("{}: not a number: '{}'", ENV_JOIN_TIMEOUT, raw))
            })?;
            config.join_timeout = Duration::try_from_secs_f64(secs).map_err(|_| {
                ExecError::InvalidConfig(format!(
                    "{}: must be a non-negative, representable number of seconds, got {}",
                    ENV_JOIN_TIMEOUT, raw
                ))
            })?;
        }

        if let Some(raw) = lookup(ENV_POLL_INTERVAL_MS) {
            let millis: u64 = raw.trim().parse().map_err(|_| {
                ExecError::InvalidConfig(format!(
                    "{}: not a whole number of milliseconds: '{}'",
                    ENV_POLL_INTERVAL_MS, raw
                ))
            })?;
            config.poll_interval = Duration::from_millis(millis);
        }

        if let Some(raw) = lookup(ENV_BACKTRACE) {
            config.backtrace = raw.parse()?;
        }

        if let Some(raw) = lookup(ENV_WORKER) {
            if !raw.is_empty() {
                config.worker_program = Some(PathBuf::from(raw));
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_backtrace(mut self, mode: BacktraceMode) -> Self {
        self.backtrace = mode;
        self
    }

    pub fn with_worker_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.worker_program = Some(program.into());
        self
    }

    /// Reject settings the executor cannot honour
    pub fn validate(&self) -> ExecResult<()> {
        if self.poll_interval.is_zero() {
            return Err(ExecError::InvalidConfig(
                "poll interval must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Worker binary for exec launch
    pub fn worker_program(&self) -> ExecResult<&Path> {
        self.worker_program.as_deref().ok_or_else(|| {
            ExecError::InvalidConfig(format!(
                "no worker program configured (set {} or use with_worker_program)",
                ENV_WORKER
            ))
        })
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert a caller-supplied timeout in seconds
///
/// Zero, negative, NaN, infinite and unrepresentably large values are
/// rejected.
pub fn timeout_from_secs(secs: f64) -> ExecResult<Duration> {
    match Duration::try_from_secs_f64(secs) {
        Ok(timeout) if !timeout.is_zero() => Ok(timeout),
        _ => Err(ExecError::InvalidConfig(format!(
            "timeout must be a positive number of seconds, got {}",
            secs
        ))),
    }
}
