/*!
 * Builtin Jobs
 * Jobs hosted by the `bounded-worker` binary
 */

use crate::executor::{Job, JobRegistry};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::process::{Command, Stdio};
use std::time::Duration;
use thiserror::Error;

/// Failures raised by the builtin jobs
#[derive(Error, Debug)]
pub enum JobError {
    #[error("integer overflow while summing {count} values")]
    Overflow { count: usize },

    #[error("invalid sleep duration: {0} seconds")]
    InvalidDuration(f64),

    /// Raised on request by `Fail`; displays exactly the given message
    #[error("{0}")]
    Requested(String),

    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("'{program}' exited with code {code}")]
    NonZeroExit { program: String, code: i32 },

    #[error("'{program}' was killed by signal {signal}")]
    Signaled { program: String, signal: i32 },
}

/// Sum of integers, failing on overflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sum {
    pub values: Vec<i64>,
}

impl Job for Sum {
    const NAME: &'static str = "sum";
    type Output = i64;
    type Error = JobError;

    fn run(self) -> Result<i64, JobError> {
        let count = self.values.len();
        self.values
            .into_iter()
            .try_fold(0i64, i64::checked_add)
            .ok_or(JobError::Overflow { count })
    }
}

/// Concatenate strings with a separator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Join {
    pub separator: String,
    pub parts: Vec<String>,
}

impl Job for Join {
    const NAME: &'static str = "join";
    type Output = String;
    type Error = Infallible;

    fn run(self) -> Result<String, Infallible> {
        Ok(self.parts.join(&self.separator))
    }
}

/// Block the worker for a while
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sleep {
    pub seconds: f64,
}

impl Job for Sleep {
    const NAME: &'static str = "sleep";
    type Output = ();
    type Error = JobError;

    fn run(self) -> Result<(), JobError> {
        let duration = Duration::try_from_secs_f64(self.seconds)
            .map_err(|_| JobError::InvalidDuration(self.seconds))?;
        std::thread::sleep(duration);
        Ok(())
    }
}

/// Always fail with `message`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fail {
    pub message: String,
}

impl Job for Fail {
    const NAME: &'static str = "fail";
    type Output = ();
    type Error = JobError;

    fn run(self) -> Result<(), JobError> {
        Err(JobError::Requested(self.message))
    }
}

/// Run an external program to completion and return its exit code
///
/// The program becomes a descendant of the worker, so it is covered by the
/// escalation if the call times out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCommand {
    pub program: String,
    pub args: Vec<String>,
    /// Treat a non-zero exit code as a failure
    pub check: bool,
}

impl RunCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            check: false,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_check(mut self, check: bool) -> Self {
        self.check = check;
        self
    }
}

impl Job for RunCommand {
    const NAME: &'static str = "run_command";
    type Output = i32;
    type Error = JobError;

    fn run(self) -> Result<i32, JobError> {
        let status = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .status()
            .map_err(|source| JobError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        match status.code() {
            Some(code) if code != 0 && self.check => Err(JobError::NonZeroExit {
                program: self.program,
                code,
            }),
            Some(code) => Ok(code),
            None => Err(JobError::Signaled {
                program: self.program,
                signal: status.signal().unwrap_or_default(),
            }),
        }
    }
}

impl JobRegistry {
    /// Registry holding every builtin job
    pub fn with_builtins() -> Self {
        Self::new()
            .register::<Sum>()
            .register::<Join>()
            .register::<Sleep>()
            .register::<Fail>()
            .register::<RunCommand>()
    }
}
