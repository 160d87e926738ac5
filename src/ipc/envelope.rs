/*!
 * Result Envelope
 * Tagged success/failure container carried from the worker to the caller
 */

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;

/// Error kind recorded for a panicking job
pub const PANIC_KIND: &str = "panic";

/// Outcome of one job, written exactly once by the worker
///
/// Bincode encodes the variant index ahead of the fields, so a `Failure`
/// encoded as `Envelope<()>` decodes as `Envelope<T>` for any `T`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Envelope<T> {
    Success(T),
    Failure(WorkerFailure),
}

impl<T> Envelope<T> {
    pub fn into_result(self) -> Result<T, WorkerFailure> {
        match self {
            Envelope::Success(value) => Ok(value),
            Envelope::Failure(failure) => Err(failure),
        }
    }
}

/// A job failure: the error plus the trace captured where it happened
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerFailure {
    pub error: RemoteError,
    pub trace: String,
}

impl WorkerFailure {
    /// Build a failure and render its trace
    ///
    /// `location` is the panic site, if any. `backtrace` is an already
    /// rendered `std::backtrace::Backtrace`.
    pub fn new(error: RemoteError, location: Option<&str>, backtrace: Option<&str>) -> Self {
        let trace = render_trace(&error, location, backtrace);
        Self { error, trace }
    }
}

fn render_trace(error: &RemoteError, location: Option<&str>, backtrace: Option<&str>) -> String {
    let mut trace = format!("{}: {}", error.kind, error.message);

    if !error.chain.is_empty() {
        trace.push_str("\n\nCaused by:");
        for (i, cause) in error.chain.iter().enumerate() {
            trace.push_str(&format!("\n    {}: {}", i, cause));
        }
    }

    if let Some(location) = location {
        trace.push_str(&format!("\n\nat {}", location));
    }

    if let Some(backtrace) = backtrace {
        trace.push_str("\n\nStack backtrace:\n");
        trace.push_str(backtrace);
    }

    trace
}

/// The original error of a failed job, reconstructed on the caller side
///
/// Only the type name, message and cause messages cross the process
/// boundary; the concrete error type does not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    /// Type name of the original error, or `panic`
    pub kind: String,
    pub message: String,
    /// Messages of the original error's `source()` chain, outermost first
    pub chain: Vec<String>,
}

impl RemoteError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            chain: Vec::new(),
        }
    }

    /// Capture an error and its source chain
    pub fn from_error(kind: impl Into<String>, error: &(dyn Error + 'static)) -> Self {
        let mut chain = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            chain.push(cause.to_string());
            source = cause.source();
        }

        Self {
            kind: kind.into(),
            message: error.to_string(),
            chain,
        }
    }

    pub fn panic(message: impl Into<String>) -> Self {
        Self::new(PANIC_KIND, message)
    }

    pub fn is_panic(&self) -> bool {
        self.kind == PANIC_KIND
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error for RemoteError {}
