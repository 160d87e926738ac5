/*!
 * Serializable Jobs
 *
 * A `Job` is a unit of work that can cross the process boundary: it is
 * encoded by the caller, decoded by a worker binary and looked up there by
 * name in a `JobRegistry`.
 */

use super::config::BacktraceMode;
use super::worker;
use crate::core::serialization::{decode, encode, CodecError, CodecResult};
use crate::ipc::Envelope;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::any::type_name;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;

/// A unit of work executable by an exec-launched worker
pub trait Job: Serialize + DeserializeOwned {
    /// Registry key; must be unique within a worker binary
    const NAME: &'static str;

    type Output: Serialize + DeserializeOwned;

    type Error: Into<Box<dyn Error + Send + Sync>>;

    fn run(self) -> Result<Self::Output, Self::Error>;
}

/// Frame sent to an exec worker on stdin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    pub job: String,
    pub backtrace: BacktraceMode,
    /// The bincode-encoded job
    pub payload: Vec<u8>,
}

impl JobRequest {
    pub fn new<J: Job>(job: &J, backtrace: BacktraceMode) -> CodecResult<Self> {
        Ok(Self {
            job: J::NAME.to_string(),
            backtrace,
            payload: encode(job)?,
        })
    }
}

/// Raised inside the worker when a request names no registered job
#[derive(Debug, thiserror::Error)]
#[error("no job named '{name}' is registered (known: {known})")]
pub struct UnknownJob {
    pub name: String,
    pub known: String,
}

type Handler = Box<dyn Fn(&[u8], BacktraceMode) -> CodecResult<Vec<u8>> + Send + Sync>;

/// Jobs a worker binary knows how to run, keyed by `Job::NAME`
#[derive(Default)]
pub struct JobRegistry {
    handlers: HashMap<&'static str, Handler>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job type (later registrations replace earlier ones)
    pub fn register<J: Job + 'static>(mut self) -> Self {
        let handler: Handler = Box::new(|payload, mode| {
            let envelope: Envelope<J::Output> = match decode::<J>(payload) {
                Ok(job) => worker::capture(mode, move || job.run()),
                Err(e) => worker::failure(type_name::<CodecError>(), &e),
            };
            worker::encode_envelope(&envelope)
        });
        self.handlers.insert(J::NAME, handler);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered job names, sorted
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Run the requested job and return its encoded envelope
    ///
    /// Unknown names and undecodable payloads become failure envelopes.
    pub fn dispatch(&self, request: &JobRequest) -> CodecResult<Vec<u8>> {
        match self.handlers.get(request.job.as_str()) {
            Some(handler) => handler(&request.payload, request.backtrace),
            None => {
                let err = UnknownJob {
                    name: request.job.clone(),
                    known: self.names().join(", "),
                };
                encode(&worker::failure::<()>(type_name::<UnknownJob>(), &err))
            }
        }
    }
}

impl fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRegistry")
            .field("jobs", &self.names())
            .finish()
    }
}
