/*!
 * Worker Launch
 *
 * Two ways to start the single worker of a bounded call:
 * - fork: the closure reaches the worker as a copy of the address space
 * - exec: a serialized job is piped into a fresh worker binary
 */

use super::config::BacktraceMode;
use super::job::JobRequest;
use super::worker;
use crate::core::errors::{ExecError, ExecResult};
use crate::core::limits::MAX_FRAME_SIZE;
use crate::core::serialization::{encode, write_frame, CodecError};
use crate::ipc::{ResultChannel, ResultReceiver};
use crate::process::ProcessHandle;
use nix::sys::signal::{kill, Signal};
use nix::unistd::{fork, getpid, ForkResult};
use parking_lot::Mutex;
use serde::Serialize;
use std::error::Error;
use std::fmt;
use std::io;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;
use tracing::debug;

/// How the worker was started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchKind {
    Fork,
    Exec,
}

impl fmt::Display for LaunchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaunchKind::Fork => f.write_str("fork"),
            LaunchKind::Exec => f.write_str("exec"),
        }
    }
}

/// Serializes worker launches within this process
static LAUNCH_LOCK: Mutex<()> = Mutex::new(());

/// A running worker and the receiving end of its channel
#[derive(Debug)]
pub(crate) struct Launched {
    pub handle: ProcessHandle,
    pub receiver: ResultReceiver,
    pub kind: LaunchKind,
}

/// Fork a worker that runs `target`
///
/// The child runs the closure and leaves through `_exit`; it never returns
/// into the caller's code.
pub(crate) fn fork_worker<F, T, E>(target: F, backtrace: BacktraceMode) -> ExecResult<Launched>
where
    F: FnOnce() -> Result<T, E>,
    T: Serialize,
    E: Into<Box<dyn Error + Send + Sync>>,
{
    // Held until the parent has closed its write end, so no other launch
    // forks a copy of it. The child never releases it; it only exits.
    let launching = LAUNCH_LOCK.lock();
    let (reader, writer) = ResultChannel::open()?.split();
    let parent = getpid();

    match unsafe { fork() } {
        Ok(ForkResult::Child) => {
            drop(reader);
            worker::run_forked(writer, parent, backtrace, target)
        }
        Ok(ForkResult::Parent { child }) => {
            drop(writer);
            drop(launching);
            let mut handle = ProcessHandle::forked(child);
            let receiver = match ResultReceiver::spawn(reader) {
                Ok(receiver) => receiver,
                Err(e) => return Err(abandon(&mut handle, e)),
            };
            Ok(Launched {
                handle,
                receiver,
                kind: LaunchKind::Fork,
            })
        }
        Err(e) => Err(ExecError::Spawn(format!("fork failed: {}", e))),
    }
}

/// Execute `program` as a worker and hand it `request` on stdin
pub(crate) fn exec_worker(program: &Path, request: &JobRequest) -> ExecResult<Launched> {
    let payload = encode(request)?;
    if payload.len() > MAX_FRAME_SIZE {
        return Err(CodecError::FrameTooLarge {
            size: payload.len(),
            limit: MAX_FRAME_SIZE,
        }
        .into());
    }
    let parent = getpid();

    let mut command = Command::new(program);
    command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit());
    unsafe {
        command.pre_exec(move || worker::bind_to_parent(parent));
    }

    let spawned = {
        let _launching = LAUNCH_LOCK.lock();
        command.spawn()
    };
    let mut child =
        spawned.map_err(|e| ExecError::Spawn(format!("{}: {}", program.display(), e)))?;
    let stdin = child.stdin.take();
    let stdout = child.stdout.take();
    let mut handle = ProcessHandle::spawned(child);

    let (mut stdin, stdout) = match (stdin, stdout) {
        (Some(stdin), Some(stdout)) => (stdin, stdout),
        _ => {
            let err = io::Error::other("worker stdio was not captured");
            return Err(abandon(&mut handle, err));
        }
    };

    // Written off-thread so a worker that never reads cannot stall the caller
    // past its timeout. A worker that dies early surfaces as a closed channel.
    let job = request.job.clone();
    let writer = thread::Builder::new()
        .name("bounded-exec-request".to_string())
        .spawn(move || {
            if let Err(e) = write_frame(&mut stdin, &payload) {
                debug!(%job, error = %e, "could not deliver job request");
            }
        });
    if let Err(e) = writer {
        return Err(abandon(&mut handle, e));
    }

    let receiver = match ResultReceiver::spawn(stdout) {
        Ok(receiver) => receiver,
        Err(e) => return Err(abandon(&mut handle, e)),
    };
    Ok(Launched {
        handle,
        receiver,
        kind: LaunchKind::Exec,
    })
}

/// Kill and reap a worker whose launch could not be completed
fn abandon(handle: &mut ProcessHandle, err: io::Error) -> ExecError {
    let pid = handle.pid();
    let _ = kill(pid, Signal::SIGKILL);
    let _ = handle.wait_timeout(Duration::from_secs(1), Duration::from_millis(5));
    ExecError::Spawn(format!("worker {} abandoned: {}", pid, err))
}
