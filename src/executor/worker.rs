/*!
 * Worker Side
 *
 * Everything that runs inside the worker process: invoking the target,
 * turning its outcome (value, error or panic) into an envelope, and
 * writing that envelope as the single frame on the result channel.
 */

use super::config::BacktraceMode;
use super::job::{JobRegistry, JobRequest};
use crate::core::errors::{ExecError, ExecResult};
use crate::core::limits::{EXIT_OK, EXIT_REPORT_FAILED, FRAME_HEADER_SIZE, MAX_FRAME_SIZE};
use crate::core::serialization::{decode, encode, read_frame, CodecError, CodecResult};
use crate::ipc::{send_frame, Envelope, RemoteError, WorkerFailure};
use crate::process::Pid;
use serde::Serialize;
use std::any::{type_name, Any};
use std::cell::RefCell;
use std::error::Error;
use std::fs::File;
use std::io::{self, PipeWriter, Write};
use std::os::fd::AsFd;
use std::panic::{self, AssertUnwindSafe};
use tracing::debug;

/// Where and how the last panic on this thread happened
struct PanicRecord {
    location: Option<String>,
    backtrace: Option<String>,
}

thread_local! {
    static LAST_PANIC: RefCell<Option<PanicRecord>> = const { RefCell::new(None) };
}

/// Record panic location and backtrace for the failure envelope
///
/// Only installed inside worker processes; the caller's hook is untouched.
pub fn install_panic_hook(mode: BacktraceMode) {
    panic::set_hook(Box::new(move |info| {
        let record = PanicRecord {
            location: info.location().map(|l| l.to_string()),
            backtrace: mode.capture(),
        };
        LAST_PANIC.with(|slot| *slot.borrow_mut() = Some(record));
    }));
}

/// Run `target` and wrap whatever happens in an envelope
pub fn capture<F, T, E>(mode: BacktraceMode, target: F) -> Envelope<T>
where
    F: FnOnce() -> Result<T, E>,
    E: Into<Box<dyn Error + Send + Sync>>,
{
    match panic::catch_unwind(AssertUnwindSafe(target)) {
        Ok(Ok(value)) => Envelope::Success(value),
        Ok(Err(err)) => {
            let kind = type_name::<E>();
            let boxed: Box<dyn Error + Send + Sync> = err.into();
            let error = RemoteError::from_error(kind, &*boxed);
            let backtrace = mode.capture();
            Envelope::Failure(WorkerFailure::new(error, None, backtrace.as_deref()))
        }
        Err(payload) => {
            let record = LAST_PANIC.with(|slot| slot.borrow_mut().take());
            let (location, backtrace) = match record {
                Some(record) => (record.location, record.backtrace),
                None => (None, None),
            };
            Envelope::Failure(WorkerFailure::new(
                RemoteError::panic(panic_message(payload.as_ref())),
                location.as_deref(),
                backtrace.as_deref(),
            ))
        }
    }
}

/// Failure envelope for errors raised by the worker machinery itself
pub fn failure<T>(kind: &str, error: &(dyn Error + 'static)) -> Envelope<T> {
    Envelope::Failure(WorkerFailure::new(
        RemoteError::from_error(kind, error),
        None,
        None,
    ))
}

/// Encode an envelope, reporting an unencodable value as a failure instead
///
/// A value whose encoding exceeds the frame limit is unencodable too.
pub fn encode_envelope<T: Serialize>(envelope: &Envelope<T>) -> CodecResult<Vec<u8>> {
    let err = match encode(envelope) {
        Ok(bytes) if bytes.len() <= MAX_FRAME_SIZE => return Ok(bytes),
        Ok(bytes) => CodecError::FrameTooLarge {
            size: bytes.len(),
            limit: MAX_FRAME_SIZE,
        },
        Err(e) => e,
    };
    encode(&failure::<()>(type_name::<CodecError>(), &err))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}

// ============================================================================
// Forked worker
// ============================================================================

/// Body of a forked worker; never returns
///
/// Leaves through `_exit` so the caller's atexit handlers and buffered
/// output are not run a second time in the copy.
pub(crate) fn run_forked<F, T, E>(
    mut writer: PipeWriter,
    parent: Pid,
    mode: BacktraceMode,
    target: F,
) -> !
where
    F: FnOnce() -> Result<T, E>,
    T: Serialize,
    E: Into<Box<dyn Error + Send + Sync>>,
{
    if bind_to_parent(parent).is_err() {
        unsafe { libc::_exit(EXIT_REPORT_FAILED) }
    }
    install_panic_hook(mode);

    let envelope = capture(mode, target);
    let code = match encode_envelope(&envelope).and_then(|bytes| send_frame(&mut writer, &bytes)) {
        Ok(()) => EXIT_OK,
        Err(_) => EXIT_REPORT_FAILED,
    };
    drop(writer);

    unsafe { libc::_exit(code) }
}

/// Die with the caller: SIGKILL on parent death (Linux)
///
/// Async-signal-safe; also used between fork and exec.
pub(crate) fn bind_to_parent(parent: Pid) -> io::Result<()> {
    #[cfg(target_os = "linux")]
    {
        let rc = unsafe { libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL as libc::c_ulong) };
        if rc == -1 {
            return Err(io::Error::last_os_error());
        }
    }
    // The parent may already be gone before the death signal was armed
    if nix::unistd::getppid() != parent {
        return Err(io::Error::new(
            io::ErrorKind::BrokenPipe,
            "caller exited before worker started",
        ));
    }
    Ok(())
}

// ============================================================================
// Exec worker
// ============================================================================

/// Serve one job request: the entry point of the worker binary
///
/// Reads a framed `JobRequest` from stdin and writes one framed envelope to
/// stdout. File descriptor 1 is pointed at stderr while the job runs so
/// that anything the job prints cannot corrupt the result stream.
pub fn serve(registry: &JobRegistry) -> ExecResult<()> {
    let frame = read_frame(&mut io::stdin().lock())?.ok_or(CodecError::Truncated {
        expected: FRAME_HEADER_SIZE,
        actual: 0,
    })?;
    let request: JobRequest = decode(&frame)?;

    let mut report = redirect_stdout()?;
    install_panic_hook(request.backtrace);

    debug!(job = %request.job, payload_bytes = request.payload.len(), "serving job");
    let bytes = registry.dispatch(&request)?;
    send_frame(&mut report, &bytes).map_err(ExecError::from)
}

/// Duplicate stdout for the report and point fd 1 at stderr
fn redirect_stdout() -> io::Result<File> {
    let stdout = io::stdout();
    stdout.lock().flush()?;
    let saved = stdout.as_fd().try_clone_to_owned()?;

    if unsafe { libc::dup2(libc::STDERR_FILENO, libc::STDOUT_FILENO) } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(File::from(saved))
}
