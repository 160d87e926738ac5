/*!
 * Result Channel
 * One-shot pipe from worker to caller with a timed receive
 *
 * The read end is drained by a short-lived reader thread that reads exactly
 * one frame and hands it over on a bounded flume channel. The caller blocks
 * in `recv_timeout`, which consumes the receiver.
 */

use crate::core::serialization::{read_frame, write_frame, CodecError, CodecResult};
use std::io::{self, PipeReader, PipeWriter, Read, Write};
use std::thread;
use std::time::{Duration, Instant};
use tracing::trace;

/// OS pipe carrying the single result frame
#[derive(Debug)]
pub struct ResultChannel {
    reader: PipeReader,
    writer: PipeWriter,
}

impl ResultChannel {
    /// Open a new pipe (both ends close-on-exec)
    pub fn open() -> io::Result<Self> {
        let (reader, writer) = io::pipe()?;
        Ok(Self { reader, writer })
    }

    pub fn split(self) -> (PipeReader, PipeWriter) {
        (self.reader, self.writer)
    }
}

/// What the reader thread saw on the pipe
#[derive(Debug)]
pub enum ChannelEvent {
    /// One complete frame
    Frame(Vec<u8>),
    /// The write end closed before any frame arrived
    Closed,
    /// Reading failed part-way (truncated, oversized, I/O)
    Failed(CodecError),
}

/// Result of waiting on the channel
#[derive(Debug)]
pub enum Received {
    Event(ChannelEvent),
    TimedOut,
}

/// Caller side of the channel
#[derive(Debug)]
pub struct ResultReceiver {
    rx: flume::Receiver<ChannelEvent>,
}

impl ResultReceiver {
    /// Start the reader thread on `reader`
    pub fn spawn<R: Read + Send + 'static>(mut reader: R) -> io::Result<Self> {
        let (tx, rx) = flume::bounded(1);

        thread::Builder::new()
            .name("bounded-exec-reader".to_string())
            .spawn(move || {
                let event = match read_frame(&mut reader) {
                    Ok(Some(frame)) => ChannelEvent::Frame(frame),
                    Ok(None) => ChannelEvent::Closed,
                    Err(e) => ChannelEvent::Failed(e),
                };
                trace!(?event, "result channel reader finished");
                // The caller may have timed out and dropped the receiver
                let _ = tx.send(event);
            })?;

        Ok(Self { rx })
    }

    /// Wait up to `timeout` for the single event
    ///
    /// Consumes the receiver: a call reads its channel at most once. A
    /// timeout too large to form a deadline waits without one.
    pub fn recv_timeout(self, timeout: Duration) -> Received {
        let received = match Instant::now().checked_add(timeout) {
            Some(deadline) => self.rx.recv_deadline(deadline),
            None => self
                .rx
                .recv()
                .map_err(|_| flume::RecvTimeoutError::Disconnected),
        };
        match received {
            Ok(event) => Received::Event(event),
            Err(flume::RecvTimeoutError::Timeout) => Received::TimedOut,
            // Reader thread died without reporting
            Err(flume::RecvTimeoutError::Disconnected) => Received::Event(ChannelEvent::Closed),
        }
    }
}

/// Write the single result frame
pub fn send_frame<W: Write>(writer: &mut W, payload: &[u8]) -> CodecResult<()> {
    write_frame(writer, payload)
}
