//! Stream adapters: convert a byte stream into chunks on a bounded queue
//! and back.
//!
//! ```text
//! source ─► ChunkWriter ─► [queue] ─► ... stages ... ─► [queue] ─► ChunkReader ─► destination
//! ```

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::mpsc;

use crate::chunk::Chunk;

/// Create a chunk queue holding up to `capacity` chunks.
///
/// tokio queues cannot be zero-sized, so an unbuffered queue holds a single
/// chunk in flight.
pub fn queue(capacity: usize) -> (mpsc::Sender<Chunk>, mpsc::Receiver<Chunk>) {
    mpsc::channel(capacity.max(1))
}

/// Write half: every write becomes one timestamped chunk.
#[derive(Debug)]
pub struct ChunkWriter {
    output: mpsc::Sender<Chunk>,
}

impl ChunkWriter {
    pub fn new(output: mpsc::Sender<Chunk>) -> Self {
        Self { output }
    }

    /// Copy `buf` into a new chunk and queue it, waiting for room.
    ///
    /// The caller may reuse `buf` as soon as this returns. Fails with
    /// `BrokenPipe` once the reading side is gone.
    pub async fn write(&self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let chunk = Chunk::new(Bytes::copy_from_slice(buf));
        self.output
            .send(chunk)
            .await
            .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))?;
        Ok(buf.len())
    }

    /// Signal end-of-stream to the reader.
    pub fn close(self) {}
}

/// Read half: serves queued chunks as a byte stream.
///
/// Bytes left over from a chunk larger than the caller's buffer are kept for
/// the next read. When a read already has data it only coalesces chunks that
/// are queued right now and never waits for more. Once the queue is closed
/// and drained every read returns 0.
#[derive(Debug)]
pub struct ChunkReader<'a> {
    input: &'a mut mpsc::Receiver<Chunk>,
    interrupt: Option<&'a mut mpsc::Receiver<()>>,
    pending: Bytes,
    eof: bool,
}

impl<'a> ChunkReader<'a> {
    pub fn new(input: &'a mut mpsc::Receiver<Chunk>) -> Self {
        Self {
            input,
            interrupt: None,
            pending: Bytes::new(),
            eof: false,
        }
    }

    /// A reader whose blocking waits can be abandoned through `interrupt`.
    ///
    /// An interrupted read fails with `ErrorKind::Interrupted` and consumes
    /// no data. It only happens while nothing is buffered, so dropping the
    /// reader afterwards loses nothing.
    pub fn with_interrupt(
        input: &'a mut mpsc::Receiver<Chunk>,
        interrupt: &'a mut mpsc::Receiver<()>,
    ) -> Self {
        Self {
            interrupt: Some(interrupt),
            ..Self::new(input)
        }
    }
}

impl AsyncRead for ChunkReader<'_> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let mut filled = false;

        loop {
            if buf.remaining() == 0 {
                return Poll::Ready(Ok(()));
            }

            if !this.pending.is_empty() {
                let n = buf.remaining().min(this.pending.len());
                buf.put_slice(&this.pending.split_to(n));
                filled = true;
                continue;
            }

            if this.eof {
                return Poll::Ready(Ok(()));
            }

            if !filled {
                if let Some(interrupt) = this.interrupt.as_mut() {
                    if interrupt.poll_recv(cx).is_ready() {
                        return Poll::Ready(Err(io::ErrorKind::Interrupted.into()));
                    }
                }
            }

            match this.input.poll_recv(cx) {
                Poll::Ready(Some(chunk)) => this.pending = chunk.data,
                Poll::Ready(None) => {
                    this.eof = true;
                    return Poll::Ready(Ok(()));
                }
                Poll::Pending if filled => return Poll::Ready(Ok(())),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
