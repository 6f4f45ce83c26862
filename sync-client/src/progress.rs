//! Progress observation for transfers.
//!
//! [`ProgressStream`] wraps any byte stream and reports the cumulative
//! position after every read or write, so transfer progress becomes visible
//! without changing the code that moves the bytes. Higher level events are
//! delivered through a [`ProgressCallback`].

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use sync_types::{Direction, Side};
use tokio::io::{AsyncBufRead, AsyncRead, AsyncSeek, AsyncWrite, ReadBuf};

/// Byte stream decorator that reports its position after every read/write.
///
/// The callback runs after the wrapped operation completes, whether it
/// succeeded or failed; on failure it sees the position from before the
/// failed call. Seeking, flushing, shutdown and buffered reads are forwarded
/// to the wrapped stream.
pub struct ProgressStream<S, F> {
    inner: S,
    position: u64,
    on_progress: F,
}

impl<S, F> ProgressStream<S, F>
where
    F: FnMut(u64),
{
    /// Wrap a stream whose position starts at 0.
    pub fn new(inner: S, on_progress: F) -> Self {
        Self::with_position(inner, 0, on_progress)
    }

    /// Wrap a stream that is already at `position`.
    pub fn with_position(inner: S, position: u64, on_progress: F) -> Self {
        Self {
            inner,
            position,
            on_progress,
        }
    }

    /// Current position of the stream.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Borrow the wrapped stream.
    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    /// Mutably borrow the wrapped stream.
    ///
    /// Bytes moved through this reference are not observed.
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Unwrap the stream.
    pub fn into_inner(self) -> S {
        self.inner
    }

    fn report<T>(&mut self, result: &io::Result<T>, advanced: u64) {
        if result.is_ok() {
            self.position += advanced;
        }
        (self.on_progress)(self.position);
    }
}

impl<S, F> std::fmt::Debug for ProgressStream<S, F>
where
    S: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressStream")
            .field("inner", &self.inner)
            .field("position", &self.position)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Async stream impls
// =============================================================================

impl<S, F> AsyncRead for ProgressStream<S, F>
where
    S: AsyncRead + Unpin,
    F: FnMut(u64) + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(result) => {
                let read = (buf.filled().len() - before) as u64;
                this.report(&result, read);
                Poll::Ready(result)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<S, F> AsyncWrite for ProgressStream<S, F>
where
    S: AsyncWrite + Unpin,
    F: FnMut(u64) + Unpin,
{
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_write(cx, buf) {
            Poll::Ready(result) => {
                let written = *result.as_ref().unwrap_or(&0) as u64;
                this.report(&result, written);
                Poll::Ready(result)
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

impl<S, F> AsyncSeek for ProgressStream<S, F>
where
    S: AsyncSeek + Unpin,
    F: FnMut(u64) + Unpin,
{
    fn start_seek(self: Pin<&mut Self>, position: io::SeekFrom) -> io::Result<()> {
        Pin::new(&mut self.get_mut().inner).start_seek(position)
    }

    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_complete(cx);
        if let Poll::Ready(Ok(position)) = poll {
            this.position = position;
        }
        poll
    }
}

impl<S, F> AsyncBufRead for ProgressStream<S, F>
where
    S: AsyncBufRead + Unpin,
    F: FnMut(u64) + Unpin,
{
    fn poll_fill_buf(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<&[u8]>> {
        Pin::new(&mut self.get_mut().inner).poll_fill_buf(cx)
    }

    fn consume(self: Pin<&mut Self>, amt: usize) {
        let this = self.get_mut();
        Pin::new(&mut this.inner).consume(amt);
        this.position += amt as u64;
        (this.on_progress)(this.position);
    }
}

// =============================================================================
// Blocking stream impls
// =============================================================================

impl<S, F> io::Read for ProgressStream<S, F>
where
    S: io::Read,
    F: FnMut(u64),
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let result = self.inner.read(buf);
        let read = *result.as_ref().unwrap_or(&0) as u64;
        self.report(&result, read);
        result
    }
}

impl<S, F> io::Write for ProgressStream<S, F>
where
    S: io::Write,
    F: FnMut(u64),
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let result = self.inner.write(buf);
        let written = *result.as_ref().unwrap_or(&0) as u64;
        self.report(&result, written);
        result
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<S, F> io::Seek for ProgressStream<S, F>
where
    S: io::Seek,
    F: FnMut(u64),
{
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let position = self.inner.seek(pos)?;
        self.position = position;
        Ok(position)
    }
}

// =============================================================================
// Progress events
// =============================================================================

/// Events emitted while a reconciliation runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// The plan has been computed.
    PlanReady {
        /// Direction of the run.
        direction: Direction,
        /// Files to transfer.
        to_transfer: usize,
        /// Bytes to transfer.
        total_bytes: u64,
        /// Files already in agreement.
        synchronized: usize,
        /// Files present only on the target side.
        orphaned: usize,
    },
    /// Starting to transfer a file.
    FileStarted {
        /// Path key of the file.
        key: String,
        /// Expected size in bytes.
        total_bytes: u64,
    },
    /// Byte position update for the current file.
    FileProgress {
        /// Path key of the file.
        key: String,
        /// Bytes moved so far; never decreases within one file.
        bytes_transferred: u64,
        /// Expected size in bytes.
        total_bytes: u64,
    },
    /// The file was transferred.
    FileCompleted {
        /// Path key of the file.
        key: String,
        /// Bytes moved.
        bytes: u64,
    },
    /// The file could not be transferred; the batch continues.
    FileFailed {
        /// Path key of the file.
        key: String,
        /// Reason.
        error: String,
    },
    /// An orphan was deleted.
    Deleted {
        /// Path key of the file.
        key: String,
        /// Side it was deleted from.
        side: Side,
    },
    /// An orphan could not be deleted; the batch continues.
    DeleteFailed {
        /// Path key of the file.
        key: String,
        /// Side it lives on.
        side: Side,
        /// Reason.
        error: String,
    },
}

/// Callback for progress events.
///
/// Invoked synchronously from the executors; implementations must be cheap.
pub trait ProgressCallback: Send + Sync {
    /// Handle one event.
    fn on_progress(&self, event: ProgressEvent);
}

/// A progress callback that ignores all events.
pub struct NoOpCallback;

impl ProgressCallback for NoOpCallback {
    fn on_progress(&self, _event: ProgressEvent) {}
}

/// A function-based progress callback.
pub struct FnCallback<F>
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    f: F,
}

impl<F> ProgressCallback for FnCallback<F>
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn on_progress(&self, event: ProgressEvent) {
        (self.f)(event)
    }
}

/// Helper to create an Arc-wrapped callback from a closure.
pub fn callback<F>(f: F) -> Arc<dyn ProgressCallback>
where
    F: Fn(ProgressEvent) + Send + Sync + 'static,
{
    Arc::new(FnCallback { f })
}
