//! Bounded body capture for cache population.
//!
//! [`CaptureStream`] sits between the upstream body and the client. Chunks
//! pass through untouched while a prefix of at most `max_bytes` is copied
//! aside; the copy is handed to a finalize callback once the body ends or
//! the stream is closed, whichever happens first.

use bytes::{Bytes, BytesMut};
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Callback receiving the captured prefix. Runs at most once.
pub type FinalizeFn = Box<dyn FnOnce(CapturedBody) + Send + 'static>;

/// What a [`CaptureStream`] saw by the time it finalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedBody {
    /// Captured prefix, at most `max_bytes` long (unbounded when 0).
    pub bytes: Bytes,
    /// Total bytes forwarded to the consumer.
    pub total_len: usize,
    /// More bytes were forwarded than captured.
    pub truncated: bool,
    /// The inner stream reached its end without yielding an error.
    pub complete: bool,
}

impl CapturedBody {
    /// The capture holds the entire body.
    pub fn is_whole_body(&self) -> bool {
        self.complete && !self.truncated
    }
}

/// Pass-through stream adapter that captures a bounded body prefix.
///
/// Single-owner: there is no internal locking. Dropping the adapter counts
/// as a close.
pub struct CaptureStream<S> {
    inner: Option<S>,
    buffer: BytesMut,
    max_bytes: usize,
    total_len: usize,
    errored: bool,
    /// The inner stream already returned `None`; it must not be polled again.
    done: bool,
    finalize: Option<FinalizeFn>,
}

impl<S> CaptureStream<S> {
    /// Wrap `inner`, capturing up to `max_bytes` (0 = unbounded).
    pub fn new(inner: S, max_bytes: usize, finalize: FinalizeFn) -> Self {
        Self {
            inner: Some(inner),
            buffer: BytesMut::new(),
            max_bytes,
            total_len: 0,
            errored: false,
            done: false,
            finalize: Some(finalize),
        }
    }

    /// Finalize (if that has not happened yet) and release the inner
    /// stream. Safe to call any number of times.
    pub fn close(&mut self) {
        self.finish(false);
        self.inner = None;
    }

    /// True once the finalize callback has run.
    pub fn is_finalized(&self) -> bool {
        self.finalize.is_none()
    }

    fn capture(&mut self, chunk: &[u8]) {
        self.total_len += chunk.len();
        let room = if self.max_bytes == 0 {
            chunk.len()
        } else {
            self.max_bytes.saturating_sub(self.buffer.len())
        };
        let take = room.min(chunk.len());
        if take > 0 {
            self.buffer.extend_from_slice(&chunk[..take]);
        }
    }

    fn finish(&mut self, reached_end: bool) {
        let Some(finalize) = self.finalize.take() else {
            return;
        };
        let bytes = std::mem::take(&mut self.buffer).freeze();
        let captured = CapturedBody {
            truncated: self.total_len > bytes.len(),
            bytes,
            total_len: self.total_len,
            complete: reached_end && !self.errored,
        };
        finalize(captured);
    }
}

impl<S, E> Stream for CaptureStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    type Item = Result<Bytes, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };
        match Pin::new(inner).poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.capture(&chunk);
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.errored = true;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.done = true;
                this.finish(true);
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match &self.inner {
            Some(inner) if !self.done => inner.size_hint(),
            _ => (0, Some(0)),
        }
    }
}

impl<S> Drop for CaptureStream<S> {
    fn drop(&mut self) {
        self.close();
    }
}
