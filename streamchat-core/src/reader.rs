//! Stream reader: reassembles a chunked byte stream into frame lines, then
//! into decoded [`StreamEvent`]s.
//!
//! Chunk boundaries are arbitrary; a trailing partial line is buffered until
//! more bytes arrive and flushed once the underlying stream completes. The
//! event stream fuses immediately after a terminal event, discarding any
//! bytes still buffered or unread. Dropping it releases the underlying
//! transfer.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::stream::Stream;

use crate::error::CoreResult;
use crate::event::{decode_frame, StreamEvent};

/// One line-delimited unit of the streamed response (already split on `\n`).
#[derive(Debug, Clone)]
pub struct FrameLine {
    pub line: String,
}

/// A boxed stream of fallible byte chunks, as produced by the HTTP layer.
pub type ByteStream = futures::stream::BoxStream<'static, CoreResult<bytes::Bytes>>;

/// A boxed stream of `FrameLine` results.
pub type FrameStream = futures::stream::BoxStream<'static, CoreResult<FrameLine>>;

/// Internal line splitter over a bytes stream; yields `FrameLine`s separated by '\n'.
pub struct LineStream {
    inner: ByteStream,
    buf: String,
    flushed_tail: bool,
}

impl LineStream {
    pub fn new(inner: ByteStream) -> Self {
        Self {
            inner,
            buf: String::new(),
            flushed_tail: false,
        }
    }
}

impl Stream for LineStream {
    type Item = CoreResult<FrameLine>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            // If we already have a newline in the buffer, split and yield immediately.
            if let Some(idx) = self.buf.find('\n') {
                let mut line = self.buf.drain(..=idx).collect::<String>();
                if line.ends_with('\n') {
                    if line.ends_with("\r\n") {
                        line.truncate(line.len() - 2);
                    } else {
                        line.truncate(line.len() - 1);
                    }
                }
                return Poll::Ready(Some(Ok(FrameLine { line })));
            }

            // Otherwise, poll the inner stream for more bytes
            match self.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    let s = String::from_utf8_lossy(&chunk);
                    self.buf.push_str(&s);
                    continue;
                }
                Poll::Ready(Some(Err(e))) => {
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    if !self.flushed_tail && !self.buf.is_empty() {
                        self.flushed_tail = true;
                        let line = std::mem::take(&mut self.buf);
                        return Poll::Ready(Some(Ok(FrameLine { line })));
                    } else {
                        return Poll::Ready(None);
                    }
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Decoded event sequence over a frame stream.
///
/// Frames without the `data: ` marker are dropped. Malformed event payloads
/// are logged and skipped — a single bad record never loses the rest of the
/// reply. The stream ends when the transport completes, and immediately
/// after yielding `Done` or a transport error.
pub struct EventStream {
    frames: FrameStream,
    done: bool,
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

impl EventStream {
    pub fn new(frames: FrameStream) -> Self {
        Self {
            frames,
            done: false,
        }
    }

    /// Build an event stream directly over raw byte chunks.
    pub fn from_bytes(bytes: ByteStream) -> Self {
        Self::new(Box::pin(LineStream::new(bytes)))
    }
}

impl Stream for EventStream {
    type Item = CoreResult<StreamEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }
        loop {
            match self.frames.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(frame))) => match decode_frame(&frame.line) {
                    None => continue,
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "skipping malformed event record");
                        continue;
                    }
                    Some(Ok(event)) => {
                        if event.is_terminal() {
                            self.done = true;
                        }
                        return Poll::Ready(Some(Ok(event)));
                    }
                },
                Poll::Ready(Some(Err(e))) => {
                    self.done = true;
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    self.done = true;
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
