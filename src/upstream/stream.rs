//! Response body streams
//!
//! - [`frame_sse_lines`] re-frames an event-stream body so every non-empty
//!   upstream line reaches the client as its own event (`line\n\n`).
//! - [`TrackedStream`] records how a streamed response ended: completion, upstream
//!   failure, or the client dropping the body early.

use crate::metrics::{Metrics, Route, StreamTermination};
use bytes::{Bytes, BytesMut};
use futures::stream::{self, Stream, StreamExt};
use std::fmt::Display;
use std::pin::Pin;
use std::task::{Context, Poll};

struct LineFramer<S> {
    inner: Pin<Box<S>>,
    buffer: BytesMut,
    finished: bool,
}

impl<S> LineFramer<S> {
    /// Pop the next complete, non-empty line as a framed event
    fn next_event(&mut self) -> Option<Bytes> {
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line = self.buffer.split_to(pos + 1);
            if let Some(event) = frame(&line) {
                return Some(event);
            }
        }
        None
    }

    /// Frame whatever is left once the upstream body has ended
    fn flush(&mut self) -> Option<Bytes> {
        let rest = self.buffer.split();
        frame(&rest)
    }
}

fn frame(line: &[u8]) -> Option<Bytes> {
    let mut end = line.len();
    while end > 0 && matches!(line[end - 1], b'\n' | b'\r') {
        end -= 1;
    }
    if end == 0 {
        return None;
    }
    let mut event = BytesMut::with_capacity(end + 2);
    event.extend_from_slice(&line[..end]);
    event.extend_from_slice(b"\n\n");
    Some(event.freeze())
}

/// Re-frame an event-stream body line by line
///
/// Each non-empty line (with any `\r\n` ending stripped) is yielded as
/// `line\n\n` as soon as its newline arrives. A trailing line without a newline is
/// flushed when the upstream body ends. An upstream error is yielded once and ends
/// the stream; buffered partial data is discarded.
pub fn frame_sse_lines<S, E>(inner: S) -> impl Stream<Item = Result<Bytes, E>>
where
    S: Stream<Item = Result<Bytes, E>>,
{
    let state = LineFramer {
        inner: Box::pin(inner),
        buffer: BytesMut::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.next_event() {
                return Some((Ok(event), state));
            }
            if state.finished {
                return None;
            }
            match state.inner.next().await {
                Some(Ok(chunk)) => state.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    state.finished = true;
                    state.buffer.clear();
                    return Some((Err(e), state));
                }
                None => {
                    state.finished = true;
                    return state.flush().map(|event| (Ok(event), state));
                }
            }
        }
    })
}

/// Stream wrapper that records how the response body ended
///
/// Dropping the wrapper before the inner stream finished means the client stopped
/// reading; the inner stream (and with it the upstream connection) is dropped too.
pub struct TrackedStream<S> {
    inner: Pin<Box<S>>,
    metrics: Metrics,
    route: Route,
    url: String,
    finished: bool,
}

impl<S> TrackedStream<S> {
    pub fn new(inner: S, metrics: Metrics, route: Route, url: impl Into<String>) -> Self {
        Self {
            inner: Box::pin(inner),
            metrics,
            route,
            url: url.into(),
            finished: false,
        }
    }

    fn finish(&mut self, reason: StreamTermination) {
        self.finished = true;
        if let Err(e) = self.metrics.record_stream_termination(self.route, reason) {
            tracing::warn!(
                error = %e,
                route = self.route.as_str(),
                "Failed to record stream termination metric"
            );
        }
    }
}

impl<S, E> Stream for TrackedStream<S>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Display,
{
    type Item = Result<Bytes, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        if this.finished {
            return Poll::Ready(None);
        }

        match this.inner.as_mut().poll_next(cx) {
            Poll::Ready(None) => {
                tracing::debug!(url = %this.url, route = this.route.as_str(), "Upstream stream completed");
                this.finish(StreamTermination::Completed);
                Poll::Ready(None)
            }
            Poll::Ready(Some(Err(e))) => {
                tracing::warn!(
                    url = %this.url,
                    route = this.route.as_str(),
                    error = %e,
                    "Upstream stream failed mid-response, aborting client connection"
                );
                this.finish(StreamTermination::UpstreamError);
                Poll::Ready(Some(Err(e)))
            }
            other => other,
        }
    }
}

impl<S> Drop for TrackedStream<S> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::info!(
                url = %self.url,
                route = self.route.as_str(),
                "Client disconnected before upstream stream completed"
            );
            self.finish(StreamTermination::ClientDisconnect);
        }
    }
}
