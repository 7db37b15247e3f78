//! SSE framing and the timed stream wrapper for `/stream` responses.
//!
//! Every event is one frame, `data: <json>\n\n`. The wrapper owns the
//! concurrency slot for the request and two timers: the overall request
//! deadline and the idle timer, which resets on every emitted event.
//! Firing either injects a terminal error frame and closes the stream;
//! dropping the wrapper (client disconnect) releases the slot through
//! the guard's drop.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use adapter_protocol::{ErrorBody, ErrorCode, StreamEvent};
use axum::{
    body::Body,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures::Stream;
use tokio::time::{sleep, Instant, Sleep};
use tokio_stream::wrappers::ReceiverStream;
use tracing::error;

use super::admission::SlotGuard;

/// Encode one normalized event as an SSE frame.
pub fn sse_frame(event: &StreamEvent) -> Bytes {
    let json = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    Bytes::from(format!("data: {json}\n\n"))
}

/// Build the `text/event-stream` response around a frame stream.
pub fn build_sse_response(body: Body) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .body(body)
        .unwrap_or_else(|e| {
            error!("Failed to build streaming response: {}", e);
            crate::error::AdapterError::Internal("failed to build response".to_string())
                .into_response()
        })
}

/// Event stream → SSE frame stream with slot ownership and timeouts.
pub struct SseStream {
    inner: ReceiverStream<StreamEvent>,
    /// Held for the lifetime of the response body; drop releases the
    /// slot exactly once.
    _guard: Option<SlotGuard>,
    idle: Duration,
    idle_timer: Pin<Box<Sleep>>,
    deadline: Pin<Box<Sleep>>,
    done: bool,
}

impl SseStream {
    pub fn new(
        inner: ReceiverStream<StreamEvent>,
        guard: Option<SlotGuard>,
        idle: Duration,
        overall: Duration,
    ) -> Self {
        Self {
            inner,
            _guard: guard,
            idle,
            idle_timer: Box::pin(sleep(idle)),
            deadline: Box::pin(sleep(overall)),
            done: false,
        }
    }

    fn terminal_frame(&mut self, code: ErrorCode, message: &str) -> Bytes {
        self.done = true;
        sse_frame(&StreamEvent::Error {
            error: ErrorBody::new(code, message),
        })
    }
}

impl Stream for SseStream {
    type Item = Result<Bytes, io::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }

        match Pin::new(&mut self.inner).poll_next(cx) {
            Poll::Ready(Some(event)) => {
                let idle = self.idle;
                self.idle_timer.as_mut().reset(Instant::now() + idle);
                if event.is_terminal() {
                    self.done = true;
                }
                return Poll::Ready(Some(Ok(sse_frame(&event))));
            }
            Poll::Ready(None) => {
                self.done = true;
                return Poll::Ready(None);
            }
            Poll::Pending => {}
        }

        if self.deadline.as_mut().poll(cx).is_ready() {
            let frame = self.terminal_frame(ErrorCode::Timeout, "Request timed out");
            return Poll::Ready(Some(Ok(frame)));
        }
        if self.idle_timer.as_mut().poll(cx).is_ready() {
            let frame =
                self.terminal_frame(ErrorCode::StreamIdleTimeout, "Stream idle timeout");
            return Poll::Ready(Some(Ok(frame)));
        }
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tokio::sync::mpsc;

    fn frame_json(bytes: &Bytes) -> serde_json::Value {
        let text = std::str::from_utf8(bytes).unwrap();
        let data = text.strip_prefix("data: ").unwrap().trim_end();
        serde_json::from_str(data).unwrap()
    }

    #[test]
    fn test_sse_frame_shape() {
        let frame = sse_frame(&StreamEvent::Delta {
            content: "hi".to_string(),
        });
        let text = std::str::from_utf8(&frame).unwrap();
        assert!(text.starts_with("data: "));
        assert!(text.ends_with("\n\n"));
        assert_eq!(frame_json(&frame)["type"], "delta");
    }

    #[tokio::test]
    async fn test_events_flow_and_stream_ends_after_terminal() {
        let (tx, rx) = mpsc::channel(8);
        let mut stream = SseStream::new(
            ReceiverStream::new(rx),
            None,
            Duration::from_secs(5),
            Duration::from_secs(5),
        );
        tx.send(StreamEvent::Delta {
            content: "a".to_string(),
        })
        .await
        .unwrap();
        tx.send(StreamEvent::Error {
            error: ErrorBody::new(ErrorCode::Internal, "boom"),
        })
        .await
        .unwrap();

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(frame_json(&first)["content"], "a");
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(frame_json(&second)["error"]["code"], "internal");
        assert!(stream.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timeout_emits_terminal_error() {
        let (tx, rx) = mpsc::channel::<StreamEvent>(8);
        let mut stream = SseStream::new(
            ReceiverStream::new(rx),
            None,
            Duration::from_millis(100),
            Duration::from_secs(60),
        );
        // No events arrive; the idle timer fires.
        let frame = stream.next().await.unwrap().unwrap();
        assert_eq!(frame_json(&frame)["error"]["code"], "stream_idle_timeout");
        assert!(stream.next().await.is_none());
        drop(tx);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overall_deadline_wins_when_shorter() {
        let (tx, rx) = mpsc::channel::<StreamEvent>(8);
        let mut stream = SseStream::new(
            ReceiverStream::new(rx),
            None,
            Duration::from_secs(60),
            Duration::from_millis(50),
        );
        let frame = stream.next().await.unwrap().unwrap();
        assert_eq!(frame_json(&frame)["error"]["code"], "timeout");
        drop(tx);
    }
}
