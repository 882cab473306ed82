//! Deadline wrapper for backend response bodies.
//!
//! A backend that sends headers promptly and then stalls would otherwise hold
//! the caller's connection open forever. [`TimeoutBody`] enforces two
//! deadlines while the body is streamed back:
//!
//! - an idle deadline, reset whenever a frame arrives
//! - a total deadline for the whole body

use bytes::Bytes;
use http_body::{Body, Frame, SizeHint};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use thiserror::Error;
use tokio::time::{Instant, Sleep, sleep};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Deadlines applied to a streamed body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Longest gap allowed between two frames.
    pub idle_timeout: Duration,
    /// Longest time allowed for the whole body.
    pub total_timeout: Duration,
}

impl TimeoutConfig {
    pub fn new(idle_timeout: Duration, total_timeout: Duration) -> Self {
        Self {
            idle_timeout,
            total_timeout,
        }
    }

    /// Deadlines derived from the backend timeout: each frame must arrive
    /// within it, and the body must finish within twice it.
    pub fn for_backend(backend_timeout: Duration) -> Self {
        Self::new(backend_timeout, backend_timeout.saturating_mul(2))
    }
}

/// Why a [`TimeoutBody`] stopped yielding frames.
#[derive(Debug, Error)]
pub enum BodyTimeoutError {
    #[error("no data received for {0:?}")]
    Idle(Duration),

    #[error("body not finished within {0:?}")]
    Total(Duration),

    #[error("body stream error: {0}")]
    Inner(BoxError),
}

impl BodyTimeoutError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Idle(_) | Self::Total(_))
    }
}

/// Body wrapper enforcing [`TimeoutConfig`]. Deadlines start on first poll.
pub struct TimeoutBody<B> {
    inner: B,
    config: TimeoutConfig,
    idle: Pin<Box<Sleep>>,
    total: Pin<Box<Sleep>>,
    armed: bool,
}

impl<B> TimeoutBody<B> {
    pub fn new(inner: B, config: TimeoutConfig) -> Self {
        Self {
            inner,
            config,
            idle: Box::pin(sleep(config.idle_timeout)),
            total: Box::pin(sleep(config.total_timeout)),
            armed: false,
        }
    }
}

impl<B> Body for TimeoutBody<B>
where
    B: Body<Data = Bytes> + Unpin,
    B::Error: Into<BoxError>,
{
    type Data = Bytes;
    type Error = BodyTimeoutError;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = &mut *self;

        if !this.armed {
            this.armed = true;
            let now = Instant::now();
            this.total.as_mut().reset(now + this.config.total_timeout);
            this.idle.as_mut().reset(now + this.config.idle_timeout);
        }

        // Frames already buffered by the inner body win over expired timers.
        if let Poll::Ready(frame) = Pin::new(&mut this.inner).poll_frame(cx) {
            let next_idle = Instant::now() + this.config.idle_timeout;
            this.idle.as_mut().reset(next_idle);
            return Poll::Ready(frame.map(|r| r.map_err(|e| BodyTimeoutError::Inner(e.into()))));
        }

        if this.total.as_mut().poll(cx).is_ready() {
            return Poll::Ready(Some(Err(BodyTimeoutError::Total(
                this.config.total_timeout,
            ))));
        }
        if this.idle.as_mut().poll(cx).is_ready() {
            return Poll::Ready(Some(Err(BodyTimeoutError::Idle(this.config.idle_timeout))));
        }

        Poll::Pending
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
