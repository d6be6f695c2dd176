//! Camera frame sources and the adapter that turns either kind into one
//! lazy [FrameSequence].
//!
//! Some clients hand back a frame stream straight away; others must first
//! open a socket or negotiate a session, so they return a future that
//! resolves to the stream. [adapt] hides the difference: both produce the
//! same items in the same order.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use bytes::Bytes;
use futures::{
    future::BoxFuture,
    stream::{self, BoxStream, Stream, StreamExt, TryStreamExt},
    FutureExt,
};

use crate::error::{Error, Result};

/// Raw frames as produced by a client.
pub type FrameStream = BoxStream<'static, anyhow::Result<Bytes>>;

type OpenDirect = Box<dyn FnOnce() -> FrameStream + Send>;
type OpenDeferred = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<FrameStream>> + Send>;

/// Where a client's camera frames come from.
pub enum CameraSource {
    /// Calling the source yields frames directly.
    Direct(OpenDirect),

    /// Calling the source yields a future that must resolve before any
    /// frame can be read.
    Deferred(OpenDeferred),
}

impl CameraSource {
    /// Wrap a callable producing a frame stream.
    pub fn direct<F>(open: F) -> Self
    where
        F: FnOnce() -> FrameStream + Send + 'static,
    {
        Self::Direct(Box::new(open))
    }

    /// Wrap a callable producing a future of a frame stream.
    pub fn deferred<F, Fut>(open: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<FrameStream>> + Send + 'static,
    {
        Self::Deferred(Box::new(move || open().boxed()))
    }

    /// Whether frames are only available after an await.
    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred(_))
    }
}

impl std::fmt::Debug for CameraSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Direct(_) => f.write_str("CameraSource::Direct"),
            Self::Deferred(_) => f.write_str("CameraSource::Deferred"),
        }
    }
}

/// Normalize a camera source into a [FrameSequence].
///
/// A deferred source is not awaited here; its future runs on the first poll
/// of the returned sequence.
pub fn adapt(source: CameraSource) -> FrameSequence {
    let frames = match source {
        CameraSource::Direct(open) => open(),
        CameraSource::Deferred(open) => stream::once(open()).try_flatten().boxed(),
    };

    FrameSequence {
        frames: Some(frames),
        stop: None,
    }
}

/// One camera stream: frames in order, one per poll, until the source ends.
///
/// If the source fails the sequence yields a single
/// [Error::StreamInterrupted] and then ends. It is not restartable; open a
/// new stream instead.
pub struct FrameSequence {
    frames: Option<FrameStream>,
    stop: Option<BoxFuture<'static, ()>>,
}

impl FrameSequence {
    /// End the sequence, dropping the underlying source, once `stop`
    /// resolves.
    pub fn until<F>(mut self, stop: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.stop = Some(stop.boxed());
        self
    }
}

impl Stream for FrameSequence {
    type Item = Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.frames.is_none() {
            return Poll::Ready(None);
        }

        let stopped = self.stop.as_mut().is_some_and(|stop| stop.poll_unpin(cx).is_ready());
        if stopped {
            self.stop = None;
            self.frames = None;
            return Poll::Ready(None);
        }

        let Some(frames) = self.frames.as_mut() else {
            return Poll::Ready(None);
        };

        match frames.poll_next_unpin(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Ok(frame))) => Poll::Ready(Some(Ok(frame))),
            Poll::Ready(Some(Err(err))) => {
                self.frames = None;
                Poll::Ready(Some(Err(Error::StreamInterrupted(format!("{:#}", err)))))
            }
            Poll::Ready(None) => {
                self.frames = None;
                Poll::Ready(None)
            }
        }
    }
}

impl std::fmt::Debug for FrameSequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSequence")
            .field("finished", &self.frames.is_none())
            .finish()
    }
}
