//! Pull-based, cancellable streams.

use futures::stream::{BoxStream, Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio_util::sync::CancellationToken;

/// A lazy, finite, non-restartable sequence.
///
/// Elements are computed only when polled. Once the token is cancelled the
/// stream ends at the next poll and never yields again.
pub struct WorkStream<T> {
    inner: BoxStream<'static, T>,
    cancel: CancellationToken,
    finished: bool,
}

impl<T> WorkStream<T> {
    /// Wrap a stream with a fresh cancellation token.
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = T> + Send + 'static,
    {
        Self::with_token(stream, CancellationToken::new())
    }

    /// Wrap a stream with an existing cancellation token.
    pub fn with_token<S>(stream: S, cancel: CancellationToken) -> Self
    where
        S: Stream<Item = T> + Send + 'static,
    {
        Self {
            inner: stream.boxed(),
            cancel,
            finished: false,
        }
    }

    /// Token that cancels this stream.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop the stream.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the stream has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl<T> Stream for WorkStream<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let this = self.get_mut();
        if this.finished || this.cancel.is_cancelled() {
            this.finished = true;
            return Poll::Ready(None);
        }
        match this.inner.poll_next_unpin(cx) {
            Poll::Ready(None) => {
                this.finished = true;
                Poll::Ready(None)
            }
            other => other,
        }
    }
}

impl<T> std::fmt::Debug for WorkStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkStream")
            .field("cancelled", &self.cancel.is_cancelled())
            .field("finished", &self.finished)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_elements_computed_on_demand() {
        let produced = Arc::new(AtomicUsize::new(0));
        let counter = produced.clone();
        let mut s = WorkStream::new(stream::iter(0..10).map(move |i| {
            counter.fetch_add(1, Ordering::SeqCst);
            i
        }));

        assert_eq!(s.next().await, Some(0));
        assert_eq!(s.next().await, Some(1));
        assert_eq!(produced.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cancel_ends_stream() {
        let mut s = WorkStream::new(stream::iter(0..10));
        assert_eq!(s.next().await, Some(0));

        s.cancel_token().cancel();
        assert!(s.is_cancelled());
        assert_eq!(s.next().await, None);
        assert_eq!(s.next().await, None);
    }

    #[tokio::test]
    async fn test_exhausted_stays_finished() {
        let mut s = WorkStream::new(stream::iter(vec![1]));
        assert_eq!(s.next().await, Some(1));
        assert_eq!(s.next().await, None);
        assert_eq!(s.next().await, None);
    }
}
