// ── Observation primitives ──
//
// Two flavours of push-based observation:
// - `Watched<T>`: latest-value semantics over a `watch` channel. Used for
//   the catalog and the active group, where only the newest snapshot matters.
// - `Subscription<T>`: every published value, in order, through a private
//   unbounded queue per subscriber. Used for session transitions, which
//   must never be coalesced.

mod publisher;

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

pub use publisher::{Publisher, Subscription};

/// A latest-value view of some observable state.
///
/// Provides point-in-time access and change notification via
/// [`changed()`](Self::changed) or by converting into a `Stream`.
pub struct Watched<T: Clone + Send + Sync + 'static> {
    current: T,
    receiver: watch::Receiver<T>,
}

impl<T: Clone + Send + Sync + 'static> Watched<T> {
    pub(crate) fn new(mut receiver: watch::Receiver<T>) -> Self {
        let current = receiver.borrow_and_update().clone();
        Self { current, receiver }
    }

    /// The value captured at creation (or at the last `changed()`).
    pub fn current(&self) -> &T {
        &self.current
    }

    /// The newest value, which may be fresher than `current()`.
    pub fn latest(&self) -> T {
        self.receiver.borrow().clone()
    }

    /// Wait for the next change. Returns `None` once the owner is dropped.
    pub async fn changed(&mut self) -> Option<T> {
        self.receiver.changed().await.ok()?;
        let value = self.receiver.borrow_and_update().clone();
        self.current = value.clone();
        Some(value)
    }

    /// Convert into a `Stream` that yields the current value first.
    pub fn into_stream(self) -> WatchedStream<T> {
        WatchedStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter backed by a `watch::Receiver`.
pub struct WatchedStream<T: Clone + Send + Sync + 'static> {
    inner: WatchStream<T>,
}

impl<T: Clone + Send + Sync + 'static> Stream for WatchedStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        // WatchStream boxes its future internally and is always Unpin.
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use futures_util::StreamExt;

    use super::*;

    #[tokio::test]
    async fn changed_tracks_latest_value() {
        let (tx, rx) = watch::channel(1u32);
        let mut watched = Watched::new(rx);
        assert_eq!(*watched.current(), 1);

        tx.send_replace(2);
        assert_eq!(watched.latest(), 2);
        assert_eq!(*watched.current(), 1);

        assert_eq!(watched.changed().await, Some(2));
        assert_eq!(*watched.current(), 2);

        drop(tx);
        assert_eq!(watched.changed().await, None);
    }

    #[tokio::test]
    async fn stream_yields_current_then_updates() {
        let (tx, rx) = watch::channel("a".to_string());
        let mut stream = Watched::new(rx).into_stream();

        assert_eq!(stream.next().await.as_deref(), Some("a"));
        tx.send_replace("b".into());
        assert_eq!(stream.next().await.as_deref(), Some("b"));
    }
}
