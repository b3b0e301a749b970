//! Streaming response bodies

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, Stream, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;

/// Failure while reading a body stream
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct StreamError {
    message: String,
}

impl StreamError {
    /// Create a stream error
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Error message
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

type Fragment = Result<Bytes, StreamError>;
type FragmentStream = Pin<Box<dyn Stream<Item = Fragment> + Send>>;

/// Single-consumer stream of byte fragments
pub struct Body {
    inner: FragmentStream,
}

impl Body {
    /// Body with no fragments
    #[must_use]
    pub fn empty() -> Self {
        Self::from_stream(stream::empty())
    }

    /// Body with a single fragment
    #[must_use]
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self::from_chunks(vec![bytes.into()])
    }

    /// Body yielding the given fragments in order
    #[must_use]
    pub fn from_chunks(chunks: Vec<Bytes>) -> Self {
        Self::from_stream(stream::iter(chunks.into_iter().map(Ok)))
    }

    /// Body yielding the given fragments and then failing
    #[must_use]
    pub fn failing_after(chunks: Vec<Bytes>, error: StreamError) -> Self {
        let items: Vec<Fragment> = chunks
            .into_iter()
            .map(Ok)
            .chain(std::iter::once(Err(error)))
            .collect();
        Self::from_stream(stream::iter(items))
    }

    /// Wrap an arbitrary fragment stream
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Fragment> + Send + 'static,
    {
        Self {
            inner: Box::pin(stream),
        }
    }

    /// Next fragment, `None` once the stream is done
    pub async fn read(&mut self) -> Option<Fragment> {
        self.inner.next().await
    }

    /// Drain the body into one buffer
    ///
    /// # Errors
    ///
    /// Returns the first stream error encountered
    pub async fn collect_bytes(mut self) -> Result<Bytes, StreamError> {
        let mut buf = BytesMut::new();
        while let Some(fragment) = self.read().await {
            buf.extend_from_slice(&fragment?);
        }
        Ok(buf.freeze())
    }

    /// Drain the body as lossy UTF-8 text
    ///
    /// # Errors
    ///
    /// Returns the first stream error encountered
    pub async fn text(self) -> Result<String, StreamError> {
        let bytes = self.collect_bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Split into two bodies that each observe every fragment
    ///
    /// A background task pulls from the source and forwards each fragment to
    /// both branches, so a slow or abandoned branch never starves the other.
    /// The task ends when the source ends or both branches are dropped, even
    /// while it is waiting on a source that never yields; the source is
    /// dropped with it.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime
    #[must_use]
    pub fn tee(self) -> (Body, Body) {
        let (left_tx, left_rx) = mpsc::unbounded_channel();
        let (right_tx, right_rx) = mpsc::unbounded_channel();
        let mut source = self;

        tokio::spawn(async move {
            loop {
                let next = tokio::select! {
                    fragment = source.read() => fragment,
                    () = async { tokio::join!(left_tx.closed(), right_tx.closed()); } => None,
                };
                let Some(fragment) = next else {
                    break;
                };
                let failed = fragment.is_err();
                let _ = left_tx.send(fragment.clone());
                let _ = right_tx.send(fragment);
                if failed {
                    break;
                }
            }
        });

        (Self::from_receiver(left_rx), Self::from_receiver(right_rx))
    }

    fn from_receiver(rx: mpsc::UnboundedReceiver<Fragment>) -> Self {
        Self::from_stream(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|fragment| (fragment, rx))
        }))
    }
}

impl Stream for Body {
    type Item = Fragment;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().inner.as_mut().poll_next(cx)
    }
}

impl std::fmt::Debug for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Body").finish_non_exhaustive()
    }
}
