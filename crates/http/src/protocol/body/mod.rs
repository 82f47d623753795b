//! Streaming request bodies.
//!
//! A [`ReqBody`] is the body object attached to the `http::Request` a
//! handler receives. It does not own any connection state: payload chunks
//! are pulled on demand from the connection task through a small
//! signal/data channel pair, so the handler and the connection can make
//! progress concurrently without the handler ever touching the framed
//! reader.
//!
//! The connection side of the pair is a [`BodyPump`], which serves chunk
//! requests while the handler runs and afterwards drains whatever the
//! handler left unread, keeping the framed reader positioned at the next
//! message head.
//!
//! A body is consumed at most once: after `Eof` has been observed every
//! further poll reports the end of the stream.

mod channel;
pub(crate) use channel::BodyPump;
pub(crate) use channel::body_channel;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use futures::channel::mpsc;
use http_body::{Body, Frame, SizeHint};
use http_body_util::BodyExt;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::error;

use crate::protocol::{BodyKind, ParseError, PayloadItem};

use channel::FetchSignal;

/// The request body handed to handlers.
///
/// Implements [`http_body::Body`] by requesting chunks from the owning
/// connection. Bodies with `BodyKind::Empty` short-circuit and never touch
/// the channel.
#[derive(Debug)]
pub struct ReqBody {
    inner: Inner,
}

#[derive(Debug)]
enum Inner {
    Empty,
    Streaming(StreamingBody),
}

#[derive(Debug)]
struct StreamingBody {
    signal_tx: mpsc::Sender<FetchSignal>,
    data_rx: mpsc::Receiver<Result<PayloadItem, ParseError>>,
    kind: BodyKind,
    awaiting: bool,
    done: bool,
}

impl ReqBody {
    pub(crate) fn empty() -> Self {
        Self { inner: Inner::Empty }
    }

    pub(crate) fn streaming(
        signal_tx: mpsc::Sender<FetchSignal>,
        data_rx: mpsc::Receiver<Result<PayloadItem, ParseError>>,
        kind: BodyKind,
    ) -> Self {
        Self { inner: Inner::Streaming(StreamingBody { signal_tx, data_rx, kind, awaiting: false, done: false }) }
    }
}

impl Body for ReqBody {
    type Data = Bytes;
    type Error = ParseError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match &mut self.get_mut().inner {
            Inner::Empty => Poll::Ready(None),
            Inner::Streaming(streaming) => streaming.poll_frame(cx),
        }
    }

    fn is_end_stream(&self) -> bool {
        match &self.inner {
            Inner::Empty => true,
            Inner::Streaming(streaming) => streaming.done,
        }
    }

    fn size_hint(&self) -> SizeHint {
        match &self.inner {
            Inner::Empty => SizeHint::with_exact(0),
            Inner::Streaming(streaming) => streaming.kind.into(),
        }
    }
}

impl StreamingBody {
    fn poll_frame(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Bytes>, ParseError>>> {
        if self.done {
            return Poll::Ready(None);
        }

        // One outstanding fetch at a time; the pump answers each signal
        // with exactly one payload item.
        if !self.awaiting {
            match self.signal_tx.poll_ready(cx) {
                Poll::Ready(Ok(())) => {
                    if let Err(e) = self.signal_tx.start_send(FetchSignal::More) {
                        error!("failed to request body data from connection: {}", e);
                        return Poll::Ready(Some(Err(ParseError::invalid_body("connection no longer streams this body"))));
                    }
                    self.awaiting = true;
                }
                Poll::Ready(Err(e)) => {
                    error!("body signal channel unusable: {}", e);
                    return Poll::Ready(Some(Err(ParseError::invalid_body("connection no longer streams this body"))));
                }
                Poll::Pending => return Poll::Pending,
            }
        }

        match self.data_rx.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(PayloadItem::Chunk(bytes)))) => {
                self.awaiting = false;
                Poll::Ready(Some(Ok(Frame::data(bytes))))
            }
            Poll::Ready(Some(Ok(PayloadItem::Eof))) => {
                self.awaiting = false;
                self.done = true;
                Poll::Ready(None)
            }
            Poll::Ready(Some(Err(e))) => {
                self.awaiting = false;
                self.done = true;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                self.awaiting = false;
                self.done = true;
                Poll::Ready(Some(Err(ParseError::invalid_body("body stream ended before eof"))))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Drains `body` into a single buffer, failing once more than `limit`
/// bytes have been produced.
///
/// `Eof` is the expected terminator; a fatal stream error is returned
/// unchanged.
pub async fn read_until_eof<B>(body: &mut B, limit: usize) -> Result<Bytes, ParseError>
where
    B: Body<Data = Bytes, Error = ParseError> + Unpin,
{
    let mut collected = BytesMut::new();
    while let Some(frame) = body.frame().await {
        if let Ok(data) = frame?.into_data() {
            if collected.len() + data.len() > limit {
                return Err(ParseError::BodyTooLarge { limit });
            }
            collected.extend_from_slice(&data);
        }
    }
    Ok(collected.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::Full;

    struct FailOnce {
        failed: bool,
    }

    impl Body for FailOnce {
        type Data = Bytes;
        type Error = ParseError;

        fn poll_frame(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
            let this = self.get_mut();
            if this.failed {
                Poll::Ready(None)
            } else {
                this.failed = true;
                Poll::Ready(Some(Err(ParseError::invalid_body("boom"))))
            }
        }
    }

    #[tokio::test]
    async fn empty_body_is_immediately_done() {
        let mut body = ReqBody::empty();
        assert!(body.is_end_stream());
        assert_eq!(body.size_hint().exact(), Some(0));
        assert!(body.frame().await.is_none());
    }

    #[tokio::test]
    async fn read_until_eof_collects_all_frames() {
        struct Adapter(Full<Bytes>);

        impl Body for Adapter {
            type Data = Bytes;
            type Error = ParseError;

            fn poll_frame(
                self: Pin<&mut Self>,
                cx: &mut Context<'_>,
            ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
                Pin::new(&mut self.get_mut().0)
                    .poll_frame(cx)
                    .map(|opt| opt.map(|res| res.map_err(|_| ParseError::invalid_body("infallible"))))
            }
        }

        let mut body = Adapter(Full::new(Bytes::from_static(b"hello world")));
        let collected = read_until_eof(&mut body, 64).await.unwrap();
        assert_eq!(collected.as_ref(), b"hello world");
    }

    #[tokio::test]
    async fn read_until_eof_enforces_limit() {
        struct Adapter(Full<Bytes>);

        impl Body for Adapter {
            type Data = Bytes;
            type Error = ParseError;

            fn poll_frame(
                self: Pin<&mut Self>,
                cx: &mut Context<'_>,
            ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
                Pin::new(&mut self.get_mut().0)
                    .poll_frame(cx)
                    .map(|opt| opt.map(|res| res.map_err(|_| ParseError::invalid_body("infallible"))))
            }
        }

        let mut body = Adapter(Full::new(Bytes::from_static(b"hello world")));
        let result = read_until_eof(&mut body, 4).await;
        assert!(matches!(result, Err(ParseError::BodyTooLarge { limit: 4 })));
    }

    #[tokio::test]
    async fn read_until_eof_propagates_stream_errors() {
        let mut body = FailOnce { failed: false };
        let result = read_until_eof(&mut body, 64).await;
        assert!(matches!(result, Err(ParseError::InvalidBody { .. })));
    }
}
