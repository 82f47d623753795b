//! Request and response body containers for the framework layer.

use bytes::Bytes;
use http_body::Body as HttpBody;
use http_body::{Frame, SizeHint};
use http_body_util::combinators::UnsyncBoxBody;
use plover_http::protocol::body::ReqBody;
use plover_http::protocol::{HttpError, ParseError};
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::Mutex;

/// Boxed request body as the extractors and middlewares see it.
pub type BoxReqBody = UnsyncBoxBody<Bytes, ParseError>;

/// A shared, once-consumable slot for the request body.
///
/// Extractors clone the handle freely; the first one to consume the body
/// wins, later attempts observe a "body has been consumed" error. The
/// decompression middleware uses [`OptionReqBody::map`] to swap the inner
/// stream for a decoding wrapper without consuming it.
#[derive(Clone)]
pub struct OptionReqBody {
    inner: Arc<Mutex<Option<BoxReqBody>>>,
}

impl From<ReqBody> for OptionReqBody {
    fn from(body: ReqBody) -> Self {
        OptionReqBody { inner: Arc::new(Mutex::new(Some(UnsyncBoxBody::new(body)))) }
    }
}

impl From<BoxReqBody> for OptionReqBody {
    fn from(body: BoxReqBody) -> Self {
        OptionReqBody { inner: Arc::new(Mutex::new(Some(body))) }
    }
}

impl Debug for OptionReqBody {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("OptionReqBody").finish_non_exhaustive()
    }
}

impl OptionReqBody {
    /// An already-empty body slot; used by test requests without payload.
    pub fn empty() -> Self {
        OptionReqBody { inner: Arc::new(Mutex::new(None)) }
    }

    pub async fn can_consume(&self) -> bool {
        self.inner.lock().await.is_some()
    }

    /// Consumes the body, handing it to `f`.
    pub async fn apply<T, F, Fut>(&self, f: F) -> Result<T, ParseError>
    where
        F: FnOnce(BoxReqBody) -> Fut,
        Fut: Future<Output = Result<T, ParseError>>,
    {
        let mut guard = self.inner.lock().await;
        let Some(body) = guard.take() else {
            return Err(ParseError::invalid_body("body has been consumed"));
        };
        drop(guard);

        f(body).await
    }

    /// Replaces the inner stream with `f(stream)` without consuming it.
    pub async fn map<F>(&self, f: F) -> Result<(), ParseError>
    where
        F: FnOnce(BoxReqBody) -> BoxReqBody,
    {
        let mut guard = self.inner.lock().await;
        let Some(body) = guard.take() else {
            return Err(ParseError::invalid_body("body has been consumed"));
        };
        *guard = Some(f(body));
        Ok(())
    }
}

/// The response body produced by handlers and middleware.
///
/// `Once` bodies carry an exact size hint, which the connection turns into
/// `Content-Length` framing; `Stream` bodies have no known size and go out
/// chunked; `SizedStream` bodies stream but still advertise their exact
/// length (static files).
pub struct ResponseBody {
    kind: Kind,
}

enum Kind {
    Once(Option<Bytes>),
    Stream(UnsyncBoxBody<Bytes, HttpError>),
    SizedStream { body: UnsyncBoxBody<Bytes, HttpError>, remaining: u64 },
}

impl ResponseBody {
    pub fn empty() -> Self {
        Self { kind: Kind::Once(None) }
    }

    pub fn once(bytes: Bytes) -> Self {
        if bytes.is_empty() { Self::empty() } else { Self { kind: Kind::Once(Some(bytes)) } }
    }

    pub fn stream<B>(body: B) -> Self
    where
        B: HttpBody<Data = Bytes, Error = HttpError> + Send + 'static,
    {
        Self { kind: Kind::Stream(UnsyncBoxBody::new(body)) }
    }

    /// A streaming body whose total size is known up front, so the
    /// serializer can keep `Content-Length` framing.
    pub fn sized_stream<B>(body: B, len: u64) -> Self
    where
        B: HttpBody<Data = Bytes, Error = HttpError> + Send + 'static,
    {
        Self { kind: Kind::SizedStream { body: UnsyncBoxBody::new(body), remaining: len } }
    }

    pub fn is_empty(&self) -> bool {
        match &self.kind {
            Kind::Once(bytes) => bytes.is_none(),
            Kind::SizedStream { remaining, .. } => *remaining == 0,
            Kind::Stream(_) => false,
        }
    }

    /// Takes the body out, leaving an empty one behind.
    pub fn take(&mut self) -> ResponseBody {
        std::mem::replace(self, ResponseBody::empty())
    }

    pub fn replace(&mut self, other: ResponseBody) {
        *self = other;
    }
}

impl Debug for ResponseBody {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match &self.kind {
            Kind::Once(bytes) => f.debug_tuple("ResponseBody::Once").field(&bytes.as_ref().map(Bytes::len)).finish(),
            Kind::Stream(_) => f.write_str("ResponseBody::Stream"),
            Kind::SizedStream { remaining, .. } => {
                f.debug_tuple("ResponseBody::SizedStream").field(remaining).finish()
            }
        }
    }
}

impl Default for ResponseBody {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<String> for ResponseBody {
    fn from(value: String) -> Self {
        Self::once(Bytes::from(value))
    }
}

impl From<&'static str> for ResponseBody {
    fn from(value: &'static str) -> Self {
        Self::once(Bytes::from_static(value.as_bytes()))
    }
}

impl From<Bytes> for ResponseBody {
    fn from(value: Bytes) -> Self {
        Self::once(value)
    }
}

impl From<Vec<u8>> for ResponseBody {
    fn from(value: Vec<u8>) -> Self {
        Self::once(Bytes::from(value))
    }
}

impl From<()> for ResponseBody {
    fn from((): ()) -> Self {
        Self::empty()
    }
}

impl From<Option<Bytes>> for ResponseBody {
    fn from(value: Option<Bytes>) -> Self {
        match value {
            Some(bytes) => Self::once(bytes),
            None => Self::empty(),
        }
    }
}

impl HttpBody for ResponseBody {
    type Data = Bytes;
    type Error = HttpError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match &mut self.get_mut().kind {
            Kind::Once(bytes) => match bytes.take() {
                Some(bytes) => Poll::Ready(Some(Ok(Frame::data(bytes)))),
                None => Poll::Ready(None),
            },
            Kind::Stream(body) => Pin::new(body).poll_frame(cx),
            Kind::SizedStream { body, remaining } => match Pin::new(body).poll_frame(cx) {
                Poll::Ready(Some(Ok(frame))) => {
                    if let Some(data) = frame.data_ref() {
                        *remaining = remaining.saturating_sub(data.len() as u64);
                    }
                    Poll::Ready(Some(Ok(frame)))
                }
                other => other,
            },
        }
    }

    fn is_end_stream(&self) -> bool {
        match &self.kind {
            Kind::Once(bytes) => bytes.is_none(),
            Kind::Stream(body) => body.is_end_stream(),
            Kind::SizedStream { body, .. } => body.is_end_stream(),
        }
    }

    fn size_hint(&self) -> SizeHint {
        match &self.kind {
            Kind::Once(None) => SizeHint::with_exact(0),
            Kind::Once(Some(bytes)) => SizeHint::with_exact(bytes.len() as u64),
            Kind::Stream(body) => body.size_hint(),
            Kind::SizedStream { remaining, .. } => SizeHint::with_exact(*remaining),
        }
    }
}

/// A body that replays an in-memory buffer in fixed-size chunks with no
/// exact size hint, forcing chunked framing on the wire. Mostly useful in
/// tests exercising the chunk codec end to end.
#[derive(Debug, Clone)]
pub struct ChunkedBytes {
    data: Bytes,
    chunk_size: usize,
}

impl ChunkedBytes {
    pub fn new(data: impl Into<Bytes>, chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be positive");
        Self { data: data.into(), chunk_size }
    }
}

impl HttpBody for ChunkedBytes {
    type Data = Bytes;
    type Error = HttpError;

    fn poll_frame(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        if this.data.is_empty() {
            return Poll::Ready(None);
        }
        let take = this.chunk_size.min(this.data.len());
        Poll::Ready(Some(Ok(Frame::data(this.data.split_to(take)))))
    }

    fn is_end_stream(&self) -> bool {
        self.data.is_empty()
    }

    fn size_hint(&self) -> SizeHint {
        SizeHint::new()
    }
}
