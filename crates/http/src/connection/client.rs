//! The client-side connection state machine.
//!
//! A [`ClientConnection`] takes an already-established transport, sends
//! exactly one request on it and parses the response. The returned
//! response body is a lazy stream over the same transport: dropping it
//! drops the transport.
//!
//! Request bodies with a known size are buffered and written together with
//! the head in a single pass under `Content-Length` framing; bodies with
//! an unknown size stream out chunked. When the caller sets
//! `Expect: 100-continue`, the body is held back until the server answers
//! with an interim `100` — and if the deadline expires while waiting, the
//! body is sent anyway (the interim response is advisory).

use std::fmt::Display;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use http::{Request, Response, StatusCode};
use http_body::{Body, Frame, SizeHint};
use http_body_util::BodyExt;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::time::timeout;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, trace};

use crate::codec::{RequestEncoder, ResponseDecoder};
use crate::protocol::{BodyKind, HttpError, Message, ParseError, PayloadItem, RequestHead, ResponseHead, SendError};

/// One outbound HTTP/1.1 exchange over an established transport.
pub struct ClientConnection<S> {
    stream: S,
    deadline: Duration,
}

impl<S> ClientConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S, deadline: Duration) -> Self {
        Self { stream, deadline }
    }

    /// Sends `request` and parses the response head.
    ///
    /// The response body is a [`ClientResponseBody`] streaming from the
    /// transport this connection owned.
    pub async fn send<B>(self, request: Request<B>) -> Result<Response<ClientResponseBody<S>>, HttpError>
    where
        B: Body<Data = Bytes> + Unpin + Send,
        B::Error: Display,
    {
        let deadline = self.deadline;
        let (parts, body) = request.into_parts();
        let head = RequestHead::from(Request::from_parts(parts, ()));
        let expects_continue = head.expects_continue();

        let (read_half, write_half) = tokio::io::split(self.stream);
        let mut framed_read = FramedRead::with_capacity(read_half, ResponseDecoder::new(), 8 * 1024);
        let mut framed_write = FramedWrite::new(write_half, RequestEncoder::new());

        // Sized framing requires the length up front, so anything that is
        // not explicitly streaming gets buffered before the head is built.
        let (kind, outgoing) = match BodyKind::from_size_hint(&body.size_hint()) {
            BodyKind::Chunked => (BodyKind::Chunked, Outgoing::Streaming(body)),
            _ => {
                let buffered = collect_body(body).await?;
                let kind = if buffered.is_empty() { BodyKind::Empty } else { BodyKind::Sized(buffered.len() as u64) };
                (kind, Outgoing::Buffered(buffered))
            }
        };

        // With Expect set, the head must reach the server before the body
        // decision; otherwise it is only fed and goes out with the body.
        if expects_continue {
            send_with_deadline(&mut framed_write, Message::Head((head, kind)), deadline).await?;
        } else {
            feed_with_deadline(&mut framed_write, Message::Head((head, kind)), deadline).await?;
        }

        if expects_continue {
            trace!("waiting for interim response before sending the body");
            match timeout(deadline, framed_read.next()).await {
                // Deadline while waiting: the interim response is advisory,
                // proceed to write the body anyway.
                Err(_) => debug!("no interim response within the deadline, sending body"),
                Ok(Some(Ok(Message::Head((interim, interim_kind))))) => {
                    if interim.status() != StatusCode::CONTINUE {
                        // A final response before the body was sent: hand it
                        // to the caller, abandoning the body.
                        debug!(status = %interim.status(), "final response preempted the request body");
                        return Ok(assemble(interim, interim_kind, framed_read, framed_write));
                    }
                }
                Ok(Some(Ok(Message::Payload(_)))) => {
                    return Err(ParseError::invalid_body("payload before any response head").into());
                }
                Ok(Some(Err(e))) => return Err(e.into()),
                Ok(None) => return Err(ParseError::UnexpectedEof.into()),
            }
        }

        match outgoing {
            Outgoing::Buffered(buffered) => {
                if kind.is_empty() {
                    flush_with_deadline(&mut framed_write, deadline).await?;
                } else {
                    send_with_deadline(&mut framed_write, Message::Payload(PayloadItem::Chunk(buffered)), deadline).await?;
                    send_with_deadline(&mut framed_write, Message::Payload(PayloadItem::Eof), deadline).await?;
                }
            }
            Outgoing::Streaming(mut body) => {
                loop {
                    match body.frame().await {
                        Some(Ok(frame)) => {
                            if let Ok(data) = frame.into_data() {
                                send_with_deadline(&mut framed_write, Message::Payload(PayloadItem::Chunk(data)), deadline)
                                    .await?;
                            }
                        }
                        Some(Err(e)) => {
                            return Err(SendError::invalid_body(format!("request body failed: {e}")).into());
                        }
                        None => {
                            send_with_deadline(&mut framed_write, Message::Payload(PayloadItem::Eof), deadline).await?;
                            break;
                        }
                    }
                }
            }
        }

        // Read the final head, skipping any interim responses.
        loop {
            match timeout(deadline, framed_read.next()).await {
                Err(_) => return Err(ParseError::TimedOut.into()),
                Ok(None) => return Err(ParseError::UnexpectedEof.into()),
                Ok(Some(Ok(Message::Head((head, kind))))) => {
                    if head.status().is_informational() {
                        trace!(status = %head.status(), "skipping interim response");
                        continue;
                    }
                    return Ok(assemble(head, kind, framed_read, framed_write));
                }
                Ok(Some(Ok(Message::Payload(_)))) => {
                    return Err(ParseError::invalid_body("payload before any response head").into());
                }
                Ok(Some(Err(e))) => return Err(e.into()),
            }
        }
    }
}

enum Outgoing<B> {
    Buffered(Bytes),
    Streaming(B),
}

fn assemble<S>(
    head: ResponseHead,
    kind: BodyKind,
    framed_read: FramedRead<ReadHalf<S>, ResponseDecoder>,
    framed_write: FramedWrite<WriteHalf<S>, RequestEncoder>,
) -> Response<ClientResponseBody<S>> {
    let (parts, ()) = head.into_parts();
    let body = ClientResponseBody { framed_read, _framed_write: framed_write, kind, done: kind.is_empty() };
    Response::from_parts(parts, body)
}

async fn send_with_deadline<S>(
    framed_write: &mut FramedWrite<WriteHalf<S>, RequestEncoder>,
    message: Message<(RequestHead, BodyKind)>,
    deadline: Duration,
) -> Result<(), HttpError>
where
    S: AsyncRead + AsyncWrite,
{
    match timeout(deadline, framed_write.send(message)).await {
        Ok(result) => result.map_err(HttpError::from),
        Err(_) => Err(SendError::TimedOut.into()),
    }
}

async fn feed_with_deadline<S>(
    framed_write: &mut FramedWrite<WriteHalf<S>, RequestEncoder>,
    message: Message<(RequestHead, BodyKind)>,
    deadline: Duration,
) -> Result<(), HttpError>
where
    S: AsyncRead + AsyncWrite,
{
    match timeout(deadline, framed_write.feed(message)).await {
        Ok(result) => result.map_err(HttpError::from),
        Err(_) => Err(SendError::TimedOut.into()),
    }
}

async fn flush_with_deadline<S>(
    framed_write: &mut FramedWrite<WriteHalf<S>, RequestEncoder>,
    deadline: Duration,
) -> Result<(), HttpError>
where
    S: AsyncRead + AsyncWrite,
{
    match timeout(deadline, futures::SinkExt::<Message<(RequestHead, BodyKind)>>::flush(framed_write)).await {
        Ok(result) => result.map_err(HttpError::from),
        Err(_) => Err(SendError::TimedOut.into()),
    }
}

async fn collect_body<B>(mut body: B) -> Result<Bytes, HttpError>
where
    B: Body<Data = Bytes> + Unpin,
    B::Error: Display,
{
    let mut collected = BytesMut::new();
    while let Some(frame) = body.frame().await {
        match frame {
            Ok(frame) => {
                if let Ok(data) = frame.into_data() {
                    collected.extend_from_slice(&data);
                }
            }
            Err(e) => return Err(SendError::invalid_body(format!("request body failed: {e}")).into()),
        }
    }
    Ok(collected.freeze())
}

/// The streaming body of a client response.
///
/// Owns both halves of the transport; dropping the body closes the
/// connection. Yields payload frames until the message's `Eof`, after
/// which the stream reports end-of-body forever.
pub struct ClientResponseBody<S> {
    framed_read: FramedRead<ReadHalf<S>, ResponseDecoder>,
    _framed_write: FramedWrite<WriteHalf<S>, RequestEncoder>,
    kind: BodyKind,
    done: bool,
}

impl<S> Body for ClientResponseBody<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    type Data = Bytes;
    type Error = ParseError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        match this.framed_read.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(Message::Payload(PayloadItem::Chunk(bytes))))) => {
                Poll::Ready(Some(Ok(Frame::data(bytes))))
            }
            Poll::Ready(Some(Ok(Message::Payload(PayloadItem::Eof)))) => {
                this.done = true;
                Poll::Ready(None)
            }
            Poll::Ready(Some(Ok(Message::Head(_)))) => {
                this.done = true;
                Poll::Ready(Some(Err(ParseError::invalid_body("head while streaming response body"))))
            }
            Poll::Ready(Some(Err(e))) => {
                this.done = true;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.done = true;
                Poll::Ready(Some(Err(ParseError::UnexpectedEof)))
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.done
    }

    fn size_hint(&self) -> SizeHint {
        self.kind.into()
    }
}
