//! Stream wrappers that compress or decompress body data in flight.
//!
//! Both wrappers share the same shape: data frames from the inner body are
//! pushed through a flate2 write-side codec into an in-memory sink, and
//! whatever the codec has produced so far is yielded as the next frame.
//! The codec is finished when the inner body ends, flushing its tail.

use bytes::{BufMut, Bytes, BytesMut};
use flate2::Compression;
use flate2::write::{GzDecoder, GzEncoder, ZlibDecoder, ZlibEncoder};
use http_body::{Body, Frame, SizeHint};
use pin_project_lite::pin_project;
use plover_http::protocol::{HttpError, ParseError, SendError};
use std::io::{self, Write};
use std::pin::Pin;
use std::task::{Context, Poll, ready};

/// The codings the framework implements (besides `identity`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Codec {
    Gzip,
    Deflate,
}

impl Codec {
    pub(crate) fn token(self) -> &'static str {
        match self {
            Codec::Gzip => "gzip",
            Codec::Deflate => "deflate",
        }
    }
}

/// In-memory sink the flate2 codecs write into.
pub(crate) struct Sink {
    buf: BytesMut,
}

impl Sink {
    fn new() -> Self {
        Self { buf: BytesMut::new() }
    }

    fn take(&mut self) -> Bytes {
        self.buf.split().freeze()
    }

    fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }
}

impl io::Write for Sink {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.put_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

enum Compressor {
    Gzip(GzEncoder<Sink>),
    Deflate(ZlibEncoder<Sink>),
}

impl Compressor {
    fn new(codec: Codec) -> Self {
        match codec {
            Codec::Gzip => Self::Gzip(GzEncoder::new(Sink::new(), Compression::default())),
            Codec::Deflate => Self::Deflate(ZlibEncoder::new(Sink::new(), Compression::default())),
        }
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        match self {
            Self::Gzip(encoder) => encoder.write_all(data),
            Self::Deflate(encoder) => encoder.write_all(data),
        }
    }

    fn take(&mut self) -> Bytes {
        match self {
            Self::Gzip(encoder) => encoder.get_mut().take(),
            Self::Deflate(encoder) => encoder.get_mut().take(),
        }
    }

    fn finish(self) -> io::Result<Bytes> {
        match self {
            Self::Gzip(encoder) => encoder.finish().map(Sink::into_bytes),
            Self::Deflate(encoder) => encoder.finish().map(Sink::into_bytes),
        }
    }
}

pin_project! {
    /// Response-side wrapper: compresses the inner body.
    pub(crate) struct EncodedBody<B> {
        #[pin]
        inner: B,
        compressor: Option<Compressor>,
    }
}

impl<B> EncodedBody<B> {
    pub(crate) fn new(inner: B, codec: Codec) -> Self {
        Self { inner, compressor: Some(Compressor::new(codec)) }
    }
}

impl<B> Body for EncodedBody<B>
where
    B: Body<Data = Bytes, Error = HttpError>,
{
    type Data = Bytes;
    type Error = HttpError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let mut this = self.project();

        loop {
            if this.compressor.is_none() {
                return Poll::Ready(None);
            }

            match ready!(this.inner.as_mut().poll_frame(cx)) {
                Some(Ok(frame)) => {
                    let Ok(data) = frame.into_data() else {
                        // trailers are dropped; compression restates framing
                        continue;
                    };

                    let compressor = this.compressor.as_mut().expect("checked above");
                    if let Err(e) = compressor.write(&data) {
                        return Poll::Ready(Some(Err(SendError::io(e).into())));
                    }
                    let produced = compressor.take();
                    if produced.is_empty() {
                        continue;
                    }
                    return Poll::Ready(Some(Ok(Frame::data(produced))));
                }

                Some(Err(e)) => return Poll::Ready(Some(Err(e))),

                None => {
                    let compressor = this.compressor.take().expect("checked above");
                    return match compressor.finish() {
                        Ok(tail) if tail.is_empty() => Poll::Ready(None),
                        Ok(tail) => Poll::Ready(Some(Ok(Frame::data(tail)))),
                        Err(e) => Poll::Ready(Some(Err(SendError::io(e).into()))),
                    };
                }
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.compressor.is_none()
    }

    fn size_hint(&self) -> SizeHint {
        // compressed size is unknown up front
        SizeHint::new()
    }
}

enum Decompressor {
    Gzip(GzDecoder<Sink>),
    Deflate(ZlibDecoder<Sink>),
}

impl Decompressor {
    fn new(codec: Codec) -> Self {
        match codec {
            Codec::Gzip => Self::Gzip(GzDecoder::new(Sink::new())),
            Codec::Deflate => Self::Deflate(ZlibDecoder::new(Sink::new())),
        }
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        match self {
            Self::Gzip(decoder) => decoder.write_all(data),
            Self::Deflate(decoder) => decoder.write_all(data),
        }
    }

    fn take(&mut self) -> Bytes {
        match self {
            Self::Gzip(decoder) => decoder.get_mut().take(),
            Self::Deflate(decoder) => decoder.get_mut().take(),
        }
    }

    fn finish(self) -> io::Result<Bytes> {
        match self {
            Self::Gzip(decoder) => decoder.finish().map(Sink::into_bytes),
            Self::Deflate(decoder) => decoder.finish().map(Sink::into_bytes),
        }
    }
}

pin_project! {
    /// Request-side wrapper: decompresses the inner body.
    ///
    /// An invalid compressed stream surfaces as an invalid-body parse
    /// error, which the extractors map to `400`.
    pub(crate) struct DecodedBody<B> {
        #[pin]
        inner: B,
        decompressor: Option<Decompressor>,
    }
}

impl<B> DecodedBody<B> {
    pub(crate) fn new(inner: B, codec: Codec) -> Self {
        Self { inner, decompressor: Some(Decompressor::new(codec)) }
    }
}

impl<B> Body for DecodedBody<B>
where
    B: Body<Data = Bytes, Error = ParseError>,
{
    type Data = Bytes;
    type Error = ParseError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let mut this = self.project();

        loop {
            if this.decompressor.is_none() {
                return Poll::Ready(None);
            }

            match ready!(this.inner.as_mut().poll_frame(cx)) {
                Some(Ok(frame)) => {
                    let Ok(data) = frame.into_data() else {
                        continue;
                    };

                    let decompressor = this.decompressor.as_mut().expect("checked above");
                    if let Err(e) = decompressor.write(&data) {
                        return Poll::Ready(Some(Err(ParseError::invalid_body(format!("decode failed: {e}")))));
                    }
                    let produced = decompressor.take();
                    if produced.is_empty() {
                        continue;
                    }
                    return Poll::Ready(Some(Ok(Frame::data(produced))));
                }

                Some(Err(e)) => return Poll::Ready(Some(Err(e))),

                None => {
                    let decompressor = this.decompressor.take().expect("checked above");
                    return match decompressor.finish() {
                        Ok(tail) if tail.is_empty() => Poll::Ready(None),
                        Ok(tail) => Poll::Ready(Some(Ok(Frame::data(tail)))),
                        Err(e) => {
                            Poll::Ready(Some(Err(ParseError::invalid_body(format!("decode failed: {e}")))))
                        }
                    };
                }
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.decompressor.is_none()
    }

    fn size_hint(&self) -> SizeHint {
        SizeHint::new()
    }
}
