use bytes::Bytes;
use http_body::SizeHint;

/// A framed unit of an HTTP message stream: either a message head of type
/// `T` or a piece of the payload that follows it.
///
/// The decoders yield a single `Head` per message followed by zero or more
/// `Payload` items; the encoders accept the same sequence.
pub enum Message<T> {
    Head(T),
    Payload(PayloadItem),
}

/// One step of a payload stream: a chunk of bytes or the end marker.
///
/// `Eof` is the *normal* termination of a body. Abnormal termination (the
/// peer going away mid-body) surfaces as an error from the decoder instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem {
    Chunk(Bytes),
    Eof,
}

/// The framing of a message body on the wire.
///
/// - `Empty` — no payload bytes follow the head.
/// - `Sized(n)` — exactly `n` payload bytes framed by `Content-Length`.
/// - `Chunked` — `Transfer-Encoding: chunked` framing.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BodyKind {
    Empty,
    Sized(u64),
    Chunked,
}

impl BodyKind {
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, BodyKind::Empty)
    }

    #[inline]
    pub fn is_sized(&self) -> bool {
        matches!(self, BodyKind::Sized(_))
    }

    #[inline]
    pub fn is_chunked(&self) -> bool {
        matches!(self, BodyKind::Chunked)
    }

    /// Derives the wire framing from a body's size hint: an exact size maps
    /// to `Sized` (or `Empty` for zero), an unknown size forces chunked
    /// transfer encoding.
    pub fn from_size_hint(hint: &SizeHint) -> Self {
        match hint.exact() {
            Some(0) => BodyKind::Empty,
            Some(n) => BodyKind::Sized(n),
            None => BodyKind::Chunked,
        }
    }
}

impl From<BodyKind> for SizeHint {
    fn from(kind: BodyKind) -> Self {
        match kind {
            BodyKind::Empty => SizeHint::with_exact(0),
            BodyKind::Sized(n) => SizeHint::with_exact(n),
            BodyKind::Chunked => SizeHint::new(),
        }
    }
}

impl<T> Message<T> {
    #[inline]
    pub fn is_head(&self) -> bool {
        matches!(self, Message::Head(_))
    }

    #[inline]
    pub fn is_payload(&self) -> bool {
        matches!(self, Message::Payload(_))
    }

    pub fn into_payload(self) -> Option<PayloadItem> {
        match self {
            Message::Head(_) => None,
            Message::Payload(item) => Some(item),
        }
    }
}

impl<T> From<Bytes> for Message<T> {
    fn from(bytes: Bytes) -> Self {
        Self::Payload(PayloadItem::Chunk(bytes))
    }
}

impl PayloadItem {
    #[inline]
    pub fn is_eof(&self) -> bool {
        matches!(self, PayloadItem::Eof)
    }

    #[inline]
    pub fn is_chunk(&self) -> bool {
        matches!(self, PayloadItem::Chunk(_))
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof => None,
        }
    }

    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_kind_from_size_hint() {
        assert_eq!(BodyKind::from_size_hint(&SizeHint::with_exact(0)), BodyKind::Empty);
        assert_eq!(BodyKind::from_size_hint(&SizeHint::with_exact(42)), BodyKind::Sized(42));
        assert_eq!(BodyKind::from_size_hint(&SizeHint::new()), BodyKind::Chunked);
    }

    #[test]
    fn payload_item_accessors() {
        let chunk = PayloadItem::Chunk(Bytes::from_static(b"abc"));
        assert!(chunk.is_chunk());
        assert_eq!(chunk.as_bytes().unwrap().as_ref(), b"abc");
        assert_eq!(chunk.into_bytes().unwrap().as_ref(), b"abc");

        assert!(PayloadItem::Eof.is_eof());
        assert!(PayloadItem::Eof.as_bytes().is_none());
    }
}
