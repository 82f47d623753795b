//! Message-head codecs.
//!
//! Head parsing is zero-copy: `httparse` locates the byte ranges of each
//! header inside the read buffer, the head is split off as a shared
//! [`Bytes`](bytes::Bytes) and header values reference slices of it.
//!
//! Both decoders enforce the same limits on untrusted input.

mod request_head;
pub use request_head::RequestHeadDecoder;
pub use request_head::RequestHeadEncoder;

mod response_head;
pub use response_head::ResponseHeadDecoder;
pub use response_head::ResponseHeadEncoder;

/// Upper bound on the number of headers in a message head.
pub(crate) const MAX_HEADERS: usize = 64;

/// Upper bound on the total size of a message head in bytes.
pub(crate) const MAX_HEAD_BYTES: usize = 8 * 1024;

/// Initial buffer reservation when serializing a head.
pub(crate) const INIT_HEAD_SIZE: usize = 4 * 1024;

/// Byte ranges of one header's name and value inside the head buffer.
#[derive(Clone, Copy)]
pub(crate) struct HeaderSpan {
    pub(crate) name: (usize, usize),
    pub(crate) value: (usize, usize),
}

pub(crate) const EMPTY_SPAN: HeaderSpan = HeaderSpan { name: (0, 0), value: (0, 0) };

impl HeaderSpan {
    /// Records the positions of parsed headers relative to `buffer`.
    ///
    /// `httparse` hands back `&str`/`&[u8]` slices into the buffer it
    /// parsed; the offsets are recovered from the slice pointers so the
    /// borrow can be released before the buffer is split.
    pub(crate) fn record(buffer: &[u8], headers: &[httparse::Header<'_>], spans: &mut [HeaderSpan]) {
        let base = buffer.as_ptr() as usize;
        for (header, span) in headers.iter().zip(spans.iter_mut()) {
            let name_start = header.name.as_ptr() as usize - base;
            span.name = (name_start, name_start + header.name.len());
            let value_start = header.value.as_ptr() as usize - base;
            span.value = (value_start, value_start + header.value.len());
        }
    }
}
