//! Framed codecs for HTTP/1.1 messages.
//!
//! All codecs implement `tokio_util::codec::{Decoder, Encoder}` over a
//! `BytesMut` buffer, and are composed two-phase: a head codec followed by
//! a payload codec selected from the parsed [`BodyKind`]. Four top-level
//! codecs cover both directions of both roles:
//!
//! | codec               | role   | direction |
//! |---------------------|--------|-----------|
//! | [`RequestDecoder`]  | server | inbound   |
//! | [`ResponseEncoder`] | server | outbound  |
//! | [`RequestEncoder`]  | client | outbound  |
//! | [`ResponseDecoder`] | client | inbound   |
//!
//! [`BodyKind`]: crate::protocol::BodyKind

pub mod body;
pub mod head;

mod request;
pub use request::RequestDecoder;
pub use request::RequestEncoder;

mod response;
pub use response::ResponseDecoder;
pub use response::ResponseEncoder;

use bytes::{BufMut, BytesMut};
use std::io;

/// `io::Write` adapter over `BytesMut`, used to format small pieces of the
/// wire image (status lines, chunk sizes) without a temporary allocation.
pub(crate) struct BufWriter<'a>(pub(crate) &'a mut BytesMut);

impl io::Write for BufWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
