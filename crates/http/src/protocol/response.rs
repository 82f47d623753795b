use http::Response;

/// The head of an HTTP response before a body is attached.
///
/// The server-side encoder consumes one of these together with a
/// [`BodyKind`](super::BodyKind); the client-side decoder produces one from
/// a parsed status line and header block.
pub type ResponseHead = Response<()>;
