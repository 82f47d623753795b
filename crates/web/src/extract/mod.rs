//! Typed extraction of handler arguments from requests.
//!
//! Every handler parameter implements [`FromRequest`]: the dispatcher
//! extracts arguments left to right, and the first failure short-circuits
//! into the error's own HTTP response (malformed input maps to `400`,
//! missing shared state to `500`).
//!
//! Wrapper types pick the source of the data:
//!
//! - [`Path<T>`] — typed view of the path captures, by field name or
//!   position;
//! - [`Query<T>`] — typed view of the query string;
//! - [`Form<T>`] — urlencoded body (requires the matching content type);
//! - [`Json<T>`] — JSON body (requires the matching content type, reads
//!   with a size bound);
//! - [`State<T>`] — a value from the route's merged state map.
//!
//! Plain metadata types (`Method`, `&HeaderMap`, `&PathInfo`, ...) and
//! body sinks (`String`, `Bytes`, `Vec<u8>`) extract directly.

mod from_request;
pub use from_request::FromRequest;

mod extract_body;
mod extract_meta;
mod extract_path;
mod extract_state;
mod extract_tuple;
mod extract_url;

mod de;

use http::{StatusCode, header};
use plover_http::protocol::ParseError;
use std::ops::Deref;
use std::sync::Arc;
use thiserror::Error;

use crate::request::RequestContext;
use crate::responder::Responder;

/// Upper bound for body extractors that buffer the whole payload.
pub(crate) const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Typed view of the path captures.
///
/// Destructures either by field name (`#[derive(Deserialize)]` structs)
/// or by position (tuples); each field converts from its textual capture.
#[derive(Debug)]
pub struct Path<T>(pub T);

/// Typed view of the query string.
#[derive(Debug)]
pub struct Query<T>(pub T);

/// An `application/x-www-form-urlencoded` body, deserialized by field
/// name.
#[derive(Debug)]
pub struct Form<T>(pub T);

/// An `application/json` body.
///
/// Also usable as a handler return value, where it serializes the wrapped
/// value and sets the content type.
#[derive(Debug)]
pub struct Json<T>(pub T);

/// A value from the route's merged state map.
#[derive(Debug)]
pub struct State<T>(pub Arc<T>);

impl<T> Deref for State<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> Clone for State<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

/// Why an extractor rejected the request.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("bad request: {reason}")]
    BadRequest { reason: String },

    #[error("unexpected content-type, expected {expected}")]
    ContentType { expected: &'static str },

    #[error("no shared state of type {type_name}")]
    MissingState { type_name: &'static str },

    #[error(transparent)]
    Body(#[from] ParseError),
}

impl ExtractError {
    pub(crate) fn bad_request<S: ToString>(reason: S) -> Self {
        Self::BadRequest { reason: reason.to_string() }
    }
}

impl Responder for ExtractError {
    fn response_to(self, ctx: &RequestContext) -> http::Response<crate::body::ResponseBody> {
        match self {
            ExtractError::BadRequest { reason } => (StatusCode::BAD_REQUEST, reason).response_to(ctx),
            ExtractError::ContentType { expected } => {
                (StatusCode::BAD_REQUEST, format!("unexpected content-type, expected {expected}")).response_to(ctx)
            }
            ExtractError::MissingState { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "shared state is missing").response_to(ctx)
            }
            ExtractError::Body(e) => e.response_to(ctx),
        }
    }
}

/// Whether the request's `Content-Type` matches `expected` (parameters
/// such as `charset` are ignored).
pub(crate) fn content_type_matches(ctx: &RequestContext, expected: &mime::Mime) -> bool {
    ctx.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|text| text.parse::<mime::Mime>().ok())
        .is_some_and(|m| m.type_() == expected.type_() && m.subtype() == expected.subtype())
}
