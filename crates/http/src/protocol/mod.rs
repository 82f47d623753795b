//! Core HTTP protocol types.
//!
//! Everything the codecs and connections exchange is defined here:
//!
//! - [`Message`] — the unit produced and consumed by the framed codecs,
//!   either a message head or a payload item;
//! - [`PayloadItem`] / [`BodyKind`] — payload chunks and the tagged body
//!   framing (empty / sized / chunked);
//! - [`RequestHead`] / [`ResponseHead`] — message heads without a body
//!   attached;
//! - [`ConnectInfo`] — the endpoints of the underlying transport;
//! - [`body`] — the streaming request body handed to handlers, plus
//!   [`body::read_until_eof`] for bounded draining;
//! - [`HttpError`] and friends — the error taxonomy shared by parser,
//!   serializer and connections.

mod message;
pub use message::BodyKind;
pub use message::Message;
pub use message::PayloadItem;

mod request;
pub use request::ConnectInfo;
pub use request::RequestHead;

mod response;
pub use response::ResponseHead;

mod error;
pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;

pub mod body;
