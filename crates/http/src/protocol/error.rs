//! Error taxonomy for the protocol engine.
//!
//! [`HttpError`] is the union surfaced at connection boundaries; it wraps
//! either a [`ParseError`] (inbound half: head parsing, body decoding,
//! deadlines while reading) or a [`SendError`] (outbound half: serializing
//! and writing). The web layer maps these onto HTTP status codes; a
//! `TimedOut` closes the connection without a response.

use std::io;
use thiserror::Error;

/// Any error a connection can produce.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request error: {source}")]
    Parse {
        #[from]
        source: ParseError,
    },

    #[error("response error: {source}")]
    Send {
        #[from]
        source: SendError,
    },
}

impl HttpError {
    /// True when the error is a deadline expiry on either half.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            HttpError::Parse { source: ParseError::TimedOut } | HttpError::Send { source: SendError::TimedOut }
        )
    }
}

/// Errors produced while reading and parsing the inbound message.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("head size {size} exceeds the limit of {limit} bytes")]
    HeadTooLarge { size: usize, limit: usize },

    #[error("more than {limit} headers in message head")]
    TooManyHeaders { limit: usize },

    #[error("invalid message head: {reason}")]
    InvalidHead { reason: String },

    #[error("unsupported http version: {0:?}")]
    InvalidVersion(Option<u8>),

    #[error("invalid http method")]
    InvalidMethod,

    #[error("invalid request target")]
    InvalidUri,

    #[error("invalid content-length header: {reason}")]
    InvalidContentLength { reason: String },

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("body exceeds the limit of {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("deadline elapsed while reading")]
    TimedOut,

    #[error("connection closed before the message was complete")]
    UnexpectedEof,

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn invalid_head<S: ToString>(reason: S) -> Self {
        Self::InvalidHead { reason: reason.to_string() }
    }

    pub fn invalid_body<S: ToString>(reason: S) -> Self {
        Self::InvalidBody { reason: reason.to_string() }
    }

    pub fn invalid_content_length<S: ToString>(reason: S) -> Self {
        Self::InvalidContentLength { reason: reason.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

/// Errors produced while serializing and writing the outbound message.
#[derive(Error, Debug)]
pub enum SendError {
    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("deadline elapsed while writing")]
    TimedOut,

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn invalid_body<S: ToString>(reason: S) -> Self {
        Self::InvalidBody { reason: reason.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}
