//! Async HTTP/1.1 protocol engine.
//!
//! This crate contains the wire-level half of the framework: the message
//! model ([`protocol`]), the framed codecs that translate between raw bytes
//! and messages ([`codec`]), and the per-connection state machines that
//! drive one exchange at a time over an arbitrary transport
//! ([`connection`]).
//!
//! The crate is transport-agnostic: connections operate on any
//! `AsyncRead`/`AsyncWrite` pair, so plain TCP, TLS streams and in-memory
//! duplex pipes all behave the same way.

pub mod codec;
pub mod connection;
pub mod handler;
pub mod protocol;

pub(crate) use help::ensure;

mod help {

    macro_rules! ensure {
        ($predicate:expr, $error:expr) => {
            if !$predicate {
                return Err($error);
            }
        };
    }
    pub(crate) use ensure;
}
