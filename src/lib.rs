//! A sans-I/O HTTP/1.1 protocol implementation.
//!
//! This crate translates between a stream of bytes and a stream of
//! HTTP *events* without performing any I/O itself. One `Connection`
//! object drives one connection, in either the client or the server
//! role:
//!
//! * bytes read from the peer go in through
//!   [`receive_data`](struct.Connection.html#method.receive_data) and
//!   come back out as events from
//!   [`next_event`](struct.Connection.html#method.next_event);
//! * events handed to [`send`](struct.Connection.html#method.send)
//!   come back as bytes for the embedder to transmit.
//!
//! All methods are synchronous, never block, and complete in time
//! proportional to the bytes they examine; timeouts, sockets and
//! concurrency all belong to the embedding application.

extern crate httparse;
extern crate netbuf;
#[macro_use(quick_error)] extern crate quick_error;
#[macro_use] extern crate matches;
#[macro_use] extern crate log;

mod body;
mod buffer;
mod connection;
mod error;
mod events;
mod headers;
mod parser;
mod serializer;
mod state;
mod version;

pub use body::BodyKind;
pub use connection::{Config, Connection};
pub use error::{HeaderError, LocalProtocolError, RemoteProtocolError};
pub use events::{Data, EndOfMessage, Event, InformationalResponse,
                 NextEvent, OpaqueBody, Payload, Request, Response,
                 Segment};
pub use headers::{HeaderField, Headers};
pub use state::{Role, State};
pub use version::Version;

/// A product identifier suitable for `User-Agent` and `Server` header
/// values. The engine never injects it; set the header yourself if you
/// want it on the wire.
pub const PRODUCT_ID: &'static str =
    concat!("h1-proto/", env!("CARGO_PKG_VERSION"));
