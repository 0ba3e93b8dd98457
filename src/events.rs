//! The events that flow through a connection.
//!
//! Events are what the embedder sends and what `next_event` hands back:
//! a message head (`Request`, `Response`, `InformationalResponse`),
//! body data, the end-of-message marker, or the half-duplex close
//! signal. Construction goes through validating constructors so that a
//! malformed event can never reach (and corrupt) a connection.

use std::fmt;

use error::HeaderError;
use headers::{Headers, is_token};
use version::Version;

/// A body payload the engine never looks inside of.
///
/// Only the length is used, to produce framing bytes; the payload
/// itself is handed back untouched from `send_with_data_passthrough`,
/// so the embedder can route it to a zero-copy primitive such as
/// `sendfile`.
pub trait OpaqueBody: fmt::Debug {
    fn len(&self) -> u64;
}

/// The payload of a `Data` event: either plain bytes or an opaque
/// handle with a known length.
#[derive(Debug)]
pub enum Payload {
    Bytes(Vec<u8>),
    Opaque(Box<dyn OpaqueBody>),
}

impl Payload {
    pub fn len(&self) -> u64 {
        match *self {
            Payload::Bytes(ref b) => b.len() as u64,
            Payload::Opaque(ref o) => o.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The bytes, if this is a bytes payload.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match *self {
            Payload::Bytes(ref b) => Some(b),
            Payload::Opaque(_) => None,
        }
    }
}

impl PartialEq for Payload {
    fn eq(&self, other: &Payload) -> bool {
        match (self, other) {
            (&Payload::Bytes(ref a), &Payload::Bytes(ref b)) => a == b,
            // opaque payloads have no notion of equality
            _ => false,
        }
    }
}

impl From<Vec<u8>> for Payload {
    fn from(data: Vec<u8>) -> Payload {
        Payload::Bytes(data)
    }
}

impl<'a> From<&'a [u8]> for Payload {
    fn from(data: &'a [u8]) -> Payload {
        Payload::Bytes(data.to_vec())
    }
}

impl<'a> From<&'a str> for Payload {
    fn from(data: &'a str) -> Payload {
        Payload::Bytes(data.as_bytes().to_vec())
    }
}

/// One piece of the wire output of `send_with_data_passthrough`:
/// either framing/head bytes produced by the engine, or an opaque
/// payload passed through in order.
#[derive(Debug)]
pub enum Segment {
    Bytes(Vec<u8>),
    Opaque(Box<dyn OpaqueBody>),
}

/// A request start-line plus headers (client to server).
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Vec<u8>,
    pub target: Vec<u8>,
    pub headers: Headers,
    pub http_version: Version,
}

impl Request {
    pub fn new<M, T>(method: M, target: T, headers: Headers,
        http_version: Version)
        -> Result<Request, HeaderError>
        where M: AsRef<[u8]>, T: AsRef<[u8]>
    {
        let method = method.as_ref();
        let target = target.as_ref();
        if !is_token(method) {
            return Err(HeaderError::InvalidMethod);
        }
        if !is_request_target(target) {
            return Err(HeaderError::InvalidTarget);
        }
        if http_version == Version::Http11 {
            match headers.count(b"host") {
                0 => return Err(HeaderError::MissingHost),
                1 => {}
                _ => return Err(HeaderError::DuplicateHost),
            }
        }
        Ok(Request {
            method: method.to_vec(),
            target: target.to_vec(),
            headers: headers,
            http_version: http_version,
        })
    }
}

/// An interim response: status codes 100 through 199.
#[derive(Debug, Clone, PartialEq)]
pub struct InformationalResponse {
    pub status_code: u16,
    pub headers: Headers,
    pub http_version: Version,
    pub reason: Vec<u8>,
}

impl InformationalResponse {
    pub fn new<R>(status_code: u16, reason: R, headers: Headers,
        http_version: Version)
        -> Result<InformationalResponse, HeaderError>
        where R: AsRef<[u8]>
    {
        if status_code < 100 || status_code > 199 {
            return Err(HeaderError::InvalidStatus);
        }
        let reason = validate_reason(reason.as_ref())?;
        Ok(InformationalResponse {
            status_code: status_code,
            headers: headers,
            http_version: http_version,
            reason: reason,
        })
    }
}

/// A final response: status codes 200 through 999.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status_code: u16,
    pub headers: Headers,
    pub http_version: Version,
    pub reason: Vec<u8>,
}

impl Response {
    pub fn new<R>(status_code: u16, reason: R, headers: Headers,
        http_version: Version)
        -> Result<Response, HeaderError>
        where R: AsRef<[u8]>
    {
        if status_code < 200 || status_code > 999 {
            return Err(HeaderError::InvalidStatus);
        }
        let reason = validate_reason(reason.as_ref())?;
        Ok(Response {
            status_code: status_code,
            headers: headers,
            http_version: http_version,
            reason: reason,
        })
    }
}

/// A slice of a message body.
///
/// The chunk flags are only meaningful when the message uses chunked
/// framing: `chunk_start` marks the first `Data` produced from a wire
/// chunk and `chunk_end` the last one. On sending they are ignored
/// (every `Data` becomes its own chunk).
#[derive(Debug, PartialEq)]
pub struct Data {
    pub data: Payload,
    pub chunk_start: bool,
    pub chunk_end: bool,
}

impl Data {
    pub fn new<P: Into<Payload>>(data: P) -> Data {
        Data {
            data: data.into(),
            chunk_start: false,
            chunk_end: false,
        }
    }
}

/// End of the message body. `headers` may carry trailers, which are
/// only allowed under chunked framing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EndOfMessage {
    pub headers: Headers,
}

#[derive(Debug, PartialEq)]
pub enum Event {
    Request(Request),
    InformationalResponse(InformationalResponse),
    Response(Response),
    Data(Data),
    EndOfMessage(EndOfMessage),
    ConnectionClosed,
}

impl From<Request> for Event {
    fn from(e: Request) -> Event { Event::Request(e) }
}

impl From<InformationalResponse> for Event {
    fn from(e: InformationalResponse) -> Event {
        Event::InformationalResponse(e)
    }
}

impl From<Response> for Event {
    fn from(e: Response) -> Event { Event::Response(e) }
}

impl From<Data> for Event {
    fn from(e: Data) -> Event { Event::Data(e) }
}

impl From<EndOfMessage> for Event {
    fn from(e: EndOfMessage) -> Event { Event::EndOfMessage(e) }
}

/// What `Connection::next_event` yields.
///
/// The two non-event outcomes are control signals, not failures:
/// `NeedData` means no complete event is buffered yet, `Paused` means
/// byte interpretation is suspended (pipelined data waiting for
/// `start_next_cycle`, or a protocol switch in progress or complete).
#[derive(Debug, PartialEq)]
pub enum NextEvent {
    Event(Event),
    NeedData,
    Paused,
}

/// Request targets are visible ASCII with no whitespace and no
/// control bytes.
fn is_request_target(target: &[u8]) -> bool {
    !target.is_empty()
        && target.iter().all(|&b| b >= 0x21 && b <= 0x7e)
}

fn validate_reason(reason: &[u8]) -> Result<Vec<u8>, HeaderError> {
    let ok = reason.iter().all(|&b| {
        b == b'\t' || b == b' ' || (b >= 0x21 && b <= 0x7e) || b >= 0x80
    });
    if ok {
        Ok(reason.to_vec())
    } else {
        Err(HeaderError::InvalidReason)
    }
}
