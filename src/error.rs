//! Error types for the two failure directions of the protocol engine.
//!
//! A `LocalProtocolError` means the embedder asked for something HTTP (or
//! the connection state machine) does not allow; a `RemoteProtocolError`
//! means the peer sent bytes we cannot accept. Header and event
//! construction failures are shared between the two as `HeaderError`.

use httparse;

use state::{EventKind, Role, State};

quick_error! {
    /// A problem with a message head: its headers, method, target,
    /// status code or reason phrase.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum HeaderError {
        InvalidHeaderName {
            description("header name contains invalid characters")
            display("header name contains invalid characters")
        }
        InvalidHeaderValue {
            description("header value contains invalid characters \
                or surrounding whitespace")
            display("header value contains invalid characters \
                or surrounding whitespace")
        }
        BadContentLength {
            description("Content-Length is not a valid nonnegative integer")
            display("Content-Length is not a valid nonnegative integer")
        }
        ConflictingContentLength {
            description("conflicting Content-Length headers")
            display("conflicting Content-Length headers")
        }
        DuplicateTransferEncoding {
            description("multiple Transfer-Encoding headers")
            display("multiple Transfer-Encoding headers")
        }
        UnsupportedTransferEncoding {
            description("only Transfer-Encoding: chunked is supported")
            display("only Transfer-Encoding: chunked is supported")
        }
        ContentLengthAndTransferEncoding {
            description("Content-Length and Transfer-Encoding are \
                mutually exclusive")
            display("Content-Length and Transfer-Encoding are \
                mutually exclusive")
        }
        MissingHost {
            description("HTTP/1.1 requests must have a Host header")
            display("HTTP/1.1 requests must have a Host header")
        }
        DuplicateHost {
            description("found multiple Host headers")
            display("found multiple Host headers")
        }
        InvalidMethod {
            description("request method is not a valid token")
            display("request method is not a valid token")
        }
        InvalidTarget {
            description("request target contains invalid characters")
            display("request target contains invalid characters")
        }
        InvalidStatus {
            description("status code out of range for this event")
            display("status code out of range for this event")
        }
        InvalidReason {
            description("reason phrase contains invalid characters")
            display("reason phrase contains invalid characters")
        }
    }
}

quick_error! {
    /// The embedder tried to do something that violates HTTP or the
    /// connection state machine.
    ///
    /// After `send` fails with one of these, our side of the connection
    /// is in the `Error` state and all further sends fail; receiving
    /// still works so that a server can answer with an error response.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum LocalProtocolError {
        Header(err: HeaderError) {
            description("invalid message head")
            display("invalid message head: {}", err)
            from()
        }
        IllegalTransition(role: Role, state: State, event: EventKind) {
            description("event not allowed in this state")
            display("can't handle event type {:?} when role={:?} and \
                state={:?}", event, role, state)
        }
        ErrorState {
            description("can't send data when our state is Error")
        }
        UnsupportedVersion {
            description("outgoing messages are always HTTP/1.1")
        }
        TooMuchData {
            description("too much data for declared Content-Length")
        }
        TooLittleData {
            description("too little data for declared Content-Length")
        }
        TrailersNotAllowed {
            description("trailers are only allowed with chunked framing")
        }
        RequireBodyless {
            description("this message must not have a body")
        }
        OpaqueNotSupported {
            description("opaque body payloads require \
                send_with_data_passthrough")
        }
        NotReusable {
            description("connection is not ready for a new \
                request/response cycle")
        }
        SwitchWithoutProposal {
            description("attempted to accept a protocol switch the \
                client never proposed")
        }
    }
}

quick_error! {
    /// The peer sent bytes that do not parse or that violate the
    /// protocol. The peer's side of the connection is in the `Error`
    /// state afterwards and `next_event` keeps failing; the embedder may
    /// still craft an error response and close.
    #[derive(Debug)]
    pub enum RemoteProtocolError {
        Header(err: HeaderError) {
            description("peer sent an invalid message head")
            display("peer sent an invalid message head: {}", err)
            from()
        }
        Parse(err: httparse::Error) {
            description("parse error")
            display("parse error: {:?}", err)
            from()
        }
        ChunkParse(err: httparse::InvalidChunkSize) {
            description("chunk size parse error")
            from()
        }
        Protocol(err: LocalProtocolError) {
            description("peer violated the protocol state machine")
            display("peer violated the protocol state machine: {}", err)
            from()
        }
        NotHttp {
            description("received data does not look like HTTP")
        }
        LineTooLong(limit: usize) {
            description("line exceeds maximum allowed length")
            display("line exceeds maximum allowed length ({} bytes)", limit)
        }
        HeadersTooLong(limit: usize) {
            description("header block exceeds maximum allowed length")
            display("header block exceeds maximum allowed length \
                ({} bytes)", limit)
        }
        TruncatedHead {
            description("message head ended prematurely")
        }
        BadLineContinuation {
            description("continuation line at start of headers")
        }
        BadChunkEnd {
            description("chunk data is not terminated by CRLF")
        }
        IncompleteMessage {
            description("peer closed connection without sending a \
                complete message")
        }
        DataAfterEof {
            description("received data after end of stream was signalled")
        }
        UnexpectedData {
            description("received data when no message is expected")
        }
        ErrorState {
            description("can't receive data when peer state is Error")
        }
    }
}
