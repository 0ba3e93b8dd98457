//! The connection facade: feed bytes in, pull events out, hand events
//! over, get bytes back.
//!
//! A `Connection` owns the receive buffer, the two coupled role state
//! machines, and the current reader/writer for each direction. All
//! methods are synchronous and complete in time proportional to the
//! bytes they look at; there is no I/O anywhere below this point.

use std::mem;

use body::{self, BodyKind, BodyReader};
use buffer::{ReceiveBuffer,
             DEFAULT_MAX_HEADERS_SIZE, DEFAULT_MAX_LINE_SIZE};
use error::{LocalProtocolError, RemoteProtocolError};
use events::{Event, NextEvent, Response, Segment};
use headers::Headers;
use parser;
use serializer::{self, BodyWriter};
use state::{ConnectionState, EventKind, Role, State, Switch};
use version::Version;

/// Parser limits.
///
/// The two bounds cap how much may be buffered while waiting for a
/// line or a header block to complete; crossing one is a remote
/// protocol error (this is the slowloris defence).
#[derive(Debug, Clone)]
pub struct Config {
    max_line_size: usize,
    max_headers_size: usize,
}

impl Config {
    /// Create a config with defaults: 16 KiB per line, 32 KiB per
    /// header block.
    pub fn new() -> Config {
        Config {
            max_line_size: DEFAULT_MAX_LINE_SIZE,
            max_headers_size: DEFAULT_MAX_HEADERS_SIZE,
        }
    }

    /// Maximum length of a request line, status line or chunk-size
    /// line.
    pub fn max_line_size(&mut self, value: usize) -> &mut Self {
        self.max_line_size = value;
        self
    }

    /// Maximum length of a header block, including the terminating
    /// blank line. Also applies to chunked trailers.
    pub fn max_headers_size(&mut self, value: usize) -> &mut Self {
        self.max_headers_size = value;
        self
    }
}

#[derive(Debug)]
enum Reader {
    RequestHead,
    ResponseHead,
    Body(BodyReader),
    /// No message is expected from the peer right now.
    Nothing,
}

#[derive(Debug)]
enum Writer {
    RequestHead,
    ResponseHead,
    Body(BodyWriter),
    Nothing,
}

/// A sans-I/O HTTP/1.1 connection.
///
/// Created with a fixed role, it traverses one or more
/// request/response cycles and ends up `Closed` (clean) or `Error`
/// (unclean). The embedder moves bytes between this object and its
/// socket:
///
/// * `receive_data` / `next_event` on the incoming side,
/// * `send` (or `send_with_data_passthrough`) on the outgoing side.
#[derive(Debug)]
pub struct Connection {
    our_role: Role,
    cstate: ConnectionState,
    buffer: ReceiveBuffer,
    their_http_version: Option<Version>,
    request_method: Option<Vec<u8>>,
    client_is_waiting_for_100_continue: bool,
    reader: Reader,
    writer: Writer,
}

impl Connection {
    pub fn new(role: Role) -> Connection {
        Connection::with_config(role, &Config::new())
    }

    pub fn with_config(role: Role, config: &Config) -> Connection {
        Connection {
            our_role: role,
            cstate: ConnectionState::new(),
            buffer: ReceiveBuffer::new(config.max_line_size,
                config.max_headers_size),
            their_http_version: None,
            request_method: None,
            client_is_waiting_for_100_continue: false,
            reader: head_reader(role.peer()),
            writer: head_writer(role),
        }
    }

    pub fn our_role(&self) -> Role {
        self.our_role
    }

    pub fn their_role(&self) -> Role {
        self.our_role.peer()
    }

    pub fn our_state(&self) -> State {
        self.cstate.state(self.our_role)
    }

    pub fn their_state(&self) -> State {
        self.cstate.state(self.their_role())
    }

    /// The HTTP version the peer announced, once its first start-line
    /// has been seen.
    pub fn their_http_version(&self) -> Option<Version> {
        self.their_http_version
    }

    /// True on a server connection while the client is blocked on
    /// `Expect: 100-continue`. Sending any response event or response
    /// data clears it.
    pub fn they_are_waiting_for_100_continue(&self) -> bool {
        self.their_role() == Role::Client
            && self.client_is_waiting_for_100_continue
    }

    pub fn client_is_waiting_for_100_continue(&self) -> bool {
        self.client_is_waiting_for_100_continue
    }

    /// Bytes received but not interpreted as HTTP: everything buffered
    /// after a protocol switch or an unclean close, plus whether the
    /// peer already signalled EOF. The new owner of the connection
    /// starts from here.
    pub fn trailing_data(&self) -> (Vec<u8>, bool) {
        (self.buffer.data().to_vec(), self.buffer.is_eof())
    }

    /// Append bytes received from the peer.
    ///
    /// An empty slice means the peer will send no more bytes
    /// (half-duplex EOF); that is a signal, not an error. Non-empty
    /// input after the EOF signal is rejected.
    pub fn receive_data(&mut self, data: &[u8])
        -> Result<(), RemoteProtocolError>
    {
        if data.is_empty() {
            self.buffer.mark_eof();
            return Ok(());
        }
        if self.buffer.is_eof() {
            return Err(RemoteProtocolError::DataAfterEof);
        }
        self.buffer.feed(data);
        Ok(())
    }

    /// Pull the next thing off the incoming side.
    ///
    /// Yields an event, `NeedData` when nothing complete is buffered,
    /// or `Paused` while byte interpretation is suspended (pipelined
    /// data waiting for `start_next_cycle`, or a protocol switch
    /// proposed/complete). On a remote protocol error the peer's side
    /// goes to `Error` and every further call fails.
    pub fn next_event(&mut self) -> Result<NextEvent, RemoteProtocolError> {
        if self.their_state() == State::Error {
            return Err(RemoteProtocolError::ErrorState);
        }
        match self.extract_next_event() {
            Ok(next) => Ok(next),
            Err(err) => {
                debug!("receive error: {}", err);
                let (old_client, old_server) = self.states();
                self.cstate.process_error(self.their_role());
                self.update_io(old_client, old_server, None);
                Err(err)
            }
        }
    }

    /// Serialize one outgoing event, concatenated to a single byte
    /// vector. `ConnectionClosed` yields `None`: the embedder closes
    /// the socket instead. Opaque body payloads cannot be
    /// concatenated; use `send_with_data_passthrough` for those.
    pub fn send(&mut self, event: Event)
        -> Result<Option<Vec<u8>>, LocalProtocolError>
    {
        if let Event::Data(ref data) = event {
            if data.data.as_bytes().is_none() {
                return Err(LocalProtocolError::OpaqueNotSupported);
            }
        }
        match self.send_with_data_passthrough(event)? {
            None => Ok(None),
            Some(segments) => {
                let mut out = Vec::new();
                for segment in segments {
                    match segment {
                        Segment::Bytes(bytes) => {
                            out.extend_from_slice(&bytes)
                        }
                        // send() refused opaque data above
                        Segment::Opaque(_) => unreachable!(),
                    }
                }
                Ok(Some(out))
            }
        }
    }

    /// Like `send`, but returns the ordered list of byte slices and
    /// opaque payloads, so an opaque body (say, a file handle) can go
    /// straight to a zero-copy send primitive.
    ///
    /// On a local protocol error our side goes to `Error`: all further
    /// sends fail, while receiving keeps working so a server can still
    /// produce an error response.
    pub fn send_with_data_passthrough(&mut self, event: Event)
        -> Result<Option<Vec<Segment>>, LocalProtocolError>
    {
        if self.our_state() == State::Error {
            return Err(LocalProtocolError::ErrorState);
        }
        match self.send_inner(event) {
            Ok(result) => Ok(result),
            Err(err) => {
                debug!("send error: {}", err);
                let (old_client, old_server) = self.states();
                self.cstate.process_error(self.our_role);
                self.update_io(old_client, old_server, None);
                Err(err)
            }
        }
    }

    /// Declare that bytes returned from a previous `send` were never
    /// actually transmitted. Our side goes to `Error` so the
    /// connection cannot be mistaken for reusable.
    pub fn send_failed(&mut self) {
        let (old_client, old_server) = self.states();
        self.cstate.process_error(self.our_role);
        self.update_io(old_client, old_server, None);
    }

    /// Reset for the next request/response cycle.
    ///
    /// Only legal when both sides are `Done`, keep-alive survived and
    /// no protocol switch happened. The peer's HTTP version and the
    /// keep-alive latch carry over; buffered pipelined bytes become
    /// parseable again.
    pub fn start_next_cycle(&mut self) -> Result<(), LocalProtocolError> {
        let (old_client, old_server) = self.states();
        self.cstate.start_next_cycle()?;
        trace!("{:?}: starting next cycle", self.our_role);
        self.request_method = None;
        self.update_io(old_client, old_server, None);
        Ok(())
    }

    fn states(&self) -> (State, State) {
        (self.cstate.state(Role::Client), self.cstate.state(Role::Server))
    }

    fn extract_next_event(&mut self)
        -> Result<NextEvent, RemoteProtocolError>
    {
        let their_state = self.their_state();
        // Even in Done we can still see ConnectionClosed; but buffered
        // bytes in Done belong to the next cycle and must wait for the
        // reset.
        if their_state == State::Done && !self.buffer.is_empty() {
            return Ok(NextEvent::Paused);
        }
        if their_state == State::MightSwitchProtocol
            || their_state == State::SwitchedProtocol
        {
            return Ok(NextEvent::Paused);
        }
        let event = match self.read_once()? {
            Some(event) => Some(event),
            None => {
                if self.buffer.is_empty() && self.buffer.is_eof() {
                    Some(self.read_eof_event()?)
                } else if self.buffer.is_eof() {
                    // EOF in the middle of an incomplete event
                    return Err(RemoteProtocolError::IncompleteMessage);
                } else {
                    None
                }
            }
        };
        match event {
            None => Ok(NextEvent::NeedData),
            Some(event) => {
                self.process_event(self.their_role(), &event)
                    .map_err(RemoteProtocolError::Protocol)?;
                Ok(NextEvent::Event(event))
            }
        }
    }

    fn read_once(&mut self) -> Result<Option<Event>, RemoteProtocolError> {
        match self.reader {
            Reader::RequestHead => {
                Ok(parser::read_request_head(&mut self.buffer)?
                    .map(Event::Request))
            }
            Reader::ResponseHead => {
                parser::read_response_head(&mut self.buffer)
            }
            Reader::Body(ref mut reader) => reader.read(&mut self.buffer),
            Reader::Nothing => {
                if self.buffer.is_empty() {
                    Ok(None)
                } else {
                    Err(RemoteProtocolError::UnexpectedData)
                }
            }
        }
    }

    /// The peer signalled EOF and everything buffered has been
    /// consumed: turn that into an event.
    fn read_eof_event(&self) -> Result<Event, RemoteProtocolError> {
        match self.reader {
            Reader::Body(ref reader) => reader.read_eof(),
            Reader::RequestHead | Reader::ResponseHead | Reader::Nothing => {
                Ok(Event::ConnectionClosed)
            }
        }
    }

    fn send_inner(&mut self, mut event: Event)
        -> Result<Option<Vec<Segment>>, LocalProtocolError>
    {
        if let Event::Response(ref mut response) = event {
            self.clean_up_response_headers(response);
        }
        let old_our = self.our_state();
        // The head writer that serializes this event is decided by the
        // state we are in *now*; processing the event swaps in the
        // writer for whatever comes next.
        let mut writer = mem::replace(&mut self.writer, Writer::Nothing);
        self.process_event(self.our_role, &event)?;
        let mut out = Vec::new();
        match event {
            Event::ConnectionClosed => return Ok(None),
            Event::Request(ref request) => {
                match writer {
                    Writer::RequestHead => {
                        let mut head = Vec::new();
                        serializer::render_request(request, &mut head)?;
                        out.push(Segment::Bytes(head));
                    }
                    _ => unreachable!(),
                }
            }
            Event::InformationalResponse(ref response) => {
                match writer {
                    Writer::ResponseHead => {
                        let mut head = Vec::new();
                        serializer::render_informational(response,
                            &mut head)?;
                        out.push(Segment::Bytes(head));
                    }
                    _ => unreachable!(),
                }
            }
            Event::Response(ref response) => {
                match writer {
                    Writer::ResponseHead => {
                        let mut head = Vec::new();
                        serializer::render_response(response, &mut head)?;
                        out.push(Segment::Bytes(head));
                    }
                    _ => unreachable!(),
                }
            }
            Event::Data(data) => {
                match writer {
                    Writer::Body(ref mut body) => {
                        body.write_data(data.data, &mut out)?;
                    }
                    _ => unreachable!(),
                }
            }
            Event::EndOfMessage(ref end) => {
                match writer {
                    Writer::Body(ref mut body) => {
                        body.write_end(end, &mut out)?;
                    }
                    _ => unreachable!(),
                }
            }
        }
        // Stateful writers survive while the state stands still (body
        // data); on a transition the new writer is already installed.
        if self.our_state() == old_our {
            self.writer = writer;
        }
        Ok(Some(out))
    }

    /// Run one event through the state machine and all the sub-state
    /// bookkeeping; used for both directions.
    fn process_event(&mut self, role: Role, event: &Event)
        -> Result<(), LocalProtocolError>
    {
        let (old_client, old_server) = self.states();
        if role == Role::Client {
            if let Event::Request(ref request) = *event {
                if request.method == b"CONNECT" {
                    self.cstate.process_client_switch_proposal(
                        Switch::Connect);
                }
                if request.headers.has_upgrade() {
                    self.cstate.process_client_switch_proposal(
                        Switch::Upgrade);
                }
            }
        }
        let server_switch = if role == Role::Server {
            self.server_switch_event(event)
        } else {
            None
        };
        self.cstate.process_event(role, event_kind(event), server_switch)?;

        if let Event::Request(ref request) = *event {
            self.request_method = Some(request.method.clone());
            if request.headers.expects_continue() {
                self.client_is_waiting_for_100_continue = true;
            }
        }
        if role == self.their_role() {
            match *event {
                Event::Request(ref r) => {
                    self.their_http_version = Some(r.http_version);
                }
                Event::InformationalResponse(ref r) => {
                    self.their_http_version = Some(r.http_version);
                }
                Event::Response(ref r) => {
                    self.their_http_version = Some(r.http_version);
                }
                _ => {}
            }
        }
        match *event {
            Event::Request(ref r) => {
                if !keeps_alive(&r.headers, r.http_version) {
                    self.cstate.process_keep_alive_disabled();
                }
            }
            Event::Response(ref r) => {
                if !keeps_alive(&r.headers, r.http_version) {
                    self.cstate.process_keep_alive_disabled();
                }
            }
            _ => {}
        }
        match (role, event) {
            (Role::Client, &Event::Data(_)) |
            (Role::Client, &Event::EndOfMessage(_)) |
            (Role::Server, &Event::InformationalResponse(_)) |
            (Role::Server, &Event::Response(_)) => {
                self.client_is_waiting_for_100_continue = false;
            }
            _ => {}
        }
        trace!("{:?} event {:?}: client={:?} server={:?}",
            role, event_kind(event),
            self.cstate.state(Role::Client),
            self.cstate.state(Role::Server));
        self.update_io(old_client, old_server, Some(event));
        Ok(())
    }

    /// Does this server response accept a pending switch proposal?
    fn server_switch_event(&self, event: &Event) -> Option<Switch> {
        match *event {
            Event::InformationalResponse(ref response)
                if response.status_code == 101 =>
            {
                Some(Switch::Upgrade)
            }
            Event::Response(ref response)
                if self.cstate.proposed(Switch::Connect)
                    && response.status_code >= 200
                    && response.status_code < 300 =>
            {
                Some(Switch::Connect)
            }
            _ => None,
        }
    }

    /// Swap readers and writers to match any state changes.
    ///
    /// `event` is the event that caused the change, needed to pick the
    /// body framing when a side enters `SendBody`.
    fn update_io(&mut self, old_client: State, old_server: State,
        event: Option<&Event>)
    {
        let our = self.our_role;
        let their = self.their_role();
        let old_our = match our {
            Role::Client => old_client,
            Role::Server => old_server,
        };
        let new_our = self.cstate.state(our);
        if new_our != old_our {
            self.writer = match new_our {
                State::Idle => head_writer(our),
                State::SendResponse => Writer::ResponseHead,
                State::SendBody => {
                    Writer::Body(self.body_writer_for(event))
                }
                _ => Writer::Nothing,
            };
        }
        let old_their = match their {
            Role::Client => old_client,
            Role::Server => old_server,
        };
        let new_their = self.cstate.state(their);
        if new_their != old_their {
            self.reader = match new_their {
                State::Idle => head_reader(their),
                State::SendResponse => Reader::ResponseHead,
                State::SendBody => {
                    Reader::Body(BodyReader::for_kind(
                        self.framing_for(event)))
                }
                _ => Reader::Nothing,
            };
        }
    }

    /// Body framing for the head event that just opened a body.
    fn framing_for(&self, event: Option<&Event>) -> BodyKind {
        match event {
            Some(&Event::Request(ref request)) => {
                body::request_framing(&request.headers)
            }
            Some(&Event::Response(ref response)) => {
                body::response_framing(
                    self.request_method.as_ref().map(|m| &m[..]),
                    response.status_code, &response.headers)
            }
            // only requests and responses open a body
            _ => unreachable!(),
        }
    }

    fn body_writer_for(&self, event: Option<&Event>) -> BodyWriter {
        match self.framing_for(event) {
            BodyKind::NoBody => BodyWriter::NoBody,
            BodyKind::Fixed(n) => BodyWriter::Fixed { remaining: n },
            BodyKind::Chunked => BodyWriter::Chunked,
            BodyKind::Eof => BodyWriter::Eof,
        }
    }

    /// Adjust response headers at send time: insert the automatic
    /// framing (`Transfer-Encoding: chunked` for a 1.1 peer,
    /// close-delimited for a 1.0 peer) and `Connection: close` when
    /// this connection cannot be reused.
    fn clean_up_response_headers(&self, response: &mut Response) {
        // Responses to HEAD pick their framing headers as if the
        // request were GET; no body bytes follow either way.
        let method_for_headers = match self.request_method {
            Some(ref method) if &method[..] == b"HEAD" => Some(&b"GET"[..]),
            Some(ref method) => Some(&method[..]),
            None => None,
        };
        let framing = body::response_framing(method_for_headers,
            response.status_code, &response.headers);
        let mut need_close = false;
        match framing {
            BodyKind::Chunked | BodyKind::Eof => {
                let peer_is_1_1 = self.their_http_version
                    .map_or(false, |v| v >= Version::Http11);
                if peer_is_1_1 {
                    response.headers.set_comma_values(
                        b"transfer-encoding", &[b"chunked"]);
                } else {
                    // HTTP/1.0 peers don't understand chunked; the
                    // connection close delimits the body instead
                    response.headers.set_comma_values(
                        b"transfer-encoding", &[]);
                    need_close = true;
                }
            }
            _ => {}
        }
        if !self.cstate.keep_alive() || need_close {
            let mut connection =
                response.headers.get_comma_values(b"connection");
            connection.retain(|v| &v[..] != b"keep-alive");
            if !connection.iter().any(|v| &v[..] == b"close") {
                connection.push(b"close".to_vec());
            }
            let values: Vec<&[u8]> =
                connection.iter().map(|v| &v[..]).collect();
            response.headers.set_comma_values(b"connection", &values);
        }
    }
}

fn head_reader(role: Role) -> Reader {
    match role {
        Role::Client => Reader::RequestHead,
        Role::Server => Reader::ResponseHead,
    }
}

fn head_writer(role: Role) -> Writer {
    match role {
        Role::Client => Writer::RequestHead,
        Role::Server => Writer::ResponseHead,
    }
}

fn event_kind(event: &Event) -> EventKind {
    match *event {
        Event::Request(_) => EventKind::Request,
        Event::InformationalResponse(_) => EventKind::InformationalResponse,
        Event::Response(_) => EventKind::Response,
        Event::Data(_) => EventKind::Data,
        Event::EndOfMessage(_) => EventKind::EndOfMessage,
        Event::ConnectionClosed => EventKind::ConnectionClosed,
    }
}

fn keeps_alive(headers: &Headers, version: Version) -> bool {
    !headers.connection_close() && version >= Version::Http11
}
