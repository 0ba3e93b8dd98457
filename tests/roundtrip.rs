//! End-to-end scenarios: one connection per role, wire bytes in
//! between, and the events that must come out on each side.

extern crate env_logger;
extern crate h1_proto;
#[macro_use] extern crate matches;

use h1_proto::{Connection, Data, EndOfMessage, Event, Headers,
               InformationalResponse, NextEvent, RemoteProtocolError,
               Request, Response, Role, State, Version};

fn init() {
    let _ = env_logger::init();
}

fn host_headers() -> Headers {
    Headers::from_pairs(vec![("Host", "example.com")]).unwrap()
}

/// Drain everything currently decodable. Stops on `NeedData`,
/// `Paused`, or after a `ConnectionClosed`.
fn pump(conn: &mut Connection) -> Vec<Event> {
    let mut events = Vec::new();
    loop {
        match conn.next_event().unwrap() {
            NextEvent::NeedData | NextEvent::Paused => return events,
            NextEvent::Event(Event::ConnectionClosed) => {
                events.push(Event::ConnectionClosed);
                return events;
            }
            NextEvent::Event(event) => events.push(event),
        }
    }
}

fn body_of(events: &[Event]) -> Vec<u8> {
    let mut body = Vec::new();
    for event in events {
        if let Event::Data(ref data) = *event {
            body.extend_from_slice(data.data.as_bytes().unwrap());
        }
    }
    body
}

#[test]
fn minimal_get_round_trip() {
    init();
    let mut client = Connection::new(Role::Client);
    let mut server = Connection::new(Role::Server);

    let request = Request::new("GET", "/", host_headers(),
        Version::Http11).unwrap();
    let mut wire = client.send(request.into()).unwrap().unwrap();
    wire.extend_from_slice(
        &client.send(EndOfMessage::default().into()).unwrap().unwrap());
    assert_eq!(&wire[..],
        &b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n"[..]);

    server.receive_data(&wire).unwrap();
    let events = pump(&mut server);
    assert_eq!(events.len(), 2);
    match events[0] {
        Event::Request(ref request) => {
            assert_eq!(request.method, b"GET");
            assert_eq!(request.target, b"/");
            assert_eq!(request.http_version, Version::Http11);
        }
        ref other => panic!("unexpected event: {:?}", other),
    }
    assert!(matches!(events[1], Event::EndOfMessage(_)));
    assert_eq!(server.their_http_version(), Some(Version::Http11));

    let response = Response::new(200, "",
        Headers::from_pairs(vec![("Content-Length", "5")]).unwrap(),
        Version::Http11).unwrap();
    let mut wire = server.send(response.into()).unwrap().unwrap();
    assert_eq!(&wire[..],
        &b"HTTP/1.1 200 \r\nContent-Length: 5\r\n\r\n"[..]);
    wire.extend_from_slice(
        &server.send(Data::new("hello").into()).unwrap().unwrap());
    wire.extend_from_slice(
        &server.send(EndOfMessage::default().into()).unwrap().unwrap());

    client.receive_data(&wire).unwrap();
    let events = pump(&mut client);
    assert_eq!(events.len(), 3);
    assert!(matches!(events[0], Event::Response(ref r)
        if r.status_code == 200));
    assert_eq!(body_of(&events), b"hello");
    assert!(matches!(events[2], Event::EndOfMessage(_)));

    assert_eq!(client.our_state(), State::Done);
    assert_eq!(client.their_state(), State::Done);
    assert_eq!(server.our_state(), State::Done);
    assert_eq!(server.their_state(), State::Done);
    client.start_next_cycle().unwrap();
    server.start_next_cycle().unwrap();
    assert_eq!(client.our_state(), State::Idle);
    assert_eq!(server.our_state(), State::Idle);
    // the peer's version survives the reset
    assert_eq!(server.their_http_version(), Some(Version::Http11));
}

#[test]
fn chunked_post_with_trailer() {
    init();
    let mut client = Connection::new(Role::Client);
    let mut server = Connection::new(Role::Server);

    let request = Request::new("POST", "/upload",
        Headers::from_pairs(vec![
            ("Host", "example.com"),
            ("Transfer-Encoding", "chunked"),
        ]).unwrap(),
        Version::Http11).unwrap();
    let head = client.send(request.into()).unwrap().unwrap();
    let mut body = client.send(Data::new("ab").into()).unwrap().unwrap();
    body.extend_from_slice(
        &client.send(Data::new("cde").into()).unwrap().unwrap());
    let trailers = EndOfMessage {
        headers: Headers::from_pairs(vec![("X-Trailer", "t")]).unwrap(),
    };
    body.extend_from_slice(
        &client.send(trailers.into()).unwrap().unwrap());
    assert_eq!(&body[..],
        &b"2\r\nab\r\n3\r\ncde\r\n0\r\nX-Trailer: t\r\n\r\n"[..]);

    server.receive_data(&head).unwrap();
    server.receive_data(&body).unwrap();
    let events = pump(&mut server);
    assert_eq!(events.len(), 4);
    match events[1] {
        Event::Data(ref data) => {
            assert_eq!(data.data.as_bytes(), Some(&b"ab"[..]));
            assert!(data.chunk_start && data.chunk_end);
        }
        ref other => panic!("unexpected event: {:?}", other),
    }
    match events[2] {
        Event::Data(ref data) => {
            assert_eq!(data.data.as_bytes(), Some(&b"cde"[..]));
            assert!(data.chunk_start && data.chunk_end);
        }
        ref other => panic!("unexpected event: {:?}", other),
    }
    match events[3] {
        Event::EndOfMessage(ref end) => {
            assert_eq!(end.headers.get_first(b"x-trailer"),
                       Some(&b"t"[..]));
        }
        ref other => panic!("unexpected event: {:?}", other),
    }
}

#[test]
fn split_feeding_is_equivalent() {
    init();
    // same transmit stream as chunked_post_with_trailer, fed one byte
    // at a time
    let wire: &[u8] = b"POST /upload HTTP/1.1\r\n\
        Host: example.com\r\n\
        Transfer-Encoding: chunked\r\n\r\n\
        2\r\nab\r\n3\r\ncde\r\n0\r\nX-Trailer: t\r\n\r\n";
    let mut server = Connection::new(Role::Server);
    let mut events = Vec::new();
    for byte in wire {
        server.receive_data(&[*byte]).unwrap();
        events.extend(pump(&mut server));
    }
    assert!(matches!(events[0], Event::Request(_)));
    assert_eq!(body_of(&events), b"abcde");
    // chunk flags still bracket each chunk exactly once
    let starts = events.iter().filter(|e| match **e {
        Event::Data(ref d) => d.chunk_start,
        _ => false,
    }).count();
    let ends = events.iter().filter(|e| match **e {
        Event::Data(ref d) => d.chunk_end,
        _ => false,
    }).count();
    assert_eq!(starts, 2);
    assert_eq!(ends, 2);
    assert!(matches!(*events.last().unwrap(), Event::EndOfMessage(_)));
}

#[test]
fn head_response_has_no_body() {
    init();
    let mut client = Connection::new(Role::Client);
    let mut server = Connection::new(Role::Server);

    let request = Request::new("HEAD", "/", host_headers(),
        Version::Http11).unwrap();
    let mut wire = client.send(request.into()).unwrap().unwrap();
    wire.extend_from_slice(
        &client.send(EndOfMessage::default().into()).unwrap().unwrap());
    server.receive_data(&wire).unwrap();
    pump(&mut server);

    let response = Response::new(200, "OK",
        Headers::from_pairs(vec![("Content-Length", "10")]).unwrap(),
        Version::Http11).unwrap();
    let mut wire = server.send(response.into()).unwrap().unwrap();
    // no body follows, but EndOfMessage is still required
    wire.extend_from_slice(
        &server.send(EndOfMessage::default().into()).unwrap().unwrap());
    assert_eq!(&wire[..],
        &b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\n"[..]);

    client.receive_data(&wire).unwrap();
    let events = pump(&mut client);
    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], Event::Response(_)));
    assert!(matches!(events[1], Event::EndOfMessage(_)));
    assert_eq!(client.our_state(), State::Done);
    assert_eq!(client.their_state(), State::Done);
}

#[test]
fn content_length_mismatch_at_eof() {
    init();
    let mut client = Connection::new(Role::Client);
    client.receive_data(
        b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nabc").unwrap();
    let events = pump(&mut client);
    assert!(matches!(events[0], Event::Response(_)));
    assert_eq!(body_of(&events), b"abc");
    // the peer gives up early
    client.receive_data(b"").unwrap();
    assert!(matches!(client.next_event(),
        Err(RemoteProtocolError::IncompleteMessage)));
    assert_eq!(client.their_state(), State::Error);
    assert!(matches!(client.next_event(),
        Err(RemoteProtocolError::ErrorState)));
}

#[test]
fn expect_100_continue() {
    init();
    let mut client = Connection::new(Role::Client);
    let mut server = Connection::new(Role::Server);

    let request = Request::new("PUT", "/big",
        Headers::from_pairs(vec![
            ("Host", "example.com"),
            ("Content-Length", "5"),
            ("Expect", "100-continue"),
        ]).unwrap(),
        Version::Http11).unwrap();
    let wire = client.send(request.into()).unwrap().unwrap();
    assert!(client.client_is_waiting_for_100_continue());

    server.receive_data(&wire).unwrap();
    pump(&mut server);
    assert!(server.they_are_waiting_for_100_continue());

    let go_ahead = InformationalResponse::new(100, "Continue",
        Headers::new(), Version::Http11).unwrap();
    let wire = server.send(go_ahead.into()).unwrap().unwrap();
    assert_eq!(&wire[..], &b"HTTP/1.1 100 Continue\r\n\r\n"[..]);
    assert!(!server.they_are_waiting_for_100_continue());

    client.receive_data(&wire).unwrap();
    pump(&mut client);
    assert!(!client.client_is_waiting_for_100_continue());

    // now the body may flow
    let mut wire = client.send(Data::new("hello").into())
        .unwrap().unwrap();
    wire.extend_from_slice(
        &client.send(EndOfMessage::default().into()).unwrap().unwrap());
    server.receive_data(&wire).unwrap();
    let events = pump(&mut server);
    assert_eq!(body_of(&events), b"hello");
}

#[test]
fn upgrade_handoff() {
    init();
    let mut client = Connection::new(Role::Client);
    let mut server = Connection::new(Role::Server);

    let request = Request::new("GET", "/chat",
        Headers::from_pairs(vec![
            ("Host", "example.com"),
            ("Upgrade", "websocket"),
            ("Connection", "upgrade"),
        ]).unwrap(),
        Version::Http11).unwrap();
    let mut wire = client.send(request.into()).unwrap().unwrap();
    wire.extend_from_slice(
        &client.send(EndOfMessage::default().into()).unwrap().unwrap());
    assert_eq!(client.our_state(), State::MightSwitchProtocol);

    server.receive_data(&wire).unwrap();
    let events = pump(&mut server);
    assert!(matches!(events[0], Event::Request(_)));
    assert!(matches!(events[1], Event::EndOfMessage(_)));
    assert_eq!(server.their_state(), State::MightSwitchProtocol);
    assert_eq!(server.next_event().unwrap(), NextEvent::Paused);

    let accept = InformationalResponse::new(101, "Switching Protocols",
        Headers::from_pairs(vec![("Upgrade", "websocket")]).unwrap(),
        Version::Http11).unwrap();
    let wire = server.send(accept.into()).unwrap().unwrap();
    assert_eq!(server.our_state(), State::SwitchedProtocol);
    assert_eq!(server.their_state(), State::SwitchedProtocol);

    client.receive_data(&wire).unwrap();
    let events = pump(&mut client);
    assert!(matches!(events[0], Event::InformationalResponse(ref r)
        if r.status_code == 101));
    assert_eq!(client.our_state(), State::SwitchedProtocol);
    assert_eq!(client.their_state(), State::SwitchedProtocol);

    // bytes after the switch are stored verbatim, never parsed
    client.receive_data(b"\x00\x01not-http").unwrap();
    assert_eq!(client.next_event().unwrap(), NextEvent::Paused);
    assert_eq!(client.next_event().unwrap(), NextEvent::Paused);
    let (trailing, eof) = client.trailing_data();
    assert_eq!(&trailing[..], &b"\x00\x01not-http"[..]);
    assert!(!eof);
}

#[test]
fn connect_handoff() {
    init();
    let mut client = Connection::new(Role::Client);
    let mut server = Connection::new(Role::Server);

    let request = Request::new("CONNECT", "example.com:443",
        host_headers(), Version::Http11).unwrap();
    let mut wire = client.send(request.into()).unwrap().unwrap();
    wire.extend_from_slice(
        &client.send(EndOfMessage::default().into()).unwrap().unwrap());
    server.receive_data(&wire).unwrap();
    pump(&mut server);

    let established = Response::new(200, "Connection Established",
        Headers::new(), Version::Http11).unwrap();
    let wire = server.send(established.into()).unwrap().unwrap();
    assert_eq!(server.our_state(), State::SwitchedProtocol);

    client.receive_data(&wire).unwrap();
    let events = pump(&mut client);
    assert!(matches!(events[0], Event::Response(ref r)
        if r.status_code == 200));
    assert_eq!(client.our_state(), State::SwitchedProtocol);
}

#[test]
fn upgrade_denied_resumes_normal_http() {
    init();
    let mut client = Connection::new(Role::Client);

    let request = Request::new("GET", "/chat",
        Headers::from_pairs(vec![
            ("Host", "example.com"),
            ("Upgrade", "websocket"),
        ]).unwrap(),
        Version::Http11).unwrap();
    client.send(request.into()).unwrap().unwrap();
    client.send(EndOfMessage::default().into()).unwrap();
    assert_eq!(client.our_state(), State::MightSwitchProtocol);

    client.receive_data(
        b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nno").unwrap();
    let events = pump(&mut client);
    assert_eq!(events.len(), 3);
    assert_eq!(client.our_state(), State::Done);
    assert_eq!(client.their_state(), State::Done);
    client.start_next_cycle().unwrap();
}

#[test]
fn read_until_close_response() {
    init();
    let mut client = Connection::new(Role::Client);
    client.receive_data(b"HTTP/1.1 200 OK\r\n\r\nsome ").unwrap();
    let mut events = pump(&mut client);
    client.receive_data(b"bytes").unwrap();
    events.extend(pump(&mut client));
    client.receive_data(b"").unwrap();
    events.extend(pump(&mut client));
    assert!(matches!(events[0], Event::Response(_)));
    assert_eq!(body_of(&events), b"some bytes");
    assert!(matches!(*events.last().unwrap(), Event::EndOfMessage(_)));
    assert_eq!(client.their_state(), State::Done);
}

#[test]
fn clean_close_from_idle() {
    init();
    let mut server = Connection::new(Role::Server);
    server.receive_data(b"").unwrap();
    let events = pump(&mut server);
    assert_eq!(events, vec![Event::ConnectionClosed]);
    assert_eq!(server.their_state(), State::Closed);
    assert_eq!(server.our_state(), State::MustClose);
    // the close event repeats forever
    let events = pump(&mut server);
    assert_eq!(events, vec![Event::ConnectionClosed]);
}
