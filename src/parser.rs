//! Message-head parsing: request lines, status lines and header
//! blocks, including chunked trailers.
//!
//! The receive buffer locates a complete head with its bounded,
//! memoized search first; only then does `httparse` run over the block,
//! so adversarial trickles never cause rescans of old bytes. Obsolete
//! line folding is unfolded into a scratch copy before parsing, which
//! keeps the common case zero-copy.

use std::borrow::Cow;

use httparse;

use buffer::ReceiveBuffer;
use error::{HeaderError, RemoteProtocolError};
use events::{Event, InformationalResponse, Request, Response};
use headers::{Headers, trim_ows};
use version::Version;

/// Number of headers to allocate on the stack
const MIN_HEADERS: usize = 16;
/// A hard limit on the number of headers
const MAX_HEADERS: usize = 1024;

/// Try to read a complete request head from the buffer.
///
/// Returns `Ok(None)` when more bytes are needed. Bytes that are
/// obviously not HTTP (a first byte outside printable ASCII, say a TLS
/// handshake) fail fast with a distinct error instead of waiting for a
/// header terminator that will never come.
pub fn read_request_head(buf: &mut ReceiveBuffer)
    -> Result<Option<Request>, RemoteProtocolError>
{
    skip_empty_lines(buf);
    if let Some(&first) = buf.data().first() {
        // Whitespace may still turn into a blank line or a (bad)
        // request line, which produce better errors later.
        let whitespace = first == b' ' || first == b'\t' || first == b'\r';
        if !whitespace && (first < 0x21 || first > 0x7e) {
            return Err(RemoteProtocolError::NotHttp);
        }
    }
    let end = match buf.find_headers_end()? {
        Some(end) => end,
        None => {
            // the request line is subject to the tighter line bound
            buf.find_line()?;
            return Ok(None);
        }
    };
    let block = buf.extract(end);
    let block = unfold(&block, 2)?;

    let mut fallback;
    let mut headers = [httparse::EMPTY_HEADER; MIN_HEADERS];
    let mut raw = httparse::Request::new(&mut headers);
    let mut parsed = raw.parse(&block);
    if matches!(parsed, Err(httparse::Error::TooManyHeaders)) {
        fallback = vec![httparse::EMPTY_HEADER; MAX_HEADERS];
        raw = httparse::Request::new(&mut fallback);
        parsed = raw.parse(&block);
    }
    match parsed? {
        httparse::Status::Complete(_) => {}
        httparse::Status::Partial => {
            return Err(RemoteProtocolError::TruncatedHead);
        }
    }
    let version = version_from_digit(raw.version)?;
    let headers = convert_headers(raw.headers)?;
    let request = Request::new(raw.method.unwrap(), raw.path.unwrap(),
        headers, version)?;
    Ok(Some(request))
}

/// Try to read a complete response head from the buffer.
///
/// Yields an `InformationalResponse` for 1xx status codes and a
/// `Response` otherwise; returns `Ok(None)` when more bytes are needed.
pub fn read_response_head(buf: &mut ReceiveBuffer)
    -> Result<Option<Event>, RemoteProtocolError>
{
    let end = match buf.find_headers_end()? {
        Some(end) => end,
        None => {
            // same line bound for the status line
            buf.find_line()?;
            return Ok(None);
        }
    };
    let block = buf.extract(end);
    let block = unfold(&block, 2)?;

    let mut fallback;
    let mut headers = [httparse::EMPTY_HEADER; MIN_HEADERS];
    let mut raw = httparse::Response::new(&mut headers);
    let mut parsed = raw.parse(&block);
    if matches!(parsed, Err(httparse::Error::TooManyHeaders)) {
        fallback = vec![httparse::EMPTY_HEADER; MAX_HEADERS];
        raw = httparse::Response::new(&mut fallback);
        parsed = raw.parse(&block);
    }
    match parsed? {
        httparse::Status::Complete(_) => {}
        httparse::Status::Partial => {
            return Err(RemoteProtocolError::TruncatedHead);
        }
    }
    let version = version_from_digit(raw.version)?;
    let code = raw.code.unwrap();
    let reason = raw.reason.unwrap_or("");
    let headers = convert_headers(raw.headers)?;
    let event = if code < 200 {
        Event::InformationalResponse(
            InformationalResponse::new(code, reason, headers, version)?)
    } else {
        Event::Response(Response::new(code, reason, headers, version)?)
    };
    Ok(Some(event))
}

/// Parse a complete chunked-trailer block (everything after the zero
/// chunk, terminating blank line included).
pub fn read_trailers(block: &[u8]) -> Result<Headers, RemoteProtocolError> {
    let block = unfold(block, 1)?;
    let mut fallback;
    let mut headers = [httparse::EMPTY_HEADER; MIN_HEADERS];
    let mut parsed = httparse::parse_headers(&block, &mut headers);
    if matches!(parsed, Err(httparse::Error::TooManyHeaders)) {
        fallback = vec![httparse::EMPTY_HEADER; MAX_HEADERS];
        parsed = httparse::parse_headers(&block, &mut fallback);
    }
    match parsed? {
        httparse::Status::Complete((_, raw)) => Ok(convert_headers(raw)?),
        httparse::Status::Partial => Err(RemoteProtocolError::TruncatedHead),
    }
}

fn convert_headers(raw: &[httparse::Header])
    -> Result<Headers, HeaderError>
{
    Headers::from_pairs(raw.iter().map(|h| (h.name, trim_ows(h.value))))
}

fn version_from_digit(version: Option<u8>)
    -> Result<Version, RemoteProtocolError>
{
    match version {
        Some(0) => Ok(Version::Http10),
        Some(1) => Ok(Version::Http11),
        _ => Err(RemoteProtocolError::Parse(httparse::Error::Version)),
    }
}

/// RFC 7230 allows (and recommends tolerating) empty lines before a
/// request line.
fn skip_empty_lines(buf: &mut ReceiveBuffer) {
    loop {
        if buf.data().starts_with(b"\r\n") {
            buf.consume(2);
        } else if buf.data().starts_with(b"\n") {
            buf.consume(1);
        } else {
            return;
        }
    }
}

/// Join obsolete line folds: a line starting with SP/HTAB continues the
/// previous header's value, separated by a single space.
///
/// `first_foldable` is the index of the first physical line that may
/// legally be a continuation (2 for a message head, where line 0 is the
/// start line; 1 for a trailer block).
fn unfold(block: &[u8], first_foldable: usize)
    -> Result<Cow<[u8]>, RemoteProtocolError>
{
    let folded = block.windows(2).any(|w| {
        w[0] == b'\n' && (w[1] == b' ' || w[1] == b'\t')
    });
    if !folded {
        return Ok(Cow::Borrowed(block));
    }
    let mut out = Vec::with_capacity(block.len());
    for (line_no, line) in (Lines { data: block, pos: 0 }).enumerate() {
        let continuation = line.first()
            .map_or(false, |&b| b == b' ' || b == b'\t');
        if continuation {
            if line_no < first_foldable {
                return Err(RemoteProtocolError::BadLineContinuation);
            }
            if out.last() == Some(&b'\n') {
                out.pop();
            }
            if out.last() == Some(&b'\r') {
                out.pop();
            }
            out.push(b' ');
            let mut rest = line;
            while rest.first().map_or(false, |&b| b == b' ' || b == b'\t') {
                rest = &rest[1..];
            }
            out.extend_from_slice(rest);
        } else {
            out.extend_from_slice(line);
        }
    }
    Ok(Cow::Owned(out))
}

/// Physical lines of a block, terminators included.
struct Lines<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for Lines<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        if self.pos >= self.data.len() {
            return None;
        }
        let start = self.pos;
        let mut idx = start;
        while idx < self.data.len() {
            idx += 1;
            if self.data[idx - 1] == b'\n' {
                break;
            }
        }
        self.pos = idx;
        Some(&self.data[start..idx])
    }
}
