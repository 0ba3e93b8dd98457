//! Serialization of outgoing events to wire bytes.
//!
//! Heads are rendered with CRLF line endings and always as HTTP/1.1;
//! the body writers enforce the chosen framing while they encode it
//! (exact Content-Length accounting, chunk framing, trailer rules).

use std::io::Write;

use error::{HeaderError, LocalProtocolError};
use events::{EndOfMessage, InformationalResponse, Payload, Request,
             Response, Segment};
use headers::Headers;
use version::Version;

// Same grammar the header model enforces at construction time: HTAB,
// SP, visible ASCII or obs-text. Anything else (CR, LF, other control
// bytes) must never reach the wire.
fn invalid_header(value: &[u8]) -> bool {
    value.iter().any(|&x| {
        !(x == b'\t' || x == b' ' || (x >= 0x21 && x <= 0x7e) || x >= 0x80)
    })
}

/// Render a request head: request line plus header block.
pub fn render_request(request: &Request, out: &mut Vec<u8>)
    -> Result<(), LocalProtocolError>
{
    if request.http_version != Version::Http11 {
        return Err(LocalProtocolError::UnsupportedVersion);
    }
    out.write_all(&request.method).unwrap();
    out.write_all(b" ").unwrap();
    out.write_all(&request.target).unwrap();
    out.write_all(b" HTTP/1.1\r\n").unwrap();
    render_headers(&request.headers, out)
}

/// Render a final response head.
///
/// The reason phrase may be empty; the status line then ends in
/// `SP CRLF`, which is what RFC 7230 prescribes.
pub fn render_response(response: &Response, out: &mut Vec<u8>)
    -> Result<(), LocalProtocolError>
{
    render_status_line(response.http_version, response.status_code,
        &response.reason, out)?;
    render_headers(&response.headers, out)
}

pub fn render_informational(response: &InformationalResponse,
    out: &mut Vec<u8>)
    -> Result<(), LocalProtocolError>
{
    render_status_line(response.http_version, response.status_code,
        &response.reason, out)?;
    render_headers(&response.headers, out)
}

fn render_status_line(version: Version, code: u16, reason: &[u8],
    out: &mut Vec<u8>)
    -> Result<(), LocalProtocolError>
{
    if version != Version::Http11 {
        return Err(LocalProtocolError::UnsupportedVersion);
    }
    write!(out, "HTTP/1.1 {} ", code).unwrap();
    out.write_all(reason).unwrap();
    out.write_all(b"\r\n").unwrap();
    Ok(())
}

/// Write all header fields in order, with their original casing, then
/// the terminating blank line. Folded lines are never emitted; a value
/// with an embedded newline can only come from a hand-rolled field and
/// is rejected here.
pub fn render_headers(headers: &Headers, out: &mut Vec<u8>)
    -> Result<(), LocalProtocolError>
{
    for field in headers.fields() {
        if invalid_header(&field.raw_name) {
            return Err(LocalProtocolError::Header(
                HeaderError::InvalidHeaderName));
        }
        if invalid_header(&field.value) {
            return Err(LocalProtocolError::Header(
                HeaderError::InvalidHeaderValue));
        }
        out.write_all(&field.raw_name).unwrap();
        out.write_all(b": ").unwrap();
        out.write_all(&field.value).unwrap();
        out.write_all(b"\r\n").unwrap();
    }
    out.write_all(b"\r\n").unwrap();
    Ok(())
}

/// Encodes one outgoing message body according to its framing.
#[derive(Debug)]
pub enum BodyWriter {
    /// This message must not carry body bytes (bodiless statuses,
    /// responses to HEAD, requests without framing headers).
    NoBody,
    /// Exactly `remaining` more payload bytes must follow.
    Fixed { remaining: u64 },
    /// Each `Data` becomes one chunk; `EndOfMessage` emits the zero
    /// chunk and any trailers.
    Chunked,
    /// Close-delimited: bytes pass through, the connection close marks
    /// the end.
    Eof,
}

impl BodyWriter {
    /// Encode one `Data` payload.
    ///
    /// The payload itself is appended as its own segment so opaque
    /// bodies survive for zero-copy sending; a zero-length payload
    /// produces no output at all.
    pub fn write_data(&mut self, payload: Payload,
        out: &mut Vec<Segment>)
        -> Result<(), LocalProtocolError>
    {
        let len = payload.len();
        match *self {
            BodyWriter::NoBody => {
                if len > 0 {
                    return Err(LocalProtocolError::RequireBodyless);
                }
                Ok(())
            }
            BodyWriter::Fixed { ref mut remaining } => {
                if len > *remaining {
                    return Err(LocalProtocolError::TooMuchData);
                }
                *remaining -= len;
                if len > 0 {
                    out.push(payload_segment(payload));
                }
                Ok(())
            }
            BodyWriter::Chunked => {
                if len == 0 {
                    return Ok(());
                }
                out.push(Segment::Bytes(
                    format!("{:x}\r\n", len).into_bytes()));
                out.push(payload_segment(payload));
                out.push(Segment::Bytes(b"\r\n".to_vec()));
                Ok(())
            }
            BodyWriter::Eof => {
                if len > 0 {
                    out.push(payload_segment(payload));
                }
                Ok(())
            }
        }
    }

    /// Encode the end of the message.
    ///
    /// Under chunked framing this is the zero chunk followed by any
    /// trailer headers; other framings allow no trailers, and fixed
    /// framing insists that the declared length was reached.
    pub fn write_end(&mut self, end: &EndOfMessage, out: &mut Vec<Segment>)
        -> Result<(), LocalProtocolError>
    {
        match *self {
            BodyWriter::Chunked => {
                let mut tail = b"0\r\n".to_vec();
                render_headers(&end.headers, &mut tail)?;
                out.push(Segment::Bytes(tail));
                Ok(())
            }
            BodyWriter::Fixed { remaining } => {
                if !end.headers.is_empty() {
                    return Err(LocalProtocolError::TrailersNotAllowed);
                }
                if remaining != 0 {
                    return Err(LocalProtocolError::TooLittleData);
                }
                Ok(())
            }
            BodyWriter::NoBody | BodyWriter::Eof => {
                if !end.headers.is_empty() {
                    return Err(LocalProtocolError::TrailersNotAllowed);
                }
                Ok(())
            }
        }
    }
}

fn payload_segment(payload: Payload) -> Segment {
    match payload {
        Payload::Bytes(bytes) => Segment::Bytes(bytes),
        Payload::Opaque(body) => Segment::Opaque(body),
    }
}
