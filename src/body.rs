//! Body framing: deciding how a message body ends, and the readers
//! that stream it out of the receive buffer.

use std::cmp::min;

use httparse::{self, parse_chunk_size};

use buffer::ReceiveBuffer;
use error::RemoteProtocolError;
use events::{Data, EndOfMessage, Event, Payload};
use headers::Headers;
use parser;

/// How a message body is delimited, per direction, computed once per
/// message from the start-line and headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    /// No body at all (bodiless statuses, responses to HEAD, messages
    /// without framing headers where that means empty).
    NoBody,
    /// Exactly this many bytes follow the header block.
    Fixed(u64),
    /// `Transfer-Encoding: chunked`.
    Chunked,
    /// The body runs until the peer closes the connection
    /// (responses only).
    Eof,
}

/// Framing of a request body, from its headers.
///
/// `Transfer-Encoding: chunked` wins over `Content-Length`; the header
/// model has already rejected messages carrying both.
pub fn request_framing(headers: &Headers) -> BodyKind {
    if headers.has_chunked_encoding() {
        BodyKind::Chunked
    } else if let Some(n) = headers.content_length() {
        BodyKind::Fixed(n)
    } else {
        BodyKind::NoBody
    }
}

/// Framing of a (final) response body.
///
/// `request_method` is the method of the request this responds to, when
/// one was seen; HEAD and 2xx-to-CONNECT responses carry headers as if
/// a body followed, but none does.
pub fn response_framing(request_method: Option<&[u8]>, status_code: u16,
    headers: &Headers)
    -> BodyKind
{
    if let Some(method) = request_method {
        if method == b"HEAD" {
            return BodyKind::NoBody;
        }
        if method == b"CONNECT"
            && status_code >= 200 && status_code < 300
        {
            return BodyKind::NoBody;
        }
    }
    if status_code == 204 || status_code == 304 {
        return BodyKind::NoBody;
    }
    if headers.has_chunked_encoding() {
        BodyKind::Chunked
    } else if let Some(n) = headers.content_length() {
        BodyKind::Fixed(n)
    } else {
        BodyKind::Eof
    }
}

/// Streams one message body out of the receive buffer as `Data` events,
/// finishing with `EndOfMessage`.
#[derive(Debug)]
pub enum BodyReader {
    NoBody,
    Fixed { remaining: u64 },
    Chunked(ChunkedReader),
    Eof,
}

impl BodyReader {
    pub fn for_kind(kind: BodyKind) -> BodyReader {
        match kind {
            BodyKind::NoBody => BodyReader::NoBody,
            BodyKind::Fixed(n) => BodyReader::Fixed { remaining: n },
            BodyKind::Chunked => BodyReader::Chunked(ChunkedReader::new()),
            BodyKind::Eof => BodyReader::Eof,
        }
    }

    /// Produce the next body event, or `None` when more bytes are
    /// needed.
    pub fn read(&mut self, buf: &mut ReceiveBuffer)
        -> Result<Option<Event>, RemoteProtocolError>
    {
        match *self {
            BodyReader::NoBody => {
                Ok(Some(Event::EndOfMessage(EndOfMessage::default())))
            }
            BodyReader::Fixed { ref mut remaining } => {
                if *remaining == 0 {
                    return Ok(Some(
                        Event::EndOfMessage(EndOfMessage::default())));
                }
                if buf.is_empty() {
                    return Ok(None);
                }
                let n = min(*remaining, buf.len() as u64) as usize;
                let data = buf.extract(n);
                *remaining -= n as u64;
                Ok(Some(Event::Data(Data::new(data))))
            }
            BodyReader::Chunked(ref mut chunked) => chunked.read(buf),
            BodyReader::Eof => {
                if buf.is_empty() {
                    return Ok(None);
                }
                let data = buf.take_all();
                Ok(Some(Event::Data(Data::new(data))))
            }
        }
    }

    /// The peer closed cleanly while this body was being read.
    ///
    /// Only a close-delimited body may end this way; everything else is
    /// a truncated message.
    pub fn read_eof(&self) -> Result<Event, RemoteProtocolError> {
        match *self {
            BodyReader::Eof => {
                Ok(Event::EndOfMessage(EndOfMessage::default()))
            }
            _ => Err(RemoteProtocolError::IncompleteMessage),
        }
    }
}

#[derive(Debug)]
enum ChunkPhase {
    /// Expecting a chunk-size line.
    Size,
    /// Inside chunk data.
    Data { remaining: u64, first: bool },
    /// Expecting the CRLF that closes a chunk's data.
    DataEnd,
    /// After the zero chunk, reading trailer headers.
    Trailers,
}

/// Incremental chunked-body decoder.
///
/// Chunk extensions are parsed and discarded. Each wire chunk comes out
/// as one or more `Data` events with `chunk_start` set on the first and
/// `chunk_end` on the last; a fully buffered chunk is coalesced into a
/// single event carrying both flags.
#[derive(Debug)]
pub struct ChunkedReader {
    phase: ChunkPhase,
}

impl ChunkedReader {
    pub fn new() -> ChunkedReader {
        ChunkedReader { phase: ChunkPhase::Size }
    }

    fn read(&mut self, buf: &mut ReceiveBuffer)
        -> Result<Option<Event>, RemoteProtocolError>
    {
        loop {
            match self.phase {
                ChunkPhase::Size => {
                    let line_end = match buf.find_line()? {
                        Some(end) => end,
                        None => return Ok(None),
                    };
                    match parse_chunk_size(&buf.data()[..line_end])? {
                        httparse::Status::Complete((consumed, 0)) => {
                            buf.consume(consumed);
                            self.phase = ChunkPhase::Trailers;
                        }
                        httparse::Status::Complete((consumed, size)) => {
                            buf.consume(consumed);
                            self.phase = ChunkPhase::Data {
                                remaining: size,
                                first: true,
                            };
                        }
                        httparse::Status::Partial => {
                            // a complete line that does not complete a
                            // chunk size is bogus (e.g. bare-LF ending)
                            return Err(RemoteProtocolError::ChunkParse(
                                httparse::InvalidChunkSize));
                        }
                    }
                }
                ChunkPhase::Data { ref mut remaining, ref mut first } => {
                    if buf.is_empty() {
                        return Ok(None);
                    }
                    let n = min(*remaining, buf.len() as u64) as usize;
                    let payload = buf.extract(n);
                    *remaining -= n as u64;
                    let event = Data {
                        data: Payload::Bytes(payload),
                        chunk_start: *first,
                        chunk_end: *remaining == 0,
                    };
                    *first = false;
                    if event.chunk_end {
                        self.phase = ChunkPhase::DataEnd;
                    }
                    return Ok(Some(Event::Data(event)));
                }
                ChunkPhase::DataEnd => {
                    match buf.data().first() {
                        None => return Ok(None),
                        Some(&b'\n') => {
                            buf.consume(1);
                            self.phase = ChunkPhase::Size;
                        }
                        Some(&b'\r') => {
                            if buf.len() < 2 {
                                return Ok(None);
                            }
                            if buf.data()[1] != b'\n' {
                                return Err(
                                    RemoteProtocolError::BadChunkEnd);
                            }
                            buf.consume(2);
                            self.phase = ChunkPhase::Size;
                        }
                        Some(_) => {
                            return Err(RemoteProtocolError::BadChunkEnd);
                        }
                    }
                }
                ChunkPhase::Trailers => {
                    // no trailers: just the blank line
                    if buf.data().starts_with(b"\r\n") {
                        buf.consume(2);
                        return Ok(Some(Event::EndOfMessage(
                            EndOfMessage::default())));
                    }
                    if buf.data().starts_with(b"\n") {
                        buf.consume(1);
                        return Ok(Some(Event::EndOfMessage(
                            EndOfMessage::default())));
                    }
                    if buf.data() == b"\r" {
                        return Ok(None);
                    }
                    let end = match buf.find_headers_end()? {
                        Some(end) => end,
                        None => return Ok(None),
                    };
                    let block = buf.extract(end);
                    let trailers = parser::read_trailers(&block)?;
                    return Ok(Some(Event::EndOfMessage(EndOfMessage {
                        headers: trailers,
                    })));
                }
            }
        }
    }
}
