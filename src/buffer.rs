//! Receive buffer with bounded, incremental searches.
//!
//! Incoming bytes are appended at the back and parsed data is consumed
//! from the front. Both line and header-block searches remember how far
//! they already looked, so feeding data one byte at a time never rescans
//! old bytes.

use std::fmt;

use netbuf::Buf;

use error::RemoteProtocolError;

/// Default limit for a single line (request line, status line,
/// chunk-size line).
pub const DEFAULT_MAX_LINE_SIZE: usize = 16384;
/// Default limit for a whole header block, terminating blank line
/// included.
pub const DEFAULT_MAX_HEADERS_SIZE: usize = 32768;

pub struct ReceiveBuffer {
    buf: Buf,
    eof: bool,
    line_search: usize,
    headers_search: usize,
    max_line_size: usize,
    max_headers_size: usize,
}

impl ReceiveBuffer {
    pub fn new(max_line_size: usize, max_headers_size: usize)
        -> ReceiveBuffer
    {
        ReceiveBuffer {
            buf: Buf::new(),
            eof: false,
            line_search: 0,
            headers_search: 0,
            max_line_size: max_line_size,
            max_headers_size: max_headers_size,
        }
    }

    pub fn feed(&mut self, data: &[u8]) {
        self.buf.extend(data);
    }

    /// Record that the peer will send no more bytes.
    pub fn mark_eof(&mut self) {
        self.eof = true;
    }

    pub fn is_eof(&self) -> bool {
        self.eof
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.len() == 0
    }

    pub fn data(&self) -> &[u8] {
        &self.buf[..]
    }

    /// Discard `n` bytes from the front of the buffer.
    pub fn consume(&mut self, n: usize) {
        self.buf.consume(n);
        self.line_search = self.line_search.saturating_sub(n);
        self.headers_search = self.headers_search.saturating_sub(n);
    }

    /// Remove and return the first `n` bytes.
    pub fn extract(&mut self, n: usize) -> Vec<u8> {
        let out = self.buf[..n].to_vec();
        self.consume(n);
        out
    }

    /// Remove and return everything that is buffered.
    pub fn take_all(&mut self) -> Vec<u8> {
        let n = self.buf.len();
        self.extract(n)
    }

    /// Find the end of the next line.
    ///
    /// Returns the offset just past the line terminator, so
    /// `data()[..n]` is the whole line including its terminator. A bare
    /// LF is accepted as a terminator; a lone CR is not. Fails once more
    /// than `max_line_size` bytes are buffered without a terminator
    /// showing up.
    pub fn find_line(&mut self)
        -> Result<Option<usize>, RemoteProtocolError>
    {
        let data = &self.buf[..];
        for idx in self.line_search..data.len() {
            if data[idx] == b'\n' {
                self.line_search = 0;
                return Ok(Some(idx + 1));
            }
        }
        self.line_search = data.len();
        if data.len() > self.max_line_size {
            return Err(RemoteProtocolError::LineTooLong(self.max_line_size));
        }
        Ok(None)
    }

    /// Find the blank line terminating a header block.
    ///
    /// Returns the offset just past the terminator, so `data()[..n]` is
    /// the whole block. Accepts `\n\r\n` and `\n\n`; the same bounded
    /// policy as `find_line`, with the header-block limit.
    pub fn find_headers_end(&mut self)
        -> Result<Option<usize>, RemoteProtocolError>
    {
        let data = &self.buf[..];
        let mut idx = self.headers_search;
        while idx < data.len() {
            if data[idx] == b'\n' {
                if data[idx + 1..].first() == Some(&b'\n') {
                    self.headers_search = 0;
                    return Ok(Some(idx + 2));
                }
                if data[idx + 1..].starts_with(b"\r\n") {
                    self.headers_search = 0;
                    return Ok(Some(idx + 3));
                }
            }
            idx += 1;
        }
        // The last two bytes may yet become part of the terminator.
        self.headers_search = data.len().saturating_sub(2);
        if data.len() > self.max_headers_size {
            return Err(RemoteProtocolError::HeadersTooLong(
                self.max_headers_size));
        }
        Ok(None)
    }
}

impl fmt::Debug for ReceiveBuffer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ReceiveBuffer")
            .field("len", &self.buf.len())
            .field("eof", &self.eof)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::{ReceiveBuffer,
                DEFAULT_MAX_LINE_SIZE, DEFAULT_MAX_HEADERS_SIZE};

    fn buf() -> ReceiveBuffer {
        ReceiveBuffer::new(DEFAULT_MAX_LINE_SIZE, DEFAULT_MAX_HEADERS_SIZE)
    }

    #[test]
    fn line_crlf_and_bare_lf() {
        let mut b = buf();
        b.feed(b"12\r\nrest");
        assert_eq!(b.find_line().unwrap(), Some(4));
        b.consume(4);
        assert_eq!(b.find_line().unwrap(), None);
        b.feed(b"\n");
        assert_eq!(b.find_line().unwrap(), Some(5));
    }

    #[test]
    fn lone_cr_is_not_a_terminator() {
        let mut b = buf();
        b.feed(b"abc\r");
        assert_eq!(b.find_line().unwrap(), None);
        b.feed(b"\n");
        assert_eq!(b.find_line().unwrap(), Some(5));
    }

    #[test]
    fn incremental_headers_end() {
        let mut b = buf();
        b.feed(b"GET / HTTP/1.1\r\nHost: example.com\r\n");
        assert_eq!(b.find_headers_end().unwrap(), None);
        b.feed(b"\r");
        assert_eq!(b.find_headers_end().unwrap(), None);
        b.feed(b"\n");
        let end = b.find_headers_end().unwrap().unwrap();
        assert_eq!(end, b.len());
    }

    #[test]
    fn headers_end_with_bare_lf() {
        let mut b = buf();
        b.feed(b"HTTP/1.1 200 OK\nFoo: bar\n\ntail");
        assert_eq!(b.find_headers_end().unwrap(), Some(26));
    }

    #[test]
    fn line_limit() {
        let mut b = ReceiveBuffer::new(16, 64);
        b.feed(b"0123456789abcdef0");
        assert!(b.find_line().is_err());
    }

    #[test]
    fn headers_limit() {
        let mut b = ReceiveBuffer::new(16, 32);
        b.feed(b"GET / HTTP/1.1\r\nHost: example.com\r\n");
        assert!(b.find_headers_end().is_err());
    }

    #[test]
    fn extract_adjusts_search_positions() {
        let mut b = buf();
        b.feed(b"no newline here");
        assert_eq!(b.find_line().unwrap(), None);
        let data = b.extract(3);
        assert_eq!(&data[..], b"no ");
        b.feed(b"\nx");
        assert_eq!(b.find_line().unwrap(), Some(13));
    }
}
