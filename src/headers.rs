//! The header model: an ordered list of header fields with lowercased
//! canonical names, original casing preserved for the wire, and the
//! special-header rules of RFC 7230 applied at construction time.

use std::str;

use error::HeaderError;

/// A single header field.
///
/// `name` is the canonical lowercase form used for lookups; `raw_name`
/// is whatever arrived on the wire (or whatever the embedder supplied)
/// and is what gets serialized back out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderField {
    pub name: Vec<u8>,
    pub raw_name: Vec<u8>,
    pub value: Vec<u8>,
}

/// An ordered list of header fields.
///
/// Insertion order is preserved on the wire. Construction through
/// `from_pairs` validates names and values and applies the
/// `Content-Length` / `Transfer-Encoding` consistency rules.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Headers {
    fields: Vec<HeaderField>,
}

impl Headers {
    pub fn new() -> Headers {
        Headers { fields: Vec::new() }
    }

    /// Build a validated header list from `(name, value)` pairs.
    ///
    /// Names must be tokens; values must be free of control bytes and
    /// surrounding whitespace. Multiple `Content-Length` fields are
    /// collapsed when they agree and rejected when they conflict;
    /// `Transfer-Encoding` must be exactly `chunked` and must not
    /// coexist with `Content-Length`.
    pub fn from_pairs<I, N, V>(pairs: I) -> Result<Headers, HeaderError>
        where I: IntoIterator<Item=(N, V)>,
              N: AsRef<[u8]>,
              V: AsRef<[u8]>,
    {
        let mut headers = Headers::new();
        let mut seen_content_length: Option<Vec<u8>> = None;
        let mut seen_transfer_encoding = false;
        for (name, value) in pairs {
            let raw_name = name.as_ref();
            let value = value.as_ref();
            if !is_token(raw_name) {
                return Err(HeaderError::InvalidHeaderName);
            }
            if !is_field_value(value) {
                return Err(HeaderError::InvalidHeaderValue);
            }
            let name = raw_name.to_ascii_lowercase();
            if name == b"content-length" {
                // A single field may itself be a comma list ("5, 5");
                // collapse it before comparing across fields.
                let mut parts = value.split(|&b| b == b',')
                    .map(trim_ows)
                    .filter(|part| !part.is_empty());
                let first = match parts.next() {
                    Some(part) => part.to_vec(),
                    None => return Err(HeaderError::BadContentLength),
                };
                if parts.any(|part| part != &first[..]) {
                    return Err(HeaderError::ConflictingContentLength);
                }
                parse_content_length(&first)?;
                match seen_content_length {
                    None => {
                        seen_content_length = Some(first.clone());
                        headers.fields.push(HeaderField {
                            name: name,
                            raw_name: raw_name.to_vec(),
                            value: first,
                        });
                    }
                    Some(ref prev) => {
                        if prev != &first {
                            return Err(
                                HeaderError::ConflictingContentLength);
                        }
                        // identical repeat, drop it
                    }
                }
            } else if name == b"transfer-encoding" {
                if seen_transfer_encoding {
                    return Err(HeaderError::DuplicateTransferEncoding);
                }
                if !eq_token(value, b"chunked") {
                    return Err(HeaderError::UnsupportedTransferEncoding);
                }
                seen_transfer_encoding = true;
                headers.fields.push(HeaderField {
                    name: name,
                    raw_name: raw_name.to_vec(),
                    value: b"chunked".to_vec(),
                });
            } else {
                headers.fields.push(HeaderField {
                    name: name,
                    raw_name: raw_name.to_vec(),
                    value: value.to_vec(),
                });
            }
        }
        if seen_content_length.is_some() && seen_transfer_encoding {
            return Err(HeaderError::ContentLengthAndTransferEncoding);
        }
        Ok(headers)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn fields(&self) -> &[HeaderField] {
        &self.fields
    }

    pub fn contains(&self, name: &[u8]) -> bool {
        debug_assert!(name.iter().all(|b| !b.is_ascii_uppercase()));
        self.fields.iter().any(|f| f.name == name)
    }

    pub fn get_first(&self, name: &[u8]) -> Option<&[u8]> {
        self.fields.iter()
            .find(|f| f.name == name)
            .map(|f| &f.value[..])
    }

    /// Number of fields with the given canonical name.
    pub fn count(&self, name: &[u8]) -> usize {
        self.fields.iter().filter(|f| f.name == name).count()
    }

    /// Collect the elements of a comma-list header, lowercased and
    /// trimmed of optional whitespace, across all fields of that name.
    pub fn get_comma_values(&self, name: &[u8]) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        for field in self.fields.iter() {
            if field.name != name {
                continue;
            }
            for part in field.value.split(|&b| b == b',') {
                let part = trim_ows(part);
                if !part.is_empty() {
                    out.push(part.to_ascii_lowercase());
                }
            }
        }
        out
    }

    /// Replace all fields of `name` with one field per given value,
    /// using the titlecased form of the name on the wire. Passing no
    /// values just deletes the header. This is how the engine inserts
    /// the headers it owns (`Transfer-Encoding`, `Connection`).
    pub fn set_comma_values(&mut self, name: &[u8], values: &[&[u8]]) {
        self.fields.retain(|f| f.name != name);
        for value in values {
            self.fields.push(HeaderField {
                name: name.to_vec(),
                raw_name: titlecase(name),
                value: value.to_vec(),
            });
        }
    }

    /// The declared `Content-Length`, if any.
    ///
    /// Values are validated at construction time, so an unparseable
    /// entry cannot be observed here.
    pub fn content_length(&self) -> Option<u64> {
        self.get_first(b"content-length")
            .and_then(|v| parse_content_length(v).ok())
    }

    pub fn has_chunked_encoding(&self) -> bool {
        self.get_comma_values(b"transfer-encoding")
            .last().map_or(false, |v| v == b"chunked")
    }

    pub fn connection_close(&self) -> bool {
        self.get_comma_values(b"connection").iter().any(|v| v == b"close")
    }

    pub fn has_upgrade(&self) -> bool {
        !self.get_comma_values(b"upgrade").is_empty()
    }

    pub fn expects_continue(&self) -> bool {
        self.get_comma_values(b"expect").iter()
            .any(|v| v == b"100-continue")
    }
}

fn parse_content_length(value: &[u8]) -> Result<u64, HeaderError> {
    if value.is_empty() || !value.iter().all(|b| b.is_ascii_digit()) {
        return Err(HeaderError::BadContentLength);
    }
    str::from_utf8(value).ok()
        .and_then(|s| s.parse().ok())
        .ok_or(HeaderError::BadContentLength)
}

/// Case-insensitive comparison of a header value element against an
/// expected token, ignoring surrounding optional whitespace.
pub fn eq_token(value: &[u8], token: &[u8]) -> bool {
    let value = trim_ows(value);
    value.len() == token.len()
        && value.iter().zip(token.iter())
            .all(|(a, b)| a.to_ascii_lowercase() == *b)
}

pub fn trim_ows(mut value: &[u8]) -> &[u8] {
    while let Some(&b) = value.first() {
        if b == b' ' || b == b'\t' { value = &value[1..]; } else { break }
    }
    while let Some(&b) = value.last() {
        if b == b' ' || b == b'\t' {
            value = &value[..value.len() - 1];
        } else {
            break
        }
    }
    value
}

/// RFC 7230 `token`.
pub fn is_token(name: &[u8]) -> bool {
    !name.is_empty() && name.iter().all(|&b| is_tchar(b))
}

fn is_tchar(b: u8) -> bool {
    match b {
        b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' |
        b'.' | b'^' | b'_' | b'`' | b'|' | b'~' => true,
        b'0'..=b'9' | b'a'..=b'z' | b'A'..=b'Z' => true,
        _ => false,
    }
}

/// A valid field value: HTAB, SP, visible ASCII or obs-text only (no
/// control bytes, no embedded newlines), with no surrounding
/// whitespace. Inner whitespace is kept verbatim.
pub fn is_field_value(value: &[u8]) -> bool {
    let clean = value.iter().all(|&b| {
        b == b'\t' || b == b' ' || (b >= 0x21 && b <= 0x7e) || b >= 0x80
    });
    clean && trim_ows(value).len() == value.len()
}

fn titlecase(name: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(name.len());
    let mut at_word_start = true;
    for &b in name {
        if at_word_start {
            out.push(b.to_ascii_uppercase());
        } else {
            out.push(b);
        }
        at_word_start = b == b'-';
    }
    out
}

#[cfg(test)]
mod test {
    use error::HeaderError;
    use super::{Headers, eq_token, is_token, trim_ows};

    fn hdrs(pairs: Vec<(&str, &str)>) -> Headers {
        Headers::from_pairs(pairs).unwrap()
    }

    #[test]
    fn canonical_and_raw_names() {
        let h = hdrs(vec![("Host", "example.com"), ("X-Foo", "bar")]);
        assert!(h.contains(b"host"));
        assert!(h.contains(b"x-foo"));
        assert_eq!(h.fields()[0].raw_name, b"Host");
        assert_eq!(h.get_first(b"x-foo"), Some(&b"bar"[..]));
    }

    #[test]
    fn rejects_bad_names_and_values() {
        assert_eq!(Headers::from_pairs(vec![("Host name", "x")]).unwrap_err(),
                   HeaderError::InvalidHeaderName);
        assert_eq!(Headers::from_pairs(vec![("", "x")]).unwrap_err(),
                   HeaderError::InvalidHeaderName);
        assert_eq!(Headers::from_pairs(vec![("Host", "a\r\nb")]).unwrap_err(),
                   HeaderError::InvalidHeaderValue);
        assert_eq!(Headers::from_pairs(vec![("X-Foo", "a\x01b")]).unwrap_err(),
                   HeaderError::InvalidHeaderValue);
        assert_eq!(Headers::from_pairs(vec![("X-Foo", "a\x7fb")]).unwrap_err(),
                   HeaderError::InvalidHeaderValue);
        assert_eq!(Headers::from_pairs(vec![("Host", " padded ")]).unwrap_err(),
                   HeaderError::InvalidHeaderValue);
    }

    #[test]
    fn content_length_collapsing() {
        let h = hdrs(vec![("Content-Length", "5"),
                          ("Content-Length", "5")]);
        assert_eq!(h.count(b"content-length"), 1);
        assert_eq!(h.content_length(), Some(5));

        let h = hdrs(vec![("Content-Length", "7, 7")]);
        assert_eq!(h.content_length(), Some(7));

        assert_eq!(
            Headers::from_pairs(vec![("Content-Length", "5"),
                                     ("Content-Length", "6")]).unwrap_err(),
            HeaderError::ConflictingContentLength);
        assert_eq!(
            Headers::from_pairs(vec![("Content-Length", "1x")]).unwrap_err(),
            HeaderError::BadContentLength);
    }

    #[test]
    fn transfer_encoding_rules() {
        let h = hdrs(vec![("Transfer-Encoding", "chunked")]);
        assert!(h.has_chunked_encoding());
        let h = hdrs(vec![("Transfer-Encoding", "CHUNKED")]);
        assert!(h.has_chunked_encoding());

        assert_eq!(
            Headers::from_pairs(
                vec![("Transfer-Encoding", "gzip, chunked")]).unwrap_err(),
            HeaderError::UnsupportedTransferEncoding);
        assert_eq!(
            Headers::from_pairs(
                vec![("Transfer-Encoding", "chunked"),
                     ("Content-Length", "5")]).unwrap_err(),
            HeaderError::ContentLengthAndTransferEncoding);
    }

    #[test]
    fn comma_values() {
        let h = hdrs(vec![("Connection", "Keep-Alive, Upgrade"),
                          ("Connection", "close")]);
        assert_eq!(h.get_comma_values(b"connection"),
                   vec![b"keep-alive".to_vec(), b"upgrade".to_vec(),
                        b"close".to_vec()]);
        assert!(h.connection_close());
    }

    #[test]
    fn set_comma_values_titlecases() {
        let mut h = hdrs(vec![("Host", "example.com")]);
        h.set_comma_values(b"transfer-encoding", &[b"chunked"]);
        let field = h.fields().last().unwrap();
        assert_eq!(field.raw_name, b"Transfer-Encoding");
        assert_eq!(field.value, b"chunked");
        h.set_comma_values(b"transfer-encoding", &[]);
        assert!(!h.contains(b"transfer-encoding"));
    }

    #[test]
    fn expect_and_upgrade() {
        let h = hdrs(vec![("Expect", "100-Continue")]);
        assert!(h.expects_continue());
        let h = hdrs(vec![("Upgrade", "websocket")]);
        assert!(h.has_upgrade());
    }

    #[test]
    fn token_scanners() {
        assert!(eq_token(b"  Chunked ", b"chunked"));
        assert!(!eq_token(b"chunked 1", b"chunked"));
        assert!(is_token(b"GET"));
        assert!(!is_token(b"GE T"));
        assert_eq!(trim_ows(b" \t x y \t "), b"x y");
    }
}
