//! Inbound request frames.
//!
//! Decoding walks the buffer strictly left to right:
//! ```text
//! srv1 42 /foo/bar 16:{"X-Test":"yes"},5:hello,
//! ^^^^ ^^ ^^^^^^^^ ^^ ^^^^^^^^^^^^^^^^ ^ ^^^^^
//! id   client path hdr-len header json  body
//! ```
//!
//! A malformed frame cannot be resynchronized, so every failure is reported
//! as [`HandlerError::Protocol`] and nothing is salvaged from it.
//!
//! # Example
//!
//! ```
//! use edgewire::protocol::Request;
//!
//! let req = Request::decode(&b"srv1 42 /foo/bar 16:{\"X-Test\":\"yes\"},5:hello,"[..]).unwrap();
//! assert_eq!(req.server_id(), "srv1");
//! assert_eq!(req.client_id(), 42);
//! assert_eq!(req.body(), b"hello");
//! ```

use std::collections::HashMap;
use std::ops::Range;

use bytes::Bytes;
use serde::Deserialize;

use crate::error::{HandlerError, Result};

/// Value of the `METHOD` header on edge-server control messages.
const JSON_METHOD: &str = "JSON";

/// A decoded inbound request.
///
/// `body` is a zero-copy view into `raw`, so holding a request keeps the
/// whole transport message alive.
#[derive(Debug, Clone)]
pub struct Request {
    raw: Bytes,
    body: Bytes,
    server_id: String,
    client_id: u64,
    path: String,
    headers: HashMap<String, String>,
}

impl Request {
    /// Decode one frame.
    pub fn decode(raw: impl Into<Bytes>) -> Result<Self> {
        let raw = raw.into();
        let mut scanner = Scanner::new(&raw);

        let server_id = scanner.take_until(b' ', "server id")?;
        if server_id.is_empty() {
            return Err(HandlerError::protocol("empty server id"));
        }
        let server_id = text(&raw, server_id, "server id")?;

        let client_id = scanner.take_until(b' ', "client id")?;
        let client_id = parse_decimal::<u64>(&raw[client_id], "client id")?;

        let path = scanner.take_until(b' ', "path")?;
        let path = text(&raw, path, "path")?;

        let header_len = scanner.take_until(b':', "header length")?;
        let header_len = parse_decimal::<usize>(&raw[header_len], "header length")?;
        let header_json = scanner.take(header_len, "headers")?;
        let headers = parse_headers(&raw[header_json])?;
        scanner.expect(b',', "headers")?;

        let body_len = scanner.take_until(b':', "body length")?;
        let body_len = parse_decimal::<usize>(&raw[body_len], "body length")?;
        let body = scanner.take(body_len, "body")?;
        scanner.expect(b',', "body")?;

        if !scanner.is_done() {
            return Err(HandlerError::protocol(format!(
                "{} trailing bytes after body",
                scanner.remaining()
            )));
        }

        let body = raw.slice(body);

        Ok(Self {
            raw,
            body,
            server_id,
            client_id,
            path,
            headers,
        })
    }

    /// The complete transport message this request was decoded from.
    #[inline]
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// Body bytes.
    #[inline]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Body as a cheap clone sharing the raw buffer.
    #[inline]
    pub fn body_bytes(&self) -> Bytes {
        self.body.clone()
    }

    /// Body length in bytes.
    #[inline]
    pub fn body_size(&self) -> usize {
        self.body.len()
    }

    /// Edge server instance that sent this request.
    #[inline]
    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    /// Client connection on that edge server.
    #[inline]
    pub fn client_id(&self) -> u64 {
        self.client_id
    }

    /// Request path.
    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// All headers.
    #[inline]
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Look up a header, exact match first, then ASCII case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        if let Some(value) = self.headers.get(name) {
            return Some(value);
        }
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// The `METHOD` header set by the edge server.
    pub fn method(&self) -> Option<&str> {
        self.header("METHOD")
    }

    /// Whether this is the edge server telling us a client went away.
    ///
    /// Such notices carry `METHOD: JSON` and a body of
    /// `{"type":"disconnect"}`; they must not be answered.
    pub fn is_disconnect(&self) -> bool {
        #[derive(Deserialize)]
        struct ControlMessage {
            #[serde(rename = "type")]
            kind: String,
        }

        if self.method() != Some(JSON_METHOD) {
            return false;
        }
        serde_json::from_slice::<ControlMessage>(&self.body)
            .map(|msg| msg.kind == "disconnect")
            .unwrap_or(false)
    }
}

/// Decode a request frame (standalone function).
#[inline]
pub fn decode_request(raw: impl Into<Bytes>) -> Result<Request> {
    Request::decode(raw)
}

/// Build an inbound frame the way an edge server would.
///
/// `header_json` is written verbatim; pass `""` for no headers.
pub fn build_request_frame(
    server_id: &str,
    client_id: u64,
    path: &str,
    header_json: &str,
    body: &[u8],
) -> Vec<u8> {
    let prefix = format!(
        "{} {} {} {}:{},{}:",
        server_id,
        client_id,
        path,
        header_json.len(),
        header_json,
        body.len()
    );
    let mut frame = Vec::with_capacity(prefix.len() + body.len() + 1);
    frame.extend_from_slice(prefix.as_bytes());
    frame.extend_from_slice(body);
    frame.push(b',');
    frame
}

/// Forward-only cursor over a frame.
struct Scanner<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Range up to (excluding) the next `delim`; the cursor moves past it.
    fn take_until(&mut self, delim: u8, field: &str) -> Result<Range<usize>> {
        let rest = self.buf.get(self.pos..).unwrap_or_default();
        let offset = rest.iter().position(|&b| b == delim).ok_or_else(|| {
            HandlerError::protocol(format!("missing '{}' after {}", delim as char, field))
        })?;

        let start = self.pos;
        let end = start + offset;
        self.pos = end + 1;
        Ok(start..end)
    }

    /// Exactly `len` bytes starting at the cursor.
    fn take(&mut self, len: usize, field: &str) -> Result<Range<usize>> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| {
                HandlerError::protocol(format!(
                    "{} length {} exceeds frame ({} bytes left)",
                    field,
                    len,
                    self.remaining()
                ))
            })?;

        let start = self.pos;
        self.pos = end;
        Ok(start..end)
    }

    fn expect(&mut self, byte: u8, after: &str) -> Result<()> {
        match self.buf.get(self.pos) {
            Some(&b) if b == byte => {
                self.pos += 1;
                Ok(())
            }
            Some(&b) => Err(HandlerError::protocol(format!(
                "expected '{}' after {}, found '{}'",
                byte as char,
                after,
                b.escape_ascii()
            ))),
            None => Err(HandlerError::protocol(format!(
                "expected '{}' after {}, frame ended",
                byte as char, after
            ))),
        }
    }

    fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    fn is_done(&self) -> bool {
        self.remaining() == 0
    }
}

fn text(raw: &[u8], range: Range<usize>, field: &str) -> Result<String> {
    std::str::from_utf8(&raw[range])
        .map(str::to_owned)
        .map_err(|e| HandlerError::protocol(format!("{} is not UTF-8: {}", field, e)))
}

/// Unsigned decimal, digits only (no sign, no whitespace, not empty).
fn parse_decimal<T: std::str::FromStr>(digits: &[u8], field: &str) -> Result<T> {
    let invalid = || {
        HandlerError::protocol(format!(
            "invalid {}: '{}'",
            field,
            digits.escape_ascii()
        ))
    };

    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(invalid());
    }
    std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(invalid)
}

fn parse_headers(json: &[u8]) -> Result<HashMap<String, String>> {
    if json.is_empty() {
        return Ok(HashMap::new());
    }
    serde_json::from_slice(json)
        .map_err(|e| HandlerError::protocol(format!("invalid header JSON: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &[u8] = b"srv1 42 /foo/bar 16:{\"X-Test\":\"yes\"},5:hello,";

    #[test]
    fn test_decode_sample_frame() {
        let req = Request::decode(SAMPLE).unwrap();

        assert_eq!(req.server_id(), "srv1");
        assert_eq!(req.client_id(), 42);
        assert_eq!(req.path(), "/foo/bar");
        assert_eq!(req.headers().len(), 1);
        assert_eq!(req.header("X-Test"), Some("yes"));
        assert_eq!(req.body(), b"hello");
        assert_eq!(req.body_size(), 5);
        assert_eq!(&req.raw()[..], SAMPLE);
    }

    #[test]
    fn test_body_is_view_into_raw() {
        let req = Request::decode(Bytes::from_static(SAMPLE)).unwrap();

        let raw_range = req.raw().as_ptr_range();
        let body_ptr = req.body().as_ptr();
        assert!(raw_range.contains(&body_ptr));
        assert_eq!(req.body_bytes().as_ptr(), body_ptr);
    }

    #[test]
    fn test_zero_length_headers() {
        let req = Request::decode(&b"srv 7 / 0:,3:abc,"[..]).unwrap();

        assert!(req.headers().is_empty());
        assert_eq!(req.body(), b"abc");
    }

    #[test]
    fn test_zero_length_body() {
        let req = Request::decode(&b"srv 7 / 2:{},0:,"[..]).unwrap();

        assert!(req.headers().is_empty());
        assert!(req.body().is_empty());
        assert_eq!(req.body_size(), 0);
    }

    #[test]
    fn test_body_may_contain_delimiters() {
        let frame = build_request_frame("srv", 1, "/", "", b"a, b: c d,");
        let req = Request::decode(frame).unwrap();
        assert_eq!(req.body(), b"a, b: c d,");
    }

    #[test]
    fn test_header_lookup_ignores_case_as_fallback() {
        let frame = build_request_frame("srv", 1, "/", r#"{"content-type":"text/html"}"#, b"");
        let req = Request::decode(frame).unwrap();

        assert_eq!(req.header("content-type"), Some("text/html"));
        assert_eq!(req.header("Content-Type"), Some("text/html"));
        assert_eq!(req.header("accept"), None);
    }

    #[test]
    fn test_non_numeric_client_id() {
        let err = Request::decode(&b"srv abc / 0:,0:,"[..]).unwrap_err();
        assert!(err.is_malformed_frame());
        assert!(err.to_string().contains("client id"));
    }

    #[test]
    fn test_signed_lengths_rejected() {
        assert!(Request::decode(&b"srv 1 / +0:,0:,"[..]).is_err());
        assert!(Request::decode(&b"srv 1 / 0:,-1:,"[..]).is_err());
        assert!(Request::decode(&b"srv -1 / 0:,0:,"[..]).is_err());
    }

    #[test]
    fn test_header_length_past_end() {
        let err = Request::decode(&b"srv 1 / 99:{},0:,"[..]).unwrap_err();
        assert!(err.to_string().contains("exceeds frame"));
    }

    #[test]
    fn test_body_length_past_end() {
        let err = Request::decode(&b"srv 1 / 0:,10:abc,"[..]).unwrap_err();
        assert!(err.to_string().contains("exceeds frame"));
    }

    #[test]
    fn test_invalid_header_json() {
        let err = Request::decode(&b"srv 1 / 5:{nop},0:,"[..]).unwrap_err();
        assert!(err.to_string().contains("invalid header JSON"));
    }

    #[test]
    fn test_non_string_header_values_rejected() {
        let frame = build_request_frame("srv", 1, "/", r#"{"a":["x","y"]}"#, b"");
        assert!(Request::decode(frame).is_err());
    }

    #[test]
    fn test_missing_separators() {
        assert!(Request::decode(&b"srv 1 / 2:{}0:,"[..]).is_err());
        assert!(Request::decode(&b"srv 1 / 0:,3:abc"[..]).is_err());
        assert!(Request::decode(&b"srv 1 /"[..]).is_err());
        assert!(Request::decode(&b""[..]).is_err());
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let err = Request::decode(&b"srv 1 / 0:,0:,junk"[..]).unwrap_err();
        assert!(err.to_string().contains("trailing"));
    }

    #[test]
    fn test_empty_server_id_rejected() {
        assert!(Request::decode(&b" 1 / 0:,0:,"[..]).is_err());
    }

    #[test]
    fn test_disconnect_notice() {
        let frame = build_request_frame(
            "srv",
            9,
            "@*",
            r#"{"METHOD":"JSON"}"#,
            br#"{"type":"disconnect"}"#,
        );
        let req = Request::decode(frame).unwrap();
        assert_eq!(req.method(), Some("JSON"));
        assert!(req.is_disconnect());

        let regular = build_request_frame("srv", 9, "/", r#"{"METHOD":"GET"}"#, b"");
        assert!(!Request::decode(regular).unwrap().is_disconnect());
    }

    #[test]
    fn test_build_request_frame_matches_sample() {
        let frame = build_request_frame("srv1", 42, "/foo/bar", r#"{"X-Test":"yes"}"#, b"hello");
        assert_eq!(frame, SAMPLE);
    }

    #[test]
    fn test_standalone_decode() {
        let req = decode_request(Bytes::from_static(SAMPLE)).unwrap();
        assert_eq!(req.client_id(), 42);
    }
}
