//! Outbound response frames.
//!
//! A response is an HTTP/1.1-shaped payload wrapped in an addressing
//! envelope that names the edge server and one or more of its clients.
//!
//! # Example
//!
//! ```
//! use edgewire::protocol::Response;
//!
//! let frame = Response::new("srv1", vec![1, 2, 3])
//!     .header("Content-Type", "text/plain")
//!     .body("hi")
//!     .encode()
//!     .unwrap();
//!
//! assert!(frame.starts_with(b"srv1 5:1 2 3, HTTP/1.1 200 OK\r\n"));
//! ```

use std::collections::HashMap;

use bytes::{Bytes, BytesMut};

use super::Request;
use crate::error::{HandlerError, Result};

/// Most client ids a single frame may address.
pub const MAX_CLIENTS_PER_FRAME: usize = 128;

/// An outbound response.
///
/// `Content-Length` is always derived from `body`; any value placed in
/// `headers` under that name is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    /// Edge server that owns the addressed clients.
    pub server_id: String,
    /// Client connections receiving this response.
    pub client_ids: Vec<u64>,
    /// Body bytes.
    pub body: Bytes,
    /// HTTP status code (0 means 200).
    pub status_code: u16,
    /// Reason phrase (empty means the canonical one).
    pub status_msg: String,
    /// Extra headers.
    pub headers: HashMap<String, String>,
}

impl Response {
    /// Create an empty `200 OK` response for the given clients.
    pub fn new(server_id: impl Into<String>, client_ids: Vec<u64>) -> Self {
        Self {
            server_id: server_id.into(),
            client_ids,
            ..Self::default()
        }
    }

    /// Create a response addressed to the sender of `request`.
    pub fn to(request: &Request) -> Self {
        Self::new(request.server_id(), vec![request.client_id()])
    }

    /// Set status code and reason phrase.
    pub fn status(mut self, code: u16, msg: impl Into<String>) -> Self {
        self.status_code = code;
        self.status_msg = msg.into();
        self
    }

    /// Add a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Set the body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Encode into a single frame.
    ///
    /// Fails if there are no client ids or more than
    /// [`MAX_CLIENTS_PER_FRAME`]; use [`encode_frames`](Self::encode_frames)
    /// for larger fan-outs.
    pub fn encode(&self) -> Result<Bytes> {
        self.validate()?;
        if self.client_ids.len() > MAX_CLIENTS_PER_FRAME {
            return Err(HandlerError::InvalidResponse(format!(
                "{} client ids exceed the per-frame maximum of {}",
                self.client_ids.len(),
                MAX_CLIENTS_PER_FRAME
            )));
        }

        let payload = self.http_payload();
        Ok(self.envelope(&self.client_ids, &payload))
    }

    /// Encode into as many frames as needed to address every client with at
    /// most `max_clients` ids per frame. All frames carry the same payload.
    pub fn encode_frames(&self, max_clients: usize) -> Result<Vec<Bytes>> {
        self.validate()?;
        if max_clients == 0 {
            return Err(HandlerError::InvalidResponse(
                "max clients per frame must be positive".to_string(),
            ));
        }

        let payload = self.http_payload();
        Ok(self
            .client_ids
            .chunks(max_clients)
            .map(|ids| self.envelope(ids, &payload))
            .collect())
    }

    /// Effective status code.
    pub fn code(&self) -> u16 {
        if self.status_code == 0 {
            200
        } else {
            self.status_code
        }
    }

    /// Effective reason phrase.
    pub fn reason(&self) -> &str {
        if !self.status_msg.is_empty() {
            return &self.status_msg;
        }
        http::StatusCode::from_u16(self.code())
            .ok()
            .and_then(|code| code.canonical_reason())
            .unwrap_or("Unknown")
    }

    /// Check the response can be framed: a bare server id, at least one
    /// client and no line breaks in any header.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.server_id.is_empty() || self.server_id.contains(' ') {
            return Err(HandlerError::InvalidResponse(format!(
                "invalid server id '{}'",
                self.server_id
            )));
        }
        if self.client_ids.is_empty() {
            return Err(HandlerError::InvalidResponse(
                "response has no client ids".to_string(),
            ));
        }
        let breaks = |text: &str| text.contains(['\r', '\n']);
        if let Some(name) = self
            .headers
            .iter()
            .find(|(name, value)| breaks(name.as_str()) || breaks(value.as_str()))
            .map(|(name, _)| name)
        {
            return Err(HandlerError::InvalidResponse(format!(
                "line break in header '{}'",
                name.escape_default()
            )));
        }
        Ok(())
    }

    /// The part the end client sees.
    fn http_payload(&self) -> Bytes {
        let mut head = format!(
            "HTTP/1.1 {} {}\r\nContent-Length: {}\r\n",
            self.code(),
            self.reason(),
            self.body.len()
        );
        for (name, value) in &self.headers {
            if name.eq_ignore_ascii_case("content-length") {
                continue;
            }
            head.push_str(name);
            head.push_str(": ");
            head.push_str(value);
            head.push_str("\r\n");
        }
        head.push_str("\r\n");

        let mut buf = BytesMut::with_capacity(head.len() + self.body.len());
        buf.extend_from_slice(head.as_bytes());
        buf.extend_from_slice(&self.body);
        buf.freeze()
    }

    fn envelope(&self, ids: &[u64], payload: &[u8]) -> Bytes {
        let clients = ids
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(" ");
        let prefix = format!("{} {}:{}, ", self.server_id, clients.len(), clients);

        let mut buf = BytesMut::with_capacity(prefix.len() + payload.len());
        buf.extend_from_slice(prefix.as_bytes());
        buf.extend_from_slice(payload);
        buf.freeze()
    }
}

/// Encode a response into a single frame (standalone function).
#[inline]
pub fn encode_response(response: &Response) -> Result<Bytes> {
    response.encode()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_text(frame: &Bytes) -> &str {
        std::str::from_utf8(frame).unwrap()
    }

    /// Splits an encoded frame into (envelope, head lines, body).
    fn split_frame(frame: &str) -> (&str, Vec<&str>, &str) {
        let (envelope, http) = frame.split_once(", ").unwrap();
        let (head, body) = http.split_once("\r\n\r\n").unwrap();
        (envelope, head.split("\r\n").collect(), body)
    }

    #[test]
    fn test_encode_sample_response() {
        let frame = Response::new("srv1", vec![42])
            .header("Content-Type", "text/plain")
            .body("hi")
            .encode()
            .unwrap();
        let text = as_text(&frame);

        assert!(text.starts_with("srv1 2:42, "));
        let (envelope, head, body) = split_frame(text);
        assert_eq!(envelope, "srv1 2:42");
        assert_eq!(head[0], "HTTP/1.1 200 OK");
        assert!(head.contains(&"Content-Length: 2"));
        assert!(head.contains(&"Content-Type: text/plain"));
        assert_eq!(body, "hi");
    }

    #[test]
    fn test_content_length_always_computed() {
        let frame = Response::new("srv", vec![1])
            .header("Content-Length", "999")
            .header("content-length", "7")
            .body("four")
            .encode()
            .unwrap();
        let (_, head, _) = split_frame(as_text(&frame));

        let lengths: Vec<_> = head
            .iter()
            .filter(|line| line.to_ascii_lowercase().starts_with("content-length"))
            .collect();
        assert_eq!(lengths, vec![&"Content-Length: 4"]);
    }

    #[test]
    fn test_fan_out_client_list() {
        let frame = Response::new("srv1", vec![1, 2, 3]).encode().unwrap();
        assert!(as_text(&frame).starts_with("srv1 5:1 2 3, "));
    }

    #[test]
    fn test_empty_body() {
        let frame = Response::new("srv", vec![1]).encode().unwrap();
        let (_, head, body) = split_frame(as_text(&frame));

        assert!(head.contains(&"Content-Length: 0"));
        assert_eq!(body, "");
    }

    #[test]
    fn test_status_defaults() {
        let ok = Response::new("srv", vec![1]);
        assert_eq!(ok.code(), 200);
        assert_eq!(ok.reason(), "OK");

        let not_found = Response::new("srv", vec![1]).status(404, "");
        assert_eq!(not_found.reason(), "Not Found");
        assert!(as_text(&not_found.encode().unwrap()).contains("HTTP/1.1 404 Not Found\r\n"));

        let custom = Response::new("srv", vec![1]).status(418, "Short And Stout");
        assert!(as_text(&custom.encode().unwrap()).contains("HTTP/1.1 418 Short And Stout\r\n"));

        let unknown = Response::new("srv", vec![1]).status(599, "");
        assert_eq!(unknown.reason(), "Unknown");
    }

    #[test]
    fn test_response_to_request() {
        let req = Request::decode(&b"srv9 17 / 0:,0:,"[..]).unwrap();
        let resp = Response::to(&req);

        assert_eq!(resp.server_id, "srv9");
        assert_eq!(resp.client_ids, vec![17]);
    }

    #[test]
    fn test_binary_body_verbatim() {
        let body: Vec<u8> = (0..=255).collect();
        let frame = Response::new("srv", vec![1]).body(body.clone()).encode().unwrap();
        assert!(frame.ends_with(&body));
    }

    #[test]
    fn test_no_clients_rejected() {
        let err = Response::new("srv", Vec::new()).encode().unwrap_err();
        assert!(matches!(err, HandlerError::InvalidResponse(_)));
    }

    #[test]
    fn test_invalid_server_id_rejected() {
        assert!(Response::new("", vec![1]).encode().is_err());
        assert!(Response::new("a b", vec![1]).encode().is_err());
    }

    #[test]
    fn test_header_line_breaks_rejected() {
        let value = Response::new("srv", vec![1]).header("X-A", "v\r\nSet-Cookie: evil=1");
        assert!(matches!(value.encode(), Err(HandlerError::InvalidResponse(_))));

        let name = Response::new("srv", vec![1]).header("X-A\nX-B", "v");
        assert!(matches!(
            name.encode_frames(MAX_CLIENTS_PER_FRAME),
            Err(HandlerError::InvalidResponse(_))
        ));

        let bare_cr = Response::new("srv", vec![1]).header("X-A", "v\r");
        assert!(bare_cr.validate().is_err());
    }

    #[test]
    fn test_single_frame_client_limit() {
        let ids: Vec<u64> = (0..=MAX_CLIENTS_PER_FRAME as u64).collect();
        assert!(Response::new("srv", ids).encode().is_err());
    }

    #[test]
    fn test_encode_frames_splits_fan_out() {
        let resp = Response::new("srv", vec![1, 2, 3, 4, 5]).body("x");
        let frames = resp.encode_frames(2).unwrap();

        assert_eq!(frames.len(), 3);
        assert!(as_text(&frames[0]).starts_with("srv 3:1 2, "));
        assert!(as_text(&frames[1]).starts_with("srv 3:3 4, "));
        assert!(as_text(&frames[2]).starts_with("srv 1:5, "));
        for frame in &frames {
            assert!(frame.ends_with(b"\r\n\r\nx"));
        }
    }

    #[test]
    fn test_encode_frames_zero_max_rejected() {
        assert!(Response::new("srv", vec![1]).encode_frames(0).is_err());
    }

    #[test]
    fn test_standalone_encode() {
        let resp = Response::new("srv", vec![1]).body("a");
        assert_eq!(encode_response(&resp).unwrap(), resp.encode().unwrap());
    }
}
