//! HTTP/1.1 response type and serializer.

use bytes::{Bytes, BytesMut};

/// Numeric status code with a static reason table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCode(pub u16);

impl StatusCode {
    pub const OK: StatusCode = StatusCode(200);
    pub const NOT_FOUND: StatusCode = StatusCode(404);

    /// Reason phrase, empty for codes outside the table.
    pub fn reason(self) -> &'static str {
        match self.0 {
            200 => "OK",
            400 => "Bad Request",
            404 => "Not Found",
            405 => "Method Not Allowed",
            413 => "Payload Too Large",
            500 => "Internal Server Error",
            _ => "",
        }
    }
}

/// A response held fully in memory.
///
/// Bandwidth payloads never go through `body`: the download handler declares
/// the total in `Content-Length`, serializes the head and writes the data
/// itself.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl Response {
    pub fn new(status: StatusCode) -> Self {
        Response {
            status,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Plain-text `404 Not Found`.
    pub fn not_found() -> Self {
        Response::new(StatusCode::NOT_FOUND)
            .with_header("Content-Type", "text/plain")
            .with_body("Not Found")
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.set_header(name, value);
        self
    }

    pub fn with_body<B: Into<Bytes>>(mut self, body: B) -> Self {
        self.body = body.into();
        self
    }

    /// Insert or replace a header; names compare case-insensitively.
    pub fn set_header(&mut self, name: &str, value: &str) {
        match self
            .headers
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
        {
            Some((_, existing)) => *existing = value.to_string(),
            None => self.headers.push((name.to_string(), value.to_string())),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Encode status line, headers and body.
    ///
    /// `Content-Length` is filled in from the body only when the caller has
    /// not set one.
    pub fn encode(&mut self) -> BytesMut {
        if self.header("Content-Length").is_none() {
            let len = self.body.len().to_string();
            self.set_header("Content-Length", &len);
        }

        let mut buf = BytesMut::with_capacity(128 + self.body.len());
        buf.extend_from_slice(b"HTTP/1.1 ");
        buf.extend_from_slice(self.status.0.to_string().as_bytes());
        buf.extend_from_slice(b" ");
        buf.extend_from_slice(self.status.reason().as_bytes());
        buf.extend_from_slice(b"\r\n");

        for (name, value) in &self.headers {
            buf.extend_from_slice(name.as_bytes());
            buf.extend_from_slice(b": ");
            buf.extend_from_slice(value.as_bytes());
            buf.extend_from_slice(b"\r\n");
        }

        buf.extend_from_slice(b"\r\n");
        buf.extend_from_slice(&self.body);
        buf
    }
}
