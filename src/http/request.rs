//! HTTP/1.1 request parser.
//!
//! Reads a request head from any async byte source, accumulating fixed-size
//! reads until the blank line that ends the header block shows up. Only the
//! subset needed for one GET/POST exchange per connection is understood:
//! no continuation lines, no chunked bodies, single-valued headers.

use crate::http::error::HttpError;
use bytes::{Bytes, BytesMut};
use memchr::memmem;
use std::collections::HashMap;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Size of each read while accumulating the header block.
pub const READ_CHUNK_SIZE: usize = 1024;

/// Blank line separating headers from the body.
const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// A parsed request head plus whatever body bytes arrived with it.
#[derive(Debug, Clone)]
pub struct Request {
    /// Upper-cased method token.
    pub method: String,
    /// Target path without query string or surrounding slashes.
    pub path: String,
    /// Version token exactly as received.
    pub version: String,
    pub query: HashMap<String, String>,
    /// Header map keyed by lower-cased name.
    pub headers: HashMap<String, String>,
    /// Body bytes that were already read together with the head.
    pub body_prefix: Bytes,
    /// Offset of the first body byte in the original read buffer.
    pub body_offset: usize,
}

impl Request {
    /// Look up a header by its lower-case name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Validated `content-length`, bounded by `limit`.
    pub fn content_length(&self, limit: u64) -> Result<u64, HttpError> {
        let declared: u64 = self
            .header("content-length")
            .ok_or(HttpError::InvalidContentLength)?
            .parse()
            .map_err(|_| HttpError::InvalidContentLength)?;

        if declared > limit {
            return Err(HttpError::ContentLengthOutOfRange { declared, limit });
        }

        Ok(declared)
    }

    /// Read and discard the rest of the declared body.
    ///
    /// Bytes already captured in `body_prefix` count towards the total.
    /// Returns the declared length once every byte has been consumed.
    pub async fn consume_body<R>(
        &self,
        reader: &mut R,
        chunk_size: usize,
        max_upload_size: u64,
    ) -> Result<u64, HttpError>
    where
        R: AsyncRead + Unpin,
    {
        let declared = self.content_length(max_upload_size)?;
        let mut remaining = declared.saturating_sub(self.body_prefix.len() as u64);

        if remaining == 0 {
            return Ok(declared);
        }

        let mut chunk = vec![0u8; chunk_size.max(1)];

        while remaining > 0 {
            let want = remaining.min(chunk.len() as u64) as usize;
            let n = reader.read(&mut chunk[..want]).await?;
            if n == 0 {
                return Err(HttpError::StreamClosed { remaining });
            }
            remaining -= n as u64;
        }

        Ok(declared)
    }
}

/// Read a request head from `reader`.
///
/// The source can be a live connection or an in-memory slice. Nothing past
/// the reads needed to find the header terminator is consumed; any body
/// bytes caught by those reads end up in [`Request::body_prefix`].
pub async fn read_request<R>(reader: &mut R, max_header_size: usize) -> Result<Request, HttpError>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = BytesMut::with_capacity(READ_CHUNK_SIZE);
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Err(HttpError::Incomplete);
        }

        // Back up far enough to catch a terminator split across two reads.
        let scan_from = buffer.len().saturating_sub(HEADER_TERMINATOR.len() - 1);
        buffer.extend_from_slice(&chunk[..n]);

        if let Some(pos) = memmem::find(&buffer[scan_from..], HEADER_TERMINATOR) {
            let header_end = scan_from + pos;
            if header_end > max_header_size {
                return Err(HttpError::HeaderTooLarge {
                    limit: max_header_size,
                });
            }
            return parse_head(buffer.freeze(), header_end);
        }

        if buffer.len() > max_header_size {
            return Err(HttpError::HeaderTooLarge {
                limit: max_header_size,
            });
        }
    }
}

/// Build a request from a buffer whose header block ends at `header_end`.
fn parse_head(buffer: Bytes, header_end: usize) -> Result<Request, HttpError> {
    let mut lines = buffer[..header_end]
        .split(|&b| b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line));

    let request_line = String::from_utf8_lossy(lines.next().unwrap_or_default());
    let mut tokens = request_line.split_whitespace();
    let (method, target, version) = match (tokens.next(), tokens.next(), tokens.next()) {
        (Some(method), Some(target), Some(version)) if tokens.next().is_none() => {
            (method, target, version)
        }
        _ => return Err(HttpError::MalformedRequestLine),
    };

    let (raw_path, query) = match target.split_once('?') {
        Some((path, query)) => (path, parse_query(query)),
        None => (target, HashMap::new()),
    };

    let mut headers = HashMap::new();
    for line in lines {
        if let Some(colon) = memchr::memchr(b':', line) {
            let key = String::from_utf8_lossy(&line[..colon]).trim().to_ascii_lowercase();
            let value = String::from_utf8_lossy(&line[colon + 1..]).trim().to_string();
            headers.insert(key, value);
        }
    }

    let body_offset = header_end + HEADER_TERMINATOR.len();

    Ok(Request {
        method: method.to_ascii_uppercase(),
        path: raw_path.trim_matches('/').to_string(),
        version: version.to_string(),
        query,
        headers,
        body_prefix: buffer.slice(body_offset..),
        body_offset,
    })
}

/// Split `a=1&b=2` into a map. Later keys overwrite earlier ones and pairs
/// without `=` are skipped.
fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect()
}
