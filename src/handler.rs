//! Per-connection request handling.
//!
//! One request per connection: read the head, route on the path, answer,
//! close. Errors end the exchange silently; they are only logged.

use crate::assets;
use crate::bandwidth::{download, upload};
use crate::config::Limits;
use crate::http::{read_request, HttpError, Request, Response, StatusCode};
use bytes::Bytes;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{debug, trace};

/// Hook applied to every static response before it is sent.
pub type Transform = Arc<dyn Fn(&Request, Response) -> Response + Send + Sync>;

/// What a finished exchange did.
#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    Download(u64),
    Upload(u64),
    Static(StatusCode),
}

/// Connection handler shared by every accepted connection.
pub struct Handler {
    limits: Limits,
    transform: Transform,
}

impl Handler {
    pub fn new(limits: Limits, transform: Transform) -> Self {
        Handler { limits, transform }
    }

    /// Serve one request on `stream`, then close it.
    pub async fn handle_connection<S>(&self, mut stream: S, peer: String)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        match self.exchange(&mut stream).await {
            Ok(outcome) => debug!(peer, ?outcome, "Request complete"),
            Err(e) => debug!(peer, error = %e, "Connection dropped"),
        }

        if let Err(e) = stream.shutdown().await {
            trace!(error = %e, "Shutdown failed");
        }
    }

    async fn exchange<S>(&self, stream: &mut S) -> Result<Outcome, HttpError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let request = timeout(
            self.limits.header_timeout,
            read_request(stream, self.limits.max_header_size),
        )
        .await??;

        trace!(
            method = %request.method,
            path = %request.path,
            version = %request.version,
            "Request received"
        );

        match (request.path.as_str(), request.method.as_str()) {
            ("download", _) => Ok(Outcome::Download(
                download::handle(stream, &request).await?,
            )),
            ("upload", "POST") => Ok(Outcome::Upload(
                upload::handle(stream, &request, self.limits.max_upload_size).await?,
            )),
            _ => self.serve_static(stream, &request).await,
        }
    }

    async fn serve_static<W>(&self, stream: &mut W, request: &Request) -> Result<Outcome, HttpError>
    where
        W: AsyncWrite + Unpin,
    {
        let name = assets::resolve_name(&request.path);

        let candidate = match assets::lookup(name) {
            Some(data) => Response::new(StatusCode::OK)
                .with_header("Content-Type", assets::mime_type(name))
                .with_body(Bytes::from_static(data)),
            None => Response::not_found(),
        };

        let mut response = (self.transform)(request, candidate);
        stream.write_all(&response.encode()).await?;
        stream.flush().await?;

        Ok(Outcome::Static(response.status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui;
    use std::time::Duration;
    use tokio::io::{duplex, AsyncReadExt};

    fn handler() -> Arc<Handler> {
        Arc::new(Handler::new(Limits::default(), ui::transform("test")))
    }

    async fn roundtrip(handler: Arc<Handler>, raw: &[u8]) -> Vec<u8> {
        let (mut client, server) = duplex(64 * 1024);
        let task = tokio::spawn(async move {
            handler
                .handle_connection(server, "test-peer".to_string())
                .await
        });

        client.write_all(raw).await.unwrap();
        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        task.await.unwrap();
        reply
    }

    fn split_head(reply: &[u8]) -> (String, &[u8]) {
        let end = memchr::memmem::find(reply, b"\r\n\r\n").unwrap() + 4;
        (String::from_utf8_lossy(&reply[..end]).into_owned(), &reply[end..])
    }

    #[tokio::test]
    async fn test_index_served() {
        let reply = roundtrip(handler(), b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
        let (head, body) = split_head(&reply);

        assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(head.contains("Content-Type: text/html\r\n"));
        assert!(head.contains(&format!("Content-Length: {}\r\n", body.len())));
        assert!(memchr::memmem::find(body, b"class=\"page\"").is_some());
        assert!(memchr::memmem::find(body, b"__VERSION__").is_none());
    }

    #[tokio::test]
    async fn test_light_theme_cookie() {
        let reply = roundtrip(
            handler(),
            b"GET /index.html HTTP/1.1\r\nCookie: theme=light\r\n\r\n",
        )
        .await;
        let (_, body) = split_head(&reply);

        assert!(memchr::memmem::find(body, b"class=\"page light\"").is_some());
    }

    #[tokio::test]
    async fn test_asset_mime_type() {
        let reply = roundtrip(handler(), b"GET /style.css HTTP/1.1\r\n\r\n").await;
        let (head, _) = split_head(&reply);

        assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(head.contains("Content-Type: text/css\r\n"));
    }

    #[tokio::test]
    async fn test_unknown_path_not_found() {
        let reply = roundtrip(handler(), b"GET /missing.png HTTP/1.1\r\n\r\n").await;
        let (head, body) = split_head(&reply);

        assert!(head.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(head.contains("Content-Type: text/plain\r\n"));
        assert_eq!(body, b"Not Found");
    }

    #[tokio::test]
    async fn test_upload_requires_post() {
        let reply = roundtrip(handler(), b"GET /upload HTTP/1.1\r\n\r\n").await;
        let (head, _) = split_head(&reply);

        assert!(head.starts_with("HTTP/1.1 404 Not Found\r\n"));
    }

    #[tokio::test]
    async fn test_download_routed() {
        let reply = roundtrip(handler(), b"GET /download?size=5&chunk=64 HTTP/1.1\r\n\r\n").await;
        let (head, body) = split_head(&reply);

        assert!(head.contains("Content-Type: application/octet-stream\r\n"));
        assert_eq!(body.len(), 5 * 1024 * 1024);
    }

    #[tokio::test]
    async fn test_upload_mismatch_dropped() {
        let reply = roundtrip(
            handler(),
            b"POST /upload?size=5 HTTP/1.1\r\nContent-Length: 1234\r\n\r\n",
        )
        .await;

        assert!(reply.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_request_dropped() {
        let reply = roundtrip(handler(), b"GARBAGE\r\n\r\n").await;
        assert!(reply.is_empty());
    }

    #[tokio::test]
    async fn test_oversized_header_dropped() {
        let limits = Limits {
            max_header_size: 1024,
            ..Limits::default()
        };
        let handler = Arc::new(Handler::new(limits, ui::transform("test")));

        let mut raw = b"GET / HTTP/1.1\r\nX-Filler: ".to_vec();
        raw.extend(std::iter::repeat(b'a').take(4096));
        raw.extend_from_slice(b"\r\n\r\n");

        assert!(roundtrip(handler, &raw).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_header_timeout() {
        let limits = Limits {
            header_timeout: Duration::from_secs(1),
            ..Limits::default()
        };
        let handler = Handler::new(limits, ui::transform("test"));
        let (mut client, mut server) = duplex(1024);

        client.write_all(b"GET / HTTP/1.1\r\n").await.unwrap();
        assert!(matches!(
            handler.exchange(&mut server).await,
            Err(HttpError::DeadlineExceeded)
        ));
    }

    #[tokio::test]
    async fn test_transform_sees_candidate() {
        let hook: Transform = Arc::new(|request: &Request, response: Response| {
            if request.path == "teapot" {
                Response::new(StatusCode(418)).with_body("short and stout")
            } else {
                response
            }
        });
        let handler = Arc::new(Handler::new(Limits::default(), hook));

        let reply = roundtrip(handler, b"GET /teapot HTTP/1.1\r\n\r\n").await;
        let (head, body) = split_head(&reply);

        assert!(head.starts_with("HTTP/1.1 418 \r\n"));
        assert_eq!(body, b"short and stout");
    }
}
