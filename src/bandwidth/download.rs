//! Download test: server streams synthetic data to the client.

use crate::bandwidth::options::TestOptions;
use crate::http::{HttpError, Request, Response, StatusCode};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::trace;

/// Leading bytes of every payload chunk; the rest is zero-filled.
pub const PAYLOAD_MARKER: &[u8] = b"start";

/// Serve a download test on `stream`.
///
/// The response head declares the full payload length, then the payload is
/// written chunk by chunk. The whole exchange must finish within the test
/// deadline. Returns the number of payload bytes written.
pub async fn handle<W>(stream: &mut W, request: &Request) -> Result<u64, HttpError>
where
    W: AsyncWrite + Unpin,
{
    let options = TestOptions::from_query(&request.query);
    let total = options.total_bytes();

    let mut response = Response::new(StatusCode::OK)
        .with_header("Content-Disposition", "attachment; filename=data.bin")
        .with_header("Content-Type", "application/octet-stream")
        .with_header("Content-Length", &total.to_string())
        .with_header("Cache-Control", "no-cache, no-store, must-revalidate")
        .with_header("Pragma", "no-cache")
        .with_header("Expires", "0")
        .with_header("Connection", "close");

    trace!(
        size_mb = options.size_mb,
        chunk_kb = options.chunk_kb,
        duration = options.duration_secs,
        "Starting download"
    );

    timeout(
        options.deadline(),
        stream_response(stream, &mut response, total, options.chunk_bytes()),
    )
    .await?
}

async fn stream_response<W>(
    stream: &mut W,
    response: &mut Response,
    total: u64,
    chunk_size: usize,
) -> Result<u64, HttpError>
where
    W: AsyncWrite + Unpin,
{
    stream.write_all(&response.encode()).await?;
    stream.flush().await?;
    send_payload(stream, total, chunk_size).await
}

/// Write `total` bytes in `chunk_size` pieces; the last piece is truncated.
pub async fn send_payload<W>(writer: &mut W, total: u64, chunk_size: usize) -> Result<u64, HttpError>
where
    W: AsyncWrite + Unpin,
{
    let mut chunk = vec![0u8; chunk_size.max(1)];
    let marker = PAYLOAD_MARKER.len().min(chunk.len());
    chunk[..marker].copy_from_slice(&PAYLOAD_MARKER[..marker]);

    let mut remaining = total;
    while remaining > 0 {
        let size = remaining.min(chunk.len() as u64) as usize;
        writer.write_all(&chunk[..size]).await?;
        remaining -= size as u64;
    }

    writer.flush().await?;
    Ok(total)
}
