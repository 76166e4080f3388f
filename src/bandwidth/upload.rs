//! Upload test: server reads and discards data sent by the client.

use crate::bandwidth::options::TestOptions;
use crate::http::{HttpError, Request, Response, StatusCode};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::trace;

/// Serve an upload test on `stream`.
///
/// The declared `Content-Length` must equal the resolved `size` option
/// exactly; otherwise the request is refused without a response. Returns
/// the number of body bytes accepted.
pub async fn handle<S>(
    stream: &mut S,
    request: &Request,
    max_upload_size: u64,
) -> Result<u64, HttpError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let options = TestOptions::from_query(&request.query);
    let declared = request.content_length(max_upload_size)?;
    let expected = options.total_bytes();

    if declared != expected {
        return Err(HttpError::OptionMismatch { declared, expected });
    }

    trace!(
        size_mb = options.size_mb,
        chunk_kb = options.chunk_kb,
        duration = options.duration_secs,
        prefix = request.body_prefix.len(),
        body_offset = request.body_offset,
        "Starting upload"
    );

    timeout(
        options.deadline(),
        request.consume_body(stream, options.chunk_bytes(), max_upload_size),
    )
    .await??;

    let mut response = Response::new(StatusCode::OK).with_body("done");
    stream.write_all(&response.encode()).await?;
    stream.flush().await?;

    Ok(declared)
}
