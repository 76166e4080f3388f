//! Per-connection error taxonomy.
//!
//! Every variant is terminal for the connection that produced it and for
//! nothing else: the dispatcher logs it and closes the socket.

use std::fmt;
use std::io;

/// Failures while reading, validating or answering a single request.
#[derive(Debug)]
pub enum HttpError {
    /// Request line is not `METHOD TARGET VERSION`.
    MalformedRequestLine,
    /// Header block grew past the configured limit.
    HeaderTooLarge { limit: usize },
    /// Peer closed the connection before the header terminator arrived.
    Incomplete,
    /// `content-length` missing, non-numeric or negative.
    InvalidContentLength,
    /// `content-length` larger than the configured upload limit.
    ContentLengthOutOfRange { declared: u64, limit: u64 },
    /// Declared upload size disagrees with the resolved `size` option.
    OptionMismatch { declared: u64, expected: u64 },
    /// Peer closed the connection in the middle of a body transfer.
    StreamClosed { remaining: u64 },
    /// Test deadline elapsed before the transfer finished.
    DeadlineExceeded,
    Io(io::Error),
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpError::MalformedRequestLine => write!(f, "Malformed request line"),
            HttpError::HeaderTooLarge { limit } => {
                write!(f, "Header block exceeds {} bytes", limit)
            }
            HttpError::Incomplete => write!(f, "Connection closed before end of headers"),
            HttpError::InvalidContentLength => write!(f, "Invalid Content-Length"),
            HttpError::ContentLengthOutOfRange { declared, limit } => {
                write!(f, "Content-Length {} exceeds limit {}", declared, limit)
            }
            HttpError::OptionMismatch { declared, expected } => {
                write!(
                    f,
                    "Content-Length {} does not match requested size {}",
                    declared, expected
                )
            }
            HttpError::StreamClosed { remaining } => {
                write!(f, "Stream closed with {} body bytes outstanding", remaining)
            }
            HttpError::DeadlineExceeded => write!(f, "Transfer deadline exceeded"),
            HttpError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for HttpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HttpError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for HttpError {
    fn from(e: io::Error) -> Self {
        HttpError::Io(e)
    }
}

impl From<tokio::time::error::Elapsed> for HttpError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        HttpError::DeadlineExceeded
    }
}
