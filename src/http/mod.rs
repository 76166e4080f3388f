//! Minimal HTTP/1.1 layer.
//!
//! One request per connection, `Content-Length` framed bodies only:
//! - `request`: incremental head parser and body draining
//! - `response`: in-memory response and wire encoder
//! - `error`: per-connection failure taxonomy

pub mod error;
pub mod request;
pub mod response;

pub use error::HttpError;
pub use request::{read_request, Request};
pub use response::{Response, StatusCode};
