//! Bandwidth test handlers.
//!
//! - `download`: stream `size` MB of synthetic data to the client
//! - `upload`: drain `size` MB sent by the client and acknowledge it
//! - `options`: query option table and resolution

pub mod download;
pub mod options;
pub mod upload;
