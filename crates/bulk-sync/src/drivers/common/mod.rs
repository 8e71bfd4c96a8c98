//! Utilities shared by both drivers.
//!
//! - [`tls`]: `ssl_mode` parsing, rustls connectors and TDS encryption levels

pub mod tls;

pub use tls::{SslMode, TlsBuilder};
