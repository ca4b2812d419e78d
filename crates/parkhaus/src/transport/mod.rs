//! Transport layer for parkhaus.
//!
//! Provides the TCP dispatcher: one task per accepted connection, each
//! running a [`Session`](crate::session::Session) against the shared pool.

pub mod tcp;

pub use tcp::{ServerConfig, serve, serve_with_shutdown};
