//! TCP transport.

mod server;

pub use server::{ServerConfig, serve, serve_with_shutdown, shutdown_signal};
