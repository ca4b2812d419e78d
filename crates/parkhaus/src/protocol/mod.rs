//! Text protocol between parking clients and the server.
//!
//! One command per line, one reply per line, strictly alternating.
//!
//! - **command**: the command vocabulary and reply values
//! - **codec**: line framing for both ends of a connection

pub mod codec;
pub mod command;

pub use codec::{ClientCodec, ServerCodec};
pub use command::{Command, Reply};
