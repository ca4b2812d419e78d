//! Line codecs for the parking protocol.
//!
//! Both codecs wrap `LinesCodec` for framing. A trailing `\r` is dropped, and
//! a final unterminated line is still delivered when the peer closes its
//! write side.
//!
//! The server also accepts a bare command with no newline: whatever has
//! arrived since the last command is taken as the next one, unless it is
//! still the beginning of a known command. A line longer than
//! [`MAX_LINE_LENGTH`] decodes as an unknown command and the rest of it is
//! skipped. On the client side an over-long reply is a framing error.

use std::io;

use tokio_util::bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use super::command::{Command, Reply};

/// Longest accepted line, in bytes.
pub const MAX_LINE_LENGTH: usize = 1024;

fn into_io(e: LinesCodecError) -> io::Error {
    match e {
        LinesCodecError::Io(e) => e,
        LinesCodecError::MaxLineLengthExceeded => io::Error::new(
            io::ErrorKind::InvalidData,
            format!("line exceeds {MAX_LINE_LENGTH} bytes"),
        ),
    }
}

fn lines() -> LinesCodec {
    LinesCodec::new_with_max_length(MAX_LINE_LENGTH)
}

/// Server side: decodes commands, encodes replies.
pub struct ServerCodec {
    inner: LinesCodec,
}

impl Default for ServerCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerCodec {
    pub fn new() -> Self {
        Self { inner: lines() }
    }
}

impl Decoder for ServerCodec {
    type Item = Command;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Command>, io::Error> {
        match self.inner.decode(src) {
            Ok(Some(line)) => Ok(Some(Command::parse(&line))),
            Ok(None) => Ok(self.bare_command(src)),
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                tracing::debug!(limit = MAX_LINE_LENGTH, "Discarding over-long line");
                Ok(Some(Command::Unknown(format!(
                    "<line over {MAX_LINE_LENGTH} bytes>"
                ))))
            }
            Err(e) => Err(into_io(e)),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Command>, io::Error> {
        if let Some(command) = self.decode(src)? {
            return Ok(Some(command));
        }
        let line = self.inner.decode_eof(src).map_err(into_io)?;
        Ok(line.as_deref().map(Command::parse))
    }
}

impl ServerCodec {
    /// Take the unterminated bytes in `src` as one command.
    ///
    /// Leaves them in place while they are empty, not valid UTF-8 yet, or a
    /// strict prefix of a known command.
    fn bare_command(&mut self, src: &mut BytesMut) -> Option<Command> {
        let pending = std::str::from_utf8(&src[..]).ok()?.trim_start();
        if pending.is_empty() || is_partial_command(pending) {
            return None;
        }

        let command = Command::parse(pending);
        src.clear();
        // The inner codec remembers how far it scanned the old buffer.
        self.inner = lines();
        Some(command)
    }
}

fn is_partial_command(text: &str) -> bool {
    [Command::QUERY, Command::ALLOCATE, Command::RELEASE]
        .iter()
        .any(|known| known.len() > text.len() && known.starts_with(text))
}

impl Encoder<Reply> for ServerCodec {
    type Error = io::Error;

    fn encode(&mut self, reply: Reply, dst: &mut BytesMut) -> Result<(), io::Error> {
        self.inner.encode(reply.to_string(), dst).map_err(into_io)
    }
}

/// Client side: encodes commands, decodes raw reply text.
///
/// Replies are left as text because their meaning depends on the command
/// that was sent (`1` is a count after a query, a grant after an allocation).
pub struct ClientCodec {
    inner: LinesCodec,
}

impl Default for ClientCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientCodec {
    pub fn new() -> Self {
        Self { inner: lines() }
    }
}

impl Decoder for ClientCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, io::Error> {
        let line = self.inner.decode(src).map_err(into_io)?;
        Ok(line.map(|l| l.trim().to_string()))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>, io::Error> {
        let line = self.inner.decode_eof(src).map_err(into_io)?;
        Ok(line.map(|l| l.trim().to_string()))
    }
}

impl Encoder<&Command> for ClientCodec {
    type Error = io::Error;

    fn encode(&mut self, command: &Command, dst: &mut BytesMut) -> Result<(), io::Error> {
        self.inner.encode(command.as_str(), dst).map_err(into_io)
    }
}
