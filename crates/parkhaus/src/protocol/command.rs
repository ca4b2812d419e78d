//! Command vocabulary and replies.

use std::fmt;

/// A request sent by a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `consultar_vaga`: how many spots are free.
    Query,
    /// `pegar_vaga`: take a spot.
    Allocate,
    /// `liberar_vaga`: give the held spot back and end the session.
    Release,
    /// Anything else, kept verbatim (trimmed) for logging.
    Unknown(String),
}

impl Command {
    pub const QUERY: &'static str = "consultar_vaga";
    pub const ALLOCATE: &'static str = "pegar_vaga";
    pub const RELEASE: &'static str = "liberar_vaga";

    /// Parse a request line. Matching is exact and case-sensitive after
    /// trimming surrounding whitespace.
    pub fn parse(line: &str) -> Self {
        match line.trim() {
            Self::QUERY => Command::Query,
            Self::ALLOCATE => Command::Allocate,
            Self::RELEASE => Command::Release,
            other => Command::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Command::Query => Self::QUERY,
            Command::Allocate => Self::ALLOCATE,
            Command::Release => Self::RELEASE,
            Command::Unknown(raw) => raw,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reply sent by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// Answer to a query: the free spot count.
    Available(usize),
    /// Allocation or release succeeded (`1`).
    Granted,
    /// Allocation or release refused by policy (`0`).
    Denied,
    /// Command not recognised (`-1`).
    Invalid,
}

impl Reply {
    pub fn granted(ok: bool) -> Self {
        if ok { Reply::Granted } else { Reply::Denied }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Available(count) => write!(f, "{count}"),
            Reply::Granted => f.write_str("1"),
            Reply::Denied => f.write_str("0"),
            Reply::Invalid => f.write_str("-1"),
        }
    }
}
