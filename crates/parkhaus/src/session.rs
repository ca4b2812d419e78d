//! Per-connection session: the one-spot-per-client state machine.
//!
//! ```text
//!            pegar_vaga (granted)           liberar_vaga
//!   Idle ───────────────────────────▶ Holding ───────────▶ Closed
//!    ▲  │                               │
//!    └──┘ pegar_vaga (pool empty),      └─ pegar_vaga: denied, stays Holding
//!         liberar_vaga: denied
//! ```
//!
//! `consultar_vaga` and unknown commands never change state. A successful
//! release ends the session: the server replies and closes the connection.
//!
//! A client that disconnects while holding a spot does not give it back
//! unless the session runs with [`DisconnectPolicy::Reclaim`].

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;

use crate::pool::{PoolError, SpotPool};
use crate::protocol::{Command, Reply, ServerCodec};

/// Identity of a connected client, normally its `ip:port`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<SocketAddr> for SessionId {
    fn from(addr: SocketAddr) -> Self {
        Self(addr.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    /// Not holding a spot.
    #[default]
    Idle,
    /// Holding exactly one spot.
    Holding,
    /// Finished; accepts no further commands.
    Closed,
}

/// What happens to a held spot when its client disconnects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DisconnectPolicy {
    /// The spot stays allocated for the life of the process.
    #[default]
    Leak,
    /// The spot is returned to the pool.
    Reclaim,
}

/// Outcome of tearing down a session that did not release normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    /// The session held nothing.
    Idle,
    /// The session held a spot that was not returned.
    Leaked,
    /// The session held a spot that was returned to the pool.
    Reclaimed,
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client released its spot and the server closed the connection.
    Released,
    /// The client went away first.
    Disconnected(Teardown),
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("connection fault: {0}")]
    Connection(#[from] io::Error),
    #[error("pool consistency fault: {0}")]
    Pool(#[from] PoolError),
    #[error("session is closed")]
    Closed,
}

/// Protocol state of one client connection.
pub struct Session {
    id: SessionId,
    state: SessionState,
    pool: Arc<SpotPool>,
    policy: DisconnectPolicy,
}

impl Session {
    pub fn new(id: SessionId, pool: Arc<SpotPool>, policy: DisconnectPolicy) -> Self {
        Self {
            id,
            state: SessionState::Idle,
            pool,
            policy,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn holds_spot(&self) -> bool {
        self.state == SessionState::Holding
    }

    /// Apply one command and produce its reply.
    ///
    /// Denials and unknown commands are replies, not errors. Errors mean the
    /// session cannot continue.
    pub async fn handle(&mut self, command: &Command) -> Result<Reply, SessionError> {
        tracing::debug!(session = %self.id, %command, "Command received");

        match (self.state, command) {
            (SessionState::Closed, _) => Err(SessionError::Closed),

            (_, Command::Query) => {
                let available = self.pool.query().await;
                tracing::debug!(session = %self.id, available, "Spots queried");
                Ok(Reply::Available(available))
            }

            (SessionState::Idle, Command::Allocate) => {
                let remaining = self.pool.allocate().await;
                match remaining {
                    Some(remaining) => {
                        self.state = SessionState::Holding;
                        tracing::info!(session = %self.id, remaining, "Spot allocated");
                    }
                    None => tracing::info!(session = %self.id, "No spots available"),
                }
                Ok(Reply::granted(remaining.is_some()))
            }

            (SessionState::Holding, Command::Allocate) => {
                tracing::warn!(session = %self.id, "Already holding a spot; allocation denied");
                Ok(Reply::Denied)
            }

            (SessionState::Holding, Command::Release) => {
                let available = self.pool.release().await?;
                self.state = SessionState::Closed;
                tracing::info!(session = %self.id, available, "Spot released");
                Ok(Reply::Granted)
            }

            (SessionState::Idle, Command::Release) => {
                tracing::warn!(session = %self.id, "Release without holding a spot; denied");
                Ok(Reply::Denied)
            }

            (_, Command::Unknown(raw)) => {
                tracing::warn!(session = %self.id, command = %raw, "Invalid command");
                Ok(Reply::Invalid)
            }
        }
    }

    /// Close the session without a release from the client.
    ///
    /// Whether a held spot goes back to the pool depends on the session's
    /// [`DisconnectPolicy`]. Closing an already closed session is a no-op.
    pub async fn abort(&mut self) -> Result<Teardown, SessionError> {
        let teardown = match (self.state, self.policy) {
            (SessionState::Idle | SessionState::Closed, _) => Teardown::Idle,
            (SessionState::Holding, DisconnectPolicy::Leak) => {
                tracing::warn!(
                    session = %self.id,
                    "Disconnected while holding a spot; spot stays allocated"
                );
                Teardown::Leaked
            }
            (SessionState::Holding, DisconnectPolicy::Reclaim) => {
                let available = self.pool.release().await?;
                tracing::warn!(
                    session = %self.id,
                    available,
                    "Disconnected while holding a spot; spot reclaimed"
                );
                Teardown::Reclaimed
            }
        };
        self.state = SessionState::Closed;
        Ok(teardown)
    }

    /// Serve commands from `stream` until the client releases its spot or
    /// the connection goes away.
    pub async fn run<S>(mut self, stream: S) -> Result<SessionEnd, SessionError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut framed = Framed::new(stream, ServerCodec::new());

        loop {
            let command = match framed.next().await {
                Some(Ok(command)) => command,
                Some(Err(e)) => {
                    tracing::debug!(session = %self.id, error = %e, "Read failed");
                    self.abort().await?;
                    return Err(e.into());
                }
                None => return Ok(SessionEnd::Disconnected(self.abort().await?)),
            };

            let reply = self.handle(&command).await?;

            if let Err(e) = framed.send(reply).await {
                tracing::debug!(session = %self.id, error = %e, "Write failed");
                self.abort().await?;
                return Err(e.into());
            }

            if self.state == SessionState::Closed {
                return Ok(SessionEnd::Released);
            }
        }
    }
}
