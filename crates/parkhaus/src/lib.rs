//! parkhaus: shared parking spot pool served over TCP.
//!
//! Clients connect, ask how many spots are free, take one, and give it back.
//! Each connection holds at most one spot at a time. The spot count is guarded
//! by a writer-preferring readers-writer lock so that a stream of queries
//! cannot hold off allocations and releases.

pub mod lock;
pub mod logging;
pub mod pool;
pub mod protocol;
pub mod session;
pub mod transport;

pub use lock::{LockState, WriterPreferringLock};
pub use logging::init_tracing;
pub use pool::{PoolError, PoolSnapshot, SpotPool};
pub use protocol::{Command, Reply};
pub use session::{DisconnectPolicy, Session, SessionEnd, SessionError, SessionId, Teardown};
pub use transport::{ServerConfig, serve, serve_with_shutdown};
