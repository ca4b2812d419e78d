//! TCP server: accepts connections and runs one session per connection.

use std::num::NonZeroUsize;
use std::pin::pin;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::pool::SpotPool;
use crate::session::{DisconnectPolicy, Session, SessionError, SessionId};

/// Default number of spots in the pool.
pub const DEFAULT_CAPACITY: NonZeroUsize = NonZeroUsize::new(10).unwrap();

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Number of spots in the pool.
    pub capacity: NonZeroUsize,
    /// Whether spots held by a vanished client go back to the pool.
    pub disconnect_policy: DisconnectPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            capacity: DEFAULT_CAPACITY,
            disconnect_policy: DisconnectPolicy::Leak,
        }
    }
}

/// Bind the configured address and serve until SIGINT or SIGTERM.
pub async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
    let pool = Arc::new(SpotPool::new(config.capacity));

    serve_with_shutdown(listener, pool, config.disconnect_policy, shutdown_signal()).await
}

/// Serve connections from `listener` until `shutdown` completes.
///
/// Sessions still open at shutdown are dropped without returning their spots.
pub async fn serve_with_shutdown<F>(
    listener: TcpListener,
    pool: Arc<SpotPool>,
    disconnect_policy: DisconnectPolicy,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()>,
{
    let addr = listener.local_addr()?;
    info!(
        %addr,
        capacity = pool.capacity(),
        ?disconnect_policy,
        "Starting parkhaus server"
    );

    let mut sessions = JoinSet::new();
    let mut shutdown = pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(error = %e, "Failed to accept connection");
                        continue;
                    }
                };
                let session = Session::new(SessionId::from(peer), Arc::clone(&pool), disconnect_policy);
                sessions.spawn(run_session(session, stream));
            }
            Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                if let Err(e) = joined {
                    error!(error = %e, "Session task failed");
                }
            }
        }
    }

    let snapshot = pool.snapshot().await;
    info!(
        open_sessions = sessions.len(),
        available = snapshot.available,
        in_use = snapshot.in_use,
        "Server shutdown complete"
    );
    sessions.shutdown().await;

    Ok(())
}

async fn run_session(session: Session, stream: TcpStream) {
    let id = session.id().clone();
    info!(session = %id, "Client connected");

    match session.run(stream).await {
        Ok(end) => info!(session = %id, ?end, "Client disconnected"),
        Err(SessionError::Connection(e)) => {
            warn!(session = %id, error = %e, "Connection fault");
        }
        Err(e) => error!(session = %id, error = %e, "Session terminated"),
    }
}

/// Wait for SIGINT or SIGTERM.
///
/// # Panics
///
/// Panics if signal handlers cannot be installed, which only happens when
/// the tokio runtime is misconfigured. That should fail fast at startup.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler - is tokio runtime configured correctly?");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler - is tokio runtime configured correctly?")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::time::Duration;

    use futures::{SinkExt, StreamExt};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::sync::oneshot;
    use tokio::task::JoinHandle;
    use tokio_util::codec::Framed;

    use crate::protocol::codec::MAX_LINE_LENGTH;
    use crate::protocol::{ClientCodec, Command};

    struct TestServer {
        addr: SocketAddr,
        pool: Arc<SpotPool>,
        stop: oneshot::Sender<()>,
        handle: JoinHandle<anyhow::Result<()>>,
    }

    impl TestServer {
        async fn start(capacity: usize, policy: DisconnectPolicy) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let pool = Arc::new(SpotPool::new(NonZeroUsize::new(capacity).unwrap()));
            let (stop, stopped) = oneshot::channel::<()>();
            let handle = tokio::spawn(serve_with_shutdown(
                listener,
                Arc::clone(&pool),
                policy,
                async move {
                    let _ = stopped.await;
                },
            ));
            Self {
                addr,
                pool,
                stop,
                handle,
            }
        }

        async fn connect(&self) -> Framed<TcpStream, ClientCodec> {
            let stream = TcpStream::connect(self.addr).await.unwrap();
            Framed::new(stream, ClientCodec::new())
        }

        async fn stop(self) {
            let _ = self.stop.send(());
            self.handle.await.unwrap().unwrap();
        }
    }

    async fn ask(client: &mut Framed<TcpStream, ClientCodec>, command: &Command) -> String {
        client.send(command).await.unwrap();
        client.next().await.unwrap().unwrap()
    }

    #[test]
    fn server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 5000);
        assert_eq!(config.capacity.get(), 10);
        assert_eq!(config.disconnect_policy, DisconnectPolicy::Leak);
    }

    #[tokio::test]
    async fn two_clients_share_single_spot() {
        let server = TestServer::start(1, DisconnectPolicy::Leak).await;
        let mut a = server.connect().await;
        let mut b = server.connect().await;

        assert_eq!(ask(&mut a, &Command::Allocate).await, "1");
        assert_eq!(ask(&mut b, &Command::Allocate).await, "0");
        assert_eq!(ask(&mut a, &Command::Release).await, "1");
        assert!(a.next().await.is_none(), "connection closes after release");
        assert_eq!(ask(&mut b, &Command::Allocate).await, "1");
        assert_eq!(ask(&mut b, &Command::Query).await, "0");

        server.stop().await;
    }

    #[tokio::test]
    async fn invalid_command_then_valid_ones() {
        let server = TestServer::start(3, DisconnectPolicy::Leak).await;
        let mut client = server.connect().await;

        assert_eq!(ask(&mut client, &Command::parse("foo")).await, "-1");
        assert_eq!(ask(&mut client, &Command::Release).await, "0");
        assert_eq!(ask(&mut client, &Command::Query).await, "3");
        assert_eq!(ask(&mut client, &Command::Query).await, "3");
        assert_eq!(ask(&mut client, &Command::Allocate).await, "1");
        assert_eq!(ask(&mut client, &Command::Allocate).await, "0");

        server.stop().await;
    }

    #[tokio::test]
    async fn bare_commands_without_newline_get_replies() {
        let server = TestServer::start(3, DisconnectPolicy::Leak).await;
        let stream = TcpStream::connect(server.addr).await.unwrap();
        let (read, mut write) = stream.into_split();
        let mut replies = BufReader::new(read).lines();

        write.write_all(b"consultar_vaga").await.unwrap();
        let reply = tokio::time::timeout(Duration::from_secs(2), replies.next_line())
            .await
            .expect("no reply to a command without newline")
            .unwrap();
        assert_eq!(reply.as_deref(), Some("3"));

        write.write_all(b"pegar_vaga").await.unwrap();
        assert_eq!(replies.next_line().await.unwrap().as_deref(), Some("1"));
        assert_eq!(server.pool.query().await, 2);

        server.stop().await;
    }

    #[tokio::test]
    async fn overlong_line_is_invalid_and_session_continues() {
        let server = TestServer::start(3, DisconnectPolicy::Leak).await;
        let stream = TcpStream::connect(server.addr).await.unwrap();
        let (read, mut write) = stream.into_split();
        let mut replies = BufReader::new(read).lines();

        let long = "x".repeat(MAX_LINE_LENGTH + 100);
        write.write_all(format!("{long}\n").as_bytes()).await.unwrap();
        assert_eq!(replies.next_line().await.unwrap().as_deref(), Some("-1"));

        // A slow delivery of the long line may be answered more than once.
        write.write_all(b"consultar_vaga\n").await.unwrap();
        loop {
            let reply = replies.next_line().await.unwrap();
            match reply.as_deref() {
                Some("-1") => continue,
                other => {
                    assert_eq!(other, Some("3"));
                    break;
                }
            }
        }

        server.stop().await;
    }

    #[tokio::test]
    async fn disconnect_while_holding_leaks_spot() {
        let server = TestServer::start(2, DisconnectPolicy::Leak).await;

        let mut client = server.connect().await;
        assert_eq!(ask(&mut client, &Command::Allocate).await, "1");
        drop(client);

        // Another session still sees the spot as taken.
        let mut other = server.connect().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(ask(&mut other, &Command::Query).await, "1");

        server.stop().await;
    }

    #[tokio::test]
    async fn disconnect_while_holding_reclaims_spot() {
        let server = TestServer::start(2, DisconnectPolicy::Reclaim).await;

        let mut client = server.connect().await;
        assert_eq!(ask(&mut client, &Command::Allocate).await, "1");
        drop(client);

        let mut reclaimed = false;
        for _ in 0..100 {
            if server.pool.query().await == 2 {
                reclaimed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(reclaimed, "spot was not returned after disconnect");

        server.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn many_clients_conserve_spots() {
        const CAPACITY: usize = 3;
        const CLIENTS: usize = 20;

        let server = TestServer::start(CAPACITY, DisconnectPolicy::Leak).await;

        let mut clients = Vec::new();
        for _ in 0..CLIENTS {
            let mut client = server.connect().await;
            clients.push(tokio::spawn(async move {
                loop {
                    let available: usize = ask(&mut client, &Command::Query).await.parse().unwrap();
                    assert!(available <= CAPACITY);
                    if available > 0 && ask(&mut client, &Command::Allocate).await == "1" {
                        assert_eq!(ask(&mut client, &Command::Allocate).await, "0");
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        assert_eq!(ask(&mut client, &Command::Release).await, "1");
                        assert!(client.next().await.is_none());
                        return;
                    }
                    tokio::time::sleep(Duration::from_millis(2)).await;
                }
            }));
        }
        for client in clients {
            client.await.unwrap();
        }

        assert_eq!(server.pool.query().await, CAPACITY);
        server.stop().await;
    }
}
