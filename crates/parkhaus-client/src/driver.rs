//! A driver looking for a spot: query, take, park for a while, release.
//!
//! Each driver owns one connection and finishes after one successful
//! park-and-release cycle, which is also when the server closes the
//! connection. Denials and empty pools are retried after a random pause.

use std::io;
use std::ops::Range;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use rand::Rng;
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tokio_util::codec::Framed;

use parkhaus::Command;
use parkhaus::protocol::ClientCodec;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("connection fault: {0}")]
    Io(#[from] io::Error),
    #[error("server closed the connection")]
    Closed,
}

#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub host: String,
    pub port: u16,
    /// Number of concurrent drivers.
    pub clients: usize,
    /// Pause before retrying after an empty pool or a denial.
    pub retry_delay: Range<Duration>,
    /// How long a driver keeps its spot.
    pub park_time: Range<Duration>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            clients: 50,
            retry_delay: Duration::from_millis(200)..Duration::from_millis(800),
            park_time: Duration::from_millis(500)..Duration::from_millis(2000),
        }
    }
}

fn jitter(range: &Range<Duration>) -> Duration {
    if range.is_empty() {
        return range.start;
    }
    rand::rng().random_range(range.clone())
}

/// Result of one driver's run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverOutcome {
    /// Allocation attempts refused before the successful one.
    pub denied: usize,
    /// Whether the final release was acknowledged.
    pub released: bool,
}

/// Totals over all drivers.
///
/// Every driver is counted once, in either `parked` or `failed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverReport {
    pub clients: usize,
    pub parked: usize,
    pub denied: usize,
    pub failed: usize,
}

pub struct Driver {
    id: usize,
    conn: Framed<TcpStream, ClientCodec>,
    retry_delay: Range<Duration>,
    park_time: Range<Duration>,
}

impl Driver {
    pub async fn connect(id: usize, config: &DriverConfig) -> Result<Self, ClientError> {
        let stream = TcpStream::connect((config.host.as_str(), config.port)).await?;
        tracing::info!(client = id, "Connected to server");
        Ok(Self {
            id,
            conn: Framed::new(stream, ClientCodec::new()),
            retry_delay: config.retry_delay.clone(),
            park_time: config.park_time.clone(),
        })
    }

    async fn request(&mut self, command: &Command) -> Result<String, ClientError> {
        tracing::debug!(client = self.id, %command, "Sending command");
        self.conn.send(command).await?;
        match self.conn.next().await {
            Some(reply) => Ok(reply?),
            None => Err(ClientError::Closed),
        }
    }

    /// Ask for the free spot count. A reply that is not a count is logged
    /// and reported as `None`.
    pub async fn query(&mut self) -> Result<Option<usize>, ClientError> {
        let reply = self.request(&Command::Query).await?;
        match reply.parse() {
            Ok(available) => {
                tracing::info!(client = self.id, available, "Queried spots");
                Ok(Some(available))
            }
            Err(_) => {
                tracing::error!(client = self.id, %reply, "Invalid reply to query");
                Ok(None)
            }
        }
    }

    /// Try to take a spot.
    pub async fn take(&mut self) -> Result<bool, ClientError> {
        let reply = self.request(&Command::Allocate).await?;
        tracing::info!(client = self.id, %reply, "Tried to take a spot");
        Ok(reply == "1")
    }

    /// Give the spot back.
    pub async fn release(&mut self) -> Result<bool, ClientError> {
        let reply = self.request(&Command::Release).await?;
        tracing::info!(client = self.id, %reply, "Released spot");
        Ok(reply == "1")
    }

    /// Loop until a spot is taken, keep it for a while, then release it.
    pub async fn run(mut self) -> Result<DriverOutcome, ClientError> {
        let mut denied = 0;

        loop {
            if self.query().await?.is_some_and(|available| available > 0) {
                if self.take().await? {
                    let park = jitter(&self.park_time);
                    tracing::info!(client = self.id, seconds = park.as_secs_f64(), "Parking");
                    tokio::time::sleep(park).await;

                    let released = self.release().await?;
                    tracing::info!(client = self.id, "Client finished");
                    return Ok(DriverOutcome { denied, released });
                }
                denied += 1;
            }
            tokio::time::sleep(jitter(&self.retry_delay)).await;
        }
    }
}

/// Connect all drivers, then run them concurrently to completion.
pub async fn run_drivers(config: &DriverConfig) -> DriverReport {
    let mut report = DriverReport {
        clients: config.clients,
        ..DriverReport::default()
    };

    let mut drivers = JoinSet::new();
    for id in 1..=config.clients {
        match Driver::connect(id, config).await {
            Ok(driver) => {
                drivers.spawn(async move { (id, driver.run().await) });
            }
            Err(e) => {
                tracing::error!(client = id, error = %e, "Failed to connect");
                report.failed += 1;
            }
        }
    }

    while let Some(joined) = drivers.join_next().await {
        match joined {
            Ok((id, Ok(outcome))) => {
                report.denied += outcome.denied;
                if outcome.released {
                    report.parked += 1;
                } else {
                    tracing::error!(client = id, "Release not acknowledged");
                    report.failed += 1;
                }
            }
            Ok((id, Err(e))) => {
                tracing::error!(client = id, error = %e, "Client failed");
                report.failed += 1;
            }
            Err(e) => {
                tracing::error!(error = %e, "Client task failed");
                report.failed += 1;
            }
        }
    }

    report
}
