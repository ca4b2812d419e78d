//! Server configuration from environment and command line.
//!
//! Precedence, lowest first: built-in defaults, environment (including a
//! `.env` file loaded by `main`), command-line flags.

use std::num::NonZeroUsize;
use std::str::FromStr;

use parkhaus::{DisconnectPolicy, ServerConfig};

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const CAPACITY_ENV: &str = "PARKHAUS_CAPACITY";
pub const RECLAIM_ENV: &str = "PARKHAUS_RECLAIM_ON_DISCONNECT";

pub const USAGE: &str = "\
Usage: parkhaus-server [--host <addr>] [--port <port>] [--capacity <n>] [--reclaim-on-disconnect]

Options:
  --host <addr>               Address to bind [env: HOST] [default: 127.0.0.1]
  --port <port>               Port to listen on [env: PORT] [default: 5000]
  --capacity <n>              Number of parking spots [env: PARKHAUS_CAPACITY] [default: 10]
  --reclaim-on-disconnect     Return a spot when its holder disconnects without releasing
                              [env: PARKHAUS_RECLAIM_ON_DISCONNECT] [default: false]
  -h, --help                  Print this help";

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },

    #[error("capacity must be at least 1")]
    ZeroCapacity,

    #[error("{0} requires a value")]
    MissingValue(String),

    #[error("unknown flag: {0}")]
    UnknownFlag(String),

    #[error("unexpected argument: {0}")]
    UnexpectedArgument(String),

    #[error("help requested")]
    HelpRequested,
}

fn parse<T: FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        name,
        value: value.to_string(),
    })
}

fn parse_capacity(name: &'static str, value: &str) -> Result<NonZeroUsize, ConfigError> {
    let capacity: usize = parse(name, value)?;
    NonZeroUsize::new(capacity).ok_or(ConfigError::ZeroCapacity)
}

fn parse_flag(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            name,
            value: value.to_string(),
        }),
    }
}

fn policy(reclaim: bool) -> DisconnectPolicy {
    if reclaim {
        DisconnectPolicy::Reclaim
    } else {
        DisconnectPolicy::Leak
    }
}

/// Build the server configuration.
///
/// `env` looks up environment variables; `args` includes `argv[0]`.
pub fn load<E>(env: E, args: &[String]) -> Result<ServerConfig, ConfigError>
where
    E: Fn(&str) -> Option<String>,
{
    let mut config = ServerConfig::default();

    if let Some(host) = env(HOST_ENV) {
        config.host = host;
    }
    if let Some(port) = env(PORT_ENV) {
        config.port = parse(PORT_ENV, &port)?;
    }
    if let Some(capacity) = env(CAPACITY_ENV) {
        config.capacity = parse_capacity(CAPACITY_ENV, &capacity)?;
    }
    if let Some(reclaim) = env(RECLAIM_ENV) {
        config.disconnect_policy = policy(parse_flag(RECLAIM_ENV, &reclaim)?);
    }

    let mut args = args.iter().skip(1);
    while let Some(arg) = args.next() {
        let mut value = || {
            args.next()
                .ok_or_else(|| ConfigError::MissingValue(arg.clone()))
        };
        match arg.as_str() {
            "--host" => config.host = value()?.clone(),
            "--port" => config.port = parse("--port", value()?)?,
            "--capacity" => config.capacity = parse_capacity("--capacity", value()?)?,
            "--reclaim-on-disconnect" => config.disconnect_policy = DisconnectPolicy::Reclaim,
            "--help" | "-h" => return Err(ConfigError::HelpRequested),
            flag if flag.starts_with('-') => return Err(ConfigError::UnknownFlag(flag.to_string())),
            other => return Err(ConfigError::UnexpectedArgument(other.to_string())),
        }
    }

    Ok(config)
}
