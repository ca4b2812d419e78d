//! parkhaus-server: serve the spot pool over TCP.

mod config;

use std::process;

use tracing::{error, info};

use config::{ConfigError, USAGE};

fn main() {
    // Best effort: a missing .env file is fine.
    let _ = dotenvy::dotenv();
    parkhaus::init_tracing(&["parkhaus", "parkhaus-server"]);

    let args: Vec<String> = std::env::args().collect();
    let config = match config::load(|key| std::env::var(key).ok(), &args) {
        Ok(config) => config,
        Err(ConfigError::HelpRequested) => {
            println!("{USAGE}");
            return;
        }
        Err(e) => {
            eprintln!("error: {e}");
            eprintln!();
            eprintln!("{USAGE}");
            process::exit(2);
        }
    };

    info!("parkhaus {}", env!("CARGO_PKG_VERSION"));

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "Failed to start tokio runtime");
            process::exit(1);
        }
    };

    if let Err(e) = rt.block_on(parkhaus::serve(config)) {
        error!(error = %e, "Server failed");
        process::exit(1);
    }
}
