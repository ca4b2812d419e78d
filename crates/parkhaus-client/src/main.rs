//! parkhaus-client: run a crowd of drivers against a parkhaus server.

use std::process;

use tracing::{error, info};

use parkhaus_client::{DriverConfig, run_drivers};

const USAGE: &str = "\
Usage: parkhaus-client [--host <addr>] [--port <port>] [--clients <n>]

Options:
  --host <addr>      Server address [env: HOST] [default: 127.0.0.1]
  --port <port>      Server port [env: PORT] [default: 5000]
  --clients <n>      Number of concurrent drivers [default: 50]
  -h, --help         Print this help";

fn parse_args(args: &[String], mut config: DriverConfig) -> Result<DriverConfig, String> {
    let mut i = 1; // skip argv[0]
    while i < args.len() {
        match args[i].as_str() {
            "--host" => {
                i += 1;
                config.host = args.get(i).ok_or("--host requires a value")?.clone();
            }
            "--port" => {
                i += 1;
                let port = args.get(i).ok_or("--port requires a value")?;
                config.port = port
                    .parse()
                    .map_err(|_| format!("invalid port: {port}"))?;
            }
            "--clients" => {
                i += 1;
                let clients = args.get(i).ok_or("--clients requires a value")?;
                config.clients = clients
                    .parse()
                    .map_err(|_| format!("invalid client count: {clients}"))?;
            }
            "--help" | "-h" => return Err(String::new()),
            arg if arg.starts_with('-') => return Err(format!("unknown flag: {arg}")),
            arg => return Err(format!("unexpected argument: {arg}")),
        }
        i += 1;
    }
    Ok(config)
}

fn main() {
    let _ = dotenvy::dotenv();
    parkhaus::init_tracing(&["parkhaus", "parkhaus-client"]);

    let mut config = DriverConfig::default();
    if let Ok(host) = std::env::var("HOST") {
        config.host = host;
    }
    if let Ok(port) = std::env::var("PORT") {
        match port.parse() {
            Ok(port) => config.port = port,
            Err(_) => {
                eprintln!("error: invalid PORT: {port}");
                process::exit(2);
            }
        }
    }

    let args: Vec<String> = std::env::args().collect();
    let config = match parse_args(&args, config) {
        Ok(config) => config,
        Err(msg) if msg.is_empty() => {
            println!("{USAGE}");
            return;
        }
        Err(msg) => {
            eprintln!("error: {msg}");
            eprintln!();
            eprintln!("{USAGE}");
            process::exit(2);
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "Failed to start tokio runtime");
            process::exit(1);
        }
    };

    info!(
        host = %config.host,
        port = config.port,
        clients = config.clients,
        "Starting drivers"
    );
    let report = rt.block_on(run_drivers(&config));
    info!(
        clients = report.clients,
        parked = report.parked,
        denied = report.denied,
        failed = report.failed,
        "All drivers finished"
    );

    if report.failed > 0 {
        process::exit(1);
    }
}
