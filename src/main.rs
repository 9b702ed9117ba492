//! offgate - Offline-resilience gateway daemon
//!
//! Sits between application instances and their remote origin, serving
//! cached responses and synthesized fallbacks when the network is down,
//! and replaying deferred mutations when connectivity returns.

mod config;
mod gateway;
mod intercept;
mod ipc;
mod notify;
mod origin;
mod store;
mod sync;

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use config::GatewayConfig;
use gateway::GatewayManager;
use ipc::IpcServer;
use origin::OriginClient;

/// CLI command
#[derive(Debug)]
enum Command {
    /// Run the gateway (default)
    Serve { config: Option<PathBuf> },
    /// Query a running gateway over its socket
    Status { config: Option<PathBuf> },
    /// Show help
    Help,
}

fn print_help() {
    eprintln!(
        r#"offgate - Offline-resilience gateway for client applications

USAGE:
    offgate                       # Run the gateway (default)
    offgate serve [config.json]
    offgate status [config.json]
    offgate help

COMMANDS:
    (none)  Run the gateway with the default config location
    serve   Run the gateway with an explicit config file
    status  Print the status of a running gateway
    help    Show this help message

EXAMPLES:
    # Run with defaults
    offgate

    # Run against a staging origin
    offgate serve staging.json

    # Inspect cache and queue state
    offgate status

ENVIRONMENT:
    OFFGATE_CONFIG   Config file path (alternative to CLI arg)
    RUST_LOG         Log level (trace, debug, info, warn, error)
"#
    );
}

fn parse_args() -> Result<Command> {
    let args: Vec<String> = env::args().collect();
    let env_config = env::var("OFFGATE_CONFIG").ok().map(PathBuf::from);

    if args.len() < 2 {
        return Ok(Command::Serve { config: env_config });
    }

    let explicit = |args: &[String]| args.get(2).map(PathBuf::from);

    match args[1].as_str() {
        "serve" => Ok(Command::Serve {
            config: explicit(&args).or(env_config),
        }),
        "status" => Ok(Command::Status {
            config: explicit(&args).or(env_config),
        }),
        "help" | "--help" | "-h" => Ok(Command::Help),
        _ => {
            eprintln!("Unknown command: {}", args[1]);
            Ok(Command::Help)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let log_level = env::var("RUST_LOG")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let command = match parse_args() {
        Ok(cmd) => cmd,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(1);
        }
    };

    match command {
        Command::Serve { config } => {
            let config = GatewayConfig::resolve(config)?;
            info!(origin = %config.origin_url, version = %config.cache_version, "Starting gateway...");

            let origin = OriginClient::new(&config.origin_url)?;

            // Install + activate; a precache failure aborts startup and
            // leaves any previous cache region authoritative
            let gateway = match GatewayManager::start(config, origin).await {
                Ok(gateway) => Arc::new(gateway),
                Err(e) => {
                    error!(error = %e, "Failed to start gateway");
                    return Err(e);
                }
            };

            let socket_path = gateway.socket_path().to_path_buf();
            let mut ipc_server = IpcServer::new(Arc::clone(&gateway));
            ipc_server.start().await?;

            info!("Gateway ready. Waiting for application connections...");

            tokio::spawn(async move {
                if let Err(e) = ipc_server.run().await {
                    error!(error = %e, "IPC server error");
                }
            });

            // Wait for Ctrl+C
            tokio::signal::ctrl_c().await?;

            info!("Received shutdown signal, cleaning up...");
            let _ = std::fs::remove_file(&socket_path);

            info!("Shutdown complete.");
        }
        Command::Status { config } => {
            let config = GatewayConfig::resolve(config)?;
            match query_status(&config).await {
                Ok(status) => println!("{}", status),
                Err(e) => {
                    eprintln!("Gateway not reachable at {:?}: {}", config.socket_path, e);
                    std::process::exit(1);
                }
            }
        }
        Command::Help => {
            print_help();
        }
    }

    Ok(())
}

/// Connect to a running gateway and fetch one status line
async fn query_status(config: &GatewayConfig) -> Result<String> {
    let stream = UnixStream::connect(&config.socket_path).await?;
    let (reader, mut writer) = stream.into_split();

    writer.write_all(b"{\"type\":\"getStatus\"}\n").await?;

    let mut line = String::new();
    let mut buf_reader = BufReader::new(reader);
    buf_reader.read_line(&mut line).await?;

    if line.trim().is_empty() {
        return Err(anyhow!("empty response from gateway"));
    }
    Ok(line.trim().to_string())
}
