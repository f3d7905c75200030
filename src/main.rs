//! sock-bench: throughput benchmark over a socket abstraction
//!
//! Roles:
//! - `tcp-server`: accept one connection at a time and drain it
//! - `tcp-client`: connect, send a greeting, stream filler data and report
//!   the send rate every interval
//! - `udp-server`: echo datagrams back to their sender
//! - `udp-client`: send a greeting per interval and wait for the echo
//!
//! Configuration via CLI arguments or TOML file.

mod client;
mod config;
mod echo;
mod server;
mod throughput;
mod transport;

use client::Client;
use config::{Config, Role};
use server::Server;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use transport::{MonotonicClock, TokioTransport};

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        role = ?config.role,
        listen = %format_args!("{}:{}", config.listen_host, config.listen_port),
        remote = %format_args!("{}:{}", config.remote_host, config.remote_port),
        "Starting sock-bench"
    );

    // One role, one thread, one operation in flight
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let role = config.role;
    runtime.block_on(async move {
        match role {
            Role::TcpServer => run_tcp_server(config).await,
            Role::TcpClient => run_tcp_client(config).await,
            Role::UdpServer => run_udp_server(config).await,
            Role::UdpClient => run_udp_client(config).await,
        }
    })
}

async fn run_tcp_server(config: Config) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let mut server = Server::new(TokioTransport, MonotonicClock::new(), config);
    if let Err(e) = server.run().await {
        error!(state = ?server.state(), "Server stopped");
        return Err(e.into());
    }
    Ok(ExitCode::SUCCESS)
}

async fn run_tcp_client(config: Config) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let mut client = Client::new(TokioTransport, MonotonicClock::new(), config);
    match client.run().await {
        Ok(last) => {
            info!(last_write = last, state = ?client.state(), "Client finished");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!(error = %e, state = ?client.state(), "Client failed");
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn run_udp_server(config: Config) -> Result<ExitCode, Box<dyn std::error::Error>> {
    echo::run_server(&mut TokioTransport, &config).await?;
    Ok(ExitCode::SUCCESS)
}

async fn run_udp_client(config: Config) -> Result<ExitCode, Box<dyn std::error::Error>> {
    match echo::run_client(&mut TokioTransport, &config).await {
        Ok(echoes) => {
            info!(echoes, "Client finished");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!(error = %e, "Client failed");
            Ok(ExitCode::FAILURE)
        }
    }
}
