//! speedtest-server: an HTTP bandwidth test server
//!
//! Serves a small browser UI plus two test endpoints:
//! - `download`: streams synthetic data to the client
//! - `upload`: drains data posted by the client
//!
//! Features:
//! - Hand-rolled HTTP/1.1 subset, one request per connection
//! - Allow-listed test options with per-test deadlines
//! - Dual-stack TCP or Unix socket listener with graceful stop
//! - Configuration via CLI arguments or TOML file

mod assets;
mod bandwidth;
mod config;
mod handler;
mod http;
mod server;
mod socket;
mod ui;

use clap::{CommandFactory, Parser};
use config::{CliArgs, Command, Config, Listen, StartArgs};
use handler::Handler;
use server::Server;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    let cli = CliArgs::parse();

    let result = match cli.command {
        None => run(StartArgs::default()).await,
        Some(Command::Start(args)) => run(args).await,
        Some(Command::Version) => {
            println!("Version: {}", VERSION);
            Ok(())
        }
        Some(Command::Help) => CliArgs::command().print_help().map_err(Into::into),
    };

    if let Err(e) = result {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

async fn run(args: StartArgs) -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load(args)?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        listen = %config.listen,
        max_header_size = config.limits.max_header_size,
        max_upload_mb = config.limits.max_upload_size / 1024 / 1024,
        header_timeout = config.limits.header_timeout.as_secs(),
        version = VERSION,
        "Starting speedtest-server"
    );

    let handler = Arc::new(Handler::new(config.limits.clone(), ui::transform(VERSION)));
    let mut server = Server::new(config.listen.clone());
    server.start(handler).await?;

    match (&config.listen, server.local_addr()) {
        (Listen::Tcp { .. }, Some(addr)) => println!("Started: http://{}", addr),
        (listen, _) => println!("Started: http://{}", listen),
    }

    let stop = server.stop_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, stopping");
                stop.stop();
            }
            Err(e) => warn!(error = %e, "Failed to listen for interrupt"),
        }
    });

    server.wait().await;
    Ok(())
}
