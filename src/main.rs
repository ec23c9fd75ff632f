//! zbc - Entry Point
//!
//! Runs the reference server or drives a client session from the shell.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

use zbc_client::{boundary, retry, ClientRegistry, Config, Server, VERSION};

/// zbc - framed request/response client sessions
#[derive(Parser)]
#[command(name = "zbc")]
#[command(version = VERSION)]
#[command(about = "Handle-based TCP client sessions with a reference server")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the reference server
    Serve {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Remote Add through a fresh session
    Add {
        /// Server address as host:port
        address: String,
        #[arg(allow_negative_numbers = true)]
        a: i64,
        #[arg(allow_negative_numbers = true)]
        b: i64,
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Request timeout, overriding the config
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Connect, ping and print the session as JSON
    Ping {
        /// Server address as host:port
        address: String,
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Retry connect with backoff while the server comes up
        #[arg(long)]
        retry: bool,
    },
    /// Local saturating add, no connection needed
    Sum {
        #[arg(allow_negative_numbers = true)]
        a: i64,
        #[arg(allow_negative_numbers = true)]
        b: i64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config } => serve(config),
        Commands::Add {
            address,
            a,
            b,
            config,
            timeout_ms,
        } => remote_add(&address, a, b, config, timeout_ms),
        Commands::Ping {
            address,
            config,
            retry,
        } => ping(&address, config, retry),
        Commands::Sum { a, b } => {
            println!("{}", boundary::add(a, b));
            Ok(())
        }
    }
}

fn load_config(path: Option<PathBuf>) -> Result<Config> {
    let config = Config::load_or_default(path.as_deref())
        .with_context(|| format!("Failed to load config from {:?}", path))?;
    zbc_client::util::init_tracing(&config.logging)?;
    Ok(config)
}

fn serve(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path.clone())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.server.effective_workers())
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    runtime.block_on(run_server(config, config_path))
}

async fn run_server(config: Config, config_path: Option<PathBuf>) -> Result<()> {
    info!(
        version = VERSION,
        config_path = ?config_path,
        "Starting zbc server"
    );

    if config.metrics.enabled {
        zbc_client::metrics::init_metrics(&config.metrics)?;
    }

    let server = Server::bind(config.server.clone()).await?;

    info!(
        bind_addr = %server.local_addr()?,
        workers = config.server.effective_workers(),
        "Server listening"
    );

    // Run server with graceful shutdown
    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!(error = %e, "Server error");
                return Err(e);
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received, closing connections...");
            server.shutdown();
        }
    }

    info!("Server stopped");
    Ok(())
}

fn remote_add(
    address: &str,
    a: i64,
    b: i64,
    config_path: Option<PathBuf>,
    timeout_ms: Option<u64>,
) -> Result<()> {
    let config = load_config(config_path)?;
    let registry = ClientRegistry::new(config.client);

    let handle = registry.create(address)?;
    let result = registry.invoke(
        handle,
        &zbc_client::protocol::Request::Add { a, b },
        timeout_ms.map(Duration::from_millis),
    );
    registry.close(handle);

    println!("{}", result?.as_i64());
    Ok(())
}

fn ping(address: &str, config_path: Option<PathBuf>, with_retry: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let registry = ClientRegistry::new(config.client.clone());

    let handle = if with_retry {
        retry::retry(&config.retry, || registry.create(address))?
    } else {
        registry.create(address)?
    };

    let result = registry.lookup(handle).and_then(|session| {
        let rtt = session.ping(registry.config().request_timeout())?;
        Ok((rtt, session.info()))
    });
    registry.close(handle);

    let (rtt, info) = result?;
    info!(session = %handle, rtt_us = rtt.as_micros() as u64, "Pong");
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
