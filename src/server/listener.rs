//! TCP server listener
//!
//! Accept loop for the reference request/response server.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::handler::ConnectionHandler;
use crate::config::ServerConfig;

/// Reference server answering `Add` and `Ping`
pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
    shutdown_rx: watch::Receiver<bool>,
    shutdown_tx: watch::Sender<bool>,
}

impl Server {
    /// Bind the listening socket. Must be called within a tokio runtime.
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let socket = crate::util::create_tcp_listener(config.bind_addr)
            .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
        let listener = TcpListener::from_std(socket)?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            listener,
            config,
            shutdown_rx,
            shutdown_tx,
        })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the accept loop until [`Server::shutdown`] is called
    pub async fn run(&self) -> Result<()> {
        info!(
            bind_addr = %self.local_addr()?,
            response_delay_ms = self.config.response_delay_ms,
            "Server accepting connections"
        );

        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            if let Err(e) = stream.set_nodelay(true) {
                                debug!(%peer, error = %e, "Failed to set TCP_NODELAY");
                            }

                            let handler = ConnectionHandler::new(
                                self.config.response_delay(),
                                self.config.max_frame_len,
                            );
                            let shutdown = self.shutdown_rx.clone();

                            tokio::spawn(async move {
                                if let Err(e) = handler.handle(stream, peer, shutdown).await {
                                    debug!(error = %e, "Connection error");
                                }
                            });
                        }
                        Err(e) => {
                            warn!(error = %e, "Accept failed");
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received");
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    /// Stop accepting and close every open connection
    pub fn shutdown(&self) {
        info!("Initiating shutdown");
        let _ = self.shutdown_tx.send(true);
    }
}
