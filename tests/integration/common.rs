//! Shared test fixtures

use std::net::SocketAddr;
use std::sync::mpsc;
use std::thread;

use zbc_client::config::ServerConfig;
use zbc_client::Server;

/// Start a reference server on an ephemeral port in a background runtime.
///
/// The server lives until the test process exits.
pub fn start_server(response_delay_ms: u64) -> SocketAddr {
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async move {
            let config = ServerConfig {
                bind_addr: "127.0.0.1:0".parse().unwrap(),
                response_delay_ms,
                ..ServerConfig::default()
            };
            let server = Server::bind(config).await.unwrap();
            tx.send(server.local_addr().unwrap()).unwrap();
            server.run().await.unwrap();
        });
    });

    rx.recv().unwrap()
}

/// An address with nothing listening on it
pub fn refused_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}
