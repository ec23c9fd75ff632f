//! Socket utilities and tuning

use socket2::{Domain, Protocol, SockAddr, Socket, TcpKeepalive, Type};
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};

use crate::config::ClientConfig;

/// Listen backlog for the reference server
pub const LISTEN_BACKLOG: i32 = 1024;

fn domain_for(addr: &SocketAddr) -> Domain {
    if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    }
}

/// Open a blocking TCP connection using the client's timeout and tuning
pub fn connect_tcp(addr: SocketAddr, config: &ClientConfig) -> io::Result<TcpStream> {
    let socket = Socket::new(domain_for(&addr), Type::STREAM, Some(Protocol::TCP))?;

    // Disable Nagle's algorithm: requests are small and latency-bound
    socket.set_nodelay(config.nodelay)?;

    if let Some(idle) = config.keepalive() {
        let keepalive = TcpKeepalive::new()
            .with_time(idle)
            .with_interval(std::time::Duration::from_secs(10));
        socket.set_tcp_keepalive(&keepalive)?;
    }

    socket.connect_timeout(&SockAddr::from(addr), config.connect_timeout())?;

    Ok(socket.into())
}

/// Create a non-blocking listening socket with address reuse
pub fn create_tcp_listener(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = Socket::new(domain_for(&addr), Type::STREAM, Some(Protocol::TCP))?;

    socket.set_reuse_address(true)?;
    socket.set_nodelay(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;

    Ok(socket.into())
}
