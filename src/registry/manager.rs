//! Client registry
//!
//! Maps handles to sessions and provides fast lookup. The map is sharded,
//! so creating or closing one session never waits on another session's
//! in-flight request.

use bytes::Bytes;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::metrics::METRICS;
use crate::protocol::{Reply, Request};
use crate::session::{Session, SessionHandle, SessionInfo};
use crate::transport::{Address, Transport};

static GLOBAL: OnceCell<Arc<ClientRegistry>> = OnceCell::new();

type SessionMap = DashMap<SessionHandle, Arc<Session>>;

fn detach(sessions: &SessionMap, handle: SessionHandle) -> Option<Arc<Session>> {
    let (_, session) = sessions.remove(&handle)?;
    METRICS.session_closed();
    debug!(session = %handle, "Session unregistered");
    Some(session)
}

/// Process-wide table of live sessions
pub struct ClientRegistry {
    /// Shared with each session's detach hook
    sessions: Arc<SessionMap>,
    /// Handle generator; starts at 1 so 0 stays the invalid sentinel
    next_id: AtomicU64,
    config: ClientConfig,
}

impl ClientRegistry {
    /// Create an empty registry
    pub fn new(config: ClientConfig) -> Arc<Self> {
        Arc::new(Self {
            sessions: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
            config,
        })
    }

    /// Configure the process-wide registry.
    ///
    /// Must run before the first call to [`ClientRegistry::global`]; returns
    /// the config back if the registry already exists.
    pub fn init_global(config: ClientConfig) -> std::result::Result<(), ClientConfig> {
        let mut config = Some(config);
        GLOBAL.get_or_init(|| Self::new(config.take().unwrap_or_default()));
        match config {
            None => Ok(()),
            Some(config) => Err(config),
        }
    }

    /// The process-wide registry, created with default config on first use
    pub fn global() -> Arc<Self> {
        GLOBAL
            .get_or_init(|| Self::new(ClientConfig::default()))
            .clone()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Connect to `address` and register the resulting session.
    ///
    /// On failure nothing is registered and no handle is consumed.
    pub fn create(&self, address: &str) -> Result<SessionHandle> {
        let parsed = Address::parse(address).map_err(|e| {
            METRICS.connect_failed();
            ClientError::connect_failed(address, e)
        })?;

        let transport = Transport::connect(&parsed, &self.config).map_err(|e| {
            METRICS.connect_failed();
            debug!(%address, error = %e, "Connect failed");
            e
        })?;

        Ok(self.register(parsed, transport))
    }

    /// Wrap a connected transport in a session and publish it
    pub fn register(&self, address: Address, transport: Transport) -> SessionHandle {
        let handle = SessionHandle::from_raw(self.next_id.fetch_add(1, Ordering::Relaxed));
        let peer = transport.peer_addr();

        let session = Arc::new(Session::new(handle, address, transport));

        // A session that closes or fails takes itself out of the table,
        // whichever API the caller went through
        let sessions = Arc::downgrade(&self.sessions);
        session.set_detach_hook(move |handle| {
            if let Some(sessions) = sessions.upgrade() {
                detach(&sessions, handle);
            }
        });

        // Connected before it becomes visible to lookups
        session.activate();
        self.sessions.insert(handle, session);

        METRICS.session_opened();
        info!(session = %handle, %peer, "Session registered");

        handle
    }

    /// Find a live session
    pub fn lookup(&self, handle: SessionHandle) -> Result<Arc<Session>> {
        self.sessions
            .get(&handle)
            .map(|entry| entry.value().clone())
            .ok_or(ClientError::InvalidHandle(handle))
    }

    /// Remove a session without closing it. No-op for unknown handles.
    pub fn unregister(&self, handle: SessionHandle) -> Option<Arc<Session>> {
        detach(&self.sessions, handle)
    }

    /// Invoke `request` on a session, using the configured timeout if none
    /// is given. Sessions that fail fatally remove themselves.
    pub fn invoke(
        &self,
        handle: SessionHandle,
        request: &Request,
        timeout: Option<Duration>,
    ) -> Result<Reply> {
        // Clone out of the map so no shard guard is held during I/O
        let session = self.lookup(handle)?;
        let timeout = timeout.unwrap_or_else(|| self.config.request_timeout());
        session.invoke(request, timeout)
    }

    /// Invoke an operation by name with integer arguments
    pub fn invoke_named(
        &self,
        handle: SessionHandle,
        operation: &str,
        args: &[i64],
        timeout: Option<Duration>,
    ) -> Result<Reply> {
        let request = Request::from_parts(operation, args)?;
        self.invoke(handle, &request, timeout)
    }

    /// Remote Add on a session
    pub fn add(&self, handle: SessionHandle, a: i64, b: i64) -> Result<i64> {
        self.invoke(handle, &Request::Add { a, b }, None)
            .map(|reply| reply.as_i64())
    }

    /// Liveness check on a session
    pub fn ping(&self, handle: SessionHandle) -> Result<()> {
        self.invoke(handle, &Request::Ping, None).map(|_| ())
    }

    /// Route a session's pushed messages to a new channel
    pub fn subscribe(
        &self,
        handle: SessionHandle,
        capacity: usize,
    ) -> Result<mpsc::Receiver<Bytes>> {
        Ok(self.lookup(handle)?.subscribe(capacity))
    }

    /// Read pushed messages on a session for up to `timeout`
    pub fn poll(&self, handle: SessionHandle, timeout: Duration) -> Result<usize> {
        self.lookup(handle)?.poll(timeout)
    }

    /// Send a keep-alive on a session
    pub fn keep_alive(&self, handle: SessionHandle) -> Result<()> {
        self.lookup(handle)?.keep_alive(self.config.request_timeout())
    }

    /// Close a session and invalidate its handle. Never fails.
    pub fn close(&self, handle: SessionHandle) {
        // Unregister first so no new caller can find it
        if let Some(session) = self.unregister(handle) {
            session.close();
        }
    }

    /// Close every session (process teardown)
    pub fn close_all(&self) {
        let handles: Vec<SessionHandle> = self.sessions.iter().map(|e| *e.key()).collect();
        if !handles.is_empty() {
            warn!(sessions = handles.len(), "Closing all sessions");
        }
        for handle in handles {
            self.close(handle);
        }
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Snapshot of all live sessions
    pub fn list_sessions(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> =
            self.sessions.iter().map(|entry| entry.value().info()).collect();
        sessions.sort_by_key(|info| info.handle);
        sessions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{TcpListener, TcpStream};

    fn transport_to(listener: &TcpListener) -> (Address, Transport, TcpStream) {
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        let address = Address::parse(&addr.to_string()).unwrap();
        (address, Transport::from_stream(client, 1024).unwrap(), server)
    }

    #[test]
    fn test_registry_lifecycle() {
        let registry = ClientRegistry::new(ClientConfig::default());
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();

        let (address, transport, _server) = transport_to(&listener);
        let first = registry.register(address, transport);
        let (address, transport, _server2) = transport_to(&listener);
        let second = registry.register(address, transport);

        assert_eq!(first.as_u64(), 1);
        assert_eq!(second.as_u64(), 2);
        assert_eq!(registry.len(), 2);
        assert!(registry.lookup(first).unwrap().is_connected());

        registry.close(first);
        assert_eq!(registry.len(), 1);
        assert!(matches!(
            registry.lookup(first),
            Err(ClientError::InvalidHandle(h)) if h == first
        ));

        // Closing or unregistering again is a no-op
        registry.close(first);
        assert!(registry.unregister(first).is_none());

        registry.close_all();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_session_failure_unregisters_itself() {
        let registry = ClientRegistry::new(ClientConfig::default());
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let (address, transport, server) = transport_to(&listener);
        let handle = registry.register(address, transport);
        drop(server);

        // Straight through the session, bypassing ClientRegistry::invoke
        let session = registry.lookup(handle).unwrap();
        let err = session.ping(Duration::from_secs(2)).unwrap_err();
        assert!(err.is_fatal());

        assert!(registry.is_empty());
        assert!(matches!(
            registry.lookup(handle),
            Err(ClientError::InvalidHandle(_))
        ));
        assert!(matches!(
            registry.ping(handle),
            Err(ClientError::InvalidHandle(_))
        ));
    }

    #[test]
    fn test_session_close_unregisters_itself() {
        let registry = ClientRegistry::new(ClientConfig::default());
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let (address, transport, _server) = transport_to(&listener);
        let handle = registry.register(address, transport);

        registry.lookup(handle).unwrap().close();
        assert!(registry.is_empty());
        assert!(registry.unregister(handle).is_none());
    }

    #[test]
    fn test_create_with_bad_address_registers_nothing() {
        let registry = ClientRegistry::new(ClientConfig::default());
        for address in ["", "no-port", "host:notaport"] {
            assert!(matches!(
                registry.create(address),
                Err(ClientError::ConnectFailed { .. })
            ));
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn test_invoke_unknown_handle() {
        let registry = ClientRegistry::new(ClientConfig::default());
        let handle = SessionHandle::from_raw(99);
        assert!(matches!(
            registry.invoke(handle, &Request::Ping, None),
            Err(ClientError::InvalidHandle(_))
        ));
        assert!(matches!(
            registry.invoke_named(handle, "bogus", &[], None),
            Err(ClientError::UnknownOperation(_))
        ));
    }

    #[test]
    fn test_list_sessions_sorted() {
        let registry = ClientRegistry::new(ClientConfig::default());
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut servers = Vec::new();
        for _ in 0..3 {
            let (address, transport, server) = transport_to(&listener);
            registry.register(address, transport);
            servers.push(server);
        }

        let handles: Vec<u64> = registry.list_sessions().iter().map(|s| s.handle).collect();
        assert_eq!(handles, vec![1, 2, 3]);
    }
}
