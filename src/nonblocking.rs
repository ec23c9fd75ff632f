//! Async facade over the blocking session API
//!
//! Each call runs the blocking operation on tokio's blocking pool, so
//! an async caller never stalls a runtime worker on socket I/O.

use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::protocol::{Reply, Request};
use crate::registry::ClientRegistry;
use crate::session::SessionHandle;

/// Async handle to a [`ClientRegistry`]. Cheap to clone.
#[derive(Clone)]
pub struct AsyncClient {
    registry: Arc<ClientRegistry>,
}

impl AsyncClient {
    pub fn new(registry: Arc<ClientRegistry>) -> Self {
        Self { registry }
    }

    /// Client backed by the process-wide registry
    pub fn global() -> Self {
        Self::new(ClientRegistry::global())
    }

    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&ClientRegistry) -> Result<T> + Send + 'static,
    {
        let registry = self.registry.clone();
        tokio::task::spawn_blocking(move || f(&registry)).await?
    }

    pub async fn create(&self, address: &str) -> Result<SessionHandle> {
        let address = address.to_string();
        self.run(move |registry| registry.create(&address)).await
    }

    pub async fn invoke(
        &self,
        handle: SessionHandle,
        request: Request,
        timeout: Option<Duration>,
    ) -> Result<Reply> {
        self.run(move |registry| registry.invoke(handle, &request, timeout))
            .await
    }

    pub async fn invoke_named(
        &self,
        handle: SessionHandle,
        operation: &str,
        args: &[i64],
    ) -> Result<Reply> {
        let request = Request::from_parts(operation, args)?;
        self.invoke(handle, request, None).await
    }

    pub async fn add(&self, handle: SessionHandle, a: i64, b: i64) -> Result<i64> {
        self.run(move |registry| registry.add(handle, a, b)).await
    }

    pub async fn ping(&self, handle: SessionHandle) -> Result<()> {
        self.run(move |registry| registry.ping(handle)).await
    }

    /// Route a session's pushes to a channel. Does not block.
    pub fn subscribe(
        &self,
        handle: SessionHandle,
        capacity: usize,
    ) -> Result<mpsc::Receiver<Bytes>> {
        self.registry.subscribe(handle, capacity)
    }

    /// Read pushes on a session for up to `timeout`
    pub async fn poll(&self, handle: SessionHandle, timeout: Duration) -> Result<usize> {
        self.run(move |registry| registry.poll(handle, timeout)).await
    }

    /// Close a session. Never fails.
    pub async fn close(&self, handle: SessionHandle) {
        // Shutting the socket down can block briefly on the goodbye frame
        let _ = self
            .run(move |registry| {
                registry.close(handle);
                Ok(())
            })
            .await;
    }
}
