//! Single-connection transport.

use std::sync::Arc;

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::hooks::{self, Hooks};
use crate::request::PhysicalRequest;
use crate::transport::connector::Connector;
use crate::transport::h1::H1Connection;
use crate::transport::Transport;

/// Opens a fresh connection for every request and closes it afterwards.
///
/// The request's deadline bounds connect, handshake, write and read.
#[derive(Clone)]
pub struct SocketTransport {
    hooks: Arc<dyn Hooks>,
}

impl std::fmt::Debug for SocketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketTransport").finish_non_exhaustive()
    }
}

impl Default for SocketTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl SocketTransport {
    pub fn new() -> Self {
        Self {
            hooks: hooks::none(),
        }
    }

    /// Receive `on_progress` notifications while bodies are read.
    pub fn with_hooks(hooks: Arc<dyn Hooks>) -> Self {
        Self { hooks }
    }

    async fn send_inner(&self, request: &PhysicalRequest) -> Result<Bytes> {
        let connector = Connector::from_options(&request.options).await?;
        let stream = connector.connect(&request.url).await?;
        let mut connection = H1Connection::new(stream);
        connection.exchange(request, self.hooks.as_ref()).await
    }
}

impl Transport for SocketTransport {
    async fn send(&self, request: &PhysicalRequest) -> Result<Bytes> {
        let Some(deadline) = request.deadline else {
            return self.send_inner(request).await;
        };

        let limit = request.options.timeout.unwrap_or_default();
        tokio::time::timeout_at(deadline, self.send_inner(request))
            .await
            .map_err(|_| {
                tracing::debug!(url = %request.url, "request deadline exceeded");
                Error::Timeout(limit)
            })?
    }
}
