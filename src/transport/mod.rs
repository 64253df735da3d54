//! Transports: how a physical request becomes raw response bytes.
//!
//! - `SocketTransport`: one TCP (or TLS) connection per request
//! - `MultiTransport`: runs many requests concurrently with per-key results

use std::future::Future;

use bytes::Bytes;

use crate::error::Result;
use crate::request::PhysicalRequest;

pub mod connector;
pub mod h1;
pub mod multi;
pub mod socket;

pub use multi::MultiTransport;
pub use socket::SocketTransport;

/// Sends one physical request and returns the raw bytes of the exchange.
///
/// Implementations honour `request.deadline`, `max_bytes`, `filename` and
/// the TLS settings in `request.options`. Any I/O failure is an error,
/// never a partial response.
pub trait Transport: Send + Sync {
    fn send(&self, request: &PhysicalRequest) -> impl Future<Output = Result<Bytes>> + Send;
}

impl<T: Transport> Transport for std::sync::Arc<T> {
    fn send(&self, request: &PhysicalRequest) -> impl Future<Output = Result<Bytes>> + Send {
        (**self).send(request)
    }
}
