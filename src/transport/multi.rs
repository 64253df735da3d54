//! Concurrent batch transport.
//!
//! Each job runs as its own tokio task. Completion callbacks fire in
//! completion order, once per key; a failing or slow job never holds up
//! its siblings. An optional ceiling bounds the whole batch: keys still
//! running when it passes complete with `Error::Timeout`.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::request::PhysicalRequest;
use crate::transport::{SocketTransport, Transport};

/// Runs many requests over an inner transport concurrently.
#[derive(Debug)]
pub struct MultiTransport<T = SocketTransport> {
    inner: Arc<T>,
    max_concurrency: Option<usize>,
    ceiling: Option<Duration>,
}

impl<T> Clone for MultiTransport<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            max_concurrency: self.max_concurrency,
            ceiling: self.ceiling,
        }
    }
}

impl Default for MultiTransport<SocketTransport> {
    fn default() -> Self {
        Self::new(SocketTransport::new())
    }
}

impl<T: Transport + 'static> MultiTransport<T> {
    pub fn new(inner: T) -> Self {
        Self::from_arc(Arc::new(inner))
    }

    pub fn from_arc(inner: Arc<T>) -> Self {
        Self {
            inner,
            max_concurrency: None,
            ceiling: None,
        }
    }

    /// Limit how many jobs are in flight at once.
    pub fn max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = Some(limit.max(1));
        self
    }

    /// Overall time limit for a batch.
    pub fn ceiling(mut self, ceiling: Duration) -> Self {
        self.ceiling = Some(ceiling);
        self
    }

    pub fn inner(&self) -> &Arc<T> {
        &self.inner
    }

    /// Send one physical request per key.
    pub async fn send_multiple<K, F>(
        &self,
        requests: impl IntoIterator<Item = (K, PhysicalRequest)>,
        on_complete: F,
    ) -> HashMap<K, Result<Bytes>>
    where
        K: Eq + Hash + Clone + Send + 'static,
        F: FnMut(&K, &Result<Bytes>),
    {
        let jobs = requests.into_iter().map(|(key, request)| {
            let inner = self.inner.clone();
            (key, async move { inner.send(&request).await })
        });
        self.drive(jobs, on_complete).await
    }

    /// Run keyed futures concurrently and collect one outcome per key.
    ///
    /// `on_complete` is invoked exactly once per key, in completion order.
    pub async fn drive<K, R, Fut, F>(
        &self,
        jobs: impl IntoIterator<Item = (K, Fut)>,
        mut on_complete: F,
    ) -> HashMap<K, Result<R>>
    where
        K: Eq + Hash + Clone + Send + 'static,
        R: Send + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
        F: FnMut(&K, &Result<R>),
    {
        let semaphore = self.max_concurrency.map(|n| Arc::new(Semaphore::new(n)));
        let deadline = self.ceiling.map(|ceiling| Instant::now() + ceiling);
        let (tx, mut rx) = mpsc::unbounded_channel::<(K, Result<R>)>();

        let mut pending = HashSet::new();
        let mut handles = Vec::new();
        for (key, job) in jobs {
            if !pending.insert(key.clone()) {
                tracing::warn!("duplicate key in batch; later job ignored");
                continue;
            }
            let tx = tx.clone();
            let semaphore = semaphore.clone();
            handles.push(tokio::spawn(async move {
                let _permit = match semaphore {
                    Some(semaphore) => semaphore.acquire_owned().await.ok(),
                    None => None,
                };
                let _ = tx.send((key, job.await));
            }));
        }
        drop(tx);

        tracing::debug!(jobs = pending.len(), "batch started");

        let mut results = HashMap::with_capacity(pending.len());
        let mut ceiling_hit = false;
        loop {
            let next = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, rx.recv()).await {
                    Ok(next) => next,
                    Err(_) => {
                        ceiling_hit = true;
                        break;
                    }
                },
                None => rx.recv().await,
            };
            let Some((key, result)) = next else {
                break;
            };
            on_complete(&key, &result);
            pending.remove(&key);
            results.insert(key, result);
        }

        for handle in handles {
            handle.abort();
        }

        // Keys without an outcome: ceiling passed, or the task panicked.
        for key in pending {
            let error = match (ceiling_hit, self.ceiling) {
                (true, Some(ceiling)) => Error::Timeout(ceiling),
                _ => Error::connection("request task ended without a result"),
            };
            let result = Err(error);
            on_complete(&key, &result);
            results.insert(key, result);
        }

        tracing::debug!(completed = results.len(), ceiling_hit, "batch finished");
        results
    }
}

impl<T: Transport> Transport for MultiTransport<T> {
    fn send(&self, request: &PhysicalRequest) -> impl Future<Output = Result<Bytes>> + Send {
        self.inner.send(request)
    }
}
