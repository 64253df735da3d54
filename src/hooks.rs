//! Typed observer callbacks.
//!
//! Every method has an empty default, so implementors only override the
//! events they care about.

use std::sync::Arc;

use url::Url;

use crate::response::Response;

pub trait Hooks: Send + Sync {
    /// Body bytes received so far on the current hop.
    fn on_progress(&self, _url: &Url, _received: usize) {}

    /// About to follow a redirect.
    fn on_redirect(&self, _from: &Url, _to: &Url, _status: u16) {}

    /// Final response of a logical request.
    fn on_complete(&self, _response: &Response) {}
}

/// Hooks that ignore every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl Hooks for NoHooks {}

pub(crate) fn none() -> Arc<dyn Hooks> {
    Arc::new(NoHooks)
}
