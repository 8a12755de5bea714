//! Plugin chain composed around the transport.
//!
//! Every cross-cutting behaviour (content negotiation, authentication,
//! caching, logging) is a [`Plugin`] registered under a unique priority.
//! The highest priority is the outermost wrapper: it sees the request first
//! and the response last.

use crate::{ApiClientError, Request, Response, Result, Transport};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Priorities of the built-in plugins.
pub mod priority {
    /// Content-type negotiation.
    pub const CONTENT_TYPE: i32 = 40;
    /// Content-length computation.
    pub const CONTENT_LENGTH: i32 = 32;
    /// Authentication.
    pub const AUTHENTICATION: i32 = 24;
    /// Response caching.
    pub const CACHE: i32 = 16;
    /// Request/response logging.
    pub const LOGGER: i32 = 8;
}

/// A request-processing step wrapped around the transport.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Process the request and call the rest of the chain through `next`,
    /// or answer without calling it.
    async fn handle(&self, request: Request, next: Next<'_>) -> Result<Response>;

    /// Short name used in diagnostics.
    fn name(&self) -> &'static str {
        "custom"
    }
}

/// The remainder of a plugin chain.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    plugins: &'a [Arc<dyn Plugin>],
    transport: &'a dyn Transport,
}

impl<'a> Next<'a> {
    /// Continue with the next plugin, or the transport at the end of the chain.
    pub async fn run(self, request: Request) -> Result<Response> {
        match self.plugins.split_first() {
            Some((plugin, rest)) => {
                tracing::trace!(plugin = plugin.name(), "Entering plugin");
                let next = Next {
                    plugins: rest,
                    transport: self.transport,
                };
                plugin.handle(request, next).await
            }
            None => self.transport.send(request).await,
        }
    }
}

/// Priority-keyed plugin registry.
///
/// Priorities are unique: registering a second plugin under a taken priority
/// fails with [`ApiClientError::PluginConflict`].
#[derive(Clone, Default)]
pub struct PluginChain {
    plugins: BTreeMap<i32, Arc<dyn Plugin>>,
}

impl PluginChain {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin under the given priority.
    pub fn add<P: Plugin + 'static>(&mut self, plugin: P, priority: i32) -> Result<&mut Self> {
        self.add_shared(Arc::new(plugin), priority)
    }

    /// Register a shared plugin under the given priority.
    pub fn add_shared(&mut self, plugin: Arc<dyn Plugin>, priority: i32) -> Result<&mut Self> {
        if self.plugins.contains_key(&priority) {
            return Err(ApiClientError::PluginConflict { priority });
        }
        self.plugins.insert(priority, plugin);
        Ok(self)
    }

    /// Remove the plugin registered under the given priority.
    pub fn remove(&mut self, priority: i32) -> Option<Arc<dyn Plugin>> {
        self.plugins.remove(&priority)
    }

    /// Check whether a priority is taken.
    pub fn contains(&self, priority: i32) -> bool {
        self.plugins.contains_key(&priority)
    }

    /// Number of registered plugins.
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Check whether the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Registered priorities, outermost first.
    pub fn priorities(&self) -> Vec<i32> {
        self.plugins.keys().rev().copied().collect()
    }

    /// Plugin names, outermost first.
    pub fn names(&self) -> Vec<&'static str> {
        self.plugins.values().rev().map(|p| p.name()).collect()
    }

    /// Compose the chain around a transport.
    pub fn into_client(self, transport: Arc<dyn Transport>) -> PluginClient {
        PluginClient {
            plugins: self.plugins.into_values().rev().collect(),
            transport,
        }
    }
}

impl fmt::Debug for PluginChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.plugins.iter().rev().map(|(k, v)| (k, v.name())))
            .finish()
    }
}

/// A transport wrapped by an ordered plugin chain.
pub struct PluginClient {
    plugins: Vec<Arc<dyn Plugin>>,
    transport: Arc<dyn Transport>,
}

#[async_trait]
impl Transport for PluginClient {
    async fn send(&self, request: Request) -> Result<Response> {
        let next = Next {
            plugins: &self.plugins,
            transport: self.transport.as_ref(),
        };
        next.run(request).await
    }
}
