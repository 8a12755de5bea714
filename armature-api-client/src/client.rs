//! Transport and caller-supplied plugins.

use crate::plugin::{Plugin, PluginChain};
use crate::{ReqwestTransport, Result, Transport, TransportConfig};
use std::fmt;
use std::sync::Arc;

/// Holds the base transport and any plugins registered by the caller.
///
/// The built-in plugins are added per request on top of these, so custom
/// plugins must not use the built-in priorities (see
/// [`priority`](crate::priority)).
#[derive(Clone)]
pub struct ClientBuilder {
    transport: Arc<dyn Transport>,
    plugins: PluginChain,
}

impl ClientBuilder {
    /// Create a builder around a transport.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            plugins: PluginChain::new(),
        }
    }

    /// Create a builder with a reqwest transport built from `config`.
    pub fn with_config(config: &TransportConfig) -> Result<Self> {
        Ok(Self::new(Arc::new(ReqwestTransport::new(config)?)))
    }

    /// Get the base transport.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Replace the base transport.
    pub fn set_transport(&mut self, transport: Arc<dyn Transport>) -> &mut Self {
        self.transport = transport;
        self
    }

    /// Register a custom plugin.
    pub fn add_plugin<P: Plugin + 'static>(&mut self, plugin: P, priority: i32) -> Result<&mut Self> {
        self.plugins.add(plugin, priority)?;
        Ok(self)
    }

    /// Get the custom plugins.
    pub fn plugins(&self) -> &PluginChain {
        &self.plugins
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new(Arc::new(ReqwestTransport::default()))
    }
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("plugins", &self.plugins)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::Next;
    use crate::{ApiClientError, Request, Response};
    use async_trait::async_trait;

    struct Passthrough;

    #[async_trait]
    impl Plugin for Passthrough {
        async fn handle(&self, request: Request, next: Next<'_>) -> crate::Result<Response> {
            next.run(request).await
        }
    }

    #[test]
    fn test_add_plugin() {
        let mut builder = ClientBuilder::default();
        assert!(builder.plugins().is_empty());

        builder.add_plugin(Passthrough, 100).unwrap();
        builder.add_plugin(Passthrough, 50).unwrap();
        assert_eq!(builder.plugins().priorities(), vec![100, 50]);

        let err = builder.add_plugin(Passthrough, 50).unwrap_err();
        assert!(matches!(err, ApiClientError::PluginConflict { priority: 50 }));
    }

    #[test]
    fn test_debug_lists_plugins() {
        let mut builder = ClientBuilder::default();
        builder.add_plugin(Passthrough, 7).unwrap();
        assert_eq!(
            format!("{:?}", builder),
            "ClientBuilder { plugins: {7: \"custom\"}, .. }"
        );
    }

    #[test]
    fn test_with_config() {
        let builder = ClientBuilder::with_config(&TransportConfig::default()).unwrap();
        assert!(builder.plugins().is_empty());
    }
}
