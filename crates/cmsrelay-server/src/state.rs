//! Shared application state.

use std::sync::Arc;

use cmsrelay_chat::{ProviderRegistry, Relay};
use cmsrelay_content::{ContentSource, ContentstackClient};
use cmsrelay_core::RelayConfig;

/// Shared application state accessible from all route handlers. Everything
/// in here is built once at startup and read-only afterwards.
pub struct AppState {
    pub config: RelayConfig,
    pub relay: Relay,
    pub content_configured: bool,
}

impl AppState {
    pub fn new(config: RelayConfig) -> Self {
        let client = reqwest::Client::new();

        let registry = ProviderRegistry::from_config(&config, client.clone());
        let content = ContentstackClient::new(client, config.contentstack.clone());
        let content_configured = content.is_configured();

        Self {
            relay: Relay::new(Arc::new(registry), Arc::new(content)),
            content_configured,
            config,
        }
    }

    /// Assemble state from pre-built parts.
    pub fn with_parts(
        config: RelayConfig,
        registry: ProviderRegistry,
        content: Arc<dyn ContentSource>,
    ) -> Self {
        Self {
            content_configured: config.contentstack.is_configured(),
            relay: Relay::new(Arc::new(registry), content),
            config,
        }
    }
}
