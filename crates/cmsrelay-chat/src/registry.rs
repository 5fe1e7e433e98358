//! Provider registry: maps a provider id to its shared adapter instance.

use std::collections::HashMap;
use std::sync::Arc;

use reqwest::Client;
use serde::Serialize;
use tracing::info;

use cmsrelay_core::{Error, RelayConfig, Result};

use crate::config::ProviderKind;
use crate::providers::{OpenAiCompatAdapter, ProviderAdapter};

/// Adapters built once at startup, plus the default provider id.
pub struct ProviderRegistry {
    adapters: HashMap<ProviderKind, Arc<dyn ProviderAdapter>>,
    default_provider: String,
}

/// Per-provider summary (no keys exposed).
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    pub name: String,
    pub configured: bool,
    #[serde(rename = "defaultModel")]
    pub default_model: String,
    pub models: Vec<String>,
}

/// Registry summary for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStatus {
    #[serde(rename = "defaultProvider")]
    pub default_provider: String,
    #[serde(rename = "defaultModel")]
    pub default_model: Option<String>,
    pub providers: Vec<ProviderStatus>,
}

impl ProviderRegistry {
    /// Empty registry. `default_provider` is used when a request names none.
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            adapters: HashMap::new(),
            default_provider: default_provider.into(),
        }
    }

    /// One OpenAI-compatible adapter per known provider, keys from config.
    pub fn from_config(config: &RelayConfig, client: Client) -> Self {
        let mut registry = Self::new(config.default_provider.clone());
        for kind in ProviderKind::ALL {
            let key = match kind {
                ProviderKind::OpenAi => config.openai_api_key.clone(),
                ProviderKind::Groq => config.groq_api_key.clone(),
            };
            registry.register(Arc::new(OpenAiCompatAdapter::new(kind, client.clone(), key)));
        }

        info!(
            "Provider registry ready: default={}, configured=[{}]",
            registry.default_provider,
            registry
                .configured()
                .map(|k| k.id())
                .collect::<Vec<_>>()
                .join(", ")
        );
        registry
    }

    /// Register (or replace) the adapter for its kind.
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.kind(), adapter);
    }

    pub fn default_provider(&self) -> &str {
        &self.default_provider
    }

    /// Resolve a requested provider id (absent or empty means the default).
    pub fn resolve(&self, requested: Option<&str>) -> Result<(ProviderKind, Arc<dyn ProviderAdapter>)> {
        let id = requested
            .filter(|p| !p.is_empty())
            .unwrap_or(self.default_provider.as_str());
        let kind: ProviderKind = id.parse()?;
        let adapter = self
            .adapters
            .get(&kind)
            .cloned()
            .ok_or_else(|| Error::Validation("unknown provider".into()))?;
        Ok((kind, adapter))
    }

    /// Requested model, or the provider's default when absent or empty.
    pub fn resolve_model(kind: ProviderKind, requested: Option<&str>) -> String {
        requested
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| kind.default_model())
            .to_string()
    }

    fn configured(&self) -> impl Iterator<Item = ProviderKind> + '_ {
        ProviderKind::ALL
            .into_iter()
            .filter(|k| self.adapters.get(k).is_some_and(|a| a.is_configured()))
    }

    pub fn status(&self) -> RegistryStatus {
        let providers = ProviderKind::ALL
            .into_iter()
            .filter_map(|kind| {
                self.adapters.get(&kind).map(|adapter| ProviderStatus {
                    name: kind.id().to_string(),
                    configured: adapter.is_configured(),
                    default_model: kind.default_model().to_string(),
                    models: kind.models().iter().map(|m| m.to_string()).collect(),
                })
            })
            .collect();

        RegistryStatus {
            default_provider: self.default_provider.clone(),
            default_model: self
                .resolve(None)
                .ok()
                .map(|(kind, _)| kind.default_model().to_string()),
            providers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(default: &str) -> ProviderRegistry {
        let config = RelayConfig {
            default_provider: default.into(),
            groq_api_key: Some("gsk-test".into()),
            ..RelayConfig::default()
        };
        ProviderRegistry::from_config(&config, Client::new())
    }

    #[test]
    fn test_resolve_explicit() {
        let reg = registry("openai");
        let (kind, adapter) = reg.resolve(Some("groq")).unwrap();
        assert_eq!(kind, ProviderKind::Groq);
        assert_eq!(adapter.name(), "groq");
        assert!(adapter.is_configured());
    }

    #[test]
    fn test_resolve_default_when_omitted() {
        let reg = registry("groq");
        assert_eq!(reg.resolve(None).unwrap().0, ProviderKind::Groq);
        assert_eq!(reg.resolve(Some("")).unwrap().0, ProviderKind::Groq);
    }

    #[test]
    fn test_resolve_unknown() {
        let reg = registry("openai");
        let err = reg.resolve(Some("mistral")).err().unwrap();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(err.to_string(), "unknown provider");
    }

    #[test]
    fn test_bad_default_surfaces_per_request() {
        let reg = registry("bogus");
        assert!(reg.resolve(None).is_err());
        assert!(reg.resolve(Some("openai")).is_ok());
        assert!(reg.status().default_model.is_none());
    }

    #[test]
    fn test_unregistered_kind_is_unknown() {
        let mut reg = ProviderRegistry::new("openai");
        reg.register(Arc::new(OpenAiCompatAdapter::groq(Client::new(), None)));
        assert!(reg.resolve(None).is_err());
        assert!(reg.resolve(Some("groq")).is_ok());
    }

    #[test]
    fn test_resolve_model() {
        assert_eq!(
            ProviderRegistry::resolve_model(ProviderKind::Groq, None),
            "llama-3.3-70b-versatile"
        );
        assert_eq!(
            ProviderRegistry::resolve_model(ProviderKind::OpenAi, Some("")),
            "gpt-4o-mini"
        );
        assert_eq!(
            ProviderRegistry::resolve_model(ProviderKind::OpenAi, Some("gpt-4o")),
            "gpt-4o"
        );
    }

    #[test]
    fn test_status_masks_keys() {
        let status = registry("openai").status();
        assert_eq!(status.default_provider, "openai");
        assert_eq!(status.default_model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(status.providers.len(), 2);
        assert!(!status.providers[0].configured);
        assert!(status.providers[1].configured);

        let json = serde_json::to_string(&status).unwrap();
        assert!(!json.contains("gsk-test"));
    }
}
