//! Process configuration, read once at startup.

use serde::{Deserialize, Serialize};
use tracing::info;

pub const DEFAULT_PORT: u16 = 3000;
pub const FALLBACK_PROVIDER: &str = "openai";
pub const DEFAULT_CONTENTSTACK_BASE: &str = "https://cdn.contentstack.io/v3";
pub const DEFAULT_CONTENTSTACK_ENVIRONMENT: &str = "production";

/// Connection settings for the Contentstack delivery API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentstackSettings {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub delivery_token: Option<String>,
    pub environment: String,
}

impl Default for ContentstackSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_CONTENTSTACK_BASE.into(),
            api_key: None,
            delivery_token: None,
            environment: DEFAULT_CONTENTSTACK_ENVIRONMENT.into(),
        }
    }
}

impl ContentstackSettings {
    /// Both credentials are present.
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some() && self.delivery_token.is_some()
    }
}

/// Top-level relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// HTTP server port.
    pub port: u16,
    /// Provider id used when a request does not name one. Not validated here;
    /// an unrecognised value surfaces as "unknown provider" per request.
    pub default_provider: String,
    #[serde(default)]
    pub openai_api_key: Option<String>,
    #[serde(default)]
    pub groq_api_key: Option<String>,
    #[serde(default)]
    pub contentstack: ContentstackSettings,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            default_provider: FALLBACK_PROVIDER.into(),
            openai_api_key: None,
            groq_api_key: None,
            contentstack: ContentstackSettings::default(),
        }
    }
}

impl RelayConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup. Empty values are
    /// treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = get("PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let config = Self {
            port,
            default_provider: get("DEFAULT_PROVIDER").unwrap_or_else(|| FALLBACK_PROVIDER.into()),
            openai_api_key: get("OPENAI_API_KEY"),
            groq_api_key: get("GROQ_API_KEY"),
            contentstack: ContentstackSettings {
                base_url: get("CONTENTSTACK_BASE")
                    .unwrap_or_else(|| DEFAULT_CONTENTSTACK_BASE.into()),
                api_key: get("CONTENTSTACK_API_KEY"),
                delivery_token: get("CONTENTSTACK_DELIVERY_TOKEN"),
                environment: get("CONTENTSTACK_ENVIRONMENT")
                    .unwrap_or_else(|| DEFAULT_CONTENTSTACK_ENVIRONMENT.into()),
            },
        };

        info!(
            port = config.port,
            default_provider = %config.default_provider,
            openai_configured = config.openai_api_key.is_some(),
            groq_configured = config.groq_api_key.is_some(),
            contentstack_configured = config.contentstack.is_configured(),
            "Loaded relay configuration"
        );

        config
    }
}
