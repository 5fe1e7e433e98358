//! Provider catalogue: ids, endpoints, credentials and default models.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use cmsrelay_core::Error;

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_GROQ_MODEL: &str = "llama-3.3-70b-versatile";

pub const OPENAI_MODELS: &[&str] = &["gpt-4o", "gpt-4o-mini", "gpt-4-turbo", "gpt-3.5-turbo"];
pub const GROQ_MODELS: &[&str] = &[
    "llama-3.3-70b-versatile",
    "llama-3.1-8b-instant",
    "mixtral-8x7b-32768",
    "gemma2-9b-it",
];

pub const OPENAI_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const GROQ_ENDPOINT: &str = "https://api.groq.com/openai/v1/chat/completions";

/// LLM provider identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Groq,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::OpenAi, ProviderKind::Groq];

    /// Wire id used in requests and configuration.
    pub fn id(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Groq => "groq",
        }
    }

    /// Human-facing vendor name, used in error messages.
    pub fn label(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OpenAI",
            ProviderKind::Groq => "Groq",
        }
    }

    pub fn endpoint(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => OPENAI_ENDPOINT,
            ProviderKind::Groq => GROQ_ENDPOINT,
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => DEFAULT_OPENAI_MODEL,
            ProviderKind::Groq => DEFAULT_GROQ_MODEL,
        }
    }

    pub fn models(&self) -> &'static [&'static str] {
        match self {
            ProviderKind::OpenAi => OPENAI_MODELS,
            ProviderKind::Groq => GROQ_MODELS,
        }
    }

    /// Environment variable holding this provider's API key.
    pub fn key_var(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OPENAI_API_KEY",
            ProviderKind::Groq => "GROQ_API_KEY",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "openai" => Ok(ProviderKind::OpenAi),
            "groq" => Ok(ProviderKind::Groq),
            _ => Err(Error::Validation("unknown provider".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_ids() {
        assert_eq!("openai".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAi);
        assert_eq!("groq".parse::<ProviderKind>().unwrap(), ProviderKind::Groq);
    }

    #[test]
    fn test_parse_unknown_id() {
        for id in ["anthropic", "OpenAI", "", "groq "] {
            let err = id.parse::<ProviderKind>().unwrap_err();
            assert_eq!(err.to_string(), "unknown provider");
            assert!(err.is_client_error());
        }
    }

    #[test]
    fn test_id_roundtrips_through_display() {
        for kind in ProviderKind::ALL {
            assert_eq!(kind.to_string().parse::<ProviderKind>().unwrap(), kind);
            assert!(kind.models().contains(&kind.default_model()));
        }
    }
}
