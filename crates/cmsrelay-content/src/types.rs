//! Content entry type and the source capability.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use cmsrelay_core::Result;

/// One entry returned by the content source. Only `title` and `description`
/// are consumed; everything else is carried along untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentEntry {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ContentEntry {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            description: Some(description.into()),
            extra: serde_json::Map::new(),
        }
    }
}

/// Delivery response envelope: `{ "entries": [...] }`.
#[derive(Debug, Deserialize)]
pub(crate) struct EntriesResponse {
    #[serde(default)]
    pub entries: Vec<ContentEntry>,
}

/// Anything that can list entries of a content type for a locale.
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn get_entries(&self, content_type: &str, locale: &str) -> Result<Vec<ContentEntry>>;
}
