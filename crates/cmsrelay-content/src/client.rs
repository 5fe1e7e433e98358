//! Contentstack delivery API client.

use async_trait::async_trait;
use reqwest::{Client, Url};
use tracing::debug;

use cmsrelay_core::{ContentstackSettings, Error, Result};

use crate::types::{ContentEntry, ContentSource, EntriesResponse};

/// Read-only client for `GET <base>/content_types/<type>/entries`.
#[derive(Debug, Clone)]
pub struct ContentstackClient {
    client: Client,
    settings: ContentstackSettings,
}

impl ContentstackClient {
    pub fn new(client: Client, settings: ContentstackSettings) -> Self {
        Self { client, settings }
    }

    pub fn is_configured(&self) -> bool {
        self.settings.is_configured()
    }

    /// `<base>/content_types/<type>/entries`, with the type escaped as a
    /// single path segment.
    fn entries_url(&self, content_type: &str) -> Result<Url> {
        let invalid = || Error::Config(format!("invalid Contentstack base URL: {}", self.settings.base_url));
        let mut url = Url::parse(&self.settings.base_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .extend(["content_types", content_type, "entries"]);
        Ok(url)
    }
}

#[async_trait]
impl ContentSource for ContentstackClient {
    async fn get_entries(&self, content_type: &str, locale: &str) -> Result<Vec<ContentEntry>> {
        let (api_key, token) = match (&self.settings.api_key, &self.settings.delivery_token) {
            (Some(k), Some(t)) => (k, t),
            _ => {
                return Err(Error::Config(
                    "Missing Contentstack API key or Delivery token".into(),
                ))
            }
        };

        let url = self.entries_url(content_type)?;
        debug!("Fetching entries from {} (locale {})", url, locale);

        let response = self
            .client
            .get(url)
            .header("api_key", api_key)
            .header("access_token", token)
            .query(&[
                ("environment", self.settings.environment.as_str()),
                ("locale", locale),
            ])
            .send()
            .await
            .map_err(|e| Error::ContentSource(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ContentSource(format!("{} {}", status, body)));
        }

        let envelope: EntriesResponse = response
            .json()
            .await
            .map_err(|e| Error::ContentSource(format!("invalid response: {}", e)))?;

        debug!("Fetched {} entries for {}", envelope.entries.len(), content_type);
        Ok(envelope.entries)
    }
}
