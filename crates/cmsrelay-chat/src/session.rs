//! Client-side chat session against a running relay.
//!
//! Keeps the conversation history, re-sends it with every query, and reads
//! the plain-text response stream incrementally. Starting a new turn cancels
//! whatever request the session still had in flight.

use reqwest::Client;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use cmsrelay_core::{Error, Result};

use crate::relay::ERROR_MARKER;
use crate::sse::Utf8Decoder;
use crate::types::{ChatMessage, ContentGrounding, RelayRequest};

/// How a turn ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed(String),
    /// The relay rejected the request, or the stream ended with an in-band
    /// error. `partial` is whatever text arrived before the failure.
    Failed { partial: String, message: String },
}

impl TurnOutcome {
    /// Classify a complete response body. The last `[error] ` marker wins.
    pub fn from_text(text: &str) -> Self {
        match text.rfind(ERROR_MARKER) {
            Some(idx) => TurnOutcome::Failed {
                partial: text[..idx].to_string(),
                message: text[idx + ERROR_MARKER.len()..].to_string(),
            },
            None => TurnOutcome::Completed(text.to_string()),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, TurnOutcome::Failed { .. })
    }
}

/// Text of one in-flight response. Created per turn and dropped with it.
#[derive(Debug, Default)]
pub struct ResponseAccumulator {
    decoder: Utf8Decoder,
    text: String,
}

impl ResponseAccumulator {
    /// Append a read and return the newly decoded fragment.
    pub fn push(&mut self, bytes: &[u8]) -> String {
        let fragment = self.decoder.decode(bytes);
        self.text.push_str(&fragment);
        fragment
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn finish(mut self) -> String {
        let tail = self.decoder.finish();
        self.text.push_str(&tail);
        self.text
    }
}

/// Conversation with a relay at `base_url`.
pub struct ChatSession {
    client: Client,
    endpoint: String,
    provider: Option<String>,
    model: Option<String>,
    history: Vec<ChatMessage>,
    in_flight: Option<CancellationToken>,
}

impl ChatSession {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}/api/chat", base_url.trim_end_matches('/')),
            provider: None,
            model: None,
            history: Vec::new(),
            in_flight: None,
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Token for the current request, for aborting it from elsewhere.
    pub fn cancel_handle(&self) -> Option<CancellationToken> {
        self.in_flight.clone()
    }

    /// Abort any in-flight request and forget the conversation.
    pub fn reset(&mut self) {
        if let Some(token) = self.in_flight.take() {
            token.cancel();
        }
        self.history.clear();
    }

    /// Send one query and stream the reply through `on_fragment`.
    ///
    /// On return the user turn and the assistant reply (possibly ending in an
    /// in-band error) are in the history. A cancelled turn leaves the history
    /// unchanged and returns [`Error::Cancelled`]. An error from `on_fragment`
    /// aborts the request the same way and is returned as is.
    pub async fn send<F>(
        &mut self,
        query: &str,
        grounding: Option<ContentGrounding>,
        mut on_fragment: F,
    ) -> Result<TurnOutcome>
    where
        F: FnMut(&str) -> Result<()>,
    {
        if let Some(previous) = self.in_flight.take() {
            previous.cancel();
        }
        let cancel = CancellationToken::new();
        self.in_flight = Some(cancel.clone());

        let body = RelayRequest {
            provider: self.provider.clone(),
            model: self.model.clone(),
            query: Some(query.to_string()),
            contentstack: grounding,
            history: Some(self.history.clone()),
        };

        debug!("Sending query to {} ({} history messages)", self.endpoint, self.history.len());

        let send = self.client.post(&self.endpoint).json(&body).send();
        let sent = tokio::select! {
            _ = cancel.cancelled() => None,
            res = send => Some(res),
        };
        let response = match sent {
            None => return Err(Error::Cancelled),
            Some(res) => res.map_err(|e| Error::Transport(format!("relay request failed: {}", e)))?,
        };

        if !response.status().is_success() {
            let text = tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                text = response.text() => text.unwrap_or_default(),
            };
            self.record_turn(query, format!("Error: {}", text));
            self.in_flight = None;
            return Ok(TurnOutcome::Failed {
                partial: String::new(),
                message: text,
            });
        }

        let mut bytes = response.bytes_stream();
        let mut accumulator = ResponseAccumulator::default();

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                chunk = bytes.next() => chunk,
            };
            match next {
                Some(Ok(chunk)) => {
                    let fragment = accumulator.push(&chunk);
                    if !fragment.is_empty() {
                        if let Err(e) = on_fragment(&fragment) {
                            cancel.cancel();
                            self.in_flight = None;
                            return Err(e);
                        }
                    }
                }
                Some(Err(e)) => {
                    return Err(Error::Transport(format!("relay stream failed: {}", e)));
                }
                None => break,
            }
        }

        let text = accumulator.finish();
        self.record_turn(query, text.clone());
        self.in_flight = None;
        Ok(TurnOutcome::from_text(&text))
    }

    fn record_turn(&mut self, query: &str, reply: String) {
        self.history.push(ChatMessage::user(query));
        self.history.push(ChatMessage::assistant(reply));
    }
}
