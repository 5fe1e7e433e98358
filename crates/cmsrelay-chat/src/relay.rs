//! Relay orchestrator: validate, ground, assemble the prompt, stream.
//!
//! Once a response stream has been handed out, failures can no longer change
//! the HTTP status. They are written into the stream as one final
//! `[error] <message>` fragment and the stream then ends normally; consumers
//! treat a body ending in that fragment as a failed turn.

use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use cmsrelay_content::ContentSource;
use cmsrelay_core::{Error, Result};

use crate::config::ProviderKind;
use crate::grounding;
use crate::providers::ProviderAdapter;
use crate::registry::ProviderRegistry;
use crate::types::{ChatMessage, CompletionRequest, RelayRequest};

pub const MAX_QUERY_CHARS: usize = 8000;

/// Prefix of the in-band failure fragment.
pub const ERROR_MARKER: &str = "[error] ";

pub const SYSTEM_PROMPT: &str = "You are a domain-aware assistant. Prefer the provided Contentstack \
     context when answering. If the context is insufficient, answer concisely and suggest a \
     clarifying question.";

/// Outgoing UTF-8 fragments, in arrival order.
pub type FragmentStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// A validated, grounded request ready to be sent to an adapter.
pub struct ComposedRelay {
    pub request_id: Uuid,
    pub provider: ProviderKind,
    pub adapter: Arc<dyn ProviderAdapter>,
    pub completion: CompletionRequest,
    pub grounded: bool,
}

/// An open relay: metadata plus the fragment stream.
pub struct RelayResponse {
    pub request_id: Uuid,
    pub provider: ProviderKind,
    pub model: String,
    pub stream: FragmentStream,
}

/// Request handler core. Shared across requests; holds only read-only state.
#[derive(Clone)]
pub struct Relay {
    registry: Arc<ProviderRegistry>,
    content: Arc<dyn ContentSource>,
}

impl Relay {
    pub fn new(registry: Arc<ProviderRegistry>, content: Arc<dyn ContentSource>) -> Self {
        Self { registry, content }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Validate the request, fetch grounding and assemble the message list.
    /// Validation errors come back as [`Error::Validation`].
    pub async fn compose(&self, request: RelayRequest) -> Result<ComposedRelay> {
        let query = validate_query(request.query.as_deref())?.to_string();
        let (provider, adapter) = self.registry.resolve(request.provider.as_deref())?;
        let model = ProviderRegistry::resolve_model(provider, request.model.as_deref());

        let grounding =
            grounding::fetch_grounding(self.content.as_ref(), request.contentstack.as_ref()).await;

        let history = request.history.unwrap_or_default();
        let messages = build_messages(&history, &query, grounding.as_deref());

        Ok(ComposedRelay {
            request_id: Uuid::new_v4(),
            provider,
            adapter,
            completion: CompletionRequest { model, messages },
            grounded: grounding.is_some(),
        })
    }

    /// Compose the request and open its fragment stream.
    pub async fn handle(&self, request: RelayRequest, cancel: CancellationToken) -> Result<RelayResponse> {
        let composed = self.compose(request).await?;

        info!(
            request_id = %composed.request_id,
            provider = %composed.provider,
            model = %composed.completion.model,
            history = composed.completion.messages.len().saturating_sub(2),
            grounded = composed.grounded,
            "Relaying chat request"
        );

        let model = composed.completion.model.clone();
        let stream = relay_stream(
            composed.request_id,
            composed.adapter,
            composed.completion,
            cancel,
        );

        Ok(RelayResponse {
            request_id: composed.request_id,
            provider: composed.provider,
            model,
            stream: Box::pin(stream),
        })
    }
}

/// Query must be present, non-empty and at most [`MAX_QUERY_CHARS`] characters.
pub fn validate_query(query: Option<&str>) -> Result<&str> {
    let query = query
        .filter(|q| !q.is_empty())
        .ok_or_else(|| Error::Validation("query is required".into()))?;
    if query.chars().count() > MAX_QUERY_CHARS {
        return Err(Error::Validation("query too long".into()));
    }
    Ok(query)
}

/// System prompt, then history unchanged, then the user turn. The user turn
/// is the grounding block, a blank line and the query; or just the query.
pub fn build_messages(history: &[ChatMessage], query: &str, grounding: Option<&str>) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(SYSTEM_PROMPT));
    messages.extend(history.iter().cloned());

    let content = match grounding {
        Some(block) => format!("{}\n\n{}", block, query),
        None => query.to_string(),
    };
    messages.push(ChatMessage::user(content));

    messages
}

/// Pipe adapter tokens into fragments. An adapter failure becomes a final
/// `[error] <message>` fragment. Dropping the stream cancels the vendor call.
pub fn relay_stream(
    request_id: Uuid,
    adapter: Arc<dyn ProviderAdapter>,
    completion: CompletionRequest,
    cancel: CancellationToken,
) -> impl Stream<Item = String> + Send + 'static {
    async_stream::stream! {
        let _guard = cancel.clone().drop_guard();
        let mut tokens = adapter.stream(completion, cancel);
        let mut fragments = 0usize;

        while let Some(item) = tokens.next().await {
            match item {
                Ok(token) => {
                    fragments += 1;
                    yield token;
                }
                Err(e) => {
                    warn!(request_id = %request_id, provider = adapter.name(), "Relay failed: {}", e);
                    yield error_fragment(&e);
                    return;
                }
            }
        }

        debug!(request_id = %request_id, "Relay finished after {} fragments", fragments);
    }
}

/// The in-band failure fragment for an error.
pub fn error_fragment(error: &Error) -> String {
    let message = error.to_string();
    if message.is_empty() {
        format!("{}unknown", ERROR_MARKER)
    } else {
        format!("{}{}", ERROR_MARKER, message)
    }
}
