//! Chat routes: streaming relay to the configured LLM providers.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use cmsrelay_chat::registry::RegistryStatus;
use cmsrelay_chat::{RelayRequest, RelayResponse};

use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/chat", post(chat))
        .route("/chat/status", get(get_status))
}

// ---------------------------------------------------------------
// Streaming chat
// ---------------------------------------------------------------

async fn chat(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    // Unreadable bodies are 500s.
    let request = match parse_request(&body) {
        Ok(r) => r,
        Err(e) => {
            error!("Rejecting unreadable chat request: {}", e);
            return ApiError::internal(e.to_string()).into_response();
        }
    };

    match state.relay.handle(request, CancellationToken::new()).await {
        Ok(relay) => stream_response(relay),
        Err(e) => {
            warn!("Chat request rejected: {}", e);
            ApiError::from(e).into_response()
        }
    }
}

fn parse_request(body: &[u8]) -> cmsrelay_core::Result<RelayRequest> {
    let value: serde_json::Value = serde_json::from_slice(body)?;
    if value.is_null() {
        return Ok(RelayRequest::default());
    }
    Ok(serde_json::from_value(value)?)
}

/// Plain UTF-8 body; dropping it (client gone) cancels the vendor call.
fn stream_response(relay: RelayResponse) -> Response {
    let body = Body::from_stream(relay.stream.map(Ok::<_, Infallible>));

    (
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (header::CACHE_CONTROL, "no-transform".to_string()),
            (header::HeaderName::from_static("x-request-id"), relay.request_id.to_string()),
        ],
        body,
    )
        .into_response()
}

// ---------------------------------------------------------------
// Status
// ---------------------------------------------------------------

#[derive(Serialize)]
struct StatusResponse {
    #[serde(flatten)]
    registry: RegistryStatus,
    #[serde(rename = "contentSourceConfigured")]
    content_source_configured: bool,
}

async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        registry: state.relay.registry().status(),
        content_source_configured: state.content_configured,
    })
}
