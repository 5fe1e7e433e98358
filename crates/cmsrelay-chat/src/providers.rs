//! Provider adapters.
//!
//! An adapter turns a [`CompletionRequest`] into a lazy stream of text
//! tokens. OpenAI and Groq speak the same chat-completions dialect, so one
//! [`OpenAiCompatAdapter`] serves both, parameterised by [`ProviderKind`].

use std::pin::Pin;

use futures::Stream;
use reqwest::Client;
use serde_json::json;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use cmsrelay_core::{Error, Result};

use crate::config::ProviderKind;
use crate::sse::{self, LineEvent, Utf8Decoder};
use crate::types::CompletionRequest;

/// Token stream returned by an adapter. Yields `Ok(token)` in arrival order;
/// a failure is yielded once as `Err` and ends the stream. Ending without an
/// error means the completion finished normally.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Uniform "stream a chat completion" capability.
///
/// Implementations hold no per-call mutable state; one instance is shared
/// across all requests.
pub trait ProviderAdapter: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn name(&self) -> &'static str {
        self.kind().id()
    }

    /// Whether a credential is present. Requests can still be issued without
    /// one; they fail in-band with a configuration error.
    fn is_configured(&self) -> bool;

    /// Start streaming a completion. Nothing happens until the stream is
    /// polled; dropping it aborts the vendor connection.
    fn stream(&self, request: CompletionRequest, cancel: CancellationToken) -> TokenStream;
}

/// Drive an adapter to completion, calling `on_token` for every token before
/// the next read is issued.
pub async fn stream_completion<F>(
    adapter: &dyn ProviderAdapter,
    request: CompletionRequest,
    cancel: CancellationToken,
    mut on_token: F,
) -> Result<()>
where
    F: FnMut(&str),
{
    let mut stream = adapter.stream(request, cancel);
    while let Some(item) = stream.next().await {
        on_token(&item?);
    }
    Ok(())
}

/// Adapter for OpenAI-compatible `/chat/completions` endpoints.
#[derive(Debug, Clone)]
pub struct OpenAiCompatAdapter {
    kind: ProviderKind,
    client: Client,
    api_key: Option<String>,
    endpoint: String,
}

impl OpenAiCompatAdapter {
    pub fn new(kind: ProviderKind, client: Client, api_key: Option<String>) -> Self {
        Self {
            kind,
            client,
            api_key: api_key.filter(|k| !k.is_empty()),
            endpoint: kind.endpoint().to_string(),
        }
    }

    pub fn openai(client: Client, api_key: Option<String>) -> Self {
        Self::new(ProviderKind::OpenAi, client, api_key)
    }

    pub fn groq(client: Client, api_key: Option<String>) -> Self {
        Self::new(ProviderKind::Groq, client, api_key)
    }

    /// Point the adapter at a different compatible endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl ProviderAdapter for OpenAiCompatAdapter {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn stream(&self, request: CompletionRequest, cancel: CancellationToken) -> TokenStream {
        Box::pin(stream_openai_compat(
            self.client.clone(),
            self.kind,
            self.endpoint.clone(),
            self.api_key.clone(),
            request,
            cancel,
        ))
    }
}

fn stream_openai_compat(
    client: Client,
    kind: ProviderKind,
    url: String,
    api_key: Option<String>,
    request: CompletionRequest,
    cancel: CancellationToken,
) -> impl Stream<Item = Result<String>> + Send + 'static {
    async_stream::stream! {
        let api_key = match api_key {
            Some(k) => k,
            None => {
                yield Err(Error::Config(format!("{} not set on server", kind.key_var())));
                return;
            }
        };

        let body = json!({
            "model": request.model,
            "messages": request.messages,
            "stream": true,
        });

        debug!("Streaming from {} with model {}", url, request.model);

        let send = client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send();

        let sent = tokio::select! {
            _ = cancel.cancelled() => None,
            res = send => Some(res),
        };

        let response = match sent {
            None => {
                yield Err(Error::Cancelled);
                return;
            }
            Some(Err(e)) => {
                yield Err(Error::Transport(format!("{} request failed: {}", kind.label(), e)));
                return;
            }
            Some(Ok(r)) => r,
        };

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let read = tokio::select! {
                _ = cancel.cancelled() => None,
                text = response.text() => Some(text.unwrap_or_default()),
            };
            let body = match read {
                Some(body) => body,
                None => {
                    yield Err(Error::Cancelled);
                    return;
                }
            };
            yield Err(Error::Vendor {
                provider: kind.label().to_string(),
                status,
                body,
            });
            return;
        }

        let mut bytes = response.bytes_stream();
        let mut decoder = Utf8Decoder::new();
        let mut token_count = 0usize;

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => None,
                chunk = bytes.next() => Some(chunk),
            };

            let chunk = match next {
                None => {
                    yield Err(Error::Cancelled);
                    return;
                }
                Some(None) => break,
                Some(Some(Err(e))) => {
                    yield Err(Error::Transport(format!("{} stream read failed: {}", kind.label(), e)));
                    return;
                }
                Some(Some(Ok(b))) => b,
            };

            let text = decoder.decode(&chunk);
            for event in sse::parse_chunk(&text) {
                match event {
                    LineEvent::Token(token) => {
                        token_count += 1;
                        yield Ok(token);
                    }
                    LineEvent::Done => {
                        debug!("{} stream done after {} tokens", kind.label(), token_count);
                        return;
                    }
                    LineEvent::Skip => {}
                }
            }
        }

        debug!("{} stream closed without sentinel after {} tokens", kind.label(), token_count);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::types::ChatMessage;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "llama-3.3-70b-versatile".into(),
            messages: vec![ChatMessage::system("be brief"), ChatMessage::user("hi")],
        }
    }

    fn sse_body(lines: &[&str]) -> String {
        lines.iter().map(|l| format!("{}\n\n", l)).collect()
    }

    async fn collect(adapter: &OpenAiCompatAdapter) -> (Vec<String>, Result<()>) {
        let mut tokens = Vec::new();
        let res = stream_completion(adapter, request(), CancellationToken::new(), |t| {
            tokens.push(t.to_string())
        })
        .await;
        (tokens, res)
    }

    #[tokio::test]
    async fn test_streams_tokens_in_order() {
        let server = MockServer::start().await;

        let body = sse_body(&[
            r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#,
            r#"data: {"choices":[{"delta":{"content":"lo"}}]}"#,
            "data: [DONE]",
        ]);

        Mock::given(method("POST"))
            .and(path("/openai/v1/chat/completions"))
            .and(header("Authorization", "Bearer gsk-test"))
            .and(body_json(json!({
                "model": "llama-3.3-70b-versatile",
                "messages": [
                    { "role": "system", "content": "be brief" },
                    { "role": "user", "content": "hi" }
                ],
                "stream": true
            })))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = OpenAiCompatAdapter::groq(Client::new(), Some("gsk-test".into()))
            .with_endpoint(format!("{}/openai/v1/chat/completions", server.uri()));

        let (tokens, res) = collect(&adapter).await;
        assert!(res.is_ok());
        assert_eq!(tokens, vec!["Hel", "lo"]);
        assert_eq!(tokens.concat(), "Hello");
    }

    #[tokio::test]
    async fn test_stops_at_sentinel() {
        let server = MockServer::start().await;

        let body = sse_body(&[
            r#"data: {"choices":[{"delta":{"content":"a"}}]}"#,
            "[DONE]",
            r#"data: {"choices":[{"delta":{"content":"never"}}]}"#,
        ]);

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let adapter = OpenAiCompatAdapter::openai(Client::new(), Some("sk-test".into()))
            .with_endpoint(server.uri());

        let (tokens, res) = collect(&adapter).await;
        assert!(res.is_ok());
        assert_eq!(tokens, vec!["a"]);
    }

    #[tokio::test]
    async fn test_malformed_record_is_skipped() {
        let server = MockServer::start().await;

        let body = sse_body(&[
            r#"data: {"choices":[{"delta":{"content":"one"}}]}"#,
            r#"data: {"choices":[{"delta":{"cont"#,
            r#"data: {"choices":[{"delta":{"content":" two"}}]}"#,
            "data: [DONE]",
        ]);

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let adapter = OpenAiCompatAdapter::openai(Client::new(), Some("sk-test".into()))
            .with_endpoint(server.uri());

        let (tokens, res) = collect(&adapter).await;
        assert!(res.is_ok());
        assert_eq!(tokens, vec!["one", " two"]);
    }

    #[tokio::test]
    async fn test_end_of_body_without_sentinel_is_success() {
        let server = MockServer::start().await;

        let body = sse_body(&[r#"data: {"choices":[{"delta":{"content":"partial"}}]}"#]);

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let adapter = OpenAiCompatAdapter::openai(Client::new(), Some("sk-test".into()))
            .with_endpoint(server.uri());

        let (tokens, res) = collect(&adapter).await;
        assert!(res.is_ok());
        assert_eq!(tokens, vec!["partial"]);
    }

    #[tokio::test]
    async fn test_vendor_error_carries_status_and_body() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let adapter = OpenAiCompatAdapter::groq(Client::new(), Some("gsk-test".into()))
            .with_endpoint(server.uri());

        let (tokens, res) = collect(&adapter).await;
        assert!(tokens.is_empty());
        let err = res.unwrap_err();
        assert!(matches!(err, Error::Vendor { status: 429, .. }));
        assert_eq!(err.to_string(), "Groq error: 429 rate limited");
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_network() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let adapter =
            OpenAiCompatAdapter::openai(Client::new(), Some(String::new())).with_endpoint(server.uri());
        assert!(!adapter.is_configured());

        let (tokens, res) = collect(&adapter).await;
        assert!(tokens.is_empty());
        let err = res.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(err.to_string(), "OPENAI_API_KEY not set on server");
    }

    #[tokio::test]
    async fn test_transport_error() {
        // Nothing listens on port 9 of localhost.
        let adapter = OpenAiCompatAdapter::openai(Client::new(), Some("sk-test".into()))
            .with_endpoint("http://127.0.0.1:9/v1/chat/completions");

        let (_, res) = collect(&adapter).await;
        let err = res.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert!(err.to_string().starts_with("OpenAI request failed"));
    }

    #[tokio::test]
    async fn test_cancellation_is_a_failure() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("data: [DONE]\n\n", "text/event-stream")
                    .set_delay(Duration::from_secs(10)),
            )
            .mount(&server)
            .await;

        let adapter = OpenAiCompatAdapter::openai(Client::new(), Some("sk-test".into()))
            .with_endpoint(server.uri());

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let res = tokio::time::timeout(
            Duration::from_secs(5),
            stream_completion(&adapter, request(), cancel, |_| {}),
        )
        .await
        .expect("cancellation should end the call promptly");

        assert!(matches!(res, Err(Error::Cancelled)));
    }

    /// Accept one connection, write `head`, then hold the socket open.
    async fn stalling_server(head: String) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let _ = socket.read(&mut buf).await;
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });
        format!("http://{}/v1/chat/completions", addr)
    }

    #[tokio::test]
    async fn test_cancel_while_reading_error_body() {
        let url = stalling_server(
            "HTTP/1.1 503 Service Unavailable\r\n\
             content-type: text/plain\r\n\
             content-length: 20\r\n\r\nslow"
                .to_string(),
        )
        .await;
        let adapter =
            OpenAiCompatAdapter::openai(Client::new(), Some("sk-test".into())).with_endpoint(url);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let res = tokio::time::timeout(
            Duration::from_secs(5),
            stream_completion(&adapter, request(), cancel, |_| {}),
        )
        .await
        .expect("cancellation should end the call promptly");

        assert!(matches!(res, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancel_after_first_token() {
        let record = "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\n";
        let url = stalling_server(format!(
            "HTTP/1.1 200 OK\r\n\
             content-type: text/event-stream\r\n\
             transfer-encoding: chunked\r\n\r\n\
             {:x}\r\n{}\r\n",
            record.len(),
            record
        ))
        .await;
        let adapter =
            OpenAiCompatAdapter::openai(Client::new(), Some("sk-test".into())).with_endpoint(url);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let mut tokens = Vec::new();

        let res = tokio::time::timeout(
            Duration::from_secs(5),
            stream_completion(&adapter, request(), cancel, |t| {
                tokens.push(t.to_string());
                trigger.cancel();
            }),
        )
        .await
        .expect("cancellation should end the call promptly");

        assert_eq!(tokens, vec!["a"]);
        assert!(matches!(res, Err(Error::Cancelled)));
    }

    #[test]
    fn test_default_endpoints() {
        let openai = OpenAiCompatAdapter::openai(Client::new(), None);
        let groq = OpenAiCompatAdapter::groq(Client::new(), None);
        assert_eq!(openai.endpoint(), "https://api.openai.com/v1/chat/completions");
        assert_eq!(groq.endpoint(), "https://api.groq.com/openai/v1/chat/completions");
        assert_eq!(groq.name(), "groq");
    }
}
