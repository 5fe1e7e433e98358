//! Streaming chat relay with pluggable LLM providers (OpenAI/Groq).
//!
//! A request is validated, optionally grounded with content entries, turned
//! into a message list and forwarded to a provider adapter. Tokens flow back
//! as a plain UTF-8 byte stream; failures after the stream has opened are
//! written in-band as a final `[error] <message>` fragment.

pub mod config;
pub mod grounding;
pub mod providers;
pub mod registry;
pub mod relay;
pub mod session;
pub mod sse;
pub mod types;

pub use config::ProviderKind;
pub use providers::{OpenAiCompatAdapter, ProviderAdapter, TokenStream};
pub use registry::ProviderRegistry;
pub use relay::{Relay, RelayResponse};
pub use session::{ChatSession, TurnOutcome};
pub use types::*;
