//! Content grounding source.
//!
//! The relay only needs "give me the entries of a content type in a locale";
//! [`ContentSource`] is that boundary and [`ContentstackClient`] the one
//! production implementation.

pub mod client;
pub mod types;

pub use client::ContentstackClient;
pub use types::{ContentEntry, ContentSource};
