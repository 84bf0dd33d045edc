//! Embedding Client (C4): optional text→vector via an external
//! OpenAI-compatible HTTP API, with a no-op variant selected when no
//! embedding provider is configured.
//!
//! Grounded on the `reqwest` client-construction idiom used throughout
//! `skynet-agent`'s `openai.rs` (builder, json feature, typed
//! request/response structs) — there is no embedding client in the teacher,
//! so the endpoint-derivation and batch-chunking logic here is new
//! authorship in that same idiom.

pub mod client;
pub mod error;

pub use client::{embed_endpoint, EmbeddingClient, HttpEmbeddingClient, NoopEmbeddingClient};
pub use error::EmbeddingError;
