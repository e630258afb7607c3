//! SchemaSense LLM provider adapter.
//!
//! Implements [`ontology::ports::LlmClient`] against any OpenAI-compatible
//! chat-completions endpoint and [`ontology::ports::LlmClientFactory`] on top
//! of a static, per-project configuration.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP transport, request formatting, response parsing
//! and the mapping of provider failures onto [`ontology::LlmError`] live here.
//! Retry decisions stay with the caller, driven by
//! [`ontology::LlmError::retry_policy`].

mod client;
mod config;
mod factory;

pub use client::ChatCompletionClient;
pub use config::{LlmConfig, LlmSettings};
pub use factory::ConfiguredLlmFactory;
