//! Docia Engine Library
//!
//! Answers questions about multi-page documents by planning the question into
//! page-bound tasks for a vision-language model, running them, and deciding
//! whether another round is needed. Used by the `docia` binary and the
//! integration tests.

/// Configuration management module
pub mod config;

/// Query planning, execution and aggregation
pub mod conductor;

/// Model provider adapters and output parsing helpers
pub mod llm;

/// Document store implementations
pub mod store;

/// Message bus for query progress events
pub mod message_bus;

/// Conversation sessions
pub mod session;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
