//! Docia SDK
//!
//! Shared traits and types for the Docia engine and the collaborators it
//! consumes: document stores and vision-language model clients.

/// Document and page types
pub mod document;

/// Error types and handling
pub mod errors;

/// Model client trait
pub mod model;

/// Document store trait
pub mod store;

// Re-export commonly used types
pub use document::{Document, DocumentFormat, ImageHandle, Page};
pub use errors::{DociaError, DociaErrorExt, ProviderError, ProviderErrorKind};
pub use model::{Completion, CompletionRequest, ModelClient};
pub use store::DocumentStore;
