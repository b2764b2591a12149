//! Error types and handling
//!
//! This module provides the error types used throughout the Docia engine.
//! All errors implement the `DociaErrorExt` trait which provides user-friendly
//! hints and indicates whether errors are recoverable.
//!
//! # Propagation
//!
//! - Transient provider errors are retried inside the task executor and only
//!   ever surface as a failed task.
//! - Planning failures abort the whole query.
//! - Document lookup failures propagate immediately, without retry.
//! - Cancellation is a terminal status of a query, not a failure.

use std::fmt;
use thiserror::Error;

/// Trait for Docia error extensions
///
/// This trait provides additional context for errors, including user-friendly
/// hints and recoverability information. All engine errors implement this trait.
pub trait DociaErrorExt {
    /// Returns a user-friendly hint for the error
    ///
    /// The hint is safe to display to end users and does not contain
    /// API keys, file paths or raw provider responses.
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors can be retried or worked around. Non-recoverable
    /// errors require the caller to change its input or configuration.
    fn is_recoverable(&self) -> bool;
}

/// Whether a provider failure is worth retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Network failure, timeout, provider 5xx or rate limiting
    Transient,
    /// Invalid input, authentication or quota failure
    Permanent,
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderErrorKind::Transient => write!(f, "transient"),
            ProviderErrorKind::Permanent => write!(f, "permanent"),
        }
    }
}

/// Failure reported by a model client
///
/// Providers may still bill a failed call, so the error carries whatever cost
/// the provider reported for the attempt.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind} provider error: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
    /// Cost billed for the failed attempt (USD)
    pub billed_cost: f64,
}

impl ProviderError {
    /// Create a retryable provider error
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Transient,
            message: message.into(),
            billed_cost: 0.0,
        }
    }

    /// Create a non-retryable provider error
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Permanent,
            message: message.into(),
            billed_cost: 0.0,
        }
    }

    /// Attach the cost the provider billed for this failed attempt
    pub fn with_cost(mut self, cost: f64) -> Self {
        self.billed_cost = cost.max(0.0);
        self
    }

    pub fn is_transient(&self) -> bool {
        self.kind == ProviderErrorKind::Transient
    }
}

/// Main engine error type
///
/// # Error Categories
///
/// - **Input**: empty query, no documents in scope, unknown documents
/// - **Planning**: the planner never produced a usable plan
/// - **Provider**: model client failures (transient or permanent)
/// - **Budget**: iteration ceiling reached (non-fatal, forces completion)
/// - **Configuration**: invalid or unreadable configuration
///
/// # Examples
///
/// ```
/// use sdk::errors::{DociaError, DociaErrorExt};
///
/// let error = DociaError::DocumentNotFound("doc_9".to_string());
/// println!("Hint: {}", error.user_hint());
/// assert!(!error.is_recoverable());
///
/// let budget = DociaError::IterationBudgetExceeded { max: 3 };
/// assert!(budget.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum DociaError {
    // Input errors
    #[error("No documents available for analysis")]
    NoDocuments,

    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Page {page} not found in document {document_id}")]
    PageNotFound { document_id: String, page: u32 },

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    // Planning errors
    #[error("Planning exhausted: {0}")]
    PlanningExhausted(String),

    // Provider errors
    #[error(transparent)]
    Provider(#[from] ProviderError),

    // Budget errors
    #[error("Iteration budget exceeded (max {max})")]
    IterationBudgetExceeded { max: u32 },

    #[error("Query cancelled")]
    Cancelled,

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DociaErrorExt for DociaError {
    fn user_hint(&self) -> &str {
        match self {
            // Input errors
            Self::NoDocuments => "Add documents to the knowledge base first",
            Self::DocumentNotFound(_) => "Check the document id. List documents with 'docia docs'",
            Self::PageNotFound { .. } => "The document store is missing a page image",
            Self::InvalidQuery(_) => "Ask a non-empty question",

            // Planning errors
            Self::PlanningExhausted(_) => {
                "The model could not plan this question. Check the provider and try again"
            }

            // Provider errors
            Self::Provider(e) if e.is_transient() => {
                "Model provider temporarily unavailable. Try again"
            }
            Self::Provider(_) => "Model provider rejected the request. Check your API key and quota",

            // Budget errors
            Self::IterationBudgetExceeded { .. } => {
                "Iteration limit reached. Raise max_iterations for deeper analysis"
            }
            Self::Cancelled => "Query cancelled",

            // Configuration errors
            Self::Config(_) => "Check your config.toml file for errors",

            // Generic IO error
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            // Non-recoverable errors
            Self::NoDocuments
            | Self::DocumentNotFound(_)
            | Self::PageNotFound { .. }
            | Self::InvalidQuery(_)
            | Self::Config(_) => false,

            Self::Provider(e) => e.is_transient(),

            // All other errors are potentially recoverable
            _ => true,
        }
    }
}

/// Result type alias using `DociaError`
pub type Result<T> = std::result::Result<T, DociaError>;
