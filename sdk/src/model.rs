//! Model client trait and request/response types
//!
//! A model client wraps one vision-language model endpoint. The engine only
//! ever talks to models through this trait, so providers can be swapped or
//! scripted in tests.

use crate::document::ImageHandle;
use crate::errors::ProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A single completion request
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Optional system prompt
    pub system: Option<String>,

    /// User prompt
    pub prompt: String,

    /// Page images, in the order the model should see them
    pub images: Vec<ImageHandle>,

    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
}

impl CompletionRequest {
    /// Text-only request
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            images: Vec::new(),
            max_tokens: None,
            temperature: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_images(mut self, images: Vec<ImageHandle>) -> Self {
        self.images = images;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn has_images(&self) -> bool {
        !self.images.is_empty()
    }
}

/// Model output with the cost of producing it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,

    /// Cost of the call in USD
    pub cost: f64,
}

impl Completion {
    pub fn new(text: impl Into<String>, cost: f64) -> Self {
        Self {
            text: text.into(),
            cost: cost.max(0.0),
        }
    }
}

/// Trait implemented by every model provider
///
/// Implementations must be safe to call concurrently: the task executor runs
/// several completions at once against one shared client.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Provider name, used for logging
    fn name(&self) -> &str;

    /// Run one completion
    ///
    /// Failures are classified as transient (worth retrying) or permanent.
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let req = CompletionRequest::text("What is the revenue?")
            .with_system("You analyze documents")
            .with_max_tokens(512)
            .with_images(vec![ImageHandle::Url("https://x/p1.png".into())]);

        assert_eq!(req.prompt, "What is the revenue?");
        assert_eq!(req.system.as_deref(), Some("You analyze documents"));
        assert_eq!(req.max_tokens, Some(512));
        assert!(req.has_images());
        assert!(req.temperature.is_none());
    }

    #[test]
    fn test_completion_cost_never_negative() {
        assert_eq!(Completion::new("ok", -0.5).cost, 0.0);
        assert_eq!(Completion::new("ok", 0.02).cost, 0.02);
    }
}
