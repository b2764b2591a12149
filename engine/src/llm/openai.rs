//! OpenAI-compatible chat completions client
//!
//! Speaks the `/chat/completions` protocol shared by OpenAI and OpenRouter.
//! Page images are sent inline as base64 data URLs, or passed through when
//! they are already remote URLs.

use crate::config::LLMConfig;
use async_trait::async_trait;
use base64::Engine as _;
use sdk::{Completion, CompletionRequest, ImageHandle, ModelClient, ProviderError};
use serde_json::{json, Value};
use std::path::Path;
use tracing::debug;

pub struct OpenAICompatibleClient {
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    vision_model: String,
    input_cost_per_1k: f64,
    output_cost_per_1k: f64,
    request_usage_cost: bool,
    client: reqwest::Client,
}

impl OpenAICompatibleClient {
    /// Client for `base_url` using `model` for text and vision requests
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let model = model.into();
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            vision_model: model.clone(),
            model,
            input_cost_per_1k: 0.0,
            output_cost_per_1k: 0.0,
            request_usage_cost: false,
            client: reqwest::Client::new(),
        }
    }

    /// Build a client from the `[llm]` config section
    ///
    /// The API key is read from the configured environment variable.
    pub fn from_config(config: &LLMConfig) -> Result<Self, ProviderError> {
        let key_var = config.api_key_var();
        let api_key = std::env::var(&key_var).map_err(|_| {
            ProviderError::permanent(format!("API key not set: export {}", key_var))
        })?;

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ProviderError::permanent(format!("HTTP client error: {}", e)))?;

        Ok(Self::new(
            config.provider.clone(),
            config.resolved_base_url(),
            api_key,
            config.model.clone(),
        )
        .with_vision_model(config.vision_model.clone())
        .with_pricing(config.input_cost_per_1k, config.output_cost_per_1k)
        .with_usage_cost(config.provider == "openrouter")
        .with_http_client(client))
    }

    /// Model used for requests that carry images
    pub fn with_vision_model(mut self, model: impl Into<String>) -> Self {
        self.vision_model = model.into();
        self
    }

    /// USD per 1k prompt and completion tokens
    pub fn with_pricing(mut self, input_per_1k: f64, output_per_1k: f64) -> Self {
        self.input_cost_per_1k = input_per_1k.max(0.0);
        self.output_cost_per_1k = output_per_1k.max(0.0);
        self
    }

    /// Ask the provider to report the billed cost in `usage.cost`
    pub fn with_usage_cost(mut self, enabled: bool) -> Self {
        self.request_usage_cost = enabled;
        self
    }

    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn model_for(&self, request: &CompletionRequest) -> &str {
        if request.has_images() {
            &self.vision_model
        } else {
            &self.model
        }
    }

    async fn build_payload(&self, request: &CompletionRequest) -> Result<Value, ProviderError> {
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(json!({ "role": "system", "content": system }));
        }

        if request.has_images() {
            let mut content = vec![json!({ "type": "text", "text": request.prompt })];
            for image in &request.images {
                let url = image_url(image).await?;
                content.push(json!({ "type": "image_url", "image_url": { "url": url } }));
            }
            messages.push(json!({ "role": "user", "content": content }));
        } else {
            messages.push(json!({ "role": "user", "content": request.prompt }));
        }

        let mut payload = json!({
            "model": self.model_for(request),
            "messages": messages,
        });
        if let Some(max_tokens) = request.max_tokens {
            payload["max_tokens"] = json!(max_tokens);
        }
        if let Some(temperature) = request.temperature {
            payload["temperature"] = json!(temperature);
        }
        if self.request_usage_cost {
            payload["usage"] = json!({ "include": true });
        }
        Ok(payload)
    }

    /// Cost of a response: the provider's figure, else token pricing
    fn cost_of(&self, data: &Value) -> f64 {
        let usage = match data.get("usage") {
            Some(usage) => usage,
            None => return 0.0,
        };
        if let Some(cost) = usage.get("cost").and_then(Value::as_f64) {
            return cost.max(0.0);
        }
        let prompt = usage
            .get("prompt_tokens")
            .and_then(Value::as_u64)
            .unwrap_or(0) as f64;
        let completion = usage
            .get("completion_tokens")
            .and_then(Value::as_u64)
            .unwrap_or(0) as f64;
        (prompt / 1000.0) * self.input_cost_per_1k + (completion / 1000.0) * self.output_cost_per_1k
    }
}

#[async_trait]
impl ModelClient for OpenAICompatibleClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let payload = self.build_payload(request).await?;

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| ProviderError::transient(format!("Network error: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = format!("{} returned {}: {}", self.name, status.as_u16(), text);
            return Err(if is_transient_status(status.as_u16()) {
                ProviderError::transient(message)
            } else {
                ProviderError::permanent(message)
            });
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::transient(format!("Malformed response: {}", e)))?;
        let cost = self.cost_of(&data);

        let content = data
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .unwrap_or_default();

        debug!(
            "{} completion: {} chars, ${:.5}",
            self.name,
            content.len(),
            cost
        );
        Ok(Completion::new(content.trim(), cost))
    }
}

/// Timeouts, rate limits and server errors are worth retrying
fn is_transient_status(status: u16) -> bool {
    matches!(status, 408 | 429) || status >= 500
}

async fn image_url(image: &ImageHandle) -> Result<String, ProviderError> {
    match image {
        ImageHandle::Url(url) => Ok(url.clone()),
        ImageHandle::Bytes { media_type, data } => Ok(data_url(media_type, data)),
        ImageHandle::Path(path) => {
            let data = tokio::fs::read(path).await.map_err(|e| {
                ProviderError::permanent(format!("Cannot read {}: {}", path.display(), e))
            })?;
            Ok(data_url(media_type_for(path), &data))
        }
    }
}

fn data_url(media_type: &str, data: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        media_type,
        base64::engine::general_purpose::STANDARD.encode(data)
    )
}

/// Image media type from the file extension, PNG when unknown
pub fn media_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "image/png",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_transient_statuses() {
        assert!(is_transient_status(429));
        assert!(is_transient_status(503));
        assert!(is_transient_status(408));
        assert!(!is_transient_status(400));
        assert!(!is_transient_status(401));
        assert!(!is_transient_status(404));
    }

    #[test]
    fn test_media_type_for() {
        assert_eq!(media_type_for(&PathBuf::from("p1.JPG")), "image/jpeg");
        assert_eq!(media_type_for(&PathBuf::from("p1.webp")), "image/webp");
        assert_eq!(media_type_for(&PathBuf::from("p1")), "image/png");
    }

    #[test]
    fn test_cost_prefers_reported_usage_cost() {
        let client = OpenAICompatibleClient::new("t", "http://x", "k", "m").with_pricing(1.0, 2.0);
        let reported = json!({ "usage": { "cost": 0.25, "prompt_tokens": 1000 } });
        assert_eq!(client.cost_of(&reported), 0.25);

        let tokens = json!({ "usage": { "prompt_tokens": 1000, "completion_tokens": 500 } });
        assert!((client.cost_of(&tokens) - 2.0).abs() < 1e-9);

        assert_eq!(client.cost_of(&json!({})), 0.0);
    }

    #[tokio::test]
    async fn test_payload_uses_vision_model_for_images() {
        let client = OpenAICompatibleClient::new("t", "http://x/", "k", "text-model")
            .with_vision_model("vision-model");

        let text = client
            .build_payload(&CompletionRequest::text("hi").with_system("sys"))
            .await
            .unwrap();
        assert_eq!(text["model"], "text-model");
        assert_eq!(text["messages"][0]["role"], "system");
        assert_eq!(text["messages"][1]["content"], "hi");

        let vision = client
            .build_payload(
                &CompletionRequest::text("look")
                    .with_images(vec![ImageHandle::bytes("image/png", vec![1, 2, 3])]),
            )
            .await
            .unwrap();
        assert_eq!(vision["model"], "vision-model");
        let url = vision["messages"][0]["content"][1]["image_url"]["url"]
            .as_str()
            .unwrap();
        assert_eq!(url, "data:image/png;base64,AQID");
    }
}
