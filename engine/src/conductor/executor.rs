//! Conductor Executor
//!
//! Runs one task against its selected pages: resolves page images through the
//! document store, calls the vision model and retries transient failures with
//! bounded exponential backoff. Every attempt is billed and timed, whether or
//! not it succeeds.

use crate::conductor::prompts;
use crate::conductor::types::{ConversationTurn, PageRef, Task, TaskMetrics, TaskResult};
use sdk::{CompletionRequest, DocumentStore, ModelClient};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Failure reason attached to tasks interrupted by cancellation
pub const CANCELLED_REASON: &str = "cancelled";

/// Failure reason for a model reply with no text
pub const EMPTY_RESPONSE_REASON: &str = "empty response";

/// Sampling temperature for page analysis calls
pub const ANALYSIS_TEMPERATURE: f64 = 0.3;

/// Bounded exponential backoff for transient provider errors
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, the first call included
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after failed attempt number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Executes individual tasks against the vision model
pub struct TaskExecutor {
    client: Arc<dyn ModelClient>,
    store: Arc<dyn DocumentStore>,
    retry: RetryPolicy,
    max_tokens: Option<u32>,
}

impl TaskExecutor {
    pub fn new(client: Arc<dyn ModelClient>, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            client,
            store,
            retry: RetryPolicy::default(),
            max_tokens: None,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Run `task` over `pages`
    ///
    /// `conversation` is the session's recent turns, shown to the model as
    /// short excerpts so follow-up questions keep their context.
    ///
    /// Never returns an error: every failure ends up as a failed `TaskResult`
    /// with its reason and the metrics accumulated so far.
    pub async fn execute(
        &self,
        task: &Task,
        pages: &[PageRef],
        query: &str,
        conversation: &[ConversationTurn],
        cancel: &CancellationToken,
    ) -> TaskResult {
        let start = Instant::now();
        let mut metrics = TaskMetrics::default();

        let finish = |mut metrics: TaskMetrics, outcome: Result<String, String>| {
            metrics.elapsed = start.elapsed();
            match outcome {
                Ok(text) => TaskResult::completed(text, metrics),
                Err(reason) => TaskResult::failed(reason, metrics),
            }
        };

        if cancel.is_cancelled() {
            return finish(metrics, Err(CANCELLED_REASON.to_string()));
        }
        if pages.is_empty() {
            return finish(metrics, Err("no pages selected".to_string()));
        }

        // Lookup failures are input errors, not worth retrying
        let mut images = Vec::with_capacity(pages.len());
        for page in pages {
            match self.store.get_page_image(&page.document_id, page.page).await {
                Ok(image) => images.push(image),
                Err(e) => {
                    warn!("Task {} page lookup failed: {}", task.id, e);
                    return finish(metrics, Err(format!("page lookup failed: {}", e)));
                }
            }
        }

        let mut request = CompletionRequest::text(prompts::task_prompt(task, query, conversation))
            .with_system(prompts::SYSTEM_ANALYST)
            .with_images(images)
            .with_temperature(ANALYSIS_TEMPERATURE);
        if let Some(max_tokens) = self.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }

        let max_attempts = self.retry.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            metrics.attempts = attempt;
            debug!(
                "Task {} attempt {}/{} over {} page(s)",
                task.id,
                attempt,
                max_attempts,
                pages.len()
            );

            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                response = self.client.complete(&request) => Some(response),
            };

            let error = match response {
                None => return finish(metrics, Err(CANCELLED_REASON.to_string())),
                Some(Ok(completion)) => {
                    metrics.cost += completion.cost;
                    if completion.text.trim().is_empty() {
                        warn!("Task {} got an empty response", task.id);
                        return finish(metrics, Err(EMPTY_RESPONSE_REASON.to_string()));
                    }
                    info!(
                        "Task {} completed in {:.1}s after {} attempt(s)",
                        task.id,
                        start.elapsed().as_secs_f64(),
                        attempt
                    );
                    return finish(metrics, Ok(completion.text));
                }
                Some(Err(e)) => e,
            };

            metrics.cost += error.billed_cost;
            if !error.is_transient() {
                warn!("Task {} failed permanently: {}", task.id, error);
                return finish(metrics, Err(error.to_string()));
            }
            if attempt == max_attempts {
                warn!(
                    "Task {} failed after {} attempts: {}",
                    task.id, attempt, error
                );
                return finish(
                    metrics,
                    Err(format!("retries exhausted after {} attempts: {}", attempt, error)),
                );
            }

            let delay = self.retry.delay_for(attempt);
            debug!(
                "Task {} transient failure, retrying in {:?}: {}",
                task.id, delay, error
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return finish(metrics, Err(CANCELLED_REASON.to_string()));
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        finish(metrics, Err("no attempts made".to_string()))
    }
}
