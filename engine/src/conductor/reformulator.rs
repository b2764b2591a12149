//! Query Reformulator
//!
//! Turns a follow-up question ("What about its accuracy?") into a standalone
//! one using the conversation so far. Planning, page selection and synthesis
//! then work from the rewritten query. Any failure keeps the query as asked.

use crate::conductor::prompts;
use crate::conductor::types::ConversationTurn;
use crate::llm::extract_json_object;
use sdk::{CompletionRequest, ModelClient};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct RawReformulation {
    reformulated_query: String,
}

/// The query to plan with and what producing it cost
#[derive(Debug, Clone, PartialEq)]
pub struct Reformulation {
    pub query: String,
    pub cost: f64,
}

impl Reformulation {
    fn unchanged(query: &str, cost: f64) -> Self {
        Self {
            query: query.to_string(),
            cost,
        }
    }
}

pub struct QueryReformulator {
    client: Arc<dyn ModelClient>,
    max_tokens: Option<u32>,
}

impl QueryReformulator {
    pub fn new(client: Arc<dyn ModelClient>) -> Self {
        Self {
            client,
            max_tokens: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Resolve references in `query` against `conversation`
    ///
    /// Makes no model call for the first question of a session.
    pub async fn reformulate(&self, query: &str, conversation: &[ConversationTurn]) -> Reformulation {
        if conversation.is_empty() {
            return Reformulation::unchanged(query, 0.0);
        }

        let mut request =
            CompletionRequest::text(prompts::reformulation_prompt(query, conversation))
                .with_system(prompts::SYSTEM_REFORMULATOR);
        if let Some(max_tokens) = self.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }

        let completion = match self.client.complete(&request).await {
            Ok(completion) => completion,
            Err(e) => {
                warn!("Query reformulation failed, keeping the query as asked: {}", e);
                return Reformulation::unchanged(query, e.billed_cost);
            }
        };

        let rewritten = extract_json_object(&completion.text)
            .and_then(|json| serde_json::from_str::<RawReformulation>(json).ok())
            .map(|raw| raw.reformulated_query.trim().to_string())
            .filter(|q| !q.is_empty());

        match rewritten {
            Some(rewritten) if rewritten != query => {
                info!("Reformulated query: '{}' -> '{}'", query, rewritten);
                Reformulation {
                    query: rewritten,
                    cost: completion.cost,
                }
            }
            Some(_) => {
                debug!("Query needs no reformulation");
                Reformulation::unchanged(query, completion.cost)
            }
            None => {
                warn!("Unusable reformulation output, keeping the query as asked");
                Reformulation::unchanged(query, completion.cost)
            }
        }
    }
}
