//! Query sessions
//!
//! A `Session` owns the conversation memory for one user and runs queries
//! through the iteration controller. Memory is explicit session state, so
//! independent sessions never share turns.

use crate::conductor::{
    Aggregator, ConversationMemory, ConversationTurn, FinalAnswer, IterationController, Planner,
    QueryContext, QueryReformulator, TaskExecutor,
};
use crate::config::Config;
use crate::message_bus::MessageBus;
use sdk::errors::DociaError;
use sdk::{Document, DocumentStore, ModelClient};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct Session {
    id: String,
    store: Arc<dyn DocumentStore>,
    controller: IterationController,
    memory: ConversationMemory,
}

impl Session {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        controller: IterationController,
        memory: ConversationMemory,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            store,
            controller,
            memory,
        }
    }

    /// Wire planner, executor and aggregator from configuration
    ///
    /// One model client serves every role; it picks the vision model for
    /// requests that carry page images.
    pub fn from_config(
        config: &Config,
        client: Arc<dyn ModelClient>,
        store: Arc<dyn DocumentStore>,
        bus: Option<Arc<MessageBus>>,
    ) -> Self {
        let max_tokens = config.llm.max_tokens;

        let planner = Planner::new(Arc::clone(&client))
            .with_max_tasks(config.planner.max_tasks)
            .with_max_retries(config.planner.max_retries)
            .with_max_tokens(max_tokens);
        let executor = TaskExecutor::new(Arc::clone(&client), Arc::clone(&store))
            .with_retry_policy(config.executor.retry_policy())
            .with_max_tokens(max_tokens);
        let aggregator = Aggregator::new(Arc::clone(&client))
            .with_policy(Arc::new(config.sufficiency.policy()))
            .with_max_tokens(max_tokens);

        let mut controller = IterationController::new(planner, executor, aggregator)
            .with_worker_pool_width(config.executor.worker_pool_width);
        if config.query.reformulate {
            controller = controller
                .with_reformulator(QueryReformulator::new(client).with_max_tokens(max_tokens));
        }
        if let Some(bus) = bus {
            controller = controller.with_bus(bus);
        }

        Self::new(
            store,
            controller,
            ConversationMemory::new(config.memory.max_turns),
        )
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Answer one query and remember the turn
    ///
    /// Fails with `NoDocuments` before any model call when the store has
    /// nothing in scope. Cancelled and failed queries are not remembered.
    pub async fn run_query(
        &mut self,
        context: QueryContext,
        cancel: &CancellationToken,
    ) -> Result<FinalAnswer, DociaError> {
        context.validate()?;

        let documents = self
            .store
            .get_documents(context.document_ids.as_deref())
            .await?;
        if documents.iter().all(|d| d.page_count() == 0) {
            warn!("No documents with pages in scope");
            return Err(DociaError::NoDocuments);
        }

        let conversation = self.memory.context_window(context.conversation_turns);
        info!(
            "Session {}: query over {} document(s) with {} prior turn(s)",
            self.id,
            documents.len(),
            conversation.len()
        );

        let answer = self
            .controller
            .run(&context, &documents, &conversation, cancel)
            .await?;

        if !answer.cancelled {
            self.memory.record(ConversationTurn::new(
                context.query.clone(),
                answer.answer.clone(),
                answer.billed_cost(),
            ));
        }
        Ok(answer)
    }

    /// Every document the store knows about
    pub async fn list_documents(&self) -> Result<Vec<Document>, DociaError> {
        self.store.get_documents(None).await
    }

    /// Remembered turns, oldest first
    pub fn conversation(&self) -> Vec<ConversationTurn> {
        self.memory.turns()
    }

    pub fn clear_conversation(&mut self) {
        self.memory.clear();
    }
}
