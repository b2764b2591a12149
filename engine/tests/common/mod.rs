//! Shared fixtures for engine integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use docia_engine::conductor::prompts::{SYSTEM_PLANNER, SYSTEM_REFORMULATOR, SYSTEM_SYNTHESIS};
use docia_engine::conductor::{
    Aggregator, ExecutionTrace, IterationController, Planner, QueryContext, RetryPolicy,
    SufficiencyPolicy, TaskExecutor,
};
use docia_engine::store::InMemoryDocumentStore;
use sdk::{Completion, CompletionRequest, Document, ImageHandle, ModelClient, Page, ProviderError};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type TaskHandler = dyn Fn(&CompletionRequest) -> Result<Completion, ProviderError> + Send + Sync;

/// Model client that answers from a script
///
/// Reformulation, planning, task and synthesis requests are told apart by
/// their system prompt. Planning replies are consumed in order and the last
/// one repeats. Reformulation echoes the query back unless scripted.
pub struct ScriptedModelClient {
    plans: Mutex<VecDeque<Result<Completion, ProviderError>>>,
    last_plan: Mutex<Option<Result<Completion, ProviderError>>>,
    on_task: Box<TaskHandler>,
    synthesis: Option<String>,
    reformulation: Option<String>,
    slow_marker: Option<(String, Duration)>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedModelClient {
    pub fn new() -> Self {
        Self {
            plans: Mutex::new(VecDeque::new()),
            last_plan: Mutex::new(None),
            on_task: Box::new(|_| Ok(Completion::new("Finding from the pages", 0.01))),
            synthesis: None,
            reformulation: None,
            slow_marker: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a planning reply
    pub fn with_plan(self, json: &str) -> Self {
        self.plans
            .lock()
            .unwrap()
            .push_back(Ok(Completion::new(json, 0.001)));
        self
    }

    pub fn with_plan_error(self, error: ProviderError) -> Self {
        self.plans.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn on_task<F>(mut self, handler: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Result<Completion, ProviderError> + Send + Sync + 'static,
    {
        self.on_task = Box::new(handler);
        self
    }

    pub fn with_synthesis(mut self, text: &str) -> Self {
        self.synthesis = Some(text.to_string());
        self
    }

    /// Reply to every reformulation request with `query`
    pub fn with_reformulation(mut self, query: &str) -> Self {
        self.reformulation = Some(query.to_string());
        self
    }

    /// Task requests whose prompt contains `marker` wait `delay` first
    pub fn with_slow_tasks(mut self, marker: &str, delay: Duration) -> Self {
        self.slow_marker = Some((marker.to_string(), delay));
        self
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn total_calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn planning_calls(&self) -> usize {
        self.count(|r| r.system.as_deref() == Some(SYSTEM_PLANNER))
    }

    pub fn synthesis_calls(&self) -> usize {
        self.count(|r| r.system.as_deref() == Some(SYSTEM_SYNTHESIS))
    }

    pub fn reformulation_calls(&self) -> usize {
        self.count(|r| r.system.as_deref() == Some(SYSTEM_REFORMULATOR))
    }

    pub fn task_calls(&self) -> usize {
        self.count(|r| r.has_images())
    }

    pub fn task_requests(&self) -> Vec<CompletionRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.has_images())
            .collect()
    }

    fn count(&self, pred: impl Fn(&CompletionRequest) -> bool) -> usize {
        self.requests.lock().unwrap().iter().filter(|r| pred(r)).count()
    }

    fn next_plan(&self) -> Result<Completion, ProviderError> {
        let next = self.plans.lock().unwrap().pop_front();
        let mut last = self.last_plan.lock().unwrap();
        match next {
            Some(reply) => {
                *last = Some(reply.clone());
                reply
            }
            None => last
                .clone()
                .unwrap_or_else(|| Ok(Completion::new(r#"{"tasks": []}"#, 0.001))),
        }
    }
}

#[async_trait]
impl ModelClient for ScriptedModelClient {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());

        match request.system.as_deref() {
            Some(SYSTEM_PLANNER) => self.next_plan(),
            Some(SYSTEM_REFORMULATOR) => {
                let query = self.reformulation.clone().unwrap_or_else(|| {
                    request
                        .prompt
                        .lines()
                        .find_map(|line| line.strip_prefix("CURRENT QUERY: "))
                        .unwrap_or_default()
                        .to_string()
                });
                Ok(Completion::new(
                    serde_json::json!({ "reformulated_query": query }).to_string(),
                    0.0005,
                ))
            }
            Some(SYSTEM_SYNTHESIS) => Ok(Completion::new(
                self.synthesis.clone().unwrap_or_else(|| "Synthesized answer".to_string()),
                0.002,
            )),
            _ => {
                if let Some((marker, delay)) = &self.slow_marker {
                    if request.prompt.contains(marker.as_str()) {
                        tokio::time::sleep(*delay).await;
                    }
                }
                (self.on_task)(request)
            }
        }
    }
}

/// Sufficiency policy with a fixed verdict
pub struct FixedSufficiency(pub bool);

impl SufficiencyPolicy for FixedSufficiency {
    fn is_sufficient(&self, _trace: &ExecutionTrace, _context: &QueryContext) -> bool {
        self.0
    }
}

/// Document with `pages` pages and no summaries
pub fn document(id: &str, name: &str, pages: u32) -> Document {
    Document::new(
        id,
        name,
        (1..=pages)
            .map(|i| Page::new(i, format!("{}/page-{}.png", id, i)))
            .collect(),
    )
}

/// In-memory store whose pages resolve to tiny PNG byte handles
pub fn store_with(documents: Vec<Document>) -> Arc<InMemoryDocumentStore> {
    let mut store = InMemoryDocumentStore::new();
    let mut images = Vec::new();
    for doc in documents {
        for page in &doc.pages {
            images.push((doc.id.clone(), page.index));
        }
        store.insert(doc);
    }
    for (doc_id, page) in images {
        store = store.with_page_image(
            doc_id,
            page,
            ImageHandle::bytes("image/png", vec![0x89, 0x50, 0x4e, 0x47]),
        );
    }
    Arc::new(store)
}

/// Backoff short enough for tests
pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
    }
}

/// Controller over `client` and `store` with a fixed sufficiency verdict
pub fn controller(
    client: Arc<ScriptedModelClient>,
    store: Arc<InMemoryDocumentStore>,
    sufficient: Option<bool>,
    pool_width: usize,
) -> IterationController {
    let planner = Planner::new(Arc::clone(&client) as Arc<dyn ModelClient>);
    let executor = TaskExecutor::new(Arc::clone(&client) as Arc<dyn ModelClient>, store)
        .with_retry_policy(fast_retry(3));
    let mut aggregator = Aggregator::new(client);
    if let Some(verdict) = sufficient {
        aggregator = aggregator.with_policy(Arc::new(FixedSufficiency(verdict)));
    }
    IterationController::new(planner, executor, aggregator).with_worker_pool_width(pool_width)
}

/// Planner JSON for tasks given as (name, document, information type)
pub fn plan_json(tasks: &[(&str, &str, &str)]) -> String {
    let tasks: Vec<serde_json::Value> = tasks
        .iter()
        .map(|(name, doc, kind)| {
            serde_json::json!({
                "name": name,
                "description": format!("Find {}", name.to_lowercase()),
                "document": doc,
                "information_type": kind,
            })
        })
        .collect();
    serde_json::json!({ "tasks": tasks }).to_string()
}

/// Label of the task a task request was built for
pub fn task_label(request: &CompletionRequest) -> String {
    request
        .prompt
        .lines()
        .find_map(|line| line.strip_prefix("CURRENT TASK: "))
        .and_then(|rest| rest.split(':').next())
        .unwrap_or_default()
        .to_string()
}

/// Task handler answering "result for <label>"
pub fn echo_label(request: &CompletionRequest) -> Result<Completion, ProviderError> {
    Ok(Completion::new(
        format!("result for {}", task_label(request)),
        0.01,
    ))
}
