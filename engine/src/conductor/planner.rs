//! Conductor Planner
//!
//! Asks the model to decompose a query into tasks and turns its JSON answer
//! into a `Plan`. Output that cannot be used degrades to a single generic task
//! instead of failing the query.

use crate::conductor::prompts;
use crate::conductor::types::{ConversationTurn, Plan, QueryContext, Task, TaskKind};
use crate::llm::{extract_json_array, extract_json_object};
use sdk::errors::DociaError;
use sdk::{CompletionRequest, Document, ModelClient};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default cap on tasks per plan
pub const DEFAULT_MAX_TASKS: usize = 4;

/// Default number of corrective re-prompts after unusable output
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Label of the single task in a degraded plan
pub const DEGRADED_TASK_LABEL: &str = "Answer query";

/// Intermediate deserialization type for planner JSON output
#[derive(Debug, Deserialize)]
struct RawPlan {
    tasks: Vec<RawTask>,
}

#[derive(Debug, Deserialize)]
struct RawTask {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    document: Option<String>,
    #[serde(default)]
    information_type: Option<String>,
}

/// A plan together with what the planning calls cost
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub plan: Plan,
    pub cost: f64,
}

pub struct Planner {
    client: Arc<dyn ModelClient>,
    max_tasks: usize,
    max_retries: u32,
    max_tokens: Option<u32>,
}

impl Planner {
    pub fn new(client: Arc<dyn ModelClient>) -> Self {
        Self {
            client,
            max_tasks: DEFAULT_MAX_TASKS,
            max_retries: DEFAULT_MAX_RETRIES,
            max_tokens: None,
        }
    }

    pub fn with_max_tasks(mut self, max_tasks: usize) -> Self {
        self.max_tasks = max_tasks.max(1);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Produce the plan for one iteration
    ///
    /// Fails with `InvalidQuery` or `NoDocuments` without calling the model.
    /// Provider failures that leave the planner with no output at all fail
    /// with `PlanningExhausted`; unusable output yields a degraded plan.
    pub async fn plan(
        &self,
        context: &QueryContext,
        documents: &[Document],
        iteration: u32,
        prior_summary: Option<&str>,
        conversation: &[ConversationTurn],
    ) -> Result<PlanOutcome, DociaError> {
        if context.query.trim().is_empty() {
            return Err(DociaError::InvalidQuery("query is empty".to_string()));
        }
        if documents.is_empty() {
            return Err(DociaError::NoDocuments);
        }

        let base_prompt = prompts::planning_prompt(
            &context.query,
            documents,
            conversation,
            prior_summary,
            self.max_tasks,
        );

        let mut cost = 0.0;
        let mut produced_output = false;
        let mut correction: Option<String> = None;
        let mut last_provider_error = None;

        for attempt in 1..=self.max_retries + 1 {
            let prompt = match &correction {
                Some(c) => format!("{}{}", base_prompt, c),
                None => base_prompt.clone(),
            };
            let mut request = CompletionRequest::text(prompt).with_system(prompts::SYSTEM_PLANNER);
            if let Some(max_tokens) = self.max_tokens {
                request = request.with_max_tokens(max_tokens);
            }

            debug!("Planning iteration {} attempt {}", iteration, attempt);
            let completion = match self.client.complete(&request).await {
                Ok(completion) => completion,
                Err(e) => {
                    cost += e.billed_cost;
                    if !e.is_transient() {
                        return Err(DociaError::PlanningExhausted(format!(
                            "planning request rejected: {}",
                            e
                        )));
                    }
                    warn!("Planning attempt {} failed: {}", attempt, e);
                    last_provider_error = Some(e);
                    continue;
                }
            };

            cost += completion.cost;
            produced_output = true;

            match self.parse_tasks(&completion.text, documents, iteration) {
                Ok(tasks) if tasks.is_empty() => {
                    warn!("Planner returned zero tasks, using degraded plan");
                    return Ok(PlanOutcome {
                        plan: self.degraded_plan(context, iteration),
                        cost,
                    });
                }
                Ok(tasks) => {
                    info!(
                        "Planned {} task(s) for iteration {}",
                        tasks.len(),
                        iteration
                    );
                    return Ok(PlanOutcome {
                        plan: Plan::new(&context.query, iteration, tasks, false),
                        cost,
                    });
                }
                Err(reason) => {
                    warn!("Unusable plan output on attempt {}: {}", attempt, reason);
                    correction = Some(prompts::planning_correction(&completion.text, &reason));
                }
            }
        }

        if !produced_output {
            let reason = last_provider_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no planning attempts were made".to_string());
            return Err(DociaError::PlanningExhausted(reason));
        }

        warn!("Failed to parse planner output, using degraded plan");
        Ok(PlanOutcome {
            plan: self.degraded_plan(context, iteration),
            cost,
        })
    }

    /// Parse planner output into tasks
    ///
    /// Accepts `{"tasks": [...]}` or a bare task array. Unknown document ids
    /// are dropped, duplicate labels are made unique and the list is cut to
    /// `max_tasks`.
    fn parse_tasks(
        &self,
        content: &str,
        documents: &[Document],
        iteration: u32,
    ) -> Result<Vec<Task>, String> {
        let raw_tasks = match extract_json_object(content)
            .map(serde_json::from_str::<RawPlan>)
        {
            Some(Ok(plan)) => plan.tasks,
            Some(Err(e)) => match extract_json_array(content) {
                Some(array) => serde_json::from_str::<Vec<RawTask>>(array)
                    .map_err(|_| format!("invalid plan JSON: {}", e))?,
                None => return Err(format!("invalid plan JSON: {}", e)),
            },
            None => {
                let array = extract_json_array(content)
                    .ok_or_else(|| "no JSON found in output".to_string())?;
                serde_json::from_str::<Vec<RawTask>>(array)
                    .map_err(|e| format!("invalid plan JSON: {}", e))?
            }
        };

        let known: HashSet<&str> = documents.iter().map(|d| d.id.as_str()).collect();
        let mut labels: HashSet<String> = HashSet::new();

        let tasks = raw_tasks
            .into_iter()
            .filter(|raw| !raw.name.trim().is_empty())
            .take(self.max_tasks)
            .enumerate()
            .map(|(i, raw)| {
                let name = raw.name.trim().to_string();
                let mut label = name.clone();
                let mut n = 2;
                while !labels.insert(label.clone()) {
                    label = format!("{} ({})", name, n);
                    n += 1;
                }

                let description = raw
                    .description
                    .map(|d| d.trim().to_string())
                    .filter(|d| !d.is_empty())
                    .unwrap_or_else(|| name.clone());
                let kind = raw
                    .information_type
                    .as_deref()
                    .map(TaskKind::from_information_type)
                    .unwrap_or(TaskKind::Generic);

                let mut task = Task::new(
                    format!("it{}-t{}", iteration, i + 1),
                    label,
                    description,
                    kind,
                );
                match raw.document {
                    Some(doc) if known.contains(doc.as_str()) => {
                        task = task.with_document_hint(doc);
                    }
                    Some(doc) => debug!("Dropping unknown document hint '{}'", doc),
                    None => {}
                }
                task
            })
            .collect();

        Ok(tasks)
    }

    /// Single generic task covering the whole query over every document
    fn degraded_plan(&self, context: &QueryContext, iteration: u32) -> Plan {
        let task = Task::new(
            format!("it{}-t1", iteration),
            DEGRADED_TASK_LABEL,
            context.query.clone(),
            TaskKind::Generic,
        );
        Plan::new(&context.query, iteration, vec![task], true)
    }
}
