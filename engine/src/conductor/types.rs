//! Conductor Types
//!
//! Data model shared by the planner, page selector, task executor, iteration
//! controller and aggregator.

use chrono::{DateTime, Utc};
use sdk::errors::DociaError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

/// Default page ceiling per task
pub const DEFAULT_MAX_PAGES: usize = 6;

/// Default iteration ceiling per query
pub const DEFAULT_MAX_ITERATIONS: u32 = 5;

/// Default number of conversation turns fed to the planner
pub const DEFAULT_CONVERSATION_TURNS: usize = 3;

/// A page within a specific document
///
/// Ordered by document id, then page index.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PageRef {
    pub document_id: String,
    pub page: u32,
}

impl PageRef {
    pub fn new(document_id: impl Into<String>, page: u32) -> Self {
        Self {
            document_id: document_id.into(),
            page,
        }
    }
}

impl fmt::Display for PageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} p.{}", self.document_id, self.page)
    }
}

/// What kind of visual content a task is after
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    TextExtraction,
    Table,
    Chart,
    Generic,
}

impl TaskKind {
    /// Map the planner's `information_type` onto a task kind
    ///
    /// Unknown values fall back to `Generic`.
    pub fn from_information_type(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "basic" | "text" | "text_extraction" => TaskKind::TextExtraction,
            "table" | "tables" => TaskKind::Table,
            "chart" | "charts" | "graph" => TaskKind::Chart,
            _ => TaskKind::Generic,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::TextExtraction => "text_extraction",
            TaskKind::Table => "table",
            TaskKind::Chart => "chart",
            TaskKind::Generic => "generic",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task lifecycle. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// Cost and timing of one task, summed over every attempt
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskMetrics {
    pub cost: f64,
    pub elapsed: Duration,
    pub attempts: u32,
}

/// Outcome of running one task
#[derive(Debug, Clone, PartialEq)]
pub struct TaskResult {
    pub status: TaskStatus,
    pub text: Option<String>,
    pub failure: Option<String>,
    pub metrics: TaskMetrics,
}

impl TaskResult {
    pub fn completed(text: impl Into<String>, metrics: TaskMetrics) -> Self {
        Self {
            status: TaskStatus::Completed,
            text: Some(text.into()),
            failure: None,
            metrics,
        }
    }

    pub fn failed(reason: impl Into<String>, metrics: TaskMetrics) -> Self {
        Self {
            status: TaskStatus::Failed,
            text: None,
            failure: Some(reason.into()),
            metrics,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}

/// One bounded unit of work over a subset of pages
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: String,
    pub label: String,
    pub description: String,
    pub kind: TaskKind,
    /// Document the planner thinks is most relevant
    pub document_hint: Option<String>,
    /// Filled in by the page selector before dispatch
    pub pages: Vec<PageRef>,
    pub status: TaskStatus,
    pub result: Option<String>,
    pub failure: Option<String>,
    pub metrics: TaskMetrics,
}

impl Task {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        description: impl Into<String>,
        kind: TaskKind,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            description: description.into(),
            kind,
            document_hint: None,
            pages: Vec::new(),
            status: TaskStatus::Pending,
            result: None,
            failure: None,
            metrics: TaskMetrics::default(),
        }
    }

    pub fn with_document_hint(mut self, document_id: impl Into<String>) -> Self {
        self.document_hint = Some(document_id.into());
        self
    }

    /// Move `Pending` to `Running`. Returns false for any other state.
    pub fn mark_running(&mut self) -> bool {
        if self.status == TaskStatus::Pending {
            self.status = TaskStatus::Running;
            true
        } else {
            false
        }
    }

    /// Record a terminal outcome
    ///
    /// Ignored once the task is already terminal, so status never moves back.
    pub fn apply_result(&mut self, result: TaskResult) -> bool {
        if self.status.is_terminal() || !result.status.is_terminal() {
            return false;
        }
        self.status = result.status;
        self.result = result.text;
        self.failure = result.failure;
        self.metrics = result.metrics;
        true
    }

    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.status == TaskStatus::Failed
    }
}

/// One ordered batch of tasks for a single iteration
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub id: String,
    pub query: String,
    /// 1-based iteration number
    pub iteration: u32,
    pub tasks: Vec<Task>,
    /// Set when the planner fell back to a single generic task
    pub degraded: bool,
    pub created_at: DateTime<Utc>,
}

impl Plan {
    pub fn new(query: impl Into<String>, iteration: u32, tasks: Vec<Task>, degraded: bool) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            query: query.into(),
            iteration,
            tasks,
            degraded,
            created_at: Utc::now(),
        }
    }

    pub fn completed_count(&self) -> usize {
        self.tasks.iter().filter(|t| t.is_completed()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.tasks.iter().filter(|t| t.is_failed()).count()
    }

    /// Fraction of tasks that completed successfully
    pub fn completion_ratio(&self) -> f64 {
        if self.tasks.is_empty() {
            return 0.0;
        }
        self.completed_count() as f64 / self.tasks.len() as f64
    }

    /// True when every task ran to completion and none succeeded
    pub fn all_failed(&self) -> bool {
        !self.tasks.is_empty() && self.tasks.iter().all(|t| t.is_failed())
    }
}

/// How much effort to spend on a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    /// One iteration, results concatenated without a synthesis call
    Fast,
    #[default]
    Comprehensive,
}

impl fmt::Display for QueryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryMode::Fast => write!(f, "fast"),
            QueryMode::Comprehensive => write!(f, "comprehensive"),
        }
    }
}

/// Parameters of a single query
#[derive(Debug, Clone, PartialEq)]
pub struct QueryContext {
    pub query: String,
    /// Restrict the query to these documents
    pub document_ids: Option<Vec<String>>,
    pub mode: QueryMode,
    pub max_pages: usize,
    pub max_iterations: u32,
    pub conversation_turns: usize,
}

impl QueryContext {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            document_ids: None,
            mode: QueryMode::default(),
            max_pages: DEFAULT_MAX_PAGES,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            conversation_turns: DEFAULT_CONVERSATION_TURNS,
        }
    }

    pub fn with_documents(mut self, ids: Vec<String>) -> Self {
        self.document_ids = Some(ids);
        self
    }

    pub fn with_mode(mut self, mode: QueryMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_conversation_turns(mut self, turns: usize) -> Self {
        self.conversation_turns = turns;
        self
    }

    /// Iteration ceiling after applying the mode
    pub fn effective_max_iterations(&self) -> u32 {
        match self.mode {
            QueryMode::Fast => 1,
            QueryMode::Comprehensive => self.max_iterations,
        }
    }

    /// Reject contexts the engine cannot run
    pub fn validate(&self) -> Result<(), DociaError> {
        if self.query.trim().is_empty() {
            return Err(DociaError::InvalidQuery("query is empty".to_string()));
        }
        if self.max_pages == 0 {
            return Err(DociaError::InvalidQuery(
                "max_pages must be at least 1".to_string(),
            ));
        }
        if self.max_iterations == 0 {
            return Err(DociaError::InvalidQuery(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if matches!(&self.document_ids, Some(ids) if ids.is_empty()) {
            return Err(DociaError::NoDocuments);
        }
        Ok(())
    }
}

/// One answered question, kept in conversation memory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub query: String,
    pub answer: String,
    pub timestamp: DateTime<Utc>,
    pub cost: f64,
}

impl ConversationTurn {
    pub fn new(query: impl Into<String>, answer: impl Into<String>, cost: f64) -> Self {
        Self {
            query: query.into(),
            answer: answer.into(),
            timestamp: Utc::now(),
            cost,
        }
    }
}

/// Everything that happened while answering one query
#[derive(Debug, Clone, Default)]
pub struct ExecutionTrace {
    plans: Vec<Plan>,
    overhead_cost: f64,
}

impl ExecutionTrace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of iterations started so far
    pub fn iterations(&self) -> u32 {
        self.plans.len() as u32
    }

    pub fn plans(&self) -> &[Plan] {
        &self.plans
    }

    /// Append the plan of a new iteration
    ///
    /// Fails with `IterationBudgetExceeded` instead of growing past the
    /// ceiling.
    pub fn push_plan(&mut self, plan: Plan, max_iterations: u32) -> Result<(), DociaError> {
        if self.iterations() >= max_iterations {
            return Err(DociaError::IterationBudgetExceeded {
                max: max_iterations,
            });
        }
        self.plans.push(plan);
        Ok(())
    }

    pub fn latest_plan(&self) -> Option<&Plan> {
        self.plans.last()
    }

    pub fn latest_plan_mut(&mut self) -> Option<&mut Plan> {
        self.plans.last_mut()
    }

    /// Record planning or synthesis cost
    pub fn add_overhead(&mut self, cost: f64) {
        self.overhead_cost += cost.max(0.0);
    }

    pub fn overhead_cost(&self) -> f64 {
        self.overhead_cost
    }

    /// Sum of all task costs across iterations, failed attempts included
    pub fn task_cost(&self) -> f64 {
        self.tasks().map(|t| t.metrics.cost).sum()
    }

    /// Pages actually sent to the model, deduplicated
    pub fn pages_touched(&self) -> BTreeSet<PageRef> {
        self.tasks()
            .filter(|t| t.metrics.attempts > 0)
            .flat_map(|t| t.pages.iter().cloned())
            .collect()
    }

    pub fn completed_count(&self) -> usize {
        self.tasks().filter(|t| t.is_completed()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.tasks().filter(|t| t.is_failed()).count()
    }

    pub fn is_degraded(&self) -> bool {
        self.plans.iter().any(|p| p.degraded)
    }

    /// True when the last two plans both failed entirely
    pub fn stalled(&self) -> bool {
        let n = self.plans.len();
        n >= 2 && self.plans[n - 1].all_failed() && self.plans[n - 2].all_failed()
    }

    /// Successful tasks across all iterations
    ///
    /// A later result for the same label replaces the earlier one in place.
    pub fn successful_results(&self) -> Vec<&Task> {
        let mut results: Vec<&Task> = Vec::new();
        for task in self.tasks().filter(|t| t.is_completed()) {
            match results.iter_mut().find(|r| r.label == task.label) {
                Some(slot) => *slot = task,
                None => results.push(task),
            }
        }
        results
    }

    pub fn failed_tasks(&self) -> Vec<&Task> {
        self.tasks().filter(|t| t.is_failed()).collect()
    }

    /// Concatenation of the successful results, used as the draft answer
    pub fn draft_answer(&self) -> String {
        self.successful_results()
            .iter()
            .filter_map(|t| t.result.as_deref())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// What has been learned so far, for the next planning round
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let completed = self.successful_results();
        if !completed.is_empty() {
            out.push_str("Completed tasks:\n");
            for task in completed {
                let text = task.result.as_deref().unwrap_or_default();
                out.push_str(&format!("- {}: {}\n", task.label, truncate(text, 600)));
            }
        }

        let failed: Vec<&Task> = self
            .failed_tasks()
            .into_iter()
            .filter(|f| !self.successful_results().iter().any(|s| s.label == f.label))
            .collect();
        if !failed.is_empty() {
            out.push_str("Failed tasks:\n");
            for task in failed {
                out.push_str(&format!(
                    "- {} ({})\n",
                    task.label,
                    task.failure.as_deref().unwrap_or("unknown error")
                ));
            }
        }
        out
    }

    fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.plans.iter().flat_map(|p| p.tasks.iter())
    }
}

/// A failed task as reported to the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub label: String,
    pub reason: String,
}

/// The engine's answer to one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalAnswer {
    pub answer: String,
    pub cancelled: bool,
    pub degraded: bool,
    pub sufficient: bool,
    pub budget_exhausted: bool,
    pub iterations: u32,
    /// Sum of task costs, failed attempts included
    pub total_cost: f64,
    /// Reformulation, planning and synthesis calls
    pub overhead_cost: f64,
    pub elapsed_ms: u64,
    pub pages_touched: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub failures: Vec<TaskFailure>,
    pub sources: Vec<PageRef>,
    /// Standalone form of a follow-up question, when it was rewritten
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_query: Option<String>,
}

impl FinalAnswer {
    /// Everything the provider billed for this query
    pub fn billed_cost(&self) -> f64 {
        self.total_cost + self.overhead_cost
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms)
    }
}

/// Cut `text` to at most `max` characters on a char boundary
pub(crate) fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
