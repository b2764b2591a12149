//! Conductor Aggregator
//!
//! Decides whether an execution trace already answers the query and merges
//! task results into the final answer with its cost and timing metrics.

use crate::conductor::prompts;
use crate::conductor::selector::{key_terms, term_coverage};
use crate::conductor::types::{
    ExecutionTrace, FinalAnswer, PageRef, QueryContext, QueryMode, TaskFailure,
};
use sdk::{CompletionRequest, ModelClient};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Default minimum share of completed tasks in the latest plan
pub const DEFAULT_MIN_COMPLETION_RATIO: f64 = 0.5;

/// Default minimum share of query key terms the draft answer must mention
pub const DEFAULT_MIN_TERM_COVERAGE: f64 = 0.3;

/// Decides when the controller may stop iterating
///
/// Implementations must be idempotent: the same trace and context always
/// give the same verdict.
pub trait SufficiencyPolicy: Send + Sync {
    fn is_sufficient(&self, trace: &ExecutionTrace, context: &QueryContext) -> bool;
}

/// Threshold-based sufficiency check
#[derive(Debug, Clone, PartialEq)]
pub struct HeuristicSufficiency {
    pub min_completion_ratio: f64,
    pub min_term_coverage: f64,
}

impl Default for HeuristicSufficiency {
    fn default() -> Self {
        Self {
            min_completion_ratio: DEFAULT_MIN_COMPLETION_RATIO,
            min_term_coverage: DEFAULT_MIN_TERM_COVERAGE,
        }
    }
}

impl SufficiencyPolicy for HeuristicSufficiency {
    fn is_sufficient(&self, trace: &ExecutionTrace, context: &QueryContext) -> bool {
        let Some(plan) = trace.latest_plan() else {
            return false;
        };
        if plan.completion_ratio() < self.min_completion_ratio {
            return false;
        }

        let terms = key_terms(&context.query);
        if terms.is_empty() {
            return true;
        }
        term_coverage(&terms, &trace.draft_answer()) >= self.min_term_coverage
    }
}

/// Terminal flags decided by the iteration controller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnswerFlags {
    pub cancelled: bool,
    pub sufficient: bool,
    pub budget_exhausted: bool,
}

pub struct Aggregator {
    client: Arc<dyn ModelClient>,
    policy: Arc<dyn SufficiencyPolicy>,
    max_tokens: Option<u32>,
}

impl Aggregator {
    pub fn new(client: Arc<dyn ModelClient>) -> Self {
        Self {
            client,
            policy: Arc::new(HeuristicSufficiency::default()),
            max_tokens: None,
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn SufficiencyPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn is_sufficient(&self, trace: &ExecutionTrace, context: &QueryContext) -> bool {
        self.policy.is_sufficient(trace, context)
    }

    /// Merge the trace into a final answer
    ///
    /// In comprehensive mode two or more results are synthesized with one
    /// model call, whose cost is added to the trace overhead. Synthesis
    /// failures fall back to plain concatenation.
    pub async fn aggregate(
        &self,
        trace: &mut ExecutionTrace,
        context: &QueryContext,
        flags: AnswerFlags,
        started: Instant,
    ) -> FinalAnswer {
        let results: Vec<(String, String)> = trace
            .successful_results()
            .iter()
            .filter_map(|t| t.result.clone().map(|r| (t.label.clone(), r)))
            .collect();

        let sources: BTreeSet<PageRef> = trace
            .successful_results()
            .iter()
            .flat_map(|t| t.pages.iter().cloned())
            .collect();

        let failures: Vec<TaskFailure> = trace
            .failed_tasks()
            .iter()
            .map(|t| TaskFailure {
                label: t.label.clone(),
                reason: t.failure.clone().unwrap_or_else(|| "unknown error".to_string()),
            })
            .collect();

        let answer = if results.is_empty() {
            no_results_answer(flags.cancelled, &failures)
        } else if results.len() >= 2
            && context.mode == QueryMode::Comprehensive
            && !flags.cancelled
        {
            match self.synthesize(&context.query, &results).await {
                Ok((text, cost)) => {
                    trace.add_overhead(cost);
                    text
                }
                Err(billed) => {
                    trace.add_overhead(billed);
                    concatenate(&results)
                }
            }
        } else {
            concatenate(&results)
        };

        FinalAnswer {
            answer,
            cancelled: flags.cancelled,
            degraded: trace.is_degraded(),
            sufficient: flags.sufficient,
            budget_exhausted: flags.budget_exhausted,
            iterations: trace.iterations(),
            total_cost: trace.task_cost(),
            overhead_cost: trace.overhead_cost(),
            elapsed_ms: started.elapsed().as_millis() as u64,
            pages_touched: trace.pages_touched().len(),
            completed_tasks: trace.completed_count(),
            failed_tasks: trace.failed_count(),
            failures,
            sources: sources.into_iter().collect(),
            resolved_query: None,
        }
    }

    /// One synthesis call. On failure returns the cost billed for it.
    async fn synthesize(&self, query: &str, results: &[(String, String)]) -> Result<(String, f64), f64> {
        let pairs: Vec<(&str, &str)> = results
            .iter()
            .map(|(label, text)| (label.as_str(), text.as_str()))
            .collect();
        let mut request = CompletionRequest::text(prompts::synthesis_prompt(query, &pairs))
            .with_system(prompts::SYSTEM_SYNTHESIS);
        if let Some(max_tokens) = self.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }

        match self.client.complete(&request).await {
            Ok(completion) if !completion.text.trim().is_empty() => {
                debug!("Synthesized {} results", results.len());
                Ok((completion.text, completion.cost))
            }
            Ok(completion) => {
                warn!("Synthesis returned an empty answer, concatenating results");
                Err(completion.cost)
            }
            Err(e) => {
                warn!("Synthesis failed, concatenating results: {}", e);
                Err(e.billed_cost)
            }
        }
    }
}

fn concatenate(results: &[(String, String)]) -> String {
    match results {
        [(_, only)] => only.clone(),
        _ => results
            .iter()
            .map(|(label, text)| format!("## {}\n{}", label, text))
            .collect::<Vec<_>>()
            .join("\n\n"),
    }
}

fn no_results_answer(cancelled: bool, failures: &[TaskFailure]) -> String {
    let mut answer = if cancelled {
        "The query was cancelled before any task completed.".to_string()
    } else {
        "I could not find an answer in the documents.".to_string()
    };
    if !failures.is_empty() {
        answer.push_str("\n\nFailed tasks:");
        for failure in failures {
            answer.push_str(&format!("\n- {}: {}", failure.label, failure.reason));
        }
    }
    answer
}
