//! Iteration Controller
//!
//! Drives one query through an explicit state machine:
//!
//! ```text
//! Planning -> Executing -> Evaluating -> Done
//!    ^                         |-------> Aborted
//!    |                         v
//!    +------------------- Replanning
//! ```
//!
//! A follow-up question is first rewritten into a standalone one when a
//! reformulator is configured. The iteration counter is ordinary data, so the
//! bound is checked in one place. Tasks of a plan run concurrently on a semaphore-bounded pool and are
//! joined before evaluation; results are applied in plan order.

use crate::conductor::aggregator::{AnswerFlags, Aggregator};
use crate::conductor::executor::{TaskExecutor, CANCELLED_REASON};
use crate::conductor::planner::Planner;
use crate::conductor::reformulator::QueryReformulator;
use crate::conductor::selector::select_pages;
use crate::conductor::types::{
    ConversationTurn, ExecutionTrace, FinalAnswer, PageRef, QueryContext, TaskMetrics, TaskResult,
};
use crate::message_bus::{Event, MessageBus};
use futures::future::join_all;
use sdk::errors::DociaError;
use sdk::Document;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default number of tasks running at once
pub const DEFAULT_WORKER_POOL_WIDTH: usize = 3;

/// States of a single query
#[derive(Debug)]
pub enum QueryState {
    Planning,
    Executing,
    Evaluating,
    Replanning,
    Done,
    Aborted(DociaError),
}

impl QueryState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, QueryState::Done | QueryState::Aborted(_))
    }
}

pub struct IterationController {
    planner: Planner,
    executor: TaskExecutor,
    aggregator: Aggregator,
    reformulator: Option<QueryReformulator>,
    bus: Option<Arc<MessageBus>>,
    worker_pool_width: usize,
}

impl IterationController {
    pub fn new(planner: Planner, executor: TaskExecutor, aggregator: Aggregator) -> Self {
        Self {
            planner,
            executor,
            aggregator,
            reformulator: None,
            bus: None,
            worker_pool_width: DEFAULT_WORKER_POOL_WIDTH,
        }
    }

    pub fn with_bus(mut self, bus: Arc<MessageBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn with_reformulator(mut self, reformulator: QueryReformulator) -> Self {
        self.reformulator = Some(reformulator);
        self
    }

    pub fn with_worker_pool_width(mut self, width: usize) -> Self {
        self.worker_pool_width = width.max(1);
        self
    }

    /// Answer one query over `documents`
    ///
    /// Only `Aborted` produces an error. Cancellation ends in `Done` with the
    /// completed results preserved and `cancelled` set.
    pub async fn run(
        &self,
        context: &QueryContext,
        documents: &[Document],
        conversation: &[ConversationTurn],
        cancel: &CancellationToken,
    ) -> Result<FinalAnswer, DociaError> {
        let started = Instant::now();
        let max_iterations = context.effective_max_iterations();
        let mut trace = ExecutionTrace::new();
        let mut flags = AnswerFlags::default();
        let mut iteration: u32 = 1;
        let mut state = QueryState::Planning;

        let resolved = self
            .resolve_query(context, conversation, &mut trace, cancel)
            .await;
        let mut working = context.clone();
        if let Some(query) = &resolved {
            working.query = query.clone();
        }
        let context = &working;

        info!(
            "Running query over {} document(s), mode {}, max {} iteration(s)",
            documents.len(),
            context.mode,
            max_iterations
        );

        while !state.is_terminal() {
            debug!("Query state: {:?} (iteration {})", state, iteration);
            state = match state {
                QueryState::Planning => {
                    self.plan(
                        &mut trace,
                        context,
                        documents,
                        conversation,
                        iteration,
                        &mut flags,
                        cancel,
                    )
                    .await
                }

                QueryState::Executing => {
                    self.execute_plan(&mut trace, context, documents, conversation, cancel)
                        .await;
                    if cancel.is_cancelled() {
                        flags.cancelled = true;
                        QueryState::Done
                    } else {
                        QueryState::Evaluating
                    }
                }

                QueryState::Evaluating => {
                    let at_ceiling = trace.iterations() >= max_iterations;
                    flags.sufficient = self.aggregator.is_sufficient(&trace, context);
                    if flags.sufficient && !at_ceiling {
                        info!("Answer judged sufficient after {} iteration(s)", iteration);
                        QueryState::Done
                    } else if at_ceiling {
                        flags.budget_exhausted = true;
                        info!("Iteration budget of {} reached", max_iterations);
                        QueryState::Done
                    } else if trace.stalled() {
                        warn!("Two consecutive plans failed entirely, stopping");
                        QueryState::Done
                    } else {
                        QueryState::Replanning
                    }
                }

                QueryState::Replanning => {
                    iteration += 1;
                    self.publish(Event::IterationAdvanced { iteration }).await;
                    QueryState::Planning
                }

                terminal => terminal,
            };
        }

        match state {
            QueryState::Aborted(e) => {
                warn!("Query aborted: {}", e);
                self.publish(Event::QueryFinished {
                    iterations: trace.iterations(),
                    cancelled: false,
                    aborted: true,
                    cost: trace.task_cost() + trace.overhead_cost(),
                })
                .await;
                Err(e)
            }
            _ => {
                let mut answer = self
                    .aggregator
                    .aggregate(&mut trace, context, flags, started)
                    .await;
                answer.resolved_query = resolved;
                info!(
                    "Query finished: {} iteration(s), {} completed, {} failed, ${:.4} billed",
                    answer.iterations,
                    answer.completed_tasks,
                    answer.failed_tasks,
                    answer.billed_cost()
                );
                self.publish(Event::QueryFinished {
                    iterations: answer.iterations,
                    cancelled: answer.cancelled,
                    aborted: false,
                    cost: answer.billed_cost(),
                })
                .await;
                Ok(answer)
            }
        }
    }

    /// Rewrite a follow-up question; `None` when the query stays as asked
    async fn resolve_query(
        &self,
        context: &QueryContext,
        conversation: &[ConversationTurn],
        trace: &mut ExecutionTrace,
        cancel: &CancellationToken,
    ) -> Option<String> {
        let reformulator = self.reformulator.as_ref()?;
        if conversation.is_empty() || cancel.is_cancelled() {
            return None;
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            outcome = reformulator.reformulate(&context.query, conversation) => outcome,
        };
        trace.add_overhead(outcome.cost);
        (outcome.query != context.query).then_some(outcome.query)
    }

    #[allow(clippy::too_many_arguments)]
    async fn plan(
        &self,
        trace: &mut ExecutionTrace,
        context: &QueryContext,
        documents: &[Document],
        conversation: &[ConversationTurn],
        iteration: u32,
        flags: &mut AnswerFlags,
        cancel: &CancellationToken,
    ) -> QueryState {
        if cancel.is_cancelled() {
            flags.cancelled = true;
            return QueryState::Done;
        }

        let summary = (trace.iterations() > 0).then(|| trace.summary());
        let planned = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            outcome = self.planner.plan(
                context,
                documents,
                iteration,
                summary.as_deref(),
                conversation,
            ) => Some(outcome),
        };

        let outcome = match planned {
            None => {
                flags.cancelled = true;
                return QueryState::Done;
            }
            Some(Err(e)) => return QueryState::Aborted(e),
            Some(Ok(outcome)) => outcome,
        };

        trace.add_overhead(outcome.cost);
        let event = Event::PlanCreated {
            plan_id: outcome.plan.id.clone(),
            iteration: outcome.plan.iteration,
            tasks: outcome.plan.tasks.iter().map(|t| t.label.clone()).collect(),
            degraded: outcome.plan.degraded,
        };

        match trace.push_plan(outcome.plan, context.effective_max_iterations()) {
            Ok(()) => {
                self.publish(event).await;
                QueryState::Executing
            }
            Err(e) => {
                // Hard stop: never run a plan past the ceiling
                warn!("{}", e);
                flags.budget_exhausted = true;
                QueryState::Done
            }
        }
    }

    /// Select pages, then run every task of the latest plan on the pool
    async fn execute_plan(
        &self,
        trace: &mut ExecutionTrace,
        context: &QueryContext,
        documents: &[Document],
        conversation: &[ConversationTurn],
        cancel: &CancellationToken,
    ) {
        let prior_pages: Vec<PageRef> = match trace.plans() {
            [.., previous, _] => previous
                .tasks
                .iter()
                .flat_map(|t| t.pages.iter().cloned())
                .collect(),
            _ => Vec::new(),
        };

        let Some(plan) = trace.latest_plan_mut() else {
            return;
        };

        for task in plan.tasks.iter_mut() {
            task.pages = select_pages(task, documents, context.max_pages, &prior_pages);
            task.mark_running();
        }

        let semaphore = Semaphore::new(self.worker_pool_width);
        let semaphore = &semaphore;
        let futures = plan.tasks.iter().map(|task| async move {
            let _permit = match semaphore.acquire().await {
                Ok(permit) => permit,
                Err(_) => {
                    return TaskResult::failed("worker pool closed", TaskMetrics::default());
                }
            };
            if cancel.is_cancelled() {
                return TaskResult::failed(CANCELLED_REASON, TaskMetrics::default());
            }

            self.publish(Event::TaskStarted {
                task_id: task.id.clone(),
                label: task.label.clone(),
                pages: task.pages.len(),
            })
            .await;

            let result = self
                .executor
                .execute(task, &task.pages, &context.query, conversation, cancel)
                .await;

            self.publish(Event::TaskCompleted {
                task_id: task.id.clone(),
                label: task.label.clone(),
                success: result.is_success(),
                cost: result.metrics.cost,
                elapsed_ms: result.metrics.elapsed.as_millis() as u64,
                failure: result.failure.clone(),
            })
            .await;
            result
        });

        let results = join_all(futures).await;

        // Apply results in plan order
        for (task, result) in plan.tasks.iter_mut().zip(results) {
            task.apply_result(result);
        }

        info!(
            "Iteration {}: {}/{} task(s) completed",
            plan.iteration,
            plan.completed_count(),
            plan.tasks.len()
        );
    }

    async fn publish(&self, event: Event) {
        if let Some(bus) = &self.bus {
            bus.publish(event).await;
        }
    }
}
