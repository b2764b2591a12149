//! Conductor System
//!
//! Adaptive query planning and execution: plans a query into tasks, picks
//! pages for each task, runs them against the vision model, and decides
//! whether another round is needed.

pub mod aggregator;
pub mod controller;
pub mod executor;
pub mod memory;
pub mod planner;
pub mod prompts;
pub mod reformulator;
pub mod selector;
pub mod types;

pub use aggregator::{Aggregator, AnswerFlags, HeuristicSufficiency, SufficiencyPolicy};
pub use controller::{IterationController, QueryState};
pub use executor::{RetryPolicy, TaskExecutor};
pub use memory::ConversationMemory;
pub use planner::{PlanOutcome, Planner};
pub use reformulator::{QueryReformulator, Reformulation};
pub use selector::select_pages;
pub use types::{
    ConversationTurn, ExecutionTrace, FinalAnswer, PageRef, Plan, QueryContext, QueryMode, Task,
    TaskFailure, TaskKind, TaskMetrics, TaskResult, TaskStatus,
};
