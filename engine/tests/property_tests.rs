mod common;

use common::*;
use docia_engine::conductor::{
    ConversationMemory, ConversationTurn, ExecutionTrace, Plan, Planner, QueryContext,
};
use docia_engine::config::Config;
use proptest::prelude::*;
use sdk::ModelClient;
use std::sync::Arc;

proptest! {
    #[test]
    fn test_config_parsing_round_trip(
        log_level in "error|warn|info|debug|trace",
        provider in "openai|openrouter",
        max_pages in 1usize..50,
        max_iterations in 1u32..20,
        max_tasks in 1usize..10,
        ratio in 0.0..=1.0f64,
    ) {
        let mut config = Config::default();
        config.core.log_level = log_level.clone();
        config.llm.provider = provider.clone();
        config.query.max_pages = max_pages;
        config.query.max_iterations = max_iterations;
        config.planner.max_tasks = max_tasks;
        config.sufficiency.min_completion_ratio = ratio;

        let serialized = toml::to_string(&config).unwrap();
        let mut parsed: Config = toml::from_str(&serialized).unwrap();
        prop_assert!(parsed.validate_and_process().is_ok());

        prop_assert_eq!(parsed.core.log_level, log_level);
        prop_assert_eq!(parsed.llm.provider, provider);
        prop_assert_eq!(parsed.query.max_pages, max_pages);
        prop_assert_eq!(parsed.query.max_iterations, max_iterations);
        prop_assert_eq!(parsed.planner.max_tasks, max_tasks);
        prop_assert!((parsed.sufficiency.min_completion_ratio - ratio).abs() < 1e-12);
    }

    #[test]
    fn test_memory_never_exceeds_capacity(
        capacity in 0usize..10,
        queries in proptest::collection::vec("[a-z]{1,12}", 0..30),
    ) {
        let mut memory = ConversationMemory::new(capacity);
        for q in &queries {
            memory.record(ConversationTurn::new(q.clone(), "answer", 0.0));
        }

        prop_assert!(memory.len() <= capacity.max(1));
        let kept: Vec<String> = memory.turns().into_iter().map(|t| t.query).collect();
        let expected: Vec<String> = queries
            .iter()
            .rev()
            .take(capacity.max(1))
            .rev()
            .cloned()
            .collect();
        prop_assert_eq!(kept, expected);
    }

    #[test]
    fn test_trace_never_grows_past_ceiling(max_iterations in 1u32..8, attempts in 0u32..16) {
        let mut trace = ExecutionTrace::new();
        for i in 0..attempts {
            let _ = trace.push_plan(Plan::new("q", i + 1, Vec::new(), false), max_iterations);
        }
        prop_assert_eq!(trace.iterations(), attempts.min(max_iterations));
    }

    #[test]
    fn test_any_planner_output_yields_bounded_nonempty_plan(
        output in prop_oneof![
            ".{0,80}",
            proptest::collection::vec("[A-Za-z ]{0,12}", 0..8).prop_map(|names| {
                let tasks: Vec<serde_json::Value> = names
                    .iter()
                    .map(|n| serde_json::json!({ "name": n, "document": "doc_1" }))
                    .collect();
                serde_json::json!({ "tasks": tasks }).to_string()
            }),
        ],
        max_tasks in 1usize..5,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let client: Arc<dyn ModelClient> = Arc::new(ScriptedModelClient::new().with_plan(&output));
        let planner = Planner::new(client).with_max_tasks(max_tasks);
        let documents = vec![document("doc_1", "Report", 3)];

        let outcome = runtime
            .block_on(planner.plan(&QueryContext::new("What is the revenue?"), &documents, 1, None, &[]))
            .unwrap();

        let tasks = &outcome.plan.tasks;
        prop_assert!(!tasks.is_empty());
        prop_assert!(tasks.len() <= max_tasks);
        if outcome.plan.degraded {
            prop_assert_eq!(tasks.len(), 1);
        }
        let mut labels: Vec<&str> = tasks.iter().map(|t| t.label.as_str()).collect();
        labels.sort();
        labels.dedup();
        prop_assert_eq!(labels.len(), tasks.len());
    }
}
