//! Prompt templates for reformulation, planning, page analysis and synthesis

use crate::conductor::types::{truncate, ConversationTurn, Task, TaskKind};
use sdk::Document;

pub const SYSTEM_ANALYST: &str = "You are Docia, an assistant that helps users understand their \
documents. You are shown document pages as images. Analyze them carefully, answer only from what \
you see, and cite the document pages you rely on.";

pub const SYSTEM_PLANNER: &str = "You are an adaptive task planning agent for document analysis. \
You are pragmatic and efficient: you create only the tasks needed to answer the user's query. \
Always respond with valid JSON.";

pub const SYSTEM_REFORMULATOR: &str = "You are a query reformulation expert. Always respond \
with valid JSON.";

pub const SYSTEM_SYNTHESIS: &str = "You are Docia, an expert at combining several document \
analysis findings into one coherent answer that addresses every part of the user's query.";

/// Characters of each prior turn shown to the page analysis model
const TURN_EXCERPT_CHARS: usize = 100;

const TEXT_GUIDELINES: &str = "FOCUS ON GENERAL TEXT CONTENT:
- Read the text for meaning and context
- Extract key facts, figures, dates and names
- Answer the task directly and completely";

const TABLE_GUIDELINES: &str = "FOCUS ON STRUCTURED TABLE DATA:
- Read headers and captions first, then go row by row
- Extract all numerical values, percentages, dates, currency amounts and units
- Keep each value attached to its row and column
- Note totals, subtotals and footnotes";

const CHART_GUIDELINES: &str = "FOCUS ON CHART AND GRAPH ANALYSIS:
- Identify the chart type, axes, scales and units
- Read legends, data labels and annotations
- Describe trends, comparisons and outliers
- Extract specific values when they are visible";

const GENERIC_GUIDELINES: &str = "FOCUS ON VISUAL CONTENT AND DIAGRAMS:
- Describe the overall structure and layout
- Explain labels, annotations and legends
- Capture relationships, flows and sequences between elements
- Include any text that answers the task";

/// Analysis guidelines for a task kind
pub fn guidelines(kind: TaskKind) -> &'static str {
    match kind {
        TaskKind::TextExtraction => TEXT_GUIDELINES,
        TaskKind::Table => TABLE_GUIDELINES,
        TaskKind::Chart => CHART_GUIDELINES,
        TaskKind::Generic => GENERIC_GUIDELINES,
    }
}

/// Document listing shown to the planner
pub fn describe_documents(documents: &[Document]) -> String {
    documents
        .iter()
        .map(|doc| {
            let summary = doc
                .summary
                .as_deref()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or("No summary available");
            format!(
                "{}: {} ({} pages, {})\nSummary: {}",
                doc.id,
                doc.name,
                doc.page_count(),
                doc.format,
                summary
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Prior turns rendered for prompt context
pub fn describe_conversation(turns: &[ConversationTurn]) -> String {
    turns
        .iter()
        .map(|turn| format!("User: {}\nAssistant: {}", turn.query, turn.answer))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Short conversation context for page analysis
///
/// Each side of a turn is cut to a brief excerpt; the planner already used
/// the full turns.
pub fn conversation_context(turns: &[ConversationTurn]) -> String {
    if turns.is_empty() {
        return "CONVERSATION CONTEXT: first question of this session.".to_string();
    }
    let mut lines = vec!["CONVERSATION CONTEXT:".to_string()];
    for turn in turns {
        lines.push(format!("- User: {}", truncate(&turn.query, TURN_EXCERPT_CHARS)));
        lines.push(format!(
            "- Assistant: {}",
            truncate(&turn.answer, TURN_EXCERPT_CHARS)
        ));
    }
    lines.join("\n")
}

/// Request to rewrite a follow-up question into a standalone one
pub fn reformulation_prompt(query: &str, conversation: &[ConversationTurn]) -> String {
    format!(
        "Resolve references in the current query so it can be used for document search on \
its own.

Create a reformulated query that:
1. Replaces pronouns such as \"it\", \"this\" or \"that\" with their subjects from the conversation
2. Stays short and keeps only the intent of the current question
3. Does not merge earlier questions into it
4. Is returned unchanged when it is already clear and specific

EXAMPLES:
Context: User asked about \"machine learning model performance\"
Current: \"What about its accuracy?\"
Output: {{\"reformulated_query\": \"What is the machine learning model accuracy?\"}}

Current: \"Tell me more about the benefits\"
Output: {{\"reformulated_query\": \"Tell me more about the benefits\"}}

----------------
CONVERSATION SO FAR:
{conversation}

CURRENT QUERY: {query}
----------------
Return only a JSON object {{\"reformulated_query\": \"...\"}}, with no other text and no code fences.",
        conversation = describe_conversation(conversation),
    )
}

/// Planning request for one iteration
pub fn planning_prompt(
    query: &str,
    documents: &[Document],
    conversation: &[ConversationTurn],
    prior_summary: Option<&str>,
    max_tasks: usize,
) -> String {
    let mut prompt = format!(
        "Create a task plan for a document analysis query. Use the MINIMUM number of tasks \
(at most {max_tasks}) needed to gather distinct information that answers the question.

RULES:
1. Only create several tasks when they need fundamentally different information
2. Keep task names short and clear
3. Each description states exactly what information to retrieve
4. Pick the single most relevant document id for each task
5. Do not mention the document name in a task's name or description

INFORMATION TYPES:
- \"basic\": text content, descriptions, policies, procedures
- \"table\": structured data, numerical values, financial statements
- \"chart\": graphs, plots, trends, comparisons
- \"image\": diagrams, flowcharts, illustrations

OUTPUT FORMAT:
{{\"tasks\": [{{\"name\": \"...\", \"description\": \"...\", \"document\": \"doc_id\", \"information_type\": \"basic\"}}]}}
"
    );

    if !conversation.is_empty() {
        prompt.push_str("\nCONVERSATION SO FAR:\n");
        prompt.push_str(&describe_conversation(conversation));
        prompt.push('\n');
    }

    if let Some(summary) = prior_summary.filter(|s| !s.trim().is_empty()) {
        prompt.push_str(
            "\nPREVIOUS ROUND:\nThe findings below were not enough to answer the question. \
Plan only the tasks still needed; do not repeat completed tasks.\n",
        );
        prompt.push_str(summary);
        prompt.push('\n');
    }

    prompt.push_str(&format!(
        "\n----------------\nUser's query: {}\n\nAVAILABLE DOCUMENTS:\n{}\n----------------\n\
Output only valid JSON, with no other text and no code fences.",
        query,
        describe_documents(documents)
    ));
    prompt
}

/// Appended after output the planner could not parse
pub fn planning_correction(previous_output: &str, error: &str) -> String {
    format!(
        "\n\nYour previous answer could not be used ({}):\n{}\n\n\
Respond again with ONLY a JSON object of the form {{\"tasks\": [...]}} as described above.",
        error,
        truncate(previous_output, 400)
    )
}

/// Analysis request for one task over its pages
pub fn task_prompt(task: &Task, query: &str, conversation: &[ConversationTurn]) -> String {
    let pages = task
        .pages
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "You are analyzing specific document pages to complete one focused task of a larger \
analysis.

ORIGINAL QUESTION: {query}
CURRENT TASK: {label}: {description}
INFORMATION TYPE: {kind}
PAGES (in the order shown): {pages}

{context}

ANALYSIS GUIDELINES:
{guidelines}

IMPORTANT:
- Stay focused on this task; other tasks cover the rest of the question
- Be thorough but concise
- Cite the pages you reference
- If the pages do not contain the information, say so plainly",
        label = task.label,
        description = task.description,
        kind = task.kind,
        guidelines = guidelines(task.kind),
        context = conversation_context(conversation),
    )
}

/// Synthesis request combining task results into one answer
pub fn synthesis_prompt(query: &str, results: &[(&str, &str)]) -> String {
    let results_text = results
        .iter()
        .map(|(label, text)| format!("## {}\n{}", label, text))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "Answer the user's question using only the analysis results below.

ORIGINAL USER QUERY: {query}

ANALYSIS RESULTS:
{results_text}

INSTRUCTIONS:
- Answer only what the user asked
- Use only information from the analysis results
- Be direct and concise
- If the results do not contain enough information, say so clearly

Answer the user's question now."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conductor::types::PageRef;
    use sdk::Page;

    #[test]
    fn test_planning_prompt_includes_context() {
        let docs = vec![Document::new("doc_1", "Q3 Report", vec![Page::new(1, "a")])
            .with_summary("Quarterly financials")];
        let turns = vec![ConversationTurn::new("Who is CEO?", "Ann Lee", 0.0)];

        let prompt = planning_prompt("What was revenue?", &docs, &turns, Some("- rev: unknown"), 4);
        assert!(prompt.contains("at most 4"));
        assert!(prompt.contains("doc_1: Q3 Report (1 pages, other)"));
        assert!(prompt.contains("Summary: Quarterly financials"));
        assert!(prompt.contains("Assistant: Ann Lee"));
        assert!(prompt.contains("PREVIOUS ROUND"));
        assert!(prompt.contains("User's query: What was revenue?"));
    }

    #[test]
    fn test_planning_prompt_skips_empty_sections() {
        let docs = vec![Document::new("d", "Doc", vec![])];
        let prompt = planning_prompt("q", &docs, &[], None, 2);
        assert!(!prompt.contains("CONVERSATION SO FAR"));
        assert!(!prompt.contains("PREVIOUS ROUND"));
        assert!(prompt.contains("No summary available"));
    }

    #[test]
    fn test_task_prompt_uses_kind_guidelines() {
        let mut task = Task::new("t1", "Revenue table", "Quarterly revenue", TaskKind::Table);
        task.pages = vec![PageRef::new("doc_1", 3)];
        let prompt = task_prompt(&task, "What was revenue?", &[]);
        assert!(prompt.contains("TABLE DATA"));
        assert!(prompt.contains("first question of this session"));
        assert!(prompt.contains("doc_1 p.3"));
        assert!(prompt.contains("INFORMATION TYPE: table"));
    }

    #[test]
    fn test_task_prompt_carries_conversation_excerpts() {
        let task = Task::new("t1", "Accuracy", "Model accuracy", TaskKind::Generic);
        let long_answer = "x".repeat(300);
        let turns = vec![ConversationTurn::new(
            "How does the model perform?",
            long_answer.as_str(),
            0.0,
        )];

        let prompt = task_prompt(&task, "What about its accuracy?", &turns);
        assert!(prompt.contains("CONVERSATION CONTEXT:"));
        assert!(prompt.contains("- User: How does the model perform?"));
        assert!(!prompt.contains(&long_answer));
    }

    #[test]
    fn test_reformulation_prompt_shows_turns_and_query() {
        let turns = vec![ConversationTurn::new("Summarize the 2023 report", "It covers...", 0.0)];
        let prompt = reformulation_prompt("Compare it with last year", &turns);
        assert!(prompt.contains("User: Summarize the 2023 report"));
        assert!(prompt.contains("CURRENT QUERY: Compare it with last year"));
        assert!(prompt.contains("reformulated_query"));
    }

    #[test]
    fn test_synthesis_prompt_lists_results() {
        let prompt = synthesis_prompt("q", &[("A", "one"), ("B", "two")]);
        assert!(prompt.contains("## A\none"));
        assert!(prompt.contains("## B\ntwo"));
    }
}
