//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - ask: Answer a single question
//! - chat: Line-oriented session with conversation memory
//! - docs: List available documents

use anyhow::{Context, Result};
use sdk::errors::{DociaError, DociaErrorExt};
use serde_json::json;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::cli::QueryArgs;
use crate::conductor::{FinalAnswer, QueryContext, QueryMode};
use crate::config::Config;
use crate::llm::OpenAICompatibleClient;
use crate::message_bus::{Event, EventType, MessageBus};
use crate::session::Session;
use crate::store::DirectoryDocumentStore;
use sdk::DocumentStore;

/// Output format for command results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Answer a single question
pub async fn handle_ask(
    question: String,
    args: QueryArgs,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let (mut session, mut events) = build_session(config, &args, format).await?;
    let context = query_context(config, &args, question);

    match run_with_progress(&mut session, context, events.as_mut()).await {
        Ok(answer) => print_answer(&answer, format),
        Err(e) => {
            print_error(&e, format)?;
            Err(e.into())
        }
    }
}

/// Interactive session: one question per line
///
/// `/history` shows remembered turns, `/clear` forgets them, `/exit` quits.
/// Ctrl-C cancels the running query without leaving the session.
pub async fn handle_chat(args: QueryArgs, config: &Config, format: OutputFormat) -> Result<()> {
    let (mut session, mut events) = build_session(config, &args, format).await?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    if format == OutputFormat::Text {
        println!("Docia chat. Commands: /history, /clear, /exit");
    }

    loop {
        if format == OutputFormat::Text {
            print!("> ");
            std::io::stdout().flush()?;
        }
        let Some(line) = lines.next_line().await.context("Failed to read input")? else {
            break;
        };
        let line = line.trim();

        match line {
            "" => continue,
            "/exit" | "/quit" => break,
            "/clear" => {
                session.clear_conversation();
                if format == OutputFormat::Text {
                    println!("Conversation cleared.");
                }
            }
            "/history" => print_history(&session, format)?,
            question => {
                let context = query_context(config, &args, question.to_string());
                match run_with_progress(&mut session, context, events.as_mut()).await {
                    Ok(answer) => print_answer(&answer, format)?,
                    Err(e) => print_error(&e, format)?,
                }
            }
        }
    }
    Ok(())
}

/// List documents in the documents directory
pub async fn handle_docs(docs: Option<PathBuf>, config: &Config, format: OutputFormat) -> Result<()> {
    let root = docs.unwrap_or_else(|| config.core.documents_dir.clone());
    let store = DirectoryDocumentStore::new(&root);
    let documents = store
        .get_documents(None)
        .await
        .context("Failed to read documents")?;

    match format {
        OutputFormat::Text => {
            if documents.is_empty() {
                println!("No documents in {}", root.display());
                return Ok(());
            }
            println!("Documents in {}:", root.display());
            for doc in &documents {
                println!(
                    "  {:<24} {:<32} {:>4} pages  {}",
                    doc.id,
                    doc.name,
                    doc.page_count(),
                    doc.format
                );
                if let Some(summary) = &doc.summary {
                    println!("  {:<24} {}", "", summary);
                }
            }
        }
        OutputFormat::Json => {
            let output: Vec<_> = documents
                .iter()
                .map(|doc| {
                    json!({
                        "id": doc.id,
                        "name": doc.name,
                        "pages": doc.page_count(),
                        "format": doc.format,
                        "summary": doc.summary,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

async fn build_session(
    config: &Config,
    args: &QueryArgs,
    format: OutputFormat,
) -> Result<(Session, Option<mpsc::Receiver<Event>>)> {
    let root = args
        .docs
        .clone()
        .unwrap_or_else(|| config.core.documents_dir.clone());
    let store = Arc::new(DirectoryDocumentStore::new(root));

    let client = OpenAICompatibleClient::from_config(&config.llm)
        .context("Failed to set up the model provider")?;

    // Progress goes to stderr in text mode only
    let (bus, events) = if format == OutputFormat::Text {
        let bus = Arc::new(MessageBus::new());
        let events = bus.subscribe(EventType::All).await;
        (Some(bus), Some(events))
    } else {
        (None, None)
    };

    let session = Session::from_config(config, Arc::new(client), store, bus);
    Ok((session, events))
}

fn query_context(config: &Config, args: &QueryArgs, question: String) -> QueryContext {
    let mut context = config.query_context(question);
    if !args.documents.is_empty() {
        context = context.with_documents(args.documents.clone());
    }
    if let Some(max_pages) = args.max_pages {
        context = context.with_max_pages(max_pages);
    }
    if let Some(max_iterations) = args.max_iterations {
        context = context.with_max_iterations(max_iterations);
    }
    if args.fast {
        context = context.with_mode(QueryMode::Fast);
    }
    context
}

/// Run one query, printing progress events and cancelling on Ctrl-C
async fn run_with_progress(
    session: &mut Session,
    context: QueryContext,
    mut events: Option<&mut mpsc::Receiver<Event>>,
) -> std::result::Result<FinalAnswer, DociaError> {
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    eprintln!("\nCancelling...");
                    cancel.cancel();
                }
                _ = cancel.cancelled() => {}
            }
        })
    };

    let query = session.run_query(context, &cancel);
    tokio::pin!(query);

    let result = loop {
        match events.as_deref_mut() {
            Some(rx) => {
                tokio::select! {
                    result = &mut query => break result,
                    Some(event) = rx.recv() => print_event(&event),
                }
            }
            None => break (&mut query).await,
        }
    };

    if let Some(rx) = events {
        while let Ok(event) = rx.try_recv() {
            print_event(&event);
        }
    }
    watcher.abort();
    result
}

fn print_event(event: &Event) {
    match event {
        Event::PlanCreated {
            iteration,
            tasks,
            degraded,
            ..
        } => {
            let note = if *degraded { " (fallback plan)" } else { "" };
            eprintln!("Iteration {}: {} task(s){}", iteration, tasks.len(), note);
        }
        Event::TaskStarted { label, pages, .. } => {
            eprintln!("  → {} ({} page(s))", label, pages);
        }
        Event::TaskCompleted {
            label,
            success,
            elapsed_ms,
            failure,
            ..
        } => {
            if *success {
                eprintln!("  ✓ {} ({}ms)", label, elapsed_ms);
            } else {
                eprintln!(
                    "  ✗ {}: {}",
                    label,
                    failure.as_deref().unwrap_or("failed")
                );
            }
        }
        Event::IterationAdvanced { iteration } => {
            eprintln!("Refining answer (iteration {})", iteration);
        }
        Event::QueryFinished { .. } => {}
    }
}

fn print_answer(answer: &FinalAnswer, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            if let Some(resolved) = &answer.resolved_query {
                eprintln!("Interpreted as: {}", resolved);
            }
            println!();
            println!("{}", answer.answer);
            println!();
            if !answer.sources.is_empty() {
                let sources: Vec<String> = answer.sources.iter().map(|s| s.to_string()).collect();
                println!("Sources: {}", sources.join(", "));
            }
            println!(
                "{} iteration(s), {} completed, {} failed, {} page(s), ${:.4}, {:.1}s",
                answer.iterations,
                answer.completed_tasks,
                answer.failed_tasks,
                answer.pages_touched,
                answer.billed_cost(),
                answer.elapsed().as_secs_f64()
            );
            let mut notes = Vec::new();
            if answer.cancelled {
                notes.push("cancelled");
            }
            if answer.degraded {
                notes.push("fallback plan used");
            }
            if answer.budget_exhausted && !answer.sufficient {
                notes.push("iteration budget exhausted");
            }
            if !notes.is_empty() {
                println!("Note: {}", notes.join("; "));
            }
        }
        OutputFormat::Json => {
            let mut output = serde_json::to_value(answer)?;
            output["billed_cost"] = json!(answer.billed_cost());
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

fn print_history(session: &Session, format: OutputFormat) -> Result<()> {
    let turns = session.conversation();
    match format {
        OutputFormat::Text => {
            if turns.is_empty() {
                println!("No conversation yet.");
            }
            for (i, turn) in turns.iter().enumerate() {
                println!(
                    "[{}] {} ({})",
                    i + 1,
                    turn.query,
                    turn.timestamp.format("%H:%M:%S")
                );
                println!("    {}", turn.answer.lines().next().unwrap_or_default());
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&turns)?),
    }
    Ok(())
}

fn print_error(error: &DociaError, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            eprintln!("✗ {}", error);
            eprintln!("  Hint: {}", error.user_hint());
        }
        OutputFormat::Json => {
            let output = json!({
                "status": "failed",
                "error": error.to_string(),
                "hint": error.user_hint(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}
