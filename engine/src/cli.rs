//! CLI interface for Docia
//!
//! This module provides the command-line interface using clap's derive API.
//! It defines all commands and global flags.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Docia document question answering
///
/// Ask questions about multi-page documents. Pages are read as images by a
/// vision-language model.
#[derive(Parser, Debug)]
#[command(name = "docia")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by `ask` and `chat`
#[derive(clap::Args, Debug, Clone, Default)]
pub struct QueryArgs {
    /// Documents directory (overrides core.documents_dir)
    #[arg(long, value_name = "DIR")]
    pub docs: Option<PathBuf>,

    /// Restrict the query to a document id (repeatable)
    #[arg(long = "doc", value_name = "ID")]
    pub documents: Vec<String>,

    /// Page ceiling per task
    #[arg(long)]
    pub max_pages: Option<usize>,

    /// Iteration ceiling per query
    #[arg(long)]
    pub max_iterations: Option<u32>,

    /// Single iteration, no synthesis call
    #[arg(long)]
    pub fast: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Ask a single question
    Ask {
        /// The question
        question: String,

        #[command(flatten)]
        args: QueryArgs,
    },

    /// Interactive session with conversation memory
    Chat {
        #[command(flatten)]
        args: QueryArgs,
    },

    /// List available documents
    Docs {
        /// Documents directory (overrides core.documents_dir)
        #[arg(long, value_name = "DIR")]
        docs: Option<PathBuf>,
    },
}
