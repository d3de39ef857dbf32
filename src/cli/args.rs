//! Command-line argument parsing for ragbuddy
//!
//! Provides clap-based CLI with subcommands and verbosity control.

use crate::cli::config::Config;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ragbuddy - plan, retrieve and answer questions about the AWS RAG guide
#[derive(Parser, Debug)]
#[command(name = "ragbuddy")]
#[command(author = "Jerome (Kubashen) Naidoo")]
#[command(version)]
#[command(about = "Two-stage grounded RAG agent: a planner decomposes, a synthesizer answers with citations", long_about = None)]
pub struct Args {
    /// Question to answer (prompted for when omitted)
    #[arg(value_name = "QUERY")]
    pub query: Option<String>,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Chat model override
    #[arg(short, long)]
    pub model: Option<String>,

    /// Source document ingested when the collection is missing
    #[arg(long)]
    pub document: Option<PathBuf>,

    /// Never ingest before answering
    #[arg(long)]
    pub skip_ingest: bool,

    /// Verbosity level: -q (quiet), default (normal), -v (verbose), -vv (very verbose)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress all output except final result)
    #[arg(short, long)]
    pub quiet: bool,

    /// Print the full pipeline outcome as JSON
    #[arg(long)]
    pub json: bool,

    /// Subcommand
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Load, chunk, embed and store the source document
    Ingest {
        /// Drop and rebuild the collection even if it exists
        #[arg(long)]
        force: bool,

        /// Document to ingest (defaults to the configured source document)
        #[arg(value_name = "PATH")]
        path: Option<PathBuf>,
    },

    /// Display current configuration
    Config,
}

/// Verbosity level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    VeryVerbose,
}

impl Args {
    /// Get verbosity level based on flags
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::VeryVerbose,
            }
        }
    }

    /// Check flag combinations clap cannot express
    pub fn validate(&self) -> Result<(), String> {
        if self.command.is_some() && self.query.is_some() {
            return Err("Cannot specify a query with a subcommand.".to_string());
        }

        if let Some(query) = &self.query {
            if query.trim().is_empty() {
                return Err("Query must not be empty.".to_string());
            }
        }

        Ok(())
    }

    /// Fold command-line overrides into the loaded configuration
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(model) = &self.model {
            config.llm.model = model.clone();
        }

        if let Some(document) = &self.document {
            config.retrieval.source_document = document.clone();
        }

        config.logging.level = self.verbosity().log_level(&config.logging.level).to_string();
    }
}

impl Verbosity {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "quiet",
            Verbosity::Normal => "normal",
            Verbosity::Verbose => "verbose",
            Verbosity::VeryVerbose => "very_verbose",
        }
    }

    /// Log level for this verbosity, `configured` being the normal level
    pub fn log_level<'a>(&self, configured: &'a str) -> &'a str {
        match self {
            Verbosity::Quiet => "warn",
            Verbosity::Normal => configured,
            Verbosity::Verbose => "debug",
            Verbosity::VeryVerbose => "trace",
        }
    }

    /// Check if should show the progress spinner
    pub fn show_progress(&self) -> bool {
        !matches!(self, Verbosity::Quiet)
    }

    /// Check if should show the trace and plan
    pub fn show_trace(&self) -> bool {
        !matches!(self, Verbosity::Quiet)
    }

    /// Check if should show event timestamps
    pub fn show_timestamps(&self) -> bool {
        matches!(self, Verbosity::Verbose | Verbosity::VeryVerbose)
    }
}
