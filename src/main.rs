//! ragbuddy - two-stage grounded RAG agent
//!
//! Main entry point

use anyhow::{Context, Result};
use clap::Parser;
use ragbuddy::agent::{Orchestrator, PipelineOutcome};
use ragbuddy::cli::{Args, Commands, Config};
use ragbuddy::display::TerminalDisplay;
use ragbuddy::ingest::Ingestor;
use ragbuddy::retrieval::{EmbeddingEngine, SearchParams, VectorRetriever, VectorStore};
use ragbuddy::telemetry::init_logging;
use ragbuddy::PipelineError;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

const EXIT_PIPELINE_ERROR: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_INTERRUPTED: u8 = 130;

const QUERY_PROMPT: &str = "enter query: ";

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            if is_configuration_error(&e) {
                ExitCode::from(EXIT_CONFIG_ERROR)
            } else {
                ExitCode::from(EXIT_PIPELINE_ERROR)
            }
        }
    }
}

fn is_configuration_error(error: &anyhow::Error) -> bool {
    error
        .chain()
        .any(|cause| matches!(cause.downcast_ref::<PipelineError>(), Some(e) if e.is_configuration()))
}

async fn run(args: Args) -> Result<ExitCode> {
    if let Err(msg) = args.validate() {
        eprintln!("{}", msg);
        return Ok(ExitCode::from(EXIT_CONFIG_ERROR));
    }

    dotenvy::dotenv().ok();

    let mut config = Config::load(args.config.as_deref())?;
    args.apply_overrides(&mut config);
    config.validate()?;

    init_logging(&config.logging.level, config.logging.file.as_deref())?;
    tracing::debug!(verbosity = args.verbosity().as_str(), "Configuration loaded");

    let display = TerminalDisplay::new(args.verbosity());

    match &args.command {
        Some(Commands::Config) => {
            print!("{}", config.to_toml()?);
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Ingest { force, path }) => {
            let path = path.clone().unwrap_or_else(|| config.retrieval.source_document.clone());
            run_ingest(&config, &display, &path, *force).await?;
            Ok(ExitCode::SUCCESS)
        }
        None => answer_query(&args, &config, &display).await,
    }
}

/// Embedding model and vector store shared by ingestion and retrieval
struct RetrievalBackend {
    store: Arc<VectorStore>,
    embedder: Arc<EmbeddingEngine>,
}

impl RetrievalBackend {
    async fn connect(config: &Config) -> Result<Self> {
        let store = VectorStore::connect(&config.retrieval.qdrant_url, &config.retrieval.collection)?;

        tracing::info!("Loading embedding model");
        let embedder = tokio::task::spawn_blocking(EmbeddingEngine::new)
            .await
            .context("Embedding model loader panicked")??;

        Ok(Self {
            store: Arc::new(store),
            embedder: Arc::new(embedder),
        })
    }

    fn ingestor(&self) -> Ingestor {
        Ingestor::new(self.store.clone(), self.embedder.clone())
    }

    fn retriever(&self, config: &Config) -> VectorRetriever {
        VectorRetriever::new(
            self.store.clone(),
            self.embedder.clone(),
            SearchParams::from(&config.retrieval),
        )
    }
}

async fn run_ingest(config: &Config, display: &TerminalDisplay, path: &Path, force: bool) -> Result<()> {
    let backend = RetrievalBackend::connect(config).await?;
    let ingestor = backend.ingestor();

    let spinner = display.start_spinner(&format!("Ingesting {}", path.display()));
    let result = if force {
        ingestor.reingest(path).await.map(Some)
    } else {
        ingestor.ingest_if_missing(path).await
    };
    spinner.finish_and_clear();

    match result? {
        Some(report) => display.show_ingest(&report),
        None => println!(
            "Collection '{}' already exists; use --force to rebuild it.",
            config.retrieval.collection
        ),
    }
    Ok(())
}

async fn answer_query(args: &Args, config: &Config, display: &TerminalDisplay) -> Result<ExitCode> {
    // Fail on a missing API key before the slow model load and ingestion
    config.credentials()?;

    let backend = RetrievalBackend::connect(config).await?;

    if !args.skip_ingest {
        let spinner = display.start_spinner("Checking vector collection");
        let ingested = backend
            .ingestor()
            .ingest_if_missing(&config.retrieval.source_document)
            .await;
        spinner.finish_and_clear();

        if let Some(report) = ingested? {
            display.show_ingest(&report);
        }
    }

    let orchestrator = Orchestrator::from_config(config, Arc::new(backend.retriever(config)))?;

    let query = match &args.query {
        Some(q) => q.clone(),
        None => match read_query()? {
            Some(q) => q,
            None => {
                display.show_interrupted();
                return Ok(ExitCode::from(EXIT_INTERRUPTED));
            }
        },
    };

    if query.trim().is_empty() {
        eprintln!("No query entered.");
        return Ok(ExitCode::from(EXIT_CONFIG_ERROR));
    }

    display.show_start();
    let spinner = display.start_spinner("Planning and synthesizing");

    let outcome = tokio::select! {
        outcome = orchestrator.run(&query) => outcome,
        _ = tokio::signal::ctrl_c() => {
            spinner.finish_and_clear();
            tracing::debug!("Run cancelled by user");
            display.show_interrupted();
            return Ok(ExitCode::from(EXIT_INTERRUPTED));
        }
    };
    spinner.finish_and_clear();

    report(args, display, &outcome)
}

/// Prompt on stdin; `None` when the user interrupts or closes input
fn read_query() -> Result<Option<String>> {
    let mut editor = DefaultEditor::new().context("Failed to initialize line editor")?;
    match editor.readline(QUERY_PROMPT) {
        Ok(line) => Ok(Some(line.trim().to_string())),
        Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => Ok(None),
        Err(e) => Err(e).context("Failed to read query"),
    }
}

fn report(args: &Args, display: &TerminalDisplay, outcome: &PipelineOutcome) -> Result<ExitCode> {
    if args.json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
    } else {
        display.show_outcome(outcome);
    }

    if outcome.is_success() {
        Ok(ExitCode::SUCCESS)
    } else if outcome.error.as_ref().is_some_and(|e| e.is_configuration()) {
        Ok(ExitCode::from(EXIT_CONFIG_ERROR))
    } else {
        Ok(ExitCode::from(EXIT_PIPELINE_ERROR))
    }
}
