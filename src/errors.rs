//! Error types for ragbuddy
//!
//! One error enum for the whole pipeline. Variants follow the failure
//! taxonomy of the orchestrator: configuration problems are fatal before a
//! query is accepted, schema failures stop the pipeline before synthesis,
//! soft tool failures degrade to a refusal, everything else is re-raised
//! per stage.

use crate::planner::schema::FieldError;
use thiserror::Error;

/// Main error type for the planning/synthesis pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Missing credential or malformed configuration (fatal, pre-flight)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Planner output did not match the plan schema
    #[error("Plan schema validation failed: {}", format_field_errors(.errors))]
    SchemaValidation { errors: Vec<FieldError> },

    /// Retrieval tool failed softly; the synthesizer degrades to a refusal
    #[error("Retrieval tool failed: {0}")]
    ToolInvocation(String),

    /// Hard infrastructure failure (vector store unreachable, ...)
    #[error("Infrastructure error: {0}")]
    Infrastructure(String),

    /// Language model API errors
    #[error("Language model API error: {0}")]
    Backend(String),

    /// Unexpected failure inside a stage, re-raised with the stage name
    #[error("{stage} stage failed: {message}")]
    Stage { stage: String, message: String },

    /// State machine transition errors
    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },

    /// Timeout errors
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Pipeline interrupted before reaching a terminal state
    #[error("Pipeline cancelled before completion")]
    Cancelled,

    /// HTTP client errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("Pipeline error: {0}")]
    Generic(String),
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    /// Whether the orchestrator's retry policy may re-run the failed stage
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::Timeout { .. } => true,
            PipelineError::Http(_) => true,
            PipelineError::Backend(_) => true,
            PipelineError::SchemaValidation { .. } => true,

            PipelineError::Configuration(_) => false,
            PipelineError::InvalidTransition { .. } => false,
            PipelineError::Infrastructure(_) => false,
            PipelineError::Cancelled => false,

            _ => false,
        }
    }

    /// Whether this error must abort the process before any query is read
    pub fn is_configuration(&self) -> bool {
        matches!(self, PipelineError::Configuration(_))
    }

    /// Wrap an unexpected error as a stage-specific fatal error.
    ///
    /// Errors that already carry a taxonomy meaning pass through unchanged.
    pub fn in_stage(self, stage: &str) -> Self {
        match self {
            PipelineError::Generic(message) => PipelineError::Stage {
                stage: stage.to_string(),
                message,
            },
            PipelineError::Io(e) => PipelineError::Stage {
                stage: stage.to_string(),
                message: e.to_string(),
            },
            PipelineError::Serialization(e) => PipelineError::Stage {
                stage: stage.to_string(),
                message: e.to_string(),
            },
            other => other,
        }
    }
}


fn format_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Convert anyhow errors to PipelineError
impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        PipelineError::Generic(format!("{:#}", err))
    }
}
