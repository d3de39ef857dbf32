//! ragbuddy - two-stage grounded RAG agent
//!
//! A planner classifies a question and decomposes it into focused
//! sub-queries; a synthesizer retrieves guide sections for those sub-queries
//! and writes an answer citing only what was retrieved.
//!
//! # Architecture
//!
//! - **agent**: state machine, retry policy and the orchestrator
//! - **planner** / **synthesizer**: the two stages
//! - **retrieval** / **ingest**: vector search over the guide and loading it
//! - **llm**: OpenAI-compatible chat back-end
//! - **telemetry**: logging and the per-run trace

pub mod agent;
pub mod cli;
pub mod display;
pub mod errors;
pub mod ingest;
pub mod llm;
pub mod planner;
pub mod retrieval;
pub mod session;
pub mod synthesizer;
pub mod telemetry;

// Re-export commonly used types
pub use errors::{PipelineError, Result};
