//! Pipeline orchestration module
//!
//! State machine, per-stage context, retry policy and the orchestrator that
//! drives planner and synthesizer.

pub mod context;
pub mod orchestrator;
pub mod retry;
pub mod state;

// Re-export commonly used types
pub use context::StageContext;
pub use orchestrator::{Orchestrator, OrchestratorConfig, PipelineOutcome};
pub use retry::RetryPolicy;
pub use state::{PipelineEvent, PipelineState};
