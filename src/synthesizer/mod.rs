//! Synthesizer: grounded, cited answers from retrieved content
//!
//! The stage performs the retrieval call itself with the plan's sub-queries,
//! gives the model nothing but the retrieved text, and verifies citations
//! on the way out.

pub mod citation;
pub mod prompt;
pub mod stage;

// Re-export commonly used types
pub use citation::{Citation, GroundingReport, GroundingVerifier};
pub use stage::{Answer, AnswerKind, SynthesizerStage, REFUSAL_SENTENCE};
