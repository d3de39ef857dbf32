//! Session state shared between pipeline stages

pub mod state;

// Re-export key types
pub use state::{SessionIds, SessionState, ANSWER_KEY, PLAN_KEY, QUERY_KEY, RETRIEVER_CONTENT_KEY};
