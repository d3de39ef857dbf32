//! Language model back-end
//!
//! Chat message types and the OpenAI-compatible completion client.

pub mod client;
pub mod types;

// Re-export commonly used types
pub use client::{ChatBackend, Credentials, OpenAiCompatClient, DEFAULT_API_KEY_ENV, DEFAULT_BASE_URL, DEFAULT_MODEL};
pub use types::{ChatMessage, ChatReply, ChatRequest, ResponseFormat, Role, ToolCall, ToolDefinition};
