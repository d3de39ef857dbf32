//! Planner instruction

use crate::llm::ChatMessage;
use crate::planner::schema::{QueryType, QUERY_TYPE_FIELD, SUB_QUERIES_FIELD};

/// System instruction for query classification and decomposition
pub fn planner_instruction() -> String {
    let categories = QueryType::ALL
        .iter()
        .filter(|t| !t.is_fallback())
        .map(|t| format!("'{}'", t.as_str()))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "### ROLE\n\
         You are a Strategic Planning Agent for an AWS RAG system.\n\n\
         ### TASKS\n\
         1. CLASSIFY: Assign the query to exactly one category: {categories}.\n\
         2. DECOMPOSE: Generate 2-3 specific sub-queries optimized for semantic search in an AWS RAG guide. \
         Each sub-query must be self-contained and must not refer back to the original question with pronouns.\n\n\
         ### OUTPUT\n\
         Respond with a single JSON object of the form \
         {{\"{qt}\": \"<category>\", \"{sq}\": [\"<sub-query>\", ...]}}.\n\n\
         ### CONSTRAINTS\n\
         - Output ONLY valid JSON matching the schema above.\n\
         - No conversational filler or preamble.\n\
         - If the query is unrelated to RAG on AWS, categorize as '{general}' and suggest a refusal search term.",
        categories = categories,
        qt = QUERY_TYPE_FIELD,
        sq = SUB_QUERIES_FIELD,
        general = QueryType::General.as_str(),
    )
}

/// Messages for one planning call
pub fn planner_messages(query: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(planner_instruction()),
        ChatMessage::user(query),
    ]
}
