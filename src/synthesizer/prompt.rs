//! Synthesizer instruction and message assembly

use crate::llm::{ChatMessage, ToolCall};
use crate::planner::Plan;
use crate::retrieval::{RetrieverContent, RETRIEVER_TOOL_NAME};

/// Id of the single retrieval call in the transcript
pub const RETRIEVER_CALL_ID: &str = "call_retriever_0";

/// System instruction with the plan injected
pub fn synthesizer_instruction(plan: &Plan) -> String {
    format!(
        "### ROLE\n\
         You are a Technical Synthesis Expert for AWS Prescriptive Guidance. \
         Your goal is to provide cited, accurate answers based ONLY on retrieved text.\n\n\
         ### PLAN\n\
         {plan}\n\n\
         ### EXECUTION PROTOCOL\n\
         1. The '{tool}' has already been called with the plan's sub_queries.\n\
         2. Review the 'retriever_content' it returned. It is the ONLY source you may use.\n\n\
         ### RESPONSE FORMATTING RULES\n\
         - STRUCTURE: Use clear sections and bullet points for readability.\n\
         - CITATIONS: Every factual sentence MUST end with a citation copying a '[Section: ...]' \
         header from the retrieved content exactly, e.g. '(Source: [Section Name])'.\n\
         - Headings and bold labels must not state facts on their own.\n\
         - GROUNDING: If the retrieved content does not answer the query, respond with exactly: \
         '{refusal}'\n\
         - NO HALLUCINATIONS: Never use external technical knowledge.",
        plan = plan.to_value(),
        tool = RETRIEVER_TOOL_NAME,
        refusal = super::stage::REFUSAL_SENTENCE,
    )
}

/// Transcript for the synthesis call.
///
/// The retrieval call appears as an assistant tool call answered by the
/// tool result, so the model sees exactly what was retrieved and nothing else.
pub fn synthesizer_messages(plan: &Plan, query: Option<&str>, content: &RetrieverContent) -> Vec<ChatMessage> {
    let user = match query {
        Some(query) => query.to_string(),
        None => format!("Answer the question described by this plan: {}", plan.to_value()),
    };

    let call = ToolCall::function(
        RETRIEVER_CALL_ID,
        RETRIEVER_TOOL_NAME,
        &serde_json::json!({ "sub_queries": plan.sub_queries }),
    );

    vec![
        ChatMessage::system(synthesizer_instruction(plan)),
        ChatMessage::user(user),
        ChatMessage::assistant_tool_calls(vec![call]),
        ChatMessage::tool_result(RETRIEVER_CALL_ID, content.render()),
    ]
}
