//! End-to-end pipeline tests
//!
//! Drives the orchestrator with scripted model replies and a fake retrieval
//! tool, so no network or vector store is needed.

mod common;

use async_trait::async_trait;
use common::{orchestrator, s3_guide, FakeRetriever, ScriptedBackend};
use ragbuddy::agent::{Orchestrator, OrchestratorConfig, PipelineState, RetryPolicy};
use ragbuddy::llm::{ChatBackend, ChatReply, ChatRequest};
use ragbuddy::planner::{PlannerStage, QueryType};
use ragbuddy::retrieval::{Retriever, RetrieverContent};
use ragbuddy::session::SessionIds;
use ragbuddy::synthesizer::{AnswerKind, SynthesizerStage, REFUSAL_SENTENCE};
use ragbuddy::telemetry::TraceKind;
use ragbuddy::{PipelineError, Result};
use std::sync::Arc;
use std::time::Duration;

const S3_PLAN: &str = r#"{"query_type": "definition", "sub_queries": ["What is Amazon S3", "Amazon S3 use cases in RAG"]}"#;

#[tokio::test]
async fn test_definition_query_is_answered_with_citations() {
    let planner = Arc::new(ScriptedBackend::new().reply(S3_PLAN));
    let synthesizer = Arc::new(ScriptedBackend::new().reply(
        "## Amazon S3\n\
         - Amazon S3 is an object storage service (Source: Amazon S3).\n\
         - It is used as the document store in RAG pipelines (Source: Storage Options).",
    ));
    let retriever = Arc::new(s3_guide());

    let outcome = orchestrator(planner.clone(), synthesizer.clone(), retriever.clone(), RetryPolicy::new())
        .run("What is Amazon S3?")
        .await;

    assert!(outcome.is_success(), "unexpected error: {:?}", outcome.error);
    assert_eq!(outcome.state, PipelineState::SynthesizerDone);

    let plan = outcome.plan.as_ref().unwrap();
    assert_eq!(plan.query_type, QueryType::Definition);
    assert!((2..=3).contains(&plan.sub_queries.len()));

    let answer = outcome.answer.as_ref().unwrap();
    assert_eq!(answer.kind, AnswerKind::Grounded);
    assert_eq!(answer.citations.len(), 2);
    for line in answer.text.lines().filter(|l| !l.trim().is_empty() && !l.starts_with('#')) {
        assert!(line.contains("(Source:"), "uncited line: {line}");
    }

    // The tool was called once, with exactly the plan's sub-queries
    assert_eq!(retriever.calls(), 1);
    assert_eq!(retriever.seen(), vec![plan.sub_queries.clone()]);
    assert_eq!(planner.json_requests(), 1);
    assert_eq!(synthesizer.requests().len(), 1);
}

#[tokio::test]
async fn test_out_of_domain_query_is_refused() {
    let planner = Arc::new(ScriptedBackend::new().reply(r#"{"query_type": "general", "sub_queries": []}"#));
    let synthesizer = Arc::new(ScriptedBackend::new());
    let retriever = Arc::new(s3_guide());

    let outcome = orchestrator(planner, synthesizer.clone(), retriever.clone(), RetryPolicy::new())
        .run("What's the weather today?")
        .await;

    assert!(outcome.is_success());
    assert_eq!(outcome.plan.as_ref().unwrap().query_type, QueryType::General);
    assert_eq!(outcome.answer.as_ref().unwrap().text, REFUSAL_SENTENCE);
    assert_eq!(retriever.calls(), 0);
    assert!(synthesizer.requests().is_empty());
}

#[tokio::test]
async fn test_missing_sub_queries_stops_before_synthesis() {
    let planner = Arc::new(ScriptedBackend::new().reply(r#"{"query_type": "definition"}"#));
    let synthesizer = Arc::new(ScriptedBackend::new());
    let retriever = Arc::new(s3_guide());

    let outcome = orchestrator(planner, synthesizer.clone(), retriever.clone(), RetryPolicy::new())
        .run("What is Amazon S3?")
        .await;

    assert_eq!(outcome.state, PipelineState::Error);
    assert!(matches!(outcome.error, Some(PipelineError::SchemaValidation { .. })));
    assert!(outcome.plan.is_none());
    assert!(outcome.answer.is_none());
    assert_eq!(retriever.calls(), 0);
    assert!(synthesizer.requests().is_empty());

    let visited: Vec<String> = outcome
        .trace
        .iter()
        .filter_map(|e| match &e.kind {
            TraceKind::StateTransition { to, .. } => Some(to.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(visited, vec!["PlannerRunning", "Error"]);
}

#[tokio::test]
async fn test_empty_retrieval_gives_exact_refusal() {
    let planner = Arc::new(ScriptedBackend::new().reply(S3_PLAN));
    let synthesizer = Arc::new(ScriptedBackend::new());
    let retriever = Arc::new(FakeRetriever::with_sections(&[("Amazon S3", "   ")]));

    let outcome = orchestrator(planner, synthesizer.clone(), retriever.clone(), RetryPolicy::new())
        .run("What is Amazon S3?")
        .await;

    assert!(outcome.is_success());
    let answer = outcome.answer.unwrap();
    assert_eq!(answer.text, REFUSAL_SENTENCE);
    assert!(answer.is_refusal());
    assert_eq!(retriever.calls(), 1);
    assert!(synthesizer.requests().is_empty());
}

#[tokio::test]
async fn test_hallucinated_answer_is_replaced_by_refusal() {
    let planner = Arc::new(ScriptedBackend::new().reply(S3_PLAN));
    let synthesizer = Arc::new(
        ScriptedBackend::new().reply("Amazon S3 was launched in 2006 (Source: AWS History). It is very popular."),
    );

    let outcome = orchestrator(planner, synthesizer, Arc::new(s3_guide()), RetryPolicy::new())
        .run("What is Amazon S3?")
        .await;

    assert!(outcome.is_success());
    assert_eq!(outcome.answer.unwrap().text, REFUSAL_SENTENCE);
    assert!(outcome
        .trace
        .iter()
        .any(|e| matches!(e.kind, TraceKind::CitationsDropped { sentences: 2 })));
}

#[tokio::test]
async fn test_retrieval_follows_plan_validation() {
    let planner = Arc::new(ScriptedBackend::new().reply(S3_PLAN));
    let synthesizer = Arc::new(ScriptedBackend::new().reply("S3 is object storage (Source: Amazon S3)."));

    let outcome = orchestrator(planner, synthesizer, Arc::new(s3_guide()), RetryPolicy::new())
        .run("What is Amazon S3?")
        .await;

    let validated = outcome
        .trace
        .iter()
        .find(|e| matches!(e.kind, TraceKind::PlanValidated { .. }))
        .unwrap();
    let retrieval = outcome
        .trace
        .iter()
        .find(|e| matches!(e.kind, TraceKind::RetrievalStarted { .. }))
        .unwrap();

    assert!(validated.seq < retrieval.seq);
    assert!(validated.at <= retrieval.at);

    // Sequence numbers are strictly increasing
    for pair in outcome.trace.windows(2) {
        assert!(pair[0].seq < pair[1].seq);
    }
}

#[tokio::test]
async fn test_schema_failure_is_retried_when_enabled() {
    let planner = Arc::new(ScriptedBackend::new().reply("Sure! Here is the plan:").reply(S3_PLAN));
    let synthesizer = Arc::new(ScriptedBackend::new().reply("S3 is object storage (Source: Amazon S3)."));
    let retry = RetryPolicy::with_config(1, 1).without_jitter();

    let outcome = orchestrator(planner.clone(), synthesizer, Arc::new(s3_guide()), retry)
        .run("What is Amazon S3?")
        .await;

    assert!(outcome.is_success(), "unexpected error: {:?}", outcome.error);
    assert_eq!(planner.json_requests(), 2);
    assert_eq!(
        outcome
            .trace
            .iter()
            .filter(|e| matches!(e.kind, TraceKind::RetryAttempt { .. }))
            .count(),
        1
    );
}

#[tokio::test]
async fn test_no_retry_by_default() {
    let planner = Arc::new(
        ScriptedBackend::new()
            .fail(PipelineError::Backend("503 Service Unavailable".to_string()))
            .reply(S3_PLAN),
    );

    let outcome = orchestrator(planner.clone(), Arc::new(ScriptedBackend::new()), Arc::new(s3_guide()), RetryPolicy::new())
        .run("What is Amazon S3?")
        .await;

    assert_eq!(outcome.state, PipelineState::Error);
    assert!(matches!(outcome.error, Some(PipelineError::Backend(_))));
    assert_eq!(planner.requests().len(), 1);
}

struct BrokenStore;

#[async_trait]
impl Retriever for BrokenStore {
    async fn retrieve(&self, _sub_queries: &[String]) -> Result<RetrieverContent> {
        Err(PipelineError::Infrastructure("qdrant unreachable".to_string()))
    }
}

#[tokio::test]
async fn test_hard_retrieval_failure_keeps_plan() {
    let planner: Arc<dyn ChatBackend> = Arc::new(ScriptedBackend::new().reply(S3_PLAN));
    let synthesizer: Arc<dyn ChatBackend> = Arc::new(ScriptedBackend::new());

    let outcome = Orchestrator::new(
        PlannerStage::new(planner, 0.0),
        SynthesizerStage::new(synthesizer, Arc::new(BrokenStore), 0.2, true),
        OrchestratorConfig::default(),
    )
    .run("What is Amazon S3?")
    .await;

    assert_eq!(outcome.state, PipelineState::Error);
    assert!(matches!(outcome.error, Some(PipelineError::Infrastructure(_))));
    assert_eq!(outcome.plan.unwrap().query_type, QueryType::Definition);
    assert!(outcome.answer.is_none());
}

struct StalledBackend;

#[async_trait]
impl ChatBackend for StalledBackend {
    async fn chat(&self, _request: ChatRequest) -> Result<ChatReply> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(ChatReply::text(S3_PLAN))
    }

    fn model(&self) -> &str {
        "stalled"
    }
}

#[tokio::test]
async fn test_stage_timeout_ends_in_error() {
    let retry = RetryPolicy::new().with_stage_timeout(Some(Duration::from_millis(50)));
    let outcome = Orchestrator::new(
        PlannerStage::new(Arc::new(StalledBackend), 0.0),
        SynthesizerStage::new(Arc::new(ScriptedBackend::new()), Arc::new(s3_guide()), 0.2, true),
        OrchestratorConfig {
            session: SessionIds::new("app", "user", "session"),
            retry,
        },
    )
    .run("What is Amazon S3?")
    .await;

    assert_eq!(outcome.state, PipelineState::Error);
    assert!(matches!(outcome.error, Some(PipelineError::Timeout { duration_ms: 50 })));
}

#[tokio::test]
async fn test_outcome_json_shape() {
    let planner = Arc::new(ScriptedBackend::new().reply(S3_PLAN));
    let synthesizer = Arc::new(ScriptedBackend::new().reply("S3 is object storage (Source: Amazon S3)."));

    let outcome = orchestrator(planner, synthesizer, Arc::new(s3_guide()), RetryPolicy::new())
        .run("What is Amazon S3?")
        .await;
    let value = serde_json::to_value(&outcome).unwrap();

    assert_eq!(value["state"], "SynthesizerDone");
    assert_eq!(value["plan"]["query_type"], "definition");
    assert_eq!(value["session"]["session_id"], "session_001");
    assert!(value["error"].is_null());
    assert_eq!(value["trace"][0]["event"], "state_transition");
}

fn guide_pages() -> FakeRetriever {
    FakeRetriever::with_sections(&[
        ("Page 12", "Amazon S3 stores objects in buckets."),
        ("Page 3", "Amazon EFS is a managed file system."),
    ])
}

async fn answer_with(reply: &str, retriever: FakeRetriever) -> ragbuddy::agent::PipelineOutcome {
    let planner = Arc::new(ScriptedBackend::new().reply(S3_PLAN));
    let synthesizer = Arc::new(ScriptedBackend::new().reply(reply));
    orchestrator(planner, synthesizer, Arc::new(retriever), RetryPolicy::new())
        .run("What is Amazon S3?")
        .await
}

#[tokio::test]
async fn test_citation_to_unretrieved_page_is_refused() {
    let outcome = answer_with("Amazon S3 is free of charge (Source: Page 1).", guide_pages()).await;

    assert!(outcome.is_success());
    assert_eq!(outcome.answer.unwrap().text, REFUSAL_SENTENCE);
}

#[tokio::test]
async fn test_only_correctly_cited_pages_survive() {
    let outcome = answer_with(
        "- Amazon S3 stores objects in buckets (Source: Page 12).\n- Amazon S3 is free (Source: Page 1).\n- EFS is a file system (Source: Page 3).",
        guide_pages(),
    )
    .await;

    let answer = outcome.answer.unwrap();
    assert_eq!(
        answer.text,
        "- Amazon S3 stores objects in buckets (Source: Page 12).\n- EFS is a file system (Source: Page 3)."
    );
    let sections: Vec<&str> = answer.citations.iter().map(|c| c.section.as_str()).collect();
    assert_eq!(sections, vec!["Page 12", "Page 3"]);
}

#[tokio::test]
async fn test_uncited_bold_and_label_lines_removed() {
    let outcome = answer_with(
        "## Amazon S3\n**S3 was launched in 2006.**\n- S3 costs nothing per GB:\n- S3 is an object storage service (Source: Amazon S3).",
        s3_guide(),
    )
    .await;

    let text = outcome.answer.unwrap().text;
    assert_eq!(text, "## Amazon S3\n- S3 is an object storage service (Source: Amazon S3).");
    assert!(outcome
        .trace
        .iter()
        .any(|e| matches!(e.kind, TraceKind::CitationsDropped { sentences: 2 })));
}

#[tokio::test]
async fn test_abbreviation_keeps_comparison_sentence_intact() {
    let reply = "S3 vs. EFS: S3 is object storage, e.g. for documents (Source: Amazon S3).";
    let outcome = answer_with(reply, s3_guide()).await;

    let answer = outcome.answer.unwrap();
    assert_eq!(answer.kind, AnswerKind::Grounded);
    assert_eq!(answer.text, reply);
}
