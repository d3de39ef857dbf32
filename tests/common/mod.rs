//! Scripted test doubles shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use ragbuddy::agent::{Orchestrator, OrchestratorConfig, RetryPolicy};
use ragbuddy::llm::{ChatBackend, ChatReply, ChatRequest, ResponseFormat};
use ragbuddy::planner::PlannerStage;
use ragbuddy::retrieval::{RetrievedSegment, Retriever, RetrieverContent};
use ragbuddy::session::SessionIds;
use ragbuddy::synthesizer::SynthesizerStage;
use ragbuddy::{PipelineError, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Chat back-end that answers from a queue of canned replies
#[derive(Default)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<ChatReply>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, content: &str) -> Self {
        self.push(Ok(ChatReply::text(content)))
    }

    pub fn fail(self, error: PipelineError) -> Self {
        self.push(Err(error))
    }

    fn push(self, reply: Result<ChatReply>) -> Self {
        self.replies.lock().unwrap().push_back(reply);
        self
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn json_requests(&self) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.response_format == ResponseFormat::JsonObject)
            .count()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn chat(&self, request: ChatRequest) -> Result<ChatReply> {
        self.requests.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(PipelineError::Backend("script exhausted".to_string())))
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

/// Retriever returning fixed segments and counting calls
#[derive(Default)]
pub struct FakeRetriever {
    segments: Vec<RetrievedSegment>,
    calls: AtomicUsize,
    seen: Mutex<Vec<Vec<String>>>,
}

impl FakeRetriever {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_sections(sections: &[(&str, &str)]) -> Self {
        let segments = sections
            .iter()
            .enumerate()
            .map(|(i, (section, text))| RetrievedSegment {
                id: format!("seg-{i}"),
                section: section.to_string(),
                text: text.to_string(),
                score: 0.9,
                sub_query: String::new(),
            })
            .collect();

        Self {
            segments,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<Vec<String>> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Retriever for FakeRetriever {
    async fn retrieve(&self, sub_queries: &[String]) -> Result<RetrieverContent> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(sub_queries.to_vec());
        Ok(RetrieverContent::new(self.segments.clone()))
    }
}

pub fn s3_guide() -> FakeRetriever {
    FakeRetriever::with_sections(&[
        ("Amazon S3", "Amazon S3 is an object storage service offering scalability and durability."),
        ("Storage Options", "S3 is commonly used as the document store for RAG pipelines."),
    ])
}

pub fn orchestrator(
    planner: Arc<ScriptedBackend>,
    synthesizer: Arc<ScriptedBackend>,
    retriever: Arc<FakeRetriever>,
    retry: RetryPolicy,
) -> Orchestrator {
    Orchestrator::new(
        PlannerStage::new(planner, 0.0),
        SynthesizerStage::new(synthesizer, retriever, 0.2, true),
        OrchestratorConfig {
            session: SessionIds::new("aws_rag_agent_team", "user_001", "session_001"),
            retry,
        },
    )
}
