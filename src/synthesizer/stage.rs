//! Synthesizer stage: retrieve for the plan and write a cited answer

use crate::agent::context::StageContext;
use crate::cli::config::Config;
use crate::errors::{PipelineError, Result};
use crate::llm::{ChatBackend, ChatRequest, OpenAiCompatClient};
use crate::planner::Plan;
use crate::retrieval::{retriever_tool_definition, Retriever, RetrieverContent};
use crate::session::{SessionState, ANSWER_KEY, PLAN_KEY, QUERY_KEY, RETRIEVER_CONTENT_KEY};
use crate::synthesizer::citation::{Citation, GroundingVerifier};
use crate::synthesizer::prompt::synthesizer_messages;
use crate::telemetry::{PipelineTrace, TraceKind};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::Instrument;

pub const STAGE_NAME: &str = "synthesizer";

/// Fixed answer when the guide does not cover the query
pub const REFUSAL_SENTENCE: &str = "This information is not available in the provided AWS RAG guide.";

/// How the answer came about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerKind {
    Grounded,
    Refusal,
}

impl AnswerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerKind::Grounded => "grounded",
            AnswerKind::Refusal => "refusal",
        }
    }
}

/// Final synthesized answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub kind: AnswerKind,
    pub citations: Vec<Citation>,
}

impl Answer {
    pub fn refusal() -> Self {
        Self {
            text: REFUSAL_SENTENCE.to_string(),
            kind: AnswerKind::Refusal,
            citations: Vec::new(),
        }
    }

    pub fn grounded(text: impl Into<String>, citations: Vec<Citation>) -> Self {
        Self {
            text: text.into(),
            kind: AnswerKind::Grounded,
            citations,
        }
    }

    pub fn is_refusal(&self) -> bool {
        self.kind == AnswerKind::Refusal
    }
}

/// Synthesizer stage
pub struct SynthesizerStage {
    backend: Arc<dyn ChatBackend>,
    retriever: Arc<dyn Retriever>,
    temperature: f32,
    enforce_citations: bool,
}

impl SynthesizerStage {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        retriever: Arc<dyn Retriever>,
        temperature: f32,
        enforce_citations: bool,
    ) -> Self {
        Self {
            backend,
            retriever,
            temperature,
            enforce_citations,
        }
    }

    /// Build against the configured endpoint; fails when the API key is absent
    pub fn from_config(config: &Config, retriever: Arc<dyn Retriever>) -> Result<Self> {
        let credentials = config.credentials()?;
        let client = OpenAiCompatClient::new(&config.llm, credentials)?;
        tracing::info!(model = %config.llm.model, "Synthesizer stage initialized with {}", crate::retrieval::RETRIEVER_TOOL_NAME);
        Ok(Self::new(
            Arc::new(client),
            retriever,
            config.llm.synthesizer_temperature,
            config.pipeline.enforce_citations,
        ))
    }

    /// Produce an answer for `plan`.
    ///
    /// Retrieval runs with exactly the plan's sub-queries. Fallback plans,
    /// soft retrieval failures and empty retrieval yield the refusal; hard
    /// infrastructure errors propagate.
    pub async fn synthesize(
        &self,
        plan: &Plan,
        query: Option<&str>,
        state: &mut SessionState,
        trace: &PipelineTrace,
    ) -> Result<Answer> {
        if plan.is_fallback() || plan.sub_queries.is_empty() {
            tracing::info!(query_type = %plan.query_type, "Out-of-domain plan, refusing without retrieval");
            return Ok(record_answer(Answer::refusal(), trace));
        }

        let content = match self.retrieve(plan, trace).await? {
            Some(content) => content,
            None => return Ok(record_answer(Answer::refusal(), trace)),
        };
        state.insert(RETRIEVER_CONTENT_KEY, serde_json::Value::String(content.render()));

        let request = ChatRequest::new(synthesizer_messages(plan, query, &content))
            .with_temperature(self.temperature)
            .with_tools(vec![retriever_tool_definition()]);

        trace.record(TraceKind::ModelCall {
            stage: STAGE_NAME.to_string(),
        });
        let reply = self.backend.chat(request).await?;
        tracing::debug!(raw = %reply.content, "Synthesizer raw output");

        let sections = content.sections();
        let report = GroundingVerifier::new(&sections, self.enforce_citations).verify(&reply.content);

        if report.ungrounded > 0 {
            tracing::warn!(
                ungrounded = report.ungrounded,
                enforced = self.enforce_citations,
                "Answer contains sentences without verified citations"
            );
            if self.enforce_citations {
                trace.record(TraceKind::CitationsDropped {
                    sentences: report.ungrounded,
                });
            }
        }

        let answer = if report.is_refusal() {
            if !report.model_refused {
                tracing::warn!("No grounded sentence survived verification");
            }
            Answer::refusal()
        } else {
            Answer::grounded(report.text, report.citations)
        };

        Ok(record_answer(answer, trace))
    }

    /// Read the plan from session state, synthesize, store the answer
    pub async fn run(&self, ctx: StageContext<'_>) -> Result<Answer> {
        let StageContext { state, trace, span } = ctx;
        self.run_in_state(state, trace).instrument(span).await
    }

    async fn run_in_state(&self, state: &mut SessionState, trace: &PipelineTrace) -> Result<Answer> {
        let plan: Plan = state.get_typed(PLAN_KEY)?.ok_or_else(|| PipelineError::Stage {
            stage: STAGE_NAME.to_string(),
            message: format!("No plan under '{}' in session state", PLAN_KEY),
        })?;
        let query: Option<String> = state.get_typed(QUERY_KEY)?;

        tracing::info!(query_type = %plan.query_type, sub_queries = plan.sub_queries.len(), "Synthesizing answer");
        let answer = self.synthesize(&plan, query.as_deref(), state, trace).await?;
        state.put(ANSWER_KEY, &answer)?;
        Ok(answer)
    }

    /// `Ok(None)` means nothing usable came back
    async fn retrieve(&self, plan: &Plan, trace: &PipelineTrace) -> Result<Option<RetrieverContent>> {
        trace.record(TraceKind::RetrievalStarted {
            sub_queries: plan.sub_queries.clone(),
        });

        match self.retriever.retrieve(&plan.sub_queries).await {
            Ok(content) if content.is_empty() => {
                trace.record(TraceKind::RetrievalFinished { segments: 0 });
                tracing::warn!("Retrieval returned no usable content");
                Ok(None)
            }
            Ok(content) => {
                trace.record(TraceKind::RetrievalFinished {
                    segments: content.len(),
                });
                Ok(Some(content))
            }
            Err(PipelineError::ToolInvocation(message)) => {
                tracing::warn!(error = %message, "Retrieval tool failed, degrading to refusal");
                trace.record(TraceKind::RetrievalFailed { message });
                Ok(None)
            }
            Err(e) => {
                trace.record(TraceKind::RetrievalFailed {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }
}

fn record_answer(answer: Answer, trace: &PipelineTrace) -> Answer {
    trace.record(TraceKind::AnswerWritten {
        kind: answer.kind.as_str().to_string(),
        citations: answer.citations.len(),
    });
    answer
}
