//! Pipeline orchestrator - main coordinator
//!
//! Runs planner then synthesizer as a strict sequence for one query:
//! - State machine transitions (`PipelineState`)
//! - Session state ownership, lent to one stage at a time
//! - Retry/timeout policy around each stage
//! - The trace and final outcome exposed to the caller

use crate::agent::context::StageContext;
use crate::agent::retry::RetryPolicy;
use crate::agent::state::{PipelineEvent, PipelineState};
use crate::cli::config::Config;
use crate::errors::{PipelineError, Result};
use crate::planner::{stage as planner_stage, Plan, PlannerStage};
use crate::retrieval::Retriever;
use crate::session::{SessionIds, SessionState, ANSWER_KEY, PLAN_KEY, QUERY_KEY};
use crate::synthesizer::{stage as synthesizer_stage, Answer, SynthesizerStage};
use crate::telemetry::{PipelineTrace, TraceEvent, TraceKind};
use serde::{Serialize, Serializer};
use std::sync::Arc;

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Identifiers scoping each run's session state
    pub session: SessionIds,

    /// Retry and timeout policy applied to each stage
    pub retry: RetryPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            session: SessionIds::from(&crate::cli::config::SessionConfig::default()),
            retry: RetryPolicy::new(),
        }
    }
}

impl From<&Config> for OrchestratorConfig {
    fn from(config: &Config) -> Self {
        Self {
            session: SessionIds::from(&config.session),
            retry: RetryPolicy::from_config(&config.pipeline),
        }
    }
}

/// Everything observable about one finished run
#[derive(Debug, Serialize)]
pub struct PipelineOutcome {
    pub session: SessionIds,
    pub query: String,
    pub state: PipelineState,
    pub plan: Option<Plan>,
    pub answer: Option<Answer>,
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<PipelineError>,
    pub trace: Vec<TraceEvent>,
}

impl PipelineOutcome {
    pub fn is_success(&self) -> bool {
        self.state == PipelineState::SynthesizerDone && self.error.is_none()
    }

    pub fn into_result(self) -> Result<(Plan, Answer)> {
        match (self.error, self.plan, self.answer) {
            (Some(e), _, _) => Err(e),
            (None, Some(plan), Some(answer)) => Ok((plan, answer)),
            _ => Err(PipelineError::Generic(format!(
                "Pipeline ended in {} without a result",
                self.state
            ))),
        }
    }
}

fn serialize_error<S: Serializer>(error: &Option<PipelineError>, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    match error {
        Some(e) => serializer.serialize_some(&e.to_string()),
        None => serializer.serialize_none(),
    }
}

/// Main pipeline orchestrator
pub struct Orchestrator {
    planner: PlannerStage,
    synthesizer: SynthesizerStage,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(planner: PlannerStage, synthesizer: SynthesizerStage, config: OrchestratorConfig) -> Self {
        Self {
            planner,
            synthesizer,
            config,
        }
    }

    /// Build both stages from configuration.
    ///
    /// Missing credentials fail here, before any query is accepted.
    pub fn from_config(config: &Config, retriever: Arc<dyn Retriever>) -> Result<Self> {
        config.validate()?;
        let planner = PlannerStage::from_config(&config.llm)?;
        let synthesizer = SynthesizerStage::from_config(config, retriever)?;
        Ok(Self::new(planner, synthesizer, OrchestratorConfig::from(config)))
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run the full pipeline for `query`.
    ///
    /// Never fails: errors end the run in `PipelineState::Error` and are
    /// reported in the outcome together with whatever plan was produced.
    pub async fn run(&self, query: &str) -> PipelineOutcome {
        let mut run = PipelineRun::new(self.config.session.clone());
        let result = self.drive(query, &mut run).await;
        run.finish(query, result)
    }

    async fn drive(&self, query: &str, run: &mut PipelineRun) -> Result<()> {
        run.advance(PipelineEvent::QuerySubmitted)?;
        run.session.insert(QUERY_KEY, serde_json::Value::String(query.to_string()));

        let plan = self.run_planner(query, run).await?;
        run.advance(PipelineEvent::PlanAccepted)?;
        tracing::info!(query_type = %plan.query_type, sub_queries = ?plan.sub_queries, "Plan accepted");

        run.advance(PipelineEvent::SynthesisStarted)?;
        let answer = self.run_synthesizer(run).await?;
        run.advance(PipelineEvent::AnswerWritten)?;
        tracing::info!(kind = answer.kind.as_str(), citations = answer.citations.len(), "Answer written");

        Ok(())
    }

    async fn run_planner(&self, query: &str, run: &mut PipelineRun) -> Result<Plan> {
        let base = &run.session;
        let trace = &run.trace;

        let (plan, session) = self
            .config
            .retry
            .execute_with_retry(
                || {
                    let scratch = base.clone();
                    async move {
                        let mut scratch = scratch;
                        let ctx = StageContext::for_stage(planner_stage::STAGE_NAME, &mut scratch, trace);
                        let plan = self.planner.run(query, ctx).await?;
                        Ok::<_, PipelineError>((plan, scratch))
                    }
                },
                |attempt, error| record_retry(trace, planner_stage::STAGE_NAME, attempt, error),
            )
            .await
            .map_err(|e| e.in_stage(planner_stage::STAGE_NAME))?;

        run.session = session;
        Ok(plan)
    }

    async fn run_synthesizer(&self, run: &mut PipelineRun) -> Result<Answer> {
        let base = &run.session;
        let trace = &run.trace;

        let (answer, session) = self
            .config
            .retry
            .execute_with_retry(
                || {
                    let scratch = base.clone();
                    async move {
                        let mut scratch = scratch;
                        let ctx = StageContext::for_stage(synthesizer_stage::STAGE_NAME, &mut scratch, trace);
                        let answer = self.synthesizer.run(ctx).await?;
                        Ok::<_, PipelineError>((answer, scratch))
                    }
                },
                |attempt, error| record_retry(trace, synthesizer_stage::STAGE_NAME, attempt, error),
            )
            .await
            .map_err(|e| e.in_stage(synthesizer_stage::STAGE_NAME))?;

        run.session = session;
        Ok(answer)
    }
}

fn record_retry(trace: &PipelineTrace, stage: &str, attempt: u32, error: &PipelineError) {
    trace.record(TraceKind::RetryAttempt {
        stage: stage.to_string(),
        attempt,
        reason: error.to_string(),
    });
}

/// Mutable bookkeeping for one run
struct PipelineRun {
    state: PipelineState,
    session: SessionState,
    trace: PipelineTrace,
}

impl PipelineRun {
    fn new(ids: SessionIds) -> Self {
        Self {
            state: PipelineState::Created,
            session: SessionState::new(ids),
            trace: PipelineTrace::new(),
        }
    }

    /// Transition to new state
    fn advance(&mut self, event: PipelineEvent) -> Result<()> {
        let next = self.state.transition(event)?;
        tracing::debug!(from = %self.state, to = %next, "State transition");
        self.trace.record(TraceKind::StateTransition {
            from: self.state.to_string(),
            to: next.to_string(),
        });
        self.state = next;
        Ok(())
    }

    fn finish(mut self, query: &str, result: Result<()>) -> PipelineOutcome {
        let error = match result {
            Ok(()) => None,
            Err(e) => {
                tracing::error!(state = %self.state, error = %e, "Pipeline failed");
                self.trace.record(TraceKind::PipelineError {
                    message: e.to_string(),
                });
                if !self.state.is_terminal() {
                    // StageFailed is valid from every non-terminal state
                    let _ = self.advance(PipelineEvent::StageFailed);
                }
                Some(e)
            }
        };

        let plan = self.session.get_typed::<Plan>(PLAN_KEY).ok().flatten();
        let answer = if self.state == PipelineState::SynthesizerDone {
            self.session.get_typed::<Answer>(ANSWER_KEY).ok().flatten()
        } else {
            None
        };

        PipelineOutcome {
            session: self.session.ids().clone(),
            query: query.to_string(),
            state: self.state,
            plan,
            answer,
            error,
            trace: self.trace.events(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_bookkeeping() {
        let mut run = PipelineRun::new(SessionIds::new("app", "user", "s"));
        run.advance(PipelineEvent::QuerySubmitted).unwrap();
        assert_eq!(run.state, PipelineState::PlannerRunning);

        let outcome = run.finish("q", Err(PipelineError::Cancelled));
        assert_eq!(outcome.state, PipelineState::Error);
        assert!(outcome.plan.is_none());
        assert!(!outcome.is_success());
        assert_eq!(outcome.trace.len(), 3);
    }

    #[test]
    fn test_answer_hidden_unless_done() {
        let mut run = PipelineRun::new(SessionIds::new("app", "user", "s"));
        run.session.put(ANSWER_KEY, &Answer::refusal()).unwrap();
        run.advance(PipelineEvent::QuerySubmitted).unwrap();

        let outcome = run.finish("q", Err(PipelineError::Cancelled));
        assert!(outcome.answer.is_none());
    }

    #[test]
    fn test_outcome_serializes_error_as_text() {
        let run = PipelineRun::new(SessionIds::new("app", "user", "s"));
        let outcome = run.finish("q", Err(PipelineError::Configuration("missing key".to_string())));
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["state"], "Error");
        assert_eq!(value["error"], "Configuration error: missing key");
    }
}
