//! Planner stage: classify and decompose one query

use crate::agent::context::StageContext;
use crate::cli::config::LlmConfig;
use crate::errors::{PipelineError, Result};
use crate::llm::{ChatBackend, ChatRequest, Credentials, OpenAiCompatClient};
use crate::planner::prompt::planner_messages;
use crate::planner::schema::{FieldError, FieldErrorKind, Plan, PlanValidator, ValidationOutcome, SUB_QUERIES_FIELD};
use crate::session::{SessionState, PLAN_KEY};
use crate::telemetry::{PipelineTrace, TraceKind};
use std::sync::Arc;
use tracing::Instrument;

pub const STAGE_NAME: &str = "planner";

/// Allowed sub-query count for non-fallback plans
pub const MIN_SUB_QUERIES: usize = 2;
pub const MAX_SUB_QUERIES: usize = 3;

/// Planner stage
pub struct PlannerStage {
    backend: Arc<dyn ChatBackend>,
    validator: PlanValidator,
    temperature: f32,
}

impl PlannerStage {
    pub fn new(backend: Arc<dyn ChatBackend>, temperature: f32) -> Self {
        Self {
            backend,
            validator: PlanValidator::new(),
            temperature,
        }
    }

    /// Build against the configured OpenAI-compatible endpoint.
    ///
    /// Fails with a configuration error when the API key is absent.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let credentials = Credentials::from_env(&config.api_key_env)?;
        let client = OpenAiCompatClient::new(config, credentials)?;
        tracing::info!(model = %config.model, "Planner stage initialized");
        Ok(Self::new(Arc::new(client), config.planner_temperature))
    }

    pub fn model(&self) -> &str {
        self.backend.model()
    }

    /// Produce a validated plan for `query`.
    ///
    /// Malformed model output is returned as a schema validation error and is
    /// not retried here.
    pub async fn plan(&self, query: &str, trace: &PipelineTrace) -> Result<Plan> {
        trace.record(TraceKind::ModelCall {
            stage: STAGE_NAME.to_string(),
        });

        let request = ChatRequest::new(planner_messages(query))
            .with_temperature(self.temperature)
            .json_mode();
        let reply = self.backend.chat(request).await?;
        tracing::debug!(raw = %reply.content, "Planner raw output");

        let outcome = match self.validator.validate_str(&reply.content) {
            ValidationOutcome::Valid(plan) => check_decomposition(plan, trace),
            invalid => invalid,
        };

        match outcome {
            ValidationOutcome::Valid(plan) => {
                trace.record(TraceKind::PlanValidated {
                    query_type: plan.query_type.to_string(),
                    sub_queries: plan.sub_queries.len(),
                });
                Ok(plan)
            }
            ValidationOutcome::Invalid(errors) => {
                trace.record(TraceKind::PlanRejected {
                    errors: errors.iter().map(|e| e.to_string()).collect(),
                });
                Err(PipelineError::SchemaValidation { errors })
            }
        }
    }

    /// Plan and store the result under the plan key
    pub async fn run(&self, query: &str, ctx: StageContext<'_>) -> Result<Plan> {
        let StageContext { state, trace, span } = ctx;
        self.run_in_state(query, state, trace).instrument(span).await
    }

    async fn run_in_state(&self, query: &str, state: &mut SessionState, trace: &PipelineTrace) -> Result<Plan> {
        tracing::info!(query = %query, "Planning query");
        let plan = self.plan(query, trace).await?;
        state.put(PLAN_KEY, &plan)?;
        Ok(plan)
    }
}

/// Enforce the decomposition rules the schema leaves open.
///
/// Blank sub-queries are dropped. A non-fallback plan needs at least two
/// remaining sub-queries; extras beyond three are cut.
fn check_decomposition(mut plan: Plan, trace: &PipelineTrace) -> ValidationOutcome {
    for issue in plan.quality_issues() {
        tracing::warn!(issue = %issue, "Plan data-quality concern");
        trace.record(TraceKind::PlanQualityWarning { issue });
    }

    plan.sub_queries = plan
        .sub_queries
        .into_iter()
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .collect();

    if plan.is_fallback() {
        return ValidationOutcome::Valid(plan);
    }

    let found = plan.sub_queries.len();
    if found < MIN_SUB_QUERIES {
        return ValidationOutcome::Invalid(vec![FieldError::new(
            SUB_QUERIES_FIELD,
            FieldErrorKind::Count {
                min: MIN_SUB_QUERIES,
                max: MAX_SUB_QUERIES,
                found,
            },
        )]);
    }

    if found > MAX_SUB_QUERIES {
        tracing::warn!(found, "Truncating sub-queries to {}", MAX_SUB_QUERIES);
        plan.sub_queries.truncate(MAX_SUB_QUERIES);
    }

    ValidationOutcome::Valid(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatReply, ChatRequest};
    use crate::planner::schema::QueryType;
    use crate::session::SessionIds;
    use async_trait::async_trait;

    struct FixedBackend(String);

    #[async_trait]
    impl ChatBackend for FixedBackend {
        async fn chat(&self, _request: ChatRequest) -> Result<ChatReply> {
            Ok(ChatReply::text(self.0.clone()))
        }

        fn model(&self) -> &str {
            "fixed"
        }
    }

    fn stage(reply: &str) -> PlannerStage {
        PlannerStage::new(Arc::new(FixedBackend(reply.to_string())), 0.0)
    }

    #[tokio::test]
    async fn test_plan_definition() {
        let trace = PipelineTrace::new();
        let plan = stage(r#"{"query_type": "definition", "sub_queries": ["What is Amazon S3", "Amazon S3 storage classes"]}"#)
            .plan("What is Amazon S3?", &trace)
            .await
            .unwrap();

        assert_eq!(plan.query_type, QueryType::Definition);
        assert_eq!(plan.sub_queries.len(), 2);
        assert_eq!(trace.count(|k| matches!(k, TraceKind::PlanValidated { .. })), 1);
    }

    #[tokio::test]
    async fn test_missing_sub_queries_is_schema_error() {
        let trace = PipelineTrace::new();
        let err = stage(r#"{"query_type": "definition"}"#)
            .plan("What is Amazon S3?", &trace)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::SchemaValidation { .. }));
        assert_eq!(trace.count(|k| matches!(k, TraceKind::PlanRejected { .. })), 1);
    }

    #[tokio::test]
    async fn test_single_sub_query_rejected() {
        let trace = PipelineTrace::new();
        let err = stage(r#"{"query_type": "uses", "sub_queries": ["Bedrock use cases", "  "]}"#)
            .plan("What is Bedrock used for?", &trace)
            .await
            .unwrap_err();

        match err {
            PipelineError::SchemaValidation { errors } => {
                assert_eq!(
                    errors[0].kind,
                    FieldErrorKind::Count { min: 2, max: 3, found: 1 }
                );
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_extra_sub_queries_truncated() {
        let trace = PipelineTrace::new();
        let plan = stage(r#"{"query_type": "comparison", "sub_queries": ["a", "b", "c", "d"]}"#)
            .plan("Compare A and B", &trace)
            .await
            .unwrap();

        assert_eq!(plan.sub_queries, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_general_plan_accepts_any_count() {
        let trace = PipelineTrace::new();
        let plan = stage(r#"{"query_type": "general", "sub_queries": []}"#)
            .plan("What's the weather today?", &trace)
            .await
            .unwrap();

        assert!(plan.is_fallback());
        assert!(plan.sub_queries.is_empty());
        assert!(trace.count(|k| matches!(k, TraceKind::PlanQualityWarning { .. })) >= 1);
    }

    #[tokio::test]
    async fn test_run_writes_plan_key() {
        let trace = PipelineTrace::new();
        let mut state = SessionState::new(SessionIds::new("app", "user", "session"));

        let planner = stage(r#"{"query_type": "recommendation", "sub_queries": ["x", "y"]}"#);
        let plan = planner
            .run("Which should I use?", StageContext::for_stage(STAGE_NAME, &mut state, &trace))
            .await
            .unwrap();

        let stored: Plan = state.get_typed(PLAN_KEY).unwrap().unwrap();
        assert_eq!(stored, plan);
    }

    #[test]
    fn test_from_config_without_key_is_fatal() {
        let mut config = LlmConfig::default();
        config.api_key_env = "RAGBUDDY_TEST_ABSENT_PLANNER_KEY".to_string();

        let err = PlannerStage::from_config(&config).err().unwrap();
        assert!(err.is_configuration());
    }
}
