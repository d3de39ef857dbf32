//! Explicit per-run context handed to each stage

use crate::session::{SessionIds, SessionState};
use crate::telemetry::PipelineTrace;
use tracing::Span;

/// Everything a stage may touch while it runs.
///
/// The orchestrator owns the session state and the trace; a stage only
/// borrows them for its own turn.
pub struct StageContext<'a> {
    pub state: &'a mut SessionState,
    pub trace: &'a PipelineTrace,
    pub span: Span,
}

impl<'a> StageContext<'a> {
    pub fn new(state: &'a mut SessionState, trace: &'a PipelineTrace, span: Span) -> Self {
        Self { state, trace, span }
    }

    /// Context with a span named after the stage and carrying the session id
    pub fn for_stage(stage: &'static str, state: &'a mut SessionState, trace: &'a PipelineTrace) -> Self {
        let span = stage_span(stage, state.ids());
        Self::new(state, trace, span)
    }
}

/// Span used for all log records emitted during one stage
pub fn stage_span(stage: &'static str, ids: &SessionIds) -> Span {
    tracing::info_span!("stage", name = stage, session_id = %ids.session_id, app = %ids.app_name)
}
