//! Telemetry for ragbuddy
//!
//! Two concerns live here: process-wide log output (`logging`) and the
//! per-run pipeline trace, an ordered record of everything the orchestrator
//! and its stages did. The trace is what the CLI prints as the agentic
//! trace and what tests use to check stage ordering.

pub mod logging;

pub use logging::init_logging;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Trace event payloads
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TraceKind {
    // Orchestrator events
    StateTransition {
        from: String,
        to: String,
    },
    RetryAttempt {
        stage: String,
        attempt: u32,
        reason: String,
    },
    PipelineError {
        message: String,
    },

    // Planner events
    PlanValidated {
        query_type: String,
        sub_queries: usize,
    },
    PlanRejected {
        errors: Vec<String>,
    },
    PlanQualityWarning {
        issue: String,
    },

    // Synthesizer events
    RetrievalStarted {
        sub_queries: Vec<String>,
    },
    RetrievalFinished {
        segments: usize,
    },
    RetrievalFailed {
        message: String,
    },
    ModelCall {
        stage: String,
    },
    CitationsDropped {
        sentences: usize,
    },
    AnswerWritten {
        kind: String,
        citations: usize,
    },
}

impl TraceKind {
    /// Short label used in terminal output
    pub fn label(&self) -> &'static str {
        match self {
            TraceKind::StateTransition { .. } => "state",
            TraceKind::RetryAttempt { .. } => "retry",
            TraceKind::PipelineError { .. } => "error",
            TraceKind::PlanValidated { .. } => "plan",
            TraceKind::PlanRejected { .. } => "plan",
            TraceKind::PlanQualityWarning { .. } => "plan",
            TraceKind::RetrievalStarted { .. } => "retrieval",
            TraceKind::RetrievalFinished { .. } => "retrieval",
            TraceKind::RetrievalFailed { .. } => "retrieval",
            TraceKind::ModelCall { .. } => "model",
            TraceKind::CitationsDropped { .. } => "grounding",
            TraceKind::AnswerWritten { .. } => "answer",
        }
    }
}

/// One recorded event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceEvent {
    /// Strictly increasing within one trace
    pub seq: u64,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: TraceKind,
}

/// Shared, append-only trace recorder
#[derive(Debug, Clone, Default)]
pub struct PipelineTrace {
    events: Arc<Mutex<Vec<TraceEvent>>>,
    next_seq: Arc<AtomicU64>,
}

impl PipelineTrace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event and return its sequence number
    pub fn record(&self, kind: TraceKind) -> u64 {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let event = TraceEvent {
            seq,
            at: Utc::now(),
            kind,
        };
        self.lock().push(event);
        seq
    }

    /// Snapshot of all events in recording order
    pub fn events(&self) -> Vec<TraceEvent> {
        self.lock().clone()
    }

    /// First event matching the predicate
    pub fn first(&self, predicate: impl Fn(&TraceKind) -> bool) -> Option<TraceEvent> {
        self.lock().iter().find(|e| predicate(&e.kind)).cloned()
    }

    /// Count events matching the predicate
    pub fn count(&self, predicate: impl Fn(&TraceKind) -> bool) -> usize {
        self.lock().iter().filter(|e| predicate(&e.kind)).count()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<TraceEvent>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
