//! Terminal output for pipeline runs
//!
//! Spinner while the pipeline runs, then the trace, the planner result and
//! the final answer. Everything here writes to stdout; logs go to stderr.

use crate::agent::PipelineOutcome;
use crate::cli::Verbosity;
use crate::ingest::IngestReport;
use crate::planner::Plan;
use crate::synthesizer::Answer;
use crate::telemetry::{TraceEvent, TraceKind};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

const RULE_WIDTH: usize = 50;

/// Spinner refresh interval
const TICK: Duration = Duration::from_millis(100);

/// Display manager for one CLI invocation
pub struct TerminalDisplay {
    verbosity: Verbosity,
}

impl TerminalDisplay {
    pub fn new(verbosity: Verbosity) -> Self {
        Self { verbosity }
    }

    /// Announce the run
    pub fn show_start(&self) {
        if self.verbosity.show_trace() {
            println!("\n{}", "--- Starting Agentic Workflow ---".bold().cyan());
        }
    }

    /// Spinner shown while the pipeline runs; hidden in quiet mode
    pub fn start_spinner(&self, message: &str) -> ProgressBar {
        if !self.verbosity.show_progress() {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        pb.set_style(style);
        pb.set_message(message.to_string());
        pb.enable_steady_tick(TICK);
        pb
    }

    /// Print everything a finished run produced
    pub fn show_outcome(&self, outcome: &PipelineOutcome) {
        if self.verbosity.show_trace() {
            self.show_trace(&outcome.trace);
            if let Some(plan) = &outcome.plan {
                self.show_plan(plan);
            }
        }

        match (&outcome.answer, &outcome.error) {
            (Some(answer), None) => self.show_answer(answer),
            (_, Some(error)) => self.show_error(&error.to_string()),
            (None, None) => self.show_error(&format!("Pipeline ended in {} without an answer", outcome.state)),
        }
    }

    pub fn show_trace(&self, events: &[TraceEvent]) {
        println!("\n{}", "=".repeat(RULE_WIDTH).cyan());
        println!("{}", "AGENTIC TRACE (OBSERVABILITY)".bold().cyan());
        println!("{}", "=".repeat(RULE_WIDTH).cyan());

        for event in events {
            let label = format!("[{:>9}]", event.kind.label());
            let line = describe_event(&event.kind);
            if self.verbosity.show_timestamps() {
                println!(
                    "{:>3} {} {} {}",
                    event.seq,
                    event.at.format("%H:%M:%S%.3f").to_string().dimmed(),
                    label.blue(),
                    line
                );
            } else {
                println!("{:>3} {} {}", event.seq, label.blue(), line);
            }
        }
    }

    pub fn show_plan(&self, plan: &Plan) {
        println!("\n{}", "Planner Result:".bold().yellow());
        println!("  Classification: {}", plan.query_type.as_str().green());
        if plan.sub_queries.is_empty() {
            println!("  Sub-queries: {}", "(none)".dimmed());
        } else {
            println!("  Sub-queries:");
            for (i, q) in plan.sub_queries.iter().enumerate() {
                println!("    {}. {}", i + 1, q);
            }
        }
    }

    pub fn show_answer(&self, answer: &Answer) {
        println!("\n{}", "=".repeat(RULE_WIDTH).green());
        println!("{}", "FINAL ANSWER:".bold().green());
        println!("{}", "=".repeat(RULE_WIDTH).green());
        println!("{}", answer.text);

        if !answer.citations.is_empty() && self.verbosity.show_trace() {
            let sections: Vec<&str> = answer.citations.iter().map(|c| c.section.as_str()).collect();
            println!("\n{} {}", "Sources:".dimmed(), sections.join(", ").dimmed());
        }
        println!();
    }

    pub fn show_ingest(&self, report: &IngestReport) {
        if !self.verbosity.show_progress() {
            return;
        }
        println!(
            "{} Ingested {} ({} sections, {} chunks)",
            "✓".green().bold(),
            report.document,
            report.sections,
            report.chunks
        );
    }

    /// Display error message
    pub fn show_error(&self, error: &str) {
        println!("{} {}", "Error:".red().bold(), error.red());
    }

    pub fn show_interrupted(&self) {
        println!("\n{}", "Process interrupted by user.".yellow());
    }
}

/// One-line human rendering of a trace event
pub fn describe_event(kind: &TraceKind) -> String {
    match kind {
        TraceKind::StateTransition { from, to } => format!("{} -> {}", from, to),
        TraceKind::RetryAttempt { stage, attempt, reason } => {
            format!("{} retry #{}: {}", stage, attempt, reason)
        }
        TraceKind::PipelineError { message } => message.clone(),
        TraceKind::PlanValidated { query_type, sub_queries } => {
            format!("plan validated: {} with {} sub-queries", query_type, sub_queries)
        }
        TraceKind::PlanRejected { errors } => format!("plan rejected: {}", errors.join("; ")),
        TraceKind::PlanQualityWarning { issue } => format!("warning: {}", issue),
        TraceKind::RetrievalStarted { sub_queries } => {
            format!("retriever_tool called with {:?}", sub_queries)
        }
        TraceKind::RetrievalFinished { segments } => format!("{} segments retrieved", segments),
        TraceKind::RetrievalFailed { message } => format!("retrieval failed: {}", message),
        TraceKind::ModelCall { stage } => format!("{} model call", stage),
        TraceKind::CitationsDropped { sentences } => {
            format!("{} unsupported sentences dropped", sentences)
        }
        TraceKind::AnswerWritten { kind, citations } => {
            format!("{} answer written ({} citations)", kind, citations)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_transition() {
        let kind = TraceKind::StateTransition {
            from: "Created".to_string(),
            to: "PlannerRunning".to_string(),
        };
        assert_eq!(describe_event(&kind), "Created -> PlannerRunning");
    }

    #[test]
    fn test_describe_retrieval() {
        let kind = TraceKind::RetrievalStarted {
            sub_queries: vec!["What is S3".to_string()],
        };
        assert_eq!(describe_event(&kind), "retriever_tool called with [\"What is S3\"]");
    }

    #[test]
    fn test_quiet_spinner_is_hidden() {
        let display = TerminalDisplay::new(Verbosity::Quiet);
        assert!(display.start_spinner("Running").is_hidden());
    }
}
