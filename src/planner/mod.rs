//! Planner: query classification, decomposition and plan schema
//!
//! The planner asks the model for a JSON plan, validates it against the
//! plan schema and writes it to session state. Validation never panics or
//! raises; it returns a tagged outcome the stage converts into an error.

pub mod prompt;
pub mod schema;
pub mod stage;

// Re-export commonly used types
pub use schema::{validate, FieldError, FieldErrorKind, Plan, PlanValidator, QueryType, ValidationOutcome};
pub use stage::PlannerStage;
