//! Prompt enhancement.
//!
//! The orchestrator resolves a template, sends the prompt and instructions to
//! the template's provider, classifies any failure and records the result in
//! the lineage store. Failures are always returned as values.

pub mod busy;
pub mod classify;
pub mod compose;
pub mod diagnostics;
pub mod orchestrator;

pub use busy::{BusyGuard, BusySnapshot, BusyTracker, TemplateRow};
pub use classify::{classify, classify_message};
pub use diagnostics::{DiagnosticError, EnhancementDiagnostics, LlmParams};
pub use orchestrator::{EnhanceFailure, EnhanceOptions, Enhancement, EnhancementOrchestrator};
