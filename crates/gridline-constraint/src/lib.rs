//! Gridline Constraint - Rule evaluation, reporting and auto-fix
//!
//! This crate holds the built-in design-system rules, the engine that scans a
//! source tree and evaluates those rules, the reporter that turns verdicts into
//! a compliance report, and the bounded fix loop that hands autofixable
//! violations to an external rewriter.

mod aggregate;
mod evaluator;
mod fixer;
mod registry;
mod report;
mod rewriter;
mod rules;
mod types;

pub use aggregate::{AggregateMetrics, Aggregator, SpacingOccurrence};
pub use evaluator::{EngineState, RuleEngine, ScanPass};
pub use fixer::{FixAttempt, FixLoop, FixOutcome, FixRun};
pub use registry::{
    RuleRegistry, ACCENT_BUDGET, APPROVED_LIBRARY, REQUIRED_ATTRIBUTES, SIZE_ALLOWLIST, SIZE_SCALE,
    SPACING_GRID, UNPARSEABLE, WEIGHT_ALLOWLIST, WEIGHT_SCALE,
};
pub use report::{CategoryCounts, Report, Reporter, Verdict, VerdictStatus};
pub use rewriter::{
    CommandRewriter, FixFailure, FixItem, FixRequest, RewriteResponse, Rewriter, RewrittenUnit,
};
pub use types::{Category, Rule, RuleKind, Scope};
