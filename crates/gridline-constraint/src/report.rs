//! Verdicts and compliance reports

use crate::types::Category;
use gridline_core::{GridlineError, Location, Result};
use serde::Serialize;
use std::collections::BTreeMap;

/// Outcome of one rule at one location
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictStatus {
    Pass,
    Violation,
    Warning,
}

/// A single rule outcome
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub rule_id: String,
    pub category: Category,
    pub status: VerdictStatus,
    /// Absent for project-wide rollups. Line 0 stands for the whole file.
    pub location: Option<Location>,
    pub expected: String,
    pub actual: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation_hint: Option<String>,
    pub autofixable: bool,
}

impl Verdict {
    pub fn is_violation(&self) -> bool {
        self.status == VerdictStatus::Violation
    }

    pub fn is_warning(&self) -> bool {
        self.status == VerdictStatus::Warning
    }
}

/// Per-category tallies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategoryCounts {
    pub violations: usize,
    pub warnings: usize,
    pub passed: usize,
}

/// Everything one pass found, in canonical order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub is_compliant: bool,
    pub violation_count: usize,
    pub warning_count: usize,
    pub pass_count: usize,
    pub by_category: BTreeMap<Category, CategoryCounts>,
    /// Project-wide first, then by path, line and rule id
    pub violations: Vec<Verdict>,
    /// Same order as `violations`
    pub warnings: Vec<Verdict>,
    /// Every verdict in evaluation order
    pub verdicts: Vec<Verdict>,
}

impl Report {
    /// Violations the rewriter may be asked to fix
    pub fn autofixable_violations(&self) -> impl Iterator<Item = &Verdict> {
        self.violations.iter().filter(|v| v.autofixable)
    }

    /// One-line summary
    pub fn summary(&self) -> String {
        let state = if self.is_compliant {
            "Compliant"
        } else {
            "Not compliant"
        };
        format!(
            "{}: {} violation(s), {} warning(s), {} passed",
            state, self.violation_count, self.warning_count, self.pass_count
        )
    }

    /// Pretty-printed JSON form
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| GridlineError::Serialization(e.to_string()))
    }
}

/// Turns verdicts into reports
pub struct Reporter;

impl Reporter {
    pub fn summarize(verdicts: Vec<Verdict>) -> Report {
        let mut by_category: BTreeMap<Category, CategoryCounts> = BTreeMap::new();
        for verdict in &verdicts {
            let counts = by_category.entry(verdict.category).or_default();
            match verdict.status {
                VerdictStatus::Pass => counts.passed += 1,
                VerdictStatus::Violation => counts.violations += 1,
                VerdictStatus::Warning => counts.warnings += 1,
            }
        }

        let mut violations: Vec<Verdict> =
            verdicts.iter().filter(|v| v.is_violation()).cloned().collect();
        let mut warnings: Vec<Verdict> = verdicts.iter().filter(|v| v.is_warning()).cloned().collect();
        violations.sort_by(canonical_order);
        warnings.sort_by(canonical_order);

        let pass_count = verdicts
            .iter()
            .filter(|v| v.status == VerdictStatus::Pass)
            .count();

        Report {
            is_compliant: violations.is_empty(),
            violation_count: violations.len(),
            warning_count: warnings.len(),
            pass_count,
            by_category,
            violations,
            warnings,
            verdicts,
        }
    }
}

/// `None` locations sort before any path
fn canonical_order(a: &Verdict, b: &Verdict) -> std::cmp::Ordering {
    (&a.location, &a.rule_id).cmp(&(&b.location, &b.rule_id))
}
