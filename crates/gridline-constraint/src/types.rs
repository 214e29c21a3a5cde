//! Rule type definitions

use gridline_policy::Severity;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What part of the design system a rule guards
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Typography,
    Spacing,
    Color,
    ComponentUsage,
    Accessibility,
    /// Problems reading or extracting the source itself
    Source,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::Typography => "typography",
            Category::Spacing => "spacing",
            Category::Color => "color",
            Category::ComponentUsage => "component_usage",
            Category::Accessibility => "accessibility",
            Category::Source => "source",
        };
        write!(f, "{}", name)
    }
}

/// Whether a rule looks at one file at a time or at the whole project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    PerFile,
    ProjectWide,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::PerFile => write!(f, "per-file"),
            Scope::ProjectWide => write!(f, "project-wide"),
        }
    }
}

/// The check a rule performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleKind {
    /// At most as many distinct size tokens as the scale allows
    SizeScale,
    /// At most as many distinct weight tokens as the scale allows
    WeightScale,
    /// Every size token is on the scale
    SizeAllowList,
    /// Every weight token is on the scale
    WeightAllowList,
    /// Every spacing value is a multiple of the base unit
    SpacingGrid,
    /// Accent share of color-role usage stays within budget
    AccentBudget,
    /// Components come from the approved namespace or the same file
    ApprovedLibrary,
    /// Interactive elements carry the required attributes
    RequiredAttributes,
    /// Spans and files the extractor could not read
    Unparseable,
}

impl RuleKind {
    /// Token kinds the rule reads
    pub fn reads(&self) -> &'static [&'static str] {
        match self {
            RuleKind::SizeScale | RuleKind::SizeAllowList => &["size"],
            RuleKind::WeightScale | RuleKind::WeightAllowList => &["weight"],
            RuleKind::SpacingGrid => &["spacing"],
            RuleKind::AccentBudget => &["color"],
            RuleKind::ApprovedLibrary => &["component"],
            RuleKind::RequiredAttributes => &["interactive", "attribute"],
            RuleKind::Unparseable => &["skipped"],
        }
    }
}

/// A compliance rule. Built once from the policy and never mutated.
#[derive(Debug, Clone, Serialize)]
pub struct Rule {
    pub id: String,
    pub description: String,
    pub category: Category,
    pub scope: Scope,
    pub severity: Severity,
    pub kind: RuleKind,
    /// Violations may be handed to the rewriter
    pub autofixable: bool,
    pub enabled: bool,
}

impl Rule {
    pub(crate) fn new(
        id: &str,
        description: &str,
        category: Category,
        scope: Scope,
        severity: Severity,
        kind: RuleKind,
        autofixable: bool,
    ) -> Self {
        Self {
            id: id.to_string(),
            description: description.to_string(),
            category,
            scope,
            severity,
            kind,
            autofixable,
            enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_ordering_is_stable() {
        let mut categories = vec![Category::Source, Category::Typography, Category::Color];
        categories.sort();
        assert_eq!(
            categories,
            vec![Category::Typography, Category::Color, Category::Source]
        );
    }

    #[test]
    fn test_kind_serializes_with_type_tag() {
        let json = serde_json::to_value(RuleKind::SpacingGrid).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "spacing_grid" }));
    }

    #[test]
    fn test_reads() {
        assert_eq!(RuleKind::RequiredAttributes.reads(), &["interactive", "attribute"]);
        assert_eq!(Scope::ProjectWide.to_string(), "project-wide");
        assert_eq!(Category::ComponentUsage.to_string(), "component_usage");
    }
}
