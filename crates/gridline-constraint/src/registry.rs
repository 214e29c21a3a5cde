//! Rule registry built from the policy document

use crate::types::{Category, Rule, RuleKind, Scope};
use gridline_core::ConfigError;
use gridline_policy::{DesignSystemConfig, Severity};

pub const SIZE_SCALE: &str = "typography.size-scale";
pub const WEIGHT_SCALE: &str = "typography.weight-scale";
pub const SIZE_ALLOWLIST: &str = "typography.size-allowlist";
pub const WEIGHT_ALLOWLIST: &str = "typography.weight-allowlist";
pub const SPACING_GRID: &str = "spacing.grid";
pub const ACCENT_BUDGET: &str = "color.accent-budget";
pub const APPROVED_LIBRARY: &str = "components.approved-library";
pub const REQUIRED_ATTRIBUTES: &str = "accessibility.required-attributes";
pub const UNPARSEABLE: &str = "source.unparseable";

fn builtin_rules() -> Vec<Rule> {
    vec![
        Rule::new(
            SIZE_SCALE,
            "The project uses no more distinct font sizes than the scale has",
            Category::Typography,
            Scope::ProjectWide,
            Severity::Violation,
            RuleKind::SizeScale,
            false,
        ),
        Rule::new(
            WEIGHT_SCALE,
            "The project uses no more distinct font weights than the scale has",
            Category::Typography,
            Scope::ProjectWide,
            Severity::Violation,
            RuleKind::WeightScale,
            false,
        ),
        Rule::new(
            SIZE_ALLOWLIST,
            "Every font size is one of the allowed size tokens",
            Category::Typography,
            Scope::PerFile,
            Severity::Violation,
            RuleKind::SizeAllowList,
            true,
        ),
        Rule::new(
            WEIGHT_ALLOWLIST,
            "Every font weight is one of the allowed weight tokens",
            Category::Typography,
            Scope::PerFile,
            Severity::Violation,
            RuleKind::WeightAllowList,
            true,
        ),
        Rule::new(
            SPACING_GRID,
            "Every spacing value is a multiple of the base unit",
            Category::Spacing,
            Scope::ProjectWide,
            Severity::Violation,
            RuleKind::SpacingGrid,
            true,
        ),
        Rule::new(
            ACCENT_BUDGET,
            "Accent colors stay within their share of color-role usage",
            Category::Color,
            Scope::ProjectWide,
            Severity::Warning,
            RuleKind::AccentBudget,
            false,
        ),
        Rule::new(
            APPROVED_LIBRARY,
            "Components come from the approved library or the same file",
            Category::ComponentUsage,
            Scope::PerFile,
            Severity::Violation,
            RuleKind::ApprovedLibrary,
            true,
        ),
        Rule::new(
            REQUIRED_ATTRIBUTES,
            "Interactive elements carry the required accessibility attributes",
            Category::Accessibility,
            Scope::PerFile,
            Severity::Violation,
            RuleKind::RequiredAttributes,
            true,
        ),
        Rule::new(
            UNPARSEABLE,
            "Source spans and files that could not be scanned",
            Category::Source,
            Scope::PerFile,
            Severity::Warning,
            RuleKind::Unparseable,
            false,
        ),
    ]
}

/// The rule set of one invocation, together with the policy it was built from
#[derive(Debug, Clone)]
pub struct RuleRegistry {
    config: DesignSystemConfig,
    rules: Vec<Rule>,
}

impl RuleRegistry {
    /// Parse a policy document and build the registry
    pub fn load(config_doc: &str) -> Result<Self, ConfigError> {
        Self::from_config(DesignSystemConfig::from_toml_str(config_doc)?)
    }

    /// Build the registry from an already-validated policy, applying its
    /// `[rules."<id>"]` overrides
    pub fn from_config(config: DesignSystemConfig) -> Result<Self, ConfigError> {
        let mut rules = builtin_rules();

        for (id, adjust) in &config.rule_overrides {
            let rule = rules
                .iter_mut()
                .find(|r| &r.id == id)
                .ok_or_else(|| ConfigError::UnknownRule(id.clone()))?;
            if let Some(enabled) = adjust.enabled {
                rule.enabled = enabled;
            }
            if let Some(severity) = adjust.severity {
                rule.severity = severity;
            }
            if adjust.autofix == Some(false) {
                rule.autofixable = false;
            }
            tracing::debug!(rule = %id, enabled = rule.enabled, severity = %rule.severity, "applied rule override");
        }

        Ok(Self { config, rules })
    }

    pub fn config(&self) -> &DesignSystemConfig {
        &self.config
    }

    /// All rules in evaluation order, disabled ones included
    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    /// Rules that take part in evaluation
    pub fn enabled(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(|r| r.enabled)
    }

    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    pub fn by_category(&self, category: Category) -> Vec<&Rule> {
        self.rules.iter().filter(|r| r.category == category).collect()
    }

    /// Whether violations of the rule may be handed to the rewriter
    pub fn autofixable(&self, id: &str) -> bool {
        self.get(id).map(|r| r.autofixable).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridline_policy::STARTER_POLICY;

    #[test]
    fn test_load_starter_policy() {
        let registry = RuleRegistry::load(STARTER_POLICY).unwrap();
        assert_eq!(registry.len(), 9);
        assert!(!registry.is_empty());
        assert_eq!(registry.enabled().count(), 9);
        assert_eq!(registry.config().spacing_base_unit, 8);
    }

    #[test]
    fn test_catalogue_defaults() {
        let registry = RuleRegistry::load(STARTER_POLICY).unwrap();
        let size = registry.get(SIZE_SCALE).unwrap();
        assert_eq!(size.scope, Scope::ProjectWide);
        assert!(!size.autofixable);

        assert!(registry.autofixable(SPACING_GRID));
        assert!(registry.autofixable(APPROVED_LIBRARY));
        assert!(!registry.autofixable(ACCENT_BUDGET));
        assert!(!registry.autofixable("no.such-rule"));
        assert_eq!(registry.get(ACCENT_BUDGET).unwrap().severity, Severity::Warning);
    }

    #[test]
    fn test_by_category() {
        let registry = RuleRegistry::load(STARTER_POLICY).unwrap();
        let typography: Vec<&str> = registry
            .by_category(Category::Typography)
            .iter()
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(
            typography,
            vec![SIZE_SCALE, WEIGHT_SCALE, SIZE_ALLOWLIST, WEIGHT_ALLOWLIST]
        );
    }

    #[test]
    fn test_overrides_apply() {
        let doc = format!(
            "{}\n[rules.\"{}\"]\nseverity = \"violation\"\n\n[rules.\"{}\"]\nautofix = false\n\n[rules.\"{}\"]\nenabled = false\n",
            STARTER_POLICY, ACCENT_BUDGET, SPACING_GRID, UNPARSEABLE
        );
        let registry = RuleRegistry::load(&doc).unwrap();
        assert_eq!(registry.get(ACCENT_BUDGET).unwrap().severity, Severity::Violation);
        assert!(!registry.autofixable(SPACING_GRID));
        assert!(!registry.get(UNPARSEABLE).unwrap().enabled);
        assert_eq!(registry.enabled().count(), 8);
    }

    #[test]
    fn test_autofix_override_cannot_enable() {
        let doc = format!("{}\n[rules.\"{}\"]\nautofix = true\n", STARTER_POLICY, SIZE_SCALE);
        let registry = RuleRegistry::load(&doc).unwrap();
        assert!(!registry.autofixable(SIZE_SCALE));
    }

    #[test]
    fn test_unknown_rule_override() {
        let doc = format!("{}\n[rules.\"typography.kerning\"]\nenabled = false\n", STARTER_POLICY);
        let err = RuleRegistry::load(&doc).unwrap_err();
        assert_eq!(err, ConfigError::UnknownRule("typography.kerning".to_string()));
    }

    #[test]
    fn test_missing_field_surfaces() {
        let err = RuleRegistry::load("weight_tokens = [\"a\", \"b\"]\n").unwrap_err();
        assert_eq!(err, ConfigError::MissingField("size_tokens".to_string()));
    }
}
