//! Policy document parsing and validation

use gridline_core::{ConfigError, GridlineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::Path;

/// Number of entries the size-token allow-list must have
pub const SIZE_SCALE_LEN: usize = 4;

/// Number of entries the weight-token allow-list must have
pub const WEIGHT_SCALE_LEN: usize = 2;

pub const DEFAULT_COMPONENT_NAMESPACE: &str = "@/components/ui";

/// Policy written by `gridline init`
pub const STARTER_POLICY: &str = r#"# Gridline design-system policy

# Typography: exactly four sizes and two weights
size_tokens = ["text-sm", "text-base", "text-lg", "text-2xl"]
weight_tokens = ["font-normal", "font-semibold"]

# Spacing values must be multiples of this many pixels
spacing_base_unit = 8

# Accent-role share of all color-role usage, in percent (60/30/10)
accent_budget_percent = 10.0

approved_component_namespace = "@/components/ui"

# Each entry is required; `|` separates acceptable alternatives
required_accessibility_attributes = ["aria-label|aria-labelledby"]

[color_roles]
neutral = ["background", "foreground", "card", "popover", "muted", "border", "input"]
complementary = ["secondary"]
accent = ["primary", "accent", "ring", "destructive"]

[scan]
include = ["**/*.tsx", "**/*.jsx", "**/*.vue", "**/*.svelte", "**/*.html", "**/*.css"]
exclude = ["**/node_modules/**", "**/dist/**", "**/build/**", "**/.git/**"]

[fix]
max_iterations = 5
timeout_secs = 120
# rewriter = ["my-rewriter", "--json"]
"#;

/// How strongly a failing rule is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Violation,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Violation => write!(f, "violation"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// Color roles of the 60/30/10 distribution
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorRole {
    Neutral,
    Complementary,
    Accent,
}

impl ColorRole {
    pub const ALL: [ColorRole; 3] = [ColorRole::Neutral, ColorRole::Complementary, ColorRole::Accent];
}

impl fmt::Display for ColorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColorRole::Neutral => write!(f, "neutral"),
            ColorRole::Complementary => write!(f, "complementary"),
            ColorRole::Accent => write!(f, "accent"),
        }
    }
}

/// One required accessibility attribute, possibly with alternatives
/// (`aria-label|aria-labelledby`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeRequirement {
    alternatives: Vec<String>,
}

impl AttributeRequirement {
    pub fn parse(raw: &str) -> std::result::Result<Self, ConfigError> {
        let alternatives: Vec<String> = raw
            .split('|')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if alternatives.is_empty() {
            return Err(ConfigError::invalid_budget(
                "required_accessibility_attributes",
                format!("'{}' names no attribute", raw),
            ));
        }
        Ok(Self { alternatives })
    }

    pub fn alternatives(&self) -> &[String] {
        &self.alternatives
    }

    pub fn is_satisfied_by(&self, attributes: &BTreeSet<String>) -> bool {
        self.alternatives.iter().any(|a| attributes.contains(a))
    }
}

impl fmt::Display for AttributeRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.alternatives.join(" or "))
    }
}

/// Per-rule adjustments from `[rules."<id>"]`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleOverride {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub severity: Option<Severity>,
    /// Can only switch auto-fix off; a rule without a fix hint stays manual
    #[serde(default)]
    pub autofix: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct ColorRolesFile {
    #[serde(default)]
    neutral: Vec<String>,
    #[serde(default)]
    complementary: Vec<String>,
    #[serde(default)]
    accent: Vec<String>,
}

/// Raw document shape; every field optional so absence can be reported by name
#[derive(Debug, Default, Deserialize)]
struct PolicyFile {
    size_tokens: Option<Vec<String>>,
    weight_tokens: Option<Vec<String>>,
    spacing_base_unit: Option<i64>,
    accent_budget_percent: Option<f64>,
    approved_component_namespace: Option<String>,
    #[serde(default)]
    required_accessibility_attributes: Vec<String>,
    interactive_elements: Option<Vec<String>>,
    color_roles: Option<ColorRolesFile>,
    #[serde(default)]
    rules: BTreeMap<String, RuleOverride>,
}

/// The validated compliance policy. Immutable for the duration of a run.
#[derive(Debug, Clone)]
pub struct DesignSystemConfig {
    pub size_tokens: Vec<String>,
    pub weight_tokens: Vec<String>,
    pub spacing_base_unit: u32,
    pub accent_budget_percent: f64,
    pub approved_component_namespace: String,
    pub required_accessibility_attributes: Vec<AttributeRequirement>,
    pub interactive_elements: Vec<String>,
    /// Color name (e.g. `primary`) to role
    pub color_roles: BTreeMap<String, ColorRole>,
    pub rule_overrides: BTreeMap<String, RuleOverride>,
}

impl DesignSystemConfig {
    /// Parse and validate a policy document
    pub fn from_toml_str(content: &str) -> std::result::Result<Self, ConfigError> {
        let file: PolicyFile = toml::from_str(content)?;
        Self::validate(file)
    }

    /// Load and validate a policy file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::Parse(msg) => GridlineError::Config(ConfigError::Parse(format!(
                "{}: {}",
                path.display(),
                msg
            ))),
            other => other.into(),
        })
    }

    fn validate(file: PolicyFile) -> std::result::Result<Self, ConfigError> {
        let size_tokens = file
            .size_tokens
            .ok_or_else(|| ConfigError::MissingField("size_tokens".to_string()))?;
        let weight_tokens = file
            .weight_tokens
            .ok_or_else(|| ConfigError::MissingField("weight_tokens".to_string()))?;
        let spacing = file
            .spacing_base_unit
            .ok_or_else(|| ConfigError::MissingField("spacing_base_unit".to_string()))?;
        let accent_budget_percent = file
            .accent_budget_percent
            .ok_or_else(|| ConfigError::MissingField("accent_budget_percent".to_string()))?;

        check_token_list("size_tokens", &size_tokens, SIZE_SCALE_LEN)?;
        check_token_list("weight_tokens", &weight_tokens, WEIGHT_SCALE_LEN)?;

        if spacing <= 0 {
            return Err(ConfigError::invalid_budget(
                "spacing_base_unit",
                format!("must be a positive number of pixels, got {}", spacing),
            ));
        }
        let spacing_base_unit = u32::try_from(spacing).map_err(|_| {
            ConfigError::invalid_budget("spacing_base_unit", format!("{} is too large", spacing))
        })?;

        if !accent_budget_percent.is_finite() || !(0.0..=100.0).contains(&accent_budget_percent) {
            return Err(ConfigError::invalid_budget(
                "accent_budget_percent",
                format!("must be between 0 and 100, got {}", accent_budget_percent),
            ));
        }

        let approved_component_namespace = file
            .approved_component_namespace
            .map(|ns| ns.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_COMPONENT_NAMESPACE.to_string());
        if approved_component_namespace.is_empty() {
            return Err(ConfigError::invalid_budget(
                "approved_component_namespace",
                "must not be empty",
            ));
        }

        let required_accessibility_attributes = file
            .required_accessibility_attributes
            .iter()
            .map(|s| AttributeRequirement::parse(s))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let interactive_elements = file.interactive_elements.unwrap_or_else(default_interactive);

        let color_roles = match file.color_roles {
            Some(roles) => build_role_map(roles)?,
            None => build_role_map(default_color_roles())?,
        };

        Ok(Self {
            size_tokens,
            weight_tokens,
            spacing_base_unit,
            accent_budget_percent,
            approved_component_namespace,
            required_accessibility_attributes,
            interactive_elements,
            color_roles,
            rule_overrides: file.rules,
        })
    }

    /// Role of a color name, if it belongs to the role vocabulary
    pub fn role_of(&self, color_name: &str) -> Option<ColorRole> {
        self.color_roles.get(color_name).copied()
    }

    /// Whether a resolved import source lies inside the approved namespace
    pub fn is_approved_namespace(&self, namespace: &str) -> bool {
        let ns = namespace.trim_end_matches('/');
        ns == self.approved_component_namespace
            || ns
                .strip_prefix(self.approved_component_namespace.as_str())
                .map(|rest| rest.starts_with('/'))
                .unwrap_or(false)
    }

    pub fn rule_override(&self, rule_id: &str) -> Option<&RuleOverride> {
        self.rule_overrides.get(rule_id)
    }
}

fn check_token_list(
    field: &str,
    tokens: &[String],
    expected_len: usize,
) -> std::result::Result<(), ConfigError> {
    if tokens.is_empty() {
        return Err(ConfigError::invalid_budget(field, "must not be empty"));
    }
    let mut seen = BTreeSet::new();
    for token in tokens {
        if token.trim().is_empty() {
            return Err(ConfigError::invalid_budget(field, "contains an empty token"));
        }
        if !seen.insert(token.as_str()) {
            return Err(ConfigError::invalid_budget(
                field,
                format!("'{}' is listed twice", token),
            ));
        }
    }
    if tokens.len() != expected_len {
        return Err(ConfigError::invalid_budget(
            field,
            format!("expected exactly {} tokens, got {}", expected_len, tokens.len()),
        ));
    }
    Ok(())
}

fn build_role_map(
    roles: ColorRolesFile,
) -> std::result::Result<BTreeMap<String, ColorRole>, ConfigError> {
    let mut map = BTreeMap::new();
    let lists = [
        (ColorRole::Neutral, roles.neutral),
        (ColorRole::Complementary, roles.complementary),
        (ColorRole::Accent, roles.accent),
    ];
    for (role, names) in lists {
        for name in names {
            if let Some(previous) = map.insert(name.clone(), role) {
                if previous != role {
                    return Err(ConfigError::invalid_budget(
                        "color_roles",
                        format!("'{}' is assigned to both {} and {}", name, previous, role),
                    ));
                }
            }
        }
    }
    Ok(map)
}

fn default_color_roles() -> ColorRolesFile {
    let names = |list: &[&str]| list.iter().map(|s| s.to_string()).collect();
    ColorRolesFile {
        neutral: names(&["background", "foreground", "card", "popover", "muted", "border", "input"]),
        complementary: names(&["secondary"]),
        accent: names(&["primary", "accent", "ring", "destructive"]),
    }
}

fn default_interactive() -> Vec<String> {
    ["button", "a", "input", "select", "textarea", "Button"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
