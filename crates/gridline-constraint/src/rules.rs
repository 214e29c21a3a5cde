//! Rule checks

use crate::evaluator::ScanPass;
use crate::report::{Verdict, VerdictStatus};
use crate::types::{Rule, RuleKind};
use gridline_core::Location;
use gridline_policy::{DesignSystemConfig, Severity};
use gridline_scan::{TokenSet, LOCAL_NAMESPACE};
use std::collections::BTreeMap;

impl Rule {
    /// Evaluate the rule against one pass. Per-file rules yield one Pass per
    /// clean file; project-wide rules yield a single Pass when clean.
    pub fn check(&self, pass: &ScanPass, config: &DesignSystemConfig) -> Vec<Verdict> {
        match self.kind {
            RuleKind::SizeScale => self.check_scale(
                "size",
                &pass.aggregates.size_token_counts,
                &config.size_tokens,
            ),
            RuleKind::WeightScale => self.check_scale(
                "weight",
                &pass.aggregates.weight_token_counts,
                &config.weight_tokens,
            ),
            RuleKind::SizeAllowList => self.per_file(pass, |set, out| {
                self.check_allow_list("size", set.sizes(), &config.size_tokens, &set.path, out)
            }),
            RuleKind::WeightAllowList => self.per_file(pass, |set, out| {
                self.check_allow_list("weight", set.weights(), &config.weight_tokens, &set.path, out)
            }),
            RuleKind::SpacingGrid => self.check_spacing(pass, config.spacing_base_unit),
            RuleKind::AccentBudget => self.check_accent(pass, config.accent_budget_percent),
            RuleKind::ApprovedLibrary => {
                self.per_file(pass, |set, out| self.check_components(set, config, out))
            }
            RuleKind::RequiredAttributes => {
                self.per_file(pass, |set, out| self.check_attributes(set, config, out))
            }
            RuleKind::Unparseable => self.check_unparseable(pass),
        }
    }

    fn failing_status(&self) -> VerdictStatus {
        match self.severity {
            Severity::Violation => VerdictStatus::Violation,
            Severity::Warning => VerdictStatus::Warning,
        }
    }

    fn fail(
        &self,
        location: Option<Location>,
        expected: impl Into<String>,
        actual: impl Into<String>,
        hint: impl Into<String>,
    ) -> Verdict {
        Verdict {
            rule_id: self.id.clone(),
            category: self.category,
            status: self.failing_status(),
            location,
            expected: expected.into(),
            actual: actual.into(),
            remediation_hint: Some(hint.into()),
            autofixable: self.autofixable,
        }
    }

    fn pass(
        &self,
        location: Option<Location>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Verdict {
        Verdict {
            rule_id: self.id.clone(),
            category: self.category,
            status: VerdictStatus::Pass,
            location,
            expected: expected.into(),
            actual: actual.into(),
            remediation_hint: None,
            autofixable: false,
        }
    }

    /// Run `check` on every file, adding a Pass for files it found nothing in
    fn per_file<F>(&self, pass: &ScanPass, check: F) -> Vec<Verdict>
    where
        F: Fn(&TokenSet, &mut Vec<Verdict>),
    {
        let mut verdicts = Vec::new();
        for set in &pass.token_sets {
            let before = verdicts.len();
            check(set, &mut verdicts);
            if verdicts.len() == before {
                verdicts.push(self.pass(Some(Location::new(set.path.clone(), 0)), "no findings", "clean"));
            }
        }
        verdicts
    }

    fn check_scale(
        &self,
        label: &str,
        counts: &BTreeMap<String, u64>,
        scale: &[String],
    ) -> Vec<Verdict> {
        let limit = scale.len();
        let expected = format!("at most {} distinct {} tokens", limit, label);

        if counts.len() <= limit {
            let actual = format!("{} distinct {} token(s)", counts.len(), label);
            return vec![self.pass(None, expected, actual)];
        }

        let mut ranked: Vec<(&String, u64)> = counts.iter().map(|(t, n)| (t, *n)).collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        let excess: Vec<String> = ranked[limit..]
            .iter()
            .map(|(token, n)| format!("{} ({})", token, n))
            .collect();

        let actual = format!(
            "{} distinct {} tokens; beyond the {} most used: {}",
            counts.len(),
            label,
            limit,
            excess.join(", ")
        );
        let hint = format!(
            "Consolidate onto the {} scale: {}",
            label,
            scale.join(", ")
        );
        vec![self.fail(None, expected, actual, hint)]
    }

    fn check_allow_list<'a>(
        &self,
        label: &str,
        tokens: impl Iterator<Item = &'a gridline_scan::Token>,
        scale: &[String],
        path: &str,
        out: &mut Vec<Verdict>,
    ) {
        for token in tokens {
            if scale.iter().any(|allowed| allowed == &token.value) {
                continue;
            }
            out.push(self.fail(
                Some(Location::new(path, token.line)),
                format!("one of {}", scale.join(", ")),
                token.value.clone(),
                format!(
                    "Replace '{}' with the closest {} on the scale: {}",
                    token.value,
                    label,
                    scale.join(", ")
                ),
            ));
        }
    }

    fn check_spacing(&self, pass: &ScanPass, base_unit: u32) -> Vec<Verdict> {
        let expected = format!("multiples of {}px", base_unit);
        let occurrences = &pass.aggregates.custom_spacing_occurrences;
        if occurrences.is_empty() {
            return vec![self.pass(None, expected, "all spacing on grid")];
        }

        let unit = f64::from(base_unit);
        occurrences
            .iter()
            .map(|o| {
                let lower = (o.px / unit).floor() * unit;
                let upper = lower + unit;
                self.fail(
                    Some(o.location.clone()),
                    expected.clone(),
                    format!("{} ({}px)", o.value, o.px),
                    format!(
                        "Snap '{}' to the nearest grid value: {}px or {}px",
                        o.value, lower, upper
                    ),
                )
            })
            .collect()
    }

    fn check_accent(&self, pass: &ScanPass, budget_percent: f64) -> Vec<Verdict> {
        let expected = format!("accent at most {}% of color-role usage", budget_percent);
        let total = pass.aggregates.color_role_total();
        if total == 0 {
            return vec![self.pass(None, expected, "no color-role usage")];
        }

        let accent = pass.aggregates.role_count(gridline_policy::ColorRole::Accent);
        let share = accent as f64 * 100.0 / total as f64;
        let actual = format!("{:.1}% accent ({} of {})", share, accent, total);
        if share > budget_percent {
            vec![self.fail(
                None,
                expected,
                actual,
                "Move accent colors on secondary elements to neutral or complementary roles",
            )]
        } else {
            vec![self.pass(None, expected, actual)]
        }
    }

    fn check_components(&self, set: &TokenSet, config: &DesignSystemConfig, out: &mut Vec<Verdict>) {
        let expected = format!("components from {}", config.approved_component_namespace);
        for (namespace, token) in set.components() {
            let actual = match namespace {
                Some(ns) if ns == LOCAL_NAMESPACE || config.is_approved_namespace(ns) => continue,
                Some(ns) => format!("<{}> from {}", token.value, ns),
                None => "unresolved".to_string(),
            };
            out.push(self.fail(
                Some(Location::new(set.path.clone(), token.line)),
                expected.clone(),
                actual,
                format!(
                    "Replace <{}> with the equivalent component from {}",
                    token.value, config.approved_component_namespace
                ),
            ));
        }
    }

    fn check_attributes(&self, set: &TokenSet, config: &DesignSystemConfig, out: &mut Vec<Verdict>) {
        let required = &config.required_accessibility_attributes;
        if required.is_empty() {
            return;
        }
        let expected = required
            .iter()
            .map(|r| r.to_string())
            .collect::<Vec<_>>()
            .join("; ");

        for element in set.interactive_elements() {
            let missing: Vec<String> = required
                .iter()
                .filter(|r| !r.is_satisfied_by(&element.attributes))
                .map(|r| r.to_string())
                .collect();
            if missing.is_empty() {
                continue;
            }
            out.push(self.fail(
                Some(Location::new(set.path.clone(), element.line)),
                expected.clone(),
                format!("<{}> missing {}", element.tag, missing.join("; ")),
                format!("Add {} to <{}>", missing.join(" and "), element.tag),
            ));
        }
    }

    fn check_unparseable(&self, pass: &ScanPass) -> Vec<Verdict> {
        let mut verdicts = self.per_file(pass, |set, out| {
            for span in &set.skipped {
                out.push(self.fail(
                    Some(Location::new(set.path.clone(), span.line)),
                    "scannable source",
                    span.reason.clone(),
                    "Check the span for a missing closing quote, brace or bracket",
                ));
            }
        });
        for file in &pass.unreadable {
            verdicts.push(self.fail(
                Some(Location::new(file.path.clone(), 0)),
                "readable file",
                file.reason.clone(),
                "Check the file's permissions",
            ));
        }
        verdicts
    }
}
