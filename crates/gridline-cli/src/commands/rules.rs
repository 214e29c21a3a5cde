//! Rule listing command

use super::Project;
use anyhow::Result;
use gridline_constraint::RuleRegistry;
use std::path::Path;
use std::process::ExitCode;

pub fn run(root: &Path, policy: Option<&Path>) -> Result<ExitCode> {
    let project = Project::load(root, policy)?;
    println!("Rules from {}:", project.policy_path.display());
    println!();
    for line in rule_lines(&project.registry) {
        println!("{}", line);
    }
    Ok(ExitCode::SUCCESS)
}

fn rule_lines(registry: &RuleRegistry) -> Vec<String> {
    let width = registry.rules().map(|r| r.id.len()).max().unwrap_or(0);
    registry
        .rules()
        .map(|rule| {
            let mut flags = Vec::new();
            if rule.autofixable {
                flags.push("autofix");
            }
            if !rule.enabled {
                flags.push("disabled");
            }
            format!(
                "  {:<width$}  {:<15} {:<12} {:<9} {}{}",
                rule.id,
                rule.category.to_string(),
                rule.scope.to_string(),
                rule.severity.to_string(),
                rule.description,
                if flags.is_empty() {
                    String::new()
                } else {
                    format!(" [{}]", flags.join(", "))
                },
                width = width
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridline_constraint::SPACING_GRID;
    use gridline_policy::STARTER_POLICY;

    #[test]
    fn test_lists_every_rule() {
        let registry = RuleRegistry::load(STARTER_POLICY).unwrap();
        let lines = rule_lines(&registry);
        assert_eq!(lines.len(), registry.len());

        let spacing = lines.iter().find(|l| l.contains(SPACING_GRID)).unwrap();
        assert!(spacing.contains("project-wide"));
        assert!(spacing.ends_with("[autofix]"));
    }

    #[test]
    fn test_marks_disabled_rules() {
        let doc = format!("{}\n[rules.\"{}\"]\nenabled = false\n", STARTER_POLICY, SPACING_GRID);
        let registry = RuleRegistry::load(&doc).unwrap();
        let lines = rule_lines(&registry);
        let spacing = lines.iter().find(|l| l.contains(SPACING_GRID)).unwrap();
        assert!(spacing.ends_with("[autofix, disabled]"));
    }
}
