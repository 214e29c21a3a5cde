//! CLI command implementations

pub mod check;
pub mod fix;
pub mod init;
pub mod rules;

use anyhow::{Context, Result};
use gridline_constraint::{Report, RuleRegistry, Verdict, VerdictStatus};
use gridline_policy::{discover_policy, RunSettings, POLICY_FILE_NAMES};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Policy, registry and run settings for one invocation
pub struct Project {
    pub policy_path: PathBuf,
    pub registry: RuleRegistry,
    pub settings: RunSettings,
}

impl Project {
    pub fn load(root: &Path, explicit: Option<&Path>) -> Result<Self> {
        let policy_path = discover_policy(root, explicit).with_context(|| {
            format!(
                "no policy document under {} (looked for {}); run `gridline init`",
                root.display(),
                POLICY_FILE_NAMES.join(", ")
            )
        })?;

        let content = std::fs::read_to_string(&policy_path)
            .with_context(|| format!("reading policy {}", policy_path.display()))?;
        let registry = RuleRegistry::load(&content)
            .with_context(|| format!("invalid policy {}", policy_path.display()))?;
        let settings = RunSettings::load(Some(&content))
            .with_context(|| format!("invalid run settings in {}", policy_path.display()))?;

        tracing::info!(policy = %policy_path.display(), rules = registry.len(), "loaded policy");
        Ok(Self {
            policy_path,
            registry,
            settings,
        })
    }
}

pub fn print_report_text(report: &Report) {
    if report.violations.is_empty() && report.warnings.is_empty() {
        println!("All design-system rules passed.");
        println!("{}", report.summary());
        return;
    }

    println!("{}", report.summary());
    println!();

    for verdict in report.violations.iter().chain(report.warnings.iter()) {
        println!("  {}", verdict_line(verdict));
        if let Some(hint) = &verdict.remediation_hint {
            println!("          hint: {}", hint);
        }
    }
}

fn verdict_line(verdict: &Verdict) -> String {
    let status = match verdict.status {
        VerdictStatus::Violation => "ERROR",
        VerdictStatus::Warning => "WARN ",
        VerdictStatus::Pass => "PASS ",
    };
    let location = verdict
        .location
        .as_ref()
        .map(|l| l.to_string())
        .unwrap_or_else(|| "(project)".to_string());
    let fix_marker = if verdict.autofixable { " [fixable]" } else { "" };
    format!(
        "[{}] {} {}: expected {}, found {}{}",
        status, location, verdict.rule_id, verdict.expected, verdict.actual, fix_marker
    )
}
