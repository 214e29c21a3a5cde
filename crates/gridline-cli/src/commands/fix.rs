//! Auto-fix command

use super::{print_report_text, OutputFormat, Project};
use anyhow::{Context, Result};
use gridline_constraint::{CommandRewriter, FixLoop, FixOutcome, FixRun};
use gridline_core::CancellationToken;
use gridline_policy::FixSettings;
use gridline_scan::FsTree;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

pub struct FixArgs {
    pub root: PathBuf,
    pub policy: Option<PathBuf>,
    pub max_iterations: Option<u32>,
    pub timeout_secs: Option<u64>,
    pub rewriter: Option<Vec<String>>,
    pub format: OutputFormat,
}

pub fn run(args: FixArgs) -> Result<ExitCode> {
    let run = fix(&args)?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&run_json(&run)?)?),
        OutputFormat::Text => print_run_text(&run),
    }

    Ok(if run.outcome.is_converged() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn fix(args: &FixArgs) -> Result<FixRun> {
    let project = Project::load(&args.root, args.policy.as_deref())?;
    let settings = apply_flags(project.settings.fix.clone(), args)?;
    let rewriter = CommandRewriter::new(&settings.rewriter).context(
        "no rewriter configured; set [fix].rewriter, GRIDLINE_REWRITER or --rewriter",
    )?;
    let tree = FsTree::new(&args.root, &project.settings.scan)?;

    let runtime = tokio::runtime::Runtime::new()?;
    let run = runtime.block_on(async {
        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, stopping after the current step");
                on_interrupt.cancel();
            }
        });

        FixLoop::new(&project.registry, &tree, &rewriter)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .run(settings.max_iterations, &cancel)
            .await
    })?;
    Ok(run)
}

/// CLI flags win over every settings layer
fn apply_flags(mut settings: FixSettings, args: &FixArgs) -> Result<FixSettings> {
    if let Some(n) = args.max_iterations {
        settings.max_iterations = n;
    }
    if let Some(secs) = args.timeout_secs {
        if secs == 0 {
            anyhow::bail!("--timeout-secs must be a positive number of seconds");
        }
        settings.timeout_secs = secs;
    }
    if let Some(command) = &args.rewriter {
        settings.rewriter = command.clone();
    }
    Ok(settings)
}

fn print_run_text(run: &FixRun) {
    let headline = match &run.outcome {
        FixOutcome::Converged(_) => "Converged",
        FixOutcome::IterationLimitReached(_) => "Stopped: iteration limit reached",
        FixOutcome::NoAutofixableViolations(_) => "Stopped: no autofixable violations remain",
        FixOutcome::Cancelled(_) => "Cancelled",
    };
    println!("{} ({} iteration(s)).", headline, run.iterations);

    for attempt in &run.attempts {
        match &attempt.error {
            Some(error) => println!(
                "  [{}] {} item(s): failed: {}",
                attempt.iteration, attempt.items, error
            ),
            None => println!(
                "  [{}] {} item(s): {} file(s) rewritten, {} failure(s)",
                attempt.iteration,
                attempt.items,
                attempt.units_written,
                attempt.failures.len()
            ),
        }
        for failure in &attempt.failures {
            let location = failure
                .location
                .as_ref()
                .map(|l| l.to_string())
                .unwrap_or_else(|| "(project)".to_string());
            println!("      {}: {}", location, failure.reason);
        }
    }

    if run.oscillation_detected {
        println!("  Warning: fixes oscillated; a violation came back after being fixed.");
    }

    println!();
    print_report_text(run.outcome.report());
}

fn run_json(run: &FixRun) -> Result<serde_json::Value> {
    let attempts: Vec<serde_json::Value> = run
        .attempts
        .iter()
        .map(|a| {
            serde_json::json!({
                "iteration": a.iteration,
                "items": a.items,
                "units_written": a.units_written,
                "failures": a.failures,
                "error": a.error,
            })
        })
        .collect();

    Ok(serde_json::json!({
        "outcome": run.outcome.label(),
        "iterations": run.iterations,
        "oscillation_detected": run.oscillation_detected,
        "attempts": attempts,
        "report": serde_json::to_value(run.outcome.report())?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> FixArgs {
        FixArgs {
            root: PathBuf::from("."),
            policy: None,
            max_iterations: None,
            timeout_secs: None,
            rewriter: None,
            format: OutputFormat::Text,
        }
    }

    #[test]
    fn test_flags_override_settings() {
        let settings = FixSettings {
            max_iterations: 5,
            timeout_secs: 120,
            rewriter: vec!["from-policy".to_string()],
        };
        let mut args = args();
        args.max_iterations = Some(2);
        args.rewriter = Some(vec!["from-flag".to_string()]);

        let applied = apply_flags(settings, &args).unwrap();
        assert_eq!(applied.max_iterations, 2);
        assert_eq!(applied.timeout_secs, 120);
        assert_eq!(applied.rewriter, vec!["from-flag".to_string()]);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut args = args();
        args.timeout_secs = Some(0);
        assert!(apply_flags(FixSettings::default(), &args).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_fix_with_command_rewriter() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("gridline.toml"),
            gridline_policy::STARTER_POLICY,
        )
        .unwrap();
        std::fs::write(dir.path().join("Card.tsx"), "<div className=\"p-[7px]\" />\n").unwrap();

        let script = r#"cat > /dev/null; printf '%s' '{"units":[{"path":"Card.tsx","content":"<div className=\"p-2\" />\n"}]}'"#;
        let mut args = args();
        args.root = dir.path().to_path_buf();
        args.rewriter = Some(vec!["sh".to_string(), "-c".to_string(), script.to_string()]);

        let run = fix(&args).unwrap();
        assert!(run.outcome.is_converged());
        assert_eq!(run.iterations, 1);
        let fixed = std::fs::read_to_string(dir.path().join("Card.tsx")).unwrap();
        assert!(fixed.contains("p-2"));
    }
}
