//! Compliance check command

use super::{print_report_text, OutputFormat, Project};
use anyhow::Result;
use gridline_constraint::{Report, Reporter, RuleEngine};
use gridline_scan::{FsTree, SourceTree};
use std::path::PathBuf;
use std::process::ExitCode;

pub struct CheckArgs {
    pub root: PathBuf,
    pub policy: Option<PathBuf>,
    pub format: OutputFormat,
}

pub fn run(args: CheckArgs) -> Result<ExitCode> {
    let report = check(&args)?;

    match args.format {
        OutputFormat::Json => println!("{}", report.to_json()?),
        OutputFormat::Text => print_report_text(&report),
    }

    Ok(if report.is_compliant {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn check(args: &CheckArgs) -> Result<Report> {
    let project = Project::load(&args.root, args.policy.as_deref())?;
    let tree = FsTree::new(&args.root, &project.settings.scan)?;
    let loaded = tree.load()?;
    tracing::info!(
        root = %args.root.display(),
        units = loaded.units.len(),
        unreadable = loaded.unreadable.len(),
        "loaded source tree"
    );

    let mut engine = RuleEngine::new(&project.registry);
    let verdicts = engine.check_tree(&loaded)?;
    Ok(Reporter::summarize(verdicts))
}
