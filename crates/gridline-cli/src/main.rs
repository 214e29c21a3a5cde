//! Gridline CLI - Command-line interface for the design-system compliance engine

mod commands;

use clap::{Parser, Subcommand};
use commands::{check, fix, init, rules, OutputFormat};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "gridline")]
#[command(about = "Design-system compliance checks with a bounded auto-fix loop", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log output (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a source tree against the design-system policy
    Check {
        /// Root of the source tree
        #[arg(default_value = ".")]
        root: PathBuf,

        /// Path to the policy document
        #[arg(long)]
        policy: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Hand autofixable violations to a rewriter until the tree complies
    Fix {
        /// Root of the source tree
        #[arg(default_value = ".")]
        root: PathBuf,

        /// Path to the policy document
        #[arg(long)]
        policy: Option<PathBuf>,

        /// Maximum number of rewrite rounds
        #[arg(long)]
        max_iterations: Option<u32>,

        /// Per-round rewriter timeout in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Rewriter command and its arguments
        #[arg(long, num_args = 1.., allow_hyphen_values = true)]
        rewriter: Option<Vec<String>>,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// List the rules the policy enables
    Rules {
        /// Path to the policy document
        #[arg(long)]
        policy: Option<PathBuf>,

        /// Root used to discover the policy document
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },

    /// Write a starter policy document
    Init {
        /// Directory to write gridline.toml into
        #[arg(default_value = ".")]
        root: PathBuf,
    },
}

fn init_logging(verbose: u8, quiet: bool) {
    let default_level = if quiet {
        tracing::Level::ERROR
    } else {
        match verbose {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            _ => tracing::Level::DEBUG,
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let result = match cli.command {
        Commands::Check {
            root,
            policy,
            format,
        } => check::run(check::CheckArgs {
            root,
            policy,
            format,
        }),
        Commands::Fix {
            root,
            policy,
            max_iterations,
            timeout_secs,
            rewriter,
            format,
        } => fix::run(fix::FixArgs {
            root,
            policy,
            max_iterations,
            timeout_secs,
            rewriter,
            format,
        }),
        Commands::Rules { policy, root } => rules::run(&root, policy.as_deref()),
        Commands::Init { root } => init::run(&root),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_fix_flags() {
        let cli = Cli::try_parse_from([
            "gridline",
            "fix",
            "web",
            "--max-iterations",
            "3",
            "--format",
            "json",
            "--rewriter",
            "my-rewriter",
            "--json",
        ])
        .unwrap();
        match cli.command {
            Commands::Fix {
                root,
                max_iterations,
                rewriter,
                format,
                ..
            } => {
                assert_eq!(root, PathBuf::from("web"));
                assert_eq!(max_iterations, Some(3));
                assert_eq!(format, OutputFormat::Json);
                assert_eq!(
                    rewriter,
                    Some(vec!["my-rewriter".to_string(), "--json".to_string()])
                );
            }
            _ => panic!("expected fix"),
        }
    }

    #[test]
    fn test_verbosity_flags() {
        let cli = Cli::try_parse_from(["gridline", "check", "-vv"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(Cli::try_parse_from(["gridline", "check", "-v", "-q"]).is_err());
    }
}
