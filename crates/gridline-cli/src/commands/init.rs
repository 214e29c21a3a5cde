//! Starter policy command

use anyhow::Result;
use gridline_policy::STARTER_POLICY;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

pub fn run(root: &Path) -> Result<ExitCode> {
    let path = write_starter(root)?;

    println!("Created {}", path.display());
    println!();
    println!("Next steps:");
    println!("  Edit the token scales and color roles to match your design system");
    println!("  gridline check {}", root.display());

    Ok(ExitCode::SUCCESS)
}

fn write_starter(root: &Path) -> Result<PathBuf> {
    let path = root.join("gridline.toml");
    if path.exists() {
        anyhow::bail!("'{}' already exists", path.display());
    }
    fs::create_dir_all(root)?;
    fs::write(&path, STARTER_POLICY)?;
    Ok(path)
}
