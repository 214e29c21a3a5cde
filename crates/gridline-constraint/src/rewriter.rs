//! The external rewriter interface

use async_trait::async_trait;
use gridline_core::{ConfigError, GridlineError, Location, Result};
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// One violation the rewriter is asked to fix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixItem {
    pub location: Option<Location>,
    pub rule_id: String,
    pub remediation_hint: String,
}

/// Everything handed to the rewriter in one iteration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixRequest {
    /// 1-based rewrite round
    pub iteration: u32,
    pub items: Vec<FixItem>,
}

impl FixRequest {
    /// Distinct paths the request touches, sorted
    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self
            .items
            .iter()
            .filter_map(|i| i.location.as_ref().map(|l| l.path.as_str()))
            .collect();
        paths.sort_unstable();
        paths.dedup();
        paths
    }
}

/// New content for one unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewrittenUnit {
    pub path: String,
    pub content: String,
}

/// An item the rewriter could not handle, or a unit that could not be written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixFailure {
    #[serde(default)]
    pub rule_id: Option<String>,
    #[serde(default)]
    pub location: Option<Location>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RewriteResponse {
    #[serde(default)]
    pub units: Vec<RewrittenUnit>,
    #[serde(default)]
    pub failures: Vec<FixFailure>,
}

/// Performs the edits. The engine never trusts the result and always
/// re-verifies with a fresh scan.
#[async_trait]
pub trait Rewriter: Send + Sync {
    async fn rewrite(&self, request: FixRequest) -> Result<RewriteResponse>;
}

/// Runs an external command per request: the request goes to stdin as JSON,
/// the response is read from stdout as JSON.
#[derive(Debug, Clone)]
pub struct CommandRewriter {
    program: String,
    args: Vec<String>,
}

impl CommandRewriter {
    pub fn new(command: &[String]) -> std::result::Result<Self, ConfigError> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| ConfigError::MissingField("fix.rewriter".to_string()))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

#[async_trait]
impl Rewriter for CommandRewriter {
    async fn rewrite(&self, request: FixRequest) -> Result<RewriteResponse> {
        let payload = serde_json::to_vec(&request)
            .map_err(|e| GridlineError::Serialization(e.to_string()))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| GridlineError::RewriterDispatch(format!("{}: {}", self.program, e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| GridlineError::RewriterDispatch("stdin not captured".to_string()))?;
        if let Err(e) = stdin.write_all(&payload).await {
            // A rewriter may exit without reading its input; its exit status decides
            if e.kind() != std::io::ErrorKind::BrokenPipe {
                return Err(GridlineError::RewriterDispatch(format!("writing request: {}", e)));
            }
        }
        // Close stdin so the rewriter sees end of input
        drop(stdin);

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| GridlineError::RewriterDispatch(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GridlineError::RewriterDispatch(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| GridlineError::RewriterDispatch(format!("invalid response: {}", e)))
    }
}
