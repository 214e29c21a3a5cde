//! Bounded auto-fix loop with oscillation detection

use crate::evaluator::RuleEngine;
use crate::registry::RuleRegistry;
use crate::report::{Report, Reporter, Verdict};
use crate::rewriter::{FixFailure, FixItem, FixRequest, Rewriter};
use gridline_core::{CancellationToken, GridlineError, Location, Result};
use gridline_scan::SourceTree;
use std::collections::BTreeSet;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// How a fix run ended. Each variant carries the latest completed report.
#[derive(Debug, Clone, PartialEq)]
pub enum FixOutcome {
    Converged(Report),
    IterationLimitReached(Report),
    NoAutofixableViolations(Report),
    Cancelled(Report),
}

impl FixOutcome {
    pub fn report(&self) -> &Report {
        match self {
            FixOutcome::Converged(r)
            | FixOutcome::IterationLimitReached(r)
            | FixOutcome::NoAutofixableViolations(r)
            | FixOutcome::Cancelled(r) => r,
        }
    }

    pub fn is_converged(&self) -> bool {
        matches!(self, FixOutcome::Converged(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            FixOutcome::Converged(_) => "converged",
            FixOutcome::IterationLimitReached(_) => "iteration_limit_reached",
            FixOutcome::NoAutofixableViolations(_) => "no_autofixable_violations",
            FixOutcome::Cancelled(_) => "cancelled",
        }
    }
}

/// One rewrite round
#[derive(Debug, Clone, PartialEq)]
pub struct FixAttempt {
    pub iteration: u32,
    pub items: usize,
    pub units_written: usize,
    pub failures: Vec<FixFailure>,
    /// Set when the dispatch itself failed or timed out
    pub error: Option<String>,
}

impl FixAttempt {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of [`FixLoop::run`]
#[derive(Debug, Clone)]
pub struct FixRun {
    pub outcome: FixOutcome,
    /// One report per pass, oldest first
    pub history: Vec<Report>,
    pub attempts: Vec<FixAttempt>,
    /// Rewrite rounds dispatched
    pub iterations: u32,
    /// A violation came back after having been fixed
    pub oscillation_detected: bool,
}

type Fingerprint = (String, Option<Location>);

/// Tracks violations across passes to spot ones that reappear
#[derive(Debug, Default)]
struct OscillationTracker {
    ever_seen: BTreeSet<Fingerprint>,
    previous: BTreeSet<Fingerprint>,
    detected: bool,
}

impl OscillationTracker {
    fn observe(&mut self, report: &Report) {
        let current: BTreeSet<Fingerprint> = report
            .violations
            .iter()
            .map(|v| (v.rule_id.clone(), v.location.clone()))
            .collect();
        for fingerprint in &current {
            if self.ever_seen.contains(fingerprint) && !self.previous.contains(fingerprint) {
                if !self.detected {
                    tracing::warn!(
                        rule = %fingerprint.0,
                        location = ?fingerprint.1,
                        "violation reappeared after being fixed"
                    );
                }
                self.detected = true;
            }
        }
        self.ever_seen.extend(current.iter().cloned());
        self.previous = current;
    }
}

/// Drives scan, evaluate and rewrite until the tree complies or a bound is hit
pub struct FixLoop<'a> {
    registry: &'a RuleRegistry,
    tree: &'a dyn SourceTree,
    rewriter: &'a dyn Rewriter,
    timeout: Duration,
}

impl<'a> FixLoop<'a> {
    pub fn new(registry: &'a RuleRegistry, tree: &'a dyn SourceTree, rewriter: &'a dyn Rewriter) -> Self {
        Self {
            registry,
            tree,
            rewriter,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Per-iteration bound on a single rewrite dispatch
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run at most `max_iterations` rewrite rounds. A pass always follows the
    /// last round, so the outcome reflects the tree as it is on return.
    pub async fn run(&self, max_iterations: u32, cancel: &CancellationToken) -> Result<FixRun> {
        let mut engine = RuleEngine::new(self.registry);
        let mut history: Vec<Report> = Vec::new();
        let mut attempts: Vec<FixAttempt> = Vec::new();
        let mut tracker = OscillationTracker::default();
        let mut dispatched: u32 = 0;

        let outcome = loop {
            let report = {
                let loaded = self.tree.load()?;
                Reporter::summarize(engine.check_tree(&loaded)?)
            };
            tracker.observe(&report);
            history.push(report.clone());
            tracing::info!(
                pass = history.len(),
                violations = report.violation_count,
                warnings = report.warning_count,
                "fix loop pass"
            );

            if cancel.is_cancelled() {
                break FixOutcome::Cancelled(report);
            }
            if report.is_compliant {
                break FixOutcome::Converged(report);
            }

            let items: Vec<FixItem> = report.autofixable_violations().map(fix_item).collect();
            if items.is_empty() {
                break FixOutcome::NoAutofixableViolations(report);
            }
            if dispatched >= max_iterations {
                break FixOutcome::IterationLimitReached(report);
            }

            dispatched += 1;
            let request = FixRequest {
                iteration: dispatched,
                items,
            };
            let item_count = request.items.len();
            tracing::info!(iteration = dispatched, items = item_count, "dispatching rewrite");

            let dispatch = tokio::select! {
                _ = cancel.cancelled() => None,
                result = tokio::time::timeout(self.timeout, self.rewriter.rewrite(request)) => Some(result),
            };
            let Some(result) = dispatch else {
                tracing::info!(iteration = dispatched, "cancelled during rewrite");
                break FixOutcome::Cancelled(report);
            };

            let response = match result {
                Ok(Ok(response)) => Ok(response),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(GridlineError::RewriterTimeout(self.timeout)),
            };

            let attempt = match response {
                Ok(response) => {
                    let mut failures = response.failures;
                    let mut units_written = 0;
                    for unit in &response.units {
                        match self.tree.write(&unit.path, &unit.content) {
                            Ok(()) => units_written += 1,
                            // One unit failing to land never abandons the rest
                            Err(e) => {
                                tracing::warn!(path = %unit.path, error = %e, "could not write rewritten unit");
                                failures.push(FixFailure {
                                    rule_id: None,
                                    location: Some(Location::new(unit.path.clone(), 0)),
                                    reason: e.to_string(),
                                });
                            }
                        }
                    }
                    FixAttempt {
                        iteration: dispatched,
                        items: item_count,
                        units_written,
                        failures,
                        error: None,
                    }
                }
                Err(e) => {
                    tracing::warn!(iteration = dispatched, error = %e, "rewrite attempt failed");
                    FixAttempt {
                        iteration: dispatched,
                        items: item_count,
                        units_written: 0,
                        failures: Vec::new(),
                        error: Some(e.to_string()),
                    }
                }
            };
            attempts.push(attempt);

            if cancel.is_cancelled() {
                break FixOutcome::Cancelled(report);
            }
        };

        tracing::info!(outcome = outcome.label(), iterations = dispatched, "fix loop finished");
        Ok(FixRun {
            outcome,
            history,
            attempts,
            iterations: dispatched,
            oscillation_detected: tracker.detected,
        })
    }
}

fn fix_item(verdict: &Verdict) -> FixItem {
    FixItem {
        location: verdict.location.clone(),
        rule_id: verdict.rule_id.clone(),
        remediation_hint: verdict.remediation_hint.clone().unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SPACING_GRID;
    use crate::rewriter::{RewriteResponse, RewrittenUnit};
    use async_trait::async_trait;
    use gridline_policy::STARTER_POLICY;
    use gridline_scan::MemoryTree;
    use std::sync::atomic::{AtomicU32, Ordering};

    const OFF_GRID: &str = "<div className=\"p-[7px]\" />\n";
    const ON_GRID: &str = "<div className=\"p-2\" />\n";

    fn registry() -> RuleRegistry {
        RuleRegistry::load(STARTER_POLICY).unwrap()
    }

    /// Fixes only the first file named in each request
    struct OneFileAtATime<'t> {
        tree: &'t MemoryTree,
    }

    #[async_trait]
    impl Rewriter for OneFileAtATime<'_> {
        async fn rewrite(&self, request: FixRequest) -> Result<RewriteResponse> {
            let path = request.paths()[0].to_string();
            let content = self.tree.get(&path).unwrap_or_default().replace("p-[7px]", "p-2");
            Ok(RewriteResponse {
                units: vec![RewrittenUnit { path, content }],
                failures: Vec::new(),
            })
        }
    }

    /// Moves the off-grid value back and forth between two files
    struct PingPong {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Rewriter for PingPong {
        async fn rewrite(&self, _request: FixRequest) -> Result<RewriteResponse> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let (a, b) = if n % 2 == 0 { (ON_GRID, OFF_GRID) } else { (OFF_GRID, ON_GRID) };
            Ok(RewriteResponse {
                units: vec![
                    RewrittenUnit {
                        path: "a.tsx".to_string(),
                        content: a.to_string(),
                    },
                    RewrittenUnit {
                        path: "b.tsx".to_string(),
                        content: b.to_string(),
                    },
                ],
                failures: Vec::new(),
            })
        }
    }

    struct Failing;

    #[async_trait]
    impl Rewriter for Failing {
        async fn rewrite(&self, _request: FixRequest) -> Result<RewriteResponse> {
            Err(GridlineError::RewriterDispatch("model unavailable".to_string()))
        }
    }

    struct Slow;

    #[async_trait]
    impl Rewriter for Slow {
        async fn rewrite(&self, _request: FixRequest) -> Result<RewriteResponse> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(RewriteResponse::default())
        }
    }

    /// Cancels the run from inside the dispatch, then never answers
    struct CancelsAndHangs {
        token: CancellationToken,
    }

    #[async_trait]
    impl Rewriter for CancelsAndHangs {
        async fn rewrite(&self, _request: FixRequest) -> Result<RewriteResponse> {
            self.token.cancel();
            std::future::pending::<()>().await;
            Ok(RewriteResponse::default())
        }
    }

    /// Writes outside the tree
    struct Escaping;

    #[async_trait]
    impl Rewriter for Escaping {
        async fn rewrite(&self, _request: FixRequest) -> Result<RewriteResponse> {
            Ok(RewriteResponse {
                units: vec![RewrittenUnit {
                    path: "../outside.tsx".to_string(),
                    content: String::new(),
                }],
                failures: Vec::new(),
            })
        }
    }

    #[tokio::test]
    async fn test_already_compliant_converges_without_dispatch() {
        let registry = registry();
        let tree = MemoryTree::new().with_file("a.tsx", ON_GRID);
        let run = FixLoop::new(&registry, &tree, &Failing)
            .run(5, &CancellationToken::new())
            .await
            .unwrap();
        assert!(run.outcome.is_converged());
        assert_eq!(run.iterations, 0);
        assert!(run.attempts.is_empty());
        assert_eq!(run.history.len(), 1);
    }

    #[tokio::test]
    async fn test_converges_within_violating_file_count() {
        let registry = registry();
        let tree = MemoryTree::new()
            .with_file("a.tsx", OFF_GRID)
            .with_file("b.tsx", OFF_GRID)
            .with_file("c.tsx", OFF_GRID)
            .with_file("d.tsx", ON_GRID);
        let rewriter = OneFileAtATime { tree: &tree };
        let run = FixLoop::new(&registry, &tree, &rewriter)
            .run(5, &CancellationToken::new())
            .await
            .unwrap();

        assert!(run.outcome.is_converged(), "{:?}", run.outcome.label());
        assert!(run.iterations <= 3);
        assert_eq!(run.iterations, 3);
        assert_eq!(run.history.len(), 4);
        assert!(run.attempts.iter().all(|a| a.succeeded() && a.units_written == 1));
        assert!(!run.oscillation_detected);
        assert_eq!(tree.get("c.tsx").as_deref(), Some(ON_GRID));
    }

    #[tokio::test]
    async fn test_oscillation_hits_iteration_limit() {
        let registry = registry();
        let tree = MemoryTree::new()
            .with_file("a.tsx", OFF_GRID)
            .with_file("b.tsx", ON_GRID);
        let rewriter = PingPong {
            calls: AtomicU32::new(0),
        };
        let run = FixLoop::new(&registry, &tree, &rewriter)
            .run(3, &CancellationToken::new())
            .await
            .unwrap();

        assert!(matches!(run.outcome, FixOutcome::IterationLimitReached(_)));
        assert_eq!(run.iterations, 3);
        assert_eq!(run.attempts.len(), 3);
        assert_eq!(run.history.len(), 4);
        assert!(run.oscillation_detected);
        assert!(!run.outcome.report().is_compliant);
        // The outcome carries the latest report, not the first one
        assert_eq!(run.outcome.report(), run.history.last().unwrap());
    }

    #[tokio::test]
    async fn test_no_autofixable_violations() {
        let registry = RuleRegistry::load(&format!(
            "{}\n[rules.\"typography.size-allowlist\"]\nenabled = false\n",
            STARTER_POLICY
        ))
        .unwrap();
        let tree = MemoryTree::new().with_file(
            "a.tsx",
            "<p className=\"text-xs text-sm text-base text-lg text-2xl\" />",
        );
        let run = FixLoop::new(&registry, &tree, &Failing)
            .run(5, &CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(run.outcome, FixOutcome::NoAutofixableViolations(_)));
        assert_eq!(run.iterations, 0);
    }

    #[tokio::test]
    async fn test_failed_dispatch_consumes_iteration() {
        let registry = registry();
        let tree = MemoryTree::new().with_file("a.tsx", OFF_GRID);
        let run = FixLoop::new(&registry, &tree, &Failing)
            .run(2, &CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(run.outcome, FixOutcome::IterationLimitReached(_)));
        assert_eq!(run.iterations, 2);
        assert_eq!(run.attempts.len(), 2);
        assert!(run.attempts.iter().all(|a| !a.succeeded()));
        assert!(run.attempts[0].error.as_deref().unwrap().contains("model unavailable"));
    }

    #[tokio::test]
    async fn test_timeout_is_a_failed_attempt() {
        let registry = registry();
        let tree = MemoryTree::new().with_file("a.tsx", OFF_GRID);
        let run = FixLoop::new(&registry, &tree, &Slow)
            .timeout(Duration::from_millis(20))
            .run(1, &CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(run.outcome, FixOutcome::IterationLimitReached(_)));
        assert_eq!(run.attempts.len(), 1);
        assert_eq!(
            run.attempts[0].error.as_deref(),
            Some("Rewriter timed out after 20ms")
        );
    }

    #[tokio::test]
    async fn test_zero_iterations_never_dispatches() {
        let registry = registry();
        let tree = MemoryTree::new().with_file("a.tsx", OFF_GRID);
        let run = FixLoop::new(&registry, &tree, &Failing)
            .run(0, &CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(run.outcome, FixOutcome::IterationLimitReached(_)));
        assert!(run.attempts.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_during_dispatch() {
        let registry = registry();
        let tree = MemoryTree::new().with_file("a.tsx", OFF_GRID);
        let token = CancellationToken::new();
        let rewriter = CancelsAndHangs {
            token: token.clone(),
        };
        let run = tokio::time::timeout(
            Duration::from_secs(5),
            FixLoop::new(&registry, &tree, &rewriter).run(5, &token),
        )
        .await
        .expect("cancellation did not interrupt the dispatch")
        .unwrap();
        match &run.outcome {
            FixOutcome::Cancelled(report) => assert!(!report.is_compliant),
            other => panic!("expected cancelled, got {}", other.label()),
        }
        assert_eq!(run.history.len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_is_never_converged() {
        let registry = registry();
        let tree = MemoryTree::new().with_file("a.tsx", ON_GRID);
        let token = CancellationToken::new();
        token.cancel();
        let run = FixLoop::new(&registry, &tree, &Failing).run(5, &token).await.unwrap();
        assert!(matches!(run.outcome, FixOutcome::Cancelled(_)));
    }

    /// A tree whose writes to one path always fail
    struct ReadOnlyPath {
        inner: MemoryTree,
        locked: &'static str,
    }

    impl SourceTree for ReadOnlyPath {
        fn load(&self) -> Result<gridline_scan::LoadedTree> {
            self.inner.load()
        }

        fn write(&self, path: &str, content: &str) -> Result<()> {
            if path == self.locked {
                return Err(GridlineError::IoError(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "read-only",
                )));
            }
            self.inner.write(path, content)
        }
    }

    /// Fixes every file it is asked about
    struct FixesAll;

    #[async_trait]
    impl Rewriter for FixesAll {
        async fn rewrite(&self, request: FixRequest) -> Result<RewriteResponse> {
            Ok(RewriteResponse {
                units: request
                    .paths()
                    .into_iter()
                    .map(|path| RewrittenUnit {
                        path: path.to_string(),
                        content: ON_GRID.to_string(),
                    })
                    .collect(),
                failures: Vec::new(),
            })
        }
    }

    #[tokio::test]
    async fn test_write_error_is_recorded_and_run_continues() {
        let registry = registry();
        let tree = ReadOnlyPath {
            inner: MemoryTree::new()
                .with_file("a.tsx", OFF_GRID)
                .with_file("b.tsx", OFF_GRID)
                .with_file("c.tsx", OFF_GRID),
            locked: "b.tsx",
        };
        let run = FixLoop::new(&registry, &tree, &FixesAll)
            .run(2, &CancellationToken::new())
            .await
            .unwrap();

        assert!(matches!(run.outcome, FixOutcome::IterationLimitReached(_)));
        assert_eq!(run.attempts.len(), 2);
        let first = &run.attempts[0];
        assert!(first.succeeded());
        assert_eq!(first.units_written, 2);
        assert_eq!(first.failures.len(), 1);
        assert_eq!(first.failures[0].location, Some(Location::new("b.tsx", 0)));
        assert!(first.failures[0].reason.contains("read-only"));

        assert_eq!(tree.inner.get("a.tsx").as_deref(), Some(ON_GRID));
        assert_eq!(tree.inner.get("c.tsx").as_deref(), Some(ON_GRID));
        let remaining = run.outcome.report();
        assert_eq!(remaining.violation_count, 1);
        assert_eq!(remaining.violations[0].location, Some(Location::new("b.tsx", 1)));
    }

    #[tokio::test]
    async fn test_rejected_paths_are_recorded() {
        let registry = registry();
        let tree = MemoryTree::new().with_file("a.tsx", OFF_GRID);
        let run = FixLoop::new(&registry, &tree, &Escaping)
            .run(1, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(run.attempts[0].units_written, 0);
        assert_eq!(run.attempts[0].failures.len(), 1);
        assert!(run.attempts[0].succeeded());
        let remaining = run.outcome.report();
        assert_eq!(remaining.violations[0].rule_id, SPACING_GRID);
    }
}
