//! Rule evaluation engine

use crate::aggregate::{AggregateMetrics, Aggregator};
use crate::registry::RuleRegistry;
use crate::report::Verdict;
use gridline_core::Result;
use gridline_scan::{LoadedTree, SourceUnit, TokenExtractor, TokenSet, UnreadableFile};
use rayon::prelude::*;
use std::fmt;

/// Where the engine is in a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Scanning,
    Evaluating,
    Done,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::Idle => write!(f, "idle"),
            EngineState::Scanning => write!(f, "scanning"),
            EngineState::Evaluating => write!(f, "evaluating"),
            EngineState::Done => write!(f, "done"),
        }
    }
}

/// A completed scan: every unit extracted and aggregated.
///
/// Only [`RuleEngine::scan`] builds one, so rules never see partial aggregates.
#[derive(Debug, Clone)]
pub struct ScanPass {
    /// In unit order
    pub(crate) token_sets: Vec<TokenSet>,
    pub(crate) unreadable: Vec<UnreadableFile>,
    pub(crate) aggregates: AggregateMetrics,
}

impl ScanPass {
    pub fn token_sets(&self) -> &[TokenSet] {
        &self.token_sets
    }

    pub fn unreadable(&self) -> &[UnreadableFile] {
        &self.unreadable
    }

    pub fn aggregates(&self) -> &AggregateMetrics {
        &self.aggregates
    }
}

/// Evaluates the registry's rules against source units
pub struct RuleEngine<'a> {
    registry: &'a RuleRegistry,
    extractor: TokenExtractor,
    aggregator: Aggregator,
    state: EngineState,
}

impl<'a> RuleEngine<'a> {
    pub fn new(registry: &'a RuleRegistry) -> Self {
        let config = registry.config();
        Self {
            registry,
            extractor: TokenExtractor::new(config),
            aggregator: Aggregator::new(config.spacing_base_unit),
            state: EngineState::Idle,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    fn transition(&mut self, next: EngineState) {
        tracing::debug!(from = %self.state, to = %next, "engine state");
        self.state = next;
    }

    /// Extract every unit in parallel, then aggregate and verify
    pub fn scan(&mut self, units: &[SourceUnit]) -> Result<ScanPass> {
        self.transition(EngineState::Scanning);

        let extractor = &self.extractor;
        let token_sets: Vec<TokenSet> = units.par_iter().map(|u| extractor.extract(u)).collect();

        let aggregates = self.aggregator.aggregate(&token_sets);
        if let Err(e) = aggregates.verify() {
            self.transition(EngineState::Idle);
            return Err(e);
        }

        tracing::debug!(
            units = token_sets.len(),
            distinct_sizes = aggregates.distinct_size_tokens.len(),
            custom_spacing = aggregates.custom_spacing_occurrences.len(),
            "scan complete"
        );
        Ok(ScanPass {
            token_sets,
            unreadable: Vec::new(),
            aggregates,
        })
    }

    /// Scan a loaded tree, carrying its unreadable files into the pass
    pub fn scan_tree(&mut self, tree: &LoadedTree) -> Result<ScanPass> {
        let mut pass = self.scan(&tree.units)?;
        pass.unreadable = tree.unreadable.clone();
        Ok(pass)
    }

    /// Run every enabled rule in registry order
    pub fn evaluate(&mut self, pass: &ScanPass) -> Vec<Verdict> {
        self.transition(EngineState::Evaluating);
        let config = self.registry.config();

        let mut verdicts = Vec::new();
        for rule in self.registry.enabled() {
            let found = rule.check(pass, config);
            tracing::debug!(rule = %rule.id, verdicts = found.len(), "evaluated rule");
            verdicts.extend(found);
        }

        self.transition(EngineState::Done);
        verdicts
    }

    /// Scan and evaluate
    pub fn check(&mut self, units: &[SourceUnit]) -> Result<Vec<Verdict>> {
        let pass = self.scan(units)?;
        Ok(self.evaluate(&pass))
    }

    /// Scan and evaluate a loaded tree
    pub fn check_tree(&mut self, tree: &LoadedTree) -> Result<Vec<Verdict>> {
        let pass = self.scan_tree(tree)?;
        Ok(self.evaluate(&pass))
    }
}
