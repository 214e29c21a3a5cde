//! Project-wide aggregation of per-file token sets
//!
//! [`AggregateMetrics`] is a commutative monoid: [`AggregateMetrics::empty`]
//! is the identity and [`AggregateMetrics::merge`] the operation. Ordered
//! containers and a sorted occurrence list keep the result identical for any
//! order or batching of the inputs, so the fold can run on the rayon pool.

use gridline_core::{GridlineError, Location, Result};
use gridline_policy::ColorRole;
use gridline_scan::TokenSet;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// A spacing value off the base grid
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpacingOccurrence {
    pub location: Location,
    /// Raw token text, e.g. `p-[7px]`
    pub value: String,
    pub px: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregateMetrics {
    pub distinct_size_tokens: BTreeSet<String>,
    pub distinct_weight_tokens: BTreeSet<String>,
    pub size_token_counts: BTreeMap<String, u64>,
    pub weight_token_counts: BTreeMap<String, u64>,
    pub color_role_counts: BTreeMap<ColorRole, u64>,
    /// Sorted by location, then value
    pub custom_spacing_occurrences: Vec<SpacingOccurrence>,
}

impl AggregateMetrics {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Combine two partial aggregates
    pub fn merge(mut self, other: AggregateMetrics) -> AggregateMetrics {
        self.distinct_size_tokens.extend(other.distinct_size_tokens);
        self.distinct_weight_tokens.extend(other.distinct_weight_tokens);
        add_counts(&mut self.size_token_counts, other.size_token_counts);
        add_counts(&mut self.weight_token_counts, other.weight_token_counts);
        add_counts(&mut self.color_role_counts, other.color_role_counts);
        self.custom_spacing_occurrences
            .extend(other.custom_spacing_occurrences);
        sort_occurrences(&mut self.custom_spacing_occurrences);
        self
    }

    /// Total color-role usages across all roles
    pub fn color_role_total(&self) -> u64 {
        self.color_role_counts.values().sum()
    }

    pub fn role_count(&self, role: ColorRole) -> u64 {
        self.color_role_counts.get(&role).copied().unwrap_or(0)
    }

    /// Check the structural invariants. A failure means a bug, and the run
    /// must stop rather than report on inconsistent numbers.
    pub fn verify(&self) -> Result<()> {
        let size_keys: BTreeSet<&String> = self.size_token_counts.keys().collect();
        let size_distinct: BTreeSet<&String> = self.distinct_size_tokens.iter().collect();
        if size_keys != size_distinct {
            return Err(GridlineError::AggregationInvariant(
                "distinct size tokens differ from counted size tokens".to_string(),
            ));
        }
        let weight_keys: BTreeSet<&String> = self.weight_token_counts.keys().collect();
        let weight_distinct: BTreeSet<&String> = self.distinct_weight_tokens.iter().collect();
        if weight_keys != weight_distinct {
            return Err(GridlineError::AggregationInvariant(
                "distinct weight tokens differ from counted weight tokens".to_string(),
            ));
        }

        let zero_count = self
            .size_token_counts
            .values()
            .chain(self.weight_token_counts.values())
            .chain(self.color_role_counts.values())
            .any(|&n| n == 0);
        if zero_count {
            return Err(GridlineError::AggregationInvariant(
                "a counted key has a zero count".to_string(),
            ));
        }

        let sorted = self
            .custom_spacing_occurrences
            .windows(2)
            .all(|w| occurrence_key(&w[0]) <= occurrence_key(&w[1]));
        if !sorted {
            return Err(GridlineError::AggregationInvariant(
                "custom spacing occurrences are out of order".to_string(),
            ));
        }
        if let Some(bad) = self
            .custom_spacing_occurrences
            .iter()
            .find(|o| !o.px.is_finite() || o.px < 0.0)
        {
            return Err(GridlineError::AggregationInvariant(format!(
                "spacing occurrence at {} has no valid pixel value",
                bad.location
            )));
        }
        Ok(())
    }
}

/// Folds token sets into [`AggregateMetrics`]
#[derive(Debug, Clone, Copy)]
pub struct Aggregator {
    spacing_base_unit: u32,
}

impl Aggregator {
    pub fn new(spacing_base_unit: u32) -> Self {
        Self { spacing_base_unit }
    }

    /// Add one unit's tokens to an aggregate
    pub fn fold_one(&self, mut acc: AggregateMetrics, set: &TokenSet) -> AggregateMetrics {
        for token in set.sizes() {
            acc.distinct_size_tokens.insert(token.value.clone());
            *acc.size_token_counts.entry(token.value.clone()).or_insert(0) += 1;
        }
        for token in set.weights() {
            acc.distinct_weight_tokens.insert(token.value.clone());
            *acc.weight_token_counts.entry(token.value.clone()).or_insert(0) += 1;
        }
        for (role, _) in set.colors() {
            *acc.color_role_counts.entry(role).or_insert(0) += 1;
        }
        for token in set.spacing() {
            let Some(px) = token.spacing_px() else {
                continue;
            };
            if !self.is_on_grid(px) {
                acc.custom_spacing_occurrences.push(SpacingOccurrence {
                    location: Location::new(set.path.clone(), token.line),
                    value: token.value.clone(),
                    px,
                });
            }
        }
        sort_occurrences(&mut acc.custom_spacing_occurrences);
        acc
    }

    /// Fold every token set, in parallel
    pub fn aggregate(&self, token_sets: &[TokenSet]) -> AggregateMetrics {
        token_sets
            .par_iter()
            .fold(AggregateMetrics::empty, |acc, set| self.fold_one(acc, set))
            .reduce(AggregateMetrics::empty, AggregateMetrics::merge)
    }

    pub fn is_on_grid(&self, px: f64) -> bool {
        let steps = px / f64::from(self.spacing_base_unit);
        (steps - steps.round()).abs() < 1e-9
    }
}

fn add_counts<K: Ord>(into: &mut BTreeMap<K, u64>, from: BTreeMap<K, u64>) {
    for (key, n) in from {
        *into.entry(key).or_insert(0) += n;
    }
}

fn occurrence_key(o: &SpacingOccurrence) -> (&Location, &str) {
    (&o.location, o.value.as_str())
}

fn sort_occurrences(list: &mut [SpacingOccurrence]) {
    list.sort_by(|a, b| occurrence_key(a).cmp(&occurrence_key(b)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridline_scan::TokenKind;

    fn set(path: &str, tokens: &[(TokenKind, &str, usize)]) -> TokenSet {
        let mut set = TokenSet::new(path);
        for (kind, value, line) in tokens {
            set.push(kind.clone(), *value, *line);
        }
        set
    }

    fn sample() -> Vec<TokenSet> {
        vec![
            set(
                "a.tsx",
                &[
                    (TokenKind::Size, "text-sm", 1),
                    (TokenKind::Weight, "font-normal", 1),
                    (TokenKind::Spacing, "p-[7px]", 2),
                    (TokenKind::Color { role: ColorRole::Accent }, "bg-primary", 3),
                ],
            ),
            set(
                "b.tsx",
                &[
                    (TokenKind::Size, "text-lg", 4),
                    (TokenKind::Size, "text-sm", 5),
                    (TokenKind::Spacing, "p-4", 6),
                    (TokenKind::Spacing, "13px", 7),
                    (TokenKind::Color { role: ColorRole::Neutral }, "bg-background", 8),
                ],
            ),
            set(
                "c.css",
                &[
                    (TokenKind::Weight, "600", 1),
                    (TokenKind::Spacing, "0", 2),
                    (TokenKind::Color { role: ColorRole::Neutral }, "var(--muted)", 3),
                ],
            ),
        ]
    }

    #[test]
    fn test_aggregate_counts() {
        let metrics = Aggregator::new(8).aggregate(&sample());
        assert_eq!(metrics.distinct_size_tokens.len(), 2);
        assert_eq!(metrics.size_token_counts["text-sm"], 2);
        assert_eq!(metrics.weight_token_counts.len(), 2);
        assert_eq!(metrics.role_count(ColorRole::Neutral), 2);
        assert_eq!(metrics.role_count(ColorRole::Complementary), 0);
        assert_eq!(metrics.color_role_total(), 3);

        let custom: Vec<(String, &str)> = metrics
            .custom_spacing_occurrences
            .iter()
            .map(|o| (o.location.to_string(), o.value.as_str()))
            .collect();
        assert_eq!(
            custom,
            vec![("a.tsx:2".to_string(), "p-[7px]"), ("b.tsx:7".to_string(), "13px")]
        );
        metrics.verify().unwrap();
    }

    #[test]
    fn test_fold_order_independence() {
        let sets = sample();
        let aggregator = Aggregator::new(8);
        let forward = aggregator.aggregate(&sets);

        let mut reversed = sets.clone();
        reversed.reverse();
        assert_eq!(aggregator.aggregate(&reversed), forward);

        let sequential = sets
            .iter()
            .rev()
            .fold(AggregateMetrics::empty(), |acc, s| aggregator.fold_one(acc, s));
        assert_eq!(sequential, forward);

        let left = aggregator.fold_one(AggregateMetrics::empty(), &sets[2]);
        let right = aggregator.aggregate(&sets[..2]);
        assert_eq!(left.merge(right), forward);
    }

    #[test]
    fn test_empty_is_identity() {
        let metrics = Aggregator::new(8).aggregate(&sample());
        assert_eq!(metrics.clone().merge(AggregateMetrics::empty()), metrics);
        assert_eq!(AggregateMetrics::empty().merge(metrics.clone()), metrics);
        assert_eq!(Aggregator::new(8).aggregate(&[]), AggregateMetrics::empty());
    }

    #[test]
    fn test_grid_membership() {
        let aggregator = Aggregator::new(8);
        assert!(aggregator.is_on_grid(0.0));
        assert!(aggregator.is_on_grid(16.0));
        assert!(!aggregator.is_on_grid(7.0));
        assert!(!aggregator.is_on_grid(12.0));
        assert!(Aggregator::new(4).is_on_grid(12.0));
    }

    #[test]
    fn test_verify_rejects_inconsistent_sets() {
        let mut metrics = Aggregator::new(8).aggregate(&sample());
        metrics.distinct_size_tokens.insert("text-xl".to_string());
        assert!(matches!(
            metrics.verify(),
            Err(GridlineError::AggregationInvariant(_))
        ));
    }

    #[test]
    fn test_verify_rejects_unsorted_occurrences() {
        let mut metrics = Aggregator::new(8).aggregate(&sample());
        metrics.custom_spacing_occurrences.reverse();
        assert!(metrics.verify().is_err());
    }
}
