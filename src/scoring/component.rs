use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::analyzer::filters::normalize_filters;
use crate::analyzer::QueryStructure;

/// Precision, recall and F1 of one set comparison.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SetScores {
    /// `|expected ∩ generated| / |generated|`, 0 when nothing was generated.
    pub precision: f64,
    /// `|expected ∩ generated| / |expected|`, 0 when nothing was expected.
    pub recall: f64,
    /// Harmonic mean of precision and recall, 0 when both are 0.
    pub f1: f64,
}

/// Compare a generated set against the expected set.
///
/// Two empty sets score 0, not 1: an empty component carries no evidence.
pub fn compute_set_scores<T: Ord>(expected: &BTreeSet<T>, generated: &BTreeSet<T>) -> SetScores {
    let overlap = expected.intersection(generated).count() as f64;
    let precision = ratio(overlap, generated.len() as f64);
    let recall = ratio(overlap, expected.len() as f64);
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };
    SetScores {
        precision,
        recall,
        f1,
    }
}

/// F1 between two component sets.
pub fn compute_component_f1<T: Ord>(expected: &BTreeSet<T>, generated: &BTreeSet<T>) -> f64 {
    compute_set_scores(expected, generated).f1
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// Scored dimension of a [`QueryStructure`] comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    /// Tables or labels.
    Entity,
    /// `entity,field` pairs.
    Attribute,
    /// Joins or edges as `(kind, source, target)`.
    Relation,
    /// Atomic normalized predicates.
    Filter,
    /// Aggregate function names.
    Aggregation,
    /// Projected columns.
    ReturnColumn,
}

/// F1 of one dimension plus whether the dimension applies at all.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DimensionScore {
    /// The F1 value (0 when not applicable).
    pub f1: f64,
    /// False when both expected and generated sets are empty.
    pub applicable: bool,
}

fn dimension_score<T: Ord>(expected: &BTreeSet<T>, generated: &BTreeSet<T>) -> DimensionScore {
    DimensionScore {
        f1: compute_component_f1(expected, generated),
        applicable: !(expected.is_empty() && generated.is_empty()),
    }
}

/// Component-level comparison of a generated structure against the expected one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComponentScores {
    /// Tables or labels.
    pub entity: DimensionScore,
    /// `entity,field` pairs.
    pub attribute: DimensionScore,
    /// Joins or edges.
    pub relation: DimensionScore,
    /// Filters after [`normalize_filters`] on both sides.
    pub filter: DimensionScore,
    /// Aggregate function names only.
    pub aggregation: DimensionScore,
    /// Return columns as sets.
    pub return_column: DimensionScore,
}

impl ComponentScores {
    /// Score every dimension of `generated` against `expected`.
    pub fn compare(expected: &QueryStructure, generated: &QueryStructure) -> Self {
        Self {
            entity: dimension_score(&expected.entities, &generated.entities),
            attribute: dimension_score(&expected.attributes, &generated.attributes),
            relation: dimension_score(&expected.relation_keys(), &generated.relation_keys()),
            filter: dimension_score(
                &normalize_filters(&expected.filters),
                &normalize_filters(&generated.filters),
            ),
            aggregation: dimension_score(
                &expected.aggregations.functions,
                &generated.aggregations.functions,
            ),
            return_column: dimension_score(
                &expected.return_column_set(),
                &generated.return_column_set(),
            ),
        }
    }

    /// Score of one dimension.
    pub fn get(&self, dimension: Dimension) -> DimensionScore {
        match dimension {
            Dimension::Entity => self.entity,
            Dimension::Attribute => self.attribute,
            Dimension::Relation => self.relation,
            Dimension::Filter => self.filter,
            Dimension::Aggregation => self.aggregation,
            Dimension::ReturnColumn => self.return_column,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|item| item.to_string()).collect()
    }

    #[test]
    fn empty_sets_score_zero() {
        let empty: BTreeSet<String> = BTreeSet::new();
        assert_eq!(compute_component_f1(&empty, &empty), 0.0);
        assert_eq!(compute_set_scores(&empty, &empty), SetScores::default());
    }

    #[test]
    fn partial_overlap() {
        let scores = compute_set_scores(&set(&["a", "b"]), &set(&["b", "c", "d", "e"]));
        assert_eq!(scores.precision, 0.25);
        assert_eq!(scores.recall, 0.5);
        assert!((scores.f1 - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn one_side_empty_scores_zero() {
        assert_eq!(compute_component_f1(&set(&["a"]), &BTreeSet::new()), 0.0);
        assert_eq!(compute_component_f1(&BTreeSet::new(), &set(&["a"])), 0.0);
    }

    #[test]
    fn both_empty_dimension_is_not_applicable() {
        let scores = ComponentScores::compare(&QueryStructure::default(), &QueryStructure::default());
        assert!(!scores.get(Dimension::Relation).applicable);
        assert_eq!(scores.get(Dimension::Relation).f1, 0.0);
    }

    proptest! {
        #[test]
        fn identical_non_empty_sets_score_one(items in proptest::collection::btree_set("[a-z]{1,8}", 1..12)) {
            prop_assert_eq!(compute_component_f1(&items, &items), 1.0);
        }

        #[test]
        fn scores_stay_in_unit_interval(
            expected in proptest::collection::btree_set(0u8..20, 0..10),
            generated in proptest::collection::btree_set(0u8..20, 0..10),
        ) {
            let scores = compute_set_scores(&expected, &generated);
            for value in [scores.precision, scores.recall, scores.f1] {
                prop_assert!((0.0..=1.0).contains(&value));
            }
        }
    }
}
