use std::collections::BTreeSet;

use proptest::prelude::*;
use querylens::analyzer::filters::normalize_filters;
use querylens::analyzer::{self, Language};
use querylens::scoring::results::{normalize_results, normalize_row};
use querylens::scoring::{compare_results, compute_component_f1, ComponentScores};
use serde_json::json;

#[test]
fn empty_components_score_zero_and_identical_components_score_one() {
    let empty: BTreeSet<String> = BTreeSet::new();
    assert_eq!(compute_component_f1(&empty, &empty), 0.0);

    let tables: BTreeSet<String> = ["drivers".to_string(), "teams".to_string()].into();
    assert_eq!(compute_component_f1(&tables, &tables), 1.0);
}

#[test]
fn filter_conjunctions_split_into_atoms() {
    let expected: BTreeSet<String> = ["x > 1", "y < 2", "z = 3"]
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(normalize_filters(["x > 1 AND y < 2 AND (z = 3)"]), expected);
}

#[test]
fn reordered_conjunction_scores_full_filter_f1() {
    let expected = analyzer::extract(
        Language::Sql,
        "SELECT name FROM drivers WHERE nationality = 'British' AND teamId = 1",
    );
    let generated = analyzer::extract(
        Language::Sql,
        "select name from drivers where TEAMID = 1 and (nationality = 'British')",
    );
    let scores = ComponentScores::compare(&expected, &generated);
    assert_eq!(scores.filter.f1, 1.0);
    assert_eq!(scores.entity.f1, 1.0);
}

#[test]
fn graph_element_identity_is_ignored() {
    let with_id = [json!({"id": 7, "name": "Max"})];
    let with_element_id = [json!({"element_id": "4:abc", "name": "Max"})];
    assert_eq!(normalize_results(&with_id), normalize_results(&with_element_id));

    let comparison = compare_results(&with_id, &with_element_id);
    assert!(!comparison.execution_accuracy);
    assert_eq!(comparison.scores.f1, 1.0);
}

#[test]
fn row_order_and_float_noise_do_not_matter() {
    let expected = [json!(["Hamilton", 103.0]), json!(["Verstappen", 61])];
    let generated = [json!([61.0, "Verstappen "]), json!(["Hamilton", "103"])];
    let comparison = compare_results(&expected, &generated);
    assert_eq!(comparison.scores.precision, 1.0);
    assert_eq!(comparison.scores.recall, 1.0);
}

#[test]
fn nulls_are_dropped_from_rows() {
    assert_eq!(
        normalize_row(&json!(["a", null, "\\N", "NULL"])),
        vec!["a".to_string()]
    );
}

#[test]
fn failed_results_share_nothing_with_real_rows() {
    let comparison = compare_results(&[json!([1])], &[]);
    assert_eq!(comparison.scores.f1, 0.0);
    assert!(!comparison.execution_accuracy);
}

proptest! {
    #[test]
    fn result_scores_are_symmetric_in_f1(
        expected in proptest::collection::vec(0i64..6, 0..8),
        generated in proptest::collection::vec(0i64..6, 0..8),
    ) {
        let expected: Vec<_> = expected.into_iter().map(|n| json!([n])).collect();
        let generated: Vec<_> = generated.into_iter().map(|n| json!([n])).collect();
        let forward = compare_results(&expected, &generated).scores;
        let backward = compare_results(&generated, &expected).scores;
        prop_assert!((forward.f1 - backward.f1).abs() < 1e-12);
        prop_assert!((forward.precision - backward.recall).abs() < 1e-12);
    }

    #[test]
    fn sql_extraction_is_idempotent(
        table in "t_[a-z]{1,6}",
        column in "c_[a-z]{1,6}",
        value in 0u32..1000,
    ) {
        let text = format!("SELECT {column}, COUNT(*) FROM {table} WHERE {column} > {value} GROUP BY {column}");
        let first = analyzer::extract(Language::Sql, &text);
        prop_assert!(first.parse_success);
        prop_assert!(first.entities.contains(&table));
        prop_assert_eq!(first, analyzer::extract(Language::Sql, &text));
    }
}
