use serde_json::{Number, Value};
use std::collections::BTreeSet;

use crate::scoring::component::{compute_set_scores, SetScores};

/// Rows returned by a query: arrays for positional tuples, objects for records.
pub type ResultSet = Vec<Value>;

/// A row reduced to the sorted string forms of its non-null leaves.
pub type NormalizedRow = Vec<String>;

/// Keys that identify graph elements rather than describe them.
pub const IGNORED_RECORD_KEYS: &[&str] = &["element_id", "labels", "id"];

const FLOAT_PRECISION: f64 = 1e6;

/// Canonicalize one scalar value.
///
/// - null, `"\N"` and `"null"` (any case) become null
/// - integral floats, and strings holding one, become integers
/// - other floats are rounded to 6 decimals
/// - strings are trimmed
pub fn normalize_scalar(value: &Value) -> Value {
    match value {
        Value::String(text) => {
            let trimmed = text.trim();
            if trimmed == "\\N" || trimmed.eq_ignore_ascii_case("null") {
                return Value::Null;
            }
            let whole = looks_numeric(trimmed)
                .then(|| trimmed.parse::<f64>().ok())
                .flatten()
                .and_then(integral);
            match whole {
                Some(whole) => Value::from(whole),
                None => Value::String(trimmed.to_string()),
            }
        }
        Value::Number(number) if number.is_f64() => {
            let Some(float) = number.as_f64() else {
                return value.clone();
            };
            if let Some(whole) = integral(float) {
                return Value::from(whole);
            }
            Number::from_f64((float * FLOAT_PRECISION).round() / FLOAT_PRECISION)
                .map_or_else(|| Value::String(float.to_string()), Value::Number)
        }
        other => other.clone(),
    }
}

fn integral(number: f64) -> Option<i64> {
    let in_range = number.is_finite() && number.abs() < i64::MAX as f64;
    (in_range && number.fract() == 0.0).then_some(number as i64)
}

/// Excludes words Rust's float parser accepts, such as `inf` or `NaN`.
fn looks_numeric(text: &str) -> bool {
    text.chars()
        .all(|ch| ch.is_ascii_digit() || matches!(ch, '.' | '-' | '+' | 'e' | 'E'))
}

/// Collect the normalized leaves of `value` in sorted-key order.
///
/// Object keys in [`IGNORED_RECORD_KEYS`] are skipped at every depth.
pub fn flatten_value(value: &Value, leaves: &mut Vec<Value>) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map
                .keys()
                .filter(|key| !IGNORED_RECORD_KEYS.contains(&key.as_str()))
                .collect();
            keys.sort();
            for key in keys {
                if let Some(inner) = map.get(key) {
                    flatten_value(inner, leaves);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                flatten_value(item, leaves);
            }
        }
        scalar => leaves.push(normalize_scalar(scalar)),
    }
}

/// Reduce one row to a sorted tuple of stringified non-null leaves.
pub fn normalize_row(row: &Value) -> NormalizedRow {
    let mut leaves = Vec::new();
    flatten_value(row, &mut leaves);
    let mut tuple: NormalizedRow = leaves
        .into_iter()
        .filter(|leaf| !leaf.is_null())
        .map(|leaf| match leaf {
            Value::String(text) => text,
            other => other.to_string(),
        })
        .collect();
    tuple.sort();
    tuple
}

/// Normalize every row; duplicates collapse.
pub fn normalize_results(rows: &[Value]) -> BTreeSet<NormalizedRow> {
    rows.iter().map(normalize_row).collect()
}

/// Exact comparison: the same set of raw rows, compared as canonical JSON text.
pub fn execution_accuracy(expected: &[Value], generated: &[Value]) -> bool {
    canonical_rows(expected) == canonical_rows(generated)
}

fn canonical_rows(rows: &[Value]) -> BTreeSet<String> {
    rows.iter().map(Value::to_string).collect()
}

/// Execution-level comparison of two result sets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResultComparison {
    /// Raw row sets are identical.
    pub execution_accuracy: bool,
    /// Set scores over normalized row tuples.
    pub scores: SetScores,
}

/// Compare generated rows against expected rows.
pub fn compare_results(expected: &[Value], generated: &[Value]) -> ResultComparison {
    ResultComparison {
        execution_accuracy: execution_accuracy(expected, generated),
        scores: compute_set_scores(&normalize_results(expected), &normalize_results(generated)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalars_are_canonicalized() {
        assert_eq!(normalize_scalar(&json!("\\N")), Value::Null);
        assert_eq!(normalize_scalar(&json!(" NULL ")), Value::Null);
        assert_eq!(normalize_scalar(&json!(3.0)), json!(3));
        assert_eq!(normalize_scalar(&json!("3.0")), json!(3));
        assert_eq!(normalize_scalar(&json!(" 42 ")), json!(42));
        assert_eq!(normalize_scalar(&json!(1.23456789)), json!(1.234568));
        assert_eq!(normalize_scalar(&json!("  Hamilton ")), json!("Hamilton"));
        assert_eq!(normalize_scalar(&json!("2.5")), json!("2.5"));
        assert_eq!(normalize_scalar(&json!("inf")), json!("inf"));
        assert_eq!(normalize_scalar(&json!(true)), json!(true));
    }

    #[test]
    fn graph_identity_keys_are_ignored() {
        let expected = normalize_results(&[json!({"id": 7, "name": "Max"})]);
        let generated = normalize_results(&[json!({"element_id": "4:abc", "name": "Max"})]);
        assert_eq!(expected, generated);
    }

    #[test]
    fn nested_records_flatten_in_key_order_and_sort() {
        let row = json!({"d": {"labels": ["Driver"], "surname": "Verstappen", "code": "VER"}, "wins": 19.0});
        assert_eq!(normalize_row(&row), vec!["19", "VER", "Verstappen"]);
    }

    #[test]
    fn positional_and_record_rows_compare_equal_after_normalization() {
        let sql_rows = [json!(["Lewis", 7.0]), json!(["Michael", "7"])];
        let graph_rows = [json!({"name": "Lewis", "titles": 7}), json!({"name": "Michael", "titles": 7})];
        let comparison = compare_results(&sql_rows, &graph_rows);
        assert!(!comparison.execution_accuracy);
        assert_eq!(comparison.scores.f1, 1.0);
    }

    #[test]
    fn execution_accuracy_is_order_insensitive_set_equality() {
        let a = [json!(["a", 1]), json!(["b", 2])];
        let b = [json!(["b", 2]), json!(["a", 1]), json!(["a", 1])];
        assert!(execution_accuracy(&a, &b));
        assert!(!execution_accuracy(&a, &[json!(["a", 1])]));
    }

    #[test]
    fn null_leaves_are_dropped() {
        assert_eq!(normalize_row(&json!([null, "x", "\\N"])), vec!["x"]);
    }
}
