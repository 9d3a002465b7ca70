use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A relationship between two entities: a SQL join or a graph edge.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Relation {
    /// Join side (`INNER`, `LEFT`, ...) or edge type; `""` when untyped.
    pub kind: String,
    /// Left-hand table or source node label; `""` when unresolved.
    pub source: String,
    /// Joined table or target node label; `""` when unresolved.
    pub target: String,
    /// Raw join condition text. Informational only, never scored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl Relation {
    /// The `(kind, source, target)` triple used for scoring.
    pub fn scoring_key(&self) -> (String, String, String) {
        (self.kind.clone(), self.source.clone(), self.target.clone())
    }
}

/// Aggregation usage of a query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregations {
    /// Upper-cased aggregate function names.
    pub functions: BTreeSet<String>,
    /// Grouping keys: explicit GROUP BY expressions or implicit graph keys.
    pub group_by: Vec<String>,
    /// HAVING predicate text, when present.
    pub having: Option<String>,
}

/// Sort direction of an ordering key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    /// Ascending (the default when no direction is written).
    #[default]
    Asc,
    /// Descending.
    Desc,
}

/// One `ORDER BY` key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ordering {
    /// Normalized sort expression.
    pub column: String,
    /// Sort direction.
    pub direction: SortDirection,
}

/// Language-independent semantic components extracted from one query text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryStructure {
    /// Lower-cased table names or node labels.
    pub entities: BTreeSet<String>,
    /// `"entity,field"` pairs, or a bare field when the owner is unknown.
    pub attributes: BTreeSet<String>,
    /// Joins or graph edges, in the order they appear.
    pub relations: Vec<Relation>,
    /// Filter predicate strings, lower-cased.
    pub filters: BTreeSet<String>,
    /// Aggregate functions, grouping keys and HAVING.
    pub aggregations: Aggregations,
    /// Projected columns in emitted order.
    pub return_columns: Vec<String>,
    /// Ordering keys in emitted order.
    pub orderings: Vec<Ordering>,
    /// Whether the text parsed under its language's grammar.
    pub parse_success: bool,
}

impl QueryStructure {
    /// The all-empty structure used for text that does not parse.
    pub fn unparsed() -> Self {
        Self::default()
    }

    /// Relations reduced to their scored `(kind, source, target)` triples.
    pub fn relation_keys(&self) -> BTreeSet<(String, String, String)> {
        self.relations.iter().map(Relation::scoring_key).collect()
    }

    /// Return columns as a set; ordering is not scored.
    pub fn return_column_set(&self) -> BTreeSet<String> {
        self.return_columns.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unparsed_structure_is_empty() {
        let structure = QueryStructure::unparsed();
        assert!(!structure.parse_success);
        assert!(structure.entities.is_empty());
        assert!(structure.relations.is_empty());
        assert!(structure.aggregations.having.is_none());
    }

    #[test]
    fn relation_keys_ignore_condition_and_duplicates() {
        let structure = QueryStructure {
            relations: vec![
                Relation {
                    kind: "INNER".into(),
                    source: "results".into(),
                    target: "drivers".into(),
                    condition: Some("results.driverid = drivers.driverid".into()),
                },
                Relation {
                    kind: "INNER".into(),
                    source: "results".into(),
                    target: "drivers".into(),
                    condition: None,
                },
            ],
            ..QueryStructure::default()
        };
        let keys = structure.relation_keys();
        assert_eq!(keys.len(), 1);
        assert!(keys.contains(&("INNER".into(), "results".into(), "drivers".into())));
    }

    #[test]
    fn sort_direction_serializes_upper_case() {
        let json = serde_json::to_string(&SortDirection::Desc).unwrap();
        assert_eq!(json, "\"DESC\"");
    }
}
