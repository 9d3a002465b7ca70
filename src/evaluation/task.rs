use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};
use std::path::Path;

use crate::analyzer::{Language, QueryStructure};
use crate::classifier::{Classification, ErrorCategory};
use crate::evaluation::evaluator::EvaluationError;

/// A natural-language question with its reference queries.
///
/// Identity is the question text alone: two tasks with the same question are
/// the same task even when their reference queries differ.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// The natural-language question.
    pub question: String,
    /// Reference relational query.
    #[serde(default, rename = "sql", alias = "reference_sql")]
    pub reference_sql: String,
    /// Reference graph query.
    #[serde(default, rename = "cypher", alias = "reference_cypher")]
    pub reference_cypher: String,
    /// Rows the reference graph query returned when the task was recorded (JSON text).
    #[serde(
        default,
        rename = "cypher_result",
        alias = "reference_cypher_result",
        skip_serializing_if = "Option::is_none"
    )]
    pub reference_cypher_result: Option<String>,
}

impl Task {
    /// Task with both reference queries and no recorded result.
    pub fn new(
        question: impl Into<String>,
        reference_sql: impl Into<String>,
        reference_cypher: impl Into<String>,
    ) -> Self {
        Self {
            question: question.into(),
            reference_sql: reference_sql.into(),
            reference_cypher: reference_cypher.into(),
            reference_cypher_result: None,
        }
    }

    /// Reference query text for `language`.
    pub fn reference_query(&self, language: Language) -> &str {
        match language {
            Language::Sql => &self.reference_sql,
            Language::Cypher => &self.reference_cypher,
        }
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.question == other.question
    }
}

impl Eq for Task {}

impl Hash for Task {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.question.hash(state);
    }
}

/// Load a JSON array of tasks.
pub fn load_tasks(path: &Path) -> Result<Vec<Task>, EvaluationError> {
    let json = std::fs::read_to_string(path).map_err(|source| EvaluationError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&json).map_err(|source| EvaluationError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Per-task scores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreVector {
    /// Tables or labels.
    pub entity_f1: f64,
    /// `entity,field` pairs.
    pub attribute_f1: f64,
    /// Graph edges; `None` for SQL, where joins are not scored separately.
    pub relation_f1: Option<f64>,
    /// Atomic predicates.
    pub filter_f1: f64,
    /// Aggregate functions.
    pub aggregation_f1: f64,
    /// Projected columns.
    pub return_column_f1: f64,
    /// Both queries executed.
    pub execution_success: bool,
    /// Raw result sets are identical.
    pub execution_accuracy: bool,
    /// F1 over normalized result rows.
    pub result_f1: f64,
    /// Precision over normalized result rows.
    pub result_precision: f64,
    /// Recall over normalized result rows.
    pub result_recall: f64,
}

/// Everything known about one evaluated task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    /// The task that was evaluated.
    pub task: Task,
    /// Language of the generated query.
    pub language: Language,
    /// Generated query text, verbatim.
    pub generated_script: String,
    /// Structure of the generated query.
    pub generated: QueryStructure,
    /// Structure of the reference query.
    pub expected: QueryStructure,
    /// Scores.
    pub scores: ScoreVector,
    /// Primary category and flags.
    pub classification: Classification,
}

impl TaskResult {
    /// Flatten into the persisted record shape.
    pub fn to_record(&self) -> TaskRecord {
        TaskRecord {
            question: self.task.question.clone(),
            expected_script: self.task.reference_query(self.language).to_string(),
            generated_script: self.generated_script.clone(),
            syntaxically_correct: self.generated.parse_success,
            correct_result: self.scores.execution_accuracy,
            entity_f1: self.scores.entity_f1,
            attribute_f1: self.scores.attribute_f1,
            relation_f1: self.scores.relation_f1,
            filter_f1: self.scores.filter_f1,
            aggregation_f1: self.scores.aggregation_f1,
            return_column_f1: self.scores.return_column_f1,
            execution_accuracy: self.scores.execution_accuracy,
            result_f1: self.scores.result_f1,
            result_precision: self.scores.result_precision,
            result_recall: self.scores.result_recall,
            error_category: self.classification.category,
            error_flags: self.classification.flags.clone(),
        }
    }
}

/// Flat result record as persisted in result files.
///
/// The field names (including the historical `syntaxically_correct`
/// spelling) are what downstream reporting reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// The task question.
    pub question: String,
    /// Reference query for the evaluated language.
    pub expected_script: String,
    /// Generated query.
    pub generated_script: String,
    /// Generated query parsed.
    pub syntaxically_correct: bool,
    /// Same as `execution_accuracy`.
    pub correct_result: bool,
    /// Entity F1.
    pub entity_f1: f64,
    /// Attribute F1.
    pub attribute_f1: f64,
    /// Relation F1; null for SQL.
    pub relation_f1: Option<f64>,
    /// Filter F1.
    pub filter_f1: f64,
    /// Aggregation F1.
    pub aggregation_f1: f64,
    /// Return-column F1.
    pub return_column_f1: f64,
    /// Raw result sets are identical.
    pub execution_accuracy: bool,
    /// Result F1.
    pub result_f1: f64,
    /// Result precision.
    pub result_precision: f64,
    /// Result recall.
    pub result_recall: f64,
    /// Primary category.
    pub error_category: ErrorCategory,
    /// All applicable categories.
    pub error_flags: BTreeSet<ErrorCategory>,
}

impl TaskRecord {
    /// Whether both queries executed.
    pub fn execution_success(&self) -> bool {
        self.syntaxically_correct && self.error_category != ErrorCategory::RuntimeError
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn task_identity_is_the_question() {
        let a = Task::new("How many drivers?", "SELECT COUNT(*) FROM drivers", "");
        let b = Task::new("How many drivers?", "", "MATCH (d:Driver) RETURN count(d)");
        let set: HashSet<Task> = [a.clone(), b].into_iter().collect();
        assert_eq!(set.len(), 1);
        assert_ne!(a, Task::new("How many teams?", "", ""));
    }

    #[test]
    fn task_json_accepts_short_and_long_keys() {
        let short: Task = serde_json::from_str(
            r#"{"question": "q", "sql": "SELECT 1", "cypher": "RETURN 1", "cypher_result": "[[1]]"}"#,
        )
        .unwrap();
        let long: Task = serde_json::from_str(
            r#"{"question": "q", "reference_sql": "SELECT 1", "reference_cypher": "RETURN 1"}"#,
        )
        .unwrap();
        assert_eq!(short.reference_query(Language::Sql), "SELECT 1");
        assert_eq!(long.reference_query(Language::Cypher), "RETURN 1");
        assert_eq!(short.reference_cypher_result.as_deref(), Some("[[1]]"));
        assert!(long.reference_cypher_result.is_none());

        let missing: Task = serde_json::from_str(r#"{"question": "q"}"#).unwrap();
        assert!(missing.reference_sql.is_empty());
    }

    #[test]
    fn load_tasks_reads_array_and_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        std::fs::write(
            &path,
            r#"[{"question": "a", "sql": "SELECT 1"}, {"question": "b", "cypher": "RETURN 1"}]"#,
        )
        .unwrap();
        let tasks = load_tasks(&path).unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[1].reference_cypher, "RETURN 1");

        std::fs::write(&path, "{}").unwrap();
        let err = load_tasks(&path).unwrap_err();
        assert!(err.to_string().contains("tasks.json"), "{err}");
    }

    #[test]
    fn execution_success_is_recoverable_from_record() {
        let mut record = TaskRecord {
            question: "q".into(),
            expected_script: "SELECT 1".into(),
            generated_script: "SELECT 1".into(),
            syntaxically_correct: true,
            correct_result: false,
            entity_f1: 0.0,
            attribute_f1: 0.0,
            relation_f1: None,
            filter_f1: 0.0,
            aggregation_f1: 0.0,
            return_column_f1: 1.0,
            execution_accuracy: false,
            result_f1: 0.0,
            result_precision: 0.0,
            result_recall: 0.0,
            error_category: ErrorCategory::RuntimeError,
            error_flags: BTreeSet::from([ErrorCategory::RuntimeError]),
        };
        assert!(!record.execution_success());
        record.error_category = ErrorCategory::ResultMismatch;
        assert!(record.execution_success());

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["relation_f1"], serde_json::Value::Null);
        assert_eq!(json["error_category"], "RESULT_MISMATCH");
        let back: TaskRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
