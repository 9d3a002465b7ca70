use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::analyzer::{Analyzer, CypherAnalyzer, Language, QueryStructure, SqlAnalyzer};
use crate::classifier::{ErrorClassifier, Evidence};
use crate::config::EvaluationConfig;
use crate::evaluation::cache::ParseCache;
use crate::evaluation::executor::{
    execute_with_timeout, parse_recorded_rows, ExecutionError, QueryExecutor,
};
use crate::evaluation::task::{ScoreVector, Task, TaskResult};
use crate::scoring::{compare_results, ComponentScores, ResultSet, SetScores};

/// Caller errors: the task cannot be evaluated at all.
#[derive(Debug, Error)]
pub enum EvaluationError {
    /// The task has no reference query for the requested language.
    #[error("task {question:?} has no {language} reference query")]
    BlankReference {
        /// Question of the offending task.
        question: String,
        /// Requested language.
        language: Language,
    },
    /// A task file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// File that was read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// A task file is not a JSON array of tasks.
    #[error("invalid task file {}: {source}", path.display())]
    Json {
        /// File that was parsed.
        path: PathBuf,
        /// Underlying parse error.
        source: serde_json::Error,
    },
    /// The batch worker pool could not be started.
    #[error("failed to start evaluation workers: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Outcome of one task in a batch.
pub type TaskOutcome = Result<TaskResult, EvaluationError>;

/// Scores generated queries against task references.
///
/// Owns the execution capability, the parse cache and the classifier. Shared
/// by reference across batch workers.
pub struct Evaluator<E: QueryExecutor + ?Sized + 'static> {
    executor: Arc<E>,
    config: EvaluationConfig,
    cache: ParseCache,
    classifier: ErrorClassifier,
}

impl<E: QueryExecutor + 'static> Evaluator<E> {
    /// Evaluator running queries through `executor`.
    pub fn new(executor: E, config: EvaluationConfig) -> Self {
        Self::from_shared(Arc::new(executor), config)
    }
}

impl<E: QueryExecutor + ?Sized + 'static> Evaluator<E> {
    /// Evaluator over an executor that is already shared (or type-erased).
    pub fn from_shared(executor: Arc<E>, config: EvaluationConfig) -> Self {
        Self {
            cache: ParseCache::new(config.cache_capacity),
            classifier: ErrorClassifier::new(config.threshold),
            executor,
            config,
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &EvaluationConfig {
        &self.config
    }

    /// The parse cache.
    pub fn cache(&self) -> &ParseCache {
        &self.cache
    }

    /// Evaluate `generated` against the task's reference for `language`.
    pub fn evaluate(&self, task: &Task, generated: &str, language: Language) -> TaskOutcome {
        match language {
            Language::Sql => self.evaluate_with(&SqlAnalyzer, task, generated),
            Language::Cypher => self.evaluate_with(&CypherAnalyzer, task, generated),
        }
    }

    /// Evaluate with an explicit analyzer; its language selects the reference.
    pub fn evaluate_with<A: Analyzer>(
        &self,
        analyzer: &A,
        task: &Task,
        generated: &str,
    ) -> TaskOutcome {
        let language = analyzer.language();
        let reference = task.reference_query(language);
        if reference.trim().is_empty() {
            return Err(EvaluationError::BlankReference {
                question: task.question.clone(),
                language,
            });
        }

        let expected = self.structure(analyzer, reference);
        let generated_structure = self.structure(analyzer, generated);
        let components = ComponentScores::compare(&expected, &generated_structure);

        let comparison = if generated_structure.parse_success {
            match self.execute_pair(task, language, reference, generated) {
                Ok((expected_rows, generated_rows)) => {
                    Some(compare_results(&expected_rows, &generated_rows))
                }
                Err(err) => {
                    warn!(
                        question = %task.question,
                        language = %language,
                        error = %err,
                        "query execution failed"
                    );
                    None
                }
            }
        } else {
            debug!(question = %task.question, "generated query did not parse; skipping execution");
            None
        };

        let execution_success = comparison.is_some();
        let execution_accuracy = comparison.is_some_and(|c| c.execution_accuracy);
        let result_scores = comparison.map_or(SetScores::default(), |c| c.scores);

        let classification = self.classifier.classify(&Evidence {
            language,
            parse_success: generated_structure.parse_success,
            execution_success,
            execution_accuracy,
            components: &components,
        });

        let scores = ScoreVector {
            entity_f1: components.entity.f1,
            attribute_f1: components.attribute.f1,
            relation_f1: match language {
                Language::Sql => None,
                Language::Cypher => Some(components.relation.f1),
            },
            filter_f1: components.filter.f1,
            aggregation_f1: components.aggregation.f1,
            return_column_f1: components.return_column.f1,
            execution_success,
            execution_accuracy,
            result_f1: result_scores.f1,
            result_precision: result_scores.precision,
            result_recall: result_scores.recall,
        };

        Ok(TaskResult {
            task: task.clone(),
            language,
            generated_script: generated.to_string(),
            generated: QueryStructure::clone(&generated_structure),
            expected: QueryStructure::clone(&expected),
            scores,
            classification,
        })
    }

    /// Evaluate `(task, generated)` pairs on a pool of `workers` threads.
    ///
    /// Outcomes come back in input order. Fails only if the pool cannot start.
    pub fn evaluate_batch(
        &self,
        items: &[(Task, String)],
        language: Language,
    ) -> Result<Vec<TaskOutcome>, EvaluationError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .thread_name(|index| format!("querylens-eval-{index}"))
            .build()?;
        debug!(tasks = items.len(), workers = self.config.workers, "starting batch");
        Ok(pool.install(|| {
            items
                .par_iter()
                .map(|(task, generated)| self.evaluate(task, generated, language))
                .collect()
        }))
    }

    fn structure<A: Analyzer>(&self, analyzer: &A, text: &str) -> Arc<QueryStructure> {
        self.cache
            .get_or_extract(analyzer.language(), text, || analyzer.extract(text))
    }

    fn execute_pair(
        &self,
        task: &Task,
        language: Language,
        reference: &str,
        generated: &str,
    ) -> Result<(ResultSet, ResultSet), ExecutionError> {
        let expected_rows = match (&task.reference_cypher_result, language) {
            (Some(recorded), Language::Cypher) if self.config.use_recorded_reference_results => {
                parse_recorded_rows(recorded)?
            }
            _ => self.run(reference)?,
        };
        let generated_rows = self.run(generated)?;
        Ok((expected_rows, generated_rows))
    }

    fn run(&self, query: &str) -> Result<ResultSet, ExecutionError> {
        execute_with_timeout(
            Arc::clone(&self.executor),
            query,
            self.config.timeout(),
            self.config.cancel_grace(),
        )
    }
}

impl<E: QueryExecutor + ?Sized + 'static> std::fmt::Debug for Evaluator<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Evaluator")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .field("classifier", &self.classifier)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ErrorCategory;
    use crate::evaluation::executor::CancelFlag;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config() -> EvaluationConfig {
        EvaluationConfig {
            workers: 2,
            ..EvaluationConfig::default()
        }
    }

    fn rows_by_query(query: &str, _cancel: &CancelFlag) -> Result<ResultSet, ExecutionError> {
        if query.contains("WHERE") {
            Ok(vec![json!([3])])
        } else {
            Ok(vec![json!([20])])
        }
    }

    #[test]
    fn blank_reference_is_a_caller_error() {
        let evaluator = Evaluator::new(rows_by_query, config());
        let task = Task::new("How many drivers?", "  ", "");
        let err = evaluator
            .evaluate(&task, "SELECT COUNT(*) FROM drivers", Language::Sql)
            .unwrap_err();
        assert!(matches!(err, EvaluationError::BlankReference { language: Language::Sql, .. }));
    }

    #[test]
    fn missing_filter_is_classified() {
        let evaluator = Evaluator::new(rows_by_query, config());
        let task = Task::new(
            "How many British drivers?",
            "SELECT count(*) FROM drivers WHERE nationality = 'British'",
            "",
        );
        let result = evaluator
            .evaluate(&task, "SELECT COUNT(*) FROM drivers", Language::Sql)
            .unwrap();
        assert_eq!(result.scores.entity_f1, 1.0);
        assert_eq!(result.scores.filter_f1, 0.0);
        assert_eq!(result.scores.relation_f1, None);
        assert!(result.scores.execution_success);
        assert!(!result.scores.execution_accuracy);
        assert_eq!(result.classification.category, ErrorCategory::WrongFilter);
    }

    #[test]
    fn recorded_reference_result_replaces_execution() {
        let calls = AtomicUsize::new(0);
        let executor = move |_: &str, _: &CancelFlag| -> Result<ResultSet, ExecutionError> {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![json!({"count(d)": 20})])
        };
        let mut task = Task::new(
            "How many drivers?",
            "",
            "MATCH (d:Driver) RETURN count(d)",
        );
        task.reference_cypher_result = Some(r#"[{"count(d)": 20}]"#.to_string());
        let evaluator = Evaluator::new(
            executor,
            EvaluationConfig {
                use_recorded_reference_results: true,
                ..config()
            },
        );
        let result = evaluator
            .evaluate(&task, "MATCH (d:Driver) RETURN count(d)", Language::Cypher)
            .unwrap();
        assert!(result.scores.execution_accuracy);
        assert_eq!(result.classification.category, ErrorCategory::Correct);
        assert!(result.scores.relation_f1.is_some());
    }

    #[test]
    fn batch_preserves_input_order() {
        let evaluator = Evaluator::new(rows_by_query, config());
        let items: Vec<(Task, String)> = (0..12)
            .map(|i| {
                (
                    Task::new(format!("q{i}"), "SELECT COUNT(*) FROM drivers", ""),
                    if i % 2 == 0 {
                        "SELECT COUNT(*) FROM drivers".to_string()
                    } else {
                        "SELEC * FORM drivers".to_string()
                    },
                )
            })
            .collect();
        let outcomes = evaluator.evaluate_batch(&items, Language::Sql).unwrap();
        assert_eq!(outcomes.len(), items.len());
        for (i, outcome) in outcomes.iter().enumerate() {
            let result = outcome.as_ref().unwrap();
            assert_eq!(result.task.question, format!("q{i}"));
            let expected = if i % 2 == 0 {
                ErrorCategory::Correct
            } else {
                ErrorCategory::SyntaxError
            };
            assert_eq!(result.classification.category, expected);
        }
    }

    #[test]
    fn repeated_queries_hit_the_cache() {
        let evaluator = Evaluator::new(rows_by_query, config());
        let task = Task::new("q", "SELECT COUNT(*) FROM drivers", "");
        evaluator
            .evaluate(&task, "SELECT COUNT(*) FROM drivers", Language::Sql)
            .unwrap();
        evaluator
            .evaluate(&task, "SELECT COUNT(*) FROM drivers", Language::Sql)
            .unwrap();
        assert_eq!(evaluator.cache().len(), 1);
    }
}
