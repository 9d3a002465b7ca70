use std::collections::BTreeSet;

use crate::analyzer::Language;
use crate::classifier::categories::{Classification, ErrorCategory};
use crate::scoring::{ComponentScores, Dimension};

/// What the classifier looks at for one evaluated task.
#[derive(Debug, Clone, Copy)]
pub struct Evidence<'a> {
    /// Language of the task; relations are only judged for graph queries.
    pub language: Language,
    /// The generated text parsed.
    pub parse_success: bool,
    /// Both queries executed without error or timeout.
    pub execution_success: bool,
    /// Raw result sets are identical.
    pub execution_accuracy: bool,
    /// Per-dimension structure scores.
    pub components: &'a ComponentScores,
}

/// Assigns the primary [`ErrorCategory`] and the flag set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ErrorClassifier {
    threshold: f64,
}

impl ErrorClassifier {
    /// Classifier flagging dimensions whose F1 is below `threshold`.
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// F1 threshold in use.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    fn judged_dimensions(language: Language) -> &'static [Dimension] {
        match language {
            Language::Sql => &[
                Dimension::Entity,
                Dimension::Attribute,
                Dimension::Filter,
                Dimension::Aggregation,
                Dimension::ReturnColumn,
            ],
            Language::Cypher => &[
                Dimension::Entity,
                Dimension::Attribute,
                Dimension::Relation,
                Dimension::Filter,
                Dimension::Aggregation,
                Dimension::ReturnColumn,
            ],
        }
    }

    /// Applicable dimensions scoring below the threshold, in decision order.
    fn failing_dimensions(&self, evidence: &Evidence<'_>) -> Vec<Dimension> {
        Self::judged_dimensions(evidence.language)
            .iter()
            .copied()
            .filter(|dimension| {
                let score = evidence.components.get(*dimension);
                score.applicable && score.f1 < self.threshold
            })
            .collect()
    }

    /// Classify one evaluated task.
    pub fn classify(&self, evidence: &Evidence<'_>) -> Classification {
        Classification {
            category: self.primary_category(evidence),
            flags: self.flags(evidence),
        }
    }

    fn primary_category(&self, evidence: &Evidence<'_>) -> ErrorCategory {
        // 1. Unparsable output
        if !evidence.parse_success {
            return ErrorCategory::SyntaxError;
        }
        // 2. Execution failure or timeout
        if !evidence.execution_success {
            return ErrorCategory::RuntimeError;
        }
        // 3. Identical results
        if evidence.execution_accuracy {
            return ErrorCategory::Correct;
        }
        // 4. First structural dimension below threshold
        if let Some(dimension) = self.failing_dimensions(evidence).first() {
            return ErrorCategory::for_dimension(*dimension);
        }
        // 5. Fallback
        ErrorCategory::ResultMismatch
    }

    fn flags(&self, evidence: &Evidence<'_>) -> BTreeSet<ErrorCategory> {
        let mut flags = BTreeSet::new();
        if !evidence.parse_success {
            flags.insert(ErrorCategory::SyntaxError);
        } else if !evidence.execution_success {
            flags.insert(ErrorCategory::RuntimeError);
        }
        flags.extend(
            self.failing_dimensions(evidence)
                .into_iter()
                .map(ErrorCategory::for_dimension),
        );
        if !evidence.execution_accuracy {
            flags.insert(ErrorCategory::ResultMismatch);
        }
        flags
    }
}
