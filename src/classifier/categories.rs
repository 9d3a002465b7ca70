use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::scoring::Dimension;

/// Why a generated query fell short, or that it did not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    /// The generated text does not parse.
    SyntaxError,
    /// It parsed, but executing it failed or timed out.
    RuntimeError,
    /// Generated and expected results are identical.
    Correct,
    /// Wrong tables or labels.
    WrongEntity,
    /// Wrong columns or properties.
    WrongAttribute,
    /// Wrong joins or edges.
    WrongRelation,
    /// Wrong predicates.
    WrongFilter,
    /// Wrong aggregate functions.
    WrongAggregation,
    /// Wrong projected columns.
    WrongReturnColumns,
    /// Structurally close, but the rows differ.
    ResultMismatch,
}

impl ErrorCategory {
    /// Every category, in decision-list order.
    pub const ALL: [ErrorCategory; 10] = [
        ErrorCategory::SyntaxError,
        ErrorCategory::RuntimeError,
        ErrorCategory::Correct,
        ErrorCategory::WrongEntity,
        ErrorCategory::WrongAttribute,
        ErrorCategory::WrongRelation,
        ErrorCategory::WrongFilter,
        ErrorCategory::WrongAggregation,
        ErrorCategory::WrongReturnColumns,
        ErrorCategory::ResultMismatch,
    ];

    /// The category reported when `dimension` scores below threshold.
    pub fn for_dimension(dimension: Dimension) -> Self {
        match dimension {
            Dimension::Entity => ErrorCategory::WrongEntity,
            Dimension::Attribute => ErrorCategory::WrongAttribute,
            Dimension::Relation => ErrorCategory::WrongRelation,
            Dimension::Filter => ErrorCategory::WrongFilter,
            Dimension::Aggregation => ErrorCategory::WrongAggregation,
            Dimension::ReturnColumn => ErrorCategory::WrongReturnColumns,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::SyntaxError => "SYNTAX_ERROR",
            ErrorCategory::RuntimeError => "RUNTIME_ERROR",
            ErrorCategory::Correct => "CORRECT",
            ErrorCategory::WrongEntity => "WRONG_ENTITY",
            ErrorCategory::WrongAttribute => "WRONG_ATTRIBUTE",
            ErrorCategory::WrongRelation => "WRONG_RELATION",
            ErrorCategory::WrongFilter => "WRONG_FILTER",
            ErrorCategory::WrongAggregation => "WRONG_AGGREGATION",
            ErrorCategory::WrongReturnColumns => "WRONG_RETURN_COLUMNS",
            ErrorCategory::ResultMismatch => "RESULT_MISMATCH",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for ErrorCategory {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_uppercase();
        ErrorCategory::ALL
            .into_iter()
            .find(|category| category.to_string() == wanted)
            .ok_or_else(|| format!("Invalid error category: {s}"))
    }
}

/// Primary category plus every category that applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// First matching category of the decision list.
    pub category: ErrorCategory,
    /// All applicable categories; `CORRECT` never appears here.
    pub flags: BTreeSet<ErrorCategory>,
}
