use thiserror::Error;

use crate::analyzer::Language;

/// Pest grammar for the supported Cypher subset and its parse entry point.
pub mod cypher_parser;
/// SQL expression helpers used by the relational analyzer.
pub mod expr;
/// Identifier and table-name normalization helpers (schema-qualified names, quoted identifiers).
pub mod names;
/// Thin wrapper around `sqlparser` accepting a single read query.
pub mod sql_parser;
/// Quote- and nesting-aware clause scanning shared by both languages.
pub mod text;

/// A query text that the grammar for `language` rejected.
///
/// The message is the parser's own diagnostic; it is logged, never scored.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{language} parse failure: {message}")]
pub struct ParseFailure {
    /// Grammar that rejected the input.
    pub language: Language,
    /// Parser diagnostic.
    pub message: String,
}

impl ParseFailure {
    /// Build a failure for `language` from any displayable diagnostic.
    pub fn new(language: Language, message: impl Into<String>) -> Self {
        Self {
            language,
            message: message.into(),
        }
    }
}
