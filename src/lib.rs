//! Score generated SQL and Cypher queries against reference queries, structurally and by execution result.
#![warn(missing_docs)]

/// Query structure extraction: the `Analyzer` trait and its SQL and Cypher implementations.
pub mod analyzer;
/// Error taxonomy and the ordered decision list that assigns it.
pub mod classifier;
/// Evaluation run configuration.
pub mod config;
/// Tasks, query execution with timeouts, and the evaluation entry point.
pub mod evaluation;
/// Result file output and summary reports.
pub mod output;
/// SQL and Cypher grammar parsers plus identifier and clause helpers.
pub mod parser;
/// Set F1 over query components and over execution results.
pub mod scoring;
