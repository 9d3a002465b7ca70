use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::debug;

use crate::parser::ParseFailure;

/// Graph extractor: a stateful walk over the Cypher parse tree.
pub mod cypher_analyzer;
/// Atomic predicate normalization shared by both languages.
pub mod filters;
/// Relational extractor over the `sqlparser` AST.
pub mod sql_analyzer;
/// Language-independent extraction result types.
pub mod structure;

pub use cypher_analyzer::CypherAnalyzer;
pub use sql_analyzer::SqlAnalyzer;
pub use structure::{Aggregations, Ordering, QueryStructure, Relation, SortDirection};

/// Query language of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Language {
    /// Relational queries.
    Sql,
    /// Graph queries.
    Cypher,
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::Sql => write!(f, "SQL"),
            Language::Cypher => write!(f, "CYPHER"),
        }
    }
}

impl std::str::FromStr for Language {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "SQL" => Ok(Language::Sql),
            "CYPHER" => Ok(Language::Cypher),
            _ => Err(format!("Invalid language: {s}")),
        }
    }
}

/// Extraction of semantic query components for one language.
///
/// Implementations parse once into [`Analyzer::Tree`] and derive every
/// component from that tree. Extraction never fails: text the grammar rejects
/// yields [`QueryStructure::unparsed`].
pub trait Analyzer {
    /// Parsed form the component extractors read.
    type Tree<'a>;

    /// Language this analyzer understands.
    fn language(&self) -> Language;

    /// Parse `text`, reporting the grammar's diagnostic on failure.
    fn parse<'a>(&self, text: &'a str) -> Result<Self::Tree<'a>, ParseFailure>;

    /// Referenced tables or node labels.
    fn entities(&self, tree: &Self::Tree<'_>) -> BTreeSet<String>;

    /// Referenced `"entity,field"` attributes.
    fn attributes(&self, tree: &Self::Tree<'_>) -> BTreeSet<String>;

    /// Joins or graph edges.
    fn relations(&self, tree: &Self::Tree<'_>) -> Vec<Relation>;

    /// Filter predicate strings.
    fn filters(&self, tree: &Self::Tree<'_>) -> BTreeSet<String>;

    /// Aggregate functions, grouping keys and HAVING.
    fn aggregations(&self, tree: &Self::Tree<'_>) -> Aggregations;

    /// Projected columns in emitted order.
    fn return_columns(&self, tree: &Self::Tree<'_>) -> Vec<String>;

    /// Ordering keys.
    fn orderings(&self, tree: &Self::Tree<'_>) -> Vec<Ordering>;

    /// True when `text` parses.
    fn is_valid(&self, text: &str) -> bool {
        self.parse(text).is_ok()
    }

    /// Assemble the full structure from an already parsed tree.
    fn structure_of(&self, tree: &Self::Tree<'_>) -> QueryStructure {
        QueryStructure {
            entities: self.entities(tree),
            attributes: self.attributes(tree),
            relations: self.relations(tree),
            filters: self.filters(tree),
            aggregations: self.aggregations(tree),
            return_columns: self.return_columns(tree),
            orderings: self.orderings(tree),
            parse_success: true,
        }
    }

    /// Parse and extract in one step.
    fn extract(&self, text: &str) -> QueryStructure {
        match self.parse(text) {
            Ok(tree) => self.structure_of(&tree),
            Err(failure) => {
                debug!(
                    language = %self.language(),
                    error = %failure.message,
                    "query text did not parse"
                );
                QueryStructure::unparsed()
            }
        }
    }
}

/// Extract `text` with the analyzer for `language`.
pub fn extract(language: Language, text: &str) -> QueryStructure {
    match language {
        Language::Sql => SqlAnalyzer.extract(text),
        Language::Cypher => CypherAnalyzer.extract(text),
    }
}

/// True when `text` parses under `language`.
pub fn is_valid(language: Language, text: &str) -> bool {
    match language {
        Language::Sql => SqlAnalyzer.is_valid(text),
        Language::Cypher => CypherAnalyzer.is_valid(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn language_parses_case_insensitively_and_rejects_unknown() {
        assert_eq!(Language::from_str("sql"), Ok(Language::Sql));
        assert_eq!(Language::from_str(" Cypher "), Ok(Language::Cypher));
        assert_eq!(
            Language::from_str("sparql"),
            Err("Invalid language: sparql".to_string())
        );
    }

    #[test]
    fn language_round_trips_through_serde() {
        let json = serde_json::to_string(&Language::Cypher).unwrap();
        assert_eq!(json, "\"CYPHER\"");
        let back: Language = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Language::Cypher);
    }

    #[test]
    fn dispatch_never_fails_on_garbage() {
        for language in [Language::Sql, Language::Cypher] {
            for text in ["", "\u{0}\u{1}", ")))(((", "MATCH (", "SELECT FROM WHERE"] {
                let structure = extract(language, text);
                assert_eq!(structure, QueryStructure::unparsed());
                assert!(!is_valid(language, text));
            }
        }
    }
}
