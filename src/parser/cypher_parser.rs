use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;
use regex::Regex;
use std::num::NonZeroUsize;
use std::sync::{Once, OnceLock};

use crate::analyzer::Language;
use crate::parser::text::max_nesting_depth;
use crate::parser::ParseFailure;

/// Deepest nesting the grammar is run on: bracket depth plus `CASE` count.
///
/// The generated parser recurses through every precedence level per nested
/// group, so deeper input is rejected up front instead of exhausting the stack.
pub const MAX_NESTING_DEPTH: usize = 40;

/// Rule invocations allowed per parse before pest gives up.
const CALL_LIMIT: usize = 5_000_000;

/// Generated PEG parser for the supported Cypher subset.
#[derive(Parser)]
#[grammar = "parser/cypher.pest"]
pub struct CypherGrammar;

/// A successfully parsed Cypher query: the source text plus its `query` pair.
#[derive(Debug, Clone)]
pub struct CypherTree<'a> {
    /// The text the tree was parsed from.
    pub source: &'a str,
    /// Root `query` pair.
    pub root: Pair<'a, Rule>,
}

fn case_keyword() -> &'static Regex {
    static CASE_KEYWORD: OnceLock<Regex> = OnceLock::new();
    CASE_KEYWORD.get_or_init(|| {
        Regex::new(r"(?i)\bcase\b").expect("case keyword pattern is a valid regex")
    })
}

fn check_nesting(text: &str) -> Result<(), ParseFailure> {
    let brackets = max_nesting_depth(text);
    let cases = case_keyword().find_iter(text).count();
    if brackets + cases > MAX_NESTING_DEPTH {
        return Err(ParseFailure::new(
            Language::Cypher,
            format!("query nests deeper than {MAX_NESTING_DEPTH} levels"),
        ));
    }
    Ok(())
}

/// Parse `text` against the Cypher grammar.
///
/// Never panics: over-nested input and runaway backtracking both come back as
/// a [`ParseFailure`].
pub fn parse_cypher(text: &str) -> Result<CypherTree<'_>, ParseFailure> {
    static CALL_LIMIT_SET: Once = Once::new();
    CALL_LIMIT_SET.call_once(|| pest::set_call_limit(NonZeroUsize::new(CALL_LIMIT)));

    check_nesting(text)?;
    let mut pairs = CypherGrammar::parse(Rule::query, text)
        .map_err(|err| ParseFailure::new(Language::Cypher, err.to_string()))?;
    let root = pairs
        .next()
        .ok_or_else(|| ParseFailure::new(Language::Cypher, "empty parse tree"))?;
    Ok(CypherTree { source: text, root })
}

/// True when `text` is accepted by the Cypher grammar.
pub fn is_valid_cypher(text: &str) -> bool {
    parse_cypher(text).is_ok()
}
