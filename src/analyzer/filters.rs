use std::collections::BTreeSet;

use crate::parser::names::normalize_fragment;
use crate::parser::text::{find_top_level_keywords, strip_wrapping_parens};

/// Reduce filter strings to a set of atomic, normalized predicates.
///
/// Each filter is split on top-level `AND`/`OR`; parentheses wrapping a whole
/// operand are removed and the inside is split again. The `AND` inside
/// `BETWEEN x AND y` is not a connective. Results are whitespace-collapsed and
/// lower-cased; empty pieces are dropped.
pub fn normalize_filters<I, S>(filters: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut atomic = BTreeSet::new();
    for filter in filters {
        collect_atomic(filter.as_ref(), &mut atomic);
    }
    atomic
}

fn collect_atomic(filter: &str, atomic: &mut BTreeSet<String>) {
    let stripped = strip_wrapping_parens(filter);
    let operands = split_on_connectives(stripped);
    if operands.len() > 1 {
        for operand in operands {
            collect_atomic(operand, atomic);
        }
        return;
    }
    let normalized = normalize_fragment(stripped);
    if !normalized.is_empty() {
        atomic.insert(normalized);
    }
}

fn split_on_connectives(text: &str) -> Vec<&str> {
    let mut operands = Vec::new();
    let mut start = 0usize;
    let mut inside_between = false;

    for hit in find_top_level_keywords(text, &["BETWEEN", "AND", "OR"]) {
        match hit.keyword {
            "BETWEEN" => inside_between = true,
            "AND" if inside_between => inside_between = false,
            _ => {
                operands.push(text[start..hit.start].trim());
                start = hit.end;
            }
        }
    }
    operands.push(text[start..].trim());
    operands
}
