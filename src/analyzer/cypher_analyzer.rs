use pest::iterators::Pair;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use crate::analyzer::structure::{Aggregations, Ordering, QueryStructure, Relation, SortDirection};
use crate::analyzer::{Analyzer, Language};
use crate::parser::cypher_parser::{parse_cypher, CypherTree, Rule};
use crate::parser::names::{normalize_fragment, normalize_identifier, unquote_identifier};
use crate::parser::text::{
    find_top_level_keyword, find_top_level_keywords, split_top_level, strip_keyword_prefix,
};
use crate::parser::ParseFailure;

/// Graph extractor over the pest parse tree.
#[derive(Debug, Clone, Copy, Default)]
pub struct CypherAnalyzer;

fn aggregate_call() -> &'static Regex {
    static AGGREGATE_CALL: OnceLock<Regex> = OnceLock::new();
    AGGREGATE_CALL.get_or_init(|| {
        Regex::new(r"(?i)\b(count|sum|avg|min|max|collect|size)\s*\(")
            .expect("aggregate call pattern is a valid regex")
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    /// `-[]->`
    Outgoing,
    /// `<-[]-`
    Incoming,
    /// `-[]-` or `<-[]->`
    Either,
}

#[derive(Debug, Clone)]
struct PendingEdge {
    kind: String,
    direction: Direction,
}

/// Accumulator threaded through the left-to-right walk of one query.
#[derive(Debug, Default)]
struct PatternWalk<'a> {
    /// Variable name to lower-cased label (or relationship type).
    bindings: BTreeMap<String, String>,
    /// Relationship seen but not yet closed by its right-hand node.
    pending: Option<PendingEdge>,
    /// Resolved labels of the nodes on the current path; `""` when unknown.
    pattern_labels: Vec<String>,
    entities: BTreeSet<String>,
    attributes: BTreeSet<String>,
    relations: Vec<Relation>,
    filters: BTreeSet<String>,
    /// Raw projection item lists of every WITH and RETURN.
    projections: Vec<&'a str>,
}

impl<'a> PatternWalk<'a> {
    fn start_path(&mut self) {
        self.pending = None;
        self.pattern_labels.clear();
    }

    fn owned_attribute(owner: Option<&str>, key: &str) -> String {
        match owner {
            Some(owner) if !owner.is_empty() => format!("{owner},{key}"),
            _ => key.to_string(),
        }
    }

    fn visit_node(&mut self, node: Pair<'a, Rule>) {
        let mut variable = None;
        let mut labels = Vec::new();
        let mut keys = Vec::new();
        for part in node.into_inner() {
            match part.as_rule() {
                Rule::variable => variable = Some(unquote_identifier(part.as_str()).to_string()),
                Rule::node_labels => labels.extend(
                    part.into_inner()
                        .map(|label| normalize_identifier(label.as_str())),
                ),
                Rule::properties => keys.extend(property_keys(part)),
                _ => {}
            }
        }

        let label = match (labels.first(), &variable) {
            (Some(first), Some(name)) => {
                self.bindings.insert(name.clone(), first.clone());
                Some(first.clone())
            }
            (Some(first), None) => Some(first.clone()),
            (None, Some(name)) => self.bindings.get(name).cloned(),
            (None, None) => None,
        };
        self.entities.extend(labels);
        for key in keys {
            self.attributes
                .insert(Self::owned_attribute(label.as_deref(), &key));
        }

        let label = label.unwrap_or_default();
        if let Some(edge) = self.pending.take() {
            let left = self.pattern_labels.last().cloned().unwrap_or_default();
            let (source, target) = match edge.direction {
                Direction::Incoming => (label.clone(), left),
                Direction::Outgoing | Direction::Either => (left, label.clone()),
            };
            self.relations.push(Relation {
                kind: edge.kind,
                source,
                target,
                condition: None,
            });
        }
        self.pattern_labels.push(label);
    }

    fn visit_relationship(&mut self, relationship: Pair<'a, Rule>) {
        let mut points_left = false;
        let mut points_right = false;
        let mut variable = None;
        let mut kind = String::new();
        let mut keys = Vec::new();

        for part in relationship.into_inner() {
            match part.as_rule() {
                Rule::left_arrow => points_left = true,
                Rule::right_arrow => points_right = true,
                Rule::relationship_detail => {
                    for detail in part.into_inner() {
                        match detail.as_rule() {
                            Rule::variable => {
                                variable = Some(unquote_identifier(detail.as_str()).to_string());
                            }
                            Rule::relationship_types => {
                                if let Some(first) = detail.into_inner().next() {
                                    kind = normalize_identifier(first.as_str());
                                }
                            }
                            Rule::properties => keys.extend(property_keys(detail)),
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
        }

        if let Some(name) = variable.filter(|_| !kind.is_empty()) {
            self.bindings.insert(name, kind.clone());
        }
        for key in keys {
            self.attributes
                .insert(Self::owned_attribute(Some(&kind), &key));
        }

        let direction = match (points_left, points_right) {
            (true, false) => Direction::Incoming,
            (false, true) => Direction::Outgoing,
            _ => Direction::Either,
        };
        self.pending = Some(PendingEdge { kind, direction });
    }

    /// Record `var.key` when `var` is bound; unbound variables are dropped.
    fn visit_lookup(&mut self, postfix: &Pair<'a, Rule>) {
        let mut inner = postfix.clone().into_inner();
        let (Some(atom), Some(lookup)) = (inner.next(), inner.next()) else {
            return;
        };
        if lookup.as_rule() != Rule::property_lookup {
            return;
        }
        let Some(variable) = atom
            .into_inner()
            .next()
            .filter(|part| part.as_rule() == Rule::variable)
        else {
            return;
        };
        let Some(key) = lookup.into_inner().next() else {
            return;
        };
        if let Some(label) = self.bindings.get(unquote_identifier(variable.as_str())) {
            let attribute = format!("{label},{}", normalize_identifier(key.as_str()));
            self.attributes.insert(attribute);
        }
    }

    fn walk(&mut self, pair: Pair<'a, Rule>, in_expression: bool) {
        match pair.as_rule() {
            Rule::pattern_element | Rule::pattern_predicate => {
                self.start_path();
                self.walk_children(pair, in_expression);
            }
            Rule::node_pattern => self.visit_node(pair),
            Rule::relationship_pattern => self.visit_relationship(pair),
            Rule::where_clause => {
                if let Some(expr) = pair
                    .clone()
                    .into_inner()
                    .find(|part| part.as_rule() == Rule::expression)
                {
                    self.filters.insert(normalize_fragment(expr.as_str()));
                }
                self.walk_children(pair, true);
            }
            Rule::with_clause | Rule::return_clause => self.walk_children(pair, true),
            Rule::projection_items => {
                self.projections.push(pair.as_str());
                self.walk_children(pair, in_expression);
            }
            Rule::postfix_expression if in_expression => {
                self.visit_lookup(&pair);
                self.walk_children(pair, in_expression);
            }
            _ => self.walk_children(pair, in_expression),
        }
    }

    fn walk_children(&mut self, pair: Pair<'a, Rule>, in_expression: bool) {
        for child in pair.into_inner() {
            self.walk(child, in_expression);
        }
    }
}

fn property_keys(properties: Pair<'_, Rule>) -> Vec<String> {
    properties
        .into_inner()
        .filter(|part| part.as_rule() == Rule::map_literal)
        .flat_map(|map| map.into_inner())
        .filter_map(|entry| entry.into_inner().next())
        .map(|key| normalize_identifier(key.as_str()))
        .collect()
}

/// Text of the first top-level RETURN: its projection list and ORDER BY list.
struct ReturnText<'a> {
    projection: &'a str,
    order_by: Option<&'a str>,
}

fn trim_clause(text: &str) -> &str {
    text.trim().trim_end_matches(';').trim_end()
}

fn isolate_return(source: &str) -> Option<ReturnText<'_>> {
    let found = find_top_level_keyword(source, &["RETURN"])?;
    let rest = &source[found.end..];
    let boundary = find_top_level_keyword(rest, &["ORDER BY", "SKIP", "LIMIT", "UNION"]);
    let projection = trim_clause(&rest[..boundary.map_or(rest.len(), |hit| hit.start)]);
    let projection = strip_keyword_prefix(projection, "DISTINCT").unwrap_or(projection);

    let order_by = boundary
        .filter(|hit| hit.keyword == "ORDER BY")
        .map(|hit| {
            let tail = &rest[hit.end..];
            let end = find_top_level_keyword(tail, &["SKIP", "LIMIT", "UNION"])
                .map_or(tail.len(), |next| next.start);
            trim_clause(&tail[..end])
        });
    Some(ReturnText {
        projection,
        order_by,
    })
}

/// Split a projection item into its expression and optional alias.
fn split_alias(item: &str) -> (&str, Option<&str>) {
    match find_top_level_keywords(item, &["AS"]).last() {
        Some(hit) => (item[..hit.start].trim(), Some(item[hit.end..].trim())),
        None => (item.trim(), None),
    }
}

fn return_items(source: &str) -> Vec<(&str, Option<&str>)> {
    isolate_return(source)
        .map(|clause| {
            split_top_level(clause.projection, ',')
                .into_iter()
                .map(split_alias)
                .collect()
        })
        .unwrap_or_default()
}

fn text_return_columns(source: &str) -> Vec<String> {
    return_items(source)
        .into_iter()
        .map(|(expr, alias)| match alias {
            Some(alias) => normalize_identifier(alias),
            None => normalize_fragment(expr),
        })
        .filter(|column| !column.is_empty())
        .collect()
}

fn text_orderings(source: &str) -> Vec<Ordering> {
    let Some(order_by) = isolate_return(source).and_then(|clause| clause.order_by) else {
        return Vec::new();
    };
    split_top_level(order_by, ',')
        .into_iter()
        .map(|item| {
            let (column, direction) = match item.rsplit_once(char::is_whitespace) {
                Some((head, last))
                    if last.eq_ignore_ascii_case("DESC")
                        || last.eq_ignore_ascii_case("DESCENDING") =>
                {
                    (head, SortDirection::Desc)
                }
                Some((head, last))
                    if last.eq_ignore_ascii_case("ASC")
                        || last.eq_ignore_ascii_case("ASCENDING") =>
                {
                    (head, SortDirection::Asc)
                }
                _ => (item, SortDirection::Asc),
            };
            Ordering {
                column: normalize_fragment(column),
                direction,
            }
        })
        .collect()
}

fn aggregate_functions<'t>(projections: impl IntoIterator<Item = &'t str>) -> BTreeSet<String> {
    projections
        .into_iter()
        .flat_map(|text| aggregate_call().captures_iter(text))
        .filter_map(|captures| captures.get(1))
        .map(|name| name.as_str().to_uppercase())
        .collect()
}

/// Non-aggregated RETURN items, when the RETURN aggregates at all.
fn implicit_group_keys(source: &str) -> Vec<String> {
    let items = return_items(source);
    if !items
        .iter()
        .any(|(expr, _)| aggregate_call().is_match(expr))
    {
        return Vec::new();
    }
    items
        .into_iter()
        .filter(|(expr, _)| !aggregate_call().is_match(expr))
        .map(|(expr, _)| normalize_fragment(expr))
        .collect()
}

impl CypherAnalyzer {
    fn walk<'a>(&self, tree: &CypherTree<'a>) -> PatternWalk<'a> {
        let mut walk = PatternWalk::default();
        walk.walk(tree.root.clone(), false);
        walk
    }

    fn aggregations_from(walk: &PatternWalk<'_>, source: &str) -> Aggregations {
        Aggregations {
            functions: aggregate_functions(walk.projections.iter().copied()),
            group_by: implicit_group_keys(source),
            having: None,
        }
    }
}

impl Analyzer for CypherAnalyzer {
    type Tree<'a> = CypherTree<'a>;

    fn language(&self) -> Language {
        Language::Cypher
    }

    fn parse<'a>(&self, text: &'a str) -> Result<CypherTree<'a>, ParseFailure> {
        parse_cypher(text)
    }

    fn entities(&self, tree: &CypherTree<'_>) -> BTreeSet<String> {
        self.walk(tree).entities
    }

    fn attributes(&self, tree: &CypherTree<'_>) -> BTreeSet<String> {
        self.walk(tree).attributes
    }

    fn relations(&self, tree: &CypherTree<'_>) -> Vec<Relation> {
        self.walk(tree).relations
    }

    fn filters(&self, tree: &CypherTree<'_>) -> BTreeSet<String> {
        self.walk(tree).filters
    }

    fn aggregations(&self, tree: &CypherTree<'_>) -> Aggregations {
        Self::aggregations_from(&self.walk(tree), tree.source)
    }

    fn return_columns(&self, tree: &CypherTree<'_>) -> Vec<String> {
        text_return_columns(tree.source)
    }

    fn orderings(&self, tree: &CypherTree<'_>) -> Vec<Ordering> {
        text_orderings(tree.source)
    }

    fn structure_of(&self, tree: &CypherTree<'_>) -> QueryStructure {
        let walk = self.walk(tree);
        let aggregations = Self::aggregations_from(&walk, tree.source);
        QueryStructure {
            entities: walk.entities,
            attributes: walk.attributes,
            relations: walk.relations,
            filters: walk.filters,
            aggregations,
            return_columns: text_return_columns(tree.source),
            orderings: text_orderings(tree.source),
            parse_success: true,
        }
    }
}
