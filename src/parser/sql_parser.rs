use sqlparser::ast::{Query, SetExpr, Statement, Visit, Visitor};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use std::ops::ControlFlow;

use crate::analyzer::Language;
use crate::parser::ParseFailure;

/// Parse `sql` as exactly one read query.
///
/// Empty input, data-modifying or DDL statements, several statements in one
/// text, and any SELECT without a projection (`SELECT FROM WHERE`, which the
/// generic dialect reads as a scan of a table named `where`) are all
/// rejected. Nesting depth is bounded by sqlparser's recursion limit, so
/// hostile input fails instead of overflowing the stack.
pub fn parse_query(sql: &str) -> Result<Box<Query>, ParseFailure> {
    let statements = Parser::parse_sql(&GenericDialect {}, sql)
        .map_err(|err| ParseFailure::new(Language::Sql, err.to_string()))?;

    let mut statements = statements.into_iter();
    let statement = match (statements.next(), statements.next()) {
        (Some(statement), None) => statement,
        (None, _) => return Err(ParseFailure::new(Language::Sql, "no statement found")),
        (Some(_), Some(_)) => {
            return Err(ParseFailure::new(
                Language::Sql,
                "expected a single statement",
            ))
        }
    };

    match statement {
        Statement::Query(query) => {
            if query.visit(&mut EmptyProjection).is_break() {
                return Err(ParseFailure::new(
                    Language::Sql,
                    "SELECT without a projection list",
                ));
            }
            Ok(query)
        }
        other => Err(ParseFailure::new(
            Language::Sql,
            format!("expected a query, found `{}`", statement_head(&other)),
        )),
    }
}

/// True when `sql` parses as a single read query.
pub fn is_valid_query(sql: &str) -> bool {
    parse_query(sql).is_ok()
}

/// Stops at the first query, CTE or subquery whose SELECT projects nothing.
struct EmptyProjection;

impl Visitor for EmptyProjection {
    type Break = ();

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<Self::Break> {
        if projects_nothing(&query.body) {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }
}

fn projects_nothing(body: &SetExpr) -> bool {
    match body {
        SetExpr::Select(select) => select.projection.is_empty(),
        SetExpr::Query(query) => projects_nothing(&query.body),
        SetExpr::SetOperation { left, right, .. } => {
            projects_nothing(left) || projects_nothing(right)
        }
        _ => false,
    }
}

fn statement_head(statement: &Statement) -> String {
    let rendered = statement.to_string();
    rendered
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_string()
}
