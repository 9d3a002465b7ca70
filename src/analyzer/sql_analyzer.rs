use sqlparser::ast::{
    visit_expressions, visit_relations, Expr, GroupByExpr, JoinConstraint, JoinOperator,
    OrderByKind, Query, Select, SelectItem, SetExpr, TableFactor,
};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::ControlFlow;

use crate::analyzer::structure::{Aggregations, Ordering, Relation, SortDirection};
use crate::analyzer::{Analyzer, Language};
use crate::parser::expr::{extract_column_ref, is_aggregate_function, split_connectives};
use crate::parser::names::{
    normalize_fragment, normalize_identifier, normalize_object_name, normalized_function_name,
};
use crate::parser::sql_parser::parse_query;
use crate::parser::ParseFailure;

/// Relational extractor over the `sqlparser` AST.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlAnalyzer;

/// A parsed SQL read query.
#[derive(Debug, Clone)]
pub struct SqlTree {
    query: Box<Query>,
}

impl SqlTree {
    /// The parsed query.
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// `SELECT` blocks of the main body, left to right across set operations.
    fn body_selects(&self) -> Vec<&Select> {
        let mut selects = Vec::new();
        collect_selects(&self.query.body, &mut selects);
        selects
    }

    /// `SELECT` blocks of every CTE followed by those of the main body.
    fn all_selects(&self) -> Vec<&Select> {
        let mut selects = Vec::new();
        if let Some(with) = &self.query.with {
            for cte in &with.cte_tables {
                collect_selects(&cte.query.body, &mut selects);
            }
        }
        collect_selects(&self.query.body, &mut selects);
        selects
    }

    /// Table alias (and bare table name) to table name.
    fn alias_map(&self) -> BTreeMap<String, String> {
        let mut aliases = BTreeMap::new();
        for select in self.all_selects() {
            for table in &select.from {
                register_alias(&table.relation, &mut aliases);
                for join in &table.joins {
                    register_alias(&join.relation, &mut aliases);
                }
            }
        }
        aliases
    }

    fn order_by_exprs(&self) -> Vec<(&Expr, SortDirection)> {
        let Some(order_by) = &self.query.order_by else {
            return Vec::new();
        };
        match &order_by.kind {
            OrderByKind::Expressions(items) => items
                .iter()
                .map(|item| {
                    let direction = if item.options.asc == Some(false) {
                        SortDirection::Desc
                    } else {
                        SortDirection::Asc
                    };
                    (&item.expr, direction)
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

fn collect_selects<'q>(body: &'q SetExpr, selects: &mut Vec<&'q Select>) {
    match body {
        SetExpr::Select(select) => selects.push(select),
        SetExpr::Query(query) => collect_selects(&query.body, selects),
        SetExpr::SetOperation { left, right, .. } => {
            collect_selects(left, selects);
            collect_selects(right, selects);
        }
        _ => {}
    }
}

fn factor_name(factor: &TableFactor) -> String {
    match factor {
        TableFactor::Table { name, .. } => normalize_object_name(name),
        TableFactor::Derived {
            alias: Some(alias), ..
        } => normalize_identifier(&alias.name.value),
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => factor_name(&table_with_joins.relation),
        _ => String::new(),
    }
}

fn register_alias(factor: &TableFactor, aliases: &mut BTreeMap<String, String>) {
    match factor {
        TableFactor::Table { name, alias, .. } => {
            let table = normalize_object_name(name);
            if let Some(alias) = alias {
                aliases.insert(normalize_identifier(&alias.name.value), table.clone());
            }
            aliases.insert(table.clone(), table);
        }
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => {
            register_alias(&table_with_joins.relation, aliases);
            for join in &table_with_joins.joins {
                register_alias(&join.relation, aliases);
            }
        }
        _ => {}
    }
}

fn join_kind(operator: &JoinOperator) -> &'static str {
    match operator {
        JoinOperator::Left(_) | JoinOperator::LeftOuter(_) => "LEFT",
        JoinOperator::Right(_) | JoinOperator::RightOuter(_) => "RIGHT",
        JoinOperator::FullOuter(_) => "FULL",
        JoinOperator::CrossJoin { .. } => "CROSS",
        JoinOperator::Semi(_) | JoinOperator::LeftSemi(_) | JoinOperator::RightSemi(_) => "SEMI",
        JoinOperator::Anti(_) | JoinOperator::LeftAnti(_) | JoinOperator::RightAnti(_) => "ANTI",
        _ => "INNER",
    }
}

fn join_constraint(operator: &JoinOperator) -> Option<&JoinConstraint> {
    match operator {
        JoinOperator::Join(constraint)
        | JoinOperator::Inner(constraint)
        | JoinOperator::Left(constraint)
        | JoinOperator::LeftOuter(constraint)
        | JoinOperator::Right(constraint)
        | JoinOperator::RightOuter(constraint)
        | JoinOperator::FullOuter(constraint)
        | JoinOperator::Semi(constraint)
        | JoinOperator::LeftSemi(constraint)
        | JoinOperator::RightSemi(constraint)
        | JoinOperator::Anti(constraint)
        | JoinOperator::LeftAnti(constraint)
        | JoinOperator::RightAnti(constraint) => Some(constraint),
        _ => None,
    }
}

fn render_constraint(constraint: &JoinConstraint) -> Option<String> {
    match constraint {
        JoinConstraint::On(expr) => Some(expr.to_string()),
        JoinConstraint::Using(columns) => Some(format!(
            "USING ({})",
            columns
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        )),
        _ => None,
    }
}

fn projection_alias(item: &SelectItem) -> Option<String> {
    match item {
        SelectItem::ExprWithAlias { alias, .. } => Some(normalize_identifier(&alias.value)),
        _ => None,
    }
}

fn projection_expr(item: &SelectItem) -> Option<&Expr> {
    match item {
        SelectItem::UnnamedExpr(expr) | SelectItem::ExprWithAlias { expr, .. } => Some(expr),
        _ => None,
    }
}

/// Expressions outside WHERE that may reference columns.
fn attribute_sources<'t>(tree: &'t SqlTree) -> Vec<&'t Expr> {
    let mut sources = Vec::new();
    for select in tree.all_selects() {
        sources.extend(select.projection.iter().filter_map(projection_expr));
        for table in &select.from {
            for join in &table.joins {
                if let Some(JoinConstraint::On(expr)) = join_constraint(&join.join_operator) {
                    sources.push(expr);
                }
            }
        }
        if let GroupByExpr::Expressions(exprs, _) = &select.group_by {
            sources.extend(exprs.iter());
        }
        sources.extend(select.having.iter());
    }
    sources.extend(tree.order_by_exprs().into_iter().map(|(expr, _)| expr));
    sources
}

impl Analyzer for SqlAnalyzer {
    type Tree<'a> = SqlTree;

    fn language(&self) -> Language {
        Language::Sql
    }

    fn parse<'a>(&self, text: &'a str) -> Result<SqlTree, ParseFailure> {
        parse_query(text).map(|query| SqlTree { query })
    }

    fn entities(&self, tree: &SqlTree) -> BTreeSet<String> {
        let mut entities = BTreeSet::new();
        let _ = visit_relations(&*tree.query, |name| {
            let table = normalize_object_name(name);
            if !table.is_empty() {
                entities.insert(table);
            }
            ControlFlow::<()>::Continue(())
        });
        entities
    }

    fn attributes(&self, tree: &SqlTree) -> BTreeSet<String> {
        let aliases = tree.alias_map();
        let projection_aliases: BTreeSet<String> = tree
            .all_selects()
            .iter()
            .flat_map(|select| select.projection.iter().filter_map(projection_alias))
            .collect();

        let mut attributes = BTreeSet::new();
        for source in attribute_sources(tree) {
            let _ = visit_expressions(source, |expr| {
                if let Some(column) = extract_column_ref(expr) {
                    match column.qualifier {
                        Some(qualifier) => {
                            let owner = aliases.get(&qualifier).cloned().unwrap_or(qualifier);
                            attributes.insert(format!("{owner},{}", column.column));
                        }
                        None if projection_aliases.contains(&column.column) => {}
                        None => {
                            attributes.insert(column.column);
                        }
                    }
                }
                ControlFlow::<()>::Continue(())
            });
        }
        attributes
    }

    fn relations(&self, tree: &SqlTree) -> Vec<Relation> {
        let mut relations = Vec::new();
        for select in tree.all_selects() {
            for table in &select.from {
                let source = factor_name(&table.relation);
                for join in &table.joins {
                    relations.push(Relation {
                        kind: join_kind(&join.join_operator).to_string(),
                        source: source.clone(),
                        target: factor_name(&join.relation),
                        condition: join_constraint(&join.join_operator)
                            .and_then(render_constraint),
                    });
                }
            }
        }
        relations
    }

    fn filters(&self, tree: &SqlTree) -> BTreeSet<String> {
        tree.all_selects()
            .iter()
            .filter_map(|select| select.selection.as_ref())
            .flat_map(split_connectives)
            .map(|operand| normalize_fragment(&operand.to_string()))
            .filter(|filter| !filter.is_empty())
            .collect()
    }

    fn aggregations(&self, tree: &SqlTree) -> Aggregations {
        let mut aggregations = Aggregations::default();
        for select in tree.all_selects() {
            let scanned = select
                .projection
                .iter()
                .filter_map(projection_expr)
                .chain(select.having.iter());
            for expr in scanned {
                let _ = visit_expressions(expr, |inner| {
                    if let Expr::Function(func) = inner {
                        let name = normalized_function_name(func);
                        if is_aggregate_function(&name) {
                            aggregations.functions.insert(name.to_uppercase());
                        }
                    }
                    ControlFlow::<()>::Continue(())
                });
            }
            match &select.group_by {
                GroupByExpr::Expressions(exprs, _) => aggregations
                    .group_by
                    .extend(exprs.iter().map(|expr| normalize_fragment(&expr.to_string()))),
                GroupByExpr::All(_) => aggregations.group_by.push("all".to_string()),
            }
            if aggregations.having.is_none() {
                aggregations.having = select
                    .having
                    .as_ref()
                    .map(|having| normalize_fragment(&having.to_string()));
            }
        }
        aggregations
    }

    fn return_columns(&self, tree: &SqlTree) -> Vec<String> {
        let Some(select) = tree.body_selects().into_iter().next() else {
            return Vec::new();
        };
        select
            .projection
            .iter()
            .map(|item| match item {
                SelectItem::ExprWithAlias { alias, .. } => normalize_identifier(&alias.value),
                other => normalize_fragment(&other.to_string()),
            })
            .collect()
    }

    fn orderings(&self, tree: &SqlTree) -> Vec<Ordering> {
        tree.order_by_exprs()
            .into_iter()
            .map(|(expr, direction)| Ordering {
                column: normalize_fragment(&expr.to_string()),
                direction,
            })
            .collect()
    }
}
