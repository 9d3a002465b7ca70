use sqlparser::ast::{BinaryOperator, Expr};

use crate::parser::names::normalize_identifier;

/// Aggregate functions recognized in SQL projections and HAVING clauses.
pub const SQL_AGGREGATE_FUNCTIONS: &[&str] = &[
    "COUNT",
    "SUM",
    "AVG",
    "MIN",
    "MAX",
    "GROUP_CONCAT",
    "STRING_AGG",
    "ARRAY_AGG",
    "TOTAL",
    "STDDEV",
    "VARIANCE",
    "MEDIAN",
];

/// A column reference with its optional qualifier, both lower-cased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    /// Table name or alias preceding the column, if any.
    pub qualifier: Option<String>,
    /// Terminal column name.
    pub column: String,
}

/// Extract a column reference together with the component that qualifies it.
///
/// `d.name` yields qualifier `d`; `main.drivers.name` yields qualifier
/// `drivers`. Parentheses are looked through.
pub fn extract_column_ref(expr: &Expr) -> Option<ColumnRef> {
    match expr {
        Expr::Identifier(ident) => Some(ColumnRef {
            qualifier: None,
            column: normalize_identifier(&ident.value),
        }),
        Expr::CompoundIdentifier(parts) => {
            let (column, qualifiers) = parts.split_last()?;
            Some(ColumnRef {
                qualifier: qualifiers
                    .last()
                    .map(|ident| normalize_identifier(&ident.value)),
                column: normalize_identifier(&column.value),
            })
        }
        Expr::Nested(inner) => extract_column_ref(inner),
        _ => None,
    }
}

/// True for a (case-insensitive) aggregate function name.
pub fn is_aggregate_function(name: &str) -> bool {
    SQL_AGGREGATE_FUNCTIONS
        .iter()
        .any(|candidate| candidate.eq_ignore_ascii_case(name))
}

/// Flatten the top-level `AND`/`OR` tree of a predicate into its operands.
///
/// Parenthesized groups are kept whole here; textual normalization later
/// strips redundant parentheses and splits them again.
pub fn split_connectives(expr: &Expr) -> Vec<&Expr> {
    let mut operands = Vec::new();
    collect_operands(expr, &mut operands);
    operands
}

fn collect_operands<'e>(expr: &'e Expr, operands: &mut Vec<&'e Expr>) {
    match expr {
        Expr::BinaryOp {
            left,
            op: BinaryOperator::And | BinaryOperator::Or,
            right,
        } => {
            collect_operands(left, operands);
            collect_operands(right, operands);
        }
        other => operands.push(other),
    }
}
