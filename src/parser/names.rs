use sqlparser::ast::{Function, ObjectName};

/// Return the identifier without one layer of surrounding quotes.
///
/// Accepts the SQL double-quote form, `MySQL`/Cypher backticks and
/// `SQLite`/T-SQL square brackets.
pub fn unquote_identifier(ident: &str) -> &str {
    [('"', '"'), ('`', '`'), ('[', ']')]
        .iter()
        .find_map(|(open, close)| {
            ident
                .strip_prefix(*open)
                .and_then(|s| s.strip_suffix(*close))
        })
        .unwrap_or(ident)
}

/// Normalize an identifier for case-insensitive matching.
///
/// Trims whitespace, removes surrounding quotes on a single identifier,
/// and lowercases the result.
pub fn normalize_identifier(ident: &str) -> String {
    unquote_identifier(ident.trim()).to_lowercase()
}

/// Split a potentially schema-qualified name into `(schema, relation)`.
///
/// Handles dots inside quoted identifiers, e.g. `"my.schema"."table.name"`.
pub fn split_schema_and_relation(name: &str) -> Option<(String, String)> {
    let mut quote: Option<char> = None;
    let mut start = 0usize;
    let mut parts: Vec<&str> = Vec::new();

    for (idx, ch) in name.char_indices() {
        match (quote, ch) {
            (Some('"'), '"') | (Some('`'), '`') | (Some('['), ']') => quote = None,
            (None, '"' | '`' | '[') => quote = Some(ch),
            (None, '.') => {
                parts.push(name[start..idx].trim());
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(name[start..].trim());

    if parts.len() < 2 {
        return None;
    }

    let schema = unquote_identifier(parts[parts.len() - 2]).to_string();
    let relation = unquote_identifier(parts[parts.len() - 1]).to_string();
    Some((schema, relation))
}

/// Normalize an object name to its terminal relation/function identifier.
///
/// Examples:
/// - `"main.drivers"` -> `"drivers"`
/// - `"\"F1\".\"Races\""` -> `"races"`
/// - `"COUNT"` -> `"count"`
pub fn normalize_relation_name(name: &str) -> String {
    if let Some((_, relation)) = split_schema_and_relation(name.trim()) {
        return normalize_identifier(&relation);
    }
    normalize_identifier(name)
}

/// Lower-cased terminal name of a parsed object name.
pub fn normalize_object_name(name: &ObjectName) -> String {
    normalize_relation_name(&name.to_string())
}

/// Lower-cased terminal name of a SQL function call (`pg_catalog.count` -> `count`).
pub fn normalized_function_name(func: &Function) -> String {
    normalize_object_name(&func.name)
}

/// Collapse every whitespace run to a single space and trim the ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Canonical comparison form of a query fragment: whitespace collapsed, lower-cased.
pub fn normalize_fragment(text: &str) -> String {
    collapse_whitespace(text).to_lowercase()
}
