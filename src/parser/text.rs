//! Quote- and nesting-aware scanning over raw query text.
//!
//! The Cypher extractor isolates clauses textually, and filter normalization
//! splits predicates on connectives; both need to ignore separators that sit
//! inside string literals, quoted identifiers or bracketed sub-expressions.

/// A keyword occurrence found at the top nesting level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeywordMatch {
    /// Byte offset of the first keyword character.
    pub start: usize,
    /// Byte offset just past the last keyword character.
    pub end: usize,
    /// The keyword as supplied by the caller.
    pub keyword: &'static str,
}

/// Byte offsets of all characters outside quotes and brackets.
///
/// Quote and bracket characters themselves are never reported.
pub fn top_level_offsets(text: &str) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(text.len());
    let mut depth = 0usize;
    for_each_unquoted(text, |idx, ch| match ch {
        '(' | '[' | '{' => depth += 1,
        ')' | ']' | '}' => depth = depth.saturating_sub(1),
        _ if depth == 0 => offsets.push(idx),
        _ => {}
    });
    offsets
}

/// Deepest bracket nesting outside quotes, counting `(`, `[` and `{` alike.
pub fn max_nesting_depth(text: &str) -> usize {
    let mut depth = 0usize;
    let mut deepest = 0usize;
    for_each_unquoted(text, |_, ch| match ch {
        '(' | '[' | '{' => {
            depth += 1;
            deepest = deepest.max(depth);
        }
        ')' | ']' | '}' => depth = depth.saturating_sub(1),
        _ => {}
    });
    deepest
}

/// Calls `visit` for every character outside string literals and quoted
/// identifiers. Quote characters are skipped.
fn for_each_unquoted(text: &str, mut visit: impl FnMut(usize, char)) {
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (idx, ch) in text.char_indices() {
        if let Some(open) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' && open != '`' {
                escaped = true;
            } else if ch == open {
                quote = None;
            }
            continue;
        }
        match ch {
            '\'' | '"' | '`' => quote = Some(ch),
            _ => visit(idx, ch),
        }
    }
}

/// Split on `separator` wherever it appears at the top nesting level.
///
/// Pieces are trimmed; empty pieces are dropped.
pub fn split_top_level(text: &str, separator: char) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0usize;
    for offset in top_level_offsets(text) {
        if text[offset..].starts_with(separator) {
            pieces.push(text[start..offset].trim());
            start = offset + separator.len_utf8();
        }
    }
    pieces.push(text[start..].trim());
    pieces.retain(|piece| !piece.is_empty());
    pieces
}

/// All non-overlapping top-level occurrences of any of `keywords`, in text order.
///
/// Matching is ASCII case-insensitive and respects word boundaries. A
/// multi-word keyword such as `"ORDER BY"` matches any whitespace run between
/// its words. A word preceded by `.` or `$` is a property or parameter name,
/// not a keyword.
pub fn find_top_level_keywords(text: &str, keywords: &[&'static str]) -> Vec<KeywordMatch> {
    let mut found = Vec::new();
    let mut resume_at = 0usize;
    for offset in top_level_offsets(text) {
        if offset < resume_at || !is_word_start(text, offset) {
            continue;
        }
        if let Some(hit) = keywords
            .iter()
            .find_map(|keyword| match_keyword_at(text, offset, keyword))
        {
            resume_at = hit.end;
            found.push(hit);
        }
    }
    found
}

/// First top-level occurrence of any of `keywords`.
pub fn find_top_level_keyword(text: &str, keywords: &[&'static str]) -> Option<KeywordMatch> {
    find_top_level_keywords(text, keywords).into_iter().next()
}

/// Remove redundant parentheses that wrap the whole text, repeatedly.
///
/// `((a = 1))` becomes `a = 1`, but `(a) OR (b)` is left untouched because its
/// first parenthesis closes before the end.
pub fn strip_wrapping_parens(text: &str) -> &str {
    let mut current = text.trim();
    while current.starts_with('(') && current.ends_with(')') && first_group_spans_all(current) {
        current = current[1..current.len() - 1].trim();
    }
    current
}

/// Strip a leading keyword (case-insensitive, whole word) and return the rest.
pub fn strip_keyword_prefix<'a>(text: &'a str, keyword: &'static str) -> Option<&'a str> {
    let trimmed = text.trim_start();
    match_keyword_at(trimmed, 0, keyword).map(|hit| trimmed[hit.end..].trim_start())
}

fn first_group_spans_all(text: &str) -> bool {
    let mut depth = 0usize;
    let mut closed_at = None;
    for_each_unquoted(text, |idx, ch| {
        if closed_at.is_some() {
            return;
        }
        match ch {
            '(' => depth += 1,
            ')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    closed_at = Some(idx);
                }
            }
            _ => {}
        }
    });
    closed_at == Some(text.len() - 1)
}

fn is_identifier_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

fn is_word_start(text: &str, offset: usize) -> bool {
    let starts_alpha = text[offset..]
        .chars()
        .next()
        .is_some_and(|ch| ch.is_ascii_alphabetic());
    let previous = text[..offset].chars().next_back();
    starts_alpha && !previous.is_some_and(|ch| is_identifier_char(ch) || ch == '.' || ch == '$')
}

fn match_keyword_at(text: &str, offset: usize, keyword: &'static str) -> Option<KeywordMatch> {
    let mut pos = offset;
    for (index, word) in keyword.split_whitespace().enumerate() {
        if index > 0 {
            let gap = text[pos..].len() - text[pos..].trim_start().len();
            if gap == 0 {
                return None;
            }
            pos += gap;
        }
        let candidate = text.get(pos..pos + word.len())?;
        if !candidate.eq_ignore_ascii_case(word) {
            return None;
        }
        pos += word.len();
    }
    if text[pos..].chars().next().is_some_and(is_identifier_char) {
        return None;
    }
    Some(KeywordMatch {
        start: offset,
        end: pos,
        keyword,
    })
}
