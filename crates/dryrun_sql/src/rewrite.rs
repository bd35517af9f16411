//! Upstream reference substitution.
//!
//! Replaces table references that directly follow `FROM`, `JOIN` or a comma
//! in a `FROM` list with a literal subquery. Only code tokens are inspected,
//! so references inside comments, string literals or unrelated quoted
//! identifiers are left alone.

use crate::token::{tokenize, Token, TokenKind};
use dryrun_core::TableRef;

/// Words that can follow a table reference without being an alias
const CLAUSE_KEYWORDS: &[&str] = &[
    "where", "join", "inner", "left", "right", "full", "cross", "outer", "natural", "on", "using",
    "group", "order", "having", "limit", "offset", "union", "intersect", "except", "window",
    "qualify", "for", "tablesample", "pivot", "unpivot", "select", "from", "with", "lateral",
    "when", "then", "else", "end", "set", "values", "into", "insert", "update", "delete", "merge",
    "create", "declare", "begin", "if", "elseif", "loop", "while", "repeat", "return", "call",
    "execute", "partition", "cluster", "options", "and", "or", "not",
];

/// Keywords that close the `FROM` list they appear in
const FROM_LIST_TERMINATORS: &[&str] = &[
    "where", "group", "order", "having", "limit", "union", "intersect", "except", "window",
    "qualify", "select", "set", "values", "when", "end",
];

fn is_reference_part(token: &Token<'_>) -> bool {
    matches!(token.kind, TokenKind::Word | TokenKind::QuotedIdentifier)
}

/// Identifier parts of a word or backtick token (`` `a.b` `` counts as two)
fn identifier_parts<'a>(token: &Token<'a>) -> Vec<&'a str> {
    match token.kind {
        TokenKind::QuotedIdentifier => {
            let inner = token
                .text
                .strip_prefix('`')
                .and_then(|t| t.strip_suffix('`'))
                .unwrap_or(token.text);
            inner.split('.').collect()
        }
        _ => vec![token.text],
    }
}

/// Parse a dotted reference starting at `start`.
///
/// Returns the identifier parts and the index one past the last token used.
fn parse_reference<'a>(tokens: &[Token<'a>], start: usize) -> Option<(Vec<&'a str>, usize)> {
    let first = tokens.get(start)?;
    if !is_reference_part(first) {
        return None;
    }
    let mut parts = identifier_parts(first);
    let mut end = start + 1;
    while let (Some(dot), Some(next)) = (tokens.get(end), tokens.get(end + 1)) {
        if !dot.is_punct('.') || !is_reference_part(next) {
            break;
        }
        parts.extend(identifier_parts(next));
        end += 2;
    }
    Some((parts, end))
}

fn next_significant(tokens: &[Token<'_>], from: usize) -> Option<usize> {
    (from..tokens.len()).find(|&i| tokens[i].is_significant())
}

/// Whether the tokens after a reference give it an explicit alias
fn has_explicit_alias(tokens: &[Token<'_>], after: usize) -> bool {
    let Some(i) = next_significant(tokens, after) else {
        return false;
    };
    let token = &tokens[i];
    match token.kind {
        TokenKind::QuotedIdentifier => true,
        TokenKind::Word => {
            let lower = token.text.to_ascii_lowercase();
            lower == "as" || !CLAUSE_KEYWORDS.contains(&lower.as_str())
        }
        _ => false,
    }
}

/// Replace every `FROM`/`JOIN` reference to `table_ref` with `literal`.
///
/// Comma-separated items of a `FROM` list count as well. An explicit alias
/// on the reference is kept and attaches to the literal; otherwise
/// `default_alias` is appended so column qualifiers still resolve.
#[must_use]
pub fn replace_upstream_reference(
    sql: &str,
    table_ref: &TableRef,
    default_alias: &str,
    literal: &str,
) -> String {
    let tokens = tokenize(sql);
    let target = table_ref.parts();
    let mut out = String::with_capacity(sql.len());
    let mut expect_table = false;
    // Paren depths with an open FROM list, innermost last
    let mut from_lists: Vec<usize> = Vec::new();
    let mut depth = 0_usize;
    let mut i = 0;

    while i < tokens.len() {
        let token = &tokens[i];
        if !token.is_significant() {
            out.push_str(token.text);
            i += 1;
            continue;
        }

        if expect_table {
            if let Some((parts, end)) = parse_reference(&tokens, i) {
                if parts == target {
                    out.push_str(literal);
                    if !has_explicit_alias(&tokens, end) {
                        out.push(' ');
                        out.push_str(default_alias);
                    }
                    expect_table = false;
                    i = end;
                    continue;
                }
            }
        }

        expect_table = false;
        if token.is_keyword("from") {
            from_lists.retain(|&d| d < depth);
            from_lists.push(depth);
            expect_table = true;
        } else if token.is_keyword("join") {
            expect_table = true;
        } else if token.is_punct(',') {
            expect_table = from_lists.last() == Some(&depth);
        } else if token.is_punct('(') {
            depth += 1;
        } else if token.is_punct(')') {
            depth = depth.saturating_sub(1);
            from_lists.retain(|&d| d <= depth);
        } else if token.is_punct(';') {
            from_lists.clear();
        } else if FROM_LIST_TERMINATORS.iter().any(|k| token.is_keyword(k)) {
            from_lists.retain(|&d| d < depth);
        }
        out.push_str(token.text);
        i += 1;
    }
    out
}
