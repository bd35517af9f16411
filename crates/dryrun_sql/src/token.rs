//! Lightweight SQL tokenizer.
//!
//! Only classifies spans: enough to tell code apart from comments, string
//! literals and quoted identifiers. Concatenating the text of every token
//! gives back the input unchanged.

/// Token classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// Spaces, tabs, newlines
    Whitespace,
    /// `-- ...` or `# ...` up to, not including, the newline
    LineComment,
    /// `/* ... */`
    BlockComment,
    /// Single, double or triple quoted string
    String,
    /// Backtick quoted identifier
    QuotedIdentifier,
    /// Keyword, identifier or number
    Word,
    /// Any other single character
    Punct,
}

/// A classified span of SQL text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    /// Classification
    pub kind: TokenKind,
    /// Source text of the span
    pub text: &'a str,
}

impl<'a> Token<'a> {
    /// Whether the token is code rather than layout
    #[must_use]
    pub fn is_significant(&self) -> bool {
        !matches!(
            self.kind,
            TokenKind::Whitespace | TokenKind::LineComment | TokenKind::BlockComment
        )
    }

    /// Case-insensitive keyword check
    #[must_use]
    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Word && self.text.eq_ignore_ascii_case(keyword)
    }

    /// Whether this is the given punctuation character
    #[must_use]
    pub fn is_punct(&self, c: char) -> bool {
        self.kind == TokenKind::Punct && self.text.starts_with(c)
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Split SQL into tokens
#[must_use]
pub fn tokenize(sql: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut pos = 0;
    while pos < sql.len() {
        let rest = &sql[pos..];
        let (kind, len) = next_token(rest);
        tokens.push(Token {
            kind,
            text: &rest[..len],
        });
        pos += len;
    }
    tokens
}

fn next_token(rest: &str) -> (TokenKind, usize) {
    let mut chars = rest.chars();
    let Some(first) = chars.next() else {
        return (TokenKind::Whitespace, 0);
    };

    if first.is_whitespace() {
        let len = rest
            .find(|c: char| !c.is_whitespace())
            .unwrap_or(rest.len());
        return (TokenKind::Whitespace, len);
    }
    if rest.starts_with("--") || first == '#' {
        return (TokenKind::LineComment, rest.find('\n').unwrap_or(rest.len()));
    }
    if rest.starts_with("/*") {
        let len = rest[2..].find("*/").map_or(rest.len(), |end| end + 4);
        return (TokenKind::BlockComment, len);
    }
    if rest.starts_with("'''") || rest.starts_with("\"\"\"") {
        let quote = &rest[..3];
        return (TokenKind::String, quoted_len(rest, quote));
    }
    if first == '\'' || first == '"' {
        let quote = &rest[..1];
        return (TokenKind::String, quoted_len(rest, quote));
    }
    if first == '`' {
        return (TokenKind::QuotedIdentifier, quoted_len(rest, "`"));
    }
    if is_word_char(first) {
        let len = rest.find(|c: char| !is_word_char(c)).unwrap_or(rest.len());
        return (TokenKind::Word, len);
    }
    (TokenKind::Punct, first.len_utf8())
}

/// Length of a quoted span starting at `rest[0]`, honouring backslash escapes.
/// An unterminated span runs to the end of input.
fn quoted_len(rest: &str, quote: &str) -> usize {
    let body = &rest[quote.len()..];
    let mut iter = body.char_indices();
    while let Some((i, c)) = iter.next() {
        if c == '\\' {
            iter.next();
            continue;
        }
        if body[i..].starts_with(quote) {
            return quote.len() + i + quote.len();
        }
    }
    rest.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(sql: &str) -> Vec<(TokenKind, &str)> {
        tokenize(sql).into_iter().map(|t| (t.kind, t.text)).collect()
    }

    #[test]
    fn test_tokenize_classifies_whitespace() {
        assert_eq!(
            kinds("SELECT * FROM my_table"),
            vec![
                (TokenKind::Word, "SELECT"),
                (TokenKind::Whitespace, " "),
                (TokenKind::Punct, "*"),
                (TokenKind::Whitespace, " "),
                (TokenKind::Word, "FROM"),
                (TokenKind::Whitespace, " "),
                (TokenKind::Word, "my_table"),
            ]
        );
    }

    #[test]
    fn test_comments() {
        let tokens = kinds("a -- x `y`\nb /* c\n d */ e # f");
        assert_eq!(tokens[2], (TokenKind::LineComment, "-- x `y`"));
        assert_eq!(tokens[6], (TokenKind::BlockComment, "/* c\n d */"));
        assert_eq!(tokens[10], (TokenKind::LineComment, "# f"));
    }

    #[test]
    fn test_strings_with_escapes() {
        let tokens = kinds(r#"'it\'s' "a\"b" '''x ' y'''"#);
        assert_eq!(tokens[0], (TokenKind::String, r"'it\'s'"));
        assert_eq!(tokens[2], (TokenKind::String, r#""a\"b""#));
        assert_eq!(tokens[4], (TokenKind::String, "'''x ' y'''"));
    }

    #[test]
    fn test_quoted_identifier() {
        let tokens = kinds("`db`.`schema`.`t`");
        assert_eq!(tokens.len(), 5);
        assert_eq!(tokens[0], (TokenKind::QuotedIdentifier, "`db`"));
        assert_eq!(tokens[1], (TokenKind::Punct, "."));
    }

    #[test]
    fn test_unterminated_spans_run_to_end() {
        assert_eq!(kinds("'abc"), vec![(TokenKind::String, "'abc")]);
        assert_eq!(kinds("/* abc"), vec![(TokenKind::BlockComment, "/* abc")]);
    }

    #[test]
    fn test_lossless() {
        let sql = "SELECT 'a', `b`.c -- d\n FROM /* e */ `f`.`g`.`h` WHERE x = \"y\"";
        let rebuilt: String = tokenize(sql).iter().map(|t| t.text).collect();
        assert_eq!(rebuilt, sql);
    }
}
