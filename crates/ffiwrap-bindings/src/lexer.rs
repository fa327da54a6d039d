//! Tokenizer for generated binding text
//!
//! The lexer never fails: anything it does not recognize becomes a single
//! punctuation token, unterminated comments run to the end of input and
//! unterminated strings stop at the end of their line. This keeps corrupted
//! or binary input from aborting a scan.

/// Kinds of tokens produced by [`Lexer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Identifier or keyword, including namespaced names like `\FFI\CData`
    Ident,
    /// `$name` variable; the token text includes the sigil
    Variable,
    /// Numeric literal
    Number,
    /// Single- or double-quoted string literal, quotes included
    StringLit,
    /// `/** ... */` documentation block
    DocComment,
    /// Any other single character
    Punct(char),
}

/// A token borrowed from the scanned source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    /// Byte offset of the first character
    pub start: usize,
    /// 1-based line of the first character
    pub line: usize,
}

impl<'a> Token<'a> {
    /// Byte offset one past the last character
    pub fn end(&self) -> usize {
        self.start + self.text.len()
    }

    pub fn is_punct(&self, c: char) -> bool {
        self.kind == TokenKind::Punct(c)
    }

    pub fn is_ident(&self, word: &str) -> bool {
        self.kind == TokenKind::Ident && self.text == word
    }

    /// String literal contents without the surrounding quotes
    pub fn unquoted(&self) -> &'a str {
        if self.kind != TokenKind::StringLit || self.text.len() < 2 {
            return self.text;
        }
        let quote = &self.text[..1];
        if self.text.ends_with(quote) {
            &self.text[1..self.text.len() - 1]
        } else {
            &self.text[1..]
        }
    }
}

/// Streaming tokenizer over a `&str`
pub struct Lexer<'a> {
    source: &'a str,
    pos: usize,
    line: usize,
    skip_preprocessor: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            pos: 0,
            line: 1,
            skip_preprocessor: true,
        }
    }

    /// Keep `#` lines as punctuation instead of skipping them
    pub fn keep_preprocessor_lines(mut self) -> Self {
        self.skip_preprocessor = false;
        self
    }

    /// Tokenize the whole source
    pub fn tokenize(self) -> Vec<Token<'a>> {
        self.collect()
    }

    fn peek(&self) -> Option<char> {
        self.source[self.pos..].chars().next()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.source[self.pos..].chars().nth(offset)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn bump_while<F: Fn(char) -> bool>(&mut self, predicate: F) {
        while let Some(c) = self.peek() {
            if !predicate(c) {
                break;
            }
            self.bump();
        }
    }

    fn at_line_start(&self) -> bool {
        self.source[..self.pos]
            .chars()
            .rev()
            .take_while(|c| *c != '\n')
            .all(|c| c == ' ' || c == '\t')
    }

    /// Skip whitespace and non-doc comments; returns false at end of input
    fn skip_trivia(&mut self) -> bool {
        loop {
            match self.peek() {
                None => return false,
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') if self.peek_at(1) == Some('/') => {
                    self.bump_while(|c| c != '\n');
                }
                Some('/') if self.peek_at(1) == Some('*') => {
                    // `/**` followed by something other than `/` is a doc block
                    if self.peek_at(2) == Some('*') && self.peek_at(3) != Some('/') {
                        return true;
                    }
                    self.bump();
                    self.bump();
                    self.skip_block_comment_body();
                }
                Some('#') if self.skip_preprocessor && self.peek_at(1) != Some('[') && self.at_line_start() => {
                    self.skip_preprocessor_line();
                }
                Some(_) => return true,
            }
        }
    }

    fn skip_block_comment_body(&mut self) {
        while let Some(c) = self.bump() {
            if c == '*' && self.peek() == Some('/') {
                self.bump();
                return;
            }
        }
    }

    fn skip_preprocessor_line(&mut self) {
        while let Some(c) = self.bump() {
            if c == '\\' && self.peek() == Some('\n') {
                self.bump();
                continue;
            }
            if c == '\n' {
                return;
            }
        }
    }

    fn has_closing_quote(&self, quote: char) -> bool {
        let mut escaped = false;
        for c in self.source[self.pos..].chars() {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == quote {
                return true;
            }
        }
        false
    }

    /// Strings may span lines; one that is never closed ends at its first newline
    fn lex_string(&mut self, quote: char) {
        self.bump();
        let multiline = self.has_closing_quote(quote);
        while let Some(c) = self.peek() {
            if c == '\n' && !multiline {
                return;
            }
            self.bump();
            if c == '\\' {
                if self.peek().is_some_and(|n| n != '\n') {
                    self.bump();
                }
            } else if c == quote {
                return;
            }
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c == '\\' || c.is_alphabetic()
}

fn is_ident_continue(c: char) -> bool {
    c == '_' || c == '\\' || c.is_alphanumeric()
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        if !self.skip_trivia() {
            return None;
        }

        let start = self.pos;
        let line = self.line;
        let c = self.peek()?;

        let kind = if c == '/' && self.peek_at(1) == Some('*') {
            self.bump();
            self.bump();
            self.skip_block_comment_body();
            TokenKind::DocComment
        } else if c == '"' || c == '\'' {
            self.lex_string(c);
            TokenKind::StringLit
        } else if c == '$' && self.peek_at(1).is_some_and(is_ident_start) {
            self.bump();
            self.bump_while(is_ident_continue);
            TokenKind::Variable
        } else if c.is_ascii_digit() {
            self.bump_while(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_');
            TokenKind::Number
        } else if is_ident_start(c) {
            self.bump_while(is_ident_continue);
            TokenKind::Ident
        } else {
            self.bump();
            TokenKind::Punct(c)
        };

        Some(Token {
            kind,
            text: &self.source[start..self.pos],
            start,
            line,
        })
    }
}

/// Index of the token closing the group opened at `open_index`
pub fn find_matching(tokens: &[Token<'_>], open_index: usize, open: char, close: char) -> Option<usize> {
    let mut depth = 0usize;
    for (index, token) in tokens.iter().enumerate().skip(open_index) {
        if token.is_punct(open) {
            depth += 1;
        } else if token.is_punct(close) {
            depth = depth.checked_sub(1)?;
            if depth == 0 {
                return Some(index);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source).map(|t| t.kind).collect()
    }

    #[test]
    fn test_basic_tokens() {
        let tokens = Lexer::new("public function add(int $a): int;").tokenize();
        let texts: Vec<&str> = tokens.iter().map(|t| t.text).collect();
        assert_eq!(texts, vec!["public", "function", "add", "(", "int", "$a", ")", ":", "int", ";"]);
        assert_eq!(tokens[5].kind, TokenKind::Variable);
    }

    #[test]
    fn test_comments_and_doc_blocks() {
        let source = "// line\n/* block */\n/** doc */\nint x;";
        assert_eq!(
            kinds(source),
            vec![TokenKind::DocComment, TokenKind::Ident, TokenKind::Ident, TokenKind::Punct(';')]
        );
        // `/**/` is an empty ordinary comment
        assert_eq!(kinds("/**/ x"), vec![TokenKind::Ident]);
    }

    #[test]
    fn test_strings_keep_delimiters_inside() {
        let tokens = Lexer::new(r#"f("a, (b)", 'c\'d')"#).tokenize();
        assert_eq!(tokens[2].kind, TokenKind::StringLit);
        assert_eq!(tokens[2].unquoted(), "a, (b)");
        assert_eq!(tokens[4].unquoted(), r"c\'d");
    }

    #[test]
    fn test_preprocessor_lines_skipped() {
        let source = "#define MAX 10 \\\n  + 1\n#include <x.h>\nint y;";
        let tokens = Lexer::new(source).tokenize();
        assert_eq!(tokens[0].text, "int");
        assert_eq!(tokens[0].line, 4);

        let tokens = Lexer::new("#include <x.h>").keep_preprocessor_lines().tokenize();
        assert!(tokens[0].is_punct('#'));
        assert_eq!(tokens[1].text, "include");
    }

    #[test]
    fn test_unterminated_constructs_do_not_panic() {
        assert_eq!(Lexer::new("/* never closed\nint x;").count(), 0);
        let tokens = Lexer::new("\"open string\nint x;").tokenize();
        assert_eq!(tokens[0].kind, TokenKind::StringLit);
        assert_eq!(tokens[1].text, "int");
    }

    #[test]
    fn test_unicode_and_binary() {
        let tokens = Lexer::new("größe(\u{0}\u{1f600})").tokenize();
        assert_eq!(tokens[0].text, "größe");
        assert!(tokens.iter().any(|t| t.is_punct('\u{1f600}')));
    }

    #[test]
    fn test_find_matching() {
        let tokens = Lexer::new("f(a, (b), c) d").tokenize();
        assert_eq!(find_matching(&tokens, 1, '(', ')'), Some(9));
        let tokens = Lexer::new("f(a, (b)").tokenize();
        assert_eq!(find_matching(&tokens, 1, '(', ')'), None);
    }
}
