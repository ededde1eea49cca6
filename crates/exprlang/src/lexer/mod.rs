//! Hand-written lexer turning source text into a token stream (spec §4.1).
//!
//! The lexer is Unicode-aware (scans by `char`, not byte) and tracks
//! 1-based (line, column) plus a 0-based byte offset on every token. Two
//! rules make it context-sensitive: `*` as wildcard-vs-multiplication is
//! decided here with one token of lookahead/lookbehind; `|` as pipe-vs-
//! bitwise-or is decided by the parser (§4.3), not here.

mod token;

pub use token::{Position, Token, TokenKind, lookup_keyword, PIPELINE_FUNCTIONS};

use crate::error::{Diagnostic, Error};

/// Converts source text into a stream of [`Token`]s.
///
/// `next_token` is idempotent at end of input: once it has produced `Eof`,
/// every subsequent call produces `Eof` again at the same position.
pub struct Lexer<'a> {
    source: &'a str,
    chars: Vec<(usize, char)>,
    cursor: usize,
    line: u32,
    column: u32,
}

impl<'a> Lexer<'a> {
    #[must_use]
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().collect(),
            cursor: 0,
            line: 1,
            column: 1,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.cursor).map(|&(_, c)| c)
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.cursor + offset).map(|&(_, c)| c)
    }

    fn byte_offset(&self) -> usize {
        self.chars
            .get(self.cursor)
            .map_or(self.source.len(), |&(b, _)| b)
    }

    fn position(&self) -> Position {
        Position {
            line: self.line,
            column: self.column,
            offset: u32::try_from(self.byte_offset()).unwrap_or(u32::MAX),
        }
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.cursor += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn bump_if(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.advance();
        }
    }

    /// Rule 1 of spec §4.1: `*` is a wildcard when immediately preceded by
    /// `.` (skipping whitespace) or immediately followed by `.` or an
    /// identifier-start character; otherwise it is multiplication.
    fn star_is_wildcard(&self, preceded_by_dot: bool) -> bool {
        if preceded_by_dot {
            return true;
        }
        match self.peek_at(1) {
            Some(c) => c == '.' || is_ident_start(c),
            None => false,
        }
    }

    fn last_significant_is_dot(&self) -> bool {
        let mut i = self.cursor;
        while i > 0 {
            i -= 1;
            let c = self.chars[i].1;
            if c.is_whitespace() {
                continue;
            }
            return c == '.';
        }
        false
    }

    /// Returns the next token and advances the lexer. Returns `Eof` forever
    /// once input is exhausted.
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();
        let start = self.position();
        let Some(c) = self.peek() else {
            return Token {
                kind: TokenKind::Eof,
                lexeme: String::new(),
                position: start,
            };
        };

        if c.is_ascii_digit() || (c == '.' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit())) {
            return self.read_number(start);
        }
        if c == '"' || c == '\'' {
            return self.read_string(start, c);
        }
        if is_ident_start(c) {
            return self.read_ident(start);
        }

        self.advance();
        let (kind, extra) = match c {
            '+' => (TokenKind::Plus, None),
            '-' => (TokenKind::Minus, None),
            '*' => {
                let preceded_by_dot = self.last_significant_is_dot();
                if self.star_is_wildcard(preceded_by_dot) {
                    (TokenKind::Wildcard, None)
                } else if self.bump_if('*') {
                    (TokenKind::Pow, None)
                } else {
                    (TokenKind::Star, None)
                }
            }
            '/' => (TokenKind::Slash, None),
            '%' => (TokenKind::Percent, None),
            '=' => {
                if self.bump_if('=') {
                    (TokenKind::Eq, None)
                } else if self.bump_if('>') {
                    (TokenKind::Arrow, None)
                } else {
                    (TokenKind::Assign, None)
                }
            }
            '!' => {
                if self.bump_if('=') {
                    (TokenKind::NotEq, None)
                } else {
                    (TokenKind::Not, None)
                }
            }
            '<' => {
                if self.bump_if('=') {
                    (TokenKind::LtEq, None)
                } else if self.bump_if('<') {
                    (TokenKind::Shl, None)
                } else {
                    (TokenKind::Lt, None)
                }
            }
            '>' => {
                if self.bump_if('=') {
                    (TokenKind::GtEq, None)
                } else if self.bump_if('>') {
                    (TokenKind::Shr, None)
                } else {
                    (TokenKind::Gt, None)
                }
            }
            '&' => {
                if self.bump_if('&') {
                    (TokenKind::And, None)
                } else {
                    (TokenKind::Amp, None)
                }
            }
            '|' => {
                if self.bump_if('|') {
                    (TokenKind::Or, None)
                } else {
                    (TokenKind::Pipe, None)
                }
            }
            '^' => (TokenKind::Caret, None),
            '~' => (TokenKind::Tilde, None),
            '(' => (TokenKind::LParen, None),
            ')' => (TokenKind::RParen, None),
            '[' => (TokenKind::LBracket, None),
            ']' => (TokenKind::RBracket, None),
            '{' => (TokenKind::LBrace, None),
            '}' => (TokenKind::RBrace, None),
            ',' => (TokenKind::Comma, None),
            ';' => (TokenKind::Semicolon, None),
            ':' => (TokenKind::Colon, None),
            '?' => {
                if self.bump_if('.') {
                    (TokenKind::OptChain, None)
                } else if self.bump_if('?') {
                    (TokenKind::NullCoalesce, None)
                } else {
                    (TokenKind::Question, None)
                }
            }
            '.' => {
                if self.peek() == Some('.') && self.peek_at(1) == Some('.') {
                    self.advance();
                    self.advance();
                    (TokenKind::Spread, None)
                } else {
                    (TokenKind::Dot, None)
                }
            }
            '#' => (TokenKind::Hash, None),
            _ => (TokenKind::Illegal(c), None),
        };
        let _ = extra;
        let lexeme = self.source[start.offset as usize..self.byte_offset()].to_string();
        Token {
            kind,
            lexeme,
            position: start,
        }
    }

    fn read_ident(&mut self, start: Position) -> Token {
        while matches!(self.peek(), Some(c) if is_ident_continue(c)) {
            self.advance();
        }
        let lexeme = self.source[start.offset as usize..self.byte_offset()].to_string();
        let kind = lookup_keyword(&lexeme).unwrap_or_else(|| TokenKind::Ident(lexeme.clone()));
        Token {
            kind,
            lexeme,
            position: start,
        }
    }

    fn read_number(&mut self, start: Position) -> Token {
        let mut is_float = false;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.advance();
        }
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            self.advance();
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.advance();
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let save = self.cursor;
            self.advance();
            if matches!(self.peek(), Some('+' | '-')) {
                self.advance();
            }
            if matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                is_float = true;
                while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                    self.advance();
                }
            } else {
                self.cursor = save;
            }
        }
        let lexeme = self.source[start.offset as usize..self.byte_offset()].to_string();
        let kind = if is_float {
            TokenKind::Number(lexeme.parse().unwrap_or(f64::NAN))
        } else {
            lexeme
                .parse::<i64>()
                .map_or_else(|_| TokenKind::Number(lexeme.parse().unwrap_or(f64::NAN)), TokenKind::Int)
        };
        Token {
            kind,
            lexeme,
            position: start,
        }
    }

    fn read_string(&mut self, start: Position, quote: char) -> Token {
        self.advance(); // opening quote
        let mut value = String::new();
        loop {
            match self.peek() {
                None => {
                    return Token {
                        kind: TokenKind::Illegal(quote),
                        lexeme: self.source[start.offset as usize..self.byte_offset()].to_string(),
                        position: start,
                    };
                }
                Some(c) if c == quote => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    match self.advance() {
                        Some('n') => value.push('\n'),
                        Some('t') => value.push('\t'),
                        Some('r') => value.push('\r'),
                        Some('\\') => value.push('\\'),
                        Some('"') => value.push('"'),
                        Some('\'') => value.push('\''),
                        Some(other) => value.push(other),
                        None => break,
                    }
                }
                Some(c) => {
                    value.push(c);
                    self.advance();
                }
            }
        }
        let lexeme = self.source[start.offset as usize..self.byte_offset()].to_string();
        Token {
            kind: TokenKind::String(value),
            lexeme,
            position: start,
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Lexes the whole source up front, returning a diagnostic on the first
/// illegal token (used by the parser when it wants a materialized stream).
pub fn lex_all(source: &str) -> std::result::Result<Vec<Token>, Error> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    loop {
        let tok = lexer.next_token();
        if let TokenKind::Illegal(c) = tok.kind {
            return Err(Error::Lex(Diagnostic::new(
                format!("unrecognized character {c:?}"),
                Some(tok.position),
            )));
        }
        let is_eof = matches!(tok.kind, TokenKind::Eof);
        tokens.push(tok);
        if is_eof {
            return Ok(tokens);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(src);
        let mut out = Vec::new();
        loop {
            let tok = lexer.next_token();
            let done = matches!(tok.kind, TokenKind::Eof);
            out.push(tok.kind);
            if done {
                break;
            }
        }
        out
    }

    #[test]
    fn lexes_arithmetic() {
        assert_eq!(
            kinds("1 + 2 * 3"),
            vec![
                TokenKind::Int(1),
                TokenKind::Plus,
                TokenKind::Int(2),
                TokenKind::Star,
                TokenKind::Int(3),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn wildcard_after_dot() {
        assert_eq!(kinds("user.*"), vec![
            TokenKind::Ident("user".into()),
            TokenKind::Dot,
            TokenKind::Wildcard,
            TokenKind::Eof,
        ]);
    }

    #[test]
    fn star_before_ident_is_wildcard() {
        assert_eq!(kinds(".*x"), vec![TokenKind::Dot, TokenKind::Wildcard, TokenKind::Ident("x".into()), TokenKind::Eof]);
    }

    #[test]
    fn multiplication_is_not_wildcard() {
        assert_eq!(
            kinds("5 * 3"),
            vec![TokenKind::Int(5), TokenKind::Star, TokenKind::Int(3), TokenKind::Eof]
        );
    }

    #[test]
    fn string_escapes_decode_at_lex_time() {
        assert_eq!(kinds("\"a\\nb\""), vec![TokenKind::String("a\nb".into()), TokenKind::Eof]);
    }

    #[test]
    fn unterminated_string_is_illegal_at_open_quote() {
        let mut lexer = Lexer::new("\"abc");
        let tok = lexer.next_token();
        assert_eq!(tok.position, Position::start());
        assert!(matches!(tok.kind, TokenKind::Illegal('"')));
    }

    #[test]
    fn float_with_exponent() {
        assert_eq!(kinds("1.5e3"), vec![TokenKind::Number(1500.0), TokenKind::Eof]);
    }

    #[test]
    fn eof_is_idempotent() {
        let mut lexer = Lexer::new("1");
        let _ = lexer.next_token();
        let first_eof = lexer.next_token();
        let second_eof = lexer.next_token();
        assert_eq!(first_eof.kind, TokenKind::Eof);
        assert_eq!(second_eof.kind, TokenKind::Eof);
        assert_eq!(first_eof.position, second_eof.position);
    }

    #[test]
    fn illegal_character_reports_position() {
        let mut lexer = Lexer::new("1 @ 2");
        let _ = lexer.next_token();
        let tok = lexer.next_token();
        assert_eq!(tok.kind, TokenKind::Illegal('@'));
        assert_eq!(tok.position.column, 3);
    }

    #[test]
    fn lex_round_trip_on_identifiers_and_literals() {
        let src = "foo123 + 42 - \"bar\"";
        let mut lexer = Lexer::new(src);
        let mut lexemes = String::new();
        loop {
            let tok = lexer.next_token();
            if matches!(tok.kind, TokenKind::Eof) {
                break;
            }
            lexemes.push_str(&tok.lexeme);
        }
        let without_whitespace: String = src.chars().filter(|c| !c.is_whitespace()).collect();
        assert_eq!(lexemes, without_whitespace);
    }
}
