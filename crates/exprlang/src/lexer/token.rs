//! Token kinds and the position metadata attached to every token.

use std::fmt;

/// A 1-based (line, column) pair plus a 0-based byte offset into the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: u32,
    pub column: u32,
    pub offset: u32,
}

impl Position {
    #[must_use]
    pub fn start() -> Self {
        Self {
            line: 1,
            column: 1,
            offset: 0,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Every lexical category the language recognizes (spec §4.1).
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    Number(f64),
    Int(i64),
    String(String),
    Bool(bool),
    Null,

    // Identifiers / keywords
    Ident(String),
    If,
    Else,
    In,
    Matches,
    Contains,
    StartsWith,
    EndsWith,
    Import,
    As,
    From,

    // Operators
    Plus,
    Minus,
    Star,
    Wildcard,
    Slash,
    Percent,
    Pow,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Not,
    Assign,
    Amp,
    Pipe,
    Caret,
    Tilde,
    Shl,
    Shr,

    // Punctuation
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Dot,
    Semicolon,
    Colon,
    Question,
    Arrow,
    Hash,
    OptChain,
    NullCoalesce,
    Spread,

    Eof,
    Illegal(char),
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Null => f.write_str("null"),
            Self::Ident(s) => f.write_str(s),
            Self::If => f.write_str("if"),
            Self::Else => f.write_str("else"),
            Self::In => f.write_str("in"),
            Self::Matches => f.write_str("matches"),
            Self::Contains => f.write_str("contains"),
            Self::StartsWith => f.write_str("startsWith"),
            Self::EndsWith => f.write_str("endsWith"),
            Self::Import => f.write_str("import"),
            Self::As => f.write_str("as"),
            Self::From => f.write_str("from"),
            Self::Plus => f.write_str("+"),
            Self::Minus => f.write_str("-"),
            Self::Star => f.write_str("*"),
            Self::Wildcard => f.write_str("*"),
            Self::Slash => f.write_str("/"),
            Self::Percent => f.write_str("%"),
            Self::Pow => f.write_str("**"),
            Self::Eq => f.write_str("=="),
            Self::NotEq => f.write_str("!="),
            Self::Lt => f.write_str("<"),
            Self::LtEq => f.write_str("<="),
            Self::Gt => f.write_str(">"),
            Self::GtEq => f.write_str(">="),
            Self::And => f.write_str("&&"),
            Self::Or => f.write_str("||"),
            Self::Not => f.write_str("!"),
            Self::Assign => f.write_str("="),
            Self::Amp => f.write_str("&"),
            Self::Pipe => f.write_str("|"),
            Self::Caret => f.write_str("^"),
            Self::Tilde => f.write_str("~"),
            Self::Shl => f.write_str("<<"),
            Self::Shr => f.write_str(">>"),
            Self::LParen => f.write_str("("),
            Self::RParen => f.write_str(")"),
            Self::LBracket => f.write_str("["),
            Self::RBracket => f.write_str("]"),
            Self::LBrace => f.write_str("{"),
            Self::RBrace => f.write_str("}"),
            Self::Comma => f.write_str(","),
            Self::Dot => f.write_str("."),
            Self::Semicolon => f.write_str(";"),
            Self::Colon => f.write_str(":"),
            Self::Question => f.write_str("?"),
            Self::Arrow => f.write_str("=>"),
            Self::Hash => f.write_str("#"),
            Self::OptChain => f.write_str("?."),
            Self::NullCoalesce => f.write_str("??"),
            Self::Spread => f.write_str("..."),
            Self::Eof => f.write_str("<eof>"),
            Self::Illegal(c) => write!(f, "<illegal {c:?}>"),
        }
    }
}

/// A keyword table consulted by the lexer before defaulting to `Ident`.
///
/// `true`/`false`/`null` are matched here too rather than in the parser, per
/// spec §4.1.
pub fn lookup_keyword(ident: &str) -> Option<TokenKind> {
    Some(match ident {
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "in" => TokenKind::In,
        "matches" => TokenKind::Matches,
        "contains" => TokenKind::Contains,
        "startsWith" => TokenKind::StartsWith,
        "endsWith" => TokenKind::EndsWith,
        "import" => TokenKind::Import,
        "as" => TokenKind::As,
        "from" => TokenKind::From,
        "true" => TokenKind::Bool(true),
        "false" => TokenKind::Bool(false),
        "null" => TokenKind::Null,
        _ => return None,
    })
}

/// A token with its lexeme and source position, as yielded by [`super::Lexer::next_token`].
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub position: Position,
}

/// The fixed set of pipeline-stage function names the parser uses to
/// disambiguate `|` as pipe vs. bitwise-or (spec §4.3).
pub const PIPELINE_FUNCTIONS: &[&str] = &[
    "filter", "map", "reduce", "sort", "reverse", "take", "skip", "join", "split", "match", "sum", "avg", "count",
    "len", "unique", "first", "last", "max", "min", "all", "any", "groupBy",
];
