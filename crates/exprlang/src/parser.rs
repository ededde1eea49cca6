//! Pratt / precedence-climbing parser (spec §4.3).
//!
//! Parses a materialized token stream (no streaming lexer interleaving —
//! simpler to reason about and the inputs are always small expressions).
//! Diagnostics are accumulated rather than raised on the first problem: a
//! malformed sub-expression is replaced with a `NilLiteral` placeholder so
//! parsing can keep walking the surrounding structure and surface every
//! error it finds in one pass.

use crate::ast::{Expr, ExprKind, ImportStatement, InfixOp, MapEntry, Param, PrefixOp, Ast};
use crate::error::{Diagnostic, Error};
use crate::lexer::{lex_all, Position, Token, TokenKind, PIPELINE_FUNCTIONS};

/// Dotted-call prefixes the parser treats as a standalone module namespace
/// (spec §4.8) rather than a member access on a value.
const MODULE_NAMES: &[&str] = &["math", "string", "collection", "util"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    Lowest,
    Lambda,
    Ternary,
    NullCoalesce,
    PipeStage,
    Or,
    And,
    Equality,
    Comparison,
    BitOr,
    BitXor,
    BitAnd,
    Shift,
    Sum,
    Product,
    Power,
    Prefix,
    Postfix,
    OptionalChaining,
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    diagnostics: Vec<Diagnostic>,
}

impl Parser {
    /// # Errors
    /// Returns `Error::Lex` if the source contains an unrecognized token.
    pub fn parse(source: &str) -> Result<Ast, Error> {
        let tokens = lex_all(source)?;
        let mut parser = Self {
            tokens,
            pos: 0,
            diagnostics: Vec::new(),
        };
        let imports = parser.parse_imports();
        let body = parser.parse_expression(Precedence::Lowest);
        parser.expect(&TokenKind::Eof);
        if parser.diagnostics.is_empty() {
            Ok(Ast { imports, body })
        } else {
            Err(Error::Parse(parser.diagnostics))
        }
    }

    fn parse_imports(&mut self) -> Vec<ImportStatement> {
        let mut imports = Vec::new();
        while matches!(self.cur().kind, TokenKind::Import) {
            let position = self.cur().position;
            self.advance();
            let path = if let TokenKind::String(s) = self.cur().kind.clone() {
                self.advance();
                s
            } else {
                self.error("expected a module path string after `import`");
                String::new()
            };
            let alias = if matches!(self.cur().kind, TokenKind::As) {
                self.advance();
                match self.cur().kind.clone() {
                    TokenKind::Ident(name) => {
                        self.advance();
                        Some(name)
                    }
                    _ => {
                        self.error("expected an identifier after `as`");
                        None
                    }
                }
            } else {
                None
            };
            imports.push(ImportStatement { path, alias, position });
            if matches!(self.cur().kind, TokenKind::Semicolon) {
                self.advance();
            }
        }
        imports
    }

    fn cur(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens.get(self.pos + offset).unwrap_or_else(|| self.tokens.last().unwrap())
    }

    fn advance(&mut self) -> Token {
        let tok = self.cur().clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, kind: &TokenKind) {
        if std::mem::discriminant(&self.cur().kind) == std::mem::discriminant(kind) {
            self.advance();
        } else {
            self.error(&format!("expected {kind}, found {}", self.cur().kind));
        }
    }

    fn error(&mut self, message: &str) {
        self.diagnostics.push(Diagnostic::new(message, Some(self.cur().position)));
    }

    fn placeholder_expr(&self, position: Position) -> Expr {
        Expr::new(ExprKind::NilLiteral, position)
    }

    fn parse_expression(&mut self, min_prec: Precedence) -> Expr {
        let mut left = self.parse_prefix();
        loop {
            let Some((prec, right_assoc)) = self.infix_precedence(&left) else {
                break;
            };
            if prec < min_prec || (prec == min_prec && !right_assoc) {
                break;
            }
            left = self.parse_infix(left, prec, right_assoc);
        }
        left
    }

    fn infix_precedence(&self, left: &Expr) -> Option<(Precedence, bool)> {
        Some(match &self.cur().kind {
            TokenKind::Question => (Precedence::Ternary, true),
            TokenKind::NullCoalesce => (Precedence::NullCoalesce, true),
            TokenKind::Pipe if self.pipe_is_stage(left) => (Precedence::PipeStage, false),
            TokenKind::Or => (Precedence::Or, false),
            TokenKind::And => (Precedence::And, false),
            TokenKind::Eq
            | TokenKind::NotEq
            | TokenKind::In
            | TokenKind::Matches
            | TokenKind::Contains
            | TokenKind::StartsWith
            | TokenKind::EndsWith => (Precedence::Equality, false),
            TokenKind::Lt | TokenKind::LtEq | TokenKind::Gt | TokenKind::GtEq => (Precedence::Comparison, false),
            TokenKind::Pipe => (Precedence::BitOr, false),
            TokenKind::Caret => (Precedence::BitXor, false),
            TokenKind::Amp => (Precedence::BitAnd, false),
            TokenKind::Shl | TokenKind::Shr => (Precedence::Shift, false),
            TokenKind::Plus | TokenKind::Minus => (Precedence::Sum, false),
            TokenKind::Star | TokenKind::Slash | TokenKind::Percent => (Precedence::Product, false),
            TokenKind::Pow => (Precedence::Power, true),
            TokenKind::Dot | TokenKind::OptChain | TokenKind::LBracket | TokenKind::LParen => {
                (Precedence::OptionalChaining, false)
            }
            _ => return None,
        })
    }

    /// Disambiguates `|` as a pipeline stage vs. bitwise-or (spec §4.3): a
    /// stage is a known pipeline function name, optionally applied, or a
    /// lambda on the right — OR any left operand other than an integer
    /// literal. Bitwise-or only survives when both operands are plain
    /// integer literals, e.g. `5 | 3`.
    fn pipe_is_stage(&self, left: &Expr) -> bool {
        if !matches!(left.kind, ExprKind::IntLiteral(_)) {
            return true;
        }
        match &self.peek_at(1).kind {
            TokenKind::Ident(name) => PIPELINE_FUNCTIONS.contains(&name.as_str()),
            TokenKind::Hash => true,
            TokenKind::LParen => {
                // `(...) => ...` lambda stage; look for an Arrow before the
                // next top-level `|` or expression boundary.
                let mut depth = 0i32;
                let mut i = 1;
                loop {
                    match &self.peek_at(i).kind {
                        TokenKind::LParen => depth += 1,
                        TokenKind::RParen => {
                            depth -= 1;
                            if depth == 0 {
                                return matches!(self.peek_at(i + 1).kind, TokenKind::Arrow);
                            }
                        }
                        TokenKind::Eof => return false,
                        _ => {}
                    }
                    i += 1;
                }
            }
            _ => false,
        }
    }

    fn parse_infix(&mut self, left: Expr, prec: Precedence, right_assoc: bool) -> Expr {
        let position = self.cur().position;
        match self.cur().kind.clone() {
            TokenKind::Question => self.parse_conditional(left, position),
            TokenKind::NullCoalesce => {
                self.advance();
                let right = self.parse_expression(Precedence::NullCoalesce);
                Expr::new(
                    ExprKind::NullCoalesce {
                        left: Box::new(left),
                        right: Box::new(right),
                    },
                    position,
                )
            }
            TokenKind::Pipe if prec == Precedence::PipeStage => {
                self.advance();
                let stage = self.parse_expression(Precedence::PipeStage);
                Expr::new(
                    ExprKind::Pipe {
                        source: Box::new(left),
                        stage: Box::new(stage),
                    },
                    position,
                )
            }
            TokenKind::Dot => self.parse_member(left, position),
            TokenKind::OptChain => self.parse_optional_member(left, position),
            TokenKind::LBracket => self.parse_index(left, position, false),
            TokenKind::LParen => self.parse_call(left, position),
            _ => {
                let Some(op) = infix_op_for(&self.cur().kind) else {
                    self.error("unexpected infix token");
                    self.advance();
                    return left;
                };
                self.advance();
                let next_min = if right_assoc {
                    prec
                } else {
                    bump(prec)
                };
                let right = self.parse_expression(next_min);
                Expr::new(
                    ExprKind::Infix {
                        op,
                        left: Box::new(left),
                        right: Box::new(right),
                    },
                    position,
                )
            }
        }
    }

    fn parse_conditional(&mut self, condition: Expr, position: Position) -> Expr {
        self.advance(); // `?`
        let consequence = self.parse_expression(Precedence::Ternary);
        self.expect(&TokenKind::Colon);
        let alternative = self.parse_expression(Precedence::Ternary);
        Expr::new(
            ExprKind::Conditional {
                condition: Box::new(condition),
                consequence: Box::new(consequence),
                alternative: Box::new(alternative),
            },
            position,
        )
    }

    fn parse_member(&mut self, object: Expr, position: Position) -> Expr {
        self.advance(); // `.`
        if matches!(self.cur().kind, TokenKind::Wildcard) {
            self.advance();
            return Expr::new(ExprKind::Wildcard { object: Box::new(object) }, position);
        }
        let TokenKind::Ident(name) = self.cur().kind.clone() else {
            self.error("expected a property name after `.`");
            return object;
        };
        self.advance();
        if let ExprKind::Identifier(module) = &object.kind {
            if MODULE_NAMES.contains(&module.as_str()) && matches!(self.cur().kind, TokenKind::LParen) {
                return self.parse_module_call(module.clone(), name, position);
            }
        }
        if matches!(self.cur().kind, TokenKind::LParen) {
            let member = Expr::new(
                ExprKind::Member {
                    object: Box::new(object),
                    property: name,
                    optional: false,
                },
                position,
            );
            return self.parse_call(member, self.cur().position);
        }
        Expr::new(
            ExprKind::Member {
                object: Box::new(object),
                property: name,
                optional: false,
            },
            position,
        )
    }

    fn parse_optional_member(&mut self, object: Expr, position: Position) -> Expr {
        self.advance(); // `?.`
        if matches!(self.cur().kind, TokenKind::LBracket) {
            return self.parse_index(object, position, true);
        }
        if matches!(self.cur().kind, TokenKind::Wildcard) {
            self.advance();
            return Expr::new(ExprKind::Wildcard { object: Box::new(object) }, position);
        }
        let TokenKind::Ident(name) = self.cur().kind.clone() else {
            self.error("expected a property name after `?.`");
            return object;
        };
        self.advance();
        Expr::new(
            ExprKind::Member {
                object: Box::new(object),
                property: name,
                optional: true,
            },
            position,
        )
    }

    fn parse_index(&mut self, object: Expr, position: Position, optional: bool) -> Expr {
        self.advance(); // `[`
        let index = self.parse_expression(Precedence::Lowest);
        self.expect(&TokenKind::RBracket);
        Expr::new(
            ExprKind::Index {
                object: Box::new(object),
                index: Box::new(index),
                optional,
            },
            position,
        )
    }

    fn parse_call(&mut self, callee: Expr, position: Position) -> Expr {
        let args = self.parse_arg_list();
        if let ExprKind::Identifier(name) = &callee.kind {
            if PIPELINE_FUNCTIONS.contains(&name.as_str()) {
                return Expr::new(ExprKind::Builtin { name: name.clone(), args }, position);
            }
        }
        Expr::new(
            ExprKind::Call {
                callee: Box::new(callee),
                args,
            },
            position,
        )
    }

    fn parse_module_call(&mut self, module: String, name: String, position: Position) -> Expr {
        let args = self.parse_arg_list();
        Expr::new(ExprKind::ModuleCall { module, name, args }, position)
    }

    fn parse_arg_list(&mut self) -> Vec<Expr> {
        self.advance(); // `(`
        let mut args = Vec::new();
        if matches!(self.cur().kind, TokenKind::RParen) {
            self.advance();
            return args;
        }
        loop {
            args.push(self.parse_expression(Precedence::Lowest));
            if matches!(self.cur().kind, TokenKind::Comma) {
                self.advance();
                continue;
            }
            break;
        }
        self.expect(&TokenKind::RParen);
        args
    }

    fn parse_prefix(&mut self) -> Expr {
        let position = self.cur().position;
        match self.cur().kind.clone() {
            TokenKind::Int(i) => {
                self.advance();
                Expr::new(ExprKind::IntLiteral(i), position)
            }
            TokenKind::Number(n) => {
                self.advance();
                Expr::new(ExprKind::FloatLiteral(n), position)
            }
            TokenKind::String(s) => {
                self.advance();
                Expr::new(ExprKind::StringLiteral(s), position)
            }
            TokenKind::Bool(b) => {
                self.advance();
                Expr::new(ExprKind::BoolLiteral(b), position)
            }
            TokenKind::Null => {
                self.advance();
                Expr::new(ExprKind::NilLiteral, position)
            }
            TokenKind::Hash => {
                self.advance();
                Expr::new(ExprKind::Placeholder, position)
            }
            TokenKind::Ident(name) => self.parse_identifier_or_lambda(name, position),
            TokenKind::Minus => self.parse_unary(PrefixOp::Neg, position),
            TokenKind::Not => self.parse_unary(PrefixOp::Not, position),
            TokenKind::Tilde => self.parse_unary(PrefixOp::BitNot, position),
            TokenKind::LParen => self.parse_group_or_lambda(position),
            TokenKind::LBracket => self.parse_array(position),
            TokenKind::LBrace => self.parse_map(position),
            _ => {
                self.error(&format!("unexpected token {}", self.cur().kind));
                self.advance();
                self.placeholder_expr(position)
            }
        }
    }

    fn parse_unary(&mut self, op: PrefixOp, position: Position) -> Expr {
        self.advance();
        let right = self.parse_expression(Precedence::Prefix);
        Expr::new(
            ExprKind::Prefix {
                op,
                right: Box::new(right),
            },
            position,
        )
    }

    fn parse_identifier_or_lambda(&mut self, name: String, position: Position) -> Expr {
        if matches!(self.peek_at(1).kind, TokenKind::Arrow) {
            self.advance(); // ident
            self.advance(); // =>
            let body = self.parse_expression(Precedence::Lambda);
            return Expr::new(
                ExprKind::Lambda {
                    params: vec![Param { name, position }],
                    body: Box::new(body),
                },
                position,
            );
        }
        self.advance();
        Expr::new(ExprKind::Identifier(name), position)
    }

    /// `(` starts either a parenthesized expression or a lambda parameter
    /// list; the two are disambiguated by scanning to the matching `)` and
    /// checking for a following `=>`.
    fn parse_group_or_lambda(&mut self, position: Position) -> Expr {
        if self.looks_like_lambda_params() {
            return self.parse_lambda(position);
        }
        self.advance(); // `(`
        let inner = self.parse_expression(Precedence::Lowest);
        self.expect(&TokenKind::RParen);
        inner
    }

    fn looks_like_lambda_params(&self) -> bool {
        let mut depth = 0i32;
        let mut i = 0;
        loop {
            match &self.peek_at(i).kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        return matches!(self.peek_at(i + 1).kind, TokenKind::Arrow);
                    }
                }
                TokenKind::Eof => return false,
                _ => {}
            }
            i += 1;
        }
    }

    fn parse_lambda(&mut self, position: Position) -> Expr {
        self.advance(); // `(`
        let mut params = Vec::new();
        if !matches!(self.cur().kind, TokenKind::RParen) {
            loop {
                let param_pos = self.cur().position;
                match self.cur().kind.clone() {
                    TokenKind::Ident(name) => {
                        self.advance();
                        params.push(Param { name, position: param_pos });
                    }
                    _ => {
                        self.error("expected a parameter name");
                        break;
                    }
                }
                if matches!(self.cur().kind, TokenKind::Comma) {
                    self.advance();
                    continue;
                }
                break;
            }
        }
        self.expect(&TokenKind::RParen);
        self.expect(&TokenKind::Arrow);
        let body = self.parse_expression(Precedence::Lambda);
        Expr::new(
            ExprKind::Lambda {
                params,
                body: Box::new(body),
            },
            position,
        )
    }

    fn parse_array(&mut self, position: Position) -> Expr {
        self.advance(); // `[`
        let mut elems = Vec::new();
        if !matches!(self.cur().kind, TokenKind::RBracket) {
            loop {
                elems.push(self.parse_expression(Precedence::Lowest));
                if matches!(self.cur().kind, TokenKind::Comma) {
                    self.advance();
                    if matches!(self.cur().kind, TokenKind::RBracket) {
                        break;
                    }
                    continue;
                }
                break;
            }
        }
        self.expect(&TokenKind::RBracket);
        Expr::new(ExprKind::ArrayLiteral(elems), position)
    }

    fn parse_map(&mut self, position: Position) -> Expr {
        self.advance(); // `{`
        let mut entries = Vec::new();
        if !matches!(self.cur().kind, TokenKind::RBrace) {
            loop {
                let key = if let TokenKind::Ident(name) = self.cur().kind.clone() {
                    let key_pos = self.cur().position;
                    self.advance();
                    Expr::new(ExprKind::StringLiteral(name), key_pos)
                } else {
                    self.parse_expression(Precedence::Lowest)
                };
                self.expect(&TokenKind::Colon);
                let value = self.parse_expression(Precedence::Lowest);
                entries.push(MapEntry { key, value });
                if matches!(self.cur().kind, TokenKind::Comma) {
                    self.advance();
                    if matches!(self.cur().kind, TokenKind::RBrace) {
                        break;
                    }
                    continue;
                }
                break;
            }
        }
        self.expect(&TokenKind::RBrace);
        Expr::new(ExprKind::MapLiteral(entries), position)
    }
}

fn bump(prec: Precedence) -> Precedence {
    match prec {
        Precedence::Lowest => Precedence::Lambda,
        Precedence::Lambda => Precedence::Ternary,
        Precedence::Ternary => Precedence::NullCoalesce,
        Precedence::NullCoalesce => Precedence::PipeStage,
        Precedence::PipeStage => Precedence::Or,
        Precedence::Or => Precedence::And,
        Precedence::And => Precedence::Equality,
        Precedence::Equality => Precedence::Comparison,
        Precedence::Comparison => Precedence::BitOr,
        Precedence::BitOr => Precedence::BitXor,
        Precedence::BitXor => Precedence::BitAnd,
        Precedence::BitAnd => Precedence::Shift,
        Precedence::Shift => Precedence::Sum,
        Precedence::Sum => Precedence::Product,
        Precedence::Product => Precedence::Power,
        Precedence::Power => Precedence::Prefix,
        Precedence::Prefix => Precedence::Postfix,
        Precedence::Postfix | Precedence::OptionalChaining => Precedence::OptionalChaining,
    }
}

fn infix_op_for(kind: &TokenKind) -> Option<InfixOp> {
    Some(match kind {
        TokenKind::Plus => InfixOp::Add,
        TokenKind::Minus => InfixOp::Sub,
        TokenKind::Star => InfixOp::Mul,
        TokenKind::Slash => InfixOp::Div,
        TokenKind::Percent => InfixOp::Mod,
        TokenKind::Pow => InfixOp::Pow,
        TokenKind::Eq => InfixOp::Eq,
        TokenKind::NotEq => InfixOp::NotEq,
        TokenKind::Lt => InfixOp::Lt,
        TokenKind::LtEq => InfixOp::LtEq,
        TokenKind::Gt => InfixOp::Gt,
        TokenKind::GtEq => InfixOp::GtEq,
        TokenKind::And => InfixOp::And,
        TokenKind::Or => InfixOp::Or,
        TokenKind::Amp => InfixOp::BitAnd,
        TokenKind::Pipe => InfixOp::BitOr,
        TokenKind::Caret => InfixOp::BitXor,
        TokenKind::Shl => InfixOp::Shl,
        TokenKind::Shr => InfixOp::Shr,
        TokenKind::In => InfixOp::In,
        TokenKind::Matches => InfixOp::Matches,
        TokenKind::Contains => InfixOp::Contains,
        TokenKind::StartsWith => InfixOp::StartsWith,
        TokenKind::EndsWith => InfixOp::EndsWith,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Expr {
        Parser::parse(src).unwrap_or_else(|e| panic!("parse failed for {src:?}: {e}")).body
    }

    #[test]
    fn arithmetic_precedence() {
        assert_eq!(parse("1 + 2 * 3").to_string(), "(1 + (2 * 3))");
    }

    #[test]
    fn power_is_right_associative() {
        assert_eq!(parse("2 ** 3 ** 2").to_string(), "(2 ** (3 ** 2))");
    }

    #[test]
    fn ternary_parses_both_branches() {
        assert_eq!(parse("a ? 1 : 2").to_string(), "(a ? 1 : 2)");
    }

    #[test]
    fn pipe_with_filter_is_a_pipeline_stage() {
        let expr = parse("items | filter(#.active)");
        assert!(matches!(expr.kind, ExprKind::Pipe { .. }));
    }

    #[test]
    fn bare_pipe_between_int_literals_is_bitwise_or() {
        let expr = parse("5 | 3");
        match expr.kind {
            ExprKind::Infix { op: InfixOp::BitOr, .. } => {}
            other => panic!("expected BitOr infix, got {other:?}"),
        }
    }

    #[test]
    fn bare_pipe_with_a_non_literal_left_operand_is_a_pipe_stage() {
        // `a | b`: `a` isn't an integer literal, so per spec §4.3 this is a
        // pipe even though `b` doesn't name a pipeline function either.
        let expr = parse("a | b");
        assert!(matches!(expr.kind, ExprKind::Pipe { .. }));
    }

    #[test]
    fn lambda_single_param() {
        let expr = parse("x => x + 1");
        match expr.kind {
            ExprKind::Lambda { params, .. } => assert_eq!(params.len(), 1),
            other => panic!("expected lambda, got {other:?}"),
        }
    }

    #[test]
    fn lambda_multi_param_in_parens() {
        let expr = parse("(a, b) => a + b");
        match expr.kind {
            ExprKind::Lambda { params, .. } => assert_eq!(params.len(), 2),
            other => panic!("expected lambda, got {other:?}"),
        }
    }

    #[test]
    fn optional_chaining_member() {
        let expr = parse("user?.name");
        match expr.kind {
            ExprKind::Member { optional, .. } => assert!(optional),
            other => panic!("expected optional member, got {other:?}"),
        }
    }

    #[test]
    fn module_call_recognized() {
        let expr = parse("math.sqrt(4)");
        assert!(matches!(expr.kind, ExprKind::ModuleCall { .. }));
    }

    #[test]
    fn malformed_expression_collects_diagnostic() {
        let err = Parser::parse("1 +").expect_err("expected a parse error");
        assert!(matches!(err, Error::Parse(ds) if !ds.is_empty()));
    }
}
