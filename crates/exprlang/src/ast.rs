//! The abstract syntax tree produced by the parser (spec §4.2).
//!
//! Every node carries its source [`Position`] for diagnostics and a
//! `RefCell<Option<TypeInfo>>` slot the checker fills in during its pass —
//! the AST is otherwise immutable once parsed.

use std::cell::RefCell;
use std::fmt;

use crate::lexer::Position;
use crate::types::TypeInfo;

/// A type slot, written once by the checker and read by the compiler.
#[derive(Debug, Clone, Default)]
pub struct TypeSlot(RefCell<Option<TypeInfo>>);

impl TypeSlot {
    #[must_use]
    pub fn get(&self) -> Option<TypeInfo> {
        self.0.borrow().clone()
    }

    pub fn set(&self, ty: TypeInfo) {
        *self.0.borrow_mut() = Some(ty);
    }
}

impl PartialEq for TypeSlot {
    fn eq(&self, _other: &Self) -> bool {
        // Type annotations are inferred metadata, not part of AST identity.
        true
    }
}

/// The parsed expression plus any leading `import` statements (spec §4.2).
/// Not to be confused with the compiled [`crate::bytecode::Program`] the
/// compiler emits from this tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Ast {
    pub imports: Vec<ImportStatement>,
    pub body: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportStatement {
    pub path: String,
    pub alias: Option<String>,
    pub position: Position,
}

/// A lambda parameter list entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub position: Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixOp {
    Neg,
    Not,
    BitNot,
}

impl fmt::Display for PrefixOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Neg => "-",
            Self::Not => "!",
            Self::BitNot => "~",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfixOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    In,
    Matches,
    Contains,
    StartsWith,
    EndsWith,
}

impl fmt::Display for InfixOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Pow => "**",
            Self::Eq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::And => "&&",
            Self::Or => "||",
            Self::BitAnd => "&",
            Self::BitOr => "|",
            Self::BitXor => "^",
            Self::Shl => "<<",
            Self::Shr => ">>",
            Self::In => "in",
            Self::Matches => "matches",
            Self::Contains => "contains",
            Self::StartsWith => "startsWith",
            Self::EndsWith => "endsWith",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapEntry {
    pub key: Expr,
    pub value: Expr,
}

/// Every expression node (spec §4.2). `Program` holds one top-level `Expr`;
/// there are no statements, assignments, loops, or definitions.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    NilLiteral,
    BoolLiteral(bool),
    IntLiteral(i64),
    FloatLiteral(f64),
    StringLiteral(String),
    Identifier(String),
    ArrayLiteral(Vec<Expr>),
    MapLiteral(Vec<MapEntry>),
    Prefix {
        op: PrefixOp,
        right: Box<Expr>,
    },
    Infix {
        op: InfixOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        condition: Box<Expr>,
        consequence: Box<Expr>,
        alternative: Box<Expr>,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
        optional: bool,
    },
    Member {
        object: Box<Expr>,
        property: String,
        optional: bool,
    },
    Wildcard {
        object: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Builtin {
        name: String,
        args: Vec<Expr>,
    },
    ModuleCall {
        module: String,
        name: String,
        args: Vec<Expr>,
    },
    Lambda {
        params: Vec<Param>,
        body: Box<Expr>,
    },
    Pipe {
        source: Box<Expr>,
        stage: Box<Expr>,
    },
    Placeholder,
    NullCoalesce {
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub position: Position,
    pub ty: TypeSlot,
}

impl Expr {
    #[must_use]
    pub fn new(kind: ExprKind, position: Position) -> Self {
        Self {
            kind,
            position,
            ty: TypeSlot::default(),
        }
    }
}

/// Prints the AST back into source form, fully parenthesizing every infix
/// and prefix expression so the result is unambiguous regardless of the
/// original precedence (spec §4.2's round-trip property).
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::NilLiteral => f.write_str("nil"),
            ExprKind::BoolLiteral(b) => write!(f, "{b}"),
            ExprKind::IntLiteral(i) => write!(f, "{i}"),
            ExprKind::FloatLiteral(x) => write!(f, "{x}"),
            ExprKind::StringLiteral(s) => write!(f, "{s:?}"),
            ExprKind::Identifier(name) => f.write_str(name),
            ExprKind::ArrayLiteral(elems) => {
                f.write_str("[")?;
                write_comma_separated(f, elems)?;
                f.write_str("]")
            }
            ExprKind::MapLiteral(entries) => {
                f.write_str("{")?;
                for (i, e) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", e.key, e.value)?;
                }
                f.write_str("}")
            }
            ExprKind::Prefix { op, right } => write!(f, "({op}{right})"),
            ExprKind::Infix { op, left, right } => write!(f, "({left} {op} {right})"),
            ExprKind::Conditional {
                condition,
                consequence,
                alternative,
            } => write!(f, "({condition} ? {consequence} : {alternative})"),
            ExprKind::Index {
                object,
                index,
                optional,
            } => write!(f, "({object}{}[{index}])", if *optional { "?." } else { "" }),
            ExprKind::Member {
                object,
                property,
                optional,
            } => write!(f, "({object}{}{property})", if *optional { "?." } else { "." }),
            ExprKind::Wildcard { object } => write!(f, "({object}.*)"),
            ExprKind::Call { callee, args } => {
                write!(f, "{callee}(")?;
                write_comma_separated(f, args)?;
                f.write_str(")")
            }
            ExprKind::Builtin { name, args } => {
                write!(f, "{name}(")?;
                write_comma_separated(f, args)?;
                f.write_str(")")
            }
            ExprKind::ModuleCall { module, name, args } => {
                write!(f, "{module}.{name}(")?;
                write_comma_separated(f, args)?;
                f.write_str(")")
            }
            ExprKind::Lambda { params, body } => {
                f.write_str("(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    f.write_str(&p.name)?;
                }
                write!(f, ") => {body}")
            }
            ExprKind::Pipe { source, stage } => write!(f, "({source} | {stage})"),
            ExprKind::Placeholder => f.write_str("#"),
            ExprKind::NullCoalesce { left, right } => write!(f, "({left} ?? {right})"),
        }
    }
}

fn write_comma_separated(f: &mut fmt::Formatter<'_>, exprs: &[Expr]) -> fmt::Result {
    for (i, e) in exprs.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{e}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos() -> Position {
        Position::start()
    }

    #[test]
    fn infix_display_is_fully_parenthesized() {
        let left = Expr::new(ExprKind::IntLiteral(1), pos());
        let right = Expr::new(ExprKind::IntLiteral(2), pos());
        let e = Expr::new(
            ExprKind::Infix {
                op: InfixOp::Add,
                left: Box::new(left),
                right: Box::new(right),
            },
            pos(),
        );
        assert_eq!(e.to_string(), "(1 + 2)");
    }

    #[test]
    fn nested_infix_parenthesizes_every_level() {
        let a = Expr::new(ExprKind::IntLiteral(1), pos());
        let b = Expr::new(ExprKind::IntLiteral(2), pos());
        let inner = Expr::new(
            ExprKind::Infix {
                op: InfixOp::Mul,
                left: Box::new(a),
                right: Box::new(b),
            },
            pos(),
        );
        let c = Expr::new(ExprKind::IntLiteral(3), pos());
        let outer = Expr::new(
            ExprKind::Infix {
                op: InfixOp::Add,
                left: Box::new(inner),
                right: Box::new(c),
            },
            pos(),
        );
        assert_eq!(outer.to_string(), "((1 * 2) + 3)");
    }
}
