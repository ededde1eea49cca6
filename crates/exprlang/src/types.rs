//! `TypeInfo` — the type lattice attached to values and AST nodes (spec §3).

use std::fmt;
use std::rc::Rc;

/// The shape tag every value and AST node carries.
#[derive(Debug, Clone, PartialEq)]
pub enum Kind {
    Nil,
    Bool,
    Int64,
    Float64,
    String,
    Slice,
    Map,
    Func,
    Struct,
    /// Assignable from (and to) anything; used for ternary-branch unification
    /// failures and unchecked arguments (spec §4.4).
    Interface,
}

impl Kind {
    /// The builtin module a dot-call `value.method(...)` on this kind
    /// dispatches through at run time (spec §4.8's type-method registry),
    /// or `None` if this kind has no type methods. Scoped to primitives —
    /// `Slice`/`Map` already expose their operations as free/pipe-stage
    /// builtins, so a dot call on one of those instead falls back to the
    /// existing member-then-call path (see `DESIGN.md`).
    #[must_use]
    pub fn type_method_module(&self) -> Option<&'static str> {
        match self {
            Self::String => Some("string"),
            Self::Int64 | Self::Float64 => Some("math"),
            _ => None,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Nil => "nil",
            Self::Bool => "bool",
            Self::Int64 => "int",
            Self::Float64 => "float",
            Self::String => "string",
            Self::Slice => "slice",
            Self::Map => "map",
            Self::Func => "func",
            Self::Struct => "struct",
            Self::Interface => "interface{}",
        };
        f.write_str(s)
    }
}

/// A named struct field, as registered by the environment adapter (spec §4.9).
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub ty: TypeInfo,
}

/// The full type of a value or AST node.
///
/// `Kind` alone distinguishes most cases; `Slice`/`Map`/`Struct` carry extra
/// payload that is boxed (via `Rc`) so `TypeInfo` stays cheap to clone.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeInfo {
    pub kind: Kind,
    pub name: String,
    pub elem: Option<Rc<TypeInfo>>,
    pub key: Option<Rc<TypeInfo>>,
    pub value: Option<Rc<TypeInfo>>,
    pub fields: Rc<[Field]>,
}

impl TypeInfo {
    #[must_use]
    pub fn simple(kind: Kind, name: &str) -> Self {
        Self {
            kind,
            name: name.to_string(),
            elem: None,
            key: None,
            value: None,
            fields: Rc::from(Vec::new()),
        }
    }

    #[must_use]
    pub fn nil() -> Self {
        Self::simple(Kind::Nil, "nil")
    }

    #[must_use]
    pub fn bool() -> Self {
        Self::simple(Kind::Bool, "bool")
    }

    #[must_use]
    pub fn int() -> Self {
        Self::simple(Kind::Int64, "int")
    }

    #[must_use]
    pub fn float() -> Self {
        Self::simple(Kind::Float64, "float")
    }

    #[must_use]
    pub fn string() -> Self {
        Self::simple(Kind::String, "string")
    }

    #[must_use]
    pub fn interface() -> Self {
        Self::simple(Kind::Interface, "interface{}")
    }

    #[must_use]
    pub fn func() -> Self {
        Self::simple(Kind::Func, "func")
    }

    #[must_use]
    pub fn slice(elem: Self) -> Self {
        Self {
            kind: Kind::Slice,
            name: format!("[]{}", elem.name),
            elem: Some(Rc::new(elem)),
            key: None,
            value: None,
            fields: Rc::from(Vec::new()),
        }
    }

    #[must_use]
    pub fn map(key: Self, value: Self) -> Self {
        Self {
            kind: Kind::Map,
            name: format!("map[{}]{}", key.name, value.name),
            elem: None,
            key: Some(Rc::new(key)),
            value: Some(Rc::new(value)),
            fields: Rc::from(Vec::new()),
        }
    }

    #[must_use]
    pub fn strukt(name: &str, fields: Vec<Field>) -> Self {
        Self {
            kind: Kind::Struct,
            name: name.to_string(),
            elem: None,
            key: None,
            value: None,
            fields: Rc::from(fields),
        }
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&TypeInfo> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.ty)
    }

    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(self.kind, Kind::Int64 | Kind::Float64)
    }

    /// Whether a value of `other` may be passed where `self` is expected
    /// (spec §4.4's call-argument assignability rule: same kind, numeric
    /// widening, or anything into `Interface`).
    #[must_use]
    pub fn assignable_from(&self, other: &Self) -> bool {
        if matches!(self.kind, Kind::Interface) {
            return true;
        }
        if self.is_numeric() && other.is_numeric() {
            return true;
        }
        self.kind == other.kind
    }
}

impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
