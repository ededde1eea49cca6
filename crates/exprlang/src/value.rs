//! The tagged-union `Value` representation (spec §3).
//!
//! `String`/`Slice`/`Map`/`Func`/`PlaceholderExpr` payloads are `Rc`-shared so
//! cloning a `Value` is always O(1) and containers are immutable from the
//! VM's perspective (every operation produces a fresh container, never
//! mutates in place) without needing the teacher's heap/refcount machinery —
//! a side-effect-free evaluator has no reference cycles to break.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use indexmap::IndexMap;

use crate::bytecode::Program;
use crate::types::{Kind, TypeInfo};

/// A map key. The spec's open question on non-string map keys is resolved
/// in `DESIGN.md`: keys are stringified at construction time (display form),
/// so `Map` can stay a flat `IndexMap<Rc<str>, Value>`.
pub type MapKey = Rc<str>;

#[derive(Debug)]
pub struct SliceData {
    pub elems: Vec<Value>,
    pub elem_type: TypeInfo,
}

#[derive(Debug)]
pub struct MapData {
    pub entries: IndexMap<MapKey, Value>,
    pub key_type: TypeInfo,
    pub value_type: TypeInfo,
}

/// A compiled, callable function: either a user lambda or a named builtin
/// wrapper captured as a value. `free` holds the closed-over values in the
/// order the compiler recorded them (spec §4.5's free-variable list).
#[derive(Debug)]
pub struct FunctionProto {
    pub name: Option<String>,
    pub param_names: Vec<String>,
    pub num_locals: u16,
    pub code: Rc<Program>,
}

#[derive(Debug)]
pub struct Closure {
    pub proto: Rc<FunctionProto>,
    pub free: Vec<Value>,
}

/// A compiled, reusable pipeline-stage predicate/transformer captured as a
/// constant (spec §3, §4.6's "placeholder capture").
///
/// `Fast` covers the overwhelmingly common shape (`# > 0`, `#.x == 1`) with
/// no VM re-entry; `Compiled` falls back to a full inner-VM run for
/// anything else.
#[derive(Debug)]
pub enum PlaceholderBody {
    Fast { op: FastOp, operand: Box<Value> },
    Compiled { code: Rc<Program> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FastOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

#[derive(Debug)]
pub struct PlaceholderExpr {
    pub body: PlaceholderBody,
}

/// The tagged union of every runtime value (spec §3).
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(Rc<str>),
    Slice(Rc<SliceData>),
    Map(Rc<MapData>),
    Func(Rc<Closure>),
    Placeholder(Rc<PlaceholderExpr>),
    /// A lambda's compiled template, interned as a constant so `MakeClosure`
    /// can pair it with whatever free values the current frame captured.
    /// Never observed by host code — `kind()`/`type_info()` report it as
    /// `Func`, same as a fully-built closure.
    Proto(Rc<FunctionProto>),
}

impl Value {
    #[must_use]
    pub fn string(s: impl Into<Rc<str>>) -> Self {
        Self::String(s.into())
    }

    #[must_use]
    pub fn slice(elems: Vec<Self>, elem_type: TypeInfo) -> Self {
        Self::Slice(Rc::new(SliceData { elems, elem_type }))
    }

    #[must_use]
    pub fn map(entries: IndexMap<MapKey, Self>, key_type: TypeInfo, value_type: TypeInfo) -> Self {
        Self::Map(Rc::new(MapData {
            entries,
            key_type,
            value_type,
        }))
    }

    /// Returns this value's `TypeInfo`, matching its payload exactly (§3's
    /// first invariant).
    #[must_use]
    pub fn type_info(&self) -> TypeInfo {
        match self {
            Self::Nil => TypeInfo::nil(),
            Self::Bool(_) => TypeInfo::bool(),
            Self::Int(_) => TypeInfo::int(),
            Self::Float(_) => TypeInfo::float(),
            Self::String(_) => TypeInfo::string(),
            Self::Slice(s) => TypeInfo::slice(s.elem_type.clone()),
            Self::Map(m) => TypeInfo::map(m.key_type.clone(), m.value_type.clone()),
            Self::Func(_) | Self::Placeholder(_) | Self::Proto(_) => TypeInfo::func(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> Kind {
        self.type_info().kind
    }

    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Nil => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::String(s) => !s.is_empty(),
            Self::Slice(s) => !s.elems.is_empty(),
            Self::Map(m) => !m.entries.is_empty(),
            Self::Func(_) | Self::Placeholder(_) | Self::Proto(_) => true,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

/// Equality per spec §3: reflexive/symmetric/transitive within a kind;
/// mixed numeric kinds (`Int` vs `Float`) are *not* equal here — an explicit
/// numeric-comparison opcode handles widening instead.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Nil, Self::Nil) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Slice(a), Self::Slice(b)) => a.elems == b.elems,
            (Self::Map(a), Self::Map(b)) => a.entries == b.entries,
            (Self::Func(a), Self::Func(b)) => Rc::ptr_eq(a, b),
            (Self::Placeholder(a), Self::Placeholder(b)) => Rc::ptr_eq(a, b),
            (Self::Proto(a), Self::Proto(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Nil => {}
            Self::Bool(b) => b.hash(state),
            Self::Int(i) => i.hash(state),
            // Bit-pattern hashing keeps Hash consistent with the `==` above,
            // including -0.0 == 0.0 hashing identically.
            Self::Float(f) => {
                let bits = if *f == 0.0 { 0.0_f64.to_bits() } else { f.to_bits() };
                bits.hash(state);
            }
            Self::String(s) => s.hash(state),
            Self::Slice(s) => {
                for e in &s.elems {
                    e.hash(state);
                }
            }
            Self::Map(m) => {
                for (k, v) in &m.entries {
                    k.hash(state);
                    v.hash(state);
                }
            }
            Self::Func(f) => Rc::as_ptr(f).hash(state),
            Self::Placeholder(p) => Rc::as_ptr(p).hash(state),
            Self::Proto(p) => Rc::as_ptr(p).hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => f.write_str("nil"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => f.write_str(s),
            Self::Slice(s) => {
                f.write_str("[")?;
                for (i, e) in s.elems.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{e}")?;
                }
                f.write_str("]")
            }
            Self::Map(m) => {
                f.write_str("{")?;
                for (i, (k, v)) in m.entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
            Self::Func(c) => write!(f, "<func {}>", c.proto.name.as_deref().unwrap_or("anonymous")),
            Self::Placeholder(_) => f.write_str("<placeholder>"),
            Self::Proto(p) => write!(f, "<func {}>", p.name.as_deref().unwrap_or("anonymous")),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s.into())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nil_equals_only_itself() {
        assert_eq!(Value::Nil, Value::Nil);
        assert_ne!(Value::Nil, Value::Bool(false));
        assert_ne!(Value::Nil, Value::Int(0));
    }

    #[test]
    fn mixed_numeric_kinds_are_not_equal() {
        assert_ne!(Value::Int(1), Value::Float(1.0));
    }

    #[test]
    fn negative_zero_hashes_like_positive_zero() {
        use std::collections::hash_map::DefaultHasher;
        let mut h1 = DefaultHasher::new();
        let mut h2 = DefaultHasher::new();
        Value::Float(0.0).hash(&mut h1);
        Value::Float(-0.0).hash(&mut h2);
        assert_eq!(h1.finish(), h2.finish());
    }

    #[test]
    fn display_formats_slices_like_source_arrays() {
        let v = Value::slice(vec![Value::Int(1), Value::Int(2)], TypeInfo::int());
        assert_eq!(v.to_string(), "[1, 2]");
    }
}
