//! The builtin and pipeline-function registry (spec §4.8).
//!
//! Two call paths reach this module:
//! - `CallBuiltin` invokes one of [`REGISTRY`]'s entries directly — these
//!   are the pipeline-aware functions (`filter`, `map`, `reduce`, ...) that
//!   can appear either as `name(args)` or as a pipe stage `src | name(args)`.
//! - `CallModule` invokes a dotted `module.name(args)` form (`math.sqrt`,
//!   `string.upper`, ...) through [`call_module`].
//!
//! Builtins that take a predicate/transform argument (`filter`, `map`,
//! `reduce`, `sort`) receive an [`Invoker`] so they can call back into the
//! VM without this module depending on it directly.

mod collection;
mod math;
mod string;
mod util;

use crate::error::{Error, Result};
use crate::value::Value;

/// Lets a builtin call back into whatever executes `Value::Func` and
/// `Value::Placeholder` values, without `builtins` depending on `vm`.
pub trait Invoker {
    fn call(&mut self, callee: &Value, args: &[Value]) -> Result<Value>;
}

pub type BuiltinFn = fn(&[Value], &mut dyn Invoker) -> Result<Value>;

pub struct BuiltinSpec {
    pub name: &'static str,
    pub min_args: usize,
    pub max_args: Option<usize>,
    pub func: BuiltinFn,
}

/// The pipeline-aware builtins, in [`crate::lexer::PIPELINE_FUNCTIONS`]
/// order. `CallBuiltin`'s operand is an index into this table.
pub static REGISTRY: &[BuiltinSpec] = &[
    BuiltinSpec { name: "filter", min_args: 2, max_args: Some(2), func: collection::filter },
    BuiltinSpec { name: "map", min_args: 2, max_args: Some(2), func: collection::map },
    BuiltinSpec { name: "reduce", min_args: 2, max_args: Some(3), func: collection::reduce },
    BuiltinSpec { name: "sort", min_args: 1, max_args: Some(2), func: collection::sort },
    BuiltinSpec { name: "reverse", min_args: 1, max_args: Some(1), func: collection::reverse },
    BuiltinSpec { name: "take", min_args: 2, max_args: Some(2), func: collection::take },
    BuiltinSpec { name: "skip", min_args: 2, max_args: Some(2), func: collection::skip },
    BuiltinSpec { name: "join", min_args: 1, max_args: Some(2), func: collection::join },
    BuiltinSpec { name: "split", min_args: 2, max_args: Some(2), func: collection::split },
    BuiltinSpec { name: "match", min_args: 2, max_args: Some(2), func: collection::pattern_match },
    BuiltinSpec { name: "sum", min_args: 1, max_args: Some(1), func: collection::sum },
    BuiltinSpec { name: "avg", min_args: 1, max_args: Some(1), func: collection::avg },
    BuiltinSpec { name: "count", min_args: 1, max_args: Some(2), func: collection::count },
    BuiltinSpec { name: "len", min_args: 1, max_args: Some(1), func: collection::len },
    BuiltinSpec { name: "unique", min_args: 1, max_args: Some(1), func: collection::unique },
    BuiltinSpec { name: "first", min_args: 1, max_args: Some(1), func: collection::first },
    BuiltinSpec { name: "last", min_args: 1, max_args: Some(1), func: collection::last },
    BuiltinSpec { name: "max", min_args: 1, max_args: Some(1), func: collection::max },
    BuiltinSpec { name: "min", min_args: 1, max_args: Some(1), func: collection::min },
    BuiltinSpec { name: "all", min_args: 2, max_args: Some(2), func: collection::all },
    BuiltinSpec { name: "any", min_args: 2, max_args: Some(2), func: collection::any },
    BuiltinSpec { name: "groupBy", min_args: 2, max_args: Some(2), func: collection::group_by },
];

#[must_use]
pub fn lookup(name: &str) -> Option<u8> {
    REGISTRY.iter().position(|b| b.name == name).map(|i| i as u8)
}

#[must_use]
pub fn by_id(id: u8) -> &'static BuiltinSpec {
    &REGISTRY[id as usize]
}

/// Dispatches a `module.name(args)` call (spec §4.8's module-qualified
/// builtins). Unlike [`REGISTRY`] entries these never take a callback.
///
/// # Errors
/// Returns `Error::Name` for an unknown module or function.
pub fn call_module(module: &str, name: &str, args: &[Value]) -> Result<Value> {
    match module {
        "math" => math::call(name, args),
        "string" => string::call(name, args),
        "collection" => collection::call_module(name, args),
        "util" => util::call(name, args),
        _ => Err(Error::name(format!("unknown module `{module}`"), None)),
    }
}

pub(crate) fn arity_error(name: &str, got: usize) -> Error {
    Error::argument(format!("`{name}` called with {got} argument(s)"), None)
}

pub(crate) fn type_error(name: &str, expected: &str, got: &Value) -> Error {
    Error::runtime(format!("`{name}` expected {expected}, got {}", got.kind()), None)
}
