//! The environment adapter (spec §4.9): how host-supplied variables reach
//! the checker (as types) and the VM (as values) without either depending
//! on a host's concrete record type.

use indexmap::IndexMap;

use crate::error::Result;
use crate::types::TypeInfo;
use crate::value::Value;

/// A source of named values, queried once by the checker (for types) and
/// repeatedly by the VM (for values) while running compiled bytecode.
///
/// Grounded on `evalexpr`'s `Context` trait: one adapter trait lets a host
/// back identifiers with a `HashMap`, a database row, a config struct, or
/// anything else, as long as it can answer "what type/value does this name
/// have" without the engine knowing its shape up front.
pub trait Environment {
    /// Looks up a variable's current value. Returns `None` for an unbound
    /// name; the VM turns that into `Error::Name` unless the caller asked
    /// for `allow_undefined_variables`, in which case it becomes `Value::Nil`.
    fn get(&self, name: &str) -> Option<Value>;

    /// The type of `name`, used by the checker before any value exists.
    /// The default impl infers it from [`Self::get`], which is sufficient
    /// for a static sample environment; a host with variables whose value
    /// isn't known until run time should override this.
    fn type_of(&self, name: &str) -> Option<TypeInfo> {
        self.get(name).map(|v| v.type_info())
    }
}

/// The simplest environment: a flat name → value map, supplied up front.
///
/// This is what [`crate::Options::env`] builds from a sample value, and
/// what most embedders reach for first.
#[derive(Debug, Clone, Default)]
pub struct HashMapEnvironment {
    values: IndexMap<String, Value>,
}

impl HashMapEnvironment {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }
}

impl Environment for HashMapEnvironment {
    fn get(&self, name: &str) -> Option<Value> {
        self.values.get(name).cloned()
    }
}

impl FromIterator<(String, Value)> for HashMapEnvironment {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// An environment with no variables at all — every identifier is either a
/// builtin or undefined. Useful for expressions that only touch literals
/// and registered builtins.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyEnvironment;

impl Environment for EmptyEnvironment {
    fn get(&self, _name: &str) -> Option<Value> {
        None
    }
}

pub(crate) fn lookup_or_nil(env: &dyn Environment, name: &str, allow_undefined: bool) -> Result<Value> {
    match env.get(name) {
        Some(v) => Ok(v),
        None if allow_undefined => Ok(Value::Nil),
        None => Err(crate::error::Error::name(format!("undefined variable `{name}`"), None)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_map_environment_resolves_inserted_names() {
        let env = HashMapEnvironment::new().with("x", 1i64);
        assert_eq!(env.get("x"), Some(Value::Int(1)));
        assert_eq!(env.get("y"), None);
    }

    #[test]
    fn type_of_defaults_to_inferring_from_get() {
        let env = HashMapEnvironment::new().with("x", 1i64);
        assert_eq!(env.type_of("x"), Some(TypeInfo::int()));
    }
}
