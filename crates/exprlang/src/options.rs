//! The compile-time configuration builder (spec §4.9, §6).
//!
//! Grounded on `navicore-cem3`'s `CompilerConfig`: a plain builder struct
//! passed by reference to `compile_with`/`eval_with`, rather than thread-
//! local or global state, so one process can run several configurations
//! concurrently (spec §5).

use std::collections::HashMap;

use crate::types::TypeInfo;
use crate::value::Value;

/// Compilation and evaluation options (spec §6's `compile_with`/`eval_with`).
#[derive(Debug, Clone, Default)]
pub struct Options {
    builtins: HashMap<String, Value>,
    allow_undefined_variables: bool,
    enable_optimization: bool,
    enable_cache: bool,
}

impl Options {
    #[must_use]
    pub fn new() -> Self {
        Self {
            builtins: HashMap::new(),
            allow_undefined_variables: false,
            enable_optimization: true,
            enable_cache: false,
        }
    }

    /// Registers a named constant or function, resolved at compile time
    /// through `ScopeKind::Builtin` and at run time via `LoadBuiltin`.
    #[must_use]
    pub fn with_builtin(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.builtins.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_allow_undefined_variables(mut self, allow: bool) -> Self {
        self.allow_undefined_variables = allow;
        self
    }

    #[must_use]
    pub fn with_optimization(mut self, enabled: bool) -> Self {
        self.enable_optimization = enabled;
        self
    }

    #[must_use]
    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.enable_cache = enabled;
        self
    }

    #[must_use]
    pub fn allow_undefined_variables(&self) -> bool {
        self.allow_undefined_variables
    }

    #[must_use]
    pub fn optimization_enabled(&self) -> bool {
        self.enable_optimization
    }

    #[must_use]
    pub fn cache_enabled(&self) -> bool {
        self.enable_cache
    }

    #[must_use]
    pub fn builtin_names(&self) -> Vec<&str> {
        self.builtins.keys().map(String::as_str).collect()
    }

    #[must_use]
    pub fn builtin_type(&self, name: &str) -> Option<TypeInfo> {
        self.builtins.get(name).map(Value::type_info)
    }

    #[must_use]
    pub fn builtin_value(&self, name: &str) -> Option<&Value> {
        self.builtins.get(name)
    }

    /// Builtin values in insertion-independent, stable order, for the
    /// compiler's `ScopeKind::Builtin` index assignment and the VM's
    /// parallel `builtins: Vec<Value>` array.
    #[must_use]
    pub fn builtins_ordered(&self) -> Vec<(String, Value)> {
        let mut names: Vec<&String> = self.builtins.keys().collect();
        names.sort();
        names
            .into_iter()
            .map(|n| (n.clone(), self.builtins[n].clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optimization_defaults_to_enabled() {
        assert!(Options::new().optimization_enabled());
    }

    #[test]
    fn with_builtin_registers_a_resolvable_name() {
        let options = Options::new().with_builtin("PI", 3.14);
        assert_eq!(options.builtin_type("PI"), Some(TypeInfo::float()));
        assert_eq!(options.builtin_type("missing"), None);
    }

    #[test]
    fn builtins_ordered_is_deterministic_across_calls() {
        let options = Options::new().with_builtin("b", 1i64).with_builtin("a", 2i64);
        let first = options.builtins_ordered();
        let second = options.builtins_ordered();
        assert_eq!(first, second);
        assert_eq!(first[0].0, "a");
    }
}
