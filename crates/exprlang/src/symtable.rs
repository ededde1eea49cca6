//! Scope resolution for identifiers (spec §4.5).
//!
//! Resolution walks outward from the innermost `Local` scope through
//! enclosing `Function` scopes, promoting each captured name to a `Free`
//! slot on the way so the compiler knows exactly which closure cells a
//! lambda needs, then falls back to `Builtin` and finally `Global`.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Global,
    Local,
    Builtin,
    Free,
    Function,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub scope: ScopeKind,
    pub index: u16,
}

#[derive(Debug, Default)]
struct Store {
    symbols: std::collections::HashMap<String, Symbol>,
    num_definitions: u16,
}

/// One lexical level. The root table has `outer: None` and scope `Global`;
/// every lambda pushes a `Function` table.
#[derive(Debug)]
pub struct SymbolTable {
    outer: Option<Box<SymbolTable>>,
    store: Store,
    pub free_symbols: Vec<Symbol>,
    kind: ScopeKind,
}

impl SymbolTable {
    #[must_use]
    pub fn new_global() -> Self {
        Self {
            outer: None,
            store: Store::default(),
            free_symbols: Vec::new(),
            kind: ScopeKind::Global,
        }
    }

    #[must_use]
    pub fn new_enclosed(outer: Self) -> Self {
        Self {
            outer: Some(Box::new(outer)),
            store: Store::default(),
            free_symbols: Vec::new(),
            kind: ScopeKind::Function,
        }
    }

    /// Pops back to the outer table, e.g. after compiling a lambda body.
    #[must_use]
    pub fn into_outer(self) -> Option<Self> {
        self.outer.map(|b| *b)
    }

    pub fn define(&mut self, name: &str) -> Symbol {
        let scope = if self.outer.is_none() {
            ScopeKind::Global
        } else {
            ScopeKind::Local
        };
        let symbol = Symbol {
            name: name.to_string(),
            scope,
            index: self.store.num_definitions,
        };
        self.store.num_definitions += 1;
        self.store.symbols.insert(name.to_string(), symbol.clone());
        symbol
    }

    pub fn define_builtin(&mut self, index: u16, name: &str) -> Symbol {
        let symbol = Symbol {
            name: name.to_string(),
            scope: ScopeKind::Builtin,
            index,
        };
        self.store.symbols.insert(name.to_string(), symbol.clone());
        symbol
    }

    fn define_free(&mut self, original: Symbol) -> Symbol {
        self.free_symbols.push(original.clone());
        let symbol = Symbol {
            name: original.name.clone(),
            scope: ScopeKind::Free,
            index: (self.free_symbols.len() - 1) as u16,
        };
        self.store.symbols.insert(original.name, symbol.clone());
        symbol
    }

    /// Resolves `name`, promoting it to a `Free` variable in every
    /// intermediate function scope between its definition and this one.
    #[must_use]
    pub fn resolve(&mut self, name: &str) -> Option<Symbol> {
        if let Some(sym) = self.store.symbols.get(name) {
            return Some(sym.clone());
        }
        let outer = self.outer.take()?;
        let mut outer = outer;
        let resolved = outer.resolve(name);
        self.outer = Some(Box::new(outer));

        match resolved {
            Some(sym) if matches!(sym.scope, ScopeKind::Global | ScopeKind::Builtin) => Some(sym),
            Some(sym) => Some(self.define_free(sym)),
            None => None,
        }
    }

    #[must_use]
    pub fn num_definitions(&self) -> u16 {
        self.store.num_definitions
    }

    #[must_use]
    pub fn kind(&self) -> ScopeKind {
        self.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_global_from_nested_scope() {
        let mut global = SymbolTable::new_global();
        global.define("x");
        let mut local = SymbolTable::new_enclosed(global);
        let sym = local.resolve("x").expect("x should resolve");
        assert_eq!(sym.scope, ScopeKind::Global);
    }

    #[test]
    fn promotes_outer_local_to_free_variable() {
        let mut global = SymbolTable::new_global();
        let mut outer = SymbolTable::new_enclosed_for_test(&mut global);
        outer.define("y");
        let mut inner = SymbolTable::new_enclosed(outer);
        let sym = inner.resolve("y").expect("y should resolve");
        assert_eq!(sym.scope, ScopeKind::Free);
        assert_eq!(inner.free_symbols.len(), 1);
    }

    impl SymbolTable {
        // helper used only by the test above to avoid moving `global` twice
        fn new_enclosed_for_test(global: &mut SymbolTable) -> Self {
            let taken = std::mem::replace(global, SymbolTable::new_global());
            Self::new_enclosed(taken)
        }
    }
}
