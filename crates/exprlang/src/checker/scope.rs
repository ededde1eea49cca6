//! A stack of name→type bindings used only during type checking.
//!
//! This is deliberately separate from [`crate::symtable::SymbolTable`]:
//! the symbol table assigns bytecode slot indices, this assigns inferred
//! types. They walk the same lexical structure but serve different passes.

use std::collections::HashMap;

use crate::types::TypeInfo;

#[derive(Debug, Default)]
pub struct TypeScope {
    frames: Vec<HashMap<String, TypeInfo>>,
}

impl TypeScope {
    #[must_use]
    pub fn new() -> Self {
        Self {
            frames: vec![HashMap::new()],
        }
    }

    pub fn push(&mut self) {
        self.frames.push(HashMap::new());
    }

    pub fn pop(&mut self) {
        self.frames.pop();
    }

    pub fn define(&mut self, name: &str, ty: TypeInfo) {
        self.frames
            .last_mut()
            .expect("type scope always has a root frame")
            .insert(name.to_string(), ty);
    }

    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<TypeInfo> {
        self.frames.iter().rev().find_map(|f| f.get(name).cloned())
    }
}
