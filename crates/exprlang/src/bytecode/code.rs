//! The compiled-code product: raw bytecode, its constant pool, and a
//! position table for runtime diagnostics (spec §4.6).

use crate::lexer::Position;
use crate::value::Value;

/// An append-only, deduplicated constant pool addressed by 16-bit index.
#[derive(Debug, Default, Clone)]
pub struct ConstPool {
    values: Vec<Value>,
}

impl ConstPool {
    /// Inserts `value`, reusing an existing slot for a value that already
    /// compares equal (spec §4.6's dedup invariant).
    pub fn intern(&mut self, value: Value) -> u16 {
        if let Some(idx) = self.values.iter().position(|v| *v == value) {
            return u16::try_from(idx).expect("constant pool exceeds u16 range");
        }
        let idx = self.values.len();
        self.values.push(value);
        u16::try_from(idx).expect("constant pool exceeds u16 range; too many constants")
    }

    #[must_use]
    pub fn get(&self, idx: u16) -> &Value {
        &self.values[idx as usize]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Maps a bytecode offset to the source `Position` it was emitted from, so
/// the VM can attach a location to a runtime error.
#[derive(Debug, Clone, Copy)]
pub struct LocationEntry {
    pub offset: u32,
    pub position: Position,
}

/// One function or top-level expression's compiled output.
///
/// `builtins` and `allow_undefined_variables` are copied in from the
/// [`crate::options::Options`] used at `compile_with` time: both affect how
/// `LoadBuiltin`/`LoadEnv` behave at run time, so they travel with the
/// bytecode rather than needing `Options` passed again to [`crate::vm`].
#[derive(Debug, Clone)]
pub struct Program {
    bytecode: Vec<u8>,
    constants: ConstPool,
    locations: Vec<LocationEntry>,
    num_locals: u16,
    max_stack_depth: u16,
    builtins: Vec<Value>,
    allow_undefined_variables: bool,
}

impl Program {
    #[must_use]
    #[expect(clippy::too_many_arguments, reason = "built exclusively from CodeBuilder::build")]
    pub fn new(
        bytecode: Vec<u8>,
        constants: ConstPool,
        locations: Vec<LocationEntry>,
        num_locals: u16,
        max_stack_depth: u16,
        builtins: Vec<Value>,
        allow_undefined_variables: bool,
    ) -> Self {
        Self {
            bytecode,
            constants,
            locations,
            num_locals,
            max_stack_depth,
            builtins,
            allow_undefined_variables,
        }
    }

    #[must_use]
    pub fn bytecode(&self) -> &[u8] {
        &self.bytecode
    }

    #[must_use]
    pub fn constants(&self) -> &ConstPool {
        &self.constants
    }

    #[must_use]
    pub fn num_locals(&self) -> u16 {
        self.num_locals
    }

    #[must_use]
    pub fn max_stack_depth(&self) -> u16 {
        self.max_stack_depth
    }

    #[must_use]
    pub fn builtins(&self) -> &[Value] {
        &self.builtins
    }

    #[must_use]
    pub fn allow_undefined_variables(&self) -> bool {
        self.allow_undefined_variables
    }

    /// Finds the source position closest to (at or before) `ip`, for error
    /// reporting. Falls back to `Position::start()` for synthetic code.
    #[must_use]
    pub fn position_at(&self, ip: usize) -> Position {
        let ip = u32::try_from(ip).unwrap_or(u32::MAX);
        self.locations
            .iter()
            .rev()
            .find(|e| e.offset <= ip)
            .map_or_else(Position::start, |e| e.position)
    }
}
