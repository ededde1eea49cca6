//! Builder for emitting bytecode during compilation.
//!
//! Handles encoding opcodes and operands, patching forward jumps, and
//! tracking source locations and stack depth as instructions are emitted.

use super::code::{Program, ConstPool, LocationEntry};
use super::op::Opcode;
use crate::lexer::Position;
use crate::value::Value;

#[derive(Debug, Default)]
pub struct CodeBuilder {
    bytecode: Vec<u8>,
    constants: ConstPool,
    locations: Vec<LocationEntry>,
    current_position: Option<Position>,
    current_stack_depth: u16,
    max_stack_depth: u16,
}

impl CodeBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_position(&mut self, position: Position) {
        self.current_position = Some(position);
    }

    fn start_instruction(&mut self) {
        if let Some(position) = self.current_position {
            let offset = u32::try_from(self.bytecode.len()).expect("bytecode length exceeds u32");
            self.locations.push(LocationEntry { offset, position });
        }
    }

    pub fn emit(&mut self, op: Opcode) {
        self.start_instruction();
        self.bytecode.push(op as u8);
        if let Some(effect) = op.stack_effect() {
            self.adjust_stack(effect);
        }
    }

    pub fn emit_u8(&mut self, op: Opcode, operand: u8) {
        self.start_instruction();
        self.bytecode.push(op as u8);
        self.bytecode.push(operand);
        self.apply_variable_effect(op, i16::from(operand));
    }

    pub fn emit_u16(&mut self, op: Opcode, operand: u16) {
        self.start_instruction();
        self.bytecode.push(op as u8);
        self.bytecode.extend_from_slice(&operand.to_le_bytes());
        self.apply_variable_effect(op, i16::try_from(operand).unwrap_or(i16::MAX));
    }

    /// `MakeClosure`: func_id (u16) + free_count (u8). The `free_count`
    /// free values must already be pushed (in order) by the caller; this
    /// instruction pops them and pushes one closure.
    pub fn emit_make_closure(&mut self, func_id: u16, free_count: u8) {
        self.start_instruction();
        self.bytecode.push(Opcode::MakeClosure as u8);
        self.bytecode.extend_from_slice(&func_id.to_le_bytes());
        self.bytecode.push(free_count);
        self.adjust_stack(1 - i16::from(free_count));
    }

    /// `CallBuiltin`: builtin_id (u8) + arg_count (u8). No callable value on
    /// the stack — the id addresses the static registry directly.
    pub fn emit_call_builtin(&mut self, builtin_id: u8, arg_count: u8) {
        self.start_instruction();
        self.bytecode.push(Opcode::CallBuiltin as u8);
        self.bytecode.push(builtin_id);
        self.bytecode.push(arg_count);
        self.adjust_stack(1 - i16::from(arg_count));
    }

    /// `CallModule`: module name const (u16) + function name const (u16) +
    /// arg_count (u8).
    pub fn emit_call_module(&mut self, module_const: u16, name_const: u16, arg_count: u8) {
        self.start_instruction();
        self.bytecode.push(Opcode::CallModule as u8);
        self.bytecode.extend_from_slice(&module_const.to_le_bytes());
        self.bytecode.extend_from_slice(&name_const.to_le_bytes());
        self.bytecode.push(arg_count);
        self.adjust_stack(1 - i16::from(arg_count));
    }

    /// `CallMethod`/`CallMethodOptional`: method name const (u16) +
    /// arg_count (u8). Pops the receiver plus `arg_count` arguments, pushes
    /// one result (spec §4.8's type-method registry, dispatched by the
    /// receiver's *runtime* kind — see `DESIGN.md`).
    pub fn emit_call_method(&mut self, name_const: u16, arg_count: u8, optional: bool) {
        self.start_instruction();
        let op = if optional { Opcode::CallMethodOptional } else { Opcode::CallMethod };
        self.bytecode.push(op as u8);
        self.bytecode.extend_from_slice(&name_const.to_le_bytes());
        self.bytecode.push(arg_count);
        self.adjust_stack(-i16::from(arg_count));
    }

    fn apply_variable_effect(&mut self, op: Opcode, operand: i16) {
        let effect = match op {
            // BuildArray pops `operand` elems, pushes one array.
            Opcode::BuildArray => 1 - operand,
            // BuildMap pops 2*operand (key/value pairs), pushes one map.
            Opcode::BuildMap => 1 - 2 * operand,
            // Call pops the callee plus `operand` args, pushes one result.
            Opcode::Call => -operand,
            _ => op.stack_effect().unwrap_or(0),
        };
        self.adjust_stack(effect);
    }

    /// Returns a label for a forward jump; call [`Self::patch_jump`] once
    /// the target is known.
    #[must_use]
    pub fn emit_jump(&mut self, op: Opcode) -> JumpLabel {
        self.start_instruction();
        let label = JumpLabel(self.bytecode.len());
        self.bytecode.push(op as u8);
        self.bytecode.extend_from_slice(&0i16.to_le_bytes());
        match op {
            Opcode::JumpIfFalseOrPop | Opcode::JumpIfTrueOrPop => {}
            _ => {
                if let Some(effect) = op.stack_effect() {
                    self.adjust_stack(effect);
                }
            }
        }
        label
    }

    /// # Panics
    /// Panics if the jump distance exceeds `i16`'s range — the expression
    /// compiled to more bytecode than this format can address.
    pub fn patch_jump(&mut self, label: JumpLabel) {
        let target = self.bytecode.len();
        let offset = i16::try_from(target as i64 - label.0 as i64 - 3)
            .expect("jump offset exceeds i16 range; expression too large");
        let bytes = offset.to_le_bytes();
        self.bytecode[label.0 + 1] = bytes[0];
        self.bytecode[label.0 + 2] = bytes[1];
    }

    /// Emits a backward jump to an already-known offset (loop bodies never
    /// occur in this language, but pipeline lowering reuses this for
    /// shared epilogue blocks).
    pub fn emit_jump_to(&mut self, op: Opcode, target: usize) {
        self.start_instruction();
        let current = self.bytecode.len();
        let offset =
            i16::try_from(target as i64 - (current as i64 + 3)).expect("jump offset exceeds i16 range");
        self.bytecode.push(op as u8);
        self.bytecode.extend_from_slice(&offset.to_le_bytes());
        if let Some(effect) = op.stack_effect() {
            self.adjust_stack(effect);
        }
    }

    #[must_use]
    pub fn current_offset(&self) -> usize {
        self.bytecode.len()
    }

    #[must_use]
    pub fn add_const(&mut self, value: Value) -> u16 {
        self.constants.intern(value)
    }

    #[must_use]
    pub fn stack_depth(&self) -> u16 {
        self.current_stack_depth
    }

    pub fn adjust_stack_depth(&mut self, delta: i16) {
        self.adjust_stack(delta);
    }

    fn adjust_stack(&mut self, delta: i16) {
        let new_depth = i32::from(self.current_stack_depth) + i32::from(delta);
        debug_assert!(new_depth >= 0, "stack depth went negative: {new_depth}");
        self.current_stack_depth = u16::try_from(new_depth.max(0)).unwrap_or(u16::MAX);
        self.max_stack_depth = self.max_stack_depth.max(self.current_stack_depth);
    }

    #[must_use]
    pub fn build(self, num_locals: u16, builtins: Vec<Value>, allow_undefined_variables: bool) -> Program {
        Program::new(
            self.bytecode,
            self.constants,
            self.locations,
            num_locals,
            self.max_stack_depth,
            builtins,
            allow_undefined_variables,
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct JumpLabel(usize);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_basic_sequence() {
        let mut b = CodeBuilder::new();
        b.emit(Opcode::LoadNil);
        b.emit(Opcode::Pop);
        let code = b.build(0, Vec::new(), false);
        assert_eq!(code.bytecode(), &[Opcode::LoadNil as u8, Opcode::Pop as u8]);
    }

    #[test]
    fn forward_jump_patches_to_correct_offset() {
        let mut b = CodeBuilder::new();
        let label = b.emit_jump(Opcode::Jump);
        b.emit(Opcode::LoadNil);
        b.patch_jump(label);
        let code = b.build(0, Vec::new(), false);
        assert_eq!(code.bytecode()[1..3], (1i16).to_le_bytes());
    }

    #[test]
    fn const_pool_dedups_equal_values() {
        let mut b = CodeBuilder::new();
        let a = b.add_const(Value::Int(7));
        let c = b.add_const(Value::Int(7));
        assert_eq!(a, c);
    }
}
