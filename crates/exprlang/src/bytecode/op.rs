//! The opcode set and per-opcode stack-effect table (spec §4.6).
//!
//! Every instruction is a one-byte opcode followed by zero or more
//! little-endian operand bytes. `stack_effect` returns the net change in
//! operand-stack depth for opcodes whose effect doesn't depend on an
//! operand value; variable-effect opcodes (`Call`, `CallBuiltin`,
//! `BuildArray`, `BuildMap`, `MakeClosure`) are handled explicitly by
//! [`super::builder::CodeBuilder`].
//!
//! There is no `StoreLocal`/`StoreGlobal`: the language has no assignment,
//! so every local slot is bound once, by the VM, when a frame is pushed
//! (call arguments, closure frees, or a placeholder's implicit `#` slot).
//! `LoadEnv` looks a name up through the caller's [`crate::env::Environment`]
//! at run time rather than through a compile-time-fixed globals array,
//! because the environment's shape isn't known until a value is supplied.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Nop,

    LoadConst,
    LoadNil,
    LoadTrue,
    LoadFalse,

    LoadLocal,
    LoadFree,
    LoadEnv,
    LoadBuiltin,

    Pop,
    Dup,

    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Neg,

    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,

    Not,
    BitAnd,
    BitOr,
    BitXor,
    BitNot,
    Shl,
    Shr,

    In,
    Matches,
    Contains,
    StartsWith,
    EndsWith,

    Jump,
    JumpIfFalse,
    JumpIfTrue,
    JumpIfFalseOrPop,
    JumpIfTrueOrPop,

    BuildArray,
    BuildMap,
    Index,
    IndexOptional,
    GetMember,
    GetMemberOptional,
    Wildcard,

    MakeClosure,
    Call,
    CallBuiltin,
    CallModule,
    CallMethod,
    CallMethodOptional,

    NullCoalesce,

    Return,
}

impl Opcode {
    /// Width, in bytes, of this opcode's operand(s).
    #[must_use]
    pub const fn operand_width(self) -> usize {
        match self {
            Self::Nop
            | Self::LoadNil
            | Self::LoadTrue
            | Self::LoadFalse
            | Self::Pop
            | Self::Dup
            | Self::Add
            | Self::Sub
            | Self::Mul
            | Self::Div
            | Self::Mod
            | Self::Pow
            | Self::Neg
            | Self::Eq
            | Self::NotEq
            | Self::Lt
            | Self::LtEq
            | Self::Gt
            | Self::GtEq
            | Self::Not
            | Self::BitAnd
            | Self::BitOr
            | Self::BitXor
            | Self::BitNot
            | Self::Shl
            | Self::Shr
            | Self::In
            | Self::Matches
            | Self::Contains
            | Self::StartsWith
            | Self::EndsWith
            | Self::Index
            | Self::IndexOptional
            | Self::Wildcard
            | Self::NullCoalesce
            | Self::Return => 0,

            Self::LoadLocal | Self::LoadFree | Self::LoadBuiltin => 1,

            Self::LoadConst
            | Self::LoadEnv
            | Self::BuildArray
            | Self::BuildMap
            | Self::Jump
            | Self::JumpIfFalse
            | Self::JumpIfTrue
            | Self::JumpIfFalseOrPop
            | Self::JumpIfTrueOrPop
            | Self::GetMember
            | Self::GetMemberOptional => 2,

            // func_const_idx (u16) + free_count (u8)
            Self::MakeClosure => 3,
            // builtin_id (u8) + arg_count (u8)
            Self::CallBuiltin => 2,
            // module_const_idx (u16) + name_const_idx (u16) + arg_count (u8)
            Self::CallModule => 5,
            // arg_count (u8)
            Self::Call => 1,
            // method_name_const_idx (u16) + arg_count (u8)
            Self::CallMethod | Self::CallMethodOptional => 3,
        }
    }

    /// The fixed stack-depth delta for opcodes whose effect doesn't depend
    /// on an operand value.
    #[must_use]
    pub const fn stack_effect(self) -> Option<i16> {
        Some(match self {
            Self::Nop => 0,
            Self::LoadConst
            | Self::LoadNil
            | Self::LoadTrue
            | Self::LoadFalse
            | Self::LoadLocal
            | Self::LoadFree
            | Self::LoadEnv
            | Self::LoadBuiltin
            | Self::Dup => 1,
            Self::Pop => -1,
            Self::Add
            | Self::Sub
            | Self::Mul
            | Self::Div
            | Self::Mod
            | Self::Pow
            | Self::Eq
            | Self::NotEq
            | Self::Lt
            | Self::LtEq
            | Self::Gt
            | Self::GtEq
            | Self::BitAnd
            | Self::BitOr
            | Self::BitXor
            | Self::Shl
            | Self::Shr
            | Self::In
            | Self::Matches
            | Self::Contains
            | Self::StartsWith
            | Self::EndsWith
            | Self::Index
            | Self::IndexOptional
            | Self::NullCoalesce => -1,
            Self::Neg | Self::Not | Self::BitNot | Self::Wildcard => 0,
            Self::GetMember | Self::GetMemberOptional => 0,
            Self::Jump => 0,
            Self::JumpIfFalse | Self::JumpIfTrue => -1,
            Self::JumpIfFalseOrPop | Self::JumpIfTrueOrPop => 0,
            Self::Return => -1,
            // Variable-effect opcodes: computed by the builder from the operand.
            Self::BuildArray
            | Self::BuildMap
            | Self::MakeClosure
            | Self::Call
            | Self::CallBuiltin
            | Self::CallModule
            | Self::CallMethod
            | Self::CallMethodOptional => {
                return None;
            }
        })
    }
}

impl TryFrom<u8> for Opcode {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, u8> {
        const TABLE: &[Opcode] = &[
            Opcode::Nop,
            Opcode::LoadConst,
            Opcode::LoadNil,
            Opcode::LoadTrue,
            Opcode::LoadFalse,
            Opcode::LoadLocal,
            Opcode::LoadFree,
            Opcode::LoadEnv,
            Opcode::LoadBuiltin,
            Opcode::Pop,
            Opcode::Dup,
            Opcode::Add,
            Opcode::Sub,
            Opcode::Mul,
            Opcode::Div,
            Opcode::Mod,
            Opcode::Pow,
            Opcode::Neg,
            Opcode::Eq,
            Opcode::NotEq,
            Opcode::Lt,
            Opcode::LtEq,
            Opcode::Gt,
            Opcode::GtEq,
            Opcode::Not,
            Opcode::BitAnd,
            Opcode::BitOr,
            Opcode::BitXor,
            Opcode::BitNot,
            Opcode::Shl,
            Opcode::Shr,
            Opcode::In,
            Opcode::Matches,
            Opcode::Contains,
            Opcode::StartsWith,
            Opcode::EndsWith,
            Opcode::Jump,
            Opcode::JumpIfFalse,
            Opcode::JumpIfTrue,
            Opcode::JumpIfFalseOrPop,
            Opcode::JumpIfTrueOrPop,
            Opcode::BuildArray,
            Opcode::BuildMap,
            Opcode::Index,
            Opcode::IndexOptional,
            Opcode::GetMember,
            Opcode::GetMemberOptional,
            Opcode::Wildcard,
            Opcode::MakeClosure,
            Opcode::Call,
            Opcode::CallBuiltin,
            Opcode::CallModule,
            Opcode::CallMethod,
            Opcode::CallMethodOptional,
            Opcode::NullCoalesce,
            Opcode::Return,
        ];
        TABLE.get(byte as usize).copied().ok_or(byte)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_opcode_round_trips_through_its_discriminant() {
        for op in [
            Opcode::Nop,
            Opcode::Add,
            Opcode::Call,
            Opcode::MakeClosure,
            Opcode::Return,
        ] {
            assert_eq!(Opcode::try_from(op as u8), Ok(op));
        }
    }

    #[test]
    fn unknown_byte_is_rejected() {
        assert_eq!(Opcode::try_from(255u8), Err(255));
    }
}
