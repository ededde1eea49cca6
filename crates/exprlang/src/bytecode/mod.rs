//! Bytecode representation and emission (spec §4.6).

mod builder;
mod code;
mod op;

pub use builder::{CodeBuilder, JumpLabel};
pub use code::{Program, ConstPool, LocationEntry};
pub use op::Opcode;
