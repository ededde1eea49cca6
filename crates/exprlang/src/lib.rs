//! A compiled, embeddable evaluator for side-effect-free expressions over
//! host-provided data.
//!
//! A caller supplies an expression string and an [`Environment`] (a mapping
//! from names to values); [`eval`] returns a single [`Value`] or a
//! structured [`Error`]. The pipeline is lexer → parser → checker →
//! compiler → VM: [`compile`]/[`compile_with`] run everything up to and
//! including bytecode emission and can be cached across many [`run`]s of
//! the same expression against different environments.
#![expect(clippy::cast_possible_truncation, reason = "bytecode operand widths are checked at emission time")]
#![expect(clippy::cast_sign_loss, reason = "index arithmetic clamps negative results before casting")]
#![expect(clippy::cast_possible_wrap, reason = "wrapping int arithmetic is the documented runtime semantics")]

mod ast;
mod builtins;
mod bytecode;
mod checker;
mod compiler;
mod env;
mod error;
mod lexer;
mod options;
mod parser;
mod symtable;
mod types;
mod value;
mod vm;

pub use bytecode::Program;
pub use env::{EmptyEnvironment, Environment, HashMapEnvironment};
pub use error::{Diagnostic, Error, ErrorKind, Result};
pub use options::Options;
pub use types::{Field, Kind, TypeInfo};
pub use value::Value;
pub use vm::{Vm, VmPool};

/// Compiles `source` with default [`Options`].
///
/// Type-checking runs against an empty environment: literals, registered
/// builtins, and locals all check normally, but any other identifier is an
/// `Error::Type` unless `options.allow_undefined_variables()` is set, in
/// which case it's accepted as dynamically typed (`TypeInfo::interface()`)
/// and resolved — or rejected as `Error::Name` — by [`run`] instead. Use
/// [`eval_with`] when a concrete environment is known up front and its
/// variables should be statically checked too.
///
/// # Errors
/// `Error::Lex`/`Error::Parse`/`Error::Type` from the respective stage.
pub fn compile(source: &str) -> Result<Program> {
    compile_with(source, &Options::new())
}

/// Compiles `source` with caller-supplied [`Options`] (builtins, the
/// `allow_undefined_variables` flag). See [`compile`] for why no
/// environment is checked against here.
///
/// # Errors
/// `Error::Lex`/`Error::Parse`/`Error::Type` from the respective stage.
pub fn compile_with(source: &str, options: &Options) -> Result<Program> {
    let ast = parse_and_check(source, &EmptyEnvironment, options)?;
    compiler::compile(&ast, options)
}

/// Runs an already-compiled [`Program`] against `env`.
///
/// # Errors
/// `Error::Name`/`Error::Argument`/`Error::Runtime` raised while executing.
pub fn run(program: &Program, env: &dyn Environment) -> Result<Value> {
    vm::Vm::new().run(program, env)
}

/// Compiles and runs `source` in one step, with default [`Options`] and
/// `env` checked statically as well as supplying run-time values.
///
/// # Errors
/// Any error [`compile_with`] or [`run`] can raise.
pub fn eval(source: &str, env: &dyn Environment) -> Result<Value> {
    eval_with(source, env, &Options::new())
}

/// Compiles and runs `source` in one step, with caller-supplied [`Options`].
/// Unlike [`compile_with`], the checker here sees `env`, so host variable
/// types are checked statically rather than treated as dynamic.
///
/// # Errors
/// Any error the checker, compiler, or VM can raise.
pub fn eval_with(source: &str, env: &dyn Environment, options: &Options) -> Result<Value> {
    let ast = parse_and_check(source, env, options)?;
    let program = compiler::compile(&ast, options)?;
    run(&program, env)
}

fn parse_and_check(source: &str, env: &dyn Environment, options: &Options) -> Result<ast::Ast> {
    let parsed = parser::Parser::parse(source)?;
    checker::check(&parsed, env, options)?;
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eval_computes_a_literal_expression() {
        assert_eq!(eval("1 + 2 * 3", &EmptyEnvironment).unwrap(), Value::Int(7));
    }

    #[test]
    fn compile_then_run_matches_eval() {
        let program = compile("2 ** 10").unwrap();
        assert_eq!(run(&program, &EmptyEnvironment).unwrap(), Value::Int(1024));
    }

    #[test]
    fn compile_with_allow_undefined_accepts_unknown_identifiers_as_dynamic() {
        let options = Options::new().with_allow_undefined_variables(true);
        let program = compile_with("x + 1", &options).unwrap();
        let env = HashMapEnvironment::new().with("x", 41i64);
        assert_eq!(run(&program, &env).unwrap(), Value::Int(42));
    }

    #[test]
    fn compile_without_opting_in_rejects_unknown_identifiers() {
        assert!(matches!(compile("x + 1"), Err(Error::Type(_))));
    }
}
