//! AST → bytecode compilation (spec §4.6).
//!
//! One [`CodeBuilder`]/[`SymbolTable`] pair per function-like scope (the
//! top level, each lambda body, each compiled placeholder). Nested scopes
//! are compiled depth-first: entering a lambda pushes a fresh builder and
//! an enclosed symbol table, compiling its body writes into that builder,
//! and leaving it builds a [`crate::bytecode::Program`] that's interned as
//! a [`Value::Proto`] constant back in the enclosing scope, right before
//! the `MakeClosure` instruction that pairs it with captured free values.

use std::mem;
use std::rc::Rc;

use crate::ast::{Ast, Expr, ExprKind, InfixOp, MapEntry, Param, PrefixOp};
use crate::builtins;
use crate::bytecode::{CodeBuilder, Opcode, Program};
use crate::error::Result;
use crate::options::Options;
use crate::symtable::{ScopeKind, Symbol, SymbolTable};
use crate::value::{FastOp, FunctionProto, PlaceholderBody, PlaceholderExpr, Value};

/// Compiles a checked AST into a runnable [`Program`].
///
/// # Errors
/// Never fails today (the checker rejects anything the compiler can't
/// lower); the `Result` is kept so a future constant-folding pass can
/// report overflow or similar without changing the public signature.
pub fn compile(ast: &Ast, options: &Options) -> Result<Program> {
    let mut compiler = Compiler::new(options);
    compiler.compile_expr(&ast.body);
    compiler.current_builder().emit(Opcode::Return);
    let num_locals = compiler.symtable.num_definitions();
    let builder = compiler.builders.pop().expect("root frame is always present");
    Ok(builder.build(num_locals, compiler.builtin_values(), options.allow_undefined_variables()))
}

struct Compiler<'a> {
    options: &'a Options,
    builders: Vec<CodeBuilder>,
    symtable: SymbolTable,
}

impl<'a> Compiler<'a> {
    fn new(options: &'a Options) -> Self {
        let mut global = SymbolTable::new_global();
        for (index, (name, _)) in options.builtins_ordered().into_iter().enumerate() {
            global.define_builtin(index as u16, &name);
        }
        Self {
            options,
            builders: vec![CodeBuilder::new()],
            symtable: global,
        }
    }

    fn current_builder(&mut self) -> &mut CodeBuilder {
        self.builders.last_mut().expect("a builder is always on the stack while compiling")
    }

    /// The registered builtin values in `ScopeKind::Builtin` index order,
    /// copied into every nested [`Program`] so `LoadBuiltin` never needs
    /// `Options` again at run time.
    fn builtin_values(&self) -> Vec<Value> {
        self.options.builtins_ordered().into_iter().map(|(_, v)| v).collect()
    }

    fn push_frame(&mut self) {
        self.builders.push(CodeBuilder::new());
        let outer = mem::replace(&mut self.symtable, SymbolTable::new_global());
        self.symtable = SymbolTable::new_enclosed(outer);
    }

    /// Emits the frame's implicit `Return`, builds its `Program`, and
    /// restores the enclosing scope. Returns the built code, its local
    /// count, and the free variables it captured (in capture order).
    fn pop_frame(&mut self) -> (CodeBuilder, u16, Vec<Symbol>) {
        self.current_builder().emit(Opcode::Return);
        let num_locals = self.symtable.num_definitions();
        let inner = mem::replace(&mut self.symtable, SymbolTable::new_global());
        let free_symbols = inner.free_symbols.clone();
        self.symtable = inner.into_outer().expect("pop_frame always follows a matching push_frame");
        let builder = self.builders.pop().expect("pop_frame always follows a matching push_frame");
        (builder, num_locals, free_symbols)
    }

    fn load_symbol(&mut self, sym: &Symbol) {
        match sym.scope {
            ScopeKind::Local => self.current_builder().emit_u8(Opcode::LoadLocal, sym.index as u8),
            ScopeKind::Free => self.current_builder().emit_u8(Opcode::LoadFree, sym.index as u8),
            ScopeKind::Builtin => self.current_builder().emit_u8(Opcode::LoadBuiltin, sym.index as u8),
            // Neither produced by this compiler: nothing defines a Global
            // symbol (environment lookups bypass the symbol table via
            // LoadEnv) and named-closure self-reference isn't supported.
            ScopeKind::Global | ScopeKind::Function => {
                let idx = self.current_builder().add_const(Value::string(sym.name.clone()));
                self.current_builder().emit_u16(Opcode::LoadEnv, idx);
            }
        }
    }

    fn compile_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::NilLiteral => self.current_builder().emit(Opcode::LoadNil),
            ExprKind::BoolLiteral(true) => self.current_builder().emit(Opcode::LoadTrue),
            ExprKind::BoolLiteral(false) => self.current_builder().emit(Opcode::LoadFalse),
            ExprKind::IntLiteral(i) => self.load_const(Value::Int(*i)),
            ExprKind::FloatLiteral(f) => self.load_const(Value::Float(*f)),
            ExprKind::StringLiteral(s) => self.load_const(Value::string(s.clone())),
            ExprKind::Placeholder => self.current_builder().emit_u8(Opcode::LoadLocal, 0),
            ExprKind::Identifier(name) => self.compile_identifier(name),
            ExprKind::ArrayLiteral(elems) => self.compile_array(elems),
            ExprKind::MapLiteral(entries) => self.compile_map(entries),
            ExprKind::Prefix { op, right } => self.compile_prefix(*op, right),
            ExprKind::Infix { op, left, right } => self.compile_infix(*op, left, right),
            ExprKind::Conditional {
                condition,
                consequence,
                alternative,
            } => self.compile_conditional(condition, consequence, alternative),
            ExprKind::Index { object, index, optional } => self.compile_index(object, index, *optional),
            ExprKind::Member { object, property, optional } => self.compile_member(object, property, *optional),
            ExprKind::Wildcard { object } => {
                self.compile_expr(object);
                self.current_builder().emit(Opcode::Wildcard);
            }
            ExprKind::Call { callee, args } => match &callee.kind {
                ExprKind::Member { object, property, optional } => {
                    self.compile_method_call(object, property, *optional, args);
                }
                _ => self.compile_call(callee, args),
            },
            ExprKind::Builtin { name, args } => self.compile_builtin_call(name, args, None),
            ExprKind::ModuleCall { module, name, args } => self.compile_module_call(module, name, args),
            ExprKind::Lambda { params, body } => self.compile_lambda(params, body),
            ExprKind::Pipe { source, stage } => self.compile_pipe(source, stage),
            ExprKind::NullCoalesce { left, right } => {
                self.compile_expr(left);
                self.compile_expr(right);
                self.current_builder().emit(Opcode::NullCoalesce);
            }
        }
    }

    fn load_const(&mut self, value: Value) {
        let idx = self.current_builder().add_const(value);
        self.current_builder().emit_u16(Opcode::LoadConst, idx);
    }

    fn compile_identifier(&mut self, name: &str) {
        if let Some(sym) = self.symtable.resolve(name) {
            self.load_symbol(&sym);
        } else {
            let idx = self.current_builder().add_const(Value::string(name));
            self.current_builder().emit_u16(Opcode::LoadEnv, idx);
        }
    }

    fn compile_array(&mut self, elems: &[Expr]) {
        for e in elems {
            self.compile_expr(e);
        }
        let n = u16::try_from(elems.len()).expect("array literal exceeds u16 element count");
        self.current_builder().emit_u16(Opcode::BuildArray, n);
    }

    fn compile_map(&mut self, entries: &[MapEntry]) {
        for e in entries {
            self.compile_expr(&e.key);
            self.compile_expr(&e.value);
        }
        let n = u16::try_from(entries.len()).expect("map literal exceeds u16 entry count");
        self.current_builder().emit_u16(Opcode::BuildMap, n);
    }

    fn compile_prefix(&mut self, op: PrefixOp, right: &Expr) {
        self.compile_expr(right);
        self.current_builder().emit(match op {
            PrefixOp::Neg => Opcode::Neg,
            PrefixOp::Not => Opcode::Not,
            PrefixOp::BitNot => Opcode::BitNot,
        });
    }

    fn compile_infix(&mut self, op: InfixOp, left: &Expr, right: &Expr) {
        if self.options.optimization_enabled() {
            if let Some(folded) = fold_arithmetic(op, left, right) {
                self.load_const(folded);
                return;
            }
        }
        match op {
            InfixOp::And => self.compile_short_circuit(left, right, Opcode::JumpIfFalseOrPop),
            InfixOp::Or => self.compile_short_circuit(left, right, Opcode::JumpIfTrueOrPop),
            _ => {
                self.compile_expr(left);
                self.compile_expr(right);
                self.current_builder().emit(infix_opcode(op));
            }
        }
    }

    fn compile_short_circuit(&mut self, left: &Expr, right: &Expr, jump_op: Opcode) {
        self.compile_expr(left);
        let label = self.current_builder().emit_jump(jump_op);
        self.current_builder().emit(Opcode::Pop);
        self.compile_expr(right);
        self.current_builder().patch_jump(label);
    }

    fn compile_conditional(&mut self, condition: &Expr, consequence: &Expr, alternative: &Expr) {
        self.compile_expr(condition);
        let else_label = self.current_builder().emit_jump(Opcode::JumpIfFalse);
        self.compile_expr(consequence);
        let end_label = self.current_builder().emit_jump(Opcode::Jump);
        self.current_builder().patch_jump(else_label);
        self.compile_expr(alternative);
        self.current_builder().patch_jump(end_label);
    }

    fn compile_index(&mut self, object: &Expr, index: &Expr, optional: bool) {
        self.compile_expr(object);
        self.compile_expr(index);
        self.current_builder().emit(if optional { Opcode::IndexOptional } else { Opcode::Index });
    }

    fn compile_member(&mut self, object: &Expr, property: &str, optional: bool) {
        self.compile_expr(object);
        let idx = self.current_builder().add_const(Value::string(property));
        self.current_builder()
            .emit_u16(if optional { Opcode::GetMemberOptional } else { Opcode::GetMember }, idx);
    }

    fn compile_call(&mut self, callee: &Expr, args: &[Expr]) {
        self.compile_expr(callee);
        for a in args {
            self.compile_expr(a);
        }
        let n = u8::try_from(args.len()).expect("call exceeds u8 argument count");
        self.current_builder().emit_u8(Opcode::Call, n);
    }

    /// `object.property(args)`: dispatched at run time by the receiver's
    /// kind rather than statically, since a `Map` field can itself hold a
    /// callable value while a primitive receiver routes through the
    /// type-method registry (spec §4.8) — see `CallMethod` in the VM.
    fn compile_method_call(&mut self, object: &Expr, property: &str, optional: bool, args: &[Expr]) {
        self.compile_expr(object);
        for a in args {
            self.compile_expr(a);
        }
        let idx = self.current_builder().add_const(Value::string(property));
        let n = u8::try_from(args.len()).expect("method call exceeds u8 argument count");
        self.current_builder().emit_call_method(idx, n, optional);
    }

    fn compile_builtin_call(&mut self, name: &str, args: &[Expr], implicit_source: Option<&Expr>) {
        let mut total = 0u8;
        if let Some(src) = implicit_source {
            self.compile_expr(src);
            total += 1;
        }
        for a in args {
            self.compile_callable_arg(a);
            total += 1;
        }
        let id = builtins::lookup(name).expect("builtin name was validated during type checking");
        self.current_builder().emit_call_builtin(id, total);
    }

    fn compile_module_call(&mut self, module: &str, name: &str, args: &[Expr]) {
        let module_idx = self.current_builder().add_const(Value::string(module));
        let name_idx = self.current_builder().add_const(Value::string(name));
        for a in args {
            self.compile_expr(a);
        }
        let n = u8::try_from(args.len()).expect("module call exceeds u8 argument count");
        self.current_builder().emit_call_module(module_idx, name_idx, n);
    }

    /// Compiles an argument that may stand in for a callback: a `Lambda`
    /// becomes a closure, anything containing a bare `#` becomes a
    /// [`Value::Placeholder`] constant, everything else compiles normally.
    fn compile_callable_arg(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Lambda { params, body } => self.compile_lambda(params, body),
            _ if contains_placeholder(expr) => self.compile_placeholder_constant(expr),
            _ => self.compile_expr(expr),
        }
    }

    fn compile_lambda(&mut self, params: &[Param], body: &Expr) {
        self.push_frame();
        let param_names: Vec<String> = params
            .iter()
            .map(|p| {
                self.symtable.define(&p.name);
                p.name.clone()
            })
            .collect();
        self.compile_expr(body);
        let (builder, num_locals, free_symbols) = self.pop_frame();
        let code = Rc::new(builder.build(num_locals, self.builtin_values(), self.options.allow_undefined_variables()));
        let proto = Rc::new(FunctionProto {
            name: None,
            param_names,
            num_locals,
            code,
        });
        for sym in &free_symbols {
            self.load_symbol(sym);
        }
        let const_idx = self.current_builder().add_const(Value::Proto(proto));
        let free_count = u8::try_from(free_symbols.len()).expect("closure exceeds u8 free-variable count");
        self.current_builder().emit_make_closure(const_idx, free_count);
    }

    fn compile_placeholder_constant(&mut self, expr: &Expr) {
        if let Some(body) = try_fast_placeholder(expr) {
            self.load_const(Value::Placeholder(Rc::new(PlaceholderExpr { body })));
            return;
        }
        self.push_frame();
        self.symtable.define("#");
        self.compile_expr(expr);
        let (builder, num_locals, _free) = self.pop_frame();
        let code = Rc::new(builder.build(num_locals, self.builtin_values(), self.options.allow_undefined_variables()));
        self.load_const(Value::Placeholder(Rc::new(PlaceholderExpr {
            body: PlaceholderBody::Compiled { code },
        })));
    }

    fn compile_pipe(&mut self, source: &Expr, stage: &Expr) {
        match &stage.kind {
            ExprKind::Builtin { name, args } => self.compile_builtin_call(name, args, Some(source)),
            _ => {
                self.compile_expr(source);
                self.compile_callable_arg(stage);
                let id = builtins::lookup("map").expect("`map` is always registered");
                self.current_builder().emit_call_builtin(id, 2);
            }
        }
    }
}

fn infix_opcode(op: InfixOp) -> Opcode {
    match op {
        InfixOp::Add => Opcode::Add,
        InfixOp::Sub => Opcode::Sub,
        InfixOp::Mul => Opcode::Mul,
        InfixOp::Div => Opcode::Div,
        InfixOp::Mod => Opcode::Mod,
        InfixOp::Pow => Opcode::Pow,
        InfixOp::Eq => Opcode::Eq,
        InfixOp::NotEq => Opcode::NotEq,
        InfixOp::Lt => Opcode::Lt,
        InfixOp::LtEq => Opcode::LtEq,
        InfixOp::Gt => Opcode::Gt,
        InfixOp::GtEq => Opcode::GtEq,
        InfixOp::BitAnd => Opcode::BitAnd,
        InfixOp::BitOr => Opcode::BitOr,
        InfixOp::BitXor => Opcode::BitXor,
        InfixOp::Shl => Opcode::Shl,
        InfixOp::Shr => Opcode::Shr,
        InfixOp::In => Opcode::In,
        InfixOp::Matches => Opcode::Matches,
        InfixOp::Contains => Opcode::Contains,
        InfixOp::StartsWith => Opcode::StartsWith,
        InfixOp::EndsWith => Opcode::EndsWith,
        InfixOp::And | InfixOp::Or => unreachable!("short-circuit ops are handled in compile_infix"),
    }
}

fn literal_value(expr: &Expr) -> Option<Value> {
    Some(match &expr.kind {
        ExprKind::NilLiteral => Value::Nil,
        ExprKind::BoolLiteral(b) => Value::Bool(*b),
        ExprKind::IntLiteral(i) => Value::Int(*i),
        ExprKind::FloatLiteral(f) => Value::Float(*f),
        ExprKind::StringLiteral(s) => Value::string(s.clone()),
        _ => return None,
    })
}

/// Folds `left op right` into a single constant when both sides are
/// literals (spec §4.6's constant folding), so e.g. `price * 1.08` inside
/// a loop body only multiplies once per compile rather than per call.
fn fold_arithmetic(op: InfixOp, left: &Expr, right: &Expr) -> Option<Value> {
    if !matches!(
        op,
        InfixOp::Add | InfixOp::Sub | InfixOp::Mul | InfixOp::Div | InfixOp::Mod | InfixOp::Pow
    ) {
        return None;
    }
    let (lv, rv) = (literal_value(left)?, literal_value(right)?);
    if let (Value::Int(a), Value::Int(b)) = (&lv, &rv) {
        let (a, b) = (*a, *b);
        return match op {
            InfixOp::Add => Some(Value::Int(a.wrapping_add(b))),
            InfixOp::Sub => Some(Value::Int(a.wrapping_sub(b))),
            InfixOp::Mul => Some(Value::Int(a.wrapping_mul(b))),
            InfixOp::Div if b != 0 => Some(Value::Int(a / b)),
            InfixOp::Mod if b != 0 => Some(Value::Int(a % b)),
            InfixOp::Pow if b >= 0 && b <= u32::MAX as i64 => a.checked_pow(b as u32).map(Value::Int),
            _ => None,
        };
    }
    let (a, b) = (lv.as_f64()?, rv.as_f64()?);
    match op {
        InfixOp::Add => Some(Value::Float(a + b)),
        InfixOp::Sub => Some(Value::Float(a - b)),
        InfixOp::Mul => Some(Value::Float(a * b)),
        InfixOp::Div => Some(Value::Float(a / b)),
        InfixOp::Mod => Some(Value::Float(a % b)),
        InfixOp::Pow => Some(Value::Float(a.powf(b))),
        _ => None,
    }
}

fn try_fast_placeholder(expr: &Expr) -> Option<PlaceholderBody> {
    let ExprKind::Infix { op, left, right } = &expr.kind else {
        return None;
    };
    if !matches!(left.kind, ExprKind::Placeholder) {
        return None;
    }
    let fast_op = match op {
        InfixOp::Eq => FastOp::Eq,
        InfixOp::NotEq => FastOp::NotEq,
        InfixOp::Lt => FastOp::Lt,
        InfixOp::LtEq => FastOp::LtEq,
        InfixOp::Gt => FastOp::Gt,
        InfixOp::GtEq => FastOp::GtEq,
        _ => return None,
    };
    let value = literal_value(right)?;
    Some(PlaceholderBody::Fast {
        op: fast_op,
        operand: Box::new(value),
    })
}

/// Whether `expr` contains a bare `#` reachable without crossing into a
/// nested `Lambda`'s own scope (a lambda's `#`, if any, belongs to its body).
fn contains_placeholder(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Placeholder => true,
        ExprKind::Lambda { .. } => false,
        ExprKind::Prefix { right, .. } => contains_placeholder(right),
        ExprKind::Infix { left, right, .. } => contains_placeholder(left) || contains_placeholder(right),
        ExprKind::Conditional {
            condition,
            consequence,
            alternative,
        } => contains_placeholder(condition) || contains_placeholder(consequence) || contains_placeholder(alternative),
        ExprKind::Index { object, index, .. } => contains_placeholder(object) || contains_placeholder(index),
        ExprKind::Member { object, .. } | ExprKind::Wildcard { object } => contains_placeholder(object),
        ExprKind::Call { callee, args } => contains_placeholder(callee) || args.iter().any(contains_placeholder),
        ExprKind::Builtin { args, .. } | ExprKind::ModuleCall { args, .. } => args.iter().any(contains_placeholder),
        ExprKind::Pipe { source, stage } => contains_placeholder(source) || contains_placeholder(stage),
        ExprKind::NullCoalesce { left, right } => contains_placeholder(left) || contains_placeholder(right),
        ExprKind::ArrayLiteral(elems) => elems.iter().any(contains_placeholder),
        ExprKind::MapLiteral(entries) => {
            entries.iter().any(|e| contains_placeholder(&e.key) || contains_placeholder(&e.value))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::Opcode;
    use crate::parser::Parser;

    fn compiled(src: &str) -> Program {
        let ast = Parser::parse(src).unwrap();
        compile(&ast, &Options::new()).unwrap()
    }

    #[test]
    fn int_literal_constant_folds() {
        let program = compiled("2 + 3");
        assert_eq!(program.constants().len(), 1);
        assert_eq!(program.bytecode()[0], Opcode::LoadConst as u8);
    }

    #[test]
    fn and_compiles_to_a_short_circuit_jump() {
        let program = compiled("a && b");
        assert!(program.bytecode().contains(&(Opcode::JumpIfFalseOrPop as u8)));
    }

    #[test]
    fn simple_predicate_placeholder_skips_closure_machinery() {
        let program = compiled("items | filter(# > 0)");
        assert!(!program.bytecode().contains(&(Opcode::MakeClosure as u8)));
        assert!(program.bytecode().contains(&(Opcode::CallBuiltin as u8)));
    }

    #[test]
    fn lambda_pipe_stage_uses_map() {
        let program = compiled("items | (x) => x * 2");
        assert!(program.bytecode().contains(&(Opcode::MakeClosure as u8)));
        assert!(program.bytecode().contains(&(Opcode::CallBuiltin as u8)));
    }
}
