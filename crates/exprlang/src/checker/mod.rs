//! The type-checking pass (spec §4.4): walks the AST once, assigns each
//! [`Expr`]'s [`crate::ast::TypeSlot`], and collects diagnostics rather
//! than failing on the first mismatch.

mod scope;

use std::cell::RefCell;

use scope::TypeScope;

use crate::ast::{Ast, Expr, ExprKind, InfixOp, PrefixOp};
use crate::builtins;
use crate::env::Environment;
use crate::error::{Diagnostic, Error, Result};
use crate::options::Options;
use crate::types::{Kind, TypeInfo};

pub struct Checker<'a> {
    env: &'a dyn Environment,
    options: &'a Options,
    scope: TypeScope,
    diagnostics: RefCell<Vec<Diagnostic>>,
}

/// Type-checks `ast` against `env`/`options`, writing inferred types into
/// every node's `TypeSlot`.
///
/// # Errors
/// Returns `Error::Type` with every diagnostic found, not just the first.
pub fn check(ast: &Ast, env: &dyn Environment, options: &Options) -> Result<()> {
    let checker = Checker {
        env,
        options,
        scope: TypeScope::new(),
        diagnostics: RefCell::new(Vec::new()),
    };
    checker.run(ast)
}

impl<'a> Checker<'a> {
    fn run(mut self, ast: &Ast) -> Result<()> {
        for import in &ast.imports {
            if !MODULE_NAMES.contains(&import.path.as_str()) {
                self.report(format!("unknown module `{}`", import.path), Some(import.position));
            }
        }
        self.infer(&ast.body);
        let diagnostics = self.diagnostics.into_inner();
        if diagnostics.is_empty() {
            Ok(())
        } else {
            Err(Error::Type(diagnostics))
        }
    }

    fn report(&self, message: impl Into<String>, position: Option<crate::lexer::Position>) {
        self.diagnostics.borrow_mut().push(Diagnostic::new(message, position));
    }

    fn set(&self, expr: &Expr, ty: TypeInfo) -> TypeInfo {
        expr.ty.set(ty.clone());
        ty
    }

    fn infer(&mut self, expr: &Expr) -> TypeInfo {
        let ty = match &expr.kind {
            ExprKind::NilLiteral => TypeInfo::nil(),
            ExprKind::BoolLiteral(_) => TypeInfo::bool(),
            ExprKind::IntLiteral(_) => TypeInfo::int(),
            ExprKind::FloatLiteral(_) => TypeInfo::float(),
            ExprKind::StringLiteral(_) => TypeInfo::string(),
            ExprKind::Placeholder => self.scope.resolve("#").unwrap_or_else(TypeInfo::interface),
            ExprKind::Identifier(name) => self.infer_identifier(expr, name),
            ExprKind::ArrayLiteral(elems) => self.infer_array(elems),
            ExprKind::MapLiteral(entries) => self.infer_map(entries),
            ExprKind::Prefix { op, right } => self.infer_prefix(expr, *op, right),
            ExprKind::Infix { op, left, right } => self.infer_infix(expr, *op, left, right),
            ExprKind::Conditional {
                condition,
                consequence,
                alternative,
            } => self.infer_conditional(expr, condition, consequence, alternative),
            ExprKind::Index { object, index, optional } => self.infer_index(expr, object, index, *optional),
            ExprKind::Member { object, property, optional } => {
                self.infer_member(expr, object, property, *optional)
            }
            ExprKind::Wildcard { object } => {
                self.infer(object);
                TypeInfo::slice(TypeInfo::interface())
            }
            ExprKind::Call { callee, args } => self.infer_call(expr, callee, args),
            ExprKind::Builtin { name, args } => self.infer_builtin(expr, name, args),
            ExprKind::ModuleCall { module, name, args } => self.infer_module_call(expr, module, name, args),
            ExprKind::Lambda { params, body } => self.infer_lambda(params, body),
            ExprKind::Pipe { source, stage } => self.infer_pipe(expr, source, stage),
            ExprKind::NullCoalesce { left, right } => self.infer_null_coalesce(expr, left, right),
        };
        self.set(expr, ty)
    }

    fn infer_identifier(&mut self, expr: &Expr, name: &str) -> TypeInfo {
        if let Some(ty) = self.scope.resolve(name) {
            return ty;
        }
        if let Some(ty) = self.options.builtin_type(name) {
            return ty;
        }
        if let Some(ty) = self.env.type_of(name) {
            return ty;
        }
        if self.options.allow_undefined_variables() {
            return TypeInfo::interface();
        }
        self.report(format!("undefined variable `{name}`"), Some(expr.position));
        TypeInfo::interface()
    }

    fn infer_array(&mut self, elems: &[Expr]) -> TypeInfo {
        let mut elem_ty = None;
        for e in elems {
            let t = self.infer(e);
            elem_ty = Some(match elem_ty {
                None => t,
                Some(prev) if prev == t => prev,
                Some(_) => TypeInfo::interface(),
            });
        }
        TypeInfo::slice(elem_ty.unwrap_or_else(TypeInfo::interface))
    }

    fn infer_map(&mut self, entries: &[crate::ast::MapEntry]) -> TypeInfo {
        let mut value_ty = None;
        for e in entries {
            self.infer(&e.key);
            let v = self.infer(&e.value);
            value_ty = Some(match value_ty {
                None => v,
                Some(prev) if prev == v => prev,
                Some(_) => TypeInfo::interface(),
            });
        }
        TypeInfo::map(TypeInfo::string(), value_ty.unwrap_or_else(TypeInfo::interface))
    }

    fn infer_prefix(&mut self, expr: &Expr, op: PrefixOp, right: &Expr) -> TypeInfo {
        let rt = self.infer(right);
        match op {
            PrefixOp::Neg => {
                if !rt.is_numeric() && rt.kind != Kind::Interface {
                    self.report(format!("cannot negate {rt}"), Some(expr.position));
                }
                rt
            }
            PrefixOp::Not => TypeInfo::bool(),
            PrefixOp::BitNot => {
                if rt.kind != Kind::Int64 && rt.kind != Kind::Interface {
                    self.report(format!("bitwise not requires an int, got {rt}"), Some(expr.position));
                }
                TypeInfo::int()
            }
        }
    }

    fn infer_infix(&mut self, expr: &Expr, op: InfixOp, left: &Expr, right: &Expr) -> TypeInfo {
        let lt = self.infer(left);
        let rt = self.infer(right);
        match op {
            InfixOp::Add | InfixOp::Sub | InfixOp::Mul | InfixOp::Div | InfixOp::Mod | InfixOp::Pow => {
                self.infer_arithmetic(expr, op, &lt, &rt)
            }
            InfixOp::Eq | InfixOp::NotEq | InfixOp::Lt | InfixOp::LtEq | InfixOp::Gt | InfixOp::GtEq => {
                TypeInfo::bool()
            }
            InfixOp::And | InfixOp::Or => TypeInfo::bool(),
            InfixOp::BitAnd | InfixOp::BitOr | InfixOp::BitXor | InfixOp::Shl | InfixOp::Shr => TypeInfo::int(),
            InfixOp::In => TypeInfo::bool(),
            InfixOp::Matches | InfixOp::Contains | InfixOp::StartsWith | InfixOp::EndsWith => TypeInfo::bool(),
        }
    }

    fn infer_arithmetic(&self, expr: &Expr, op: InfixOp, lt: &TypeInfo, rt: &TypeInfo) -> TypeInfo {
        // `+` also concatenates strings and slices, per spec §4.4.
        if op == InfixOp::Add && lt.kind == Kind::String && rt.kind == Kind::String {
            return TypeInfo::string();
        }
        if op == InfixOp::Add && lt.kind == Kind::Slice && rt.kind == Kind::Slice {
            return lt.clone();
        }
        if lt.kind == Kind::Interface || rt.kind == Kind::Interface {
            return TypeInfo::interface();
        }
        if !lt.is_numeric() || !rt.is_numeric() {
            self.report(format!("cannot apply `{op}` to {lt} and {rt}"), Some(expr.position));
            return TypeInfo::interface();
        }
        if lt.kind == Kind::Float64 || rt.kind == Kind::Float64 {
            TypeInfo::float()
        } else {
            TypeInfo::int()
        }
    }

    fn infer_conditional(&mut self, expr: &Expr, cond: &Expr, cons: &Expr, alt: &Expr) -> TypeInfo {
        let ct = self.infer(cond);
        if ct.kind != Kind::Bool && ct.kind != Kind::Interface {
            self.report(format!("conditional requires a bool condition, got {ct}"), Some(expr.position));
        }
        let t1 = self.infer(cons);
        let t2 = self.infer(alt);
        if t1 == t2 { t1 } else { TypeInfo::interface() }
    }

    fn infer_index(&mut self, expr: &Expr, object: &Expr, index: &Expr, optional: bool) -> TypeInfo {
        let ot = self.infer(object);
        let it = self.infer(index);
        let result = match ot.kind {
            Kind::Slice => ot.elem.map_or_else(TypeInfo::interface, |t| (*t).clone()),
            Kind::Map => ot.value.map_or_else(TypeInfo::interface, |t| (*t).clone()),
            Kind::String => TypeInfo::string(),
            Kind::Interface => TypeInfo::interface(),
            _ => {
                self.report(format!("cannot index into {ot}"), Some(expr.position));
                TypeInfo::interface()
            }
        };
        if ot.kind == Kind::Slice && it.kind != Kind::Int64 && it.kind != Kind::Interface {
            self.report(format!("slice index must be an int, got {it}"), Some(expr.position));
        }
        let _ = optional;
        result
    }

    fn infer_member(&mut self, expr: &Expr, object: &Expr, property: &str, _optional: bool) -> TypeInfo {
        let ot = self.infer(object);
        self.member_result_ty(&ot, property, expr.position)
    }

    fn member_result_ty(&mut self, ot: &TypeInfo, property: &str, position: crate::lexer::Position) -> TypeInfo {
        match ot.kind {
            Kind::Struct => ot.field(property).cloned().unwrap_or_else(|| {
                self.report(format!("{ot} has no field `{property}`"), Some(position));
                TypeInfo::interface()
            }),
            Kind::Map => ot.value.clone().map_or_else(TypeInfo::interface, |t| (*t).clone()),
            Kind::Interface => TypeInfo::interface(),
            _ => {
                self.report(format!("cannot access `.{property}` on {ot}"), Some(position));
                TypeInfo::interface()
            }
        }
    }

    /// `object.property(args)`. A `Member` callee whose object is a
    /// primitive kind with type methods (spec §4.8's `"<kind>.<method>"`
    /// registry) dispatches there at run time; anything else falls back to
    /// ordinary member access followed by a call (a `Map`/`Struct` field
    /// holding a callable value).
    fn infer_call(&mut self, expr: &Expr, callee: &Expr, args: &[Expr]) -> TypeInfo {
        if let ExprKind::Member { object, property, optional: _ } = &callee.kind {
            let ot = self.infer(object);
            if ot.kind.type_method_module().is_some() {
                self.set(callee, ot);
                for a in args {
                    self.infer(a);
                }
                return TypeInfo::interface();
            }
            let ct = self.member_result_ty(&ot, property, callee.position);
            self.set(callee, ct.clone());
            for a in args {
                self.infer(a);
            }
            if ct.kind != Kind::Func && ct.kind != Kind::Interface {
                self.report(format!("{ct} is not callable"), Some(expr.position));
            }
            return TypeInfo::interface();
        }
        let ct = self.infer(callee);
        for a in args {
            self.infer(a);
        }
        if ct.kind != Kind::Func && ct.kind != Kind::Interface {
            self.report(format!("{ct} is not callable"), Some(expr.position));
        }
        TypeInfo::interface()
    }

    fn infer_builtin(&mut self, expr: &Expr, name: &str, args: &[Expr]) -> TypeInfo {
        for a in args {
            self.infer(a);
        }
        let Some(spec) = builtins::REGISTRY.iter().find(|b| b.name == name) else {
            self.report(format!("unknown builtin `{name}`"), Some(expr.position));
            return TypeInfo::interface();
        };
        let in_range = args.len() >= spec.min_args && spec.max_args.is_none_or(|max| args.len() <= max);
        if !in_range {
            self.report(format!("`{name}` called with {} argument(s)", args.len()), Some(expr.position));
        }
        match name {
            "len" | "count" | "sum" => TypeInfo::interface(),
            "filter" | "sort" | "reverse" | "take" | "skip" | "unique" => {
                args.first().map(Expr::ty_or_interface).unwrap_or_else(TypeInfo::interface)
            }
            "join" => TypeInfo::string(),
            "split" => TypeInfo::slice(TypeInfo::string()),
            "all" | "any" => TypeInfo::bool(),
            "groupBy" => TypeInfo::map(TypeInfo::string(), TypeInfo::slice(TypeInfo::interface())),
            _ => TypeInfo::interface(),
        }
    }

    fn infer_module_call(&mut self, expr: &Expr, module: &str, name: &str, args: &[Expr]) -> TypeInfo {
        for a in args {
            self.infer(a);
        }
        if !MODULE_NAMES.contains(&module) {
            self.report(format!("unknown module `{module}`"), Some(expr.position));
        }
        let _ = name;
        TypeInfo::interface()
    }

    fn infer_lambda(&mut self, params: &[crate::ast::Param], body: &Expr) -> TypeInfo {
        self.scope.push();
        for p in params {
            self.scope.define(&p.name, TypeInfo::interface());
        }
        self.infer(body);
        self.scope.pop();
        TypeInfo::func()
    }

    fn infer_pipe(&mut self, expr: &Expr, source: &Expr, stage: &Expr) -> TypeInfo {
        let source_ty = self.infer(source);
        self.scope.push();
        self.scope.define("#", source_ty.elem.map_or_else(|| source_ty.clone(), |t| (*t).clone()));
        let ty = self.infer(stage);
        self.scope.pop();
        let _ = expr;
        match &stage.kind {
            ExprKind::Builtin { name, .. } => self.infer_builtin_result_ty(name, &source_ty),
            _ => ty,
        }
    }

    fn infer_builtin_result_ty(&self, name: &str, source_ty: &TypeInfo) -> TypeInfo {
        match name {
            "sum" | "avg" | "count" | "len" => TypeInfo::interface(),
            "join" => TypeInfo::string(),
            "first" | "last" | "max" | "min" => {
                source_ty.elem.clone().map_or_else(TypeInfo::interface, |t| (*t).clone())
            }
            "all" | "any" => TypeInfo::bool(),
            "groupBy" => TypeInfo::map(TypeInfo::string(), TypeInfo::slice(TypeInfo::interface())),
            _ => source_ty.clone(),
        }
    }

    fn infer_null_coalesce(&mut self, _expr: &Expr, left: &Expr, right: &Expr) -> TypeInfo {
        self.infer(left);
        let rt = self.infer(right);
        rt
    }
}

trait ExprTypeExt {
    fn ty_or_interface(&self) -> TypeInfo;
}

impl ExprTypeExt for Expr {
    fn ty_or_interface(&self) -> TypeInfo {
        self.ty.get().unwrap_or_else(TypeInfo::interface)
    }
}

const MODULE_NAMES: &[&str] = &["math", "string", "collection", "util"];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::EmptyEnvironment;
    use crate::parser::Parser;

    fn check_source(src: &str) -> Result<()> {
        let ast = Parser::parse(src).unwrap();
        let env = EmptyEnvironment;
        let options = Options::new();
        check(&ast, &env, &options)
    }

    #[test]
    fn arithmetic_on_ints_is_int() {
        let ast = Parser::parse("1 + 2").unwrap();
        let env = EmptyEnvironment;
        let options = Options::new();
        check(&ast, &env, &options).unwrap();
        assert_eq!(ast.body.ty.get(), Some(TypeInfo::int()));
    }

    #[test]
    fn mixed_int_float_widens_to_float() {
        let ast = Parser::parse("1 + 2.0").unwrap();
        let env = EmptyEnvironment;
        let options = Options::new();
        check(&ast, &env, &options).unwrap();
        assert_eq!(ast.body.ty.get(), Some(TypeInfo::float()));
    }

    #[test]
    fn undefined_variable_is_a_type_error_by_default() {
        assert!(check_source("missing_name").is_err());
    }

    #[test]
    fn undefined_variable_allowed_when_opted_in() {
        let ast = Parser::parse("missing_name").unwrap();
        let env = EmptyEnvironment;
        let options = Options::new().with_allow_undefined_variables(true);
        assert!(check(&ast, &env, &options).is_ok());
    }

    #[test]
    fn conditional_branch_mismatch_falls_back_to_interface() {
        let ast = Parser::parse("true ? 1 : \"a\"").unwrap();
        let env = EmptyEnvironment;
        let options = Options::new();
        check(&ast, &env, &options).unwrap();
        assert_eq!(ast.body.ty.get(), Some(TypeInfo::interface()));
    }
}
