//! The stack machine that executes a compiled [`Program`] (spec §4.7).
//!
//! Each call — top-level or a callback into a closure/placeholder reached
//! through [`Invoker`] — gets its own operand stack and locals array; there
//! is no shared globals array (see `DESIGN.md` for why that deviates from
//! the index-cached-globals model spec §4.7 describes). Recursion depth is
//! bounded by Rust's own call stack, which `Call`/`Invoker::call` reenter.

mod pool;

use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use regex::Regex;

use crate::bytecode::{Opcode, Program};
use crate::builtins::{self, Invoker};
use crate::env::Environment;
use crate::error::{Error, Result};
use crate::value::{Closure, FastOp, PlaceholderBody, Value};

pub use pool::VmPool;

/// Executes compiled [`Program`]s. Cheap to construct; [`VmPool`] exists
/// only to amortize the heavier per-call allocations across many runs.
#[derive(Debug, Default)]
pub struct Vm {
    cancel: Option<Arc<AtomicBool>>,
}

impl Vm {
    #[must_use]
    pub fn new() -> Self {
        Self { cancel: None }
    }

    /// Runs `program` to completion against `env`.
    ///
    /// # Errors
    /// Any [`Error`] a compiled program can raise at run time (`Name`,
    /// `Argument`, `Runtime`); never `Cancelled` since no flag is armed.
    pub fn run(&mut self, program: &Program, env: &dyn Environment) -> Result<Value> {
        self.cancel = None;
        self.exec(program, env)
    }

    /// Like [`Self::run`], but polls `cancel` once per opcode dispatch and
    /// returns `Error::Cancelled` the instant it is set (spec §5: "no
    /// opcode is interruptible mid-execution").
    ///
    /// # Errors
    /// As [`Self::run`], plus `Error::Cancelled`.
    pub fn run_cancellable(&mut self, program: &Program, env: &dyn Environment, cancel: Arc<AtomicBool>) -> Result<Value> {
        self.cancel = Some(cancel);
        self.exec(program, env)
    }

    fn exec(&mut self, program: &Program, env: &dyn Environment) -> Result<Value> {
        let mut execution = Execution {
            vm: self,
            env,
            builtins: program.builtins(),
            allow_undefined: program.allow_undefined_variables(),
        };
        execution.run_frame(program, Vec::new(), &[])
    }
}

/// One `Vm::run` call's borrowed context: the environment and the
/// compile-time-resolved builtin table, threaded through every nested
/// frame so pipeline callbacks and closures can re-enter execution.
struct Execution<'a> {
    vm: &'a mut Vm,
    env: &'a dyn Environment,
    builtins: &'a [Value],
    allow_undefined: bool,
}

impl Invoker for Execution<'_> {
    fn call(&mut self, callee: &Value, args: &[Value]) -> Result<Value> {
        self.call_value(callee, args)
    }
}

impl Execution<'_> {
    fn check_cancelled(&self) -> Result<()> {
        match &self.vm.cancel {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(Error::Cancelled),
            _ => Ok(()),
        }
    }

    /// Calls any callable [`Value`]: a closure, a placeholder, or (via
    /// `Call`) whatever an environment happened to hand back.
    fn call_value(&mut self, callee: &Value, args: &[Value]) -> Result<Value> {
        match callee {
            Value::Func(closure) => self.call_closure(closure, args),
            Value::Placeholder(p) => match &p.body {
                PlaceholderBody::Fast { op, operand } => {
                    if args.len() != 1 {
                        return Err(Error::argument(
                            format!("placeholder expects 1 argument, got {}", args.len()),
                            None,
                        ));
                    }
                    Ok(Value::Bool(apply_fast_op(*op, &args[0], operand)?))
                }
                PlaceholderBody::Compiled { code } => {
                    if args.len() != 1 {
                        return Err(Error::argument(
                            format!("placeholder expects 1 argument, got {}", args.len()),
                            None,
                        ));
                    }
                    self.run_frame(code, vec![args[0].clone()], &[])
                }
            },
            Value::Proto(_) => Err(Error::runtime("cannot call an uninstantiated function template", None)),
            other => Err(Error::runtime(format!("{} is not callable", other.kind()), None)),
        }
    }

    fn call_closure(&mut self, closure: &Rc<Closure>, args: &[Value]) -> Result<Value> {
        let expected = closure.proto.param_names.len();
        if args.len() != expected {
            return Err(Error::argument(
                format!("function expects {expected} argument(s), got {}", args.len()),
                None,
            ));
        }
        self.run_frame(&closure.proto.code, args.to_vec(), &closure.free)
    }

    /// Dispatches `object.property(args)` by `object`'s *runtime* kind
    /// (spec §4.8): a `Map` field holding a callable is invoked like any
    /// other `Value`; anything else routes through that kind's type-method
    /// module (`"<kind>.<method>"`, e.g. `string.upper`), with `object`
    /// prepended as the module function's first argument.
    fn call_method(&mut self, object: Value, property: &str, args: &[Value], at: crate::lexer::Position) -> Result<Value> {
        if let Value::Map(_) = &object {
            let callee = get_member(&object, property, at, false)?;
            return self.call_value(&callee, args);
        }
        let Some(module) = object.kind().type_method_module() else {
            return Err(Error::runtime(format!("{} has no method `{property}`", object.kind()), Some(at)));
        };
        let mut full_args = Vec::with_capacity(args.len() + 1);
        full_args.push(object);
        full_args.extend_from_slice(args);
        builtins::call_module(module, property, &full_args)
    }

    /// Runs one compiled unit (the top-level program, a lambda body, or a
    /// compiled placeholder) to its `Return` and yields the resulting value.
    fn run_frame(&mut self, code: &Program, mut locals: Vec<Value>, free: &[Value]) -> Result<Value> {
        locals.resize(code.num_locals() as usize, Value::Nil);
        let bytecode = code.bytecode();
        let mut stack: Vec<Value> = Vec::with_capacity(code.max_stack_depth() as usize);
        let mut ip = 0usize;

        loop {
            self.check_cancelled()?;
            let at = code.position_at(ip);
            let byte = bytecode[ip];
            ip += 1;
            let op = Opcode::try_from(byte).map_err(|b| Error::runtime(format!("invalid opcode byte {b}"), Some(at)))?;

            match op {
                Opcode::Nop => {}
                Opcode::LoadConst => {
                    let idx = read_u16(bytecode, &mut ip);
                    stack.push(code.constants().get(idx).clone());
                }
                Opcode::LoadNil => stack.push(Value::Nil),
                Opcode::LoadTrue => stack.push(Value::Bool(true)),
                Opcode::LoadFalse => stack.push(Value::Bool(false)),
                Opcode::LoadLocal => {
                    let idx = read_u8(bytecode, &mut ip) as usize;
                    stack.push(locals[idx].clone());
                }
                Opcode::LoadFree => {
                    let idx = read_u8(bytecode, &mut ip) as usize;
                    stack.push(free[idx].clone());
                }
                Opcode::LoadBuiltin => {
                    let idx = read_u8(bytecode, &mut ip) as usize;
                    stack.push(self.builtins[idx].clone());
                }
                Opcode::LoadEnv => {
                    let idx = read_u16(bytecode, &mut ip);
                    let name = name_const(code, idx);
                    stack.push(self.lookup_env(name, at)?);
                }
                Opcode::Pop => {
                    stack.pop();
                }
                Opcode::Dup => {
                    let top = stack.last().expect("Dup requires a value on the stack").clone();
                    stack.push(top);
                }
                Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div | Opcode::Mod | Opcode::Pow => {
                    let b = stack.pop().expect("binary op requires two operands");
                    let a = stack.pop().expect("binary op requires two operands");
                    stack.push(binary_arith(op, &a, &b, at)?);
                }
                Opcode::Neg => {
                    let v = stack.pop().expect("Neg requires an operand");
                    stack.push(negate(&v, at)?);
                }
                Opcode::Not => {
                    let v = stack.pop().expect("Not requires an operand");
                    stack.push(Value::Bool(!v.is_truthy()));
                }
                Opcode::BitNot => {
                    let v = stack.pop().expect("BitNot requires an operand");
                    let i = as_int(&v, at)?;
                    stack.push(Value::Int(!i));
                }
                Opcode::Eq => {
                    let b = stack.pop().expect("Eq requires two operands");
                    let a = stack.pop().expect("Eq requires two operands");
                    stack.push(Value::Bool(a == b));
                }
                Opcode::NotEq => {
                    let b = stack.pop().expect("NotEq requires two operands");
                    let a = stack.pop().expect("NotEq requires two operands");
                    stack.push(Value::Bool(a != b));
                }
                Opcode::Lt | Opcode::LtEq | Opcode::Gt | Opcode::GtEq => {
                    let b = stack.pop().expect("comparison requires two operands");
                    let a = stack.pop().expect("comparison requires two operands");
                    stack.push(Value::Bool(compare(op, &a, &b, at)?));
                }
                Opcode::BitAnd | Opcode::BitOr | Opcode::BitXor | Opcode::Shl | Opcode::Shr => {
                    let b = stack.pop().expect("bitwise op requires two operands");
                    let a = stack.pop().expect("bitwise op requires two operands");
                    stack.push(Value::Int(bitwise(op, as_int(&a, at)?, as_int(&b, at)?)));
                }
                Opcode::In => {
                    let b = stack.pop().expect("In requires two operands");
                    let a = stack.pop().expect("In requires two operands");
                    stack.push(Value::Bool(op_in(&a, &b, at)?));
                }
                Opcode::Matches => {
                    let b = stack.pop().expect("Matches requires two operands");
                    let a = stack.pop().expect("Matches requires two operands");
                    stack.push(Value::Bool(op_matches(&a, &b, at)?));
                }
                Opcode::Contains => {
                    let b = stack.pop().expect("Contains requires two operands");
                    let a = stack.pop().expect("Contains requires two operands");
                    stack.push(Value::Bool(op_in(&b, &a, at)?));
                }
                Opcode::StartsWith => {
                    let b = stack.pop().expect("StartsWith requires two operands");
                    let a = stack.pop().expect("StartsWith requires two operands");
                    stack.push(Value::Bool(as_str_at("startsWith", &a, at)?.starts_with(as_str_at("startsWith", &b, at)?)));
                }
                Opcode::EndsWith => {
                    let b = stack.pop().expect("EndsWith requires two operands");
                    let a = stack.pop().expect("EndsWith requires two operands");
                    stack.push(Value::Bool(as_str_at("endsWith", &a, at)?.ends_with(as_str_at("endsWith", &b, at)?)));
                }
                Opcode::Jump => {
                    let offset = read_i16(bytecode, &mut ip);
                    ip = apply_jump(ip, offset);
                }
                Opcode::JumpIfFalse => {
                    let offset = read_i16(bytecode, &mut ip);
                    let cond = stack.pop().expect("JumpIfFalse requires a condition");
                    if !cond.is_truthy() {
                        ip = apply_jump(ip, offset);
                    }
                }
                Opcode::JumpIfTrue => {
                    let offset = read_i16(bytecode, &mut ip);
                    let cond = stack.pop().expect("JumpIfTrue requires a condition");
                    if cond.is_truthy() {
                        ip = apply_jump(ip, offset);
                    }
                }
                // Neither variant pops on the fallthrough path: the compiler
                // emits an explicit Pop right after for that case (see
                // `compile_short_circuit`), so popping here too would
                // double-pop the operand stack.
                Opcode::JumpIfFalseOrPop => {
                    let offset = read_i16(bytecode, &mut ip);
                    if !stack.last().expect("JumpIfFalseOrPop requires a value").is_truthy() {
                        ip = apply_jump(ip, offset);
                    }
                }
                Opcode::JumpIfTrueOrPop => {
                    let offset = read_i16(bytecode, &mut ip);
                    if stack.last().expect("JumpIfTrueOrPop requires a value").is_truthy() {
                        ip = apply_jump(ip, offset);
                    }
                }
                Opcode::BuildArray => {
                    let n = read_u16(bytecode, &mut ip) as usize;
                    let start = stack.len() - n;
                    let elems: Vec<Value> = stack.split_off(start);
                    let elem_type = elems.first().map_or_else(crate::types::TypeInfo::interface, Value::type_info);
                    stack.push(Value::slice(elems, elem_type));
                }
                Opcode::BuildMap => {
                    let n = read_u16(bytecode, &mut ip) as usize;
                    let start = stack.len() - 2 * n;
                    let pairs: Vec<Value> = stack.split_off(start);
                    stack.push(build_map(pairs));
                }
                Opcode::Index => {
                    let index = stack.pop().expect("Index requires an index");
                    let object = stack.pop().expect("Index requires an object");
                    stack.push(do_index(&object, &index, at)?);
                }
                Opcode::IndexOptional => {
                    let index = stack.pop().expect("IndexOptional requires an index");
                    let object = stack.pop().expect("IndexOptional requires an object");
                    stack.push(if matches!(object, Value::Nil) { Value::Nil } else { do_index(&object, &index, at)? });
                }
                Opcode::GetMember => {
                    let idx = read_u16(bytecode, &mut ip);
                    let name = name_const(code, idx);
                    let object = stack.pop().expect("GetMember requires an object");
                    stack.push(get_member(&object, name, at, false)?);
                }
                Opcode::GetMemberOptional => {
                    let idx = read_u16(bytecode, &mut ip);
                    let name = name_const(code, idx);
                    let object = stack.pop().expect("GetMemberOptional requires an object");
                    stack.push(if matches!(object, Value::Nil) { Value::Nil } else { get_member(&object, name, at, true)? });
                }
                Opcode::Wildcard => {
                    let object = stack.pop().expect("Wildcard requires an object");
                    stack.push(match object {
                        Value::Map(_) => object,
                        other => return Err(Error::runtime(format!("`.{{*}}` requires a struct/map, got {}", other.kind()), Some(at))),
                    });
                }
                Opcode::MakeClosure => {
                    let func_id = read_u16(bytecode, &mut ip);
                    let free_count = read_u8(bytecode, &mut ip) as usize;
                    let start = stack.len() - free_count;
                    let free_values: Vec<Value> = stack.split_off(start);
                    let proto = match code.constants().get(func_id) {
                        Value::Proto(p) => Rc::clone(p),
                        other => unreachable!("MakeClosure's constant is always a Proto, got {other:?}"),
                    };
                    stack.push(Value::Func(Rc::new(Closure { proto, free: free_values })));
                }
                Opcode::Call => {
                    let arg_count = read_u8(bytecode, &mut ip) as usize;
                    let start = stack.len() - arg_count;
                    let args: Vec<Value> = stack.split_off(start);
                    let callee = stack.pop().expect("Call requires a callee");
                    stack.push(self.call_value(&callee, &args)?);
                }
                Opcode::CallBuiltin => {
                    let builtin_id = read_u8(bytecode, &mut ip);
                    let arg_count = read_u8(bytecode, &mut ip) as usize;
                    let start = stack.len() - arg_count;
                    let args: Vec<Value> = stack.split_off(start);
                    let spec = builtins::by_id(builtin_id);
                    if args.len() < spec.min_args || spec.max_args.is_some_and(|max| args.len() > max) {
                        return Err(Error::argument(format!("`{}` called with {} argument(s)", spec.name, args.len()), Some(at)));
                    }
                    stack.push((spec.func)(&args, self)?);
                }
                Opcode::CallModule => {
                    let module_idx = read_u16(bytecode, &mut ip);
                    let name_idx = read_u16(bytecode, &mut ip);
                    let arg_count = read_u8(bytecode, &mut ip) as usize;
                    let start = stack.len() - arg_count;
                    let args: Vec<Value> = stack.split_off(start);
                    let module = name_const(code, module_idx);
                    let name = name_const(code, name_idx);
                    stack.push(builtins::call_module(module, name, &args)?);
                }
                Opcode::CallMethod | Opcode::CallMethodOptional => {
                    let name_idx = read_u16(bytecode, &mut ip);
                    let property = name_const(code, name_idx);
                    let arg_count = read_u8(bytecode, &mut ip) as usize;
                    let start = stack.len() - arg_count;
                    let args: Vec<Value> = stack.split_off(start);
                    let object = stack.pop().expect("CallMethod requires a receiver");
                    let result = if op == Opcode::CallMethodOptional && matches!(object, Value::Nil) {
                        Value::Nil
                    } else {
                        self.call_method(object, property, &args, at)?
                    };
                    stack.push(result);
                }
                Opcode::NullCoalesce => {
                    let b = stack.pop().expect("NullCoalesce requires two operands");
                    let a = stack.pop().expect("NullCoalesce requires two operands");
                    stack.push(if matches!(a, Value::Nil) { b } else { a });
                }
                Opcode::Return => {
                    return Ok(stack.pop().unwrap_or(Value::Nil));
                }
            }
        }
    }

    fn lookup_env(&self, name: &str, at: crate::lexer::Position) -> Result<Value> {
        crate::env::lookup_or_nil(self.env, name, self.allow_undefined).map_err(|err| match err {
            Error::Name(d) => Error::name(d.message, Some(at)),
            other => other,
        })
    }
}

fn read_u8(bytecode: &[u8], ip: &mut usize) -> u8 {
    let b = bytecode[*ip];
    *ip += 1;
    b
}

fn read_u16(bytecode: &[u8], ip: &mut usize) -> u16 {
    let bytes = [bytecode[*ip], bytecode[*ip + 1]];
    *ip += 2;
    u16::from_le_bytes(bytes)
}

fn read_i16(bytecode: &[u8], ip: &mut usize) -> i16 {
    let bytes = [bytecode[*ip], bytecode[*ip + 1]];
    *ip += 2;
    i16::from_le_bytes(bytes)
}

fn apply_jump(ip: usize, offset: i16) -> usize {
    (ip as i64 + i64::from(offset)) as usize
}

fn name_const(code: &Program, idx: u16) -> &str {
    code.constants().get(idx).as_str().expect("name constants are always strings")
}

fn build_map(pairs: Vec<Value>) -> Value {
    use indexmap::IndexMap;
    let mut entries = IndexMap::with_capacity(pairs.len() / 2);
    let mut value_type = None;
    let mut iter = pairs.into_iter();
    while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
        let key: std::rc::Rc<str> = key.to_string().into();
        if value_type.is_none() {
            value_type = Some(value.type_info());
        }
        entries.insert(key, value);
    }
    let value_type = value_type.unwrap_or_else(crate::types::TypeInfo::interface);
    Value::map(entries, crate::types::TypeInfo::string(), value_type)
}

fn apply_fast_op(op: FastOp, value: &Value, operand: &Value) -> Result<bool> {
    Ok(match op {
        FastOp::Eq => value == operand,
        FastOp::NotEq => value != operand,
        FastOp::Lt => numeric_cmp(value, operand)?.is_lt(),
        FastOp::LtEq => numeric_cmp(value, operand)?.is_le(),
        FastOp::Gt => numeric_cmp(value, operand)?.is_gt(),
        FastOp::GtEq => numeric_cmp(value, operand)?.is_ge(),
    })
}

fn numeric_cmp(a: &Value, b: &Value) -> Result<std::cmp::Ordering> {
    if let (Value::String(x), Value::String(y)) = (a, b) {
        return Ok(x.cmp(y));
    }
    let (x, y) = (a.as_f64(), b.as_f64());
    match (x, y) {
        (Some(x), Some(y)) => Ok(x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal)),
        _ => Err(Error::runtime(format!("cannot compare {} and {}", a.kind(), b.kind()), None)),
    }
}

fn compare(op: Opcode, a: &Value, b: &Value, at: crate::lexer::Position) -> Result<bool> {
    let ord = numeric_cmp(a, b).map_err(|_| {
        Error::runtime(format!("cannot compare {} and {}", a.kind(), b.kind()), Some(at))
    })?;
    Ok(match op {
        Opcode::Lt => ord.is_lt(),
        Opcode::LtEq => ord.is_le(),
        Opcode::Gt => ord.is_gt(),
        Opcode::GtEq => ord.is_ge(),
        _ => unreachable!("compare is only called for the four ordering opcodes"),
    })
}

fn binary_arith(op: Opcode, a: &Value, b: &Value, at: crate::lexer::Position) -> Result<Value> {
    if let (Value::String(x), Value::String(y)) = (a, b) {
        if op == Opcode::Add {
            return Ok(Value::string(format!("{x}{y}")));
        }
    }
    if let (Value::Slice(x), Value::Slice(y)) = (a, b) {
        if op == Opcode::Add {
            let mut elems = x.elems.clone();
            elems.extend(y.elems.iter().cloned());
            let elem_type = x.elem_type.clone();
            return Ok(Value::slice(elems, elem_type));
        }
    }
    if let (Value::Int(x), Value::Int(y)) = (a, b) {
        let (x, y) = (*x, *y);
        return match op {
            Opcode::Add => Ok(Value::Int(x.wrapping_add(y))),
            Opcode::Sub => Ok(Value::Int(x.wrapping_sub(y))),
            Opcode::Mul => Ok(Value::Int(x.wrapping_mul(y))),
            Opcode::Div => {
                if y == 0 {
                    Err(Error::runtime("division by zero", Some(at)))
                } else {
                    Ok(Value::Int(x.wrapping_div(y)))
                }
            }
            Opcode::Mod => {
                if y == 0 {
                    Err(Error::runtime("division by zero", Some(at)))
                } else {
                    Ok(Value::Int(x.wrapping_rem(y)))
                }
            }
            // Negative exponents fall back to float power (DESIGN.md's
            // resolution of the source's inconsistent int/float casting).
            Opcode::Pow => match u32::try_from(y) {
                Ok(exp) => Ok(x.checked_pow(exp).map_or_else(|| Value::Float((x as f64).powf(y as f64)), Value::Int)),
                Err(_) => Ok(Value::Float((x as f64).powf(y as f64))),
            },
            _ => unreachable!("binary_arith is only called for arithmetic opcodes"),
        };
    }
    let (x, y) = (
        a.as_f64().ok_or_else(|| arith_type_error(op, a, b, at))?,
        b.as_f64().ok_or_else(|| arith_type_error(op, a, b, at))?,
    );
    Ok(Value::Float(match op {
        Opcode::Add => x + y,
        Opcode::Sub => x - y,
        Opcode::Mul => x * y,
        Opcode::Div => x / y,
        Opcode::Mod => x % y,
        Opcode::Pow => x.powf(y),
        _ => unreachable!("binary_arith is only called for arithmetic opcodes"),
    }))
}

fn arith_type_error(op: Opcode, a: &Value, b: &Value, at: crate::lexer::Position) -> Error {
    Error::runtime(format!("cannot apply {op:?} to {} and {}", a.kind(), b.kind()), Some(at))
}

fn negate(v: &Value, at: crate::lexer::Position) -> Result<Value> {
    match v {
        Value::Int(i) => Ok(Value::Int(i.wrapping_neg())),
        Value::Float(f) => Ok(Value::Float(-f)),
        other => Err(Error::runtime(format!("cannot negate {}", other.kind()), Some(at))),
    }
}

fn as_int(v: &Value, at: crate::lexer::Position) -> Result<i64> {
    v.as_int().ok_or_else(|| Error::runtime(format!("expected an int, got {}", v.kind()), Some(at)))
}

fn as_str_at<'a>(op_name: &str, v: &'a Value, at: crate::lexer::Position) -> Result<&'a str> {
    v.as_str().ok_or_else(|| Error::runtime(format!("`{op_name}` requires strings, got {}", v.kind()), Some(at)))
}

fn bitwise(op: Opcode, a: i64, b: i64) -> i64 {
    match op {
        Opcode::BitAnd => a & b,
        Opcode::BitOr => a | b,
        Opcode::BitXor => a ^ b,
        Opcode::Shl => a.wrapping_shl(b.rem_euclid(64) as u32),
        Opcode::Shr => a.wrapping_shr(b.rem_euclid(64) as u32),
        _ => unreachable!("bitwise is only called for the five bitwise opcodes"),
    }
}

/// `a in b`: slice membership, map key presence, or substring.
fn op_in(elem: &Value, container: &Value, at: crate::lexer::Position) -> Result<bool> {
    match container {
        Value::Slice(s) => Ok(s.elems.contains(elem)),
        Value::Map(m) => {
            let key = as_str_at("in", elem, at)?;
            Ok(m.entries.contains_key(key))
        }
        Value::String(s) => Ok(s.contains(as_str_at("in", elem, at)?)),
        other => Err(Error::runtime(format!("`in` requires a slice, map, or string, got {}", other.kind()), Some(at))),
    }
}

fn op_matches(value: &Value, pattern: &Value, at: crate::lexer::Position) -> Result<bool> {
    let s = as_str_at("matches", value, at)?;
    let pattern = as_str_at("matches", pattern, at)?;
    let re = Regex::new(pattern).map_err(|e| Error::runtime(format!("invalid pattern: {e}"), Some(at)))?;
    Ok(re.is_match(s))
}

fn get_member(object: &Value, name: &str, at: crate::lexer::Position, optional: bool) -> Result<Value> {
    match object {
        Value::Map(m) => match m.entries.get(name) {
            Some(v) => Ok(v.clone()),
            None if optional => Ok(Value::Nil),
            None => Err(Error::name(format!("no field `{name}`"), Some(at))),
        },
        other => Err(Error::runtime(format!("cannot access member `{name}` on {}", other.kind()), Some(at))),
    }
}

fn do_index(object: &Value, index: &Value, at: crate::lexer::Position) -> Result<Value> {
    match object {
        Value::Slice(s) => {
            let i = as_int(index, at)?;
            let len = s.elems.len() as i64;
            let i = if i < 0 { i + len } else { i };
            if i < 0 || i >= len {
                return Err(Error::runtime(format!("index {i} out of range for a slice of length {len}"), Some(at)));
            }
            Ok(s.elems[i as usize].clone())
        }
        Value::Map(m) => {
            let key = as_str_at("index", index, at)?;
            m.entries.get(key).cloned().ok_or_else(|| Error::name(format!("no key {key:?}"), Some(at)))
        }
        Value::String(s) => {
            let i = as_int(index, at)?;
            let chars: Vec<char> = s.chars().collect();
            let len = chars.len() as i64;
            let i = if i < 0 { i + len } else { i };
            if i < 0 || i >= len {
                return Err(Error::runtime(format!("index {i} out of range for a string of length {len}"), Some(at)));
            }
            Ok(Value::string(chars[i as usize].to_string()))
        }
        other => Err(Error::runtime(format!("cannot index into {}", other.kind()), Some(at))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::env::{EmptyEnvironment, HashMapEnvironment};
    use crate::options::Options;
    use crate::parser::Parser;

    fn eval(src: &str, env: &dyn Environment) -> Result<Value> {
        let ast = Parser::parse(src)?;
        let program = compile(&ast, &Options::new())?;
        Vm::new().run(&program, env)
    }

    #[test]
    fn arithmetic_folds_and_runs() {
        assert_eq!(eval("2 + 3 * 4", &EmptyEnvironment).unwrap(), Value::Int(14));
    }

    #[test]
    fn integer_division_by_zero_is_a_runtime_error() {
        assert!(matches!(eval("1 / 0", &EmptyEnvironment), Err(Error::Runtime(_))));
    }

    #[test]
    fn string_concatenation_via_add() {
        assert_eq!(eval("\"foo\" + \"bar\"", &EmptyEnvironment).unwrap(), Value::string("foobar"));
    }

    #[test]
    fn ternary_only_evaluates_the_selected_branch() {
        let env = HashMapEnvironment::new().with("x", 1i64);
        assert_eq!(eval("true ? x : (1 / 0)", &env).unwrap(), Value::Int(1));
    }

    #[test]
    fn pipeline_filter_then_map_runs_end_to_end() {
        let env = HashMapEnvironment::new().with(
            "items",
            Value::slice(vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)], crate::types::TypeInfo::int()),
        );
        let result = eval("items | filter(# > 1) | map(# * 10)", &env).unwrap();
        assert_eq!(result.to_string(), "[20, 30, 40]");
    }

    #[test]
    fn lambda_closure_captures_free_variable() {
        let env = HashMapEnvironment::new().with("n", 10i64);
        let result = eval("[1, 2] | map((x) => x + n)", &env).unwrap();
        assert_eq!(result.to_string(), "[11, 12]");
    }

    #[test]
    fn undefined_variable_without_opt_in_is_a_name_error() {
        assert!(matches!(eval("missing", &EmptyEnvironment), Err(Error::Name(_))));
    }

    #[test]
    fn null_coalesce_prefers_left_unless_nil() {
        assert_eq!(eval("nil ?? 5", &EmptyEnvironment).unwrap(), Value::Int(5));
        assert_eq!(eval("7 ?? 5", &EmptyEnvironment).unwrap(), Value::Int(7));
    }

    #[test]
    fn cancellation_flag_stops_execution_at_next_opcode() {
        let flag = Arc::new(AtomicBool::new(true));
        let ast = Parser::parse("1 + 1").unwrap();
        let program = compile(&ast, &Options::new()).unwrap();
        let result = Vm::new().run_cancellable(&program, &EmptyEnvironment, flag);
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
