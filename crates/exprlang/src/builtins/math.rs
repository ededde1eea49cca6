//! `math.*` module-qualified builtins (spec §4.8).

use super::{arity_error, type_error};
use crate::error::{Error, Result};
use crate::value::Value;

fn as_f64(name: &str, v: &Value) -> Result<f64> {
    v.as_f64().ok_or_else(|| type_error(name, "a number", v))
}

pub fn call(name: &str, args: &[Value]) -> Result<Value> {
    match name {
        "abs" => unary(name, args, f64::abs, |i: i64| i.abs()),
        "floor" => Ok(Value::Float(as_f64(name, one(name, args)?)?.floor())),
        "ceil" => Ok(Value::Float(as_f64(name, one(name, args)?)?.ceil())),
        "round" => Ok(Value::Float(as_f64(name, one(name, args)?)?.round())),
        "sqrt" => Ok(Value::Float(as_f64(name, one(name, args)?)?.sqrt())),
        "log" => Ok(Value::Float(as_f64(name, one(name, args)?)?.ln())),
        "exp" => Ok(Value::Float(as_f64(name, one(name, args)?)?.exp())),
        "pow" => {
            if args.len() != 2 {
                return Err(arity_error("math.pow", args.len()));
            }
            Ok(Value::Float(as_f64(name, &args[0])?.powf(as_f64(name, &args[1])?)))
        }
        "min" => binary(name, args, f64::min),
        "max" => binary(name, args, f64::max),
        _ => Err(Error::name(format!("unknown function `math.{name}`"), None)),
    }
}

fn one<'a>(name: &str, args: &'a [Value]) -> Result<&'a Value> {
    args.first().ok_or_else(|| arity_error(name, args.len()))
}

fn unary(name: &str, args: &[Value], ffn: impl Fn(f64) -> f64, ifn: impl Fn(i64) -> i64) -> Result<Value> {
    if args.len() != 1 {
        return Err(arity_error(name, args.len()));
    }
    match &args[0] {
        Value::Int(i) => Ok(Value::Int(ifn(*i))),
        other => Ok(Value::Float(ffn(as_f64(name, other)?))),
    }
}

fn binary(name: &str, args: &[Value], f: impl Fn(f64, f64) -> f64) -> Result<Value> {
    if args.len() != 2 {
        return Err(arity_error(name, args.len()));
    }
    if let (Value::Int(a), Value::Int(b)) = (&args[0], &args[1]) {
        let result = f(*a as f64, *b as f64);
        return Ok(Value::Int(result as i64));
    }
    Ok(Value::Float(f(as_f64(name, &args[0])?, as_f64(name, &args[1])?)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abs_preserves_int_kind() {
        assert_eq!(call("abs", &[Value::Int(-4)]).unwrap(), Value::Int(4));
    }

    #[test]
    fn sqrt_always_returns_float() {
        assert_eq!(call("sqrt", &[Value::Int(4)]).unwrap(), Value::Float(2.0));
    }

    #[test]
    fn unknown_function_is_a_name_error() {
        assert!(matches!(call("bogus", &[]), Err(Error::Name(_))));
    }
}
