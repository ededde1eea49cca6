//! `util.*` module-qualified builtins (spec §4.8): small host-facing
//! helpers that don't belong to a single value kind.

use super::arity_error;
use crate::error::{Error, Result};
use crate::value::Value;

pub fn call(name: &str, args: &[Value]) -> Result<Value> {
    match name {
        "default" => {
            if args.len() != 2 {
                return Err(arity_error("util.default", args.len()));
            }
            Ok(if matches!(args[0], Value::Nil) { args[1].clone() } else { args[0].clone() })
        }
        "coalesce" => Ok(args.iter().find(|v| !matches!(v, Value::Nil)).cloned().unwrap_or(Value::Nil)),
        "type_of" => {
            if args.len() != 1 {
                return Err(arity_error("util.type_of", args.len()));
            }
            Ok(Value::string(args[0].type_info().to_string()))
        }
        _ => Err(Error::name(format!("unknown function `util.{name}`"), None)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_falls_back_only_on_nil() {
        assert_eq!(call("default", &[Value::Nil, Value::Int(3)]).unwrap(), Value::Int(3));
        assert_eq!(call("default", &[Value::Int(1), Value::Int(3)]).unwrap(), Value::Int(1));
    }

    #[test]
    fn coalesce_returns_first_non_nil() {
        let args = [Value::Nil, Value::Nil, Value::Int(5)];
        assert_eq!(call("coalesce", &args).unwrap(), Value::Int(5));
    }

    #[test]
    fn type_of_reports_the_display_name() {
        assert_eq!(call("type_of", &[Value::Int(1)]).unwrap(), Value::string("int"));
    }
}
