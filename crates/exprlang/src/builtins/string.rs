//! `string.*` module-qualified builtins (spec §4.8).

use super::{arity_error, type_error};
use crate::error::{Error, Result};
use crate::value::Value;

fn as_str<'a>(name: &str, v: &'a Value) -> Result<&'a str> {
    v.as_str().ok_or_else(|| type_error(name, "a string", v))
}

pub fn call(name: &str, args: &[Value]) -> Result<Value> {
    match name {
        "upper" => Ok(Value::string(one(name, args)?.to_uppercase())),
        "lower" => Ok(Value::string(one(name, args)?.to_lowercase())),
        "trim" => Ok(Value::string(one(name, args)?.trim())),
        "length" => Ok(Value::Int(one(name, args)?.chars().count() as i64)),
        "replace" => {
            let (s, from, to) = three(name, args)?;
            Ok(Value::string(s.replace(from, to)))
        }
        "contains" => {
            let (s, needle) = two(name, args)?;
            Ok(Value::Bool(s.contains(needle)))
        }
        "starts_with" => {
            let (s, prefix) = two(name, args)?;
            Ok(Value::Bool(s.starts_with(prefix)))
        }
        "ends_with" => {
            let (s, suffix) = two(name, args)?;
            Ok(Value::Bool(s.ends_with(suffix)))
        }
        "repeat" => {
            if args.len() != 2 {
                return Err(arity_error("string.repeat", args.len()));
            }
            let s = as_str("string.repeat", &args[0])?;
            let n = args[1].as_int().ok_or_else(|| type_error("string.repeat", "an int", &args[1]))?;
            Ok(Value::string(s.repeat(n.max(0) as usize)))
        }
        _ => Err(Error::name(format!("unknown function `string.{name}`"), None)),
    }
}

fn one<'a>(name: &str, args: &'a [Value]) -> Result<&'a str> {
    if args.len() != 1 {
        return Err(arity_error(name, args.len()));
    }
    as_str(name, &args[0])
}

fn two<'a>(name: &str, args: &'a [Value]) -> Result<(&'a str, &'a str)> {
    if args.len() != 2 {
        return Err(arity_error(name, args.len()));
    }
    Ok((as_str(name, &args[0])?, as_str(name, &args[1])?))
}

fn three<'a>(name: &str, args: &'a [Value]) -> Result<(&'a str, &'a str, &'a str)> {
    if args.len() != 3 {
        return Err(arity_error(name, args.len()));
    }
    Ok((as_str(name, &args[0])?, as_str(name, &args[1])?, as_str(name, &args[2])?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upper_is_unicode_aware() {
        assert_eq!(call("upper", &[Value::string("café")]).unwrap(), Value::string("CAFÉ"));
    }

    #[test]
    fn replace_substitutes_all_occurrences() {
        let args = [Value::string("a-b-c"), Value::string("-"), Value::string("_")];
        assert_eq!(call("replace", &args).unwrap(), Value::string("a_b_c"));
    }
}
