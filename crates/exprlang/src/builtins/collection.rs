//! Pipeline-aware collection builtins (spec §4.8): `filter`, `map`,
//! `reduce`, `sort`, and friends. Each signature matches its pipe-lowered
//! form, where the piped value becomes the first positional argument —
//! `items | filter(#.active)` compiles to `filter(items, #.active)`.

use std::cmp::Ordering;
use std::rc::Rc;

use indexmap::IndexMap;
use regex::Regex;

use super::{arity_error, type_error, Invoker};
use crate::error::{Error, Result};
use crate::types::TypeInfo;
use crate::value::{MapKey, Value};

fn as_slice<'a>(name: &str, v: &'a Value) -> Result<&'a [Value]> {
    match v {
        Value::Slice(s) => Ok(&s.elems),
        other => Err(type_error(name, "a slice", other)),
    }
}

fn as_str<'a>(name: &str, v: &'a Value) -> Result<&'a str> {
    v.as_str().ok_or_else(|| type_error(name, "a string", v))
}

pub fn filter(args: &[Value], invoker: &mut dyn Invoker) -> Result<Value> {
    let elems = as_slice("filter", &args[0])?;
    let pred = &args[1];
    let mut out = Vec::new();
    for e in elems {
        if invoker.call(pred, std::slice::from_ref(e))?.is_truthy() {
            out.push(e.clone());
        }
    }
    let elem_type = args[0].type_info().elem.map_or_else(TypeInfo::interface, |t| (*t).clone());
    Ok(Value::slice(out, elem_type))
}

pub fn map(args: &[Value], invoker: &mut dyn Invoker) -> Result<Value> {
    let elems = as_slice("map", &args[0])?;
    let f = &args[1];
    let mut out = Vec::with_capacity(elems.len());
    for e in elems {
        out.push(invoker.call(f, std::slice::from_ref(e))?);
    }
    Ok(Value::slice(out, TypeInfo::interface()))
}

pub fn reduce(args: &[Value], invoker: &mut dyn Invoker) -> Result<Value> {
    let elems = as_slice("reduce", &args[0])?;
    let f = &args[1];
    let mut iter = elems.iter();
    let mut acc = if args.len() == 3 {
        args[2].clone()
    } else {
        iter.next().cloned().ok_or_else(|| {
            Error::runtime("`reduce` on an empty slice requires an initial value", None)
        })?
    };
    for e in iter {
        acc = invoker.call(f, &[acc, e.clone()])?;
    }
    Ok(acc)
}

pub fn sort(args: &[Value], invoker: &mut dyn Invoker) -> Result<Value> {
    let elems = as_slice("sort", &args[0])?;
    let mut out: Vec<Value> = elems.to_vec();
    if args.len() == 2 {
        let key_fn = &args[1];
        let mut keyed: Vec<(Value, Value)> =
            out.into_iter().map(|e| Ok((invoker.call(key_fn, std::slice::from_ref(&e))?, e))).collect::<Result<_>>()?;
        keyed.sort_by(|a, b| compare_values(&a.0, &b.0));
        out = keyed.into_iter().map(|(_, e)| e).collect();
    } else {
        out.sort_by(compare_values);
    }
    Ok(Value::slice(out, args[0].type_info().elem.map_or_else(TypeInfo::interface, |t| (*t).clone())))
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::Float(x), Value::Float(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => a.as_f64().zip(b.as_f64()).map_or(Ordering::Equal, |(x, y)| x.partial_cmp(&y).unwrap_or(Ordering::Equal)),
    }
}

pub fn reverse(args: &[Value], _: &mut dyn Invoker) -> Result<Value> {
    let mut out = as_slice("reverse", &args[0])?.to_vec();
    out.reverse();
    Ok(Value::slice(out, args[0].type_info().elem.map_or_else(TypeInfo::interface, |t| (*t).clone())))
}

pub fn take(args: &[Value], _: &mut dyn Invoker) -> Result<Value> {
    let elems = as_slice("take", &args[0])?;
    let n = args[1].as_int().ok_or_else(|| type_error("take", "an int", &args[1]))?.max(0) as usize;
    let out = elems.iter().take(n).cloned().collect();
    Ok(Value::slice(out, args[0].type_info().elem.map_or_else(TypeInfo::interface, |t| (*t).clone())))
}

pub fn skip(args: &[Value], _: &mut dyn Invoker) -> Result<Value> {
    let elems = as_slice("skip", &args[0])?;
    let n = args[1].as_int().ok_or_else(|| type_error("skip", "an int", &args[1]))?.max(0) as usize;
    let out = elems.iter().skip(n).cloned().collect();
    Ok(Value::slice(out, args[0].type_info().elem.map_or_else(TypeInfo::interface, |t| (*t).clone())))
}

pub fn join(args: &[Value], _: &mut dyn Invoker) -> Result<Value> {
    let elems = as_slice("join", &args[0])?;
    let sep = if args.len() == 2 { as_str("join", &args[1])? } else { "" };
    let parts: Vec<String> = elems.iter().map(ToString::to_string).collect();
    Ok(Value::string(parts.join(sep)))
}

pub fn split(args: &[Value], _: &mut dyn Invoker) -> Result<Value> {
    let s = as_str("split", &args[0])?;
    let sep = as_str("split", &args[1])?;
    let parts: Vec<Value> = if sep.is_empty() {
        s.chars().map(|c| Value::string(c.to_string())).collect()
    } else {
        s.split(sep).map(Value::string).collect()
    };
    Ok(Value::slice(parts, TypeInfo::string()))
}

pub fn pattern_match(args: &[Value], _: &mut dyn Invoker) -> Result<Value> {
    let s = as_str("match", &args[0])?;
    let pattern = as_str("match", &args[1])?;
    let re = Regex::new(pattern).map_err(|e| Error::runtime(format!("invalid pattern: {e}"), None))?;
    Ok(Value::Bool(re.is_match(s)))
}

pub fn sum(args: &[Value], _: &mut dyn Invoker) -> Result<Value> {
    let elems = as_slice("sum", &args[0])?;
    if elems.iter().all(|e| matches!(e, Value::Int(_))) {
        let total: i64 = elems.iter().filter_map(Value::as_int).sum();
        return Ok(Value::Int(total));
    }
    let total: f64 = elems.iter().filter_map(Value::as_f64).sum();
    Ok(Value::Float(total))
}

pub fn avg(args: &[Value], invoker: &mut dyn Invoker) -> Result<Value> {
    let elems = as_slice("avg", &args[0])?;
    if elems.is_empty() {
        return Ok(Value::Float(0.0));
    }
    let total = sum(args, invoker)?.as_f64().expect("sum always returns a numeric value");
    Ok(Value::Float(total / elems.len() as f64))
}

pub fn count(args: &[Value], invoker: &mut dyn Invoker) -> Result<Value> {
    let elems = as_slice("count", &args[0])?;
    if args.len() == 1 {
        return Ok(Value::Int(elems.len() as i64));
    }
    let pred = &args[1];
    let mut n = 0i64;
    for e in elems {
        if invoker.call(pred, std::slice::from_ref(e))?.is_truthy() {
            n += 1;
        }
    }
    Ok(Value::Int(n))
}

pub fn len(args: &[Value], _: &mut dyn Invoker) -> Result<Value> {
    let n = match &args[0] {
        Value::Slice(s) => s.elems.len(),
        Value::Map(m) => m.entries.len(),
        Value::String(s) => s.chars().count(),
        other => return Err(type_error("len", "a slice, map, or string", other)),
    };
    Ok(Value::Int(n as i64))
}

pub fn unique(args: &[Value], _: &mut dyn Invoker) -> Result<Value> {
    let elems = as_slice("unique", &args[0])?;
    let mut out: Vec<Value> = Vec::with_capacity(elems.len());
    for e in elems {
        if !out.contains(e) {
            out.push(e.clone());
        }
    }
    Ok(Value::slice(out, args[0].type_info().elem.map_or_else(TypeInfo::interface, |t| (*t).clone())))
}

pub fn first(args: &[Value], _: &mut dyn Invoker) -> Result<Value> {
    Ok(as_slice("first", &args[0])?.first().cloned().unwrap_or(Value::Nil))
}

pub fn last(args: &[Value], _: &mut dyn Invoker) -> Result<Value> {
    Ok(as_slice("last", &args[0])?.last().cloned().unwrap_or(Value::Nil))
}

pub fn max(args: &[Value], _: &mut dyn Invoker) -> Result<Value> {
    let elems = as_slice("max", &args[0])?;
    Ok(elems.iter().max_by(|a, b| compare_values(a, b)).cloned().unwrap_or(Value::Nil))
}

pub fn min(args: &[Value], _: &mut dyn Invoker) -> Result<Value> {
    let elems = as_slice("min", &args[0])?;
    Ok(elems.iter().min_by(|a, b| compare_values(a, b)).cloned().unwrap_or(Value::Nil))
}

pub fn all(args: &[Value], invoker: &mut dyn Invoker) -> Result<Value> {
    let elems = as_slice("all", &args[0])?;
    let pred = &args[1];
    for e in elems {
        if !invoker.call(pred, std::slice::from_ref(e))?.is_truthy() {
            return Ok(Value::Bool(false));
        }
    }
    Ok(Value::Bool(true))
}

pub fn any(args: &[Value], invoker: &mut dyn Invoker) -> Result<Value> {
    let elems = as_slice("any", &args[0])?;
    let pred = &args[1];
    for e in elems {
        if invoker.call(pred, std::slice::from_ref(e))?.is_truthy() {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

/// Groups `elems` by `keyFn(e)`, stringified the same way a map literal
/// stringifies its keys (`DESIGN.md`'s Map-key resolution), preserving
/// first-seen group order and each group's element order.
pub fn group_by(args: &[Value], invoker: &mut dyn Invoker) -> Result<Value> {
    let elems = as_slice("groupBy", &args[0])?;
    let key_fn = &args[1];
    let mut groups: IndexMap<MapKey, Vec<Value>> = IndexMap::new();
    for e in elems {
        let key = invoker.call(key_fn, std::slice::from_ref(e))?;
        let key: MapKey = key.to_string().into();
        groups.entry(key).or_default().push(e.clone());
    }
    let entries: IndexMap<MapKey, Value> = groups
        .into_iter()
        .map(|(k, v)| (k, Value::slice(v, TypeInfo::interface())))
        .collect();
    Ok(Value::map(entries, TypeInfo::string(), TypeInfo::slice(TypeInfo::interface())))
}

/// `collection.*` module-qualified functions (spec §4.8): a smaller set of
/// pure helpers that don't need pipe-lowering and never take a callback.
pub fn call_module(name: &str, args: &[Value]) -> Result<Value> {
    match name {
        "chunk" => chunk(args),
        "flatten" => flatten(args),
        "contains" => contains(args),
        "keys" => keys(args),
        "values" => values(args),
        _ => Err(Error::name(format!("unknown function `collection.{name}`"), None)),
    }
}

fn chunk(args: &[Value]) -> Result<Value> {
    if args.len() != 2 {
        return Err(arity_error("collection.chunk", args.len()));
    }
    let elems = as_slice("collection.chunk", &args[0])?;
    let size = args[1].as_int().ok_or_else(|| type_error("collection.chunk", "an int", &args[1]))?;
    if size <= 0 {
        return Err(Error::argument("collection.chunk size must be positive", None));
    }
    let out = elems
        .chunks(size as usize)
        .map(|c| Value::slice(c.to_vec(), TypeInfo::interface()))
        .collect();
    Ok(Value::slice(out, TypeInfo::interface()))
}

fn flatten(args: &[Value]) -> Result<Value> {
    if args.len() != 1 {
        return Err(arity_error("collection.flatten", args.len()));
    }
    let elems = as_slice("collection.flatten", &args[0])?;
    let mut out = Vec::new();
    for e in elems {
        match e {
            Value::Slice(inner) => out.extend(inner.elems.iter().cloned()),
            other => out.push(other.clone()),
        }
    }
    Ok(Value::slice(out, TypeInfo::interface()))
}

fn contains(args: &[Value]) -> Result<Value> {
    if args.len() != 2 {
        return Err(arity_error("collection.contains", args.len()));
    }
    match &args[0] {
        Value::Slice(s) => Ok(Value::Bool(s.elems.contains(&args[1]))),
        Value::String(s) => {
            let needle = as_str("collection.contains", &args[1])?;
            Ok(Value::Bool(s.contains(needle)))
        }
        other => Err(type_error("collection.contains", "a slice or string", other)),
    }
}

fn keys(args: &[Value]) -> Result<Value> {
    if args.len() != 1 {
        return Err(arity_error("collection.keys", args.len()));
    }
    match &args[0] {
        Value::Map(m) => Ok(Value::slice(
            m.entries.keys().map(|k| Value::String(Rc::clone(k))).collect(),
            TypeInfo::string(),
        )),
        other => Err(type_error("collection.keys", "a map", other)),
    }
}

fn values(args: &[Value]) -> Result<Value> {
    if args.len() != 1 {
        return Err(arity_error("collection.values", args.len()));
    }
    match &args[0] {
        Value::Map(m) => Ok(Value::slice(m.entries.values().cloned().collect(), TypeInfo::interface())),
        other => Err(type_error("collection.values", "a map", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopInvoker;
    impl Invoker for NoopInvoker {
        fn call(&mut self, _callee: &Value, _args: &[Value]) -> Result<Value> {
            unreachable!("tests below never invoke a callback")
        }
    }

    #[test]
    fn len_counts_chars_not_bytes() {
        let mut inv = NoopInvoker;
        let v = len(&[Value::string("héllo")], &mut inv).unwrap();
        assert_eq!(v, Value::Int(5));
    }

    #[test]
    fn sum_stays_int_when_all_elements_are_int() {
        let mut inv = NoopInvoker;
        let slice = Value::slice(vec![Value::Int(1), Value::Int(2)], TypeInfo::int());
        assert_eq!(sum(&[slice], &mut inv).unwrap(), Value::Int(3));
    }

    #[test]
    fn unique_preserves_first_occurrence_order() {
        let mut inv = NoopInvoker;
        let slice = Value::slice(vec![Value::Int(1), Value::Int(2), Value::Int(1)], TypeInfo::int());
        let result = unique(&[slice], &mut inv).unwrap();
        assert_eq!(result.to_string(), "[1, 2]");
    }

    struct FnInvoker<F>(F);
    impl<F: FnMut(&[Value]) -> Value> Invoker for FnInvoker<F> {
        fn call(&mut self, _callee: &Value, args: &[Value]) -> Result<Value> {
            Ok((self.0)(args))
        }
    }

    #[test]
    fn all_is_true_only_when_every_element_satisfies_the_predicate() {
        let mut inv = FnInvoker(|args: &[Value]| Value::Bool(args[0].as_int().unwrap() > 0));
        let slice = Value::slice(vec![Value::Int(1), Value::Int(2)], TypeInfo::int());
        assert_eq!(all(&[slice], &mut inv).unwrap(), Value::Bool(true));

        let mut inv = FnInvoker(|args: &[Value]| Value::Bool(args[0].as_int().unwrap() > 0));
        let slice = Value::slice(vec![Value::Int(1), Value::Int(-2)], TypeInfo::int());
        assert_eq!(all(&[slice], &mut inv).unwrap(), Value::Bool(false));
    }

    #[test]
    fn any_is_true_when_at_least_one_element_satisfies_the_predicate() {
        let mut inv = FnInvoker(|args: &[Value]| Value::Bool(args[0].as_int().unwrap() > 0));
        let slice = Value::slice(vec![Value::Int(-1), Value::Int(-2)], TypeInfo::int());
        assert_eq!(any(&[slice.clone()], &mut inv).unwrap(), Value::Bool(false));

        let mut inv = FnInvoker(|args: &[Value]| Value::Bool(args[0].as_int().unwrap() > 0));
        let slice = Value::slice(vec![Value::Int(-1), Value::Int(2)], TypeInfo::int());
        assert_eq!(any(&[slice], &mut inv).unwrap(), Value::Bool(true));
    }

    #[test]
    fn group_by_buckets_elements_under_their_stringified_key() {
        let mut inv = FnInvoker(|args: &[Value]| Value::Bool(args[0].as_int().unwrap() % 2 == 0));
        let slice = Value::slice(vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)], TypeInfo::int());
        let result = group_by(&[slice], &mut inv).unwrap();
        assert_eq!(result.to_string(), "{false: [1, 3], true: [2, 4]}");
    }
}
