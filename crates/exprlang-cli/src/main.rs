//! `exprc` — a thin command-line front end for the `exprlang` crate.
//!
//! Reads an expression (inline via `-e` or from a file), an optional JSON
//! environment file, evaluates it, and prints the resulting value or a
//! formatted diagnostic. Ambient tooling around the library, not part of
//! its core; stays deliberately small.

use std::rc::Rc;
use std::{env, fs, process::ExitCode};

use exprlang::{Error, HashMapEnvironment, TypeInfo, Value};
use indexmap::IndexMap;

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    let cli = match Cli::parse(&args[1..]) {
        Ok(cli) => cli,
        Err(message) => {
            eprintln!("error: {message}");
            eprintln!("usage: exprc (-e <expr> | <file>) [--env <env.json>]");
            return ExitCode::FAILURE;
        }
    };

    let source = match cli.source {
        Source::Inline(expr) => expr,
        Source::File(path) => match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) => {
                eprintln!("error reading {path}: {err}");
                return ExitCode::FAILURE;
            }
        },
    };

    let environment = match cli.env_path {
        Some(path) => match load_environment(&path) {
            Ok(env) => env,
            Err(message) => {
                eprintln!("error reading environment {path}: {message}");
                return ExitCode::FAILURE;
            }
        },
        None => HashMapEnvironment::new(),
    };

    match exprlang::eval(&source, &environment) {
        Ok(value) => {
            println!("{value}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{}", format_error(&err));
            ExitCode::FAILURE
        }
    }
}

enum Source {
    Inline(String),
    File(String),
}

struct Cli {
    source: Source,
    env_path: Option<String>,
}

impl Cli {
    fn parse(args: &[String]) -> Result<Self, String> {
        let mut source = None;
        let mut env_path = None;
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "-e" | "--expr" => {
                    let expr = iter.next().ok_or("-e requires an expression argument")?;
                    source = Some(Source::Inline(expr.clone()));
                }
                "--env" => {
                    let path = iter.next().ok_or("--env requires a file path")?;
                    env_path = Some(path.clone());
                }
                path if source.is_none() => source = Some(Source::File(path.to_owned())),
                unexpected => return Err(format!("unexpected argument `{unexpected}`")),
            }
        }
        Ok(Self {
            source: source.ok_or("no expression given: pass -e <expr> or a file path")?,
            env_path,
        })
    }
}

fn load_environment(path: &str) -> Result<HashMapEnvironment, String> {
    let contents = fs::read_to_string(path).map_err(|err| err.to_string())?;
    let parsed: serde_json::Value = serde_json::from_str(&contents).map_err(|err| err.to_string())?;
    let serde_json::Value::Object(fields) = parsed else {
        return Err("environment file must contain a JSON object".to_owned());
    };
    let mut env = HashMapEnvironment::new();
    for (name, value) in fields {
        env.insert(name, json_to_value(&value));
    }
    Ok(env)
}

/// Converts a parsed JSON document into an `exprlang` `Value`, narrowing
/// every JSON number to `Value::Int` when it round-trips losslessly.
fn json_to_value(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Nil,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => n.as_i64().map_or_else(
            || Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            Value::Int,
        ),
        serde_json::Value::String(s) => Value::string(s.clone()),
        serde_json::Value::Array(items) => {
            let elems: Vec<Value> = items.iter().map(json_to_value).collect();
            let elem_type = elems.first().map_or_else(TypeInfo::interface, Value::type_info);
            Value::slice(elems, elem_type)
        }
        serde_json::Value::Object(fields) => {
            let entries: IndexMap<Rc<str>, Value> =
                fields.iter().map(|(k, v)| (Rc::from(k.as_str()), json_to_value(v))).collect();
            let value_type = entries.values().next().map_or_else(TypeInfo::interface, Value::type_info);
            Value::map(entries, TypeInfo::string(), value_type)
        }
    }
}

fn format_error(err: &Error) -> String {
    format!("{err}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_inline_expression_flag() {
        let cli = Cli::parse(&["-e".to_owned(), "1 + 1".to_owned()]).unwrap();
        assert!(matches!(cli.source, Source::Inline(ref s) if s == "1 + 1"));
    }

    #[test]
    fn parses_file_path_without_flag() {
        let cli = Cli::parse(&["expr.exprlang".to_owned()]).unwrap();
        assert!(matches!(cli.source, Source::File(ref s) if s == "expr.exprlang"));
    }

    #[test]
    fn rejects_missing_source() {
        assert!(Cli::parse(&[]).is_err());
    }

    #[test]
    fn json_object_converts_to_a_map_shaped_value() {
        let parsed: serde_json::Value = serde_json::from_str(r#"{"a": 1, "b": "x"}"#).unwrap();
        let value = json_to_value(&parsed);
        assert_eq!(value.kind(), exprlang::Kind::Map);
    }

    #[test]
    fn json_number_without_fraction_becomes_int() {
        let parsed: serde_json::Value = serde_json::from_str("42").unwrap();
        assert_eq!(json_to_value(&parsed), Value::Int(42));
    }
}
