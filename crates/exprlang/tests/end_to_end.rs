//! Black-box coverage through the public `eval`/`compile`/`run` surface
//! only: the universal properties and the concrete end-to-end scenarios.

use indexmap::IndexMap;
use pretty_assertions::assert_eq;

use exprlang::{compile, compile_with, eval, run, EmptyEnvironment, HashMapEnvironment, Options, TypeInfo, Value};

fn int(n: i64) -> Value {
    Value::Int(n)
}

fn nil_env() -> EmptyEnvironment {
    EmptyEnvironment
}

// --- Concrete end-to-end scenarios (table in §8) -------------------------

#[test]
fn scenario_1_precedence() {
    assert_eq!(eval("1 + 2 * 3", &nil_env()).unwrap(), int(7));
}

#[test]
fn scenario_2_parens_override_precedence() {
    assert_eq!(eval("(2 + 3) * 4", &nil_env()).unwrap(), int(20));
}

#[test]
fn scenario_3_string_concatenation() {
    assert_eq!(
        eval(r#""hello" + " " + "world""#, &nil_env()).unwrap(),
        Value::string("hello world")
    );
}

#[test]
fn scenario_4_logical_and_over_env_vars() {
    let env = HashMapEnvironment::new().with("age", 30i64).with("name", "Alice");
    assert_eq!(
        eval(r#"age > 18 && name == "Alice""#, &env).unwrap(),
        Value::Bool(true)
    );
}

#[test]
fn scenario_5_filter_then_map_pipeline() {
    let got = eval("[1,2,3,4,5] | filter(# > 2) | map(# * 10)", &nil_env()).unwrap();
    assert_eq!(got, Value::slice(vec![int(30), int(40), int(50)], TypeInfo::int()));
}

#[test]
fn scenario_6_type_methods_inside_pipeline_placeholders() {
    let got = eval(
        r#"["hi","hello","world"] | filter(#.length() > 4) | map(#.upper())"#,
        &nil_env(),
    )
    .unwrap();
    assert_eq!(
        got,
        Value::slice(vec![Value::string("HELLO"), Value::string("WORLD")], TypeInfo::string())
    );
}

#[test]
fn scenario_7_optional_chaining_and_null_coalescing() {
    let mut entries = IndexMap::new();
    entries.insert("profile".into(), Value::Nil);
    let user = Value::map(entries, TypeInfo::string(), TypeInfo::interface());
    let env = HashMapEnvironment::new().with("user", user);

    assert_eq!(
        eval(r#"user?.profile?.name ?? "anon""#, &env).unwrap(),
        Value::string("anon")
    );
}

#[test]
fn scenario_8_pipe_between_two_int_literals_is_bitwise_or() {
    assert_eq!(eval("5 | 3", &nil_env()).unwrap(), int(7));
}

#[test]
fn scenario_9_pipeline_over_an_env_supplied_slice() {
    let data = Value::slice(vec![int(-1), int(0), int(1), int(2)], TypeInfo::int());
    let env = HashMapEnvironment::new().with("data", data);
    let got = eval("data | filter(# > 0)", &env).unwrap();
    assert_eq!(got, Value::slice(vec![int(1), int(2)], TypeInfo::int()));
}

#[test]
fn scenario_10_pow_is_right_associative() {
    // 2 ** (3 ** 2) == 2 ** 9 == 512, not (2 ** 3) ** 2 == 64.
    assert_eq!(eval("2 ** 3 ** 2", &nil_env()).unwrap(), int(512));
}

// --- Universal properties (§8) --------------------------------------------

#[test]
fn determinism_repeated_runs_of_the_same_program_agree() {
    let program = compile("(1 + 2) * (3 - 4) / 5").unwrap();
    let first = run(&program, &nil_env()).unwrap();
    for _ in 0..10 {
        assert_eq!(run(&program, &nil_env()).unwrap(), first);
    }
}

#[test]
fn lexing_is_insensitive_to_incidental_whitespace() {
    let a = eval("1+2*3", &nil_env()).unwrap();
    let b = eval(" 1  +  2 *   3 ", &nil_env()).unwrap();
    let c = eval("1\n+\t2*3", &nil_env()).unwrap();
    assert_eq!(a, int(7));
    assert_eq!(a, b);
    assert_eq!(b, c);
}

#[test]
fn reparsing_the_same_source_yields_programs_that_run_identically() {
    let source = "[1,2,3] | filter(# > 1) | map(# + 1)";
    let first = eval(source, &nil_env()).unwrap();
    let second = eval(source, &nil_env()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn constant_folding_does_not_change_the_result_of_a_closed_expression() {
    let folded = eval_with_optimization("2 * (3 + 4) - 1", true);
    let unfolded = eval_with_optimization("2 * (3 + 4) - 1", false);
    assert_eq!(folded, unfolded);
    assert_eq!(folded, int(13));
}

fn eval_with_optimization(source: &str, enable: bool) -> Value {
    let options = Options::new().with_optimization(enable);
    let program = compile_with(source, &options).unwrap();
    run(&program, &nil_env()).unwrap()
}

#[test]
fn commutative_filter_stages_produce_the_same_ordered_result_either_way() {
    let data = Value::slice(
        vec![int(1), int(2), int(3), int(4), int(5), int(6)],
        TypeInfo::int(),
    );
    let env = HashMapEnvironment::new().with("xs", data);
    let a = eval("xs | filter(# > 2) | filter(# % 2 == 0)", &env).unwrap();
    let b = eval("xs | filter(# % 2 == 0) | filter(# > 2)", &env).unwrap();
    assert_eq!(a, b);
    assert_eq!(a, Value::slice(vec![int(4), int(6)], TypeInfo::int()));
}

#[test]
fn optional_chaining_short_circuits_to_nil_through_a_nil_intermediate() {
    let env = HashMapEnvironment::new().with("user", Value::Nil);
    assert_eq!(eval("user?.profile?.name", &env).unwrap(), Value::Nil);
}

#[test]
fn null_coalescing_picks_the_left_side_when_it_is_non_nil() {
    let env = HashMapEnvironment::new().with("x", 5i64);
    assert_eq!(eval("x ?? 99", &env).unwrap(), int(5));
}

#[test]
fn null_coalescing_falls_back_to_the_right_side_when_left_is_nil() {
    let env = HashMapEnvironment::new().with("x", Value::Nil);
    assert_eq!(eval("x ?? 99", &env).unwrap(), int(99));
}

#[test]
fn short_circuit_and_never_evaluates_a_failing_right_operand() {
    // `1 / 0` would raise Error::Runtime if evaluated; `false && ...` must
    // not reach it.
    assert_eq!(eval("false && (1 / 0 > 0)", &nil_env()).unwrap(), Value::Bool(false));
}

#[test]
fn short_circuit_or_never_evaluates_a_failing_right_operand() {
    assert_eq!(eval("true || (1 / 0 > 0)", &nil_env()).unwrap(), Value::Bool(true));
}
