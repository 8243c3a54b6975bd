//! Whole-pipeline scenarios: source text in, a [`Value`] or an error out,
//! exercising lexer, parser, compiler, and VM together the way a Driver
//! front end does.

use loom_core::driver;
use loom_core::value::Value;
use pretty_assertions::assert_eq;

fn eval(source: &str) -> Value {
    driver::run(source).unwrap_or_else(|err| panic!("{source:?} failed: {err}"))
}

#[test]
fn precedence_product_before_sum() {
    assert_eq!(eval("1 + 2 * 3;").numeric().unwrap(), 7.0);
}

#[test]
fn declare_then_assign_then_read() {
    assert_eq!(eval("x := 10; x = x + 1; return x;").numeric().unwrap(), 11.0);
}

#[test]
fn named_function_definition_via_call_lhs() {
    assert_eq!(eval("f(a, b) = a + b; return f(3, 4);").numeric().unwrap(), 7.0);
}

#[test]
fn else_if_chaining_via_nested_if() {
    let v = eval("return if false then 1 else if true then 2 else 3;");
    assert_eq!(v.numeric().unwrap(), 2.0);
}

#[test]
fn model_instantiation_and_dot_subscript() {
    let v = eval("v := model(x, y); p := v(2, 5); return p.x;");
    assert_eq!(v.numeric().unwrap(), 2.0);
}

#[test]
fn match_falls_through_to_matching_arm() {
    let v = eval("return match 2 where | 1 -> \"one\", | 2 -> \"two\", | _ -> \"many\";");
    match v {
        Value::String(s) => assert_eq!(&*s, "two"),
        other => panic!("expected a string, got {other:?}"),
    }
}

#[test]
fn equality_never_coerces_across_variants() {
    assert!(!eval("return 1 == \"1\";").is_truthy());
    assert!(eval("return 1 == 1;").is_truthy());
}

#[test]
fn division_by_zero_follows_ieee_754_instead_of_erroring() {
    assert!(eval("return 1 / 0;").numeric().unwrap().is_infinite());
    assert!(eval("return 0 / 0;").numeric().unwrap().is_nan());
}

#[test]
fn empty_match_with_no_wildcard_evaluates_to_nil() {
    let v = eval("x := 5; return match x where | 1 -> 10;");
    assert!(matches!(v, Value::Nil));
}

#[test]
fn undeclared_store_name_walks_outward_to_the_nearest_scope() {
    let v = eval(
        "x := 1; if true then { x = 2; nil } else { nil }; return x;",
    );
    assert_eq!(v.numeric().unwrap(), 2.0);
}

#[test]
fn declare_name_always_targets_the_innermost_scope() {
    let v = eval(
        "x := 1; if true then { x := 2; nil } else { nil }; return x;",
    );
    assert_eq!(v.numeric().unwrap(), 1.0);
}
