//! The host-function registry (spec's `print`, `echo`, `len`, `typeof`).
//!
//! Builtins are ordinary [`crate::value::Value::Builtin`]s: the compiler
//! resolves a call whose callee is an identifier matching one of these names
//! to a `LOAD_CONST` of the builtin value (instead of `LOAD_NAME`), and the
//! VM dispatches it through the same `CALL_FUNCTION` path as a guest
//! function. Grounded on the original's `object.Builtins` registry, trimmed
//! to the four names the spec calls out.

use crate::errors::VmError;
use crate::value::{Builtin, Value};

/// `print(x)`: writes `x` followed by a newline to stdout, returns `Nil`.
fn print(args: &[Value]) -> Result<Value, VmError> {
    println!("{}", display_arg(&args[0]));
    Ok(Value::Nil)
}

/// `echo(x)`: writes `x` with no trailing newline, returns `Nil`.
fn echo(args: &[Value]) -> Result<Value, VmError> {
    print!("{}", display_arg(&args[0]));
    Ok(Value::Nil)
}

/// A string prints without its debug quoting; everything else uses `Display`.
fn display_arg(v: &Value) -> String {
    match v {
        Value::String(s) => s.to_string(),
        other => other.to_string(),
    }
}

/// `len(x)`: the number of items in any collection (`Items()`-capable) value.
fn len(args: &[Value]) -> Result<Value, VmError> {
    let items = args[0].items()?;
    Ok(Value::Number(items.len() as f64))
}

/// `typeof(x)`: the name of `x`'s variant, as a string.
fn typeof_(args: &[Value]) -> Result<Value, VmError> {
    Ok(Value::string(args[0].type_name()))
}

const REGISTRY: &[Builtin] = &[
    Builtin { name: "print", arity: Some(1), func: print },
    Builtin { name: "echo", arity: Some(1), func: echo },
    Builtin { name: "len", arity: Some(1), func: len },
    Builtin { name: "typeof", arity: Some(1), func: typeof_ },
];

/// Looks up a guest-visible name in the builtin registry.
pub fn lookup(name: &str) -> Option<&'static Builtin> {
    REGISTRY.iter().find(|b| b.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn len_counts_list_items() {
        let list = Value::list(vec![Value::Number(1.0), Value::Number(2.0)]);
        assert_eq!(len(&[list]).unwrap().to_string(), "2");
    }

    #[test]
    fn typeof_reports_variant_name() {
        assert_eq!(typeof_(&[Value::Number(1.0)]).unwrap().to_string(), "\"number\"");
    }

    #[test]
    fn unknown_name_is_not_registered() {
        assert!(lookup("nope").is_none());
    }
}
