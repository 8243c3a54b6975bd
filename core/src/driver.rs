//! Wires lexer → parser → compiler → VM together (spec §6): one place for
//! a front-end (REPL or file runner) to turn source text into a value or a
//! formatted error, sharing the crate's public [`Error`] type so both
//! front-ends report failures the same way.

use std::rc::Rc;

use crate::compiler;
use crate::errors::{Error, VmError};
use crate::parser;
use crate::value::Value;
use crate::vm::{Vm, VmOutcome};

/// Lexes, parses, compiles, and runs `source` as a standalone program,
/// returning the value its last statement left on the stack (or `Nil` if
/// it produced none).
pub fn run(source: &str) -> Result<Value, Error> {
    let program = parser::parse(source)?;
    let code = compiler::compile(&program)?;
    let (mut vm, _handle) = Vm::new();
    match vm.eval(Rc::new(code))? {
        VmOutcome::Value(value) => Ok(value),
        VmOutcome::Stopped => Err(Error::Vm(VmError::internal_error(
            "vm stopped before finishing, but no interrupt source was armed",
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_a_complete_program() {
        let value = run("x := 2; y := 3; return x * y;").unwrap();
        assert_eq!(value.numeric().unwrap(), 6.0);
    }

    #[test]
    fn surfaces_a_parse_error() {
        assert!(run("x := ;").is_err());
    }

    #[test]
    fn surfaces_a_runtime_error() {
        let err = run("return unknown_name;").unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::Name);
    }
}
