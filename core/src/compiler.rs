//! Single-pass, recursive-descent compiler: lowers an [`ast::Program`] into
//! a [`bytecode::CompiledCode`].
//!
//! Grounded on the original compiler's three side-table emission helpers
//! (`addConst`/`addName`/`addJump`, deduplicated the same way here) and its
//! statement/expression dispatch, adapted to this crate's [`Instruction`]
//! representation: where the original patches raw bytes in a `[]byte`, this
//! patches the `arg` field of an already-structured [`Instruction`] and lets
//! [`CompiledCode::jump_targets`] resolve byte offsets to indices lazily.

use std::rc::Rc;

use crate::ast::{Expr, InfixOp, MatchArm, PrefixOp, Program, Stmt};
use crate::builtins;
use crate::bytecode::{CompiledCode, Instruction, Op};
use crate::errors::ErrorKind;
use crate::value::{Function, Model, Value};

/// Constant/name/jump tables are indexed by a 16-bit argument; this is the
/// point past which a table can no longer grow.
const MAX_TABLE_SIZE: usize = 1 << 16;

#[derive(Debug, Clone, thiserror::Error, miette::Diagnostic, PartialEq)]
#[error("{kind} error: {message}")]
pub struct CompileError {
    pub kind: ErrorKind,
    pub message: String,
}

impl CompileError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        CompileError {
            kind,
            message: message.into(),
        }
    }

    pub fn argument_error(message: impl Into<String>) -> Self {
        CompileError::new(ErrorKind::Argument, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        CompileError::new(ErrorKind::Internal, message)
    }
}

/// Compiles a whole program. Each top-level statement is compiled in turn;
/// the last one, if an expression statement, leaves its value on the stack
/// (useful to a REPL evaluating one line at a time) while every earlier one
/// is popped to keep the stack from growing unbounded.
#[tracing::instrument(skip_all, fields(statements = program.len()))]
pub fn compile(program: &Program) -> Result<CompiledCode, CompileError> {
    let mut c = Compiler::default();
    for (i, stmt) in program.iter().enumerate() {
        let keep = i + 1 == program.len();
        c.compile_stmt_in_sequence(stmt, keep)?;
    }
    let code = c.finish();
    tracing::trace!(
        instructions = code.instructions.len(),
        constants = code.constants.len(),
        "compilation unit finished"
    );
    Ok(code)
}

#[derive(Default)]
struct Compiler {
    instructions: Vec<Instruction>,
    constants: Vec<Value>,
    names: Vec<String>,
    jumps: Vec<usize>,
}

impl Compiler {
    fn finish(self) -> CompiledCode {
        let mut code = CompiledCode {
            instructions: self.instructions,
            constants: self.constants,
            names: self.names,
            jumps: self.jumps,
            forward_decls: Vec::new(),
        };
        code.hoist_forward_declarations();
        code
    }

    fn here(&self) -> usize {
        self.instructions.len()
    }

    fn push_instr(&mut self, instr: Instruction) -> usize {
        let i = self.instructions.len();
        self.instructions.push(instr);
        i
    }

    fn emit(&mut self, op: Op) -> usize {
        self.push_instr(Instruction::bare(op))
    }

    fn emit_arg(&mut self, op: Op, arg: u16) -> usize {
        self.push_instr(Instruction::new(op, arg))
    }

    fn byte_offset(&self, index: usize) -> usize {
        self.instructions[..index].iter().map(|i| i.op.width()).sum()
    }

    fn add_const(&mut self, val: Value) -> Result<u16, CompileError> {
        for (i, existing) in self.constants.iter().enumerate() {
            if val.equals(existing) {
                return Ok(i as u16);
            }
        }
        let index = self.constants.len();
        if index >= MAX_TABLE_SIZE {
            return Err(CompileError::internal_error(
                "you've somehow managed to use 65,536 constants, good job",
            ));
        }
        self.constants.push(val);
        Ok(index as u16)
    }

    fn add_and_load(&mut self, val: Value) -> Result<u16, CompileError> {
        let idx = self.add_const(val)?;
        self.emit_arg(Op::LoadConst, idx);
        Ok(idx)
    }

    fn add_name(&mut self, name: &str) -> u16 {
        if let Some(i) = self.names.iter().position(|n| n == name) {
            return i as u16;
        }
        self.names.push(name.to_string());
        (self.names.len() - 1) as u16
    }

    fn compile_name_load(&mut self, name: &str) {
        let idx = self.add_name(name);
        self.emit_arg(Op::LoadName, idx);
    }

    fn add_jump_target(&mut self, byte_offset: usize) -> Result<u16, CompileError> {
        if let Some(i) = self.jumps.iter().position(|&t| t == byte_offset) {
            return Ok(i as u16);
        }
        let index = self.jumps.len();
        if index >= MAX_TABLE_SIZE {
            return Err(CompileError::internal_error(
                "you've somehow managed to use 65,536 jump targets, good job",
            ));
        }
        self.jumps.push(byte_offset);
        Ok(index as u16)
    }

    /// Patches the argument of a previously-emitted jump placeholder (at
    /// `instr_index`) to point at `target_instr_index`.
    fn patch_jump(&mut self, instr_index: usize, target_instr_index: usize) -> Result<(), CompileError> {
        let byte_offset = self.byte_offset(target_instr_index);
        let jump_index = self.add_jump_target(byte_offset)?;
        self.instructions[instr_index].arg = jump_index;
        Ok(())
    }

    fn emit_counted(&mut self, op: Op, n: usize) -> Result<(), CompileError> {
        let arg = u16::try_from(n)
            .map_err(|_| CompileError::internal_error("too many elements in a single literal"))?;
        self.emit_arg(op, arg);
        Ok(())
    }

    fn compile_stmt_in_sequence(&mut self, stmt: &Stmt, keep_value: bool) -> Result<(), CompileError> {
        match stmt {
            Stmt::Expr(e) => {
                self.compile_expr(e)?;
                if !keep_value {
                    self.emit(Op::Pop);
                }
            }
            Stmt::Return(value) => {
                if let Some(e) = value {
                    self.compile_expr(e)?;
                }
                self.emit(Op::Return);
            }
            Stmt::Break => {
                self.emit(Op::Break);
            }
            Stmt::Next => {
                self.emit(Op::Next);
            }
        }
        Ok(())
    }

    /// A block's statements, bracketed in their own scope. When
    /// `keep_last_value` is set (an `Expr::Block`, or a function body),
    /// the final expression statement's value survives as the block's
    /// result; an empty block then yields `Nil`. Loop bodies pass `false`
    /// since their statements are compiled purely for side effects.
    fn compile_stmt_sequence(&mut self, stmts: &[Stmt], keep_last_value: bool) -> Result<(), CompileError> {
        self.emit(Op::PushScope);
        if stmts.is_empty() {
            if keep_last_value {
                self.add_and_load(Value::Nil)?;
            }
        } else {
            for (i, stmt) in stmts.iter().enumerate() {
                let keep = keep_last_value && i + 1 == stmts.len();
                self.compile_stmt_in_sequence(stmt, keep)?;
            }
        }
        self.emit(Op::PopScope);
        Ok(())
    }

    fn compile_expr(&mut self, expr: &Expr) -> Result<(), CompileError> {
        match expr {
            Expr::Number(n) => {
                self.add_and_load(Value::Number(*n))?;
            }
            Expr::Bool(b) => {
                self.add_and_load(Value::Boolean(*b))?;
            }
            Expr::Nil => {
                self.add_and_load(Value::Nil)?;
            }
            Expr::Str(s) => {
                self.add_and_load(Value::string(s.clone()))?;
            }
            Expr::Ident(name) => self.compile_name_load(name),
            Expr::Unit => {
                return Err(CompileError::argument_error(
                    "'()' is only meaningful as an empty parameter list",
                ));
            }
            Expr::List(items) => {
                for item in items {
                    self.compile_expr(item)?;
                }
                self.emit_counted(Op::MakeList, items.len())?;
            }
            Expr::Map(pairs) => {
                for (k, v) in pairs {
                    self.compile_expr(k)?;
                    self.compile_expr(v)?;
                }
                self.emit_counted(Op::MakeMap, pairs.len())?;
            }
            Expr::Model(params) => {
                let names = params
                    .iter()
                    .map(|p| match p {
                        Expr::Ident(name) => Ok(name.clone()),
                        _ => Err(CompileError::argument_error("model parameters must be identifiers")),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                self.add_and_load(Value::Model(Rc::new(Model::new(names))))?;
            }
            Expr::Prefix { op, rhs } => self.compile_prefix(*op, rhs)?,
            Expr::Infix { op, lhs, rhs } => self.compile_infix(*op, lhs, rhs)?,
            Expr::Call { callee, arg } => self.compile_call(callee, arg.as_deref())?,
            Expr::Lambda { params, body } => {
                let names = parameter_names(params)?;
                let func = self.compile_function_value(&names, body)?;
                self.add_and_load(func)?;
            }
            Expr::If {
                cond,
                then_branch,
                else_branch,
            } => self.compile_if(cond, then_branch, else_branch)?,
            Expr::While { cond, body } => self.compile_while(cond, body)?,
            Expr::Loop { body } => self.compile_loop(body)?,
            Expr::For { name, iter, body } => self.compile_for(name, iter, body)?,
            Expr::Match { subject, arms } => self.compile_match(subject, arms)?,
            Expr::Block(stmts) => self.compile_stmt_sequence(stmts, true)?,
            Expr::Import { path: _, alias } => {
                // No module loader; the non-goal is real import resolution,
                // not the syntax. `Nil` keeps the expression well-typed.
                self.add_and_load(Value::Nil)?;
                if let Some(alias) = alias {
                    let idx = self.add_name(alias);
                    self.emit_arg(Op::DeclareName, idx);
                }
            }
        }
        Ok(())
    }

    fn compile_prefix(&mut self, op: PrefixOp, rhs: &Expr) -> Result<(), CompileError> {
        self.compile_expr(rhs)?;
        match op {
            PrefixOp::Neg => {
                self.emit(Op::UnaryNeg);
            }
            // Unary `+` is numeric identity; the canonical opcode set has
            // no dedicated instruction for it, so it compiles away.
            PrefixOp::Pos => {}
            PrefixOp::Not => {
                self.emit(Op::UnaryNot);
            }
            PrefixOp::Tuple => {
                self.emit(Op::UnaryTuple);
            }
        }
        Ok(())
    }

    fn compile_infix(&mut self, op: InfixOp, lhs: &Expr, rhs: &Expr) -> Result<(), CompileError> {
        match op {
            InfixOp::Assign => return self.compile_assign(lhs, rhs, false),
            InfixOp::Declare => return self.compile_assign(lhs, rhs, true),
            InfixOp::Dot => {
                self.compile_expr(lhs)?;
                let field = dot_field_name(rhs)?;
                self.add_and_load(Value::string(field))?;
                self.emit(Op::LoadSubscript);
                return Ok(());
            }
            _ => {}
        }

        self.compile_expr(lhs)?;
        self.compile_expr(rhs)?;
        let bin_op = match op {
            InfixOp::Add => Op::BinaryAdd,
            InfixOp::Sub => Op::BinarySub,
            InfixOp::Mul => Op::BinaryMul,
            InfixOp::Div => Op::BinaryDiv,
            InfixOp::Exp => Op::BinaryExp,
            InfixOp::FloorDiv => Op::BinaryFloorDiv,
            InfixOp::Mod => Op::BinaryMod,
            InfixOp::Or => Op::BinaryOr,
            InfixOp::And => Op::BinaryAnd,
            InfixOp::BitOr => Op::BinaryBitOr,
            InfixOp::BitAnd => Op::BinaryBitAnd,
            InfixOp::Eq => Op::BinaryEq,
            InfixOp::NotEq => Op::BinaryNotEq,
            InfixOp::Lt => Op::BinaryLt,
            InfixOp::Gt => Op::BinaryGt,
            InfixOp::LtEq => Op::BinaryLtEq,
            InfixOp::GtEq => Op::BinaryGtEq,
            // `x, y` extends/forms a tuple; BinaryTuple already handles
            // both the fresh-2-tuple and append-to-existing-tuple cases,
            // so a right-nested comma chain needs no separate flattening
            // pass here (unlike call arguments and parameter lists, which
            // do need a flat Vec — see `flatten_comma`).
            InfixOp::Comma => Op::BinaryTuple,
            InfixOp::Assign | InfixOp::Declare | InfixOp::Dot => unreachable!("handled above"),
        };
        self.emit(bin_op);
        Ok(())
    }

    /// `lhs = rhs` / `lhs := rhs`. Recognises the four assignable shapes:
    /// a bare name, `a[b]` (a call whose argument is a length-1 list),
    /// `obj.field`, and a call with a parameter list (a function
    /// definition, optionally dot-qualified).
    fn compile_assign(&mut self, lhs: &Expr, rhs: &Expr, is_declare: bool) -> Result<(), CompileError> {
        match lhs {
            Expr::Ident(name) => {
                self.compile_expr(rhs)?;
                let idx = self.add_name(name);
                self.emit_arg(if is_declare { Op::DeclareName } else { Op::StoreName }, idx);
                Ok(())
            }
            Expr::Call { callee, arg } if subscript_index(arg.as_deref()).is_some() => {
                if is_declare {
                    return Err(CompileError::argument_error(
                        "subscript assignment requires '=', not ':='",
                    ));
                }
                let index_expr = subscript_index(arg.as_deref()).unwrap();
                self.compile_expr(rhs)?;
                self.compile_expr(callee)?;
                self.compile_expr(index_expr)?;
                self.emit(Op::StoreSubscript);
                Ok(())
            }
            Expr::Call { callee, arg } => {
                let params = parameter_names_opt(arg.as_deref())?;
                let func = self.compile_function_value(&params, rhs)?;
                match callee.as_ref() {
                    Expr::Ident(name) => {
                        self.add_and_load(func)?;
                        let idx = self.add_name(name);
                        self.emit_arg(if is_declare { Op::DeclareName } else { Op::StoreName }, idx);
                        Ok(())
                    }
                    Expr::Infix {
                        op: InfixOp::Dot,
                        lhs: obj,
                        rhs: field,
                    } => {
                        if is_declare {
                            return Err(CompileError::argument_error(
                                "qualified function definitions require '=', not ':='",
                            ));
                        }
                        let field_name = dot_field_name(field)?;
                        self.add_and_load(func)?;
                        self.compile_expr(obj)?;
                        self.add_and_load(Value::string(field_name))?;
                        self.emit(Op::StoreSubscript);
                        Ok(())
                    }
                    _ => Err(CompileError::argument_error(
                        "function definitions must name an identifier or a dotted path",
                    )),
                }
            }
            Expr::Infix {
                op: InfixOp::Dot,
                lhs: obj,
                rhs: field,
            } => {
                if is_declare {
                    return Err(CompileError::argument_error(
                        "subscript assignment requires '=', not ':='",
                    ));
                }
                let field_name = dot_field_name(field)?;
                self.compile_expr(rhs)?;
                self.compile_expr(obj)?;
                self.add_and_load(Value::string(field_name))?;
                self.emit(Op::StoreSubscript);
                Ok(())
            }
            _ => Err(CompileError::argument_error("invalid assignment target")),
        }
    }

    /// Compiles `callee(arg)`. Three shapes share this entry point:
    /// `a[b]` sugar (a length-1 list argument, lowered straight to
    /// `LOAD_SUBSCRIPT`), a call to a registered builtin (arity checked
    /// here, since builtins are resolved at compile time), and an
    /// ordinary call (arguments emitted in reverse so popping them at the
    /// callee yields forward order).
    fn compile_call(&mut self, callee: &Expr, arg: Option<&Expr>) -> Result<(), CompileError> {
        if let Some(index_expr) = subscript_index(arg) {
            self.compile_expr(callee)?;
            self.compile_expr(index_expr)?;
            self.emit(Op::LoadSubscript);
            return Ok(());
        }

        if let Expr::Ident(name) = callee {
            if let Some(builtin) = builtins::lookup(name) {
                let args = call_arguments(arg);
                if let Some(arity) = builtin.arity {
                    if args.len() != arity {
                        return Err(CompileError::argument_error(format!(
                            "{name} expects {arity} argument(s), got {}",
                            args.len()
                        )));
                    }
                }
                for a in args.iter().rev() {
                    self.compile_expr(a)?;
                }
                self.add_and_load(Value::Builtin(Rc::new(*builtin)))?;
                self.emit_call(args.len())?;
                return Ok(());
            }
        }

        let args = call_arguments(arg);
        for a in args.iter().rev() {
            self.compile_expr(a)?;
        }
        self.compile_expr(callee)?;
        self.emit_call(args.len())?;
        Ok(())
    }

    fn emit_call(&mut self, argc: usize) -> Result<(), CompileError> {
        let arg =
            u16::try_from(argc).map_err(|_| CompileError::internal_error("too many call arguments"))?;
        self.emit_arg(Op::CallFunction, arg);
        Ok(())
    }

    /// Compiles `body` as a fresh function's whole instruction stream (a
    /// sub-compiler gets its own constant/name/jump tables, copied
    /// verbatim into the resulting `Function`).
    fn compile_function_value(&mut self, params: &[String], body: &Expr) -> Result<Value, CompileError> {
        let mut sub = Compiler::default();
        sub.compile_expr(body)?;
        let code = sub.finish();
        Ok(Value::Function(Rc::new(Function {
            params: params.to_vec(),
            code: Rc::new(code),
            receiver: None,
        })))
    }

    fn compile_if(&mut self, cond: &Expr, then_branch: &Expr, else_branch: &Expr) -> Result<(), CompileError> {
        self.compile_expr(cond)?;
        let to_else = self.emit_arg(Op::JumpUnless, 0);
        self.emit(Op::PushScope);
        self.compile_expr(then_branch)?;
        self.emit(Op::PopScope);
        let to_end = self.emit_arg(Op::Jump, 0);

        let else_start = self.here();
        self.patch_jump(to_else, else_start)?;
        self.emit(Op::PushScope);
        self.compile_expr(else_branch)?;
        self.emit(Op::PopScope);
        self.emit(Op::Nop);

        let after = self.here();
        self.patch_jump(to_end, after)?;
        Ok(())
    }

    fn compile_while(&mut self, cond: &Expr, body: &[Stmt]) -> Result<(), CompileError> {
        self.emit(Op::StartLoop);
        let start = self.here();
        self.compile_expr(cond)?;
        let to_end = self.emit_arg(Op::JumpUnless, 0);
        self.compile_stmt_sequence(body, false)?;
        let back = self.emit_arg(Op::Jump, 0);
        self.patch_jump(back, start)?;

        let end = self.here();
        self.patch_jump(to_end, end)?;
        self.emit(Op::EndLoop);
        Ok(())
    }

    fn compile_loop(&mut self, body: &[Stmt]) -> Result<(), CompileError> {
        self.emit(Op::StartLoop);
        let start = self.here();
        self.compile_stmt_sequence(body, false)?;
        let back = self.emit_arg(Op::Jump, 0);
        self.patch_jump(back, start)?;
        self.emit(Op::EndLoop);
        Ok(())
    }

    fn compile_for(&mut self, name: &str, iter: &Expr, body: &[Stmt]) -> Result<(), CompileError> {
        self.compile_expr(iter)?;
        self.emit(Op::StartLoop);
        let start = self.here();
        let name_idx = self.add_name(name);
        self.emit_arg(Op::StartFor, name_idx);
        self.compile_stmt_sequence(body, false)?;
        let back = self.emit_arg(Op::Jump, 0);
        self.patch_jump(back, start)?;
        self.emit(Op::EndFor);
        self.emit(Op::EndLoop);
        Ok(())
    }

    /// `match subj where | p1 -> b1, | p2 -> b2, | _ -> w`. Each
    /// non-wildcard arm's pattern and body sit between a `START_BRANCH`
    /// and `END_BRANCH`; the VM's branch-skip logic means no per-arm jump
    /// patching is needed here, unlike `if`/loops.
    fn compile_match(&mut self, subject: &Expr, arms: &[MatchArm]) -> Result<(), CompileError> {
        self.compile_expr(subject)?;
        self.emit(Op::StartMatch);

        let mut wildcard = None;
        for arm in arms {
            match &arm.pattern {
                Some(pattern) => {
                    self.compile_expr(pattern)?;
                    self.emit(Op::StartBranch);
                    self.compile_expr(&arm.body)?;
                    self.emit(Op::EndBranch);
                }
                None => wildcard = Some(&arm.body),
            }
        }

        match wildcard {
            Some(body) => self.compile_expr(body)?,
            None => {
                self.add_and_load(Value::Nil)?;
            }
        }
        self.emit(Op::EndMatch);
        Ok(())
    }
}

fn dot_field_name(e: &Expr) -> Result<String, CompileError> {
    match e {
        Expr::Ident(name) => Ok(name.clone()),
        _ => Err(CompileError::internal_error("'.' right-hand side must be an identifier")),
    }
}

/// A `Call`'s argument is treated as subscript syntax (`a[b]`) when it's a
/// literal length-1 list, regardless of whether that list came from `a[b]`
/// bracket sugar or the user wrote `a([b])` directly — the parser produces
/// an identical AST shape for both, and the compiler can't and doesn't try
/// to tell them apart.
fn subscript_index(arg: Option<&Expr>) -> Option<&Expr> {
    match arg {
        Some(Expr::List(items)) if items.len() == 1 => Some(&items[0]),
        _ => None,
    }
}

/// Flattens a right-associative comma chain (`a, b, c` parses as
/// `Infix(Comma, a, Infix(Comma, b, c))`) into source order. Used for call
/// arguments and parameter lists, where each element needs to be pushed or
/// validated individually — unlike a tuple *value*, which is built by
/// compiling the chain directly through `BinaryTuple`.
fn flatten_comma(e: &Expr) -> Vec<&Expr> {
    match e {
        Expr::Infix {
            op: InfixOp::Comma,
            lhs,
            rhs,
        } => {
            let mut items = vec![lhs.as_ref()];
            items.extend(flatten_comma(rhs));
            items
        }
        other => vec![other],
    }
}

fn call_arguments(arg: Option<&Expr>) -> Vec<&Expr> {
    match arg {
        None => Vec::new(),
        Some(e) => flatten_comma(e),
    }
}

/// Validates a model/lambda/function-definition parameter list: a bare
/// identifier, `()`/`Unit` for zero parameters, or a comma chain of bare
/// identifiers.
fn parameter_names(e: &Expr) -> Result<Vec<String>, CompileError> {
    match e {
        Expr::Unit => Ok(Vec::new()),
        Expr::Ident(name) => Ok(vec![name.clone()]),
        Expr::Infix {
            op: InfixOp::Comma, ..
        } => flatten_comma(e)
            .into_iter()
            .map(|p| match p {
                Expr::Ident(name) => Ok(name.clone()),
                _ => Err(CompileError::argument_error("function parameters must be identifiers")),
            })
            .collect(),
        _ => Err(CompileError::argument_error("function parameters must be identifiers")),
    }
}

fn parameter_names_opt(arg: Option<&Expr>) -> Result<Vec<String>, CompileError> {
    match arg {
        None => Ok(Vec::new()),
        Some(e) => parameter_names(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;

    fn compile_src(src: &str) -> CompiledCode {
        let program = parser::parse(src).unwrap();
        compile(&program).unwrap()
    }

    #[test]
    fn number_literal_loads_a_constant() {
        let code = compile_src("1;");
        assert!(matches!(code.instructions[0].op, Op::LoadConst));
        assert_eq!(code.constants.len(), 1);
    }

    #[test]
    fn non_final_statements_are_popped() {
        let code = compile_src("1; 2; 3;");
        let pops = code.instructions.iter().filter(|i| i.op == Op::Pop).count();
        assert_eq!(pops, 2);
    }

    #[test]
    fn assignment_to_identifier_emits_declare_name() {
        let code = compile_src("x := 1;");
        assert!(code.instructions.iter().any(|i| i.op == Op::DeclareName));
    }

    #[test]
    fn dot_access_loads_subscript_by_string_constant() {
        let code = compile_src("p.x;");
        assert!(code.instructions.iter().any(|i| i.op == Op::LoadSubscript));
        assert!(code.constants.iter().any(|c| matches!(c, Value::String(s) if &**s == "x")));
    }

    #[test]
    fn bracket_index_also_lowers_to_load_subscript_not_a_call() {
        let code = compile_src("a[0];");
        assert!(code.instructions.iter().any(|i| i.op == Op::LoadSubscript));
        assert!(!code.instructions.iter().any(|i| i.op == Op::CallFunction));
    }

    #[test]
    fn named_function_definition_produces_a_function_constant() {
        let code = compile_src("f(a, b) = a + b;");
        assert!(code.constants.iter().any(|c| matches!(c, Value::Function(_))));
    }

    #[test]
    fn builtin_call_checks_arity_at_compile_time() {
        let err = compile(&parser::parse("len(1, 2);").unwrap()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Argument);
    }

    #[test]
    fn forward_declarations_are_hoisted_for_mutually_recursive_functions() {
        let code = compile_src("f() = g(); g() = f();");
        assert_eq!(code.forward_decls.len(), 2);
        assert!(!code.instructions.iter().any(|i| i.op == Op::StoreName));
    }

    #[test]
    fn if_expression_patches_both_jumps() {
        let code = compile_src("if true then 1 else 2;");
        assert!(code.instructions.iter().any(|i| i.op == Op::JumpUnless));
        assert!(code.instructions.iter().any(|i| i.op == Op::Jump));
    }

    #[test]
    fn while_loop_is_bracketed_by_start_and_end_loop() {
        let code = compile_src("while true do {};");
        assert_eq!(code.instructions[0].op, Op::StartLoop);
        assert_eq!(code.instructions.last().unwrap().op, Op::EndLoop);
    }

    #[test]
    fn match_compiles_branch_pairs_and_wildcard() {
        let code = compile_src(r#"match 1 where | 1 -> "a" , | _ -> "b";"#);
        assert!(code.instructions.iter().any(|i| i.op == Op::StartBranch));
        assert!(code.instructions.iter().any(|i| i.op == Op::EndBranch));
        assert!(code.instructions.iter().any(|i| i.op == Op::EndMatch));
    }

    #[test]
    fn model_literal_compiles_to_a_model_constant() {
        let code = compile_src("model(x, y);");
        assert!(code.constants.iter().any(|c| matches!(c, Value::Model(_))));
    }
}
