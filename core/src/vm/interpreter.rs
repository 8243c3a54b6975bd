//! The fetch-decode-execute loop and effector table (spec §4.5, §5).

use std::rc::Rc;

use tracing::instrument;

use crate::bytecode::{CompiledCode, Op};
use crate::errors::VmError;
use crate::options::VmOptions;
use crate::value::Value;

use super::frame::{Frame, LoopMarker};
use super::interrupt::{InterruptHandle, InterruptQueue, Poll};
use super::store::StorePool;

pub enum VmOutcome {
    Value(Value),
    Stopped,
}

/// One VM instance: its own frame stack, store pool, and interrupt queue.
/// Nothing here is `Send`/`Sync` — two VMs may run on separate threads only
/// if they share no state, per spec §5.
pub struct Vm {
    frames: Vec<Frame>,
    pool: StorePool,
    interrupts: InterruptQueue,
    stack_capacity: usize,
}

impl Vm {
    pub fn new() -> (Vm, InterruptHandle) {
        Vm::with_options(VmOptions::default())
    }

    pub fn with_options(options: VmOptions) -> (Vm, InterruptHandle) {
        let (handle, interrupts) = InterruptQueue::new();
        (
            Vm {
                frames: Vec::new(),
                pool: StorePool::with_capacity(options.store_pool_size_or_default()),
                interrupts,
                stack_capacity: options.stack_capacity_or_default(),
            },
            handle,
        )
    }

    #[instrument(skip_all)]
    pub fn eval(&mut self, code: Rc<CompiledCode>) -> Result<VmOutcome, VmError> {
        let root = self.pool.acquire();
        self.frames.push(Frame::new(code, root, self.stack_capacity)?);
        tracing::trace!(frames = self.frames.len(), "frame pushed");
        self.run_loop()
    }

    fn run_loop(&mut self) -> Result<VmOutcome, VmError> {
        loop {
            if self.interrupts.poll() == Poll::Stop {
                return Ok(VmOutcome::Stopped);
            }

            let instr = self.frames.last().and_then(|f| f.fetch());
            let Some(instr) = instr else {
                if let Some(value) = self.return_from_frame()? {
                    return Ok(VmOutcome::Value(value));
                }
                continue;
            };

            if instr.op == Op::Return {
                self.frames.last_mut().unwrap().cursor += 1;
                if let Some(value) = self.return_from_frame()? {
                    return Ok(VmOutcome::Value(value));
                }
                continue;
            }

            self.frames.last_mut().unwrap().cursor += 1;
            self.execute(instr.op, instr.arg)?;
        }
    }

    /// Pops the current frame, threading its top-of-stack value (if any)
    /// into the caller. Returns `Ok(Some(value))` once the outermost frame
    /// has exited, i.e. the program has finished.
    #[instrument(skip(self))]
    fn return_from_frame(&mut self) -> Result<Option<Value>, VmError> {
        let mut finished = self.frames.pop().expect("run_loop never empties frames without returning");
        let value = finished.stack.pop_opt().unwrap_or(Value::Nil);
        tracing::trace!(remaining_frames = self.frames.len(), "frame popped");
        match self.frames.last_mut() {
            Some(caller) => {
                caller.stack.push(value)?;
                Ok(None)
            }
            None => Ok(Some(value)),
        }
    }

    fn execute(&mut self, op: Op, arg: u16) -> Result<(), VmError> {
        match op {
            Op::Nop | Op::NopArg => {}
            Op::Pop => {
                self.frame_mut().stack.pop()?;
            }
            Op::Dup => {
                let top = self.frame_mut().stack.top()?.clone();
                self.frame_mut().stack.push(top)?;
            }
            Op::LoadConst => {
                let value = self.frame_mut().constant(arg);
                self.frame_mut().stack.push(value)?;
            }
            Op::LoadName => {
                let frame = self.frame_mut();
                let name = frame.name(arg).to_string();
                let value = frame
                    .scopes
                    .get(&name)
                    .cloned()
                    .ok_or_else(|| VmError::name_error(format!("'{name}' is not defined")))?;
                frame.stack.push(value)?;
            }
            Op::StoreName => {
                let value = self.frame_mut().stack.pop()?;
                let frame = self.frame_mut();
                let name = frame.name(arg).to_string();
                frame.scopes.set(&name, value);
            }
            Op::DeclareName => {
                let value = self.frame_mut().stack.pop()?;
                let frame = self.frame_mut();
                let name = frame.name(arg).to_string();
                frame.scopes.declare(name, value);
            }
            Op::LoadSubscript => {
                let index = self.frame_mut().stack.pop()?;
                let target = self.frame_mut().stack.pop()?;
                let value = target.subscript(&index)?;
                self.frame_mut().stack.push(value)?;
            }
            Op::StoreSubscript => {
                let index = self.frame_mut().stack.pop()?;
                let target = self.frame_mut().stack.pop()?;
                let value = self.frame_mut().stack.pop()?;
                target.set_subscript(&index, value)?;
            }
            Op::UnaryNot => self.unary(Value::unary_not)?,
            Op::UnaryNeg => self.unary(Value::unary_neg)?,
            Op::UnaryTuple => {
                let rhs = self.frame_mut().stack.pop()?;
                self.frame_mut().stack.push(rhs.unary_tuple())?;
            }
            Op::BinaryAdd => self.binary(Value::binary_add)?,
            Op::BinarySub => self.binary(Value::binary_sub)?,
            Op::BinaryMul => self.binary(Value::binary_mul)?,
            Op::BinaryDiv => self.binary(Value::binary_div)?,
            Op::BinaryExp => self.binary(Value::binary_exp)?,
            Op::BinaryFloorDiv => self.binary(Value::binary_floor_div)?,
            Op::BinaryMod => self.binary(Value::binary_mod)?,
            Op::BinaryOr => self.binary(Value::binary_or)?,
            Op::BinaryAnd => self.binary(Value::binary_and)?,
            Op::BinaryBitOr => self.binary(Value::binary_bit_or)?,
            Op::BinaryBitAnd => self.binary(Value::binary_bit_and)?,
            Op::BinaryEq => self.binary(Value::binary_eq)?,
            Op::BinaryNotEq => self.binary(Value::binary_not_eq)?,
            Op::BinaryLt => self.binary(Value::binary_lt)?,
            Op::BinaryGt => self.binary(Value::binary_gt)?,
            Op::BinaryLtEq => self.binary(Value::binary_lt_eq)?,
            Op::BinaryGtEq => self.binary(Value::binary_gt_eq)?,
            Op::BinaryTuple => {
                let rhs = self.frame_mut().stack.pop()?;
                let lhs = self.frame_mut().stack.pop()?;
                self.frame_mut().stack.push(lhs.binary_tuple(&rhs))?;
            }
            Op::CallFunction => self.call_function(arg)?,
            Op::Return => unreachable!("handled directly in run_loop"),
            Op::PushScope => {
                let store = self.pool.acquire();
                self.frame_mut().scopes.push(store);
            }
            Op::PopScope => {
                if let Some(store) = self.frame_mut().scopes.pop() {
                    self.pool.release(store);
                }
            }
            Op::Export => {
                let frame = self.frame_mut();
                let name = frame.name(arg).to_string();
                frame.scopes.export(&name)?;
            }
            Op::Jump => {
                let target = self.frame_mut().jump_target(arg)?;
                self.frame_mut().cursor = target;
            }
            Op::JumpIf => {
                let cond = self.frame_mut().stack.pop()?;
                if cond.is_truthy() {
                    let target = self.frame_mut().jump_target(arg)?;
                    self.frame_mut().cursor = target;
                }
            }
            Op::JumpUnless => {
                let cond = self.frame_mut().stack.pop()?;
                if !cond.is_truthy() {
                    let target = self.frame_mut().jump_target(arg)?;
                    self.frame_mut().cursor = target;
                }
            }
            Op::StartMatch => {
                let subject = self.frame_mut().stack.pop()?;
                let frame = self.frame_mut();
                let end = frame.scan_forward(frame.cursor, Op::StartMatch, Op::EndMatch)?;
                frame.match_inputs.push(subject);
                frame.match_ends.push(end);
            }
            Op::StartBranch => {
                let pattern = self.frame_mut().stack.pop()?;
                let frame = self.frame_mut();
                let subject = frame
                    .match_inputs
                    .last()
                    .ok_or_else(|| VmError::internal_error("START_BRANCH outside a match"))?;
                if !pattern.equals(subject) {
                    let past = frame.scan_to_own_end_branch(frame.cursor)?;
                    frame.cursor = past;
                }
            }
            Op::EndBranch => {
                let frame = self.frame_mut();
                let target = *frame
                    .match_ends
                    .last()
                    .ok_or_else(|| VmError::internal_error("END_BRANCH outside a match"))?;
                frame.cursor = target;
            }
            Op::EndMatch => {
                let frame = self.frame_mut();
                frame.match_inputs.pop();
                frame.match_ends.pop();
            }
            Op::Break => self.unwind_loop(|marker| marker.break_target)?,
            Op::Next => self.unwind_loop(|marker| marker.next_target)?,
            Op::StartLoop => {
                let frame = self.frame_mut();
                let scope_depth = frame.scopes.depth();
                let break_target = frame.scan_forward(frame.cursor, Op::StartLoop, Op::EndLoop)?;
                frame.loops.push(LoopMarker {
                    break_target,
                    next_target: frame.cursor,
                    scope_depth,
                });
            }
            Op::EndLoop => {
                self.frame_mut().loops.pop();
            }
            Op::StartFor => {
                let first_pass = {
                    let frame = self.frame_mut();
                    frame.iterators.len() < frame.loops.len()
                };
                let iterator = if first_pass {
                    let iterable = self.frame_mut().stack.pop()?;
                    let iterator = iterable.iter()?;
                    self.frame_mut().iterators.push(iterator.clone());
                    iterator
                } else {
                    self.frame_mut().iterators.last().unwrap().clone()
                };
                let item = match &iterator {
                    Value::Iterator(state) => state.borrow_mut().next_item(),
                    _ => unreachable!("iter() always produces Value::Iterator"),
                };
                match item {
                    Some(value) => {
                        let frame = self.frame_mut();
                        let name = frame.name(arg).to_string();
                        frame.scopes.set(&name, value);
                    }
                    None => {
                        self.frame_mut().iterators.pop();
                        self.unwind_loop(|marker| marker.break_target)?;
                    }
                }
            }
            Op::EndFor => {
                self.frame_mut().iterators.pop();
            }
            Op::MakeList => {
                let items = self.pop_n_in_order(arg)?;
                self.frame_mut().stack.push(Value::list(items))?;
            }
            Op::MakeTuple => {
                let items = self.pop_n_in_order(arg)?;
                self.frame_mut().stack.push(Value::tuple(items))?;
            }
            Op::MakeMap => {
                let flat = self.pop_n_in_order(arg.saturating_mul(2))?;
                let mut map = crate::value::MapData::new(None);
                for pair in flat.chunks_exact(2) {
                    map.set(pair[0].clone(), pair[1].clone())?;
                }
                self.frame_mut()
                    .stack
                    .push(Value::Map(Rc::new(std::cell::RefCell::new(map))))?;
            }
        }
        Ok(())
    }

    fn frame_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("execute always runs with an active frame")
    }

    fn unary(&mut self, op: fn(&Value) -> Result<Value, VmError>) -> Result<(), VmError> {
        let rhs = self.frame_mut().stack.pop()?;
        let result = op(&rhs)?;
        self.frame_mut().stack.push(result)
    }

    fn binary(&mut self, op: fn(&Value, &Value) -> Result<Value, VmError>) -> Result<(), VmError> {
        let rhs = self.frame_mut().stack.pop()?;
        let lhs = self.frame_mut().stack.pop()?;
        let result = op(&lhs, &rhs)?;
        self.frame_mut().stack.push(result)
    }

    /// Pops `n` values off the top of the stack and returns them in the
    /// order they were pushed (natural left-to-right order), since they
    /// come off the stack in reverse.
    fn pop_n_in_order(&mut self, n: u16) -> Result<Vec<Value>, VmError> {
        let mut items = Vec::with_capacity(n as usize);
        for _ in 0..n {
            items.push(self.frame_mut().stack.pop()?);
        }
        items.reverse();
        Ok(items)
    }

    fn unwind_loop(&mut self, target: fn(&LoopMarker) -> usize) -> Result<(), VmError> {
        let (target_depth, jump_to) = {
            let frame = self.frame_mut();
            let marker = frame
                .loops
                .last()
                .ok_or_else(|| VmError::internal_error("break/next outside a loop"))?;
            (marker.scope_depth, target(marker))
        };
        loop {
            if self.frame_mut().scopes.depth() <= target_depth {
                break;
            }
            match self.frame_mut().scopes.pop() {
                Some(store) => self.pool.release(store),
                None => break,
            }
        }
        self.frame_mut().cursor = jump_to;
        Ok(())
    }

    fn call_function(&mut self, argc: u16) -> Result<(), VmError> {
        let callee = self.frame_mut().stack.pop()?;
        let mut args = Vec::with_capacity(argc as usize);
        for _ in 0..argc {
            args.push(self.frame_mut().stack.pop()?);
        }

        match callee {
            Value::Builtin(b) => {
                let result = (b.func)(&args)?;
                self.frame_mut().stack.push(result)
            }
            Value::Function(func) => {
                if args.len() != func.params.len() {
                    return Err(VmError::argument_error(format!(
                        "expected {} argument(s), got {}",
                        func.params.len(),
                        args.len()
                    )));
                }
                let mut root = self.pool.acquire();
                for (param, value) in func.params.iter().zip(args) {
                    root.declare(param.clone(), value);
                }
                if let Some(receiver) = &func.receiver {
                    root.declare("self".to_string(), receiver.clone());
                }
                let new_frame = Frame::new(func.code.clone(), root, self.stack_capacity)?;
                self.frames.push(new_frame);
                tracing::trace!(frames = self.frames.len(), "frame pushed");
                Ok(())
            }
            Value::Model(model) => {
                let result = model.instantiate(args)?;
                self.frame_mut().stack.push(result)
            }
            subscriptable @ (Value::List(_) | Value::Tuple(_) | Value::String(_) | Value::Map(_))
                if argc == 1 =>
            {
                let result = subscriptable.subscript(&args[0])?;
                self.frame_mut().stack.push(result)
            }
            other => Err(VmError::type_error(format!(
                "{} is not callable",
                other.type_name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    fn run(src: &str) -> Value {
        let program = crate::parser::parse(src).unwrap();
        let code = crate::compiler::compile(&program).unwrap();
        let (mut vm, _handle) = Vm::new();
        match vm.eval(Rc::new(code)).unwrap() {
            VmOutcome::Value(v) => v,
            VmOutcome::Stopped => panic!("vm stopped unexpectedly"),
        }
    }

    #[test]
    fn arithmetic_and_precedence() {
        assert_eq!(run("return 2 + 3 * 4;").numeric().unwrap(), 14.0);
    }

    #[test]
    fn if_else_branches() {
        assert_eq!(run("return if false then 1 else 2;").numeric().unwrap(), 2.0);
    }

    #[test]
    fn while_loop_accumulates() {
        let v = run("i := 0; total := 0; while i < 5 do { total = total + i; i = i + 1; }; return total;");
        assert_eq!(v.numeric().unwrap(), 10.0);
    }

    #[test]
    fn break_exits_loop_early() {
        let v = run("i := 0; while true do { i = i + 1; if i == 3 then { break; } else { nil }; }; return i;");
        assert_eq!(v.numeric().unwrap(), 3.0);
    }

    #[test]
    fn for_loop_sums_a_list() {
        let v = run("total := 0; for x in [1, 2, 3] do { total = total + x; }; return total;");
        assert_eq!(v.numeric().unwrap(), 6.0);
    }

    #[test]
    fn match_falls_through_to_wildcard() {
        let v = run("x := 5; return match x where | 1 -> 10, | 2 -> 20, | _ -> 99;");
        assert_eq!(v.numeric().unwrap(), 99.0);
    }

    #[test]
    fn function_call_round_trips_arguments() {
        let v = run("add(a, b) = a + b; return add(3, 4);");
        assert_eq!(v.numeric().unwrap(), 7.0);
    }

    #[test]
    fn recursive_function_via_forward_declaration() {
        let v = run("fact(n) = if n < 2 then 1 else n * fact(n - 1); return fact(5);");
        assert_eq!(v.numeric().unwrap(), 120.0);
    }

    #[test]
    fn list_subscript_call_syntax() {
        let v = run("xs := [10, 20, 30]; return xs(1);");
        assert_eq!(v.numeric().unwrap(), 20.0);
    }
}
