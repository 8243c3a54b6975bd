//! A Frame: one function activation (spec §4.4).

use std::rc::Rc;

use crate::bytecode::{CompiledCode, Instruction, Op};
use crate::errors::VmError;
use crate::value::Value;

use super::stack::OperandStack;
use super::store::{ScopeStack, Store};

/// Bookkeeping for one active loop: where `BREAK`/`NEXT` jump to, and the
/// scope depth to unwind back to — a loop body, or anything nested inside
/// it (an `if`, a nested `match`), may have pushed further block scopes by
/// the time `break` runs, not just the one the loop body itself opened.
pub(crate) struct LoopMarker {
    pub break_target: usize,
    pub next_target: usize,
    pub scope_depth: usize,
}

pub struct Frame {
    pub code: Rc<CompiledCode>,
    pub cursor: usize,
    pub stack: OperandStack,
    pub scopes: ScopeStack,
    jump_targets: Vec<usize>,
    pub(crate) loops: Vec<LoopMarker>,
    /// Instruction index of each active match's `END_MATCH`, pushed by
    /// `START_MATCH` and consulted by `END_BRANCH`. Kept separate from
    /// `loops` so a `match` nested inside a loop body can't steal a
    /// `break`'s jump target (both are "a breaks stack" in the spec's
    /// prose, but conflating them misroutes `break` through a nested
    /// match).
    pub(crate) match_ends: Vec<usize>,
    pub(crate) match_inputs: Vec<Value>,
    pub(crate) iterators: Vec<Value>,
}

impl Frame {
    #[tracing::instrument(skip_all)]
    pub fn new(code: Rc<CompiledCode>, mut root: Store, stack_capacity: usize) -> Result<Frame, VmError> {
        let jump_targets = code.jump_targets().ok_or_else(|| {
            VmError::internal_error("jump offset does not land on an instruction boundary")
        })?;
        for &(name_idx, const_idx) in &code.forward_decls {
            let name = code.names[name_idx].clone();
            let value = code.constants[const_idx].clone();
            root.declare(name, value);
        }
        Ok(Frame {
            code,
            cursor: 0,
            stack: OperandStack::new(stack_capacity),
            scopes: ScopeStack::with_root(root),
            jump_targets,
            loops: Vec::new(),
            match_ends: Vec::new(),
            match_inputs: Vec::new(),
            iterators: Vec::new(),
        })
    }

    pub fn fetch(&self) -> Option<Instruction> {
        self.code.instructions.get(self.cursor).copied()
    }

    pub fn jump_target(&self, index: u16) -> Result<usize, VmError> {
        self.jump_targets
            .get(index as usize)
            .copied()
            .ok_or_else(|| VmError::internal_error("jump target index out of range"))
    }

    pub fn name(&self, index: u16) -> &str {
        &self.code.names[index as usize]
    }

    pub fn constant(&self, index: u16) -> Value {
        self.code.constants[index as usize].clone()
    }

    /// Scans forward from `from` for the matching `end_op`, treating any
    /// nested `start_op ... end_op` region as one opaque block so a nested
    /// loop or match doesn't get mistaken for the enclosing one's end.
    pub fn scan_forward(&self, from: usize, start_op: Op, end_op: Op) -> Result<usize, VmError> {
        let mut depth = 0usize;
        let mut i = from;
        while let Some(instr) = self.code.instructions.get(i) {
            if instr.op == start_op {
                depth += 1;
            } else if instr.op == end_op {
                if depth == 0 {
                    return Ok(i);
                }
                depth -= 1;
            }
            i += 1;
        }
        Err(VmError::internal_error("unterminated block: matching end instruction not found"))
    }

    /// Scans forward from a failed `START_BRANCH` to just past *this* arm's
    /// own `END_BRANCH`, skipping any nested `START_MATCH...END_MATCH`
    /// region wholesale — otherwise a nested match's internal `END_BRANCH`
    /// tokens would be mistaken for the current arm's.
    pub fn scan_to_own_end_branch(&self, from: usize) -> Result<usize, VmError> {
        let mut i = from;
        loop {
            let instr = self
                .code
                .instructions
                .get(i)
                .ok_or_else(|| VmError::internal_error("unterminated match arm"))?;
            match instr.op {
                Op::StartMatch => {
                    i = self.scan_forward(i + 1, Op::StartMatch, Op::EndMatch)? + 1;
                }
                Op::EndBranch => return Ok(i + 1),
                Op::EndMatch => {
                    return Err(VmError::internal_error(
                        "match arm ended without its own END_BRANCH",
                    ));
                }
                _ => i += 1,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{CompiledCode, Instruction};

    fn frame_with(instructions: Vec<Instruction>) -> Frame {
        let code = Rc::new(CompiledCode {
            instructions,
            ..Default::default()
        });
        Frame::new(code, Store::default(), super::stack::DEFAULT_CAPACITY).unwrap()
    }

    #[test]
    fn scan_forward_skips_a_nested_pair() {
        let frame = frame_with(vec![
            Instruction::bare(Op::StartLoop),
            Instruction::bare(Op::StartLoop),
            Instruction::bare(Op::EndLoop),
            Instruction::bare(Op::EndLoop),
        ]);
        assert_eq!(frame.scan_forward(1, Op::StartLoop, Op::EndLoop).unwrap(), 3);
    }

    #[test]
    fn scan_to_own_end_branch_skips_a_nested_match() {
        let frame = frame_with(vec![
            Instruction::bare(Op::StartMatch),
            Instruction::bare(Op::StartBranch),
            Instruction::bare(Op::EndBranch),
            Instruction::bare(Op::EndMatch),
            Instruction::bare(Op::EndBranch),
        ]);
        assert_eq!(frame.scan_to_own_end_branch(0).unwrap(), 5);
    }
}
