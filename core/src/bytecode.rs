//! The bytecode instruction set executed by [`crate::vm`].
//!
//! An instruction with no argument is a single opcode byte; an instruction
//! with an argument is the opcode byte followed by a big-endian `u16`. Jump
//! opcodes don't carry a raw offset directly — they index into a per-function
//! `jumps` table of byte offsets, which [`crate::vm::frame::Frame`] resolves
//! to instruction indices once at construction time by walking the decoded
//! instruction list and summing instruction widths.

use std::fmt;

use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Op {
    Nop,
    /// A no-op that still consumes a 2-byte argument. Used to blank out a
    /// forward-declared `LoadConst`/`StoreName` pair without shifting any
    /// jump offset that follows it.
    NopArg,

    Pop,
    Dup,

    LoadConst,
    LoadName,
    StoreName,
    /// Same as `StoreName`, but binds in the innermost scope only rather
    /// than searching outward for an existing binding.
    DeclareName,
    LoadSubscript,
    StoreSubscript,

    UnaryNot,
    UnaryNeg,
    UnaryTuple,

    BinaryAdd,
    BinarySub,
    BinaryMul,
    BinaryDiv,
    BinaryExp,
    BinaryFloorDiv,
    BinaryMod,
    BinaryOr,
    BinaryAnd,
    BinaryBitOr,
    BinaryBitAnd,
    BinaryEq,
    BinaryNotEq,
    BinaryLt,
    BinaryGt,
    BinaryLtEq,
    BinaryGtEq,
    BinaryTuple,

    CallFunction,
    Return,
    PushScope,
    PopScope,
    /// Copies the current scope's binding for `names[arg]` into the
    /// enclosing scope. Errors if there is no enclosing scope or the name
    /// is undefined in the current one.
    Export,

    Jump,
    JumpIf,
    JumpUnless,

    StartMatch,
    StartBranch,
    EndBranch,
    EndMatch,

    Break,
    Next,
    StartLoop,
    EndLoop,
    StartFor,
    EndFor,

    MakeList,
    MakeTuple,
    MakeMap,
}

impl Op {
    pub fn has_arg(self) -> bool {
        use Op::*;
        matches!(
            self,
            NopArg
                | LoadConst
                | LoadName
                | StoreName
                | DeclareName
                | Export
                | Jump
                | JumpIf
                | JumpUnless
                | StartFor
                | MakeList
                | MakeTuple
                | MakeMap
        )
    }

    /// Encoded width in bytes: 1 for a bare opcode, 3 for opcode + `u16` arg.
    pub fn width(self) -> usize {
        if self.has_arg() { 3 } else { 1 }
    }

    pub fn name(self) -> &'static str {
        use Op::*;
        match self {
            Nop => "NOP",
            NopArg => "NOP_ARG",
            Pop => "POP",
            Dup => "DUP",
            LoadConst => "LOAD_CONST",
            LoadName => "LOAD_NAME",
            StoreName => "STORE_NAME",
            DeclareName => "DECLARE_NAME",
            LoadSubscript => "LOAD_SUBSCRIPT",
            StoreSubscript => "STORE_SUBSCRIPT",
            UnaryNot => "UNARY_NOT",
            UnaryNeg => "UNARY_NEG",
            UnaryTuple => "UNARY_TUPLE",
            BinaryAdd => "BINARY_ADD",
            BinarySub => "BINARY_SUB",
            BinaryMul => "BINARY_MUL",
            BinaryDiv => "BINARY_DIV",
            BinaryExp => "BINARY_EXP",
            BinaryFloorDiv => "BINARY_FLOOR_DIV",
            BinaryMod => "BINARY_MOD",
            BinaryOr => "BINARY_OR",
            BinaryAnd => "BINARY_AND",
            BinaryBitOr => "BINARY_BIT_OR",
            BinaryBitAnd => "BINARY_BIT_AND",
            BinaryEq => "BINARY_EQ",
            BinaryNotEq => "BINARY_NOT_EQ",
            BinaryLt => "BINARY_LT",
            BinaryGt => "BINARY_GT",
            BinaryLtEq => "BINARY_LT_EQ",
            BinaryGtEq => "BINARY_GT_EQ",
            BinaryTuple => "BINARY_TUPLE",
            CallFunction => "CALL_FUNCTION",
            Return => "RETURN",
            PushScope => "PUSH_SCOPE",
            PopScope => "POP_SCOPE",
            Export => "EXPORT",
            Jump => "JUMP",
            JumpIf => "JUMP_IF",
            JumpUnless => "JUMP_UNLESS",
            StartMatch => "START_MATCH",
            StartBranch => "START_BRANCH",
            EndBranch => "END_BRANCH",
            EndMatch => "END_MATCH",
            Break => "BREAK",
            Next => "NEXT",
            StartLoop => "START_LOOP",
            EndLoop => "END_LOOP",
            StartFor => "START_FOR",
            EndFor => "END_FOR",
            MakeList => "MAKE_LIST",
            MakeTuple => "MAKE_TUPLE",
            MakeMap => "MAKE_MAP",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single decoded instruction: an opcode plus its argument (`0` when the
/// opcode takes none).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub op: Op,
    pub arg: u16,
}

impl Instruction {
    pub fn new(op: Op, arg: u16) -> Self {
        Instruction { op, arg }
    }

    pub fn bare(op: Op) -> Self {
        Instruction { op, arg: 0 }
    }
}

/// Everything the compiler produces for one function body (or the
/// top-level program, treated as a zero-parameter function): the decoded
/// instruction stream plus its three parallel side tables.
#[derive(Debug, Clone, Default)]
pub struct CompiledCode {
    pub instructions: Vec<Instruction>,
    pub constants: Vec<Value>,
    pub names: Vec<String>,
    /// Byte offsets that `Jump`/`JumpIf`/`JumpUnless` arguments index into.
    /// Resolved to instruction indices lazily by [`CompiledCode::jump_targets`].
    pub jumps: Vec<usize>,
    /// `(name index, constant index)` pairs produced by
    /// [`CompiledCode::hoist_forward_declarations`]: bindings a frame
    /// installs into its base scope before running any instructions, so
    /// top-level functions and models can call each other regardless of
    /// declaration order.
    pub forward_decls: Vec<(usize, usize)>,
}

impl CompiledCode {
    /// Resolves every entry in `jumps` (a byte offset into the encoded
    /// instruction stream) to the index of the instruction starting at that
    /// offset. Returns `None` if an offset doesn't land on an instruction
    /// boundary, which would indicate a compiler bug.
    pub fn jump_targets(&self) -> Option<Vec<usize>> {
        let mut offset_to_index = std::collections::HashMap::new();
        let mut offset = 0usize;
        for (i, instr) in self.instructions.iter().enumerate() {
            offset_to_index.insert(offset, i);
            offset += instr.op.width();
        }
        offset_to_index.insert(offset, self.instructions.len());

        self.jumps
            .iter()
            .map(|byte_offset| offset_to_index.get(byte_offset).copied())
            .collect()
    }

    /// Rewrites every adjacent `LoadConst c; StoreName n` (or `DeclareName`)
    /// pair at the top level where constant `c` is a function or model into
    /// two `NopArg`s (preserving byte width, so any jump offset past this
    /// point stays valid), and records `(n, c)` in `forward_decls` so the
    /// binding can be installed before the frame starts executing.
    pub fn hoist_forward_declarations(&mut self) {
        let mut decls = Vec::new();
        let mut i = 0;
        while i + 1 < self.instructions.len() {
            let load = self.instructions[i];
            let store = self.instructions[i + 1];
            let is_store = matches!(store.op, Op::StoreName | Op::DeclareName);
            if load.op == Op::LoadConst && is_store {
                let is_hoistable = matches!(
                    self.constants.get(load.arg as usize),
                    Some(Value::Function(_)) | Some(Value::Model(_))
                );
                if is_hoistable {
                    decls.push((store.arg as usize, load.arg as usize));
                    self.instructions[i] = Instruction::new(Op::NopArg, load.arg);
                    self.instructions[i + 1] = Instruction::new(Op::NopArg, store.arg);
                }
            }
            i += 1;
        }
        self.forward_decls = decls;
    }

    /// A one-instruction-per-line disassembly, used by the CLI's debug
    /// output and by tests that want to eyeball compiler output.
    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        for (i, instr) in self.instructions.iter().enumerate() {
            if instr.op.has_arg() {
                out.push_str(&format!("{i:4} {:<16} {}\n", instr.op.name(), instr.arg));
            } else {
                out.push_str(&format!("{i:4} {}\n", instr.op.name()));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths_match_arg_presence() {
        assert_eq!(Op::Pop.width(), 1);
        assert_eq!(Op::LoadConst.width(), 3);
    }

    #[test]
    fn jump_targets_resolve_byte_offsets_to_indices() {
        let code = CompiledCode {
            instructions: vec![
                Instruction::new(Op::LoadConst, 0), // offset 0, width 3
                Instruction::bare(Op::Pop),         // offset 3, width 1
                Instruction::bare(Op::Return),       // offset 4, width 1
            ],
            jumps: vec![4, 0],
            ..Default::default()
        };
        assert_eq!(code.jump_targets(), Some(vec![2, 0]));
    }
}
