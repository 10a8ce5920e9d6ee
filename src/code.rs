//! Code buffer: an append-only array of three-field instructions that
//! supports in-place patching of a single field at a recorded index
//! (spec §4.4, §9 Design Note 2 — model it as an append-and-patch
//! store, not an immutable AST).

use crate::error::{CompileError, Span};

/// Activation-record layout, shared knowledge between `CAL`, `RET`,
/// `LOD`, `STO`, `INT` and the interpreter's `base()` walk (spec §9
/// Design Note: "centralize the offsets as named constants; do not
/// inline literal +1, +2, +3").
pub const STATIC_LINK_OFFSET: i64 = 0;
pub const DYNAMIC_LINK_OFFSET: i64 = 1;
pub const RETURN_ADDR_OFFSET: i64 = 2;
pub const LOCALS_OFFSET: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Lit,
    Opr,
    Lod,
    Sto,
    Cal,
    Int,
    Jmp,
    Jpc,
}

/// OPR operator codes (spec §3). Code 7 is intentionally unused.
pub mod opr {
    pub const RET: i64 = 0;
    pub const NEGATE: i64 = 1;
    pub const ADD: i64 = 2;
    pub const SUB: i64 = 3;
    pub const MUL: i64 = 4;
    pub const DIV: i64 = 5;
    pub const ODD: i64 = 6;
    pub const EQ: i64 = 8;
    pub const NEQ: i64 = 9;
    pub const LT: i64 = 10;
    pub const GEQ: i64 = 11;
    pub const GT: i64 = 12;
    pub const LEQ: i64 = 13;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub m: Op,
    pub l: i64,
    pub a: i64,
}

pub struct CodeBuffer {
    code: Vec<Instruction>,
}

impl CodeBuffer {
    pub const CAPACITY: usize = 2000;

    pub fn new() -> Self {
        Self { code: Vec::new() }
    }

    /// Appends an instruction and returns its index, which the caller
    /// captures just before calling when it will need to backpatch
    /// field `a` later (forward jumps, procedure entry addresses).
    pub fn gen(&mut self, m: Op, l: i64, a: i64, span: Span) -> Result<usize, CompileError> {
        if self.code.len() >= Self::CAPACITY {
            return Err(CompileError::capacity("source too large: code buffer is full", span));
        }
        self.code.push(Instruction { m, l, a });
        Ok(self.code.len() - 1)
    }

    /// Mutates only field `a` at `index`; the code array is never
    /// rewritten any other way.
    pub fn patch(&mut self, index: usize, a: i64) {
        self.code[index].a = a;
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn get(&self, index: usize) -> Instruction {
        self.code[index]
    }

    pub fn as_slice(&self) -> &[Instruction] {
        &self.code
    }

    pub fn into_vec(self) -> Vec<Instruction> {
        self.code
    }
}

impl Default for CodeBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span() -> Span {
        Span { line: 1, col: 1 }
    }

    #[test]
    fn gen_returns_sequential_indices() {
        let mut code = CodeBuffer::new();
        let i0 = code.gen(Op::Lit, 0, 1, span()).unwrap();
        let i1 = code.gen(Op::Lit, 0, 2, span()).unwrap();
        assert_eq!(i0, 0);
        assert_eq!(i1, 1);
        assert_eq!(code.len(), 2);
    }

    #[test]
    fn patch_changes_only_field_a() {
        let mut code = CodeBuffer::new();
        let idx = code.gen(Op::Jmp, 0, 0, span()).unwrap();
        code.patch(idx, 17);
        let instr = code.get(idx);
        assert_eq!(instr.m, Op::Jmp);
        assert_eq!(instr.l, 0);
        assert_eq!(instr.a, 17);
    }

    #[test]
    fn overflow_is_fatal() {
        let mut code = CodeBuffer::new();
        for _ in 0..CodeBuffer::CAPACITY {
            code.gen(Op::Lit, 0, 0, span()).unwrap();
        }
        let err = code.gen(Op::Lit, 0, 0, span()).unwrap_err();
        assert!(matches!(err.kind, crate::error::CompileErrorKind::Capacity(_)));
    }
}
