//! Stack-machine interpreter (spec §4.6).
//!
//! Fetch-decode-execute loop over a fixed-size register file `(p, b,
//! t)`: a single-step function dispatches one instruction and reports
//! whether the program continues, driven by a `run` loop until the
//! outermost `RET` halts it (see DESIGN.md for where this shape comes
//! from). `STO` prints the `assign V` trace line to stdout; everything
//! else is silent unless the `debug` feature is enabled.

use std::io::Write as _;

use log::{debug, trace};

use crate::code::{opr, CodeBuffer, Instruction, Op, DYNAMIC_LINK_OFFSET, RETURN_ADDR_OFFSET, STATIC_LINK_OFFSET};
use crate::error::RuntimeError;

/// Size of the interpreter's operand/activation stack, in i64 cells.
const STACK_SIZE: usize = 2000;

pub struct Interpreter {
    stack: [i64; STACK_SIZE],
    /// Program counter: index of the next instruction to fetch.
    p: usize,
    /// Base pointer: start of the current activation record.
    b: usize,
    /// Stack top: index of the last occupied cell (0 means empty).
    t: usize,
    /// Number of activation records currently on the call chain, for
    /// the operational call-depth log line only.
    depth: usize,
}

impl Interpreter {
    pub fn new() -> Self {
        // `run` re-initializes p/b/t/depth to their starting values;
        // the values here only matter before the first `run` call.
        Self { stack: [0; STACK_SIZE], p: 0, b: 1, t: 0, depth: 0 }
    }

    /// Walks `levels` static links back from the activation record
    /// based at `b` (spec §4.6).
    fn base(&self, mut b: usize, levels: i64) -> usize {
        let mut remaining = levels;
        while remaining > 0 {
            b = self.stack[b + STATIC_LINK_OFFSET as usize] as usize;
            remaining -= 1;
        }
        b
    }

    fn push(&mut self, value: i64) -> Result<(), RuntimeError> {
        if self.t + 1 >= STACK_SIZE {
            return Err(RuntimeError::StackOverflow);
        }
        self.t += 1;
        self.stack[self.t] = value;
        Ok(())
    }

    fn pop(&mut self) -> i64 {
        let v = self.stack[self.t];
        self.t -= 1;
        v
    }

    /// Renders one line of the `debug`-feature VM trace: opcode, `l,a`,
    /// `b`, `t`, then the live stack with the base and top cells
    /// marked (spec §6).
    #[cfg(feature = "debug")]
    fn trace_line(&self, instr: Instruction) -> String {
        let mnemonic = match instr.m {
            Op::Lit => "LIT",
            Op::Opr => "OPR",
            Op::Lod => "LOD",
            Op::Sto => "STO",
            Op::Cal => "CAL",
            Op::Int => "INT",
            Op::Jmp => "JMP",
            Op::Jpc => "JPC",
        };

        let mut cells = Vec::with_capacity(self.t + 1);
        for i in 0..=self.t {
            let mut cell = self.stack[i].to_string();
            if i == self.b {
                cell = format!("[{}]", cell);
            }
            if i == self.t {
                cell = format!("{}^", cell);
            }
            cells.push(cell);
        }

        format!(
            "{:<4} {},{:<4} b={} t={}  {}",
            mnemonic,
            instr.l,
            instr.a,
            self.b,
            self.t,
            cells.join(" ")
        )
    }

    /// Runs `code` to completion, writing `assign V` trace lines (and,
    /// with the `debug` feature, a full per-instruction trace) to
    /// `out`.
    pub fn run(&mut self, code: &CodeBuffer, out: &mut impl std::io::Write) -> Result<(), RuntimeError> {
        self.p = 0;
        // Cell 0 is conventionally unused; the outermost frame's base
        // is 1, with its (never written, implicitly zero) static link,
        // dynamic link and return address occupying cells 1..3 — the
        // same layout a called procedure's frame gets (spec §4.6).
        self.b = 1;
        self.t = 0;
        self.depth = 0;

        loop {
            if self.p >= code.len() {
                return Err(RuntimeError::IllegalOpcode);
            }
            let instr = code.get(self.p);
            self.p += 1;

            #[cfg(feature = "debug")]
            {
                let _ = writeln!(out, "{}", self.trace_line(instr));
            }

            if !self.step(instr, out)? {
                return Ok(());
            }
        }
    }

    /// Executes one instruction. Returns `Ok(false)` when the outermost
    /// `RET` ends the program.
    fn step(&mut self, instr: Instruction, out: &mut impl std::io::Write) -> Result<bool, RuntimeError> {
        match instr.m {
            Op::Lit => {
                self.push(instr.a)?;
            }
            Op::Lod => {
                let base = self.base(self.b, instr.l);
                let value = self.stack[base + instr.a as usize];
                self.push(value)?;
            }
            Op::Sto => {
                let value = self.pop();
                let base = self.base(self.b, instr.l);
                self.stack[base + instr.a as usize] = value;
                let _ = writeln!(out, "assign {}", value);
            }
            Op::Cal => {
                let new_base = self.t + 1;
                if new_base + RETURN_ADDR_OFFSET as usize >= STACK_SIZE {
                    return Err(RuntimeError::StackOverflow);
                }
                let static_link = self.base(self.b, instr.l) as i64;
                self.stack[new_base + STATIC_LINK_OFFSET as usize] = static_link;
                self.stack[new_base + DYNAMIC_LINK_OFFSET as usize] = self.b as i64;
                self.stack[new_base + RETURN_ADDR_OFFSET as usize] = self.p as i64;
                self.b = new_base;
                // `t` is left unchanged: the callee's own leading `INT`
                // instruction accounts for the three header cells,
                // since its `dx` operand starts at `LOCALS_OFFSET` (3).
                self.p = instr.a as usize;
                self.depth += 1;
                trace!("call depth {} (entering p={})", self.depth, self.p);
            }
            Op::Int => {
                let new_t = self.t as i64 + instr.a;
                if new_t < 0 || new_t as usize >= STACK_SIZE {
                    return Err(RuntimeError::StackOverflow);
                }
                self.t = new_t as usize;
            }
            Op::Jmp => {
                self.p = instr.a as usize;
            }
            Op::Jpc => {
                // "jump when false" (spec §9 Design Note 1).
                let cond = self.pop();
                if cond == 0 {
                    self.p = instr.a as usize;
                }
            }
            Op::Opr => return self.operate(instr.a),
        }
        Ok(true)
    }

    fn operate(&mut self, code: i64) -> Result<bool, RuntimeError> {
        match code {
            opr::RET => {
                let return_addr = self.stack[self.b + RETURN_ADDR_OFFSET as usize] as usize;
                let dynamic_link = self.stack[self.b + DYNAMIC_LINK_OFFSET as usize] as usize;
                self.t = self.b - 1;
                self.b = dynamic_link;
                self.p = return_addr;
                // The outermost frame's dynamic link was never written
                // and stays 0; returning from it halts the program.
                if self.b == 0 {
                    debug!("halt");
                    return Ok(false);
                }
                self.depth -= 1;
                trace!("call depth {} (returned to p={})", self.depth, self.p);
            }
            opr::NEGATE => {
                let v = self.pop();
                self.push(-v)?;
            }
            opr::ADD => {
                let b = self.pop();
                let a = self.pop();
                self.push(a + b)?;
            }
            opr::SUB => {
                let b = self.pop();
                let a = self.pop();
                self.push(a - b)?;
            }
            opr::MUL => {
                let b = self.pop();
                let a = self.pop();
                self.push(a * b)?;
            }
            opr::DIV => {
                let b = self.pop();
                let a = self.pop();
                self.push(a / b)?;
            }
            opr::ODD => {
                let v = self.pop();
                self.push((v % 2 != 0) as i64)?;
            }
            opr::EQ => {
                let b = self.pop();
                let a = self.pop();
                self.push((a == b) as i64)?;
            }
            opr::NEQ => {
                let b = self.pop();
                let a = self.pop();
                self.push((a != b) as i64)?;
            }
            opr::LT => {
                let b = self.pop();
                let a = self.pop();
                self.push((a < b) as i64)?;
            }
            opr::GEQ => {
                let b = self.pop();
                let a = self.pop();
                self.push((a >= b) as i64)?;
            }
            opr::GT => {
                let b = self.pop();
                let a = self.pop();
                self.push((a > b) as i64)?;
            }
            opr::LEQ => {
                let b = self.pop();
                let a = self.pop();
                self.push((a <= b) as i64)?;
            }
            _ => return Err(RuntimeError::IllegalOperator),
        }
        Ok(true)
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::compile;

    fn run_source(src: &str) -> Vec<String> {
        let (code, _) = compile(src).unwrap();
        let mut out = Vec::new();
        Interpreter::new().run(&code, &mut out).unwrap();
        String::from_utf8(out).unwrap().lines().map(String::from).collect()
    }

    #[test]
    fn assigns_are_traced() {
        let lines = run_source("var x; begin x := 41; x := x + 1 end.");
        assert_eq!(lines, vec!["assign 41", "assign 42"]);
    }

    #[test]
    fn while_loop_sums() {
        let lines = run_source(
            "var i, s; begin i := 0; s := 0; \
             while i < 5 do begin s := s + i; i := i + 1 end; \
             s := s end.",
        );
        assert_eq!(lines.last().unwrap(), "assign 10");
    }

    #[test]
    fn if_false_skips_body() {
        let lines = run_source("var x; begin x := 0; if x > 0 then x := 99 end.");
        assert_eq!(lines, vec!["assign 0"]);
    }

    #[test]
    fn procedure_call_runs_and_returns() {
        let lines = run_source(
            "var x; procedure p; begin x := x + 1 end; \
             begin x := 0; call p; call p end.",
        );
        assert_eq!(lines, vec!["assign 0", "assign 1", "assign 2"]);
    }

    #[test]
    fn nested_procedures_see_outer_locals() {
        let lines = run_source(
            "var x; procedure outer; var y; procedure inner; \
             begin y := x + 1; x := y end; \
             begin y := 0; call inner end; \
             begin x := 10; call outer end.",
        );
        assert_eq!(lines, vec!["assign 10", "assign 0", "assign 11", "assign 11"]);
    }

    #[test]
    fn odd_and_integer_division() {
        let lines = run_source(
            "var x, y; begin x := 7 / 2; y := x; \
             if odd(y) then y := y end.",
        );
        assert_eq!(lines, vec!["assign 3", "assign 3", "assign 3"]);
    }

    #[test]
    fn relational_operators() {
        let lines = run_source(
            "var a, b, c; begin a := 1; b := 2; \
             if a < b then c := 1; \
             if a # b then c := 1; \
             if b >= a then c := 1 end.",
        );
        assert_eq!(lines, vec!["assign 1", "assign 2", "assign 1", "assign 1", "assign 1"]);
    }

    #[test]
    fn stack_overflow_is_reported() {
        let src = "procedure p; begin call p end; begin call p end.";
        let (code, _) = compile(src).unwrap();
        let mut out = Vec::new();
        let err = Interpreter::new().run(&code, &mut out).unwrap_err();
        assert_eq!(err, RuntimeError::StackOverflow);
    }
}
