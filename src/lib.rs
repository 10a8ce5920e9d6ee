//! A single-pass compiler and stack-machine interpreter for PL/0.
//!
//! The pipeline is: [`source`] groups bytes into characters with
//! line/column tracking, [`lexer`] groups characters into [`token`]s,
//! [`parser`] recognizes the grammar and emits [`code`] inline while
//! consulting a [`symtab`], and [`interp`] executes the resulting code
//! buffer. [`error`] carries the taxonomy shared by every stage.

pub mod code;
pub mod error;
pub mod interp;
pub mod lexer;
pub mod parser;
pub mod source;
pub mod symtab;
pub mod token;

use error::PipelineError;
use interp::Interpreter;

/// Compiles `source` and runs it to completion, writing `assign V`
/// trace lines (and, with the `debug` feature, a full compile/run
/// trace) to `out`.
pub fn run(source: &str, out: &mut impl std::io::Write) -> Result<(), PipelineError> {
    #[cfg(feature = "debug")]
    debug::dump_source(source, out);

    let (code, _symtab) = parser::compile(source)?;

    #[cfg(feature = "debug")]
    {
        debug::dump_symtab(&_symtab, out);
        debug::dump_code(&code, out);
    }

    Interpreter::new().run(&code, out)?;
    Ok(())
}

#[cfg(feature = "debug")]
mod debug {
    use crate::code::CodeBuffer;
    use crate::symtab::SymbolTable;

    pub fn dump_source(source: &str, out: &mut impl std::io::Write) {
        for (n, line) in source.lines().enumerate() {
            let _ = writeln!(out, "{:4} {}", n + 1, line);
        }
    }

    pub fn dump_symtab(symtab: &SymbolTable, out: &mut impl std::io::Write) {
        for (i, entry) in symtab.as_slice().iter().enumerate() {
            let _ = writeln!(
                out,
                "{:4} {:<10} {:?} level={} addr={}",
                i, entry.name, entry.kind, entry.level, entry.addr
            );
        }
    }

    pub fn dump_code(code: &CodeBuffer, out: &mut impl std::io::Write) {
        for (i, instr) in code.as_slice().iter().enumerate() {
            let _ = writeln!(out, "{:4} {:?} {} {}", i, instr.m, instr.l, instr.a);
        }
    }
}
