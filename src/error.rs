//! Error taxonomy for the compiler and interpreter.
//!
//! Every error is fatal: there is no panic-mode recovery and no error
//! list. A stage function returns as soon as it hits the first problem,
//! and the caller propagates it with `?` all the way out to `main`.

use thiserror::Error;

/// A `(line, column)` position, one-indexed. The lexer's current
/// position when an error is detected, which is one character ahead of
/// the offending token (see spec §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub line: usize,
    pub col: usize,
}

/// Compile-time error categories (spec §7: Lexical, Syntactic,
/// Semantic, Capacity).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileErrorKind {
    #[error("{0}")]
    Lexical(String),
    #[error("{0}")]
    Syntactic(String),
    #[error("{0}")]
    Semantic(String),
    #[error("{0}")]
    Capacity(String),
}

/// A fatal compile-time error with the position it was detected at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub kind: CompileErrorKind,
    pub span: Span,
}

impl CompileError {
    pub fn lexical(message: impl Into<String>, span: Span) -> Self {
        Self { kind: CompileErrorKind::Lexical(message.into()), span }
    }

    pub fn syntactic(message: impl Into<String>, span: Span) -> Self {
        Self { kind: CompileErrorKind::Syntactic(message.into()), span }
    }

    pub fn semantic(message: impl Into<String>, span: Span) -> Self {
        Self { kind: CompileErrorKind::Semantic(message.into()), span }
    }

    pub fn capacity(message: impl Into<String>, span: Span) -> Self {
        Self { kind: CompileErrorKind::Capacity(message.into()), span }
    }

    /// Render in the wire format from spec §6: `error: <message>.`
    /// followed by `line L, column C`.
    pub fn report(&self) -> String {
        format!("error: {}.\nline {}, column {}", self.kind, self.span.line, self.span.col)
    }
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.report())
    }
}

impl std::error::Error for CompileError {}

/// Fatal runtime error categories (spec §7: Runtime class).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("illegal opcode")]
    IllegalOpcode,
    #[error("illegal operator")]
    IllegalOperator,
    #[error("stack overflow")]
    StackOverflow,
}

impl RuntimeError {
    /// Render in the wire format from spec §6: `error: <message>.` alone
    /// (no position — the interpreter has no source spans).
    pub fn report(&self) -> String {
        format!("error: {}.", self)
    }
}

/// Top-level error type returned by the pipeline entry point, covering
/// both the compile and the run stage.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl PipelineError {
    pub fn report(&self) -> String {
        match self {
            PipelineError::Compile(e) => e.report(),
            PipelineError::Runtime(e) => e.report(),
        }
    }
}
