//! PL/0 lexer: groups source characters into tokens.

use log::trace;

use crate::error::{CompileError, Span};
use crate::source::CharSource;
use crate::token::Token;

pub struct Lexer<'a> {
    source: CharSource<'a>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        trace!("tokenization start ({} bytes)", source.len());
        Self { source: CharSource::new(source) }
    }

    fn span(&self) -> Span {
        let (line, col) = self.source.current_pos();
        Span { line, col }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.source.peek(), Some(c) if c.is_whitespace()) {
            self.source.next_char();
        }
    }

    /// The position the next `advance()` call will report errors at
    /// (one character ahead of the token just produced, per spec §7).
    pub fn current_span(&self) -> Span {
        self.span()
    }

    /// Produce the next token. Returning an owned `Token` (rather than
    /// stashing the lexed value in a field the parser must remember to
    /// read first) is the one change from the reference lexer's
    /// mutable-shared-state design that spec §9 calls out explicitly.
    ///
    /// Reaching true end-of-input between tokens is not itself an
    /// error: it yields `Token::Nil`, which no parser production
    /// expects, so an unfinished program surfaces its own "expected
    /// ..." syntactic error rather than a generic EOF one. EOF reached
    /// *mid-token* (e.g. a bare trailing `:`) is a lexical error.
    pub fn advance(&mut self) -> Result<Token, CompileError> {
        self.skip_whitespace();

        let ch = match self.source.peek() {
            Some(c) => c,
            None => return Ok(Token::Nil),
        };

        if ch.is_ascii_alphabetic() {
            self.lex_word()
        } else if ch.is_ascii_digit() {
            self.lex_number()
        } else {
            self.lex_punctuation()
        }
    }

    fn lex_word(&mut self) -> Result<Token, CompileError> {
        let mut word = String::new();
        while matches!(self.source.peek(), Some(c) if c.is_ascii_alphanumeric()) {
            word.push(self.source.next_char().unwrap());
            if word.len() > Token::MAX_IDENT_LEN {
                return Err(CompileError::lexical(
                    format!(
                        "identifier '{}...' exceeds the maximum length of {} characters",
                        &word[..Token::MAX_IDENT_LEN],
                        Token::MAX_IDENT_LEN
                    ),
                    self.span(),
                ));
            }
        }

        Ok(Token::reserved_word(&word).unwrap_or(Token::Ident(word)))
    }

    fn lex_number(&mut self) -> Result<Token, CompileError> {
        let mut digits = String::new();
        while matches!(self.source.peek(), Some(c) if c.is_ascii_digit()) {
            digits.push(self.source.next_char().unwrap());
        }

        let value: i64 = digits.parse().map_err(|_| {
            CompileError::lexical(
                format!("number literal '{}' is out of range", digits),
                self.span(),
            )
        })?;

        Ok(Token::Number(value))
    }

    fn lex_punctuation(&mut self) -> Result<Token, CompileError> {
        let ch = self.source.next_char().unwrap();
        let token = match ch {
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Times,
            '/' => Token::Slash,
            '(' => Token::Lparen,
            ')' => Token::Rparen,
            '=' => Token::Eql,
            ',' => Token::Comma,
            '.' => Token::Period,
            '#' => Token::Neq,
            '<' => Token::Lss,
            '>' => Token::Gtr,
            ';' => Token::Semicolon,
            '[' => Token::Leq,
            ']' => Token::Geq,
            ':' => {
                if self.source.peek() == Some('=') {
                    self.source.next_char();
                    Token::Becomes
                } else {
                    return Err(CompileError::lexical(
                        "expected '=' after ':'",
                        self.span(),
                    ));
                }
            }
            other => {
                return Err(CompileError::lexical(
                    format!("illegal character '{}'", other),
                    self.span(),
                ))
            }
        };
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(src: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(src);
        let mut out = Vec::new();
        loop {
            match lexer.advance().unwrap() {
                Token::Nil => break,
                t => out.push(t),
            }
        }
        out
    }

    #[test]
    fn reserved_words_vs_identifiers() {
        let mut lexer = Lexer::new("begin foo end");
        assert_eq!(lexer.advance().unwrap(), Token::Begin);
        assert_eq!(lexer.advance().unwrap(), Token::Ident("foo".into()));
        assert_eq!(lexer.advance().unwrap(), Token::End);
    }

    #[test]
    fn numbers() {
        let mut lexer = Lexer::new("0 123 0007");
        assert_eq!(lexer.advance().unwrap(), Token::Number(0));
        assert_eq!(lexer.advance().unwrap(), Token::Number(123));
        assert_eq!(lexer.advance().unwrap(), Token::Number(7));
    }

    #[test]
    fn bracket_aliases_for_relops() {
        let mut lexer = Lexer::new("[ ]");
        assert_eq!(lexer.advance().unwrap(), Token::Leq);
        assert_eq!(lexer.advance().unwrap(), Token::Geq);
    }

    #[test]
    fn becomes_requires_equals() {
        let mut lexer = Lexer::new(":=");
        assert_eq!(lexer.advance().unwrap(), Token::Becomes);

        let mut bad = Lexer::new(":x");
        assert!(bad.advance().is_err());
    }

    #[test]
    fn identifier_too_long_is_lexical_error() {
        let mut lexer = Lexer::new("abcdefghijk");
        let err = lexer.advance().unwrap_err();
        assert!(matches!(err.kind, crate::error::CompileErrorKind::Lexical(_)));
    }

    #[test]
    fn illegal_character_is_lexical_error() {
        let mut lexer = Lexer::new("@");
        assert!(lexer.advance().is_err());
    }

    #[test]
    fn whole_program_tokenizes() {
        let toks = tokens("const a = 5; var r; begin r := a end.");
        assert_eq!(toks[0], Token::Const);
        assert_eq!(toks.last().unwrap(), &Token::Period);
    }
}
