// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Lox Language Project

//! Error message formatting, kept out of the compiler and VM core so neither
//! has to know how its errors are rendered — mirrored on the teacher's
//! separation of `reader::{LexError, ParseError}` from `repl::print_error`
//! (`examples/sarnowski-lona/src/repl/mod.rs`).

use crate::scanner::{Token, TokenKind};
use std::io::Write;

/// Writes a compile-time diagnostic to `out` as
/// `[line N] Error[ at 'lexeme'|at end]: message`.
pub fn report_compile_error(out: &mut impl Write, token: &Token<'_>, message: &str) {
    let _ = write!(out, "[line {}] Error", token.line);
    match token.kind {
        TokenKind::Eof => {
            let _ = write!(out, " at end");
        }
        TokenKind::Error => {}
        _ => {
            let _ = write!(out, " at '{}'", token.lexeme);
        }
    }
    let _ = writeln!(out, ": {message}");
}

/// One frame of a runtime call trace, youngest first.
pub struct FrameTrace {
    pub line: u32,
    pub function_name: String,
}

/// Writes a runtime error and its call trace to `out`.
pub fn report_runtime_error(out: &mut impl Write, message: &str, trace: &[FrameTrace]) {
    let _ = writeln!(out, "{message}");
    for frame in trace {
        if frame.function_name.is_empty() {
            let _ = writeln!(out, "[line {}] in script", frame.line);
        } else {
            let _ = writeln!(out, "[line {}] in {}()", frame.line, frame.function_name);
        }
    }
}

#[cfg(test)]
mod diagnostics_test {
    use super::*;

    #[test]
    fn compile_error_at_token_includes_lexeme() {
        let mut buf = Vec::new();
        let token = Token {
            kind: TokenKind::Identifier,
            lexeme: "foo",
            line: 3,
        };
        report_compile_error(&mut buf, &token, "Expect ';' after value.");
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "[line 3] Error at 'foo': Expect ';' after value.\n"
        );
    }

    #[test]
    fn compile_error_at_eof_says_at_end() {
        let mut buf = Vec::new();
        let token = Token {
            kind: TokenKind::Eof,
            lexeme: "",
            line: 9,
        };
        report_compile_error(&mut buf, &token, "Expect expression.");
        assert_eq!(String::from_utf8(buf).unwrap(), "[line 9] Error at end: Expect expression.\n");
    }

    #[test]
    fn runtime_error_prints_trace_youngest_first() {
        let mut buf = Vec::new();
        report_runtime_error(
            &mut buf,
            "Undefined variable 'y'.",
            &[FrameTrace {
                line: 1,
                function_name: String::new(),
            }],
        );
        assert_eq!(String::from_utf8(buf).unwrap(), "Undefined variable 'y'.\n[line 1] in script\n");
    }
}
