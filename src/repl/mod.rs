// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Lox Language Project

//! Read-eval-print loop for `loxi`.
//!
//! Reads source lines from stdin until EOF, feeding each one to a single
//! long-lived [`Vm`], mirroring the teacher's `repl::run` loop but reading
//! from stdin instead of a UART and printing straight to stdout/stderr.

use lox_vm::Vm;
use std::io::{self, BufRead, Write};

/// Runs the interactive loop until stdin is closed.
///
/// A compile or runtime error in one line does not end the session; the
/// `Vm`'s globals and heap persist across lines like a real REPL.
pub fn run() {
    let mut vm = Vm::new();
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        let _ = stdout.flush();

        let mut line = String::new();
        let bytes_read = stdin.lock().read_line(&mut line).unwrap_or(0);
        if bytes_read == 0 {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }

        // A line's result isn't surfaced as an exit code in REPL mode;
        // `Vm::interpret` has already written any diagnostic to stderr.
        let _ = vm.interpret(&line);
    }
}
