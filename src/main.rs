// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Lox Language Project

//! `loxi` - the command-line front end for the Lox bytecode VM.
//!
//! With no arguments, starts a REPL reading lines from stdin. With one
//! positional argument, runs that file. `--disassemble <path>` prints the
//! compiled bytecode instead of executing it.

mod repl;

use lox_vm::{InterpretResult, Vm};
use std::env;
use std::fs;
use std::process::ExitCode;

/// Exit code for a compile error, following the `sysexits.h` convention the
/// design notes point at (spec leaves the exact non-zero values open).
const EX_DATAERR: u8 = 65;
/// Exit code for a runtime error.
const EX_SOFTWARE: u8 = 70;
/// Exit code for a CLI usage error (bad arguments, unreadable file).
const EX_USAGE: u8 = 64;

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    match args.as_slice() {
        [] => {
            repl::run();
            ExitCode::SUCCESS
        }
        [path] => run_file(path),
        [flag, path] if flag == "--disassemble" => disassemble_file(path),
        _ => {
            eprintln!("usage: loxi [--disassemble] [script]");
            ExitCode::from(EX_USAGE)
        }
    }
}

fn run_file(path: &str) -> ExitCode {
    let source = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("loxi: can't read '{path}': {e}");
            return ExitCode::from(EX_USAGE);
        }
    };

    let mut vm = Vm::new();
    match vm.interpret(&source) {
        InterpretResult::Ok => ExitCode::SUCCESS,
        InterpretResult::CompileError => ExitCode::from(EX_DATAERR),
        InterpretResult::RuntimeError => ExitCode::from(EX_SOFTWARE),
    }
}

fn disassemble_file(path: &str) -> ExitCode {
    let source = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("loxi: can't read '{path}': {e}");
            return ExitCode::from(EX_USAGE);
        }
    };

    let mut vm = Vm::new();
    let function_ref = match vm.compile(&source) {
        Ok(f) => f,
        Err(_) => return ExitCode::from(EX_DATAERR),
    };
    for instruction in vm.disassemble(function_ref) {
        println!("{:04} {:>4} {}", instruction.offset, instruction.line, instruction.text);
    }
    ExitCode::SUCCESS
}
