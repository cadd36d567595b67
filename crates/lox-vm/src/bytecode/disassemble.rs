// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Lox Language Project

//! Static instruction lengths and a chunk disassembler, used by the CLI's
//! `--disassemble` flag and exercised by the offset-roundtrip property test.

use super::{op, Chunk};
use crate::value::Value;
use std::fmt::Write as _;

/// Byte length of the instruction starting with `opcode`, including the
/// opcode byte itself. Every opcode but `CLOSURE` has a fixed length;
/// `CLOSURE`'s base length (opcode plus constant index) is returned here,
/// but its true encoded length also includes two bytes per captured
/// upvalue, which `disassemble_chunk` accounts for separately.
#[must_use]
pub const fn instruction_length(opcode: u8) -> usize {
    match opcode {
        op::NIL | op::TRUE | op::FALSE | op::POP | op::EQUAL | op::GREATER | op::LESS | op::ADD | op::SUBTRACT
        | op::MULTIPLY | op::DIVIDE | op::NEGATE | op::NOT | op::PRINT | op::CLOSE_UPVALUE | op::RETURN
        | op::INHERIT => 1,
        op::CONSTANT | op::GET_LOCAL | op::SET_LOCAL | op::GET_GLOBAL | op::SET_GLOBAL | op::DEFINE_GLOBAL
        | op::GET_UPVALUE | op::SET_UPVALUE | op::GET_PROPERTY | op::SET_PROPERTY | op::GET_SUPER | op::CALL
        | op::CLASS | op::METHOD | op::CLOSURE => 2,
        op::JUMP | op::JUMP_IF_FALSE | op::LOOP | op::INVOKE | op::SUPER_INVOKE => 3,
        _ => 1,
    }
}

/// One decoded instruction: its starting offset, source line, and a
/// human-readable rendering.
pub struct DisassembledInstruction {
    pub offset: usize,
    pub line: u32,
    pub text: String,
}

/// Walks `chunk.code` start to end, yielding one entry per instruction.
///
/// `CLOSURE` is the only variable-length instruction: its operand count
/// depends on the target function's upvalue count. Resolving that count
/// requires the heap the constant pool's `ObjRef` points into, which
/// `bytecode` cannot depend on directly (`Heap` itself owns `Chunk`s), so
/// callers supply `upvalue_count_of` the same way `Heap::find_string` takes
/// a content-equality closure to avoid the reverse dependency.
#[must_use]
pub fn disassemble_chunk(chunk: &Chunk, upvalue_count_of: impl Fn(&Value) -> usize) -> Vec<DisassembledInstruction> {
    let mut out = Vec::new();
    let mut offset = 0;
    while offset < chunk.code.len() {
        let opcode = chunk.code[offset];
        let line = chunk.lines[offset];
        let (text, len) = describe(chunk, offset, opcode, &upvalue_count_of);
        out.push(DisassembledInstruction { offset, line, text });
        offset += len;
    }
    out
}

fn describe(chunk: &Chunk, offset: usize, opcode: u8, upvalue_count_of: &impl Fn(&Value) -> usize) -> (String, usize) {
    let mut text = String::new();
    match opcode {
        op::CONSTANT => {
            let index = chunk.code[offset + 1] as usize;
            let _ = write!(text, "OP_CONSTANT {} '{:?}'", index, chunk.constants[index]);
            (text, 2)
        }
        op::CLOSURE => {
            let index = chunk.code[offset + 1] as usize;
            let upvalue_count = upvalue_count_of(&chunk.constants[index]);
            let _ = write!(text, "OP_CLOSURE {index}");
            (text, 2 + upvalue_count * 2)
        }
        op::JUMP | op::JUMP_IF_FALSE => {
            let jump = chunk.read_u16(offset + 1);
            let _ = write!(text, "{} -> {}", name(opcode), offset + 3 + jump as usize);
            (text, 3)
        }
        op::LOOP => {
            let jump = chunk.read_u16(offset + 1);
            let _ = write!(text, "OP_LOOP -> {}", offset + 3 - jump as usize);
            (text, 3)
        }
        op::INVOKE | op::SUPER_INVOKE => {
            let index = chunk.code[offset + 1] as usize;
            let argc = chunk.code[offset + 2];
            let _ = write!(text, "{} ({} args) '{:?}'", name(opcode), argc, chunk.constants[index]);
            (text, 3)
        }
        _ if instruction_length(opcode) == 2 => {
            let operand = chunk.code[offset + 1];
            let _ = write!(text, "{} {operand}", name(opcode));
            (text, 2)
        }
        _ => {
            text.push_str(name(opcode));
            (text, 1)
        }
    }
}

const fn name(opcode: u8) -> &'static str {
    match opcode {
        op::CONSTANT => "OP_CONSTANT",
        op::NIL => "OP_NIL",
        op::TRUE => "OP_TRUE",
        op::FALSE => "OP_FALSE",
        op::POP => "OP_POP",
        op::GET_LOCAL => "OP_GET_LOCAL",
        op::SET_LOCAL => "OP_SET_LOCAL",
        op::GET_GLOBAL => "OP_GET_GLOBAL",
        op::SET_GLOBAL => "OP_SET_GLOBAL",
        op::DEFINE_GLOBAL => "OP_DEFINE_GLOBAL",
        op::GET_UPVALUE => "OP_GET_UPVALUE",
        op::SET_UPVALUE => "OP_SET_UPVALUE",
        op::GET_PROPERTY => "OP_GET_PROPERTY",
        op::SET_PROPERTY => "OP_SET_PROPERTY",
        op::GET_SUPER => "OP_GET_SUPER",
        op::EQUAL => "OP_EQUAL",
        op::GREATER => "OP_GREATER",
        op::LESS => "OP_LESS",
        op::ADD => "OP_ADD",
        op::SUBTRACT => "OP_SUBTRACT",
        op::MULTIPLY => "OP_MULTIPLY",
        op::DIVIDE => "OP_DIVIDE",
        op::NEGATE => "OP_NEGATE",
        op::NOT => "OP_NOT",
        op::PRINT => "OP_PRINT",
        op::JUMP => "OP_JUMP",
        op::JUMP_IF_FALSE => "OP_JUMP_IF_FALSE",
        op::LOOP => "OP_LOOP",
        op::CALL => "OP_CALL",
        op::CLOSURE => "OP_CLOSURE",
        op::CLOSE_UPVALUE => "OP_CLOSE_UPVALUE",
        op::RETURN => "OP_RETURN",
        op::CLASS => "OP_CLASS",
        op::INHERIT => "OP_INHERIT",
        op::METHOD => "OP_METHOD",
        op::INVOKE => "OP_INVOKE",
        op::SUPER_INVOKE => "OP_SUPER_INVOKE",
        _ => "OP_UNKNOWN",
    }
}

#[cfg(test)]
mod disassemble_test {
    use super::*;
    use crate::value::Value;

    #[test]
    fn disassembling_covers_every_byte_exactly_once() {
        let mut chunk = Chunk::new();
        let index = chunk.add_constant(Value::Number(1.0));
        chunk.write_byte(op::CONSTANT, 1);
        chunk.write_byte(u8::try_from(index).unwrap(), 1);
        chunk.write_byte(op::NIL, 2);
        chunk.write_byte(op::ADD, 2);
        chunk.write_byte(op::RETURN, 3);

        let instructions = disassemble_chunk(&chunk, |_| 0);
        let offsets: Vec<usize> = instructions.iter().map(|i| i.offset).collect();
        assert_eq!(offsets, vec![0, 2, 3, 4]);
    }

    #[test]
    fn jump_targets_resolve_to_absolute_offsets() {
        let mut chunk = Chunk::new();
        chunk.write_byte(op::JUMP, 1);
        chunk.write_u16(2, 1);
        chunk.write_byte(op::NIL, 1);
        chunk.write_byte(op::NIL, 1);
        chunk.write_byte(op::POP, 1);

        let instructions = disassemble_chunk(&chunk, |_| 0);
        assert!(instructions[0].text.contains("-> 5"));
    }
}
