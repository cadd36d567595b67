// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Lox Language Project

use super::compile;
use crate::bytecode::op;
use crate::heap::Heap;
use crate::value::Obj;

fn compiled_code(source: &str) -> (Vec<u8>, Heap) {
    let mut heap = Heap::new();
    let function = compile(source, &mut heap).expect("source should compile");
    let code = match heap.get(function) {
        Obj::Function(f) => f.chunk.code.clone(),
        _ => unreachable!(),
    };
    (code, heap)
}

#[test]
fn number_literal_emits_constant() {
    let (code, _heap) = compiled_code("1;");
    assert_eq!(code[0], op::CONSTANT);
    assert_eq!(code[2], op::POP);
}

#[test]
fn print_statement_emits_print() {
    let (code, _heap) = compiled_code("print 1;");
    assert!(code.contains(&op::PRINT));
}

#[test]
fn undefined_variable_read_still_compiles_as_get_global() {
    let (code, _heap) = compiled_code("print x;");
    assert!(code.contains(&op::GET_GLOBAL));
}

#[test]
fn local_variable_uses_get_local_not_get_global() {
    let (code, _heap) = compiled_code("{ var x = 1; print x; }");
    assert!(code.contains(&op::GET_LOCAL));
}

#[test]
fn while_loop_emits_backward_loop_instruction() {
    let (code, _heap) = compiled_code("while (true) { 1; }");
    assert!(code.contains(&op::LOOP));
}

#[test]
fn function_declaration_emits_closure() {
    let (code, _heap) = compiled_code("fun f() { return 1; }");
    assert!(code.contains(&op::CLOSURE));
}

#[test]
fn class_declaration_emits_class_and_method() {
    let (code, _heap) = compiled_code("class A { m() { return 1; } }");
    assert!(code.contains(&op::CLASS));
    assert!(code.contains(&op::METHOD));
}

#[test]
fn redeclaring_a_local_in_the_same_scope_is_an_error() {
    let mut heap = Heap::new();
    let result = compile("{ var a = 1; var a = 2; }", &mut heap);
    assert!(result.is_err());
}

#[test]
fn returning_from_top_level_is_an_error() {
    let mut heap = Heap::new();
    let result = compile("return 1;", &mut heap);
    assert!(result.is_err());
}

#[test]
fn unterminated_block_reports_compile_error() {
    let mut heap = Heap::new();
    let result = compile("{ var a = 1;", &mut heap);
    assert!(result.is_err());
}
