// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Lox Language Project

use super::{InterpretResult, Vm};

#[test]
fn arithmetic_expression_statement_runs_to_completion() {
    let mut vm = Vm::new();
    assert_eq!(vm.interpret("1 + 2 * 3;"), InterpretResult::Ok);
}

#[test]
fn undefined_variable_read_is_a_runtime_error() {
    let mut vm = Vm::new();
    assert_eq!(vm.interpret("print x;"), InterpretResult::RuntimeError);
}

#[test]
fn syntax_error_is_a_compile_error() {
    let mut vm = Vm::new();
    assert_eq!(vm.interpret("1 +;"), InterpretResult::CompileError);
}

#[test]
fn closures_capture_enclosing_locals_by_reference() {
    let mut vm = Vm::new();
    let source = r#"
        fun makeCounter() {
            var count = 0;
            fun counter() {
                count = count + 1;
                return count;
            }
            return counter;
        }
        var counter = makeCounter();
        counter();
        counter();
    "#;
    assert_eq!(vm.interpret(source), InterpretResult::Ok);
}

#[test]
fn classes_support_methods_and_fields() {
    let mut vm = Vm::new();
    let source = r#"
        class Counter {
            init() { this.value = 0; }
            bump() { this.value = this.value + 1; return this.value; }
        }
        var c = Counter();
        c.bump();
        c.bump();
    "#;
    assert_eq!(vm.interpret(source), InterpretResult::Ok);
}

#[test]
fn superclass_methods_are_inherited_and_overridable() {
    let mut vm = Vm::new();
    let source = r#"
        class Animal {
            speak() { return "..."; }
        }
        class Dog < Animal {
            speak() { return "Woof"; }
            parentSpeak() { return super.speak(); }
        }
        var d = Dog();
        d.speak();
        d.parentSpeak();
    "#;
    assert_eq!(vm.interpret(source), InterpretResult::Ok);
}

#[test]
fn calling_a_non_callable_value_is_a_runtime_error() {
    let mut vm = Vm::new();
    assert_eq!(vm.interpret("var x = 1; x();"), InterpretResult::RuntimeError);
}

#[test]
fn wrong_arity_call_is_a_runtime_error() {
    let mut vm = Vm::new();
    assert_eq!(vm.interpret("fun f(a) { return a; } f();"), InterpretResult::RuntimeError);
}

#[test]
fn stress_gc_does_not_collect_live_data() {
    let mut vm = Vm::new();
    vm.set_stress_gc(true);
    let source = r#"
        var total = 0;
        for (var i = 0; i < 50; i = i + 1) {
            total = total + i;
        }
        print total;
    "#;
    assert_eq!(vm.interpret(source), InterpretResult::Ok);
}

#[test]
fn native_clock_is_callable_with_no_arguments() {
    let mut vm = Vm::new();
    assert_eq!(vm.interpret("clock();"), InterpretResult::Ok);
}
