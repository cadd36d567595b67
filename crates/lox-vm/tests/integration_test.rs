//! End-to-end scenarios run through the public `Vm` API exactly as a script
//! runner would, with stdout captured for exact-match assertions.

use lox_vm::{InterpretResult, Vm};
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
struct CapturedOutput(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for CapturedOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl CapturedOutput {
    fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).expect("print output is always UTF-8")
    }
}

fn run(source: &str) -> (InterpretResult, String) {
    let out = CapturedOutput::default();
    let mut vm = Vm::with_stdout(Box::new(out.clone()));
    let result = vm.interpret(source);
    (result, out.text())
}

#[test]
fn arithmetic_and_string_concatenation() {
    let (result, stdout) = run(
        r#"
        print 1 + 2;
        print "foo" + "bar";
        print (2 + 3) * 4;
    "#,
    );
    assert_eq!(result, InterpretResult::Ok);
    assert_eq!(stdout, "3\nfoobar\n20\n");
}

#[test]
fn closures_keep_independent_state_per_instantiation() {
    let (result, stdout) = run(
        r#"
        fun makeCounter() {
            var count = 0;
            fun counter() {
                count = count + 1;
                print count;
            }
            return counter;
        }
        var a = makeCounter();
        var b = makeCounter();
        a();
        a();
        b();
    "#,
    );
    assert_eq!(result, InterpretResult::Ok);
    assert_eq!(stdout, "1\n2\n1\n");
}

#[test]
fn classes_initialize_fields_and_dispatch_methods() {
    let (result, stdout) = run(
        r#"
        class Point {
            init(x, y) {
                this.x = x;
                this.y = y;
            }
            sum() {
                return this.x + this.y;
            }
        }
        var p = Point(3, 4);
        print p.sum();
    "#,
    );
    assert_eq!(result, InterpretResult::Ok);
    assert_eq!(stdout, "7\n");
}

#[test]
fn inheritance_dispatches_to_the_most_derived_override() {
    let (result, stdout) = run(
        r#"
        class Shape {
            area() { return 0; }
            describe() { return "area=" + "?"; }
        }
        class Square < Shape {
            init(side) { this.side = side; }
            area() { return this.side * this.side; }
        }
        var s = Square(5);
        print s.area();
    "#,
    );
    assert_eq!(result, InterpretResult::Ok);
    assert_eq!(stdout, "25\n");
}

#[test]
fn super_calls_reach_the_parent_implementation() {
    let (result, stdout) = run(
        r#"
        class A {
            greet() { return "A"; }
        }
        class B < A {
            greet() { return super.greet() + "B"; }
        }
        print B().greet();
    "#,
    );
    assert_eq!(result, InterpretResult::Ok);
    assert_eq!(stdout, "AB\n");
}

#[test]
fn control_flow_for_and_while_and_logical_operators() {
    let (result, stdout) = run(
        r#"
        var total = 0;
        for (var i = 1; i <= 5; i = i + 1) {
            total = total + i;
        }
        print total;
        print (true and false) or (1 < 2);
    "#,
    );
    assert_eq!(result, InterpretResult::Ok);
    assert_eq!(stdout, "15\ntrue\n");
}

#[test]
fn undefined_global_read_reports_runtime_error_and_stops_execution() {
    let (result, stdout) = run(
        r#"
        print "before";
        print undefinedThing;
        print "after";
    "#,
    );
    assert_eq!(result, InterpretResult::RuntimeError);
    assert_eq!(stdout, "before\n");
}

#[test]
fn type_mismatch_on_arithmetic_is_a_runtime_error() {
    let (result, _stdout) = run(r#"print 1 + "two";"#);
    assert_eq!(result, InterpretResult::RuntimeError);
}

#[test]
fn malformed_source_is_a_compile_error_and_runs_nothing() {
    let (result, stdout) = run("print 1 +");
    assert_eq!(result, InterpretResult::CompileError);
    assert_eq!(stdout, "");
}

#[test]
fn deeply_recursive_calls_overflow_cleanly_rather_than_crashing() {
    let (result, _stdout) = run(
        r#"
        fun recurse(n) {
            return recurse(n + 1);
        }
        recurse(0);
    "#,
    );
    assert_eq!(result, InterpretResult::RuntimeError);
}
