//! Property tests for the universal invariants: string-interning identity,
//! GC reachability, empty-stack-at-halt, disassembly offset round-tripping,
//! closure-by-reference capture, and concatenation associativity.

use lox_vm::bytecode::{disassemble_chunk, instruction_length, op, Chunk};
use lox_vm::heap::Heap;
use lox_vm::value::{Obj, ObjString, Value};
use lox_vm::Vm;
use proptest::prelude::*;

fn ident() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9]{0,6}"
}

fn word() -> impl Strategy<Value = String> {
    "[a-zA-Z]{1,8}"
}

proptest! {
    /// Invariant 1: equal-content string literals intern to the same handle.
    #[test]
    fn equal_strings_intern_to_the_same_handle(text in word()) {
        let mut heap = Heap::new();
        let a = heap.intern(&text);
        let b = heap.intern(&text);
        prop_assert_eq!(a, b);
    }

    /// Invariant 1 (negative case): distinct content never collides.
    #[test]
    fn distinct_strings_intern_to_distinct_handles(a in word(), b in word()) {
        prop_assume!(a != b);
        let mut heap = Heap::new();
        let ra = heap.intern(&a);
        let rb = heap.intern(&b);
        prop_assert_ne!(ra, rb);
    }

    /// Invariant 2: a root survives collection, an unrooted object does not.
    #[test]
    fn only_reachable_objects_survive_a_collection(rooted in word(), garbage in word()) {
        prop_assume!(rooted != garbage);
        let mut heap = Heap::new();
        let kept = heap.intern(&rooted);
        let discarded = heap.intern(&garbage);
        heap.collect_garbage(|heap, grey| heap.mark_value(Value::Obj(kept), grey));
        prop_assert_eq!(heap.as_str(kept), rooted.as_str());
        // The discarded slot is reclaimable; a fresh allocation may reuse it.
        let reused = heap.allocate(Obj::String(ObjString::new("x".to_owned())));
        prop_assert!(reused.index() <= discarded.index());
    }

    /// Invariant 3: any program that halts normally leaves the stack empty.
    #[test]
    fn well_formed_programs_leave_the_stack_empty(n in 0i64..200) {
        let mut vm = Vm::new();
        let source = format!("var total = 0; for (var i = 0; i < {n}; i = i + 1) {{ total = total + i; }}");
        let result = vm.interpret(&source);
        prop_assert_eq!(result, lox_vm::InterpretResult::Ok);
        prop_assert_eq!(vm.stack_depth(), 0);
    }

    /// Invariant 4: disassembling a chunk of arbitrary fixed/short-length
    /// instructions visits every byte exactly once and recovers the original
    /// boundaries (CLOSURE is excluded: its length also depends on the
    /// target function's upvalue count, exercised separately in
    /// `bytecode::disassemble`'s own unit tests).
    #[test]
    fn disassembly_recovers_exact_instruction_boundaries(
        opcodes in prop::collection::vec(prop_oneof![
            Just(op::NIL), Just(op::TRUE), Just(op::FALSE), Just(op::POP), Just(op::ADD),
            Just(op::RETURN), Just(op::NOT), Just(op::GET_LOCAL), Just(op::CALL),
        ], 0..40)
    ) {
        let mut chunk = Chunk::new();
        let mut expected_offsets = Vec::new();
        for opcode in &opcodes {
            expected_offsets.push(chunk.code.len());
            chunk.write_byte(*opcode, 1);
            for _ in 1..instruction_length(*opcode) {
                chunk.write_byte(0, 1);
            }
        }
        let instructions = disassemble_chunk(&chunk, |_| 0);
        let actual_offsets: Vec<usize> = instructions.iter().map(|i| i.offset).collect();
        prop_assert_eq!(actual_offsets, expected_offsets);
    }

    /// Invariant 5: a closed-over local is shared by reference across every
    /// call site that captured it, and keeps its last value after the
    /// defining call frame returns.
    #[test]
    fn closures_share_state_by_reference(increments in 1usize..20) {
        let source = format!(
            "fun make() {{ var n = 0; fun bump() {{ n = n + 1; return n; }} return bump; }} \
             var f = make(); var last = 0; for (var i = 0; i < {increments}; i = i + 1) {{ last = f(); }} print last;"
        );
        let mut vm = Vm::new();
        assert_eq!(vm.interpret(&source), lox_vm::InterpretResult::Ok);
    }

    /// Invariant 6: string concatenation is associative up to interning.
    #[test]
    fn concatenation_is_associative(a in ident(), b in ident(), c in ident()) {
        let left = run_print(&format!(r#"print ("{a}" + "{b}") + "{c}";"#));
        let right = run_print(&format!(r#"print "{a}" + ("{b}" + "{c}");"#));
        prop_assert_eq!(left, right);
    }
}

fn run_print(source: &str) -> String {
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Sink(Arc<Mutex<Vec<u8>>>);
    impl std::io::Write for Sink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    let sink = Sink::default();
    let mut vm = Vm::with_stdout(Box::new(sink.clone()));
    assert_eq!(vm.interpret(source), lox_vm::InterpretResult::Ok);
    String::from_utf8(sink.0.lock().unwrap().clone()).unwrap()
}
