// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Lox Language Project

//! The stack-based dispatch loop: call frames, globals, open upvalues, and
//! the runtime-error/call-trace machinery.

mod frame;

pub use frame::CallFrame;

use crate::bytecode::{disassemble_chunk, op, DisassembledInstruction};
use crate::compiler::{compile, CompileError};
use crate::diagnostics::{report_runtime_error, FrameTrace};
use crate::heap::{Heap, Table};
use crate::value::{
    NativeFn, Obj, ObjBoundMethod, ObjClass, ObjClosure, ObjInstance, ObjNative, ObjRef, ObjUpvalue, UpvalueLoc, Value,
};
use std::io::Write;

const FRAMES_MAX: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpretResult {
    Ok,
    CompileError,
    RuntimeError,
}

/// A runtime fault. Carries only the message; the call trace is assembled
/// from the VM's live frames at the point the error is reported, since the
/// frames are about to be unwound.
#[derive(Debug)]
pub struct RuntimeError {
    pub message: String,
}

pub struct Vm {
    stack: Vec<Value>,
    frames: Vec<CallFrame>,
    globals: Table,
    heap: Heap,
    /// Sorted by descending stack slot; at most one open upvalue per slot.
    open_upvalues: Vec<ObjRef>,
    init_string: ObjRef,
    /// Sink for `print` statements, abstracted the way the teacher
    /// abstracts console output behind its `Uart` trait
    /// (`examples/sarnowski-lona/src/uart/mod.rs`) so tests can capture
    /// output without touching the process's real stdout.
    stdout: Box<dyn Write>,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    #[must_use]
    pub fn new() -> Self {
        Self::with_stdout(Box::new(std::io::stdout()))
    }

    #[must_use]
    pub fn with_stdout(stdout: Box<dyn Write>) -> Self {
        let mut heap = Heap::new();
        let init_string = heap.intern("init");
        let mut vm = Self {
            stack: Vec::new(),
            frames: Vec::new(),
            globals: Table::new(),
            heap,
            open_upvalues: Vec::new(),
            init_string,
            stdout,
        };
        vm.define_native("clock", 0, native_clock);
        vm
    }

    /// Enables debug stress-testing: every allocation triggers a collection.
    pub fn set_stress_gc(&mut self, enabled: bool) {
        self.heap.stress_gc = enabled;
    }

    /// Number of values currently on the evaluation stack. A well-formed
    /// program that runs to completion leaves this at zero.
    #[must_use]
    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    /// Registers a host function callable from Lox as `name`.
    pub fn define_native(&mut self, name: &str, arity: u8, function: NativeFn) {
        let name_ref = self.heap.intern(name);
        let hash = self.hash_of(name_ref);
        let native_ref = self.heap.allocate(Obj::Native(ObjNative {
            arity,
            name: name_ref,
            function,
        }));
        self.globals.set(name_ref, hash, Value::Obj(native_ref));
    }

    pub fn interpret(&mut self, source: &str) -> InterpretResult {
        let function_ref = match compile(source, &mut self.heap) {
            Ok(f) => f,
            Err(_) => return InterpretResult::CompileError,
        };
        self.push(Value::Obj(function_ref));
        let closure_ref = self.heap.allocate(Obj::Closure(ObjClosure {
            function: function_ref,
            upvalues: Vec::new(),
        }));
        self.pop();
        self.push(Value::Obj(closure_ref));
        if let Err(e) = self.call(closure_ref, 0) {
            self.report_and_reset(&e);
            return InterpretResult::RuntimeError;
        }
        match self.run() {
            Ok(()) => InterpretResult::Ok,
            Err(e) => {
                self.report_and_reset(&e);
                InterpretResult::RuntimeError
            }
        }
    }

    /// Compiles `source` without running it, returning a handle to the
    /// top-level function. Used by the CLI's `--disassemble` flag, which
    /// wants the bytecode without executing it.
    pub fn compile(&mut self, source: &str) -> Result<ObjRef, CompileError> {
        compile(source, &mut self.heap)
    }

    /// Disassembles the chunk of the function at `function_ref`, resolving
    /// each `CLOSURE` instruction's true length through the heap.
    #[must_use]
    pub fn disassemble(&self, function_ref: ObjRef) -> Vec<DisassembledInstruction> {
        let chunk = match self.heap.get(function_ref) {
            Obj::Function(f) => &f.chunk,
            _ => unreachable!("disassemble called on a non-function object"),
        };
        disassemble_chunk(chunk, |value| match value {
            Value::Obj(r) => match self.heap.get(*r) {
                Obj::Function(f) => f.upvalue_count as usize,
                _ => 0,
            },
            _ => 0,
        })
    }

    fn report_and_reset(&mut self, error: &RuntimeError) {
        let trace: Vec<FrameTrace> = self
            .frames
            .iter()
            .rev()
            .map(|frame| {
                let function_ref = match self.heap.get(frame.closure) {
                    Obj::Closure(c) => c.function,
                    _ => unreachable!(),
                };
                match self.heap.get(function_ref) {
                    Obj::Function(f) => {
                        let line = f.chunk.lines.get(frame.ip.saturating_sub(1)).copied().unwrap_or(0);
                        let name = f.name.map_or_else(String::new, |n| self.heap.as_str(n).to_owned());
                        FrameTrace { line, function_name: name }
                    }
                    _ => unreachable!(),
                }
            })
            .collect();
        report_runtime_error(&mut std::io::stderr(), &error.message, &trace);
        self.reset_stack();
    }

    fn reset_stack(&mut self) {
        self.stack.clear();
        self.frames.clear();
        self.open_upvalues.clear();
    }

    fn error(&self, message: impl Into<String>) -> RuntimeError {
        RuntimeError { message: message.into() }
    }

    fn hash_of(&self, r: ObjRef) -> u32 {
        match self.heap.get(r) {
            Obj::String(s) => s.hash,
            _ => unreachable!("hash_of called on a non-string object"),
        }
    }

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Value {
        self.stack.pop().expect("stack underflow: dispatch loop bug")
    }

    fn peek(&self, distance: usize) -> Value {
        self.stack[self.stack.len() - 1 - distance]
    }

    fn current_closure(&self) -> ObjRef {
        self.frames.last().unwrap().closure
    }

    fn current_function(&self) -> ObjRef {
        match self.heap.get(self.current_closure()) {
            Obj::Closure(c) => c.function,
            _ => unreachable!(),
        }
    }

    fn read_byte(&mut self) -> u8 {
        let function = self.current_function();
        let ip = self.frames.last().unwrap().ip;
        let byte = match self.heap.get(function) {
            Obj::Function(f) => f.chunk.code[ip],
            _ => unreachable!(),
        };
        self.frames.last_mut().unwrap().ip += 1;
        byte
    }

    fn read_short(&mut self) -> u16 {
        let hi = self.read_byte();
        let lo = self.read_byte();
        u16::from_be_bytes([hi, lo])
    }

    fn read_constant(&mut self) -> Value {
        let index = self.read_byte();
        let function = self.current_function();
        match self.heap.get(function) {
            Obj::Function(f) => f.chunk.constants[index as usize],
            _ => unreachable!(),
        }
    }

    fn read_string(&mut self) -> ObjRef {
        match self.read_constant() {
            Value::Obj(r) => r,
            _ => unreachable!("constant pool name entries are always strings"),
        }
    }

    // ---- the dispatch loop -------------------------------------------------

    fn run(&mut self) -> Result<(), RuntimeError> {
        loop {
            if self.heap.should_collect() {
                self.collect_garbage();
            }
            let instruction = self.read_byte();
            match instruction {
                op::CONSTANT => {
                    let v = self.read_constant();
                    self.push(v);
                }
                op::NIL => self.push(Value::Nil),
                op::TRUE => self.push(Value::Bool(true)),
                op::FALSE => self.push(Value::Bool(false)),
                op::POP => {
                    self.pop();
                }
                op::GET_LOCAL => {
                    let slot = self.read_byte();
                    let base = self.frames.last().unwrap().slot_base;
                    self.push(self.stack[base + slot as usize]);
                }
                op::SET_LOCAL => {
                    let slot = self.read_byte();
                    let base = self.frames.last().unwrap().slot_base;
                    let value = self.peek(0);
                    self.stack[base + slot as usize] = value;
                }
                op::GET_GLOBAL => {
                    let name_ref = self.read_string();
                    let hash = self.hash_of(name_ref);
                    match self.globals.get(name_ref, hash) {
                        Some(v) => self.push(v),
                        None => {
                            let name = self.heap.as_str(name_ref).to_owned();
                            return Err(self.error(format!("Undefined variable '{name}'.")));
                        }
                    }
                }
                op::DEFINE_GLOBAL => {
                    let name_ref = self.read_string();
                    let hash = self.hash_of(name_ref);
                    let value = self.peek(0);
                    self.globals.set(name_ref, hash, value);
                    self.pop();
                }
                op::SET_GLOBAL => {
                    let name_ref = self.read_string();
                    let hash = self.hash_of(name_ref);
                    let value = self.peek(0);
                    if self.globals.set(name_ref, hash, value) {
                        self.globals.delete(name_ref, hash);
                        let name = self.heap.as_str(name_ref).to_owned();
                        return Err(self.error(format!("Undefined variable '{name}'.")));
                    }
                }
                op::GET_UPVALUE => {
                    let slot = self.read_byte();
                    let closure = self.current_closure();
                    let upvalue_ref = match self.heap.get(closure) {
                        Obj::Closure(c) => c.upvalues[slot as usize],
                        _ => unreachable!(),
                    };
                    self.push(self.read_upvalue(upvalue_ref));
                }
                op::SET_UPVALUE => {
                    let slot = self.read_byte();
                    let closure = self.current_closure();
                    let upvalue_ref = match self.heap.get(closure) {
                        Obj::Closure(c) => c.upvalues[slot as usize],
                        _ => unreachable!(),
                    };
                    let value = self.peek(0);
                    self.write_upvalue(upvalue_ref, value);
                }
                op::GET_PROPERTY => self.get_property()?,
                op::SET_PROPERTY => self.set_property()?,
                op::GET_SUPER => self.get_super()?,
                op::EQUAL => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(Value::Bool(a == b));
                }
                op::GREATER => self.binary_compare(|a, b| a > b)?,
                op::LESS => self.binary_compare(|a, b| a < b)?,
                op::ADD => self.add()?,
                op::SUBTRACT => self.binary_arith(|a, b| a - b)?,
                op::MULTIPLY => self.binary_arith(|a, b| a * b)?,
                op::DIVIDE => self.binary_arith(|a, b| a / b)?,
                op::NOT => {
                    let v = self.pop();
                    self.push(Value::Bool(v.is_falsey()));
                }
                op::NEGATE => {
                    let v = self.peek(0);
                    match v.as_number() {
                        Some(n) => {
                            self.pop();
                            self.push(Value::Number(-n));
                        }
                        None => return Err(self.error("Operand must be a number.")),
                    }
                }
                op::PRINT => {
                    let value = self.pop();
                    let text = self.stringify(value);
                    let _ = writeln!(self.stdout, "{text}");
                }
                op::JUMP => {
                    let offset = self.read_short();
                    self.frames.last_mut().unwrap().ip += offset as usize;
                }
                op::JUMP_IF_FALSE => {
                    let offset = self.read_short();
                    if self.peek(0).is_falsey() {
                        self.frames.last_mut().unwrap().ip += offset as usize;
                    }
                }
                op::LOOP => {
                    let offset = self.read_short();
                    self.frames.last_mut().unwrap().ip -= offset as usize;
                }
                op::CALL => {
                    let argc = self.read_byte();
                    let callee = self.peek(argc as usize);
                    self.call_value(callee, argc)?;
                }
                op::CLOSURE => self.closure()?,
                op::CLOSE_UPVALUE => {
                    let top = self.stack.len() - 1;
                    self.close_upvalues(top);
                    self.pop();
                }
                op::RETURN => {
                    let result = self.pop();
                    let base = self.frames.last().unwrap().slot_base;
                    self.close_upvalues(base);
                    self.frames.pop();
                    if self.frames.is_empty() {
                        self.pop();
                        return Ok(());
                    }
                    self.stack.truncate(base);
                    self.push(result);
                }
                op::CLASS => {
                    let name_ref = self.read_string();
                    let class_ref = self.heap.allocate(Obj::Class(ObjClass::new(name_ref)));
                    self.push(Value::Obj(class_ref));
                }
                op::INHERIT => self.inherit()?,
                op::METHOD => self.method(),
                op::INVOKE => {
                    let name_ref = self.read_string();
                    let argc = self.read_byte();
                    self.invoke(name_ref, argc)?;
                }
                op::SUPER_INVOKE => {
                    let name_ref = self.read_string();
                    let argc = self.read_byte();
                    let superclass = self.pop();
                    let class_ref = match superclass {
                        Value::Obj(r) => r,
                        _ => unreachable!(),
                    };
                    self.invoke_from_class(class_ref, name_ref, argc)?;
                }
                _ => unreachable!("unknown opcode {instruction}"),
            }
        }
    }

    fn binary_arith(&mut self, f: impl Fn(f64, f64) -> f64) -> Result<(), RuntimeError> {
        let b = self.peek(0);
        let a = self.peek(1);
        match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => {
                self.pop();
                self.pop();
                self.push(Value::Number(f(x, y)));
                Ok(())
            }
            _ => Err(self.error("Operands must be numbers.")),
        }
    }

    fn binary_compare(&mut self, f: impl Fn(f64, f64) -> bool) -> Result<(), RuntimeError> {
        let b = self.peek(0);
        let a = self.peek(1);
        match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => {
                self.pop();
                self.pop();
                self.push(Value::Bool(f(x, y)));
                Ok(())
            }
            _ => Err(self.error("Operands must be numbers.")),
        }
    }

    /// String operands stay reachable on the stack (peeked, not popped)
    /// until after the interned result is allocated, so a GC triggered by
    /// that allocation cannot collect them first.
    fn add(&mut self) -> Result<(), RuntimeError> {
        let b = self.peek(0);
        let a = self.peek(1);
        match (a, b) {
            (Value::Number(x), Value::Number(y)) => {
                self.pop();
                self.pop();
                self.push(Value::Number(x + y));
                Ok(())
            }
            (Value::Obj(ra), Value::Obj(rb))
                if matches!(self.heap.get(ra), Obj::String(_)) && matches!(self.heap.get(rb), Obj::String(_)) =>
            {
                let mut combined = self.heap.as_str(ra).to_owned();
                combined.push_str(self.heap.as_str(rb));
                let interned = self.heap.intern(&combined);
                self.pop();
                self.pop();
                self.push(Value::Obj(interned));
                Ok(())
            }
            _ => Err(self.error("Operands must be two numbers or two strings.")),
        }
    }

    fn read_upvalue(&self, r: ObjRef) -> Value {
        match self.heap.get(r) {
            Obj::Upvalue(u) => match u.location {
                UpvalueLoc::Open(slot) => self.stack[slot],
                UpvalueLoc::Closed(v) => v,
            },
            _ => unreachable!(),
        }
    }

    fn write_upvalue(&mut self, r: ObjRef, value: Value) {
        let location = match self.heap.get(r) {
            Obj::Upvalue(u) => u.location,
            _ => unreachable!(),
        };
        match location {
            UpvalueLoc::Open(slot) => self.stack[slot] = value,
            UpvalueLoc::Closed(_) => {
                if let Obj::Upvalue(u) = self.heap.get_mut(r) {
                    u.location = UpvalueLoc::Closed(value);
                }
            }
        }
    }

    fn capture_upvalue(&mut self, stack_slot: usize) -> ObjRef {
        let mut insert_at = self.open_upvalues.len();
        for (i, &r) in self.open_upvalues.iter().enumerate() {
            let slot = match self.heap.get(r) {
                Obj::Upvalue(u) => u.open_slot(),
                _ => unreachable!(),
            };
            match slot {
                Some(s) if s == stack_slot => return r,
                Some(s) if s < stack_slot => {
                    insert_at = i;
                    break;
                }
                _ => {}
            }
        }
        let upvalue_ref = self.heap.allocate(Obj::Upvalue(ObjUpvalue::open(stack_slot)));
        self.open_upvalues.insert(insert_at, upvalue_ref);
        upvalue_ref
    }

    fn close_upvalues(&mut self, from_slot: usize) {
        while let Some(&r) = self.open_upvalues.first() {
            let slot = match self.heap.get(r) {
                Obj::Upvalue(u) => u.open_slot(),
                _ => unreachable!(),
            };
            match slot {
                Some(s) if s >= from_slot => {
                    let value = self.stack[s];
                    if let Obj::Upvalue(u) = self.heap.get_mut(r) {
                        u.location = UpvalueLoc::Closed(value);
                    }
                    self.open_upvalues.remove(0);
                }
                _ => break,
            }
        }
    }

    fn closure(&mut self) -> Result<(), RuntimeError> {
        let function_value = self.read_constant();
        let function_ref = match function_value {
            Value::Obj(r) => r,
            _ => unreachable!(),
        };
        let upvalue_count = match self.heap.get(function_ref) {
            Obj::Function(f) => f.upvalue_count,
            _ => unreachable!(),
        };
        self.push(Value::Obj(function_ref));
        let mut upvalues = Vec::with_capacity(upvalue_count as usize);
        for _ in 0..upvalue_count {
            let is_local = self.read_byte() != 0;
            let index = self.read_byte();
            let upvalue_ref = if is_local {
                let base = self.frames.last().unwrap().slot_base;
                self.capture_upvalue(base + index as usize)
            } else {
                let enclosing = self.current_closure();
                match self.heap.get(enclosing) {
                    Obj::Closure(c) => c.upvalues[index as usize],
                    _ => unreachable!(),
                }
            };
            upvalues.push(upvalue_ref);
        }
        self.pop();
        let closure_ref = self.heap.allocate(Obj::Closure(ObjClosure {
            function: function_ref,
            upvalues,
        }));
        self.push(Value::Obj(closure_ref));
        Ok(())
    }

    fn get_property(&mut self) -> Result<(), RuntimeError> {
        let name_ref = self.read_string();
        let receiver = self.peek(0);
        let instance_ref = match receiver {
            Value::Obj(r) if matches!(self.heap.get(r), Obj::Instance(_)) => r,
            _ => return Err(self.error("Only instances have properties.")),
        };
        let hash = self.hash_of(name_ref);
        let field = match self.heap.get(instance_ref) {
            Obj::Instance(i) => i.fields.get(name_ref, hash),
            _ => unreachable!(),
        };
        if let Some(value) = field {
            self.pop();
            self.push(value);
            return Ok(());
        }
        let class_ref = match self.heap.get(instance_ref) {
            Obj::Instance(i) => i.class,
            _ => unreachable!(),
        };
        let method = match self.heap.get(class_ref) {
            Obj::Class(c) => c.methods.get(name_ref, hash),
            _ => unreachable!(),
        };
        match method {
            Some(Value::Obj(method_ref)) => {
                let bound = self.heap.allocate(Obj::BoundMethod(ObjBoundMethod { receiver, method: method_ref }));
                self.pop();
                self.push(Value::Obj(bound));
                Ok(())
            }
            _ => {
                let name = self.heap.as_str(name_ref).to_owned();
                Err(self.error(format!("Undefined property '{name}'.")))
            }
        }
    }

    fn set_property(&mut self) -> Result<(), RuntimeError> {
        let name_ref = self.read_string();
        let value = self.peek(0);
        let instance_val = self.peek(1);
        let instance_ref = match instance_val {
            Value::Obj(r) if matches!(self.heap.get(r), Obj::Instance(_)) => r,
            _ => return Err(self.error("Only instances have fields.")),
        };
        let hash = self.hash_of(name_ref);
        if let Obj::Instance(i) = self.heap.get_mut(instance_ref) {
            i.fields.set(name_ref, hash, value);
        }
        self.pop();
        self.pop();
        self.push(value);
        Ok(())
    }

    fn get_super(&mut self) -> Result<(), RuntimeError> {
        let name_ref = self.read_string();
        let superclass = self.pop();
        let class_ref = match superclass {
            Value::Obj(r) => r,
            _ => unreachable!(),
        };
        let receiver = self.peek(0);
        let hash = self.hash_of(name_ref);
        let method = match self.heap.get(class_ref) {
            Obj::Class(c) => c.methods.get(name_ref, hash),
            _ => unreachable!(),
        };
        match method {
            Some(Value::Obj(method_ref)) => {
                let bound = self.heap.allocate(Obj::BoundMethod(ObjBoundMethod { receiver, method: method_ref }));
                self.pop();
                self.push(Value::Obj(bound));
                Ok(())
            }
            _ => {
                let name = self.heap.as_str(name_ref).to_owned();
                Err(self.error(format!("Undefined property '{name}'.")))
            }
        }
    }

    fn inherit(&mut self) -> Result<(), RuntimeError> {
        let superclass_val = self.peek(1);
        let superclass_ref = match superclass_val {
            Value::Obj(r) if matches!(self.heap.get(r), Obj::Class(_)) => r,
            _ => return Err(self.error("Superclass must be a class.")),
        };
        let subclass_ref = match self.peek(0) {
            Value::Obj(r) => r,
            _ => unreachable!(),
        };
        let super_methods = match self.heap.get(superclass_ref) {
            Obj::Class(c) => c.methods.clone(),
            _ => unreachable!(),
        };
        if let Obj::Class(sub) = self.heap.get_mut(subclass_ref) {
            super_methods.add_all(&mut sub.methods);
        }
        self.pop();
        Ok(())
    }

    fn method(&mut self) {
        let name_ref = self.read_string();
        let method_val = self.peek(0);
        let class_ref = match self.peek(1) {
            Value::Obj(r) => r,
            _ => unreachable!(),
        };
        let hash = self.hash_of(name_ref);
        if let Obj::Class(c) = self.heap.get_mut(class_ref) {
            c.methods.set(name_ref, hash, method_val);
        }
        self.pop();
    }

    fn invoke(&mut self, name_ref: ObjRef, argc: u8) -> Result<(), RuntimeError> {
        let receiver = self.peek(argc as usize);
        let instance_ref = match receiver {
            Value::Obj(r) if matches!(self.heap.get(r), Obj::Instance(_)) => r,
            _ => return Err(self.error("Only instances have methods.")),
        };
        let hash = self.hash_of(name_ref);
        let field = match self.heap.get(instance_ref) {
            Obj::Instance(i) => i.fields.get(name_ref, hash),
            _ => unreachable!(),
        };
        if let Some(value) = field {
            let stack_len = self.stack.len();
            self.stack[stack_len - 1 - argc as usize] = value;
            return self.call_value(value, argc);
        }
        let class_ref = match self.heap.get(instance_ref) {
            Obj::Instance(i) => i.class,
            _ => unreachable!(),
        };
        self.invoke_from_class(class_ref, name_ref, argc)
    }

    fn invoke_from_class(&mut self, class_ref: ObjRef, name_ref: ObjRef, argc: u8) -> Result<(), RuntimeError> {
        let hash = self.hash_of(name_ref);
        let method = match self.heap.get(class_ref) {
            Obj::Class(c) => c.methods.get(name_ref, hash),
            _ => unreachable!(),
        };
        match method {
            Some(Value::Obj(closure_ref)) => self.call(closure_ref, argc),
            _ => {
                let name = self.heap.as_str(name_ref).to_owned();
                Err(self.error(format!("Undefined property '{name}'.")))
            }
        }
    }

    fn call_value(&mut self, callee: Value, argc: u8) -> Result<(), RuntimeError> {
        match callee {
            Value::Obj(r) => match self.heap.get(r) {
                Obj::Closure(_) => self.call(r, argc),
                Obj::Native(native) => self.call_native(*native, argc),
                Obj::Class(_) => self.instantiate(r, argc),
                Obj::BoundMethod(bound) => {
                    let bound = *bound;
                    let stack_len = self.stack.len();
                    self.stack[stack_len - 1 - argc as usize] = bound.receiver;
                    self.call(bound.method, argc)
                }
                _ => Err(self.error("Can only call functions and classes.")),
            },
            _ => Err(self.error("Can only call functions and classes.")),
        }
    }

    fn call(&mut self, closure_ref: ObjRef, argc: u8) -> Result<(), RuntimeError> {
        let function_ref = match self.heap.get(closure_ref) {
            Obj::Closure(c) => c.function,
            _ => unreachable!(),
        };
        let arity = match self.heap.get(function_ref) {
            Obj::Function(f) => f.arity,
            _ => unreachable!(),
        };
        if argc != arity {
            return Err(self.error(format!("Expected {arity} arguments but got {argc}.")));
        }
        if self.frames.len() >= FRAMES_MAX {
            return Err(self.error("Stack overflow."));
        }
        let slot_base = self.stack.len() - argc as usize - 1;
        self.frames.push(CallFrame { closure: closure_ref, ip: 0, slot_base });
        Ok(())
    }

    fn call_native(&mut self, native: ObjNative, argc: u8) -> Result<(), RuntimeError> {
        if argc != native.arity {
            return Err(self.error(format!("Expected {} arguments but got {argc}.", native.arity)));
        }
        let start = self.stack.len() - argc as usize;
        let args: Vec<Value> = self.stack[start..].to_vec();
        match (native.function)(&args) {
            Ok(result) => {
                self.stack.truncate(start - 1);
                self.push(result);
                Ok(())
            }
            Err(message) => Err(self.error(message)),
        }
    }

    fn instantiate(&mut self, class_ref: ObjRef, argc: u8) -> Result<(), RuntimeError> {
        let instance_ref = self.heap.allocate(Obj::Instance(ObjInstance::new(class_ref)));
        let stack_len = self.stack.len();
        self.stack[stack_len - 1 - argc as usize] = Value::Obj(instance_ref);
        let init_hash = self.hash_of(self.init_string);
        let initializer = match self.heap.get(class_ref) {
            Obj::Class(c) => c.methods.get(self.init_string, init_hash),
            _ => unreachable!(),
        };
        match initializer {
            Some(Value::Obj(closure_ref)) => self.call(closure_ref, argc),
            _ => {
                if argc != 0 {
                    return Err(self.error(format!("Expected 0 arguments but got {argc}.")));
                }
                Ok(())
            }
        }
    }

    fn stringify(&self, value: Value) -> String {
        match value {
            Value::Nil => "nil".to_owned(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format!("{n}"),
            Value::Obj(r) => self.stringify_object(r),
        }
    }

    fn stringify_object(&self, r: ObjRef) -> String {
        match self.heap.get(r) {
            Obj::String(s) => s.chars.clone(),
            Obj::Function(f) => f.name.map_or_else(|| "<script>".to_owned(), |n| format!("<fn {}>", self.heap.as_str(n))),
            Obj::Native(_) => "<native fn>".to_owned(),
            Obj::Closure(c) => self.stringify_object(c.function),
            Obj::Upvalue(_) => "upvalue".to_owned(),
            Obj::Class(c) => self.heap.as_str(c.name).to_owned(),
            Obj::Instance(i) => {
                let class_ref = i.class;
                let class_name_ref = match self.heap.get(class_ref) {
                    Obj::Class(c) => c.name,
                    _ => unreachable!(),
                };
                format!("{} instance", self.heap.as_str(class_name_ref))
            }
            Obj::BoundMethod(b) => {
                let function_ref = match self.heap.get(b.method) {
                    Obj::Closure(c) => c.function,
                    _ => unreachable!(),
                };
                self.stringify_object(function_ref)
            }
        }
    }

    fn collect_garbage(&mut self) {
        let stack_snapshot = self.stack.clone();
        let frame_closures: Vec<ObjRef> = self.frames.iter().map(|f| f.closure).collect();
        let open_upvalues = self.open_upvalues.clone();
        let globals = self.globals.clone();
        let init_string = self.init_string;
        self.heap.collect_garbage(|heap, grey| {
            for &value in &stack_snapshot {
                heap.mark_value(value, grey);
            }
            for &closure in &frame_closures {
                heap.mark_value(Value::Obj(closure), grey);
            }
            for &upvalue in &open_upvalues {
                heap.mark_value(Value::Obj(upvalue), grey);
            }
            heap.mark_table(&globals, grey);
            heap.mark_value(Value::Obj(init_string), grey);
        });
    }
}

fn native_clock(_args: &[Value]) -> Result<Value, String> {
    let now = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default();
    Ok(Value::Number(now.as_secs_f64()))
}

#[cfg(test)]
#[path = "vm_test.rs"]
mod vm_test;
