// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Lox Language Project

//! Heap object variants for the Lox runtime.
//!
//! Every heap value is an [`Obj`] stored in the [`crate::heap::Heap`] arena
//! and addressed by an [`ObjRef`] handle rather than a raw pointer. The arena
//! slot itself carries the mark bit; sweeping walks the arena in slot order,
//! which plays the role the teacher's intrusive allocation list plays for a
//! `Vaddr`-addressed heap (see `examples/sarnowski-lona/crates/lona-abi/src/types/addr.rs`
//! for the newtype-over-integer idiom this handle follows).

use crate::bytecode::Chunk;
use crate::heap::Table;
use crate::value::Value;
use std::fmt;

/// A handle to a heap-allocated [`Obj`].
///
/// Indexes into `Heap`'s arena. Never dereferenced directly by callers —
/// always routed through `Heap::get`/`Heap::get_mut`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ObjRef(u32);

impl ObjRef {
    #[inline]
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjRef({})", self.0)
    }
}

/// A host-implemented native function.
///
/// Invoked synchronously with the argument slice; returns the result value
/// or an error message to be raised as a runtime error.
pub type NativeFn = fn(args: &[Value]) -> Result<Value, String>;

/// An interned, NUL-free UTF-8 string with its FNV-1a hash precomputed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjString {
    pub chars: String,
    pub hash: u32,
}

impl ObjString {
    #[must_use]
    pub fn new(chars: String) -> Self {
        let hash = fnv1a_hash(chars.as_bytes());
        Self { chars, hash }
    }
}

/// FNV-1a hash over a byte slice.
///
/// One historical revision of this algorithm read `key[0]` in the loop body
/// instead of `key[i]`, silently hashing only the first byte repeated; this
/// implementation indexes by `i` as specified.
#[must_use]
pub fn fnv1a_hash(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 2_166_136_261;
    for &byte in bytes {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(16_777_619);
    }
    hash
}

/// A user-defined function: arity, owned chunk, upvalue count, optional name.
///
/// `name` is `None` for the implicit top-level script function.
#[derive(Debug, Clone)]
pub struct ObjFunction {
    pub arity: u8,
    pub upvalue_count: u8,
    pub chunk: Chunk,
    pub name: Option<ObjRef>,
}

impl ObjFunction {
    #[must_use]
    pub fn new(name: Option<ObjRef>) -> Self {
        Self {
            arity: 0,
            upvalue_count: 0,
            chunk: Chunk::new(),
            name,
        }
    }
}

/// A native (host) function, registered via `Vm::define_native`.
#[derive(Clone, Copy)]
pub struct ObjNative {
    pub arity: u8,
    pub name: ObjRef,
    pub function: NativeFn,
}

impl fmt::Debug for ObjNative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjNative").field("arity", &self.arity).finish_non_exhaustive()
    }
}

/// Where an upvalue currently reads/writes its value.
#[derive(Debug, Clone, Copy)]
pub enum UpvalueLoc {
    /// Still aliasing a live slot on the VM's evaluation stack.
    Open(usize),
    /// Closed: the value has been lifted into the upvalue's own storage.
    Closed(Value),
}

/// A heap object proxying access to a captured variable.
///
/// "Open" while the owning stack frame is still live; "closed" once that
/// frame has returned or the block holding the local has exited.
#[derive(Debug, Clone, Copy)]
pub struct ObjUpvalue {
    pub location: UpvalueLoc,
}

impl ObjUpvalue {
    #[must_use]
    pub const fn open(stack_slot: usize) -> Self {
        Self {
            location: UpvalueLoc::Open(stack_slot),
        }
    }

    /// The stack slot this upvalue aliases, if still open.
    #[must_use]
    pub const fn open_slot(&self) -> Option<usize> {
        match self.location {
            UpvalueLoc::Open(slot) => Some(slot),
            UpvalueLoc::Closed(_) => None,
        }
    }
}

/// A function paired with the upvalues it captured at creation time.
#[derive(Debug, Clone)]
pub struct ObjClosure {
    pub function: ObjRef,
    pub upvalues: Vec<ObjRef>,
}

/// A class: its name and a method table mapping name to `ObjClosure`.
#[derive(Debug, Clone)]
pub struct ObjClass {
    pub name: ObjRef,
    pub methods: Table,
}

impl ObjClass {
    #[must_use]
    pub fn new(name: ObjRef) -> Self {
        Self {
            name,
            methods: Table::new(),
        }
    }
}

/// An instance of a class: a back-reference to the class and a field table.
#[derive(Debug, Clone)]
pub struct ObjInstance {
    pub class: ObjRef,
    pub fields: Table,
}

impl ObjInstance {
    #[must_use]
    pub fn new(class: ObjRef) -> Self {
        Self {
            class,
            fields: Table::new(),
        }
    }
}

/// A method closure bound to a specific receiver, produced by property access.
#[derive(Debug, Clone, Copy)]
pub struct ObjBoundMethod {
    pub receiver: Value,
    pub method: ObjRef,
}

/// The tagged union of every heap-allocated kind, plus the mark bit the
/// sweep phase consults.
#[derive(Debug, Clone)]
pub enum Obj {
    String(ObjString),
    Function(ObjFunction),
    Native(ObjNative),
    Closure(ObjClosure),
    Upvalue(ObjUpvalue),
    Class(ObjClass),
    Instance(ObjInstance),
    BoundMethod(ObjBoundMethod),
}

impl Obj {
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Function(_) => "function",
            Self::Native(_) => "native function",
            Self::Closure(_) => "closure",
            Self::Upvalue(_) => "upvalue",
            Self::Class(_) => "class",
            Self::Instance(_) => "instance",
            Self::BoundMethod(_) => "bound method",
        }
    }
}
