// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Lox Language Project

//! The object arena, string interning, and the tracing mark-sweep collector.
//!
//! Grounded in structure (not code) on `examples/Luvion1-Fax/faxc/crates/fgc`:
//! this module keeps that crate's separation of "marking" from "sweeping"
//! from "allocation bookkeeping," collapsed to a single-threaded,
//! non-incremental, non-moving collector since nothing here runs off the
//! main thread.

mod table;

pub use table::Table;

use crate::value::{fnv1a_hash, Obj, ObjRef, ObjString, UpvalueLoc, Value};

const GC_HEAP_GROW_FACTOR: usize = 2;
const INITIAL_NEXT_GC: usize = 1024 * 1024;

struct Slot {
    marked: bool,
    obj: Obj,
}

/// The object arena plus GC bookkeeping.
///
/// Objects are addressed by [`ObjRef`] rather than pointer; a freed slot's
/// index is recycled by a later allocation via `free_list`, playing the role
/// the teacher's intrusive allocation list plays for pointer-addressed heaps.
pub struct Heap {
    slots: Vec<Option<Slot>>,
    free_list: Vec<u32>,
    strings: Table,
    bytes_allocated: usize,
    next_gc: usize,
    /// Objects pinned alive regardless of reachability from VM roots: used by
    /// the compiler to keep every function in the current `enclosing` chain
    /// alive across a GC triggered mid-compilation (the Rust analogue of
    /// `markCompilerRoots` walking a linked list of live `Compiler` frames).
    pinned: Vec<ObjRef>,
    pub stress_gc: bool,
    pub log_gc: bool,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Heap {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            strings: Table::new(),
            bytes_allocated: 0,
            next_gc: INITIAL_NEXT_GC,
            pinned: Vec::new(),
            stress_gc: false,
            log_gc: false,
        }
    }

    #[must_use]
    pub const fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    #[must_use]
    pub const fn next_gc(&self) -> usize {
        self.next_gc
    }

    #[must_use]
    pub fn get(&self, r: ObjRef) -> &Obj {
        &self.slots[r.index()].as_ref().expect("dangling ObjRef").obj
    }

    #[must_use]
    pub fn get_mut(&mut self, r: ObjRef) -> &mut Obj {
        &mut self.slots[r.index()].as_mut().expect("dangling ObjRef").obj
    }

    fn approx_size(obj: &Obj) -> usize {
        match obj {
            Obj::String(s) => std::mem::size_of::<ObjString>() + s.chars.len(),
            Obj::Function(f) => std::mem::size_of::<crate::value::ObjFunction>() + f.chunk.code.len() * 2,
            Obj::Closure(c) => std::mem::size_of::<crate::value::ObjClosure>() + c.upvalues.len() * 4,
            _ => std::mem::size_of::<Obj>(),
        }
    }

    /// Allocates `obj`, ticking the byte counter that drives collection.
    /// Returns the new handle. The caller must ensure anything referenced by
    /// `obj` is already reachable from a root (stack, pinned list, or an
    /// already-rooted container) before this call, in case it triggers a GC.
    #[must_use]
    pub fn allocate(&mut self, obj: Obj) -> ObjRef {
        self.bytes_allocated += Self::approx_size(&obj);
        if let Some(index) = self.free_list.pop() {
            self.slots[index as usize] = Some(Slot { marked: false, obj });
            ObjRef::new(index)
        } else {
            let index = u32::try_from(self.slots.len()).expect("heap exceeded u32 object count");
            self.slots.push(Some(Slot { marked: false, obj }));
            ObjRef::new(index)
        }
    }

    /// True once allocation pressure (or `stress_gc`) warrants a collection.
    #[must_use]
    pub const fn should_collect(&self) -> bool {
        self.stress_gc || self.bytes_allocated > self.next_gc
    }

    /// Interns `text`, allocating a new `ObjString` only if no equal-content
    /// string already exists in the intern table.
    pub fn intern(&mut self, text: &str) -> ObjRef {
        let hash = fnv1a_hash(text.as_bytes());
        if let Some(existing) = self.strings.find_string(hash, |r| match self.get(r) {
            Obj::String(s) => s.chars == text,
            _ => false,
        }) {
            return existing;
        }
        let obj_string = ObjString::new(text.to_owned());
        let r = self.allocate(Obj::String(obj_string));
        self.strings.set(r, hash, Value::Nil);
        r
    }

    #[must_use]
    pub fn as_str(&self, r: ObjRef) -> &str {
        match self.get(r) {
            Obj::String(s) => &s.chars,
            other => unreachable!("as_str called on a {}", other.type_name()),
        }
    }

    /// Pins `r` alive for the duration of a compiler frame; paired with
    /// [`Heap::unpin`] in LIFO order by `Compiler::new`/`Compiler::finish`.
    pub fn pin(&mut self, r: ObjRef) {
        self.pinned.push(r);
    }

    pub fn unpin(&mut self) {
        self.pinned.pop();
    }

    fn mark_object(&mut self, r: ObjRef, grey: &mut Vec<ObjRef>) {
        let slot = self.slots[r.index()].as_mut().expect("dangling ObjRef");
        if slot.marked {
            return;
        }
        slot.marked = true;
        grey.push(r);
    }

    pub fn mark_value(&mut self, value: Value, grey: &mut Vec<ObjRef>) {
        if let Value::Obj(r) = value {
            self.mark_object(r, grey);
        }
    }

    pub fn mark_table(&mut self, table: &Table, grey: &mut Vec<ObjRef>) {
        for (key, value) in table.iter() {
            self.mark_object(key, grey);
            self.mark_value(value, grey);
        }
    }

    fn blacken(&mut self, r: ObjRef, grey: &mut Vec<ObjRef>) {
        // Cloning the outgoing-reference lists sidesteps holding a borrow of
        // `self.slots` while recursively marking into the same arena.
        match self.slots[r.index()].as_ref().expect("dangling ObjRef").obj.clone() {
            Obj::String(_) | Obj::Native(_) => {}
            Obj::Function(f) => {
                if let Some(name) = f.name {
                    self.mark_object(name, grey);
                }
                for constant in f.chunk.constants.clone() {
                    self.mark_value(constant, grey);
                }
            }
            Obj::Closure(c) => {
                self.mark_object(c.function, grey);
                for upvalue in c.upvalues.clone() {
                    self.mark_object(upvalue, grey);
                }
            }
            Obj::Upvalue(u) => {
                if let UpvalueLoc::Closed(v) = u.location {
                    self.mark_value(v, grey);
                }
            }
            Obj::Class(c) => {
                self.mark_object(c.name, grey);
                self.mark_table(&c.methods.clone(), grey);
            }
            Obj::Instance(i) => {
                self.mark_object(i.class, grey);
                self.mark_table(&i.fields.clone(), grey);
            }
            Obj::BoundMethod(b) => {
                self.mark_value(b.receiver, grey);
                self.mark_object(b.method, grey);
            }
        }
    }

    /// Runs mark-trace-sweep. `mark_roots` is invoked first and is
    /// responsible for calling [`Heap::mark_value`]/[`Heap::mark_object`] on
    /// everything the caller considers a root (the VM's stack, call-frame
    /// closures, open upvalues, and globals table); the compiler's `pinned`
    /// list is always included regardless of caller.
    pub fn collect_garbage(&mut self, mut mark_roots: impl FnMut(&mut Self, &mut Vec<ObjRef>)) {
        let mut grey = Vec::new();
        mark_roots(self, &mut grey);
        for pinned in self.pinned.clone() {
            self.mark_object(pinned, &mut grey);
        }
        while let Some(r) = grey.pop() {
            self.blacken(r, &mut grey);
        }
        self.strings.remove_white(|r| {
            self.slots[r.index()].as_ref().is_some_and(|s| s.marked)
        });
        self.sweep();
        self.next_gc = self.bytes_allocated * GC_HEAP_GROW_FACTOR;
    }

    fn sweep(&mut self) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            match slot {
                Some(s) if s.marked => s.marked = false,
                Some(s) => {
                    self.bytes_allocated = self.bytes_allocated.saturating_sub(Self::approx_size(&s.obj));
                    *slot = None;
                    self.free_list.push(u32::try_from(index).expect("index was a valid u32 on allocation"));
                }
                None => {}
            }
        }
    }
}

#[cfg(test)]
mod heap_test {
    use super::*;

    #[test]
    fn interning_returns_same_handle_for_equal_content() {
        let mut heap = Heap::new();
        let a = heap.intern("hello");
        let b = heap.intern("hello");
        assert_eq!(a, b);
    }

    #[test]
    fn interning_distinguishes_different_content() {
        let mut heap = Heap::new();
        let a = heap.intern("hello");
        let b = heap.intern("world");
        assert_ne!(a, b);
    }

    #[test]
    fn unreachable_object_is_freed_on_collection() {
        let mut heap = Heap::new();
        let garbage = heap.intern("garbage");
        heap.collect_garbage(|_heap, _grey| {});
        // The slot was reclaimed; a fresh allocation may reuse its index.
        let reused = heap.allocate(Obj::String(ObjString::new("new".to_owned())));
        assert!(reused.index() <= garbage.index());
    }

    #[test]
    fn rooted_object_survives_collection() {
        let mut heap = Heap::new();
        let kept = heap.intern("kept");
        heap.collect_garbage(|heap, grey| heap.mark_value(Value::Obj(kept), grey));
        assert_eq!(heap.as_str(kept), "kept");
    }
}
