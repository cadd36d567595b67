// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Lox Language Project

//! A single active call's view into the shared value stack.

use crate::value::ObjRef;

/// One live call. `slot_base` is the index of slot 0 (the callee itself, or
/// `this` for a method) within the VM's shared stack; locals and parameters
/// live at ascending offsets from there.
pub struct CallFrame {
    pub closure: ObjRef,
    pub ip: usize,
    pub slot_base: usize,
}
