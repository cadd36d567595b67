// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Lox Language Project

//! Runtime values: the tagged cell every Lox expression evaluates to.

mod object;

pub use object::{
    fnv1a_hash, NativeFn, Obj, ObjBoundMethod, ObjClass, ObjClosure, ObjFunction, ObjInstance,
    ObjNative, ObjRef, ObjString, ObjUpvalue, UpvalueLoc,
};

use std::fmt;

/// A dynamically-typed Lox value.
///
/// `Obj` carries only a handle, never the object's payload; payload access
/// always goes through `Heap`.
#[derive(Clone, Copy, PartialEq)]
pub enum Value {
    Bool(bool),
    Nil,
    Number(f64),
    Obj(ObjRef),
}

impl Value {
    /// Lox truthiness: only `nil` and `false` are falsey.
    #[must_use]
    pub const fn is_falsey(&self) -> bool {
        matches!(self, Self::Nil | Self::Bool(false))
    }

    #[must_use]
    pub const fn is_number(&self) -> bool {
        matches!(self, Self::Number(_))
    }

    #[must_use]
    pub const fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_obj(&self) -> Option<ObjRef> {
        match self {
            Self::Obj(r) => Some(*r),
            _ => None,
        }
    }

    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Nil => "nil",
            Self::Number(_) => "number",
            Self::Obj(_) => "object",
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Nil => write!(f, "nil"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Obj(r) => write!(f, "{r:?}"),
        }
    }
}

#[cfg(test)]
mod value_test {
    use super::*;

    #[test]
    fn falsey_is_only_nil_and_false() {
        assert!(Value::Nil.is_falsey());
        assert!(Value::Bool(false).is_falsey());
        assert!(!Value::Bool(true).is_falsey());
        assert!(!Value::Number(0.0).is_falsey());
    }

    #[test]
    fn nan_is_not_equal_to_itself() {
        let nan = Value::Number(f64::NAN);
        assert!(!(nan == nan));
    }
}
