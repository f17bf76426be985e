use core::cmp::Ordering;

use static_assertions::const_assert;

use crate::{bytecode::Program, values::Gc, values::Heap};

/// Result of anything that can throw inside the script world.
///
/// The error branch carries the thrown script value (usually a string), not a
/// host error type; the VM turns it back into a `throw` when it crosses the
/// FFI boundary.
pub type Outcome = Result<Value, Value>;

/// A native callable registered by the host. Arguments stay rooted in the
/// calling function frame for the duration of the call.
pub type NativeFn = fn(&mut crate::vm::Vm, &[Value]) -> Outcome;

/// A dynamically typed value. `Copy`, 16 bytes of payload at most: heap
/// variants hold a [`Gc`] handle, strings borrow host or bytecode storage.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum Value {
    /// Empty-slot sentinel. Never exposed as a scripting value; reads of
    /// `Undefined` slots yield `Null`.
    #[default]
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    /// Immutable string borrowing host-lifetime storage (error messages baked
    /// into the engine, literals from the host).
    Scripture(&'static str),
    /// Immutable string slice into the bytecode buffer (identifier names and
    /// string literals live inside the compiled image). Stored as offset +
    /// length so the buffer may grow and reallocate without invalidating it.
    Inscription { offset: u32, len: u32 },
    String(Gc),
    Array(Gc),
    Object(Gc),
    Function(Gc),
    Native(NativeFn),
}

const_assert!(size_of::<Value>() <= 24);

impl Value {
    /// The `typeof` name of this value. Scripture, inscription, and managed
    /// strings are indistinguishable here, as are script and native
    /// functions.
    pub fn type_name(self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::Scripture(_) | Value::Inscription { .. } | Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Function(_) | Value::Native(_) => "function",
        }
    }

    pub fn is_string(self) -> bool {
        matches!(
            self,
            Value::Scripture(_) | Value::Inscription { .. } | Value::String(_)
        )
    }

    pub fn as_number(self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_boolean(self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(b),
            _ => None,
        }
    }

    /// The heap handle, for the four managed variants.
    pub fn as_gc(self) -> Option<Gc> {
        match self {
            Value::String(gc) | Value::Array(gc) | Value::Object(gc) | Value::Function(gc) => {
                Some(gc)
            }
            _ => None,
        }
    }
}

/// Identical representation, the fast path of `==`. Numbers compare by bit
/// pattern here (so a NaN equals the same NaN, and `0.0` differs from
/// `-0.0`); the IEEE comparison happens in the slow path.
pub fn identical(lhs: Value, rhs: Value) -> bool {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => a.to_bits() == b.to_bits(),
        _ => lhs == rhs,
    }
}

/// Bytes of any of the three string representations, `None` otherwise.
pub fn string_bytes<'a>(value: Value, heap: &'a Heap, program: &'a Program) -> Option<&'a [u8]> {
    match value {
        Value::Scripture(s) => Some(s.as_bytes()),
        Value::Inscription { offset, len } => Some(program.inscription_bytes(offset, len)),
        Value::String(gc) => Some(heap.string(gc).as_bytes()),
        _ => None,
    }
}

/// `&str` view of any of the three string representations.
///
/// Inscription payloads are validated UTF-8 at instruction decode time, so
/// this cannot fail for values the VM produced.
pub fn string_text<'a>(value: Value, heap: &'a Heap, program: &'a Program) -> Option<&'a str> {
    match value {
        Value::Scripture(s) => Some(s),
        Value::Inscription { offset, len } => Some(program.inscription_text(offset, len)),
        Value::String(gc) => Some(heap.string(gc)),
        _ => None,
    }
}

/// Unsigned lexicographic comparison, ignoring the representation
/// distinction between scripture, inscription, and managed strings.
///
/// Both values must be strings.
pub fn string_cmp(lhs: Value, rhs: Value, heap: &Heap, program: &Program) -> Ordering {
    let l = string_bytes(lhs, heap, program).expect("relational lhs must be a string");
    let r = string_bytes(rhs, heap, program).expect("relational rhs must be a string");
    l.cmp(r)
}
