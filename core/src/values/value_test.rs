use pretty_assertions::assert_eq;

use crate::bytecode::Program;
use crate::values::value::{identical, string_bytes, string_cmp, string_text};
use crate::values::{Heap, Value};

#[test]
fn typeof_names() {
    assert_eq!(Value::Undefined.type_name(), "undefined");
    assert_eq!(Value::Null.type_name(), "null");
    assert_eq!(Value::Boolean(true).type_name(), "boolean");
    assert_eq!(Value::Number(1.5).type_name(), "number");
    assert_eq!(Value::Scripture("s").type_name(), "string");
    assert_eq!(Value::Inscription { offset: 0, len: 0 }.type_name(), "string");
    let mut heap = Heap::new();
    assert_eq!(heap.alloc_string("x").type_name(), "string");
    assert_eq!(heap.alloc_array().type_name(), "array");
    assert_eq!(heap.alloc_object().type_name(), "object");
    assert_eq!(heap.alloc_function(0).type_name(), "function");
}

#[test]
fn identical_compares_numbers_by_bits() {
    assert!(identical(Value::Number(f64::NAN), Value::Number(f64::NAN)));
    assert!(!identical(Value::Number(0.0), Value::Number(-0.0)));
    assert!(identical(Value::Null, Value::Null));
    assert!(!identical(Value::Null, Value::Undefined));
    let mut heap = Heap::new();
    let a = heap.alloc_string("a");
    let b = heap.alloc_string("a");
    assert!(identical(a, a));
    assert!(!identical(a, b)); // distinct bodies, equal contents
}

#[test]
fn string_views_unify_representations() {
    let mut heap = Heap::new();
    let program = Program::new();
    let scripture = Value::Scripture("hello");
    let managed = heap.alloc_string("hello");
    assert_eq!(string_bytes(scripture, &heap, &program), Some(&b"hello"[..]));
    assert_eq!(string_text(managed, &heap, &program), Some("hello"));
    assert_eq!(
        string_cmp(scripture, managed, &heap, &program),
        core::cmp::Ordering::Equal
    );
    let other = heap.alloc_string("hellp");
    assert_eq!(
        string_cmp(scripture, other, &heap, &program),
        core::cmp::Ordering::Less
    );
    assert_eq!(string_bytes(Value::Number(1.0), &heap, &program), None);
}
