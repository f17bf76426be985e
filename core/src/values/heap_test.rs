use pretty_assertions::assert_eq;

use crate::values::{Heap, Value};

#[test]
fn unreachable_bodies_are_swept() {
    let mut heap = Heap::new();
    let kept = heap.alloc_string("kept");
    let _dropped = heap.alloc_string("dropped");
    assert_eq!(heap.live_count(), 2);
    heap.mark(kept);
    heap.sweep();
    assert_eq!(heap.live_count(), 1);
    let gc = kept.as_gc().unwrap();
    assert_eq!(heap.string(gc), "kept");
}

#[test]
fn marking_traces_containers_transitively() {
    let mut heap = Heap::new();
    let inner = heap.alloc_string("inner");
    let arr = heap.alloc_array();
    heap.array_push(arr.as_gc().unwrap(), inner);
    let obj = heap.alloc_object();
    heap.object_put(obj.as_gc().unwrap(), "list", arr);
    let f = heap.alloc_function(7);
    heap.function_mut(f.as_gc().unwrap())
        .closure
        .put("captured", obj);

    heap.mark(f);
    heap.sweep();
    assert_eq!(heap.live_count(), 4);
    assert_eq!(heap.string(inner.as_gc().unwrap()), "inner");
}

#[test]
fn mark_bit_is_cleared_by_sweep() {
    let mut heap = Heap::new();
    let v = heap.alloc_string("twice");
    heap.mark(v);
    heap.sweep();
    // not marked this round, so the second sweep frees it
    heap.sweep();
    assert_eq!(heap.live_count(), 0);
}

#[test]
fn swept_slots_are_reused() {
    let mut heap = Heap::new();
    let a = heap.alloc_string("a");
    heap.sweep();
    let b = heap.alloc_string("b");
    assert_eq!(a.as_gc(), b.as_gc());
    assert_eq!(heap.live_count(), 1);
}

#[test]
fn cyclic_closure_is_collected_once_unreachable() {
    let mut heap = Heap::new();
    let f = heap.alloc_function(0);
    // f captures itself; marking must terminate and sweeping must free it
    heap.function_mut(f.as_gc().unwrap()).closure.put("me", f);
    heap.mark(f);
    heap.sweep();
    assert_eq!(heap.live_count(), 1);
    heap.sweep();
    assert_eq!(heap.live_count(), 0);
}

#[test]
fn array_holes() {
    let mut heap = Heap::new();
    let arr = heap.alloc_array().as_gc().unwrap();
    heap.array_put(arr, 0, Value::Number(1.0));
    heap.array_put(arr, 3, Value::Number(4.0));
    assert_eq!(heap.array(arr).len(), 4);
    assert_eq!(heap.array_get(arr, 0), Value::Number(1.0));
    assert_eq!(heap.array_get(arr, 1), Value::Null);
    assert_eq!(heap.array_get(arr, 2), Value::Null);
    assert_eq!(heap.array_get(arr, 3), Value::Number(4.0));
    assert_eq!(heap.array_get(arr, 9), Value::Null);
    // writing null punches a hole without extending
    heap.array_put(arr, 0, Value::Null);
    assert_eq!(heap.array(arr)[0], Value::Undefined);
    heap.array_put(arr, 100, Value::Null);
    assert_eq!(heap.array(arr).len(), 4);
}

#[test]
fn pushing_null_stores_a_hole() {
    let mut heap = Heap::new();
    let arr = heap.alloc_array().as_gc().unwrap();
    heap.array_push(arr, Value::Null);
    heap.array_push(arr, Value::Number(2.0));
    assert_eq!(heap.array(arr)[0], Value::Undefined);
    assert_eq!(heap.array_get(arr, 0), Value::Null);
    assert_eq!(heap.array_get(arr, 1), Value::Number(2.0));
}

#[test]
fn object_null_write_deletes() {
    let mut heap = Heap::new();
    let obj = heap.alloc_object().as_gc().unwrap();
    heap.object_put(obj, "x", Value::Number(1.0));
    assert_eq!(heap.object_get(obj, "x"), Value::Number(1.0));
    heap.object_put(obj, "x", Value::Null);
    assert_eq!(heap.object_get(obj, "x"), Value::Null);
    assert_eq!(heap.object(obj).len(), 0);
    assert_eq!(heap.object_get(obj, "missing"), Value::Null);
}
