use pretty_assertions::assert_eq;

use crate::values::{PropMap, Value};

#[test]
fn put_get_roundtrip() {
    let mut map = PropMap::new();
    map.put("a", Value::Number(1.0));
    map.put("b", Value::Number(2.0));
    map.put("c", Value::Boolean(true));
    assert_eq!(map.get("a"), Value::Number(1.0));
    assert_eq!(map.get("b"), Value::Number(2.0));
    assert_eq!(map.get("c"), Value::Boolean(true));
    assert_eq!(map.get("d"), Value::Undefined);
    assert_eq!(map.len(), 3);
}

#[test]
fn overwrite_keeps_len() {
    let mut map = PropMap::new();
    map.put("x", Value::Number(1.0));
    map.put("x", Value::Number(2.0));
    assert_eq!(map.len(), 1);
    assert_eq!(map.get("x"), Value::Number(2.0));
}

#[test]
fn delete_leaves_tombstone() {
    let mut map = PropMap::new();
    map.put("x", Value::Number(1.0));
    map.put("y", Value::Number(2.0));
    map.delete("x");
    assert_eq!(map.len(), 1);
    assert_eq!(map.get("x"), Value::Undefined);
    assert_eq!(map.get("y"), Value::Number(2.0));
    // the slot is still there, just not occupied
    assert!(map.iter().all(|(k, _)| k != "x"));
}

#[test]
fn delete_absent_is_noop() {
    let mut map = PropMap::new();
    map.delete("nothing");
    assert_eq!(map.len(), 0);
    map.put("a", Value::Number(1.0));
    map.delete("nothing");
    assert_eq!(map.len(), 1);
}

#[test]
fn tombstone_slot_is_reused() {
    let mut map = PropMap::new();
    for key in ["a", "b", "c", "d"] {
        map.put(key, Value::Boolean(true));
    }
    let cap_before = map.capacity();
    map.delete("b");
    map.put("b", Value::Boolean(false));
    assert_eq!(map.capacity(), cap_before);
    assert_eq!(map.get("b"), Value::Boolean(false));
    assert_eq!(map.len(), 4);
}

#[test]
fn rehash_preserves_entries_and_drops_tombstones() {
    let mut map = PropMap::new();
    let keys: Vec<String> = (0..64).map(|i| format!("key{i}")).collect();
    for (i, key) in keys.iter().enumerate() {
        map.put(key, Value::Number(i as f64));
    }
    for key in keys.iter().step_by(2) {
        map.delete(key);
    }
    // grow enough to force at least one more rehash
    for i in 64..160 {
        map.put(&format!("key{i}"), Value::Number(i as f64));
    }
    for (i, key) in keys.iter().enumerate() {
        let expected = if i % 2 == 0 {
            Value::Undefined
        } else {
            Value::Number(i as f64)
        };
        assert_eq!(map.get(key), expected, "key {key}");
    }
    for i in 64..160 {
        assert_eq!(map.get(&format!("key{i}")), Value::Number(i as f64));
    }
    // load factor stays at or below one half
    assert!(map.capacity() >= map.len() * 2);
}

#[test]
fn behaves_as_functional_mapping() {
    // random-ish interleaving of puts and deletes, checked against a model
    let mut map = PropMap::new();
    let mut model: Vec<(String, Value)> = Vec::new();
    let mut seed = 0x2545f4914f6cdd1du64;
    for round in 0..500 {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let key = format!("k{}", seed % 37);
        if seed & 0x100 != 0 {
            let value = Value::Number(round as f64);
            map.put(&key, value);
            model.retain(|(k, _)| *k != key);
            model.push((key, value));
        } else {
            map.delete(&key);
            model.retain(|(k, _)| *k != key);
        }
    }
    assert_eq!(map.len(), model.len());
    for (key, value) in &model {
        assert_eq!(map.get(key), *value, "key {key}");
    }
}

#[test]
fn slot_order_iteration_visits_every_entry_once() {
    let mut map = PropMap::new();
    for i in 0..20 {
        map.put(&format!("k{i}"), Value::Number(i as f64));
    }
    map.delete("k3");
    map.delete("k17");
    let mut seen: Vec<String> = Vec::new();
    for index in 0..map.capacity() {
        if let Some((key, value)) = map.slot_at(index) {
            assert_ne!(value, Value::Undefined);
            seen.push(key.to_string());
        }
    }
    seen.sort();
    let mut expected: Vec<String> = (0..20)
        .filter(|i| *i != 3 && *i != 17)
        .map(|i| format!("k{i}"))
        .collect();
    expected.sort();
    assert_eq!(seen, expected);
}

#[test]
fn empty_map_lookup() {
    let map = PropMap::new();
    assert_eq!(map.get("anything"), Value::Undefined);
    assert_eq!(map.capacity(), 0);
}
