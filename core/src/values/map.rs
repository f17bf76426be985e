//! Open-addressed hash map backing object members, function closures,
//! scope-frame locals, and the globals table.
//!
//! The probe sequence is observable language behavior: `for .. in` walks the
//! slots in capacity order, so this map cannot be swapped for a library one.
//! Capacity is a power of two; the secondary-hash step is
//! `h <- (h + 16h + 1) mod cap`. A slot whose key is set but whose value is
//! `Undefined` is a tombstone; rehash (triggered when `len * 2 > cap`)
//! compacts tombstones away. Maximum load factor 0.5.

use crate::values::Value;

#[derive(Clone, Debug, Default)]
struct Slot {
    key: Option<Box<str>>,
    value: Value,
}

impl Slot {
    fn occupied(&self) -> bool {
        self.key.is_some() && self.value != Value::Undefined
    }
}

/// String-keyed map of script values. Deletion is `put(key, Undefined)`.
#[derive(Clone, Debug, Default)]
pub struct PropMap {
    slots: Vec<Slot>,
    len: usize,
}

fn first_hash(key: &[u8], mask: usize) -> usize {
    let mut hash = 0usize;
    for &byte in key {
        hash = hash.wrapping_add(hash << 4).wrapping_add(byte as usize) & mask;
    }
    hash
}

fn next_hash(hash: usize, mask: usize) -> usize {
    // h * 17 + 1 walks the whole table when cap is a power of two
    hash.wrapping_add(hash << 4).wrapping_add(1) & mask
}

impl PropMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live entries (tombstones excluded).
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Slot count, the bound for cursor-based iteration.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// The entry at slot `index`, if that slot is occupied. Cursor-based
    /// iteration scans indices `0..capacity()` with this.
    pub fn slot_at(&self, index: usize) -> Option<(&str, Value)> {
        let slot = self.slots.get(index)?;
        if slot.occupied() {
            Some((slot.key.as_deref().expect("occupied slot has key"), slot.value))
        } else {
            None
        }
    }

    /// Occupied entries in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Value)> {
        self.slots
            .iter()
            .filter(|slot| slot.occupied())
            .map(|slot| (slot.key.as_deref().expect("occupied slot has key"), slot.value))
    }

    /// Lookup; `Undefined` means absent (or deleted).
    pub fn get(&self, key: &str) -> Value {
        if self.slots.is_empty() {
            return Value::Undefined;
        }
        let mask = self.slots.len() - 1;
        let mut hash = first_hash(key.as_bytes(), mask);
        for _ in 0..self.slots.len() {
            let slot = &self.slots[hash];
            match slot.key.as_deref() {
                None => return Value::Undefined,
                Some(k) if k == key => return slot.value,
                Some(_) => hash = next_hash(hash, mask),
            }
        }
        Value::Undefined
    }

    /// Insert, update, or (with `Undefined`) delete.
    ///
    /// Probing is two-stage: the first tombstone seen is remembered and
    /// reused if the key turns out not to exist, so deleted slots are
    /// reclaimed without waiting for a rehash.
    pub fn put(&mut self, key: &str, value: Value) {
        if self.slots.is_empty() {
            if value == Value::Undefined {
                return;
            }
            self.slots = vec![Slot::default(); 2];
        }
        let mask = self.slots.len() - 1;
        let mut recorded: Option<usize> = None;
        let mut hash = first_hash(key.as_bytes(), mask);
        let mut inserted = false;
        for _ in 0..self.slots.len() {
            let slot = &self.slots[hash];
            match slot.key.as_deref() {
                None => {
                    if value == Value::Undefined {
                        return; // deleting a key that was never there
                    }
                    let target = recorded.unwrap_or(hash);
                    let slot = &mut self.slots[target];
                    slot.key = Some(key.into());
                    slot.value = value;
                    self.len += 1;
                    inserted = true;
                    break;
                }
                Some(k) if k == key => {
                    let was_live = slot.value != Value::Undefined;
                    let slot = &mut self.slots[hash];
                    if was_live {
                        if value == Value::Undefined {
                            self.len -= 1;
                        }
                        slot.value = value;
                        return;
                    }
                    // resurrecting a tombstone in place
                    if value == Value::Undefined {
                        return;
                    }
                    slot.value = value;
                    self.len += 1;
                    inserted = true;
                    break;
                }
                Some(_) => {
                    if recorded.is_none() && slot.value == Value::Undefined {
                        recorded = Some(hash);
                    }
                    hash = next_hash(hash, mask);
                }
            }
        }
        if !inserted {
            // probed the whole table without hitting an empty slot
            if value == Value::Undefined {
                return;
            }
            let target = recorded.expect("full table must contain a tombstone");
            let slot = &mut self.slots[target];
            slot.key = Some(key.into());
            slot.value = value;
            self.len += 1;
        }
        self.maybe_rehash();
    }

    /// Shorthand for `put(key, Undefined)`.
    pub fn delete(&mut self, key: &str) {
        self.put(key, Value::Undefined);
    }

    fn maybe_rehash(&mut self) {
        let required = self.len * 2;
        if self.slots.len() >= required {
            return;
        }
        let new_cap = required.next_power_of_two().max(2);
        let old = core::mem::replace(&mut self.slots, vec![Slot::default(); new_cap]);
        let mask = new_cap - 1;
        for slot in old {
            if !slot.occupied() {
                continue; // tombstones compact away here
            }
            let key = slot.key.expect("occupied slot has key");
            let mut hash = first_hash(key.as_bytes(), mask);
            while self.slots[hash].key.is_some() {
                hash = next_hash(hash, mask);
            }
            self.slots[hash] = Slot {
                key: Some(key),
                value: slot.value,
            };
        }
    }
}
