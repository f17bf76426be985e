//! The managed heap: owns every string/array/object/function body and
//! reclaims them with a stop-the-world mark-and-sweep pass.
//!
//! Values refer to bodies through [`Gc`] slot handles. Sweeping vacates
//! unmarked slots onto a free list instead of compacting, so every handle
//! reachable from a root stays valid across any number of collections.
//! Collection never happens implicitly during allocation; the host (or the
//! `gc()` binding) drives it through the VM, which knows the roots.

use tracing::debug;

use crate::values::{PropMap, Value};

/// Handle to a managed body. Dereferencing a swept handle is a VM bug and
/// panics; the root-set invariant makes that unreachable from script code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Gc(u32);

/// Script function body: bytecode entry offset plus the bindings captured
/// when the function value was constructed.
#[derive(Debug, Default)]
pub struct FunctionBody {
    pub ingress: u32,
    pub closure: PropMap,
}

/// Body of one managed value.
#[derive(Debug)]
pub enum ManagedBody {
    String(String),
    /// Holes are `Undefined` slots; reads of holes yield `Null`.
    Array(Vec<Value>),
    Object(PropMap),
    Function(FunctionBody),
}

#[derive(Debug, Default)]
struct Slot {
    marked: bool,
    body: Option<ManagedBody>,
}

#[derive(Debug, Default)]
pub struct Heap {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc(&mut self, body: ManagedBody) -> Gc {
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                debug_assert!(slot.body.is_none(), "free list slot still occupied");
                slot.marked = false;
                slot.body = Some(body);
                Gc(index)
            }
            None => {
                let index = u32::try_from(self.slots.len()).expect("heap slot count overflow");
                self.slots.push(Slot {
                    marked: false,
                    body: Some(body),
                });
                Gc(index)
            }
        }
    }

    pub fn alloc_string(&mut self, text: impl Into<String>) -> Value {
        Value::String(self.alloc(ManagedBody::String(text.into())))
    }

    pub fn alloc_array(&mut self) -> Value {
        Value::Array(self.alloc(ManagedBody::Array(Vec::new())))
    }

    pub fn alloc_object(&mut self) -> Value {
        Value::Object(self.alloc(ManagedBody::Object(PropMap::new())))
    }

    pub fn alloc_function(&mut self, ingress: u32) -> Value {
        Value::Function(self.alloc(ManagedBody::Function(FunctionBody {
            ingress,
            closure: PropMap::new(),
        })))
    }

    pub fn body(&self, gc: Gc) -> &ManagedBody {
        self.slots[gc.0 as usize]
            .body
            .as_ref()
            .expect("dereferenced a swept value")
    }

    pub fn body_mut(&mut self, gc: Gc) -> &mut ManagedBody {
        self.slots[gc.0 as usize]
            .body
            .as_mut()
            .expect("dereferenced a swept value")
    }

    pub fn string(&self, gc: Gc) -> &str {
        match self.body(gc) {
            ManagedBody::String(s) => s,
            other => panic!("expected string body, found {other:?}"),
        }
    }

    pub fn string_mut(&mut self, gc: Gc) -> &mut String {
        match self.body_mut(gc) {
            ManagedBody::String(s) => s,
            other => panic!("expected string body, found {other:?}"),
        }
    }

    pub fn array(&self, gc: Gc) -> &Vec<Value> {
        match self.body(gc) {
            ManagedBody::Array(elements) => elements,
            other => panic!("expected array body, found {other:?}"),
        }
    }

    pub fn array_mut(&mut self, gc: Gc) -> &mut Vec<Value> {
        match self.body_mut(gc) {
            ManagedBody::Array(elements) => elements,
            other => panic!("expected array body, found {other:?}"),
        }
    }

    pub fn object(&self, gc: Gc) -> &PropMap {
        match self.body(gc) {
            ManagedBody::Object(members) => members,
            other => panic!("expected object body, found {other:?}"),
        }
    }

    pub fn object_mut(&mut self, gc: Gc) -> &mut PropMap {
        match self.body_mut(gc) {
            ManagedBody::Object(members) => members,
            other => panic!("expected object body, found {other:?}"),
        }
    }

    pub fn function(&self, gc: Gc) -> &FunctionBody {
        match self.body(gc) {
            ManagedBody::Function(f) => f,
            other => panic!("expected function body, found {other:?}"),
        }
    }

    pub fn function_mut(&mut self, gc: Gc) -> &mut FunctionBody {
        match self.body_mut(gc) {
            ManagedBody::Function(f) => f,
            other => panic!("expected function body, found {other:?}"),
        }
    }

    // === Array semantics ===

    /// Append. Pushing `Null` stores a hole, so `[.., null]` and a skipped
    /// slot are indistinguishable to iteration.
    pub fn array_push(&mut self, array: Gc, element: Value) {
        let element = if element == Value::Null {
            Value::Undefined
        } else {
            element
        };
        self.array_mut(array).push(element);
    }

    /// Indexed write. Writing past the end extends the array, filling the
    /// gap with holes. Writing `Null` punches a hole without extending.
    pub fn array_put(&mut self, array: Gc, index: usize, element: Value) {
        let elements = self.array_mut(array);
        if element == Value::Null {
            if index < elements.len() {
                elements[index] = Value::Undefined;
            }
            return;
        }
        if index >= elements.len() {
            elements.resize(index + 1, Value::Undefined);
        }
        elements[index] = element;
    }

    /// Indexed read; holes and out-of-range both yield `Null`.
    pub fn array_get(&self, array: Gc, index: usize) -> Value {
        match self.array(array).get(index) {
            Some(Value::Undefined) | None => Value::Null,
            Some(&value) => value,
        }
    }

    // === Object semantics ===

    /// Member write; `Null` deletes (tombstone).
    pub fn object_put(&mut self, object: Gc, key: &str, element: Value) {
        let element = if element == Value::Null {
            Value::Undefined
        } else {
            element
        };
        self.object_mut(object).put(key, element);
    }

    /// Member read; absent yields `Null`.
    pub fn object_get(&self, object: Gc, key: &str) -> Value {
        match self.object(object).get(key) {
            Value::Undefined => Value::Null,
            value => value,
        }
    }

    // === Collection ===

    /// Mark everything reachable from `root`. Primitives, scriptures,
    /// inscriptions, and native functions are non-traced.
    pub fn mark(&mut self, root: Value) {
        let Some(root) = root.as_gc() else { return };
        let mut work = vec![root];
        while let Some(gc) = work.pop() {
            let slot = &mut self.slots[gc.0 as usize];
            if slot.marked {
                continue;
            }
            slot.marked = true;
            match slot.body.as_ref().expect("marked a swept value") {
                ManagedBody::String(_) => {}
                ManagedBody::Array(elements) => {
                    work.extend(elements.iter().filter_map(|v| v.as_gc()));
                }
                ManagedBody::Object(members) => {
                    work.extend(members.iter().filter_map(|(_, v)| v.as_gc()));
                }
                ManagedBody::Function(f) => {
                    work.extend(f.closure.iter().filter_map(|(_, v)| v.as_gc()));
                }
            }
        }
    }

    /// Free every unmarked body and clear the mark on survivors.
    pub fn sweep(&mut self) {
        let mut freed = 0usize;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.body.is_none() {
                continue;
            }
            if slot.marked {
                slot.marked = false;
            } else {
                slot.body = None;
                self.free.push(index as u32);
                freed += 1;
            }
        }
        debug!(freed, live = self.live_count(), "heap sweep");
    }

    /// Number of live managed bodies.
    pub fn live_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }
}
