//! The value model: tagged dynamic values, the open-addressed property map
//! backing every object/scope/closure, and the managed heap with its
//! mark-and-sweep collector.

pub mod heap;
pub mod map;
pub mod value;

pub use heap::{FunctionBody, Gc, Heap, ManagedBody};
pub use map::PropMap;
pub use value::{NativeFn, Outcome, Value};

#[cfg(test)]
mod heap_test;
#[cfg(test)]
mod map_test;
#[cfg(test)]
mod value_test;
